//! Sequential writer for classic netCDF files.

use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{BigEndian, WriteBytesExt};
use nativehdf5_format::Value;

use crate::error::WriteError;
use crate::name::is_valid_name;
use crate::shape::{pad4, write_values, Shape};
use crate::types::{AttrValue, NcType};

const TAG_DIMENSION: u32 = 0x0A;
const TAG_VARIABLE: u32 = 0x0B;
const TAG_ATTRIBUTE: u32 = 0x0C;

/// Classic format revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Version {
    /// CDF-1: 32-bit offsets.
    Classic,
    /// CDF-2: 64-bit offsets.
    #[default]
    Offset64,
    /// CDF-5: 64-bit offsets and counts, unsigned and 64-bit integer types.
    Data64,
}

impl Version {
    /// The byte following "CDF".
    pub fn byte(self) -> u8 {
        match self {
            Version::Classic => 1,
            Version::Offset64 => 2,
            Version::Data64 => 5,
        }
    }
}

/// A variable to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    /// Nested `Seq`s of numbers or strings, outermost dimension first.
    pub values: Value,
    /// Names for the leading dimensions. Missing names are generated.
    pub dimensions: Vec<String>,
    pub attributes: Vec<(String, AttrValue)>,
    /// Element type for values with no leaves, such as an empty record
    /// variable.
    pub element_type: Option<NcType>,
}

impl Variable {
    pub fn new(values: Value) -> Variable {
        Variable {
            values,
            dimensions: Vec::new(),
            attributes: Vec::new(),
            element_type: None,
        }
    }

    pub fn with_dimensions(mut self, names: &[&str]) -> Variable {
        self.dimensions = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn with_attribute(mut self, name: &str, value: AttrValue) -> Variable {
        self.attributes.push((name.to_string(), value));
        self
    }

    pub fn with_type(mut self, nc_type: NcType) -> Variable {
        self.element_type = Some(nc_type);
        self
    }
}

#[derive(Debug)]
struct Dimension {
    name: String,
    /// 0 for the unlimited dimension.
    length: u64,
}

#[derive(Debug)]
struct SavedVariable {
    name: String,
    values: Value,
    shape: Shape,
    dim_ids: Vec<usize>,
    attributes: Vec<(String, AttrValue)>,
}

/// Collects dimensions, attributes and variables, then writes the file
/// on [`close`](ClassicWriter::close).
#[derive(Debug)]
pub struct ClassicWriter<W: Write + Seek> {
    out: W,
    version: Version,
    needs_cdf5: bool,
    global_attributes: Vec<(String, AttrValue)>,
    dimensions: Vec<Dimension>,
    variables: Vec<SavedVariable>,
}

impl ClassicWriter<BufWriter<File>> {
    /// Create (or truncate) the file at `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, WriteError> {
        let file = File::create(path)?;
        Ok(ClassicWriter::new(BufWriter::new(file)))
    }
}

fn check_attributes(attrs: &[(String, AttrValue)]) -> Result<bool, WriteError> {
    let mut needs_cdf5 = false;
    for (name, value) in attrs {
        if !is_valid_name(name) {
            return Err(WriteError::InvalidName(name.clone()));
        }
        needs_cdf5 |= value.nc_type().requires_cdf5();
    }
    Ok(needs_cdf5)
}

impl<W: Write + Seek> ClassicWriter<W> {
    pub fn new(out: W) -> ClassicWriter<W> {
        ClassicWriter {
            out,
            version: Version::default(),
            needs_cdf5: false,
            global_attributes: Vec::new(),
            dimensions: Vec::new(),
            variables: Vec::new(),
        }
    }

    /// Request a format revision. CDF-5 is still used when a type needs it.
    pub fn with_version(mut self, version: Version) -> ClassicWriter<W> {
        self.version = version;
        self
    }

    /// The revision [`close`](ClassicWriter::close) will write.
    pub fn version(&self) -> Version {
        if self.needs_cdf5 {
            Version::Data64
        } else {
            self.version
        }
    }

    /// Set a global attribute, replacing one of the same name.
    pub fn add_global_attribute(&mut self, name: &str, value: AttrValue) -> Result<(), WriteError> {
        let attr = [(name.to_string(), value)];
        self.needs_cdf5 |= check_attributes(&attr)?;
        let [(name, value)] = attr;
        match self.global_attributes.iter_mut().find(|(n, _)| *n == name) {
            Some(existing) => existing.1 = value,
            None => self.global_attributes.push((name, value)),
        }
        Ok(())
    }

    /// Add a variable. Its dimensions are created on first use and must
    /// keep their length when reused.
    pub fn add_variable(&mut self, name: &str, var: Variable) -> Result<(), WriteError> {
        if !is_valid_name(name) {
            return Err(WriteError::InvalidName(name.to_string()));
        }
        if let Some(bad) = var.dimensions.iter().find(|d| !d.is_empty() && !is_valid_name(d)) {
            return Err(WriteError::InvalidName(bad.clone()));
        }
        let attrs_need_cdf5 = check_attributes(&var.attributes)?;
        let shape = Shape::infer(name, &var.values, var.dimensions.len(), var.element_type)?;

        // Resolve every name before registering any, so a failure adds nothing.
        let mut resolved: Vec<(String, u64)> = Vec::with_capacity(shape.dims.len());
        let mut next_id = self.dimensions.len();
        for (i, &length) in shape.dims.iter().enumerate() {
            let given = var.dimensions.get(i).filter(|d| !d.is_empty());
            let dim_name = match given {
                Some(d) => d.clone(),
                None if shape.string_len.is_some() && i == shape.dims.len() - 1 => {
                    format!("_stringlen_{name}")
                }
                None => {
                    let generated = format!("_dimid_{next_id}");
                    next_id += 1;
                    generated
                }
            };
            let existing = self
                .dimensions
                .iter()
                .map(|d| (&d.name, d.length))
                .chain(resolved.iter().map(|(n, l)| (n, *l)))
                .find(|(n, _)| **n == dim_name);
            match existing {
                Some((_, current)) if current != length => {
                    return Err(WriteError::DimensionSize(format!(
                        "{dim_name} has length {current}, {name} needs {length}"
                    )));
                }
                Some(_) => {}
                None if given.is_some() => next_id += 1,
                None => {}
            }
            resolved.push((dim_name, length));
        }

        let mut dim_ids = Vec::with_capacity(resolved.len());
        for (dim_name, length) in resolved {
            let id = match self.dimensions.iter().position(|d| d.name == dim_name) {
                Some(id) => id,
                None => {
                    self.dimensions.push(Dimension {
                        name: dim_name,
                        length,
                    });
                    self.dimensions.len() - 1
                }
            };
            dim_ids.push(id);
        }

        self.needs_cdf5 |= attrs_need_cdf5 || shape.nc_type.requires_cdf5();
        tracing::debug!(variable = name, dims = ?shape.dims, nc_type = ?shape.nc_type, "added variable");
        self.variables.push(SavedVariable {
            name: name.to_string(),
            values: var.values,
            shape,
            dim_ids,
            attributes: var.attributes,
        });
        Ok(())
    }

    /// Write the header and data, then return the underlying writer.
    pub fn close(mut self) -> Result<W, WriteError> {
        let version = self.version();
        let mut enc = Encoder {
            out: &mut self.out,
            version,
            pos: 0,
        };

        enc.write_all(b"CDF")?;
        enc.write_u8(version.byte())?;
        enc.number(0)?; // numrecs

        if self.dimensions.is_empty() {
            enc.absent()?;
        } else {
            enc.write_u32::<BigEndian>(TAG_DIMENSION)?;
            enc.number(self.dimensions.len() as u64)?;
            for dim in &self.dimensions {
                enc.name(&dim.name)?;
                enc.number(dim.length)?;
            }
        }

        enc.attributes(&self.global_attributes)?;

        let mut begin_fields = Vec::with_capacity(self.variables.len());
        if self.variables.is_empty() {
            enc.absent()?;
        } else {
            enc.write_u32::<BigEndian>(TAG_VARIABLE)?;
            enc.number(self.variables.len() as u64)?;
            for var in &self.variables {
                enc.name(&var.name)?;
                enc.number(var.dim_ids.len() as u64)?;
                for &id in &var.dim_ids {
                    enc.number(id as u64)?;
                }
                enc.attributes(&var.attributes)?;
                enc.write_u32::<BigEndian>(var.shape.nc_type.code())?;
                enc.number(var.shape.vsize())?;
                begin_fields.push(enc.pos);
                enc.offset(0)?;
            }
        }

        let mut begins = Vec::with_capacity(self.variables.len());
        for var in &self.variables {
            begins.push(enc.pos);
            let n = write_values(&mut enc, &var.values, &var.shape)?;
            tracing::trace!(variable = %var.name, bytes = n, record = var.shape.is_record(), "wrote data");
        }
        let end = enc.pos;

        for (&field, &begin) in begin_fields.iter().zip(&begins) {
            enc.out.seek(SeekFrom::Start(field))?;
            enc.offset(begin)?;
        }
        self.out.seek(SeekFrom::Start(end))?;
        self.out.flush()?;

        tracing::debug!(
            version = version.byte(),
            dimensions = self.dimensions.len(),
            variables = self.variables.len(),
            bytes = end,
            "closed classic file"
        );
        Ok(self.out)
    }
}

/// Counts bytes written and knows the revision's field widths.
struct Encoder<'a, W: Write> {
    out: &'a mut W,
    version: Version,
    pos: u64,
}

impl<W: Write> Write for Encoder<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.out.write(buf)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

fn too_large(what: &str, n: u64) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("{what} {n} does not fit the chosen format"),
    )
}

impl<W: Write> Encoder<'_, W> {
    /// Counts and sizes: 8 bytes in CDF-5, 4 otherwise.
    fn number(&mut self, n: u64) -> io::Result<()> {
        match self.version {
            Version::Data64 => self.write_u64::<BigEndian>(n),
            _ => {
                let n = i32::try_from(n).map_err(|_| too_large("count", n))?;
                self.write_i32::<BigEndian>(n)
            }
        }
    }

    /// File offsets: 4 bytes in CDF-1, 8 otherwise.
    fn offset(&mut self, n: u64) -> io::Result<()> {
        match self.version {
            Version::Classic => {
                let n = i32::try_from(n).map_err(|_| too_large("offset", n))?;
                self.write_i32::<BigEndian>(n)
            }
            _ => self.write_u64::<BigEndian>(n),
        }
    }

    fn pad(&mut self) -> io::Result<()> {
        let extra = pad4(self.pos) - self.pos;
        self.write_all(&[0u8; 3][..extra as usize])
    }

    fn absent(&mut self) -> io::Result<()> {
        self.write_u32::<BigEndian>(0)?;
        self.number(0)
    }

    fn name(&mut self, name: &str) -> io::Result<()> {
        self.number(name.len() as u64)?;
        self.write_all(name.as_bytes())?;
        self.pad()
    }

    fn attributes(&mut self, attrs: &[(String, AttrValue)]) -> io::Result<()> {
        if attrs.is_empty() {
            return self.absent();
        }
        self.write_u32::<BigEndian>(TAG_ATTRIBUTE)?;
        self.number(attrs.len() as u64)?;
        for (name, value) in attrs {
            self.name(name)?;
            self.write_u32::<BigEndian>(value.nc_type().code())?;
            self.number(value.len() as u64)?;
            value.write_values(self)?;
            self.pad()?;
        }
        Ok(())
    }
}
