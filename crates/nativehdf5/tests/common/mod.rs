//! Builds small synthetic netCDF-4/HDF5 files in memory.

#![allow(dead_code)]

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use nativehdf5_format::checksum::jenkins_lookup3;

pub const UNDEF: u64 = u64::MAX;

pub const MSG_DATASPACE: u8 = 0x01;
pub const MSG_LINK_INFO: u8 = 0x02;
pub const MSG_DATATYPE: u8 = 0x03;
pub const MSG_LINK: u8 = 0x06;
pub const MSG_LAYOUT: u8 = 0x08;
pub const MSG_GROUP_INFO: u8 = 0x0A;
pub const MSG_FILTERS: u8 = 0x0B;
pub const MSG_ATTRIBUTE: u8 = 0x0C;

/// Appends 8-byte aligned blocks after a reserved superblock slot.
pub struct FileBuilder {
    buf: Vec<u8>,
}

impl FileBuilder {
    pub fn new() -> FileBuilder {
        FileBuilder { buf: vec![0; 48] }
    }

    pub fn append(&mut self, bytes: &[u8]) -> u64 {
        let aligned = (self.buf.len() + 7) & !7;
        self.buf.resize(aligned, 0);
        self.buf.extend_from_slice(bytes);
        aligned as u64
    }

    /// Fill in a version 2 superblock and return the file.
    pub fn finish(mut self, root: u64) -> Vec<u8> {
        let eof = self.buf.len() as u64;
        let mut sb = b"\x89HDF\r\n\x1a\n".to_vec();
        sb.extend_from_slice(&[2, 8, 8, 0]);
        sb.write_u64::<LittleEndian>(0).unwrap();
        sb.write_u64::<LittleEndian>(UNDEF).unwrap();
        sb.write_u64::<LittleEndian>(eof).unwrap();
        sb.write_u64::<LittleEndian>(root).unwrap();
        let sum = jenkins_lookup3(&sb);
        sb.write_u32::<LittleEndian>(sum).unwrap();
        self.buf[..48].copy_from_slice(&sb);
        self.buf
    }
}

/// A version 2 object header that tracks creation order. Each message is
/// (type, body, creation order).
pub fn object_header(messages: &[(u8, Vec<u8>, u16)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (kind, data, order) in messages {
        body.push(*kind);
        body.write_u16::<LittleEndian>(data.len() as u16).unwrap();
        body.push(0);
        body.write_u16::<LittleEndian>(*order).unwrap();
        body.extend_from_slice(data);
    }
    let mut buf = b"OHDR".to_vec();
    buf.push(2);
    buf.push(0x04 | 0x02);
    buf.write_u32::<LittleEndian>(body.len() as u32).unwrap();
    buf.extend(body);
    let sum = jenkins_lookup3(&buf);
    buf.write_u32::<LittleEndian>(sum).unwrap();
    buf
}

/// Messages in order, numbered from zero.
pub fn numbered(messages: Vec<(u8, Vec<u8>)>) -> Vec<(u8, Vec<u8>, u16)> {
    messages
        .into_iter()
        .enumerate()
        .map(|(i, (k, b))| (k, b, i as u16))
        .collect()
}

fn dt_header(class: u8, bf: [u8; 3], size: u32) -> Vec<u8> {
    let mut buf = vec![0x10 | class, bf[0], bf[1], bf[2]];
    buf.write_u32::<LittleEndian>(size).unwrap();
    buf
}

pub fn i32_type() -> Vec<u8> {
    let mut buf = dt_header(0, [0x08, 0, 0], 4);
    buf.write_u16::<LittleEndian>(0).unwrap();
    buf.write_u16::<LittleEndian>(32).unwrap();
    buf
}

pub fn f32_type() -> Vec<u8> {
    let mut buf = dt_header(1, [0x20, 31, 0], 4);
    buf.extend_from_slice(&[0, 0, 32, 0, 23, 8, 0, 23]);
    buf.write_u32::<LittleEndian>(127).unwrap();
    buf
}

pub fn f64_type() -> Vec<u8> {
    let mut buf = dt_header(1, [0x20, 63, 0], 8);
    buf.extend_from_slice(&[0, 0, 64, 0, 52, 11, 0, 52]);
    buf.write_u32::<LittleEndian>(1023).unwrap();
    buf
}

/// Null-terminated fixed-length string.
pub fn string_type(size: u32) -> Vec<u8> {
    dt_header(3, [0, 0, 0], size)
}

/// Variable-length sequence of object references.
pub fn reference_list_type() -> Vec<u8> {
    let mut buf = dt_header(9, [0, 0, 0], 16);
    buf.extend(dt_header(7, [0, 0, 0], 8));
    buf
}

pub fn scalar_space() -> Vec<u8> {
    vec![2, 0, 0, 0]
}

pub fn simple_space(dims: &[u64]) -> Vec<u8> {
    let mut buf = vec![2, dims.len() as u8, 0, 1];
    for &d in dims {
        buf.write_u64::<LittleEndian>(d).unwrap();
    }
    buf
}

pub fn attribute(name: &str, datatype: &[u8], space: &[u8], value: &[u8]) -> Vec<u8> {
    let mut buf = vec![3, 0];
    buf.write_u16::<LittleEndian>((name.len() + 1) as u16).unwrap();
    buf.write_u16::<LittleEndian>(datatype.len() as u16).unwrap();
    buf.write_u16::<LittleEndian>(space.len() as u16).unwrap();
    buf.push(0);
    buf.extend_from_slice(name.as_bytes());
    buf.push(0);
    buf.extend_from_slice(datatype);
    buf.extend_from_slice(space);
    buf.extend_from_slice(value);
    buf
}

pub fn string_attribute(name: &str, value: &str) -> Vec<u8> {
    attribute(name, &string_type(value.len() as u32), &scalar_space(), value.as_bytes())
}

pub fn i32_attribute(name: &str, values: &[i32]) -> Vec<u8> {
    attribute(
        name,
        &i32_type(),
        &simple_space(&[values.len() as u64]),
        &i32_bytes(values),
    )
}

pub fn hard_link(name: &str, address: u64, order: u64) -> Vec<u8> {
    let mut buf = vec![1, 0x04];
    buf.write_u64::<LittleEndian>(order).unwrap();
    buf.push(name.len() as u8);
    buf.extend_from_slice(name.as_bytes());
    buf.write_u64::<LittleEndian>(address).unwrap();
    buf
}

pub fn compact_link_info() -> Vec<u8> {
    let mut buf = vec![0, 0];
    buf.write_u64::<LittleEndian>(UNDEF).unwrap();
    buf.write_u64::<LittleEndian>(UNDEF).unwrap();
    buf
}

pub fn group_info() -> Vec<u8> {
    vec![0, 0]
}

pub fn contiguous_layout(address: u64, size: u64) -> Vec<u8> {
    let mut buf = vec![3, 1];
    buf.write_u64::<LittleEndian>(address).unwrap();
    buf.write_u64::<LittleEndian>(size).unwrap();
    buf
}

/// Version 4 single-chunk layout of a filtered chunk. `dims` ends with the
/// element size.
pub fn single_chunk_layout(address: u64, dims: &[u32], stored: u64) -> Vec<u8> {
    let mut buf = vec![4, 2, 0x02, dims.len() as u8, 4];
    for &d in dims {
        buf.write_u32::<LittleEndian>(d).unwrap();
    }
    buf.push(1);
    buf.write_u64::<LittleEndian>(stored).unwrap();
    buf.write_u32::<LittleEndian>(0).unwrap();
    buf.write_u64::<LittleEndian>(address).unwrap();
    buf
}

pub fn deflate_pipeline(level: u32) -> Vec<u8> {
    let mut buf = vec![2, 1];
    buf.write_u16::<LittleEndian>(1).unwrap();
    buf.write_u16::<LittleEndian>(0).unwrap();
    buf.write_u16::<LittleEndian>(1).unwrap();
    buf.write_u32::<LittleEndian>(level).unwrap();
    buf
}

/// A global heap collection holding `objects` at indices 1, 2, ...
pub fn global_heap(objects: &[&[u8]]) -> Vec<u8> {
    let mut body = Vec::new();
    for (i, obj) in objects.iter().enumerate() {
        body.write_u16::<LittleEndian>((i + 1) as u16).unwrap();
        body.write_u16::<LittleEndian>(1).unwrap();
        body.extend_from_slice(&[0; 4]);
        body.write_u64::<LittleEndian>(obj.len() as u64).unwrap();
        body.extend_from_slice(obj);
        body.resize((body.len() + 7) & !7, 0);
    }
    body.extend_from_slice(&[0; 16]);
    let mut buf = b"GCOL".to_vec();
    buf.extend_from_slice(&[1, 0, 0, 0]);
    buf.write_u64::<LittleEndian>((16 + body.len()) as u64).unwrap();
    buf.extend(body);
    buf
}

/// One variable-length element pointing at a global heap object.
pub fn vlen_element(length: u32, heap: u64, index: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.write_u32::<LittleEndian>(length).unwrap();
    buf.write_u64::<LittleEndian>(heap).unwrap();
    buf.write_u32::<LittleEndian>(index).unwrap();
    buf
}

pub fn i32_bytes(values: &[i32]) -> Vec<u8> {
    let mut buf = Vec::new();
    for &v in values {
        buf.write_i32::<LittleEndian>(v).unwrap();
    }
    buf
}

pub fn f64_bytes(values: &[f64]) -> Vec<u8> {
    let mut buf = Vec::new();
    for &v in values {
        buf.write_f64::<LittleEndian>(v).unwrap();
    }
    buf
}

pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

pub const PLACEHOLDER: &str = "This is a netCDF dimension but not a netCDF variable.         3";

/// Addresses of interesting objects in [`sample_file`].
pub struct Sample {
    pub bytes: Vec<u8>,
    pub root: u64,
    pub x: u64,
}

/// A netCDF-4 style file:
///
/// ```text
/// /            title="hello", version=[4], history="created" (stored first, ordered last)
///   x          bare dimension of 3, dimid 1
///   y          coordinate variable [10, 20], dimid 0
///   temp       int32 (y, x), one deflated chunk, units="K"
///   pressure   float64 (x), dimensions via DIMENSION_LIST
///   obs/       station="A1"
///     speed    int32 (y)
///     count    int32 scalar
/// ```
pub fn sample_file() -> Sample {
    let mut f = FileBuilder::new();

    let x = f.append(&object_header(&numbered(vec![
        (MSG_DATASPACE, simple_space(&[3])),
        (MSG_DATATYPE, f32_type()),
        (MSG_LAYOUT, contiguous_layout(UNDEF, 0)),
        (MSG_ATTRIBUTE, string_attribute("CLASS", "DIMENSION_SCALE")),
        (MSG_ATTRIBUTE, string_attribute("NAME", PLACEHOLDER)),
        (MSG_ATTRIBUTE, i32_attribute("_Netcdf4Dimid", &[1])),
    ])));

    let y_data = f.append(&i32_bytes(&[10, 20]));
    let y = f.append(&object_header(&numbered(vec![
        (MSG_DATASPACE, simple_space(&[2])),
        (MSG_DATATYPE, i32_type()),
        (MSG_LAYOUT, contiguous_layout(y_data, 8)),
        (MSG_ATTRIBUTE, string_attribute("CLASS", "DIMENSION_SCALE")),
        (MSG_ATTRIBUTE, string_attribute("NAME", "y")),
        (MSG_ATTRIBUTE, i32_attribute("_Netcdf4Dimid", &[0])),
    ])));

    let chunk = deflate(&i32_bytes(&[1, 2, 3, 4, 5, 6]));
    let chunk_addr = f.append(&chunk);
    let temp = f.append(&object_header(&numbered(vec![
        (MSG_DATASPACE, simple_space(&[2, 3])),
        (MSG_DATATYPE, i32_type()),
        (MSG_FILTERS, deflate_pipeline(6)),
        (
            MSG_LAYOUT,
            single_chunk_layout(chunk_addr, &[2, 3, 4], chunk.len() as u64),
        ),
        (MSG_ATTRIBUTE, string_attribute("units", "K")),
        (MSG_ATTRIBUTE, i32_attribute("_Netcdf4Coordinates", &[0, 1])),
    ])));

    let heap = f.append(&global_heap(&[&x.to_le_bytes()]));
    let pressure_data = f.append(&f64_bytes(&[1000.0, 850.5, 500.25]));
    let pressure = f.append(&object_header(&numbered(vec![
        (MSG_DATASPACE, simple_space(&[3])),
        (MSG_DATATYPE, f64_type()),
        (MSG_LAYOUT, contiguous_layout(pressure_data, 24)),
        (
            MSG_ATTRIBUTE,
            attribute(
                "DIMENSION_LIST",
                &reference_list_type(),
                &simple_space(&[1]),
                &vlen_element(1, heap, 1),
            ),
        ),
    ])));

    let speed_data = f.append(&i32_bytes(&[7, 8]));
    let speed = f.append(&object_header(&numbered(vec![
        (MSG_DATASPACE, simple_space(&[2])),
        (MSG_DATATYPE, i32_type()),
        (MSG_LAYOUT, contiguous_layout(speed_data, 8)),
        (MSG_ATTRIBUTE, i32_attribute("_Netcdf4Coordinates", &[0])),
    ])));
    let count_data = f.append(&i32_bytes(&[42]));
    let count = f.append(&object_header(&numbered(vec![
        (MSG_DATASPACE, scalar_space()),
        (MSG_DATATYPE, i32_type()),
        (MSG_LAYOUT, contiguous_layout(count_data, 4)),
    ])));
    let obs = f.append(&object_header(&numbered(vec![
        (MSG_LINK_INFO, compact_link_info()),
        (MSG_GROUP_INFO, group_info()),
        (MSG_LINK, hard_link("speed", speed, 0)),
        (MSG_LINK, hard_link("count", count, 1)),
        (MSG_ATTRIBUTE, string_attribute("station", "A1")),
    ])));

    let root = f.append(&object_header(&[
        (MSG_LINK_INFO, compact_link_info(), 0),
        (MSG_GROUP_INFO, group_info(), 1),
        (MSG_ATTRIBUTE, string_attribute("history", "created"), 9),
        (MSG_LINK, hard_link("obs", obs, 4), 2),
        (MSG_LINK, hard_link("x", x, 0), 3),
        (MSG_LINK, hard_link("y", y, 1), 4),
        (MSG_LINK, hard_link("temp", temp, 2), 5),
        (MSG_LINK, hard_link("pressure", pressure, 3), 6),
        (MSG_ATTRIBUTE, string_attribute("title", "hello"), 7),
        (MSG_ATTRIBUTE, i32_attribute("version", &[4]), 8),
    ]));

    Sample {
        bytes: f.finish(root),
        root,
        x,
    }
}
