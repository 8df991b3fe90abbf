//! Writer for the classic netCDF container format (CDF-1, CDF-2, CDF-5).
//!
//! Variables are given as [`Value`] trees, the same model the HDF5 reader
//! produces, so a variable read from a netCDF-4 file can be written back
//! out directly.
//!
//! ```no_run
//! use nativehdf5_classic::{AttrValue, ClassicWriter, Value, Variable};
//!
//! let temps = Value::Seq(vec![Value::Float32(20.5), Value::Float32(21.0)]);
//! let mut writer = ClassicWriter::create("out.nc")?;
//! writer.add_global_attribute("title", AttrValue::from("two readings"))?;
//! writer.add_variable(
//!     "temperature",
//!     Variable::new(temps)
//!         .with_dimensions(&["time"])
//!         .with_attribute("units", AttrValue::from("degC")),
//! )?;
//! writer.close()?;
//! # Ok::<(), nativehdf5_classic::WriteError>(())
//! ```

pub mod error;
pub mod name;
mod shape;
pub mod types;
pub mod writer;

pub use error::WriteError;
pub use name::is_valid_name;
pub use nativehdf5_format::Value;
pub use types::{AttrValue, NcType};
pub use writer::{ClassicWriter, Variable, Version};
