//! Read netCDF-4/HDF5 containers in pure Rust.
//!
//! [`Container::open`] decodes the whole object tree up front. Lookups by
//! group or variable name then work from that tree, and variable values
//! are read from the file on demand.
//!
//! ```no_run
//! use nativehdf5::Container;
//!
//! let nc = Container::open("data.nc").unwrap();
//! for name in nc.list_variables().unwrap() {
//!     let var = nc.get_variable(&name).unwrap();
//!     println!("{name}{:?}: {:?}", var.dimensions, var.values.shape());
//! }
//! ```

pub mod attributes;
mod container;
mod dimensions;
pub mod error;
mod tree;

pub use attributes::Attributes;
pub use container::{Container, Variable};
pub use error::Error;
pub use nativehdf5_format::{ErrorKind, FormatError, Value};
