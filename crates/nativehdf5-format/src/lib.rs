//! Pure-Rust parsing of the HDF5 container format.
//!
//! Every parser works over a byte slice holding the whole file, so
//! addresses read from the file index it directly. Nothing here performs
//! I/O; the `nativehdf5-io` crate supplies the bytes.

pub mod attribute;
pub mod attribute_info;
pub mod btree_v1;
pub mod btree_v2;
pub mod bytes;
pub mod checksum;
pub mod chunked_read;
pub mod data_layout;
pub mod data_read;
pub mod dataspace;
pub mod datatype;
pub mod error;
pub mod fill_value;
pub mod filter_pipeline;
pub mod filters;
pub mod fractal_heap;
pub mod global_heap;
pub mod group_info;
pub mod link_info;
pub mod link_message;
pub mod local_heap;
pub mod message_type;
pub mod object;
pub mod object_header;
pub mod shared_message;
pub mod superblock;
pub mod symbol_table;
pub mod value;
pub mod value_decode;

pub use data_read::{materialize, DatasetInfo};
pub use datatype::Datatype;
pub use error::{ErrorKind, FormatError};
pub use object::{Attribute, Link, ObjectInfo};
pub use shared_message::SharedTable;
pub use superblock::Superblock;
pub use value::Value;
pub use value_decode::ValueDecoder;
