//! Shared object header messages.
//!
//! A header message with the shared flag set holds a reference instead of
//! the message body. The body lives in another object header, normally a
//! committed datatype. Decoded shared datatypes are cached per container
//! in a [`SharedTable`] keyed by the referenced header address.

use std::collections::HashMap;

use crate::bytes::{ensure_len, read_u64};
use crate::datatype::Datatype;
use crate::error::FormatError;
use crate::message_type::MessageType;
use crate::object_header::{HeaderMessage, ObjectHeader};

/// A decoded shared-message reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedMessage {
    /// Encoding version (1, 2 or 3).
    pub version: u8,
    /// Address of the object header holding the message body.
    pub address: u64,
}

impl SharedMessage {
    /// Parse the reference stored in a shared message's data.
    pub fn parse(data: &[u8]) -> Result<SharedMessage, FormatError> {
        ensure_len(data, 0, 2)?;
        let version = data[0];
        let ref_type = data[1];
        let address = match version {
            // version(1) + type(1) + reserved(6) + address
            1 => read_u64(data, 8)?,
            // version(1) + type(1) + address
            2 => read_u64(data, 2)?,
            3 => match ref_type {
                2 => read_u64(data, 2)?,
                1 => return Err(FormatError::unsupported("shared message heap references")),
                t => {
                    return Err(FormatError::corrupted(format!(
                        "shared message reference type {t}"
                    )))
                }
            },
            v => {
                return Err(FormatError::UnsupportedVersion {
                    structure: "shared message",
                    version: v,
                })
            }
        };
        Ok(SharedMessage { version, address })
    }

    /// Read the referenced object header and return the body of its first
    /// unshared message of `msg_type`.
    pub fn resolve(&self, file: &[u8], msg_type: MessageType) -> Result<Vec<u8>, FormatError> {
        let header = ObjectHeader::parse(file, self.address)?;
        header
            .messages
            .into_iter()
            .find(|m| m.msg_type == msg_type && !m.is_shared())
            .map(|m| m.data)
            .ok_or_else(|| {
                FormatError::corrupted(format!(
                    "shared {msg_type:?} message missing at {:#x}",
                    self.address
                ))
            })
    }
}

/// Per-container cache of committed datatypes, keyed by header address.
#[derive(Debug, Default)]
pub struct SharedTable {
    datatypes: HashMap<u64, Datatype>,
}

impl SharedTable {
    pub fn new() -> SharedTable {
        SharedTable::default()
    }

    /// The committed datatype whose object header is at `address`,
    /// decoding it on first use.
    pub fn datatype(&mut self, file: &[u8], address: u64) -> Result<Datatype, FormatError> {
        if let Some(dt) = self.datatypes.get(&address) {
            return Ok(dt.clone());
        }
        let shared = SharedMessage {
            version: 0,
            address,
        };
        let body = shared.resolve(file, MessageType::Datatype)?;
        let (dt, _) = Datatype::parse(&body)?;
        tracing::debug!(address, class = dt.class_name(), "cached committed datatype");
        self.datatypes.insert(address, dt.clone());
        Ok(dt)
    }

    /// Decode a datatype message, following the shared reference if set.
    pub fn resolve_datatype(
        &mut self,
        file: &[u8],
        msg: &HeaderMessage,
    ) -> Result<Datatype, FormatError> {
        if msg.is_shared() {
            let shared = SharedMessage::parse(&msg.data)?;
            self.datatype(file, shared.address)
        } else {
            Ok(Datatype::parse(&msg.data)?.0)
        }
    }

    /// Message body, following the shared reference for non-datatype messages.
    pub fn resolve_body(file: &[u8], msg: &HeaderMessage) -> Result<Vec<u8>, FormatError> {
        if msg.is_shared() {
            SharedMessage::parse(&msg.data)?.resolve(file, msg.msg_type)
        } else {
            Ok(msg.data.clone())
        }
    }

    pub fn len(&self) -> usize {
        self.datatypes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datatypes.is_empty()
    }

    pub fn clear(&mut self) {
        self.datatypes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::tests::fixed_point;
    use crate::error::ErrorKind;
    use crate::object_header::tests::build_v1_header;
    use crate::object_header::MSG_FLAG_SHARED;

    fn v3_ref(address: u64) -> Vec<u8> {
        let mut data = vec![3, 2];
        data.extend_from_slice(&address.to_le_bytes());
        data
    }

    #[test]
    fn parse_versions() {
        let mut v1 = vec![1, 0, 0, 0, 0, 0, 0, 0];
        v1.extend_from_slice(&0x40u64.to_le_bytes());
        assert_eq!(SharedMessage::parse(&v1).unwrap().address, 0x40);

        let mut v2 = vec![2, 0];
        v2.extend_from_slice(&0x80u64.to_le_bytes());
        assert_eq!(SharedMessage::parse(&v2).unwrap().address, 0x80);

        assert_eq!(SharedMessage::parse(&v3_ref(0x1234)).unwrap().address, 0x1234);
    }

    #[test]
    fn heap_reference_unsupported() {
        let mut data = vec![3, 1];
        data.extend_from_slice(&[0u8; 8]);
        let err = SharedMessage::parse(&data).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFeature);
    }

    #[test]
    fn committed_datatype_cached() {
        let dt_bytes = fixed_point(2, false, true);
        let file = build_v1_header(&[(0x0003, &dt_bytes, 0)]);
        let msg = HeaderMessage {
            msg_type: MessageType::Datatype,
            flags: MSG_FLAG_SHARED,
            creation_order: None,
            data: v3_ref(0),
        };

        let mut table = SharedTable::new();
        let dt = table.resolve_datatype(&file, &msg).unwrap();
        assert_eq!(dt.size(), 2);
        assert_eq!(table.len(), 1);
        let again = table.resolve_datatype(&file, &msg).unwrap();
        assert_eq!(dt, again);
        assert_eq!(table.len(), 1);

        table.clear();
        assert!(table.is_empty());
    }

    #[test]
    fn missing_target_message_is_corruption() {
        let file = build_v1_header(&[(0x0001, &[2, 0, 0, 0], 0)]);
        let err = SharedTable::new().datatype(&file, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupted);
    }
}
