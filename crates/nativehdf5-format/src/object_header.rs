//! Object header parsing (v1 and v2) including continuation blocks.

use std::collections::HashSet;

use crate::bytes::{ensure_len, read_u16, read_u32, read_u64, read_u8, read_uint, to_usize};
use crate::checksum::verify_checksum;
use crate::error::FormatError;
use crate::message_type::MessageType;

/// OHDR signature for v2 object headers.
const OHDR_SIGNATURE: [u8; 4] = *b"OHDR";

/// OCHK signature for v2 continuation chunks.
const OCHK_SIGNATURE: [u8; 4] = *b"OCHK";

/// Message flag: the message body is a shared-message reference.
pub const MSG_FLAG_SHARED: u8 = 0x02;

/// Message flag: fail if the message type is not understood.
pub const MSG_FLAG_MUST_UNDERSTAND: u8 = 0x08;

/// Upper bound on header chunks per object, guards against continuation loops.
const MAX_CHUNKS: usize = 4096;

/// A single parsed header message.
#[derive(Debug, Clone)]
pub struct HeaderMessage {
    /// The message type.
    pub msg_type: MessageType,
    /// Message flags byte.
    pub flags: u8,
    /// Creation order (v2 only, when tracking is enabled).
    pub creation_order: Option<u16>,
    /// Raw message data bytes.
    pub data: Vec<u8>,
}

impl HeaderMessage {
    /// Whether the body is a reference to a shared message.
    pub fn is_shared(&self) -> bool {
        self.flags & MSG_FLAG_SHARED != 0
    }
}

/// Parsed object header.
#[derive(Debug, Clone)]
pub struct ObjectHeader {
    /// File address of the header.
    pub address: u64,
    /// Header version (1 or 2).
    pub version: u8,
    /// Object header flags (v2 only; 0 for v1).
    pub flags: u8,
    /// All messages from all chunks, in stream order.
    pub messages: Vec<HeaderMessage>,
    /// Object reference count (v1 prologue).
    pub reference_count: Option<u32>,
    /// Modification time from the v2 timestamp block, seconds since the epoch.
    pub modification_time: Option<u32>,
}

/// Message framing shared by all chunks of one header.
#[derive(Debug, Clone, Copy)]
struct Framing {
    version: u8,
    creation_order: bool,
}

impl Framing {
    fn message_header_size(self) -> usize {
        match (self.version, self.creation_order) {
            (1, _) => 8,
            (_, true) => 6,
            (_, false) => 4,
        }
    }
}

struct HeaderState {
    messages: Vec<HeaderMessage>,
    visited: HashSet<u64>,
}

impl ObjectHeader {
    /// Parse the object header at `address` in `data`, the whole file.
    pub fn parse(data: &[u8], address: u64) -> Result<ObjectHeader, FormatError> {
        let offset = to_usize(address)?;
        ensure_len(data, offset, 4)?;
        let header = if data[offset..offset + 4] == OHDR_SIGNATURE {
            Self::parse_v2(data, address, offset)?
        } else {
            Self::parse_v1(data, address, offset)?
        };
        tracing::trace!(
            address,
            version = header.version,
            messages = header.messages.len(),
            "decoded object header"
        );
        Ok(header)
    }

    /// First message of the given type.
    pub fn find(&self, msg_type: MessageType) -> Option<&HeaderMessage> {
        self.messages.iter().find(|m| m.msg_type == msg_type)
    }

    fn parse_v1(data: &[u8], address: u64, offset: usize) -> Result<ObjectHeader, FormatError> {
        // version(1) + reserved(1) + num_messages(2) + ref_count(4) + header_size(4)
        // + padding(4) to align the first message on 8 bytes
        ensure_len(data, offset, 16)?;
        let version = data[offset];
        if version != 1 {
            return Err(FormatError::UnsupportedVersion {
                structure: "object header",
                version,
            });
        }
        let num_messages = read_u16(data, offset + 2)?;
        let reference_count = read_u32(data, offset + 4)?;
        let header_size = read_u32(data, offset + 8)? as usize;

        let framing = Framing {
            version: 1,
            creation_order: false,
        };
        let mut state = HeaderState {
            messages: Vec::new(),
            visited: HashSet::from([address]),
        };
        ensure_len(data, offset + 16, header_size)?;
        Self::parse_messages(data, offset + 16, offset + 16 + header_size, framing, &mut state)?;

        // Counts include NIL and continuation messages, which are not retained.
        if state.messages.len() > num_messages as usize {
            tracing::warn!(
                address,
                declared = num_messages,
                found = state.messages.len(),
                "v1 object header message count mismatch"
            );
        }

        Ok(ObjectHeader {
            address,
            version: 1,
            flags: 0,
            messages: state.messages,
            reference_count: Some(reference_count),
            modification_time: None,
        })
    }

    fn parse_v2(data: &[u8], address: u64, offset: usize) -> Result<ObjectHeader, FormatError> {
        // signature(4) + version(1) + flags(1)
        ensure_len(data, offset, 6)?;
        let version = data[offset + 4];
        if version != 2 {
            return Err(FormatError::UnsupportedVersion {
                structure: "object header",
                version,
            });
        }
        let flags = data[offset + 5];
        if flags & 0xC0 != 0 {
            tracing::warn!(address, flags, "reserved object header flag bits set");
        }

        let mut pos = offset + 6;

        // Access, modification, change and birth times (bit 5).
        let modification_time = if flags & 0x20 != 0 {
            ensure_len(data, pos, 16)?;
            let mtime = read_u32(data, pos + 4)?;
            pos += 16;
            Some(mtime)
        } else {
            None
        };

        // Attribute phase-change thresholds (bit 4): max compact(2) + min dense(2).
        if flags & 0x10 != 0 {
            ensure_len(data, pos, 4)?;
            pos += 4;
        }

        let width = 1usize << (flags & 0x03);
        let chunk0_size = to_usize(read_uint(data, pos, width)?)?;
        pos += width;

        // The checksum covers everything from the signature to the end of chunk 0.
        let chunk0_end = pos
            .checked_add(chunk0_size)
            .ok_or_else(|| FormatError::corrupted("object header chunk size overflows"))?;
        verify_checksum(data, offset, chunk0_end - offset)?;

        let framing = Framing {
            version: 2,
            creation_order: flags & 0x04 != 0,
        };
        let mut state = HeaderState {
            messages: Vec::new(),
            visited: HashSet::from([address]),
        };
        Self::parse_messages(data, pos, chunk0_end, framing, &mut state)?;

        Ok(ObjectHeader {
            address,
            version: 2,
            flags,
            messages: state.messages,
            reference_count: None,
            modification_time,
        })
    }

    /// Decode the message stream in `data[start..end]`, following
    /// continuation messages as they are encountered.
    fn parse_messages(
        data: &[u8],
        start: usize,
        end: usize,
        framing: Framing,
        state: &mut HeaderState,
    ) -> Result<(), FormatError> {
        let header_size = framing.message_header_size();
        let mut pos = start;

        while end - pos >= header_size {
            let (raw_type, size, flags, creation_order) = if framing.version == 1 {
                (
                    read_u16(data, pos)?,
                    read_u16(data, pos + 2)? as usize,
                    read_u8(data, pos + 4)?,
                    None,
                )
            } else {
                (
                    read_u8(data, pos)? as u16,
                    read_u16(data, pos + 1)? as usize,
                    read_u8(data, pos + 3)?,
                    if framing.creation_order {
                        Some(read_u16(data, pos + 4)?)
                    } else {
                        None
                    },
                )
            };
            pos += header_size;

            if size > end - pos {
                return Err(FormatError::corrupted(format!(
                    "message type {raw_type:#x} of {size} bytes overruns its header chunk ({} bytes left)",
                    end - pos
                )));
            }
            let body = &data[pos..pos + size];
            pos += size;

            let msg_type = MessageType::from_u16(raw_type);
            match msg_type {
                MessageType::ObjectHeaderContinuation => {
                    let cont_addr = read_u64(body, 0)?;
                    let cont_len = to_usize(read_u64(body, 8)?)?;
                    Self::parse_continuation(data, cont_addr, cont_len, framing, state)?;
                }
                MessageType::ExternalDataFiles => {
                    return Err(FormatError::unsupported("external data files"));
                }
                MessageType::Unknown(id) => {
                    if flags & MSG_FLAG_MUST_UNDERSTAND != 0 {
                        return Err(FormatError::UnsupportedMessage(id));
                    }
                    tracing::warn!(msg_type = id, "skipping unknown header message");
                }
                t if t.is_ignored() => {
                    if t != MessageType::Nil {
                        tracing::debug!(msg_type = ?t, "skipping header message");
                    }
                }
                _ => state.messages.push(HeaderMessage {
                    msg_type,
                    flags,
                    creation_order,
                    data: body.to_vec(),
                }),
            }
        }

        if pos != end && framing.version == 2 {
            tracing::trace!(gap = end - pos, "object header chunk gap");
        }
        Ok(())
    }

    fn parse_continuation(
        data: &[u8],
        address: u64,
        length: usize,
        framing: Framing,
        state: &mut HeaderState,
    ) -> Result<(), FormatError> {
        if !state.visited.insert(address) || state.visited.len() > MAX_CHUNKS {
            return Err(FormatError::corrupted(format!(
                "object header continuation loop at {address:#x}"
            )));
        }
        let offset = to_usize(address)?;
        ensure_len(data, offset, length)?;

        if framing.version == 1 {
            return Self::parse_messages(data, offset, offset + length, framing, state);
        }

        // "OCHK" + messages + checksum(4)
        if length < 8 {
            return Err(FormatError::corrupted("continuation chunk too small"));
        }
        if data[offset..offset + 4] != OCHK_SIGNATURE {
            return Err(FormatError::InvalidSignature {
                expected: "OCHK",
                address,
            });
        }
        verify_checksum(data, offset, length - 4)?;
        Self::parse_messages(data, offset + 4, offset + length - 4, framing, state)
    }
}
