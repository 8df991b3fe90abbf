//! Object header message type identifiers.

/// Header message types defined by the format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Nil,
    Dataspace,
    LinkInfo,
    Datatype,
    FillValueOld,
    FillValue,
    Link,
    ExternalDataFiles,
    DataLayout,
    Bogus,
    GroupInfo,
    FilterPipeline,
    Attribute,
    Comment,
    ModificationTimeOld,
    SharedMessageTable,
    ObjectHeaderContinuation,
    SymbolTable,
    ModificationTime,
    BTreeKValues,
    DriverInfo,
    AttributeInfo,
    ReferenceCount,
    /// Unknown message type with its raw type ID.
    Unknown(u16),
}

impl MessageType {
    /// Convert a raw type ID to a `MessageType`.
    pub fn from_u16(val: u16) -> MessageType {
        match val {
            0x0000 => MessageType::Nil,
            0x0001 => MessageType::Dataspace,
            0x0002 => MessageType::LinkInfo,
            0x0003 => MessageType::Datatype,
            0x0004 => MessageType::FillValueOld,
            0x0005 => MessageType::FillValue,
            0x0006 => MessageType::Link,
            0x0007 => MessageType::ExternalDataFiles,
            0x0008 => MessageType::DataLayout,
            0x0009 => MessageType::Bogus,
            0x000A => MessageType::GroupInfo,
            0x000B => MessageType::FilterPipeline,
            0x000C => MessageType::Attribute,
            0x000D => MessageType::Comment,
            0x000E => MessageType::ModificationTimeOld,
            0x000F => MessageType::SharedMessageTable,
            0x0010 => MessageType::ObjectHeaderContinuation,
            0x0011 => MessageType::SymbolTable,
            0x0012 => MessageType::ModificationTime,
            0x0013 => MessageType::BTreeKValues,
            0x0014 => MessageType::DriverInfo,
            0x0015 => MessageType::AttributeInfo,
            0x0016 => MessageType::ReferenceCount,
            other => MessageType::Unknown(other),
        }
    }

    /// Messages that carry nothing this reader uses and are dropped while
    /// the header is decoded.
    pub fn is_ignored(self) -> bool {
        matches!(
            self,
            MessageType::Nil
                | MessageType::Bogus
                | MessageType::Comment
                | MessageType::ModificationTimeOld
                | MessageType::SharedMessageTable
                | MessageType::BTreeKValues
                | MessageType::DriverInfo
        )
    }
}
