//! Decoding one object header into links, attributes and an optional
//! dataset description.
//!
//! Groups keep their links in one of three ways: as link messages in the
//! header, in a fractal heap indexed by a version 2 B-tree ("dense"), or
//! in the legacy symbol table of B-tree v1 nodes and a local heap.
//! Attributes are either header messages or dense in the same way. Every
//! form is expanded eagerly here.

use crate::attribute::AttributeMessage;
use crate::attribute_info::AttributeInfoMessage;
use crate::btree_v1::collect_symbol_table_nodes;
use crate::btree_v2::BTreeV2Header;
use crate::bytes::{read_u32, read_u8};
use crate::data_layout::DataLayout;
use crate::data_read::DatasetInfo;
use crate::dataspace::Dataspace;
use crate::datatype::Datatype;
use crate::error::FormatError;
use crate::fill_value::FillValue;
use crate::filter_pipeline::FilterPipeline;
use crate::fractal_heap::FractalHeap;
use crate::group_info::GroupInfoMessage;
use crate::link_info::LinkInfoMessage;
use crate::link_message::LinkMessage;
use crate::local_heap::LocalHeap;
use crate::message_type::MessageType;
use crate::object_header::ObjectHeader;
use crate::shared_message::SharedTable;
use crate::symbol_table::{SymbolTableMessage, SymbolTableNode};

/// A hard link from a group to a child object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub name: String,
    pub address: u64,
    pub creation_order: Option<u64>,
}

/// A decoded attribute with its position in creation order, if tracked.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub message: AttributeMessage,
    pub creation_order: Option<u64>,
}

impl Attribute {
    pub fn name(&self) -> &str {
        &self.message.name
    }
}

/// Everything this reader uses from one object header.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectInfo {
    pub address: u64,
    /// Children in creation order when tracked, otherwise in stored order.
    pub links: Vec<Link>,
    /// Attributes in creation order when tracked, otherwise in stored order.
    pub attributes: Vec<Attribute>,
    /// Present when the object stores data.
    pub dataset: Option<DatasetInfo>,
    /// A committed datatype carries a datatype but no layout.
    pub datatype: Option<Datatype>,
    pub is_group: bool,
    /// Seconds since the epoch.
    pub modification_time: Option<u32>,
}

/// Header messages gathered before the object is assembled.
#[derive(Default)]
struct Parts {
    dataspace: Option<Dataspace>,
    datatype: Option<Datatype>,
    layout: Option<DataLayout>,
    filters: Option<FilterPipeline>,
    fill_new: Option<FillValue>,
    fill_old: Option<FillValue>,
    link_info: Option<LinkInfoMessage>,
    attribute_info: Option<AttributeInfoMessage>,
    symbol_table: Option<SymbolTableMessage>,
    group_info: Option<GroupInfoMessage>,
    links: Vec<Link>,
    attributes: Vec<Attribute>,
    modification_time: Option<u32>,
}

fn parse_modification_time(data: &[u8]) -> Result<u32, FormatError> {
    let version = read_u8(data, 0)?;
    if version != 1 {
        return Err(FormatError::UnsupportedVersion {
            structure: "modification time",
            version,
        });
    }
    read_u32(data, 4)
}

/// Stable sort by creation order. Entries without one keep their relative
/// order after those that have one.
fn sort_by_creation_order<T>(items: &mut [T], key: impl Fn(&T) -> Option<u64>) {
    if items.iter().any(|i| key(i).is_some()) {
        items.sort_by_key(|i| (key(i).is_none(), key(i).unwrap_or(0)));
    }
}

impl ObjectInfo {
    /// Decode the object whose header is at `address`.
    pub fn decode(
        file: &[u8],
        address: u64,
        shared: &mut SharedTable,
    ) -> Result<ObjectInfo, FormatError> {
        let header = ObjectHeader::parse(file, address)?;
        let mut parts = Parts {
            modification_time: header.modification_time,
            ..Parts::default()
        };

        for msg in &header.messages {
            match msg.msg_type {
                MessageType::Datatype => {
                    parts.datatype = Some(shared.resolve_datatype(file, msg)?);
                }
                MessageType::Attribute => {
                    let body = SharedTable::resolve_body(file, msg)?;
                    parts.attributes.push(Attribute {
                        message: AttributeMessage::parse(&body, file, shared)?,
                        creation_order: msg.creation_order.map(u64::from),
                    });
                }
                MessageType::ReferenceCount | MessageType::ObjectHeaderContinuation => {}
                other => {
                    let body = SharedTable::resolve_body(file, msg)?;
                    Self::apply(&mut parts, other, &body)?;
                }
            }
        }

        if let Some(info) = &parts.link_info {
            if info.is_dense() {
                parts.links.extend(dense_links(file, info)?);
            }
        }
        if let Some(table) = &parts.symbol_table {
            parts.links.extend(symbol_table_links(file, table)?);
        }
        if let Some(info) = &parts.attribute_info {
            parts
                .attributes
                .extend(dense_attributes(file, info, shared)?);
        }
        sort_by_creation_order(&mut parts.links, |l| l.creation_order);
        sort_by_creation_order(&mut parts.attributes, |a| a.creation_order);

        let is_group = parts.layout.is_none()
            && (parts.link_info.is_some()
                || parts.symbol_table.is_some()
                || parts.group_info.is_some()
                || !parts.links.is_empty());

        let dataset = match parts.layout {
            None => None,
            Some(layout) => {
                let dataspace = parts.dataspace.ok_or_else(|| {
                    FormatError::corrupted(format!("dataset at {address:#x} has no dataspace"))
                })?;
                let datatype = parts.datatype.clone().ok_or_else(|| {
                    FormatError::corrupted(format!("dataset at {address:#x} has no datatype"))
                })?;
                Some(DatasetInfo {
                    dataspace,
                    datatype,
                    layout,
                    filters: parts.filters.unwrap_or_default(),
                    fill_value: FillValue::select(parts.fill_new, parts.fill_old),
                })
            }
        };

        tracing::debug!(
            address,
            links = parts.links.len(),
            attributes = parts.attributes.len(),
            is_group,
            is_dataset = dataset.is_some(),
            "decoded object"
        );
        Ok(ObjectInfo {
            address,
            links: parts.links,
            attributes: parts.attributes,
            dataset,
            datatype: parts.datatype,
            is_group,
            modification_time: parts.modification_time,
        })
    }

    fn apply(parts: &mut Parts, msg_type: MessageType, body: &[u8]) -> Result<(), FormatError> {
        match msg_type {
            MessageType::Dataspace => parts.dataspace = Some(Dataspace::parse(body)?),
            MessageType::FillValueOld => parts.fill_old = Some(FillValue::parse_old(body)?),
            MessageType::FillValue => parts.fill_new = Some(FillValue::parse(body)?),
            MessageType::DataLayout => parts.layout = Some(DataLayout::parse(body)?),
            MessageType::FilterPipeline => parts.filters = Some(FilterPipeline::parse(body)?),
            MessageType::Link => {
                let link = LinkMessage::parse(body)?;
                parts.links.push(Link {
                    name: link.name,
                    address: link.address,
                    creation_order: link.creation_order,
                });
            }
            MessageType::LinkInfo => parts.link_info = Some(LinkInfoMessage::parse(body)?),
            MessageType::AttributeInfo => {
                parts.attribute_info = Some(AttributeInfoMessage::parse(body)?)
            }
            MessageType::GroupInfo => parts.group_info = Some(GroupInfoMessage::parse(body)?),
            MessageType::SymbolTable => parts.symbol_table = Some(SymbolTableMessage::parse(body)?),
            MessageType::ModificationTime => {
                parts.modification_time = Some(parse_modification_time(body)?)
            }
            other => tracing::debug!(msg_type = ?other, "header message not used"),
        }
        Ok(())
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name() == name)
    }

    pub fn link(&self, name: &str) -> Option<&Link> {
        self.links.iter().find(|l| l.name == name)
    }
}

/// Records of the creation-order index when there is one, else the name index.
fn index_records(
    file: &[u8],
    name_index: Option<u64>,
    order_index: Option<u64>,
) -> Result<Vec<crate::btree_v2::BTreeV2Record>, FormatError> {
    match order_index.or(name_index) {
        Some(address) => BTreeV2Header::parse(file, address)?.collect_records(file),
        None => Ok(Vec::new()),
    }
}

fn dense_links(file: &[u8], info: &LinkInfoMessage) -> Result<Vec<Link>, FormatError> {
    let Some(heap_address) = info.fractal_heap_address else {
        return Ok(Vec::new());
    };
    let heap = FractalHeap::parse(file, heap_address)?;
    let records = index_records(
        file,
        info.name_index_address,
        info.creation_order_index_address,
    )?;
    let mut links = Vec::with_capacity(records.len());
    for record in &records {
        let body = heap.read_object(file, record.heap_id())?;
        let link = LinkMessage::parse(&body)?;
        links.push(Link {
            name: link.name,
            address: link.address,
            creation_order: link.creation_order.or(record.creation_order()),
        });
    }
    tracing::debug!(heap = heap_address, links = links.len(), "expanded dense links");
    Ok(links)
}

fn dense_attributes(
    file: &[u8],
    info: &AttributeInfoMessage,
    shared: &mut SharedTable,
) -> Result<Vec<Attribute>, FormatError> {
    let Some(heap_address) = info.fractal_heap_address else {
        return Ok(Vec::new());
    };
    let heap = FractalHeap::parse(file, heap_address)?;
    let records = index_records(
        file,
        info.name_index_address,
        info.creation_order_index_address,
    )?;
    let mut attributes = Vec::with_capacity(records.len());
    for record in &records {
        let body = heap.read_object(file, record.heap_id())?;
        attributes.push(Attribute {
            message: AttributeMessage::parse(&body, file, shared)?,
            creation_order: record.creation_order(),
        });
    }
    tracing::debug!(heap = heap_address, attributes = attributes.len(), "expanded dense attributes");
    Ok(attributes)
}

fn symbol_table_links(file: &[u8], table: &SymbolTableMessage) -> Result<Vec<Link>, FormatError> {
    let heap = LocalHeap::parse(file, table.local_heap_address)?;
    let mut links = Vec::new();
    for node_address in collect_symbol_table_nodes(file, table.btree_address)? {
        let node = SymbolTableNode::parse(file, node_address)?;
        for entry in node.entries {
            let address = entry.object_header_address.ok_or_else(|| {
                FormatError::corrupted("symbol table entry without an object header")
            })?;
            let name = heap.read_string(file, entry.link_name_offset)?;
            if entry.cache_type == 2 {
                return Err(FormatError::unsupported(format!("soft link \"{name}\"")));
            }
            links.push(Link {
                name,
                address,
                creation_order: None,
            });
        }
    }
    Ok(links)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::attribute::tests::{build_attribute, scalar_space, simple_space};
    use crate::btree_v1::tests::build_group_node;
    use crate::btree_v2::tests::{build_header as build_bthd, build_leaf};
    use crate::datatype::tests::{fixed_point, fixed_string};
    use crate::error::ErrorKind;
    use crate::fractal_heap::tests::{build_direct_block, build_header as build_frhp, managed_id};
    use crate::link_message::tests::build_hard_link;
    use crate::local_heap::tests::build_local_heap;
    use crate::object_header::tests::{build_v1_header, build_v2_header};

    fn link_info(heap: u64, name_index: u64) -> Vec<u8> {
        let mut buf = vec![0, 0];
        buf.extend_from_slice(&heap.to_le_bytes());
        buf.extend_from_slice(&name_index.to_le_bytes());
        buf
    }

    #[test]
    fn compact_group_with_ordered_links_and_attributes() {
        let a1 = build_attribute("units", &fixed_string(1, 0), &scalar_space(), b"m");
        let a0 = build_attribute("count", &fixed_point(2, false, false), &simple_space(&[2]), &[1, 0, 2, 0]);
        let l1 = build_hard_link("second", 0x800, Some(1));
        let l0 = build_hard_link("first", 0x900, Some(0));
        let file = build_v2_header(
            0x04,
            &[(0x0C, &a0, 0), (0x0C, &a1, 0), (0x06, &l1, 0), (0x06, &l0, 0)],
        );

        let obj = ObjectInfo::decode(&file, 0, &mut SharedTable::new()).unwrap();
        assert!(obj.is_group);
        assert!(obj.dataset.is_none());
        let names: Vec<&str> = obj.links.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
        let attrs: Vec<&str> = obj.attributes.iter().map(Attribute::name).collect();
        assert_eq!(attrs, vec!["count", "units"]);
        assert_eq!(obj.attribute("units").unwrap().message.raw_data, b"m");
        assert_eq!(obj.link("second").unwrap().address, 0x800);
    }

    #[test]
    fn contiguous_dataset_description() {
        let space = simple_space(&[3]);
        let dt = fixed_point(4, true, false);
        let mut layout = vec![3, 1];
        layout.extend_from_slice(&0x400u64.to_le_bytes());
        layout.extend_from_slice(&12u64.to_le_bytes());
        let fill = [3u8, 0x20 | 0x02, 4, 0, 0, 0, 9, 0, 0, 0];
        let file = build_v1_header(&[(0x01, &space, 0), (0x03, &dt, 1), (0x05, &fill, 1), (0x08, &layout, 0)]);

        let obj = ObjectInfo::decode(&file, 0, &mut SharedTable::new()).unwrap();
        assert!(!obj.is_group);
        let ds = obj.dataset.unwrap();
        assert_eq!(ds.dataspace.dimensions, vec![3]);
        assert_eq!(ds.datatype.size(), 4);
        assert_eq!(ds.fill_value, FillValue::Bytes(vec![9, 0, 0, 0]));
        assert!(ds.filters.is_empty());
    }

    #[test]
    fn layout_without_datatype_is_corruption() {
        let space = simple_space(&[3]);
        let mut layout = vec![3, 1];
        layout.extend_from_slice(&u64::MAX.to_le_bytes());
        layout.extend_from_slice(&0u64.to_le_bytes());
        let file = build_v1_header(&[(0x01, &space, 0), (0x08, &layout, 0)]);
        let err = ObjectInfo::decode(&file, 0, &mut SharedTable::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupted);
    }

    #[test]
    fn dense_links_through_heap_and_btree() {
        // [object header][FRHP at h][FHDB at h+146][BTHD][BTLF]
        let zeta = build_hard_link("zeta", 0x1000, None);
        let alpha = build_hard_link("alpha", 0x2000, None);
        let header_len = build_v2_header(0, &[(0x02, &link_info(0, 0), 0)]).len() as u64;
        let heap_addr = header_len;
        let block_addr = heap_addr + 146;
        let bthd_addr = block_addr + 512;
        let leaf_addr = bthd_addr + 38;

        let mut rec_a = 7u32.to_le_bytes().to_vec();
        rec_a.extend(managed_id(40, alpha.len() as u16));
        let mut rec_z = 9u32.to_le_bytes().to_vec();
        rec_z.extend(managed_id(80, zeta.len() as u16));

        let mut file = build_v2_header(0, &[(0x02, &link_info(heap_addr, bthd_addr), 0)]);
        file.extend(build_frhp(0, 512, 4096, block_addr, 0));
        file.extend(build_direct_block(0, 512, &[(40, &alpha), (80, &zeta)], false));
        file.extend(build_bthd(5, 512, 11, 0, leaf_addr, 2, 2));
        file.extend(build_leaf(5, &[rec_a, rec_z]));

        let obj = ObjectInfo::decode(&file, 0, &mut SharedTable::new()).unwrap();
        assert!(obj.is_group);
        let links: Vec<(&str, u64)> = obj.links.iter().map(|l| (l.name.as_str(), l.address)).collect();
        assert_eq!(links, vec![("alpha", 0x2000), ("zeta", 0x1000)]);
    }

    #[test]
    fn legacy_symbol_table_group() {
        // [header][HEAP + segment][TREE][SNOD]
        let mut stab = Vec::new();
        stab.extend_from_slice(&0u64.to_le_bytes());
        stab.extend_from_slice(&0u64.to_le_bytes());
        let header_len = build_v1_header(&[(0x11, &stab, 0)]).len() as u64;

        let segment = b"\0lat\0lon\0\0\0\0";
        let heap_addr = header_len;
        let tree_addr = heap_addr + 32 + segment.len() as u64;
        let snod_addr = tree_addr + build_group_node(0, &[0]).len() as u64;

        let mut stab = Vec::new();
        stab.extend_from_slice(&tree_addr.to_le_bytes());
        stab.extend_from_slice(&heap_addr.to_le_bytes());
        let mut file = build_v1_header(&[(0x11, &stab, 0)]);
        file.extend(build_local_heap(heap_addr, segment));
        file.extend(build_group_node(0, &[snod_addr]));

        file.extend_from_slice(b"SNOD");
        file.extend_from_slice(&[1, 0, 2, 0]);
        for (name_offset, addr) in [(1u64, 0x500u64), (5, 0x600)] {
            file.extend_from_slice(&name_offset.to_le_bytes());
            file.extend_from_slice(&addr.to_le_bytes());
            file.extend_from_slice(&[0u8; 24]);
        }

        let obj = ObjectInfo::decode(&file, 0, &mut SharedTable::new()).unwrap();
        assert!(obj.is_group);
        let links: Vec<(&str, u64)> = obj.links.iter().map(|l| (l.name.as_str(), l.address)).collect();
        assert_eq!(links, vec![("lat", 0x500), ("lon", 0x600)]);
    }

    #[test]
    fn soft_link_fails_decode() {
        let mut soft = vec![1, 0x08, 1, 1, b'x'];
        soft.extend_from_slice(&2u16.to_le_bytes());
        soft.extend_from_slice(b"/y");
        let file = build_v2_header(0, &[(0x06, &soft, 0)]);
        let err = ObjectInfo::decode(&file, 0, &mut SharedTable::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFeature);
    }
}
