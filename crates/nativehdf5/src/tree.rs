//! The object tree, decoded in full when a container is opened.

use nativehdf5_format::attribute::AttributeMessage;
use nativehdf5_format::bytes::UNDEFINED_ADDRESS;
use nativehdf5_format::dataspace::DataspaceType;
use nativehdf5_format::{
    DatasetInfo, FormatError, ObjectInfo, SharedTable, Superblock, Value, ValueDecoder,
};

/// One object, named by the link that reached it.
#[derive(Debug, Clone)]
pub(crate) struct Node {
    /// Link name; empty for the root.
    pub name: String,
    pub address: u64,
    pub is_group: bool,
    /// Decoded attribute values in creation order.
    pub attributes: Vec<(String, Value)>,
    pub dataset: Option<DatasetInfo>,
    pub modification_time: Option<u32>,
    /// Children in creation order.
    pub children: Vec<Node>,
}

impl Node {
    fn empty_root() -> Node {
        Node {
            name: String::new(),
            address: UNDEFINED_ADDRESS,
            is_group: true,
            attributes: Vec::new(),
            dataset: None,
            modification_time: None,
            children: Vec::new(),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// The first node at `address` in depth-first order, self included.
    pub fn find_address(&self, address: u64) -> Option<&Node> {
        if self.address == address {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_address(address))
    }

    /// Walk a path of child indices.
    pub fn descend(&self, path: &[usize]) -> Option<&Node> {
        path.iter()
            .try_fold(self, |node, &i| node.children.get(i))
    }
}

#[derive(Debug)]
pub(crate) struct Tree {
    pub superblock_version: u8,
    pub root: Node,
    /// Committed datatypes decoded while building.
    pub shared_datatypes: usize,
}

impl Tree {
    /// Parse the superblock and decode every object reachable from the root.
    pub fn build(file: &[u8]) -> Result<Tree, FormatError> {
        let superblock = Superblock::parse(file)?;
        let mut builder = Builder {
            file,
            shared: SharedTable::new(),
            decoder: ValueDecoder::new(file),
            ancestors: Vec::new(),
        };
        let root = if superblock.root_object_header_address == UNDEFINED_ADDRESS {
            tracing::warn!("superblock has no root object");
            Node::empty_root()
        } else {
            let mut root = builder.node(String::new(), superblock.root_object_header_address)?;
            root.is_group = true;
            root
        };
        tracing::debug!(
            version = superblock.version,
            children = root.children.len(),
            shared_datatypes = builder.shared.len(),
            heaps = builder.decoder.cached_heaps(),
            "decoded object tree"
        );
        Ok(Tree {
            superblock_version: superblock.version,
            root,
            shared_datatypes: builder.shared.len(),
        })
    }
}

struct Builder<'a> {
    file: &'a [u8],
    shared: SharedTable,
    decoder: ValueDecoder<'a>,
    /// Addresses on the path from the root to the node being built.
    ancestors: Vec<u64>,
}

impl<'a> Builder<'a> {
    fn node(&mut self, name: String, address: u64) -> Result<Node, FormatError> {
        let info = ObjectInfo::decode(self.file, address, &mut self.shared)?;

        let mut attributes = Vec::with_capacity(info.attributes.len());
        for attr in &info.attributes {
            let value = self.attribute_value(&attr.message).map_err(|e| {
                tracing::debug!(address, attribute = attr.name(), error = %e, "attribute decode failed");
                e
            })?;
            attributes.push((attr.name().to_string(), value));
        }

        self.ancestors.push(address);
        let mut children = Vec::with_capacity(info.links.len());
        for link in &info.links {
            if self.ancestors.contains(&link.address) {
                tracing::warn!(name = %link.name, address = link.address, "skipping link to an enclosing group");
                continue;
            }
            children.push(self.node(link.name.clone(), link.address)?);
        }
        self.ancestors.pop();

        Ok(Node {
            name,
            address,
            is_group: info.is_group,
            attributes,
            dataset: info.dataset,
            modification_time: info.modification_time,
            children,
        })
    }

    /// Null dataspaces carry no value and read as an empty string.
    fn attribute_value(&mut self, msg: &AttributeMessage) -> Result<Value, FormatError> {
        match msg.dataspace.space_type {
            DataspaceType::Null => Ok(Value::Str(String::new())),
            DataspaceType::Scalar | DataspaceType::Simple => {
                self.decoder
                    .decode_array(&msg.datatype, &msg.dataspace.dimensions, &msg.raw_data)
            }
        }
    }
}
