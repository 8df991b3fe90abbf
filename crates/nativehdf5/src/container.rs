//! The public view of an open container, scoped to one group.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use nativehdf5_format::{materialize, Value, ValueDecoder};
use nativehdf5_io::ByteSource;

use crate::attributes::Attributes;
use crate::dimensions::{dimension_names, is_dimension_scale, Scope};
use crate::error::Error;
use crate::tree::{Node, Tree};

/// A variable's values with its dimension names and visible attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    /// Nested by dimension, outermost first.
    pub values: Value,
    pub dimensions: Vec<String>,
    pub attributes: Attributes,
}

/// An open netCDF-4/HDF5 container, viewed from one group.
///
/// Views returned by [`Container::get_group`] share the decoded tree and
/// the underlying bytes with the container they came from.
pub struct Container {
    source: ByteSource,
    tree: Arc<Tree>,
    /// `"/"` for the root, otherwise `"/a/b/"`.
    group_name: String,
    /// Child indices from the root to this view's group.
    group: Vec<usize>,
}

impl Container {
    /// Open a container from a filesystem path.
    ///
    /// With the `mmap` feature (default) the file is memory-mapped,
    /// otherwise it is read into memory.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Container, Error> {
        #[cfg(feature = "mmap")]
        let source = ByteSource::open(path)?;
        #[cfg(not(feature = "mmap"))]
        let source = ByteSource::read(path)?;
        Container::from_source(source)
    }

    /// Open a container by reading the whole file into memory.
    pub fn open_buffered<P: AsRef<Path>>(path: P) -> Result<Container, Error> {
        Container::from_source(ByteSource::read(path)?)
    }

    /// Open a container held in memory.
    pub fn from_bytes(data: Vec<u8>) -> Result<Container, Error> {
        Container::from_source(ByteSource::from_vec(data))
    }

    fn from_source(source: ByteSource) -> Result<Container, Error> {
        let tree = Tree::build(source.as_slice())?;
        tracing::debug!(
            len = source.len(),
            superblock = tree.superblock_version,
            shared_datatypes = tree.shared_datatypes,
            "opened container"
        );
        Ok(Container {
            source,
            tree: Arc::new(tree),
            group_name: "/".to_string(),
            group: Vec::new(),
        })
    }

    /// Release this view. Other views keep the file open until dropped.
    pub fn close(self) {
        tracing::debug!(
            group = %self.group_name,
            views = self.source.handle_count(),
            "closing container"
        );
    }

    /// Absolute name of this view's group, with a trailing `/`.
    pub fn group_name(&self) -> &str {
        &self.group_name
    }

    fn group_node(&self) -> Result<&Node, Error> {
        self.tree
            .root
            .descend(&self.group)
            .ok_or_else(|| Error::NotFound(self.group_name.clone()))
    }

    /// The root and every group down to this view's group.
    fn scopes(&self) -> Vec<Scope<'_>> {
        let mut scopes = vec![Scope {
            path: String::new(),
            node: &self.tree.root,
        }];
        let mut node = &self.tree.root;
        for &i in &self.group {
            let Some(child) = node.children.get(i) else {
                break;
            };
            let path = match scopes.last() {
                Some(parent) if !parent.path.is_empty() => format!("{}/{}", parent.path, child.name),
                _ => child.name.clone(),
            };
            scopes.push(Scope { path, node: child });
            node = child;
        }
        scopes
    }

    /// Attributes of this view's group, in creation order.
    pub fn attributes(&self) -> Result<Attributes, Error> {
        Ok(Attributes::visible(&self.group_node()?.attributes))
    }

    /// A view of another group. Paths starting with `/` are absolute,
    /// others are relative to this view.
    pub fn get_group(&self, path: &str) -> Result<Container, Error> {
        let absolute = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("{}{}", self.group_name, path)
        };

        let mut node = &self.tree.root;
        let mut indices = Vec::new();
        let mut group_name = String::from("/");
        for component in absolute.split('/').filter(|c| !c.is_empty()) {
            let (i, child) = node
                .children
                .iter()
                .enumerate()
                .find(|(_, c)| c.is_group && c.name == component)
                .ok_or_else(|| Error::NotFound(path.to_string()))?;
            indices.push(i);
            group_name.push_str(component);
            group_name.push('/');
            node = child;
        }

        tracing::debug!(group = %group_name, "opened group view");
        Ok(Container {
            source: self.source.dup(),
            tree: Arc::clone(&self.tree),
            group_name,
            group: indices,
        })
    }

    /// Names of the groups directly below this one.
    pub fn list_subgroups(&self) -> Result<Vec<String>, Error> {
        Ok(self
            .group_node()?
            .children
            .iter()
            .filter(|c| c.is_group)
            .map(|c| c.name.clone())
            .collect())
    }

    /// Names of the variables in this group. Bare dimensions are left out.
    pub fn list_variables(&self) -> Result<Vec<String>, Error> {
        Ok(self
            .group_node()?
            .children
            .iter()
            .filter(|c| is_variable(c))
            .map(|c| c.name.clone())
            .collect())
    }

    /// Read a variable of this group.
    pub fn get_variable(&self, name: &str) -> Result<Variable, Error> {
        let node = self
            .group_node()?
            .children
            .iter()
            .find(|c| c.name == name && is_variable(c))
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        let dataset = node
            .dataset
            .as_ref()
            .ok_or_else(|| Error::NotFound(name.to_string()))?;

        let file = self.source.as_slice();
        let mut decoder = ValueDecoder::new(file);
        let values = materialize(file, dataset, &mut decoder)?;
        tracing::debug!(
            variable = name,
            elements = values.flat_len(),
            heaps = decoder.cached_heaps(),
            "read variable"
        );

        let dimensions = dimension_names(&self.tree.root, &self.scopes(), node);
        Ok(Variable {
            values,
            dimensions,
            attributes: Attributes::visible(&node.attributes),
        })
    }
}

fn is_variable(node: &Node) -> bool {
    !node.name.is_empty() && node.dataset.is_some() && !is_dimension_scale(node)
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("group_name", &self.group_name)
            .field("len", &self.source.len())
            .finish()
    }
}
