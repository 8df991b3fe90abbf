//! netCDF-4 dimension conventions layered on dimension scales.

use nativehdf5_format::Value;

use crate::tree::Node;

/// Prefix of the `NAME` netCDF-4 gives dimensions that are not variables.
const PLACEHOLDER_PREFIX: &str = "This is a netCDF dimension";

fn first_str(value: &Value) -> Option<&str> {
    value.flatten().first().copied().and_then(Value::as_str)
}

fn first_int(value: &Value) -> Option<i64> {
    value.flatten().first().copied().and_then(Value::as_i64)
}

/// The object's own `NAME`, unless it is the netCDF placeholder.
fn own_name(node: &Node) -> Option<&str> {
    node.attribute("NAME")
        .and_then(first_str)
        .filter(|name| !name.starts_with(PLACEHOLDER_PREFIX))
}

/// A bare dimension: a scale without coordinates and without a real name.
pub(crate) fn is_dimension_scale(node: &Node) -> bool {
    node.attribute("CLASS").is_some()
        && node.attribute("_Netcdf4Coordinates").is_none()
        && own_name(node).is_none()
}

/// A group on the path to the current view, with its path relative to
/// the root (`""` for the root, `"a/b"` below it).
pub(crate) struct Scope<'a> {
    pub path: String,
    pub node: &'a Node,
}

/// Dimension names of `node`, a variable whose enclosing groups are
/// `scopes` (root first).
pub(crate) fn dimension_names(root: &Node, scopes: &[Scope<'_>], node: &Node) -> Vec<String> {
    if let Some(coords) = node.attribute("_Netcdf4Coordinates") {
        return coords
            .flatten()
            .into_iter()
            .filter_map(Value::as_i64)
            .map(|id| {
                lookup_dimid(scopes, id).unwrap_or_else(|| {
                    tracing::warn!(variable = %node.name, dimid = id, "dimension id not found");
                    String::new()
                })
            })
            .collect();
    }

    let mut names = Vec::new();
    if let Some(list) = node.attribute("DIMENSION_LIST") {
        for entry in list.flatten() {
            let refs = entry.as_seq().unwrap_or(std::slice::from_ref(entry));
            for address in refs.iter().filter_map(Value::as_reference) {
                match root.find_address(address) {
                    Some(dim) => names.push(dim.name.clone()),
                    None => tracing::warn!(variable = %node.name, address, "dimension reference not found"),
                }
            }
        }
    }
    if !names.is_empty() {
        return names;
    }

    match own_name(node) {
        Some(name) => vec![name.to_string()],
        None => Vec::new(),
    }
}

/// Search the innermost scope outward for a child with this dimension id.
fn lookup_dimid(scopes: &[Scope<'_>], id: i64) -> Option<String> {
    scopes.iter().rev().find_map(|scope| {
        scope
            .node
            .children
            .iter()
            .find(|c| c.attribute("_Netcdf4Dimid").and_then(first_int) == Some(id))
            .map(|c| {
                if scope.path.is_empty() {
                    c.name.clone()
                } else {
                    format!("{}/{}", scope.path, c.name)
                }
            })
    })
}
