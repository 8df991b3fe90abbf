//! Ordered attribute maps and the netCDF-4 bookkeeping filter.

use nativehdf5_format::Value;

/// Attributes netCDF-4 writes for its own use.
pub const HIDDEN_ATTRIBUTES: [&str; 6] = [
    "_Netcdf4Dimid",
    "_Netcdf4Coordinates",
    "DIMENSION_LIST",
    "NAME",
    "REFERENCE_LIST",
    "CLASS",
];

/// Name to value map that keeps on-disk creation order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes {
    entries: Vec<(String, Value)>,
}

impl Attributes {
    pub fn new() -> Attributes {
        Attributes::default()
    }

    /// Project a decoded attribute list, dropping the hidden names.
    pub(crate) fn visible(all: &[(String, Value)]) -> Attributes {
        let entries = all
            .iter()
            .filter(|(name, _)| !HIDDEN_ATTRIBUTES.contains(&name.as_str()))
            .cloned()
            .collect();
        Attributes { entries }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for Attributes {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
