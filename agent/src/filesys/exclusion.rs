//! Exclusion sets for backup and clear operations

use std::collections::BTreeSet;
use std::ffi::OsStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A set of item names (not paths, not patterns) that are preserved across
/// backup and clear operations. Matching is exact and case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet {
    names: BTreeSet<String>,
}

impl ExclusionSet {
    /// An empty set that excludes nothing
    pub fn none() -> Self {
        Self::default()
    }

    /// Build a set from item names; blank names are ignored
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names = names
            .into_iter()
            .map(|name| name.as_ref().trim().to_lowercase())
            .filter(|name| !name.is_empty())
            .collect();
        Self { names }
    }

    /// Check whether an item name is excluded
    pub fn matches(&self, name: &str) -> bool {
        !self.names.is_empty() && self.names.contains(&name.to_lowercase())
    }

    /// Check an OS file name; names that are not valid unicode never match
    pub fn matches_os(&self, name: &OsStr) -> bool {
        name.to_str().is_some_and(|name| self.matches(name))
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl Serialize for ExclusionSet {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(self.names.iter())
    }
}

impl<'de> Deserialize<'de> for ExclusionSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let names = Vec::<String>::deserialize(deserializer)?;
        Ok(Self::new(names))
    }
}
