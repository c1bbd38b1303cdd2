//! Name → node lookup tables
//!
//! One table per listed directory, keyed by the directory's path. Listing a
//! directory again replaces its table wholesale; names are only resolvable in
//! a directory that has been listed.

use std::collections::HashMap;

use super::node::{Entry, Node};

#[derive(Debug, Default)]
pub struct NameTables {
    listings: HashMap<String, HashMap<String, Node>>,
}

impl NameTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the table for a directory, dropping the previous one.
    ///
    /// Duplicate names within the listing overwrite earlier entries.
    pub fn replace(&mut self, dir_path: &str, entries: &[Entry]) {
        let table = entries
            .iter()
            .map(|entry| (entry.name.clone(), entry.node.clone()))
            .collect();
        self.listings.insert(dir_path.to_string(), table);
    }

    /// Exact-match lookup in the current table of `dir_path`
    pub fn lookup(&self, dir_path: &str, name: &str) -> Option<&Node> {
        self.listings.get(dir_path)?.get(name)
    }

    /// Whether the directory has been listed in this table generation
    pub fn is_listed(&self, dir_path: &str) -> bool {
        self.listings.contains_key(dir_path)
    }

    /// Number of names registered for a directory
    pub fn len(&self, dir_path: &str) -> usize {
        self.listings.get(dir_path).map(HashMap::len).unwrap_or(0)
    }
}
