//! Inode allocation for namespace nodes
//!
//! FUSE identifies entries by 64-bit inode numbers while the namespace speaks
//! in paths. Each path seen in a listing or lookup gets a stable inode, and the
//! table remembers the most recent node registered under it.

use std::collections::HashMap;

use crate::namespace::{Directory, Node};

#[derive(Debug)]
pub struct InodeTable {
    path_to_inode: HashMap<String, u64>,
    nodes: HashMap<u64, Node>,
    /// Next available inode number (1 is reserved for root)
    next_inode: u64,
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl InodeTable {
    /// Root inode number (always 1 in FUSE)
    pub const ROOT_INODE: u64 = 1;

    /// Create a new inode table with root pre-registered
    pub fn new() -> Self {
        let root = Directory::root();
        let mut table = Self {
            path_to_inode: HashMap::new(),
            nodes: HashMap::new(),
            next_inode: 2,
        };
        table.path_to_inode.insert(root.path.clone(), Self::ROOT_INODE);
        table.nodes.insert(Self::ROOT_INODE, Node::Directory(root));
        table
    }

    /// Register `node` under its path, reusing the inode if the path is known.
    ///
    /// A re-listed path keeps its inode but takes the newer node.
    pub fn upsert(&mut self, node: Node) -> u64 {
        let path = Self::normalize_path(node.path());

        let inode = match self.path_to_inode.get(&path) {
            Some(&inode) => inode,
            None => {
                let inode = self.next_inode;
                self.next_inode += 1;
                self.path_to_inode.insert(path, inode);
                inode
            }
        };
        self.nodes.insert(inode, node);
        inode
    }

    pub fn get(&self, inode: u64) -> Option<&Node> {
        self.nodes.get(&inode)
    }

    pub fn get_inode(&self, path: &str) -> Option<u64> {
        self.path_to_inode.get(&Self::normalize_path(path)).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Inode of the parent directory of `path`; root is its own parent
    pub fn parent_inode(&self, path: &str) -> u64 {
        self.get_inode(&Self::parent_path(path))
            .unwrap_or(Self::ROOT_INODE)
    }

    fn normalize_path(path: &str) -> String {
        if path.is_empty() || path == "/" {
            return "/".to_string();
        }

        let mut normalized = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };

        if normalized.len() > 1 && normalized.ends_with('/') {
            normalized.pop();
        }

        normalized
    }

    pub fn parent_path(path: &str) -> String {
        let normalized = Self::normalize_path(path);
        match normalized.rfind('/') {
            Some(0) | None => "/".to_string(),
            Some(pos) => normalized[..pos].to_string(),
        }
    }
}
