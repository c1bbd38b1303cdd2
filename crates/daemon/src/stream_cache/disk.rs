//! Byte-budgeted on-disk cache table
//!
//! Tracks admitted entries and their aggregate size. The table itself does no
//! I/O; callers write the temp file first and then ask the table to register
//! it, so usage always equals the sum of registered entry sizes.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::namespace::ContentKey;

/// A cached item whose bytes live in a local temp file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub path: PathBuf,
    pub size: u64,
}

/// Outcome of the admission policy for one item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admit,
    /// Usage already at or above the budget
    Full,
    /// The item would push usage past the budget
    WouldOverflow,
    /// The item exceeds the per-item ceiling
    TooLarge,
    /// An entry for the key is already registered
    Present,
    /// The cache has been purged for shutdown
    Closed,
}

#[derive(Debug)]
pub struct DiskCache {
    entries: HashMap<ContentKey, CacheEntry>,
    usage: u64,
    budget: u64,
    max_item: u64,
    closed: bool,
}

impl DiskCache {
    pub fn new(budget: u64, max_item: u64) -> Self {
        Self {
            entries: HashMap::new(),
            usage: 0,
            budget,
            max_item,
            closed: false,
        }
    }

    pub fn get(&self, key: &ContentKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &ContentKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn usage(&self) -> u64 {
        self.usage
    }

    pub fn budget(&self) -> u64 {
        self.budget
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Apply the admission policy to an item of `size` bytes
    pub fn admission(&self, size: u64) -> Admission {
        if self.closed {
            Admission::Closed
        } else if self.usage >= self.budget {
            Admission::Full
        } else if self.usage + size > self.budget {
            Admission::WouldOverflow
        } else if size > self.max_item {
            Admission::TooLarge
        } else {
            Admission::Admit
        }
    }

    /// Register an entry if the policy still admits it.
    ///
    /// On rejection the entry is handed back so the caller can remove its file.
    pub fn insert(&mut self, key: ContentKey, entry: CacheEntry) -> Result<(), (Admission, CacheEntry)> {
        if self.entries.contains_key(&key) {
            return Err((Admission::Present, entry));
        }
        match self.admission(entry.size) {
            Admission::Admit => {
                self.usage += entry.size;
                self.entries.insert(key, entry);
                Ok(())
            }
            rejected => Err((rejected, entry)),
        }
    }

    /// Drop an entry, returning it so the caller can clean up its file
    pub fn evict(&mut self, key: &ContentKey) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.usage -= entry.size;
        Some(entry)
    }

    /// Remove every entry and refuse further admissions
    pub fn drain(&mut self) -> Vec<CacheEntry> {
        self.closed = true;
        self.usage = 0;
        self.entries.drain().map(|(_, entry)| entry).collect()
    }
}

/// Persist bytes to a new temp file in `dir`, returning its path.
///
/// The file is removed again if any write fails.
pub fn write_temp_file(dir: &Path, prefix: &str, data: &[u8]) -> std::io::Result<PathBuf> {
    let mut file = tempfile::Builder::new().prefix(prefix).tempfile_in(dir)?;
    file.write_all(data)?;
    file.flush()?;
    let (_, path) = file.keep().map_err(|e| e.error)?;
    Ok(path)
}
