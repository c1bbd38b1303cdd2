//! Lazy virtual namespace built from catalog responses
//!
//! Nodes are materialized only when a directory is listed. The root lists the
//! catalog's artist indexes; every other directory lists one music directory,
//! expanded into sub-directories, audio variants, videos and cover art files.

mod names;
mod node;
mod tables;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use catalog::{Catalog, CatalogId, Child, Index, MusicDirectory};
use parking_lot::RwLock;

use crate::error::FsError;

pub use names::{
    audio_name, cover_art_name, estimate_transcoded_size, sanitize, video_name,
    ESTIMATE_BITRATE_KBPS,
};
pub use node::{ContentKey, ContentKind, Directory, Entry, File, Node};
pub use tables::NameTables;

/// Builds directory listings and resolves names against the latest listings
pub struct Namespace {
    catalog: Arc<dyn Catalog>,
    tables: RwLock<NameTables>,
}

impl Namespace {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self {
            catalog,
            tables: RwLock::new(NameTables::new()),
        }
    }

    pub fn root(&self) -> Directory {
        Directory::root()
    }

    /// List the artists of the catalog, in catalog order
    pub async fn list_root(&self) -> Result<Vec<Entry>, FsError> {
        let root = Directory::root();
        let indexes = self.catalog.get_indexes().await.map_err(|e| {
            tracing::warn!(error = %e, "Failed to retrieve indexes");
            FsError::not_found(root.path.clone())
        })?;

        let entries = root_entries(&root, &indexes);
        self.tables.write().replace(&root.path, &entries);
        tracing::debug!(count = entries.len(), "Listed root");
        Ok(entries)
    }

    /// List any directory, dispatching to the root listing when needed
    pub async fn list_directory(&self, dir: &Directory) -> Result<Vec<Entry>, FsError> {
        let id = match &dir.id {
            None => return self.list_root().await,
            Some(id) => id,
        };

        let content = self.catalog.get_music_directory(id).await.map_err(|e| {
            tracing::warn!(id = %id, error = %e, "Failed to retrieve directory");
            FsError::not_found(dir.path.clone())
        })?;

        let entries = directory_entries(dir, &content);
        self.tables.write().replace(&dir.path, &entries);
        tracing::debug!(id = %id, path = %dir.path, count = entries.len(), "Listed directory");
        Ok(entries)
    }

    /// Resolve a name in the current listing of `dir`
    pub fn lookup(&self, dir: &Directory, name: &str) -> Result<Node, FsError> {
        self.tables
            .read()
            .lookup(&dir.path, name)
            .cloned()
            .ok_or_else(|| FsError::not_found(dir.child_path(name)))
    }
}

fn root_entries(root: &Directory, indexes: &[Index]) -> Vec<Entry> {
    indexes
        .iter()
        .flat_map(|index| index.artist.iter())
        .map(|artist| {
            let name = sanitize(&artist.name);
            Entry {
                node: Node::Directory(Directory {
                    id: Some(artist.id.clone()),
                    path: root.child_path(&name),
                }),
                name,
            }
        })
        .collect()
}

fn directory_entries(parent: &Directory, content: &MusicDirectory) -> Vec<Entry> {
    let mut entries = Vec::new();
    let mut cover_art: Vec<CatalogId> = Vec::new();

    let mut note_cover_art = |child: &Child| {
        if let Some(id) = &child.cover_art {
            if !id.is_unset() && !cover_art.contains(id) {
                cover_art.push(id.clone());
            }
        }
    };

    for dir in &content.directories {
        let name = sanitize(&dir.title);
        entries.push(Entry {
            node: Node::Directory(Directory {
                id: Some(dir.id.clone()),
                path: parent.child_path(&name),
            }),
            name,
        });
        note_cover_art(dir);
    }

    for track in &content.audio {
        let estimate = estimate_transcoded_size(track.duration.unwrap_or(0));
        let mut variants = Vec::with_capacity(2);
        if !track.suffix.is_empty() {
            // Without a server size the raw file falls back to the duration estimate
            let size = match track.size.filter(|size| *size > 0) {
                Some(size) => (size, true),
                None => (estimate, false),
            };
            variants.push((track.suffix.as_str(), ContentKind::AudioLossless, size));
        }
        if let Some(suffix) = track.transcoded_suffix.as_deref() {
            if !suffix.is_empty() && suffix != track.suffix {
                variants.push((suffix, ContentKind::AudioTranscoded, (estimate, false)));
            }
        }

        for (suffix, kind, size) in variants {
            let name = audio_name(track, suffix);
            entries.push(file_entry(parent, track, name, kind, size));
        }
        note_cover_art(track);
    }

    for video in &content.video {
        let suffix = video
            .transcoded_suffix
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(video.suffix.as_str());
        let name = video_name(video, suffix);
        let size = (video.size.unwrap_or(0), false);
        entries.push(file_entry(parent, video, name, ContentKind::Video, size));
        note_cover_art(video);
    }

    for id in cover_art {
        let name = cover_art_name(&id);
        entries.push(Entry {
            node: Node::File(File {
                id,
                path: parent.child_path(&name),
                name: name.clone(),
                size: 0,
                size_is_exact: false,
                created: UNIX_EPOCH,
                kind: ContentKind::CoverArt,
            }),
            name,
        });
    }

    entries
}

/// `size` is the declared size and whether it is exact
fn file_entry(
    parent: &Directory,
    child: &Child,
    name: String,
    kind: ContentKind,
    (size, size_is_exact): (u64, bool),
) -> Entry {
    Entry {
        node: Node::File(File {
            id: child.id.clone(),
            path: parent.child_path(&name),
            name: name.clone(),
            size,
            size_is_exact,
            created: child.created.map(SystemTime::from).unwrap_or(UNIX_EPOCH),
            kind,
        }),
        name,
    }
}
