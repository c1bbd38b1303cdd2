//! Directory and file nodes of the virtual namespace

use std::fmt;
use std::time::SystemTime;

use catalog::CatalogId;

/// What kind of content a file exposes, which decides the endpoint used to fetch it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    /// Original file, fetched through the download endpoint
    AudioLossless,
    /// Server-side transcode, fetched through the stream endpoint
    AudioTranscoded,
    /// Video transcoded to a fixed resolution
    Video,
    CoverArt,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::AudioLossless => "audio-lossless",
            ContentKind::AudioTranscoded => "audio-transcoded",
            ContentKind::Video => "video",
            ContentKind::CoverArt => "cover-art",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of fetchable content: the same remote id yields different bytes per kind
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentKey {
    pub kind: ContentKind,
    pub id: CatalogId,
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// A directory; the namespace root has no remote id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    pub id: Option<CatalogId>,
    /// Path relative to the mount root, always starting with `/`
    pub path: String,
}

impl Directory {
    pub fn root() -> Self {
        Self {
            id: None,
            path: "/".to_string(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.id.is_none()
    }

    /// Path of a child entry with the given (already sanitized) name
    pub fn child_path(&self, name: &str) -> String {
        if self.path == "/" {
            format!("/{}", name)
        } else {
            format!("{}/{}", self.path, name)
        }
    }
}

/// A readable file backed by remote content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    pub id: CatalogId,
    pub name: String,
    pub path: String,
    /// Declared size; an estimate unless `size_is_exact`
    pub size: u64,
    /// True only when the server reported the byte size of exactly this content
    pub size_is_exact: bool,
    pub created: SystemTime,
    pub kind: ContentKind,
}

impl File {
    pub fn key(&self) -> ContentKey {
        ContentKey {
            kind: self.kind,
            id: self.id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Directory(Directory),
    File(File),
}

impl Node {
    pub fn path(&self) -> &str {
        match self {
            Node::Directory(dir) => &dir.path,
            Node::File(file) => &file.path,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Node::Directory(_))
    }
}

/// One entry of a directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub node: Node,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_path() {
        let root = Directory::root();
        assert_eq!(root.child_path("A"), "/A");

        let dir = Directory {
            id: Some(CatalogId::from(1)),
            path: "/A".into(),
        };
        assert_eq!(dir.child_path("Album"), "/A/Album");
    }

    #[test]
    fn test_content_key_distinguishes_variants() {
        let lossless = ContentKey {
            kind: ContentKind::AudioLossless,
            id: CatalogId::from(5),
        };
        let transcoded = ContentKey {
            kind: ContentKind::AudioTranscoded,
            id: CatalogId::from(5),
        };
        assert_ne!(lossless, transcoded);
        assert_eq!(lossless.to_string(), "audio-lossless:5");
    }
}
