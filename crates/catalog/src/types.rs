//! Catalog data types, decoded from Subsonic JSON responses

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Opaque identifier of a catalog item
///
/// Older servers send numeric ids, newer ones send strings; both decode into
/// the same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CatalogId(String);

impl CatalogId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Servers use an empty or zero id for "no item" (e.g. missing cover art)
    pub fn is_unset(&self) -> bool {
        self.0.is_empty() || self.0 == "0"
    }
}

impl fmt::Display for CatalogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for CatalogId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for CatalogId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for CatalogId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Num(i64),
            Str(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Num(n) => CatalogId::from(n),
            RawId::Str(s) => CatalogId(s),
        })
    }
}

/// One alphabetical index bucket of artists
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Index {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artist: Vec<Artist>,
}

/// An artist (top-level directory) listed in the indexes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artist {
    pub id: CatalogId,
    pub name: String,
}

/// An entry inside a music directory: sub-directory, audio track or video
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Child {
    pub id: CatalogId,
    #[serde(default)]
    pub is_dir: bool,
    #[serde(default)]
    pub is_video: bool,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub track: Option<u32>,
    #[serde(default)]
    pub suffix: String,
    #[serde(default)]
    pub transcoded_suffix: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    /// Duration in seconds
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    pub cover_art: Option<CatalogId>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created: Option<DateTime<Utc>>,
}

impl Default for CatalogId {
    fn default() -> Self {
        Self(String::new())
    }
}

/// Contents of a music directory, partitioned by entry type
#[derive(Debug, Clone, Default)]
pub struct MusicDirectory {
    pub id: CatalogId,
    pub name: String,
    pub directories: Vec<Child>,
    pub audio: Vec<Child>,
    pub video: Vec<Child>,
}

impl MusicDirectory {
    /// Split raw children into directories, audio and video, keeping server order
    pub fn from_children(id: CatalogId, name: String, children: Vec<Child>) -> Self {
        let mut dir = Self {
            id,
            name,
            ..Default::default()
        };
        for child in children {
            if child.is_dir {
                dir.directories.push(child);
            } else if child.is_video {
                dir.video.push(child);
            } else {
                dir.audio.push(child);
            }
        }
        dir
    }
}

/// Extra parameters for the stream endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamOptions {
    /// Requested video resolution, e.g. `1280x720`
    pub size: Option<String>,
}

impl StreamOptions {
    pub fn video(size: impl Into<String>) -> Self {
        Self {
            size: Some(size.into()),
        }
    }
}

// Servers disagree on timestamp formats; an unparseable one is treated as absent.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|ts| ts.with_timezone(&Utc))
    }))
}
