//! Catalog client for Subsonic-compatible media servers
//!
//! The filesystem daemon only talks to the remote library through the
//! [`Catalog`] trait. [`SubsonicClient`] is the REST implementation used by the
//! binary; tests substitute an in-process fake.

mod client;
mod error;
mod response;
mod types;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

pub use client::{SubsonicClient, API_VERSION, CLIENT_NAME};
pub use error::{CatalogError, ERROR_NOT_AUTHORIZED};
pub use types::{Artist, CatalogId, Child, Index, MusicDirectory, StreamOptions};

/// Byte stream returned by the content endpoints
pub type ContentStream = BoxStream<'static, Result<Bytes, CatalogError>>;

/// Read access to a remote media catalog
#[async_trait]
pub trait Catalog: Send + Sync + 'static {
    /// Check connectivity and credentials
    async fn ping(&self) -> Result<(), CatalogError>;

    /// Fetch the top-level artist indexes
    async fn get_indexes(&self) -> Result<Vec<Index>, CatalogError>;

    /// Fetch the contents of a single music directory
    async fn get_music_directory(&self, id: &CatalogId) -> Result<MusicDirectory, CatalogError>;

    /// Open a (possibly transcoded) media stream
    async fn stream(
        &self,
        id: &CatalogId,
        options: &StreamOptions,
    ) -> Result<ContentStream, CatalogError>;

    /// Open the original media file, without transcoding
    ///
    /// Servers refuse this with [`CatalogError::NotAuthorized`] when the user
    /// lacks the download role.
    async fn download(&self, id: &CatalogId) -> Result<ContentStream, CatalogError>;

    /// Open a cover art image
    async fn get_cover_art(&self, id: &CatalogId) -> Result<ContentStream, CatalogError>;
}
