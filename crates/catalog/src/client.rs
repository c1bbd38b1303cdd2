use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Response as HttpResponse};
use url::Url;

use crate::error::CatalogError;
use crate::response::{Envelope, Response};
use crate::types::{CatalogId, Index, MusicDirectory, StreamOptions};
use crate::{Catalog, ContentStream};

/// Subsonic REST API version we speak
pub const API_VERSION: &str = "1.8.0";
/// Client name reported to the server
pub const CLIENT_NAME: &str = "subfs";

/// REST client for a Subsonic-compatible server
#[derive(Debug, Clone)]
pub struct SubsonicClient {
    base: Url,
    user: String,
    password: String,
    client: Client,
}

impl SubsonicClient {
    pub fn new(host: &Url, user: &str, password: &str) -> Result<Self, CatalogError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_NAME));
        let client = Client::builder().default_headers(default_headers).build()?;

        // Url::join replaces the last segment unless the base ends with '/'
        let mut root = host.clone();
        if !root.path().ends_with('/') {
            let path = format!("{}/", root.path());
            root.set_path(&path);
        }
        let base = root.join("rest/")?;

        Ok(Self {
            base,
            user: user.to_string(),
            password: password.to_string(),
            client,
        })
    }

    /// Get the REST base URL
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Build the URL of an API method, including authentication parameters
    pub fn endpoint(&self, method: &str, params: &[(&str, &str)]) -> Result<Url, CatalogError> {
        let mut url = self.base.join(&format!("{}.view", method))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("u", &self.user)
                .append_pair("p", &format!("enc:{}", hex::encode(&self.password)))
                .append_pair("v", API_VERSION)
                .append_pair("c", CLIENT_NAME)
                .append_pair("f", "json");
            for (key, value) in params {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn call(&self, method: &str, params: &[(&str, &str)]) -> Result<Response, CatalogError> {
        let url = self.endpoint(method, params)?;
        tracing::debug!(method, "Catalog request");

        let response = self.client.get(url).send().await?.error_for_status()?;
        let body = response.bytes().await?;
        Envelope::parse(&body)
    }

    async fn open(&self, method: &str, params: &[(&str, &str)]) -> Result<ContentStream, CatalogError> {
        let url = self.endpoint(method, params)?;
        tracing::debug!(method, "Opening catalog stream");

        let response = self.client.get(url).send().await?.error_for_status()?;

        // Binary endpoints report failures as a regular JSON envelope
        if is_error_body(&response) {
            let body = response.bytes().await?;
            Envelope::parse(&body)?;
            return Err(CatalogError::MissingField("binary content"));
        }

        Ok(response.bytes_stream().map_err(CatalogError::from).boxed())
    }
}

fn is_error_body(response: &HttpResponse) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with("application/json") || value.starts_with("text/xml"))
        .unwrap_or(false)
}

#[async_trait]
impl Catalog for SubsonicClient {
    async fn ping(&self) -> Result<(), CatalogError> {
        self.call("ping", &[]).await.map(|_| ())
    }

    async fn get_indexes(&self) -> Result<Vec<Index>, CatalogError> {
        let response = self.call("getIndexes", &[]).await?;
        let indexes = response
            .indexes
            .ok_or(CatalogError::MissingField("indexes"))?;
        Ok(indexes.index)
    }

    async fn get_music_directory(&self, id: &CatalogId) -> Result<MusicDirectory, CatalogError> {
        let response = self
            .call("getMusicDirectory", &[("id", id.as_str())])
            .await?;
        let directory = response
            .directory
            .ok_or(CatalogError::MissingField("directory"))?;
        Ok(MusicDirectory::from_children(
            directory.id,
            directory.name,
            directory.child,
        ))
    }

    async fn stream(
        &self,
        id: &CatalogId,
        options: &StreamOptions,
    ) -> Result<ContentStream, CatalogError> {
        let mut params = vec![("id", id.as_str())];
        if let Some(size) = options.size.as_deref() {
            params.push(("size", size));
        }
        self.open("stream", &params).await
    }

    async fn download(&self, id: &CatalogId) -> Result<ContentStream, CatalogError> {
        self.open("download", &[("id", id.as_str())]).await
    }

    async fn get_cover_art(&self, id: &CatalogId) -> Result<ContentStream, CatalogError> {
        self.open("getCoverArt", &[("id", id.as_str())]).await
    }
}
