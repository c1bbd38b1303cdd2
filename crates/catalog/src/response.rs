//! The `subsonic-response` JSON envelope

use serde::Deserialize;

use crate::error::CatalogError;
use crate::types::{CatalogId, Child, Index};

#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
    #[serde(rename = "subsonic-response")]
    pub response: Response,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Response {
    pub status: String,
    #[serde(default)]
    pub error: Option<ErrorBody>,
    #[serde(default)]
    pub indexes: Option<Indexes>,
    #[serde(default)]
    pub directory: Option<DirectoryBody>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub code: u32,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Indexes {
    #[serde(default)]
    pub index: Vec<Index>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DirectoryBody {
    pub id: CatalogId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub child: Vec<Child>,
}

impl Envelope {
    /// Decode a response body, turning a `failed` status into an error
    pub fn parse(body: &[u8]) -> Result<Response, CatalogError> {
        let envelope: Envelope = serde_json::from_slice(body)?;
        envelope.response.into_result()
    }
}

impl Response {
    fn into_result(self) -> Result<Self, CatalogError> {
        if self.status == "ok" {
            return Ok(self);
        }

        match self.error {
            Some(err) => Err(CatalogError::from_api(err.code, err.message)),
            None => Err(CatalogError::Api {
                code: 0,
                message: format!("status {}", self.status),
            }),
        }
    }
}
