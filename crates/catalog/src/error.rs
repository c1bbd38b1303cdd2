/// Subsonic error code for "user is not authorized for the given operation"
pub const ERROR_NOT_AUTHORIZED: u32 = 50;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Not authorized: {0}")]
    NotAuthorized(String),
    #[error("Server error {code}: {message}")]
    Api { code: u32, message: String },
    #[error("Response is missing `{0}`")]
    MissingField(&'static str),
}

impl CatalogError {
    /// Build the error matching a Subsonic error payload
    pub fn from_api(code: u32, message: impl Into<String>) -> Self {
        let message = message.into();
        if code == ERROR_NOT_AUTHORIZED {
            CatalogError::NotAuthorized(message)
        } else {
            CatalogError::Api { code, message }
        }
    }

    /// Whether the server refused the call for lack of permission
    pub fn is_not_authorized(&self) -> bool {
        matches!(self, CatalogError::NotAuthorized(_))
    }
}
