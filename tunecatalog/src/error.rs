//! Error types for catalog lookups

use thiserror::Error;

/// Result type for tunecatalog
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Errors raised while talking to a catalog or search provider
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Unexpected response body
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Malformed URL
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Credentials rejected (401/403)
    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    /// Track, playlist or search hit not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Provider asked us to slow down
    #[error("Rate limit exceeded, please try again later")]
    RateLimitExceeded,

    /// Any other non-success status
    #[error("API error (code {code}): {message}")]
    ApiError { code: u16, message: String },

    /// The URL does not belong to any configured catalog
    #[error("Unsupported URL: {0}")]
    UnsupportedUrl(String),

    /// Missing credentials or provider
    #[error("Catalog configuration error: {0}")]
    Configuration(String),
}

impl CatalogError {
    /// Builds an error from an HTTP status code and response body
    pub fn from_status_code(code: u16, message: impl Into<String>) -> Self {
        match code {
            401 | 403 => Self::Unauthorized(message.into()),
            404 => Self::NotFound(message.into()),
            429 => Self::RateLimitExceeded,
            _ => Self::ApiError {
                code,
                message: message.into(),
            },
        }
    }

    pub fn is_auth_error(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_code() {
        assert!(CatalogError::from_status_code(401, "bad token").is_auth_error());
        assert!(CatalogError::from_status_code(404, "gone").is_not_found());
        assert!(matches!(
            CatalogError::from_status_code(429, ""),
            CatalogError::RateLimitExceeded
        ));
        assert!(matches!(
            CatalogError::from_status_code(500, "boom"),
            CatalogError::ApiError { code: 500, .. }
        ));
    }
}
