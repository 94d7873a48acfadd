use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("The access token was rejected")]
    Unauthorized,
    #[error("Unexpected response status {0}")]
    Status(u16),
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Malformed response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Invalid endpoint URL: {0}")]
    Endpoint(#[from] url::ParseError),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to access token slot at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("Failed to open the authorization page: {0}")]
    Navigation(#[source] std::io::Error),
}
