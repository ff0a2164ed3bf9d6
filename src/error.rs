use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("bearer token is not in a recognizable format")]
    MalformedToken,
    #[error("token payload is not valid base64: {0}")]
    PayloadEncoding(#[from] base64::DecodeError),
    #[error("token claims are not valid JSON: {0}")]
    Claims(#[from] serde_json::Error),
    #[error("channel authorization request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("channel authorization denied with status {0}")]
    Denied(reqwest::StatusCode),
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("conversation snapshot request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("conversation snapshot returned status {0}")]
    Status(reqwest::StatusCode),
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("websocket connect failed: {0}")]
    Connect(tokio_tungstenite::tungstenite::Error),
    #[error("websocket transport failed: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("no connection handshake within {0:?}")]
    HandshakeTimeout(Duration),
    #[error("channel authorization failed: {0}")]
    Authorize(#[from] AuthError),
    #[error("subscription rejected: {0}")]
    SubscriptionRejected(String),
    #[error("unexpected frame during handshake: {0}")]
    Protocol(String),
    #[error("socket closed before subscription completed")]
    ClosedDuringHandshake,
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error("http client setup failed: {0}")]
    Http(#[from] reqwest::Error),
}
