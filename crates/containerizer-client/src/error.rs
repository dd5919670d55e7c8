use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("WebSocket connect failed: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// Any response other than `200 OK`. Headers and body are kept for diagnostics.
    #[error("control plane returned {status}: {body}")]
    ControlPlane {
        status: StatusCode,
        headers: HeaderMap,
        body: String,
    },

    #[error("run stream failed: {0}")]
    Stream(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl ClientError {
    /// Status of a rejected control-plane call, if this is one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::ControlPlane { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
