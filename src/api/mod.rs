//! Analysis service boundary
//!
//! `SessionApi` carries the session lifecycle and per-frame calls the
//! coordinator depends on; `CatalogApi` is the read-through lookup of
//! exercises and instructions used by the console.

mod client;
pub mod data_uri;
mod wire;

pub use client::HttpSessionClient;

use async_trait::async_trait;

use crate::encoder::EncodedFrame;

/// Any failure talking to the analysis service
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    /// Transport, HTTP status or decoding failure
    #[error("analysis service unavailable: {0}")]
    RemoteUnavailable(String),
}

impl ApiError {
    pub(crate) fn remote(what: &str, err: impl std::fmt::Display) -> Self {
        ApiError::RemoteUnavailable(format!("{}: {}", what, err))
    }
}

/// Feedback attached to one processed frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameStatus {
    pub label: String,
    pub score: u64,
    pub elapsed_secs: u64,
    pub exercise: Option<String>,
}

/// Annotated frame returned by the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameResponse {
    /// Encoded image bytes (JPEG)
    pub rendered: Vec<u8>,
    pub status: FrameStatus,
}

/// Results reported when a session ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopSummary {
    pub final_score: u64,
    pub elapsed_secs: u64,
}

#[async_trait]
pub trait SessionApi: Send + Sync {
    /// Begin scoring against `exercise`
    async fn start(&self, exercise: &str) -> Result<(), ApiError>;

    /// End the session and fetch the final results
    async fn stop(&self) -> Result<StopSummary, ApiError>;

    /// Submit one frame for analysis
    async fn send_frame(&self, frame: &EncodedFrame) -> Result<FrameResponse, ApiError>;
}

#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn exercises(&self) -> Result<Vec<String>, ApiError>;

    async fn instructions(&self, exercise: &str) -> Result<String, ApiError>;

    /// Server-side view of the current session
    async fn server_status(&self) -> Result<FrameStatus, ApiError>;
}
