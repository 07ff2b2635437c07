//! HTTP/JSON implementation of the service API
//!
//! Performs no retries; every failure is reported once as
//! `ApiError::RemoteUnavailable` and the caller decides what to do.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use super::data_uri;
use super::wire::{
    ErrorReply, FrameReply, FrameRequest, InstructionsReply, StartReply, StartRequest, StatusBody,
    StopReply,
};
use super::{ApiError, CatalogApi, FrameResponse, FrameStatus, SessionApi, StopSummary};
use crate::config::ServerConfig;
use crate::encoder::EncodedFrame;

const STARTED: &str = "started";
const STOPPED: &str = "stopped";

#[derive(Clone)]
pub struct HttpSessionClient {
    client: Client,
    base_url: Url,
}

impl HttpSessionClient {
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid server URL: {}", config.base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("Server URL cannot carry a path: {}", config.base_url);
        }

        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Join path segments onto the base URL, percent-encoding each one
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::RemoteUnavailable(format!("bad base URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn read_json<T: DeserializeOwned>(response: Response, what: &str) -> Result<T, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let detail = match response.json::<ErrorReply>().await {
                Ok(reply) => reply.error,
                Err(_) => status.to_string(),
            };
            return Err(ApiError::RemoteUnavailable(format!(
                "{} returned {}: {}",
                what, status, detail
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::remote(&format!("failed to parse {} response", what), e))
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str], what: &str) -> Result<T, ApiError> {
        let url = self.endpoint(segments)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ApiError::remote(&format!("{} request failed", what), e))?;
        Self::read_json(response, what).await
    }
}

impl From<StatusBody> for FrameStatus {
    fn from(body: StatusBody) -> Self {
        Self {
            label: body.status,
            score: body.score,
            elapsed_secs: body.time,
            exercise: body.exercise,
        }
    }
}

#[async_trait]
impl SessionApi for HttpSessionClient {
    async fn start(&self, exercise: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["api", "start"])?;
        let response = self
            .client
            .post(url)
            .json(&StartRequest { exercise })
            .send()
            .await
            .map_err(|e| ApiError::remote("start request failed", e))?;

        let reply: StartReply = Self::read_json(response, "start").await?;
        if reply.status != STARTED {
            return Err(ApiError::RemoteUnavailable(format!(
                "unexpected start status '{}'",
                reply.status
            )));
        }

        debug!(
            "Session started for {}",
            reply.exercise.as_deref().unwrap_or(exercise)
        );
        Ok(())
    }

    async fn stop(&self) -> Result<StopSummary, ApiError> {
        let url = self.endpoint(&["api", "stop"])?;
        let response = self
            .client
            .post(url)
            .send()
            .await
            .map_err(|e| ApiError::remote("stop request failed", e))?;

        let reply: StopReply = Self::read_json(response, "stop").await?;
        if reply.status != STOPPED {
            return Err(ApiError::RemoteUnavailable(format!(
                "unexpected stop status '{}'",
                reply.status
            )));
        }

        debug!(
            "Session stopped for {:?}: score {}, {}s",
            reply.exercise, reply.final_score, reply.time
        );
        Ok(StopSummary {
            final_score: reply.final_score,
            elapsed_secs: reply.time,
        })
    }

    async fn send_frame(&self, frame: &EncodedFrame) -> Result<FrameResponse, ApiError> {
        let url = self.endpoint(&["api", "process_frame"])?;
        let response = self
            .client
            .post(url)
            .json(&FrameRequest {
                image: frame.to_data_uri(),
            })
            .send()
            .await
            .map_err(|e| ApiError::remote("frame request failed", e))?;

        let reply: FrameReply = Self::read_json(response, "process_frame").await?;
        let rendered = data_uri::decode(&reply.image)
            .map_err(|e| ApiError::remote("bad annotated image", e))?;

        Ok(FrameResponse {
            rendered,
            status: reply.status.into(),
        })
    }
}

#[async_trait]
impl CatalogApi for HttpSessionClient {
    async fn exercises(&self) -> Result<Vec<String>, ApiError> {
        self.get(&["api", "exercises"], "exercises").await
    }

    async fn instructions(&self, exercise: &str) -> Result<String, ApiError> {
        let reply: InstructionsReply = self
            .get(&["api", "instructions", exercise], "instructions")
            .await?;
        Ok(reply.instructions)
    }

    async fn server_status(&self) -> Result<FrameStatus, ApiError> {
        let body: StatusBody = self.get(&["api", "status"], "status").await?;
        Ok(body.into())
    }
}
