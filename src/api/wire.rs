//! JSON bodies exchanged with the analysis service

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub(super) struct StartRequest<'a> {
    pub exercise: &'a str,
}

#[derive(Debug, Deserialize)]
pub(super) struct StartReply {
    pub status: String,
    #[serde(default)]
    pub exercise: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct StopReply {
    pub status: String,
    #[serde(default)]
    pub exercise: Option<String>,
    pub final_score: u64,
    pub time: u64,
}

#[derive(Debug, Serialize)]
pub(super) struct FrameRequest {
    pub image: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct FrameReply {
    pub image: String,
    pub status: StatusBody,
}

#[derive(Debug, Deserialize)]
pub(super) struct StatusBody {
    pub status: String,
    pub score: u64,
    pub time: u64,
    #[serde(default)]
    pub exercise: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct InstructionsReply {
    pub instructions: String,
}

/// Body of non-2xx replies
#[derive(Debug, Deserialize)]
pub(super) struct ErrorReply {
    pub error: String,
}
