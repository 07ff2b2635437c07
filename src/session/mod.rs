//! Session coordinator - owns the session state machine and the frame loop

mod coordinator;
mod frame_loop;
pub mod scheduler;

pub use coordinator::{SessionCoordinator, SessionParts, Transition};
pub use frame_loop::LoopToken;
pub use scheduler::{FrameScheduler, ImmediateScheduler, RefreshScheduler};

use tokio::sync::{broadcast, mpsc};

use crate::api::{ApiError, StopSummary};
use crate::capture::CaptureError;
use crate::ui::StatusClass;

/// Lifecycle of one exercise session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Running,
    /// Stop request in flight; always resolves to `Idle`
    Stopping,
}

/// Failures surfaced by coordinator transitions
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Remote(#[from] ApiError),
}

/// Intents accepted by the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Start { exercise: String },
    Stop,
    /// Stop any running session and exit
    Shutdown,
}

/// Status fields shown next to the preview
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusView {
    pub label: String,
    pub class: StatusClass,
    pub score: u64,
    pub elapsed_secs: u64,
}

impl StatusView {
    fn idle() -> Self {
        Self {
            label: "Not Started".to_string(),
            ..Self::default()
        }
    }

    fn analyzing() -> Self {
        Self {
            label: "Analyzing...".to_string(),
            class: StatusClass::Analyzing,
            score: 0,
            elapsed_secs: 0,
        }
    }
}

/// Updates published by the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    Status(StatusView),
    Finished(StopSummary),
}

/// Create command and event channels for the coordinator
pub fn create_session_channels() -> (
    mpsc::Sender<SessionCommand>,
    mpsc::Receiver<SessionCommand>,
    broadcast::Sender<SessionEvent>,
    broadcast::Receiver<SessionEvent>,
) {
    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    let (event_tx, event_rx) = broadcast::channel(64);
    (cmd_tx, cmd_rx, event_tx, event_rx)
}
