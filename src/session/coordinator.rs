use image::RgbImage;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use super::frame_loop::{FrameLoop, LoopToken};
use super::scheduler::FrameScheduler;
use super::{SessionCommand, SessionError, SessionEvent, SessionState, StatusView};
use crate::api::{FrameStatus, SessionApi};
use crate::capture::{CaptureHandle, CaptureSource};
use crate::encoder::FrameEncoder;
use crate::ui::notifications::{self, Notifier};
use crate::ui::{DisplaySink, StatusClass};

/// Outcome of a start or stop request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    /// The request did not apply to the current state
    Ignored,
}

/// Collaborators injected into the coordinator
pub struct SessionParts {
    pub capture: Arc<CaptureSource>,
    pub api: Arc<dyn SessionApi>,
    pub display: Arc<dyn DisplaySink>,
    pub notifier: Arc<dyn Notifier>,
    pub scheduler: Arc<dyn FrameScheduler>,
    pub jpeg_quality: u8,
    pub failure_log_every: u32,
}

struct SessionInner {
    state: SessionState,
    loop_token: Option<LoopToken>,
    generation: u64,
    view: StatusView,
}

impl SessionInner {
    fn issue_token(&mut self) -> LoopToken {
        self.generation += 1;
        let token = LoopToken::new(self.generation);
        self.loop_token = Some(token);
        token
    }

    fn is_live(&self, token: LoopToken) -> bool {
        self.state == SessionState::Running && self.loop_token == Some(token)
    }
}

/// State shared between the coordinator and its frame loop
pub(super) struct Shared {
    inner: Mutex<SessionInner>,
    events: broadcast::Sender<SessionEvent>,
    /// Held for a whole round-trip, across every loop generation
    in_flight: tokio::sync::Mutex<()>,
    /// Held while a frame is handed to the display
    rendering: tokio::sync::Mutex<()>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    pub(super) fn is_live(&self, token: LoopToken) -> bool {
        self.lock().is_live(token)
    }

    pub(super) async fn begin_round_trip(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.in_flight.lock().await
    }

    /// Apply one frame result if `token` is still live.
    ///
    /// The display write runs on the blocking pool. A stop waits for a write
    /// in progress before it reports, so nothing renders after the stop ack.
    pub(super) async fn present(
        &self,
        token: LoopToken,
        display: &Arc<dyn DisplaySink>,
        frame: RgbImage,
        status: FrameStatus,
    ) -> bool {
        let _rendering = self.rendering.lock().await;
        if !self.is_live(token) {
            return false;
        }

        let sink = display.clone();
        match tokio::task::spawn_blocking(move || sink.render(&frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to render frame: {:#}", e),
            Err(e) => warn!("Render task failed: {}", e),
        }

        let mut inner = self.lock();
        // Stop began while the frame was being written
        if !inner.is_live(token) {
            return false;
        }

        let class = StatusClass::for_label(&status.label);
        display.set_status(&status.label, class);
        display.set_score(status.score);
        display.set_time(status.elapsed_secs);

        inner.view = StatusView {
            label: status.label,
            class,
            score: status.score,
            elapsed_secs: status.elapsed_secs,
        };
        self.publish(SessionEvent::Status(inner.view.clone()));
        true
    }
}

/// Owns the session state machine and the single frame loop
pub struct SessionCoordinator {
    shared: Arc<Shared>,
    parts: SessionParts,
    /// Serializes start and stop
    transition: tokio::sync::Mutex<()>,
}

impl SessionCoordinator {
    pub fn new(parts: SessionParts, events: broadcast::Sender<SessionEvent>) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(SessionInner {
                    state: SessionState::Idle,
                    loop_token: None,
                    generation: 0,
                    view: StatusView::idle(),
                }),
                events,
                in_flight: tokio::sync::Mutex::new(()),
                rendering: tokio::sync::Mutex::new(()),
            }),
            parts,
            transition: tokio::sync::Mutex::new(()),
        }
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock().state
    }

    pub fn status(&self) -> StatusView {
        self.shared.lock().view.clone()
    }

    /// Token of the live frame loop, `None` unless running
    pub fn loop_token(&self) -> Option<LoopToken> {
        self.shared.lock().loop_token
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Start a session for `exercise`.
    ///
    /// Ignored unless idle. Requires the capture stream; on any failure the
    /// coordinator stays idle and the user is notified once.
    pub async fn start(&self, exercise: &str) -> Result<Transition, SessionError> {
        let _transition = self.transition.lock().await;

        let state = self.state();
        if state != SessionState::Idle {
            debug!("Start ignored while {:?}", state);
            return Ok(Transition::Ignored);
        }

        let handle = match self.parts.capture.acquire().await {
            Ok(handle) => handle,
            Err(e) => {
                error!("Cannot start session: {}", e);
                self.parts.notifier.notify(notifications::CAMERA_UNAVAILABLE);
                return Err(e.into());
            }
        };

        info!("Starting session for '{}'", exercise);
        if let Err(e) = self.parts.api.start(exercise).await {
            error!("Failed to start session: {}", e);
            self.parts.notifier.notify(notifications::START_FAILED);
            return Err(e.into());
        }

        let (token, view) = {
            let mut inner = self.shared.lock();
            inner.state = SessionState::Running;
            inner.view = StatusView::analyzing();
            self.show(&inner.view);
            (inner.issue_token(), inner.view.clone())
        };
        self.shared
            .publish(SessionEvent::StateChanged(SessionState::Running));
        self.shared.publish(SessionEvent::Status(view));

        self.spawn_loop(handle, token);
        Ok(Transition::Applied)
    }

    /// Stop the running session.
    ///
    /// The frame loop is invalidated before the remote stop is issued.
    /// Whatever the remote outcome, the coordinator ends up idle.
    pub async fn stop(&self) -> Result<Transition, SessionError> {
        let _transition = self.transition.lock().await;

        {
            let mut inner = self.shared.lock();
            if inner.state != SessionState::Running {
                debug!("Stop ignored while {:?}", inner.state);
                return Ok(Transition::Ignored);
            }
            inner.state = SessionState::Stopping;
            if let Some(token) = inner.loop_token.take() {
                debug!("Invalidated frame loop {}", token.generation());
            }
        }
        self.shared
            .publish(SessionEvent::StateChanged(SessionState::Stopping));

        info!("Stopping session");
        let result = self.parts.api.stop().await;

        // A frame already being written finishes before the stop is reported
        let _rendering = self.shared.rendering.lock().await;

        let view = {
            let mut inner = self.shared.lock();
            inner.state = SessionState::Idle;
            inner.view.label = "Stopped".to_string();
            inner.view.class = StatusClass::Stopped;
            if let Ok(summary) = &result {
                inner.view.score = summary.final_score;
                inner.view.elapsed_secs = summary.elapsed_secs;
            }
            self.parts
                .display
                .set_status(&inner.view.label, inner.view.class);
            inner.view.clone()
        };
        self.shared.publish(SessionEvent::Status(view));
        self.shared
            .publish(SessionEvent::StateChanged(SessionState::Idle));

        match result {
            Ok(summary) => {
                info!(
                    "Session finished: score {}, {}s",
                    summary.final_score, summary.elapsed_secs
                );
                self.parts.notifier.notify(&notifications::session_summary(
                    summary.final_score,
                    summary.elapsed_secs,
                ));
                self.shared.publish(SessionEvent::Finished(summary));
                Ok(Transition::Applied)
            }
            Err(e) => {
                error!("Failed to stop session: {}", e);
                self.parts.notifier.notify(notifications::STOP_FAILED);
                Err(e.into())
            }
        }
    }

    /// Process commands until the channel closes or a shutdown arrives
    pub async fn run(&self, mut cmd_rx: mpsc::Receiver<SessionCommand>) {
        info!("Session coordinator ready");

        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                SessionCommand::Start { exercise } => {
                    if let Err(e) = self.start(&exercise).await {
                        debug!("Start command failed: {}", e);
                    }
                }
                SessionCommand::Stop => {
                    if let Err(e) = self.stop().await {
                        debug!("Stop command failed: {}", e);
                    }
                }
                SessionCommand::Shutdown => {
                    if let Err(e) = self.stop().await {
                        debug!("Stop on shutdown failed: {}", e);
                    }
                    break;
                }
            }
        }

        info!("Session coordinator stopped");
    }

    fn show(&self, view: &StatusView) {
        let display = &self.parts.display;
        display.set_status(&view.label, view.class);
        display.set_score(view.score);
        display.set_time(view.elapsed_secs);
    }

    fn spawn_loop(&self, handle: CaptureHandle, token: LoopToken) {
        let frame_loop = FrameLoop {
            token,
            shared: self.shared.clone(),
            handle,
            api: self.parts.api.clone(),
            display: self.parts.display.clone(),
            scheduler: self.parts.scheduler.clone(),
            encoder: FrameEncoder::new(self.parts.jpeg_quality),
            failure_log_every: self.parts.failure_log_every,
        };
        tokio::spawn(frame_loop.run());
    }
}
