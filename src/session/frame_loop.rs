//! The capture -> encode -> send -> decode -> render cycle
//!
//! One `FrameLoop` task exists per started session. It runs round-trips
//! strictly one after another and exits as soon as its token is no longer
//! the coordinator's live token.

use image::RgbImage;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::coordinator::Shared;
use super::scheduler::FrameScheduler;
use crate::api::SessionApi;
use crate::capture::CaptureHandle;
use crate::encoder::FrameEncoder;
use crate::ui::DisplaySink;

/// Identity of one frame loop instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoopToken(u64);

impl LoopToken {
    pub(super) fn new(generation: u64) -> Self {
        Self(generation)
    }

    pub fn generation(&self) -> u64 {
        self.0
    }
}

/// How one round-trip ended
#[derive(Debug)]
enum RoundTrip {
    Rendered,
    /// Nothing to send yet, e.g. the camera is still warming up
    EmptyFrame,
    /// Send or decode failed; the next tick retries
    Failed(String),
    /// Result arrived after the loop was invalidated
    Discarded,
}

pub(super) struct FrameLoop {
    pub(super) token: LoopToken,
    pub(super) shared: Arc<Shared>,
    pub(super) handle: CaptureHandle,
    pub(super) api: Arc<dyn SessionApi>,
    pub(super) display: Arc<dyn DisplaySink>,
    pub(super) scheduler: Arc<dyn FrameScheduler>,
    pub(super) encoder: FrameEncoder,
    pub(super) failure_log_every: u32,
}

impl FrameLoop {
    pub(super) async fn run(mut self) {
        let generation = self.token.generation();
        debug!("Frame loop {} started on {}", generation, self.handle.name());

        let mut rendered: u64 = 0;
        let mut consecutive_failures: u32 = 0;

        loop {
            if !self.shared.is_live(self.token) {
                break;
            }

            match self.round_trip().await {
                RoundTrip::Rendered => {
                    rendered += 1;
                    if consecutive_failures > 0 {
                        info!(
                            "Frame processing recovered after {} failures",
                            consecutive_failures
                        );
                        consecutive_failures = 0;
                    }
                }
                RoundTrip::EmptyFrame => {
                    debug!("No frame available yet, skipping");
                }
                RoundTrip::Failed(reason) => {
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    if should_warn(consecutive_failures, self.failure_log_every) {
                        warn!(
                            "Frame processing failed ({} in a row): {}",
                            consecutive_failures, reason
                        );
                    } else {
                        debug!("Frame processing failed: {}", reason);
                    }
                }
                RoundTrip::Discarded => {
                    debug!("Discarded late frame result for loop {}", generation);
                    break;
                }
            }

            if !self.shared.is_live(self.token) {
                break;
            }
            self.scheduler.next_tick().await;
        }

        debug!(
            "Frame loop {} ended after {} rendered frames",
            generation, rendered
        );
    }

    async fn round_trip(&mut self) -> RoundTrip {
        // A loop from a previous session may still be waiting on its last
        // response; never overlap with it
        let shared = self.shared.clone();
        let _in_flight = shared.begin_round_trip().await;
        if !shared.is_live(self.token) {
            return RoundTrip::Discarded;
        }

        let frame = self.encoder.encode(&self.handle);
        if frame.is_empty() {
            return RoundTrip::EmptyFrame;
        }

        let response = match self.api.send_frame(&frame).await {
            Ok(response) => response,
            Err(e) => return RoundTrip::Failed(e.to_string()),
        };
        drop(frame);

        let image = match decode_rendered(response.rendered).await {
            Ok(image) => image,
            Err(reason) => return RoundTrip::Failed(reason),
        };

        if shared
            .present(self.token, &self.display, image, response.status)
            .await
        {
            RoundTrip::Rendered
        } else {
            RoundTrip::Discarded
        }
    }
}

/// Decode the annotated JPEG off the event loop
async fn decode_rendered(bytes: Vec<u8>) -> Result<RgbImage, String> {
    tokio::task::spawn_blocking(move || image::load_from_memory(&bytes).map(|image| image.to_rgb8()))
        .await
        .map_err(|e| format!("decoder task failed: {}", e))?
        .map_err(|e| format!("undecodable annotated frame: {}", e))
}

/// Warn on the first failure of a streak and then every `every` failures
fn should_warn(consecutive_failures: u32, every: u32) -> bool {
    consecutive_failures == 1 || (every > 0 && consecutive_failures % every == 0)
}
