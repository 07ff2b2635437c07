//! Webcam capture backend
//!
//! With the `webcam` feature the camera is driven by nokhwa on a dedicated
//! reader thread that keeps the latest decoded frame in a shared slot. The
//! camera object never leaves that thread.

use async_trait::async_trait;
use std::sync::Arc;

use super::{CaptureDevice, CaptureError, CaptureRequest, FrameProvider};

pub struct CameraDevice;

impl CameraDevice {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CameraDevice {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "webcam")]
mod reader {
    use image::RgbImage;
    use nokhwa::pixel_format::RgbFormat;
    use nokhwa::utils::{
        CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
    };
    use nokhwa::Camera;
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tracing::{debug, info, warn};

    use super::super::{CaptureError, CaptureRequest, FrameProvider};

    const CAMERA_FPS: u32 = 30;
    const READ_ERROR_BACKOFF: Duration = Duration::from_millis(100);

    /// Latest-frame slot shared between the reader thread and the handle
    pub(super) struct CameraFeed {
        name: String,
        latest: Mutex<Option<Arc<RgbImage>>>,
    }

    impl CameraFeed {
        fn store(&self, frame: RgbImage) {
            *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(frame));
        }
    }

    impl FrameProvider for CameraFeed {
        fn current_frame(&self) -> Option<Arc<RgbImage>> {
            self.latest
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    fn open_camera(request: &CaptureRequest) -> Result<Camera, CaptureError> {
        let format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
            CameraFormat::new(
                Resolution::new(request.width, request.height),
                FrameFormat::MJPEG,
                CAMERA_FPS,
            ),
        ));

        let mut camera = Camera::new(CameraIndex::Index(request.device_index), format)
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;
        camera
            .open_stream()
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;

        // Desktop webcams carry no facing metadata; the configured index wins
        if request.front_facing {
            debug!("Front-facing preference noted, using camera #{}", request.device_index);
        }

        Ok(camera)
    }

    /// Spawn the reader thread and wait until the stream is open
    pub(super) async fn spawn(request: CaptureRequest) -> Result<Arc<CameraFeed>, CaptureError> {
        let (ready_tx, ready_rx) = oneshot::channel();

        std::thread::Builder::new()
            .name("camera-reader".to_string())
            .spawn(move || reader_loop(request, ready_tx))
            .map_err(|e| CaptureError::DeviceUnavailable(format!("failed to spawn reader: {}", e)))?;

        ready_rx.await.map_err(|_| {
            CaptureError::DeviceUnavailable("camera reader exited during startup".to_string())
        })?
    }

    fn reader_loop(
        request: CaptureRequest,
        ready: oneshot::Sender<Result<Arc<CameraFeed>, CaptureError>>,
    ) {
        let mut camera = match open_camera(&request) {
            Ok(camera) => camera,
            Err(e) => {
                let _ = ready.send(Err(e));
                return;
            }
        };

        let resolution = camera.resolution();
        info!(
            "Camera '{}' streaming at {}x{}",
            camera.info().human_name(),
            resolution.width(),
            resolution.height()
        );

        let feed = Arc::new(CameraFeed {
            name: camera.info().human_name(),
            latest: Mutex::new(None),
        });
        if ready.send(Ok(feed.clone())).is_err() {
            let _ = camera.stop_stream();
            return;
        }

        // Runs until every handle to the feed is gone
        while Arc::strong_count(&feed) > 1 {
            let buffer = match camera.frame() {
                Ok(buffer) => buffer,
                Err(e) => {
                    warn!("Camera read failed: {}", e);
                    std::thread::sleep(READ_ERROR_BACKOFF);
                    continue;
                }
            };

            match buffer.decode_image::<RgbFormat>() {
                Ok(decoded) => {
                    let (width, height) = (decoded.width(), decoded.height());
                    if let Some(frame) = RgbImage::from_raw(width, height, decoded.into_raw()) {
                        feed.store(frame);
                    }
                }
                Err(e) => debug!("Dropping undecodable camera frame: {}", e),
            }
        }

        let _ = camera.stop_stream();
        debug!("Camera reader stopped");
    }
}

#[cfg(feature = "webcam")]
#[async_trait]
impl CaptureDevice for CameraDevice {
    async fn open(&self, request: &CaptureRequest) -> Result<Arc<dyn FrameProvider>, CaptureError> {
        let feed: Arc<dyn FrameProvider> = reader::spawn(request.clone()).await?;
        Ok(feed)
    }
}

#[cfg(not(feature = "webcam"))]
#[async_trait]
impl CaptureDevice for CameraDevice {
    async fn open(&self, _request: &CaptureRequest) -> Result<Arc<dyn FrameProvider>, CaptureError> {
        Err(CaptureError::DeviceUnavailable(
            "built without webcam support (enable the `webcam` feature or use the still backend)"
                .to_string(),
        ))
    }
}
