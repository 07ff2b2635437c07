//! Capture device acquisition
//!
//! A `CaptureSource` opens exactly one capture stream per process and hands
//! out cheap `CaptureHandle` clones. Backends implement `CaptureDevice`; the
//! frame encoder only ever reads the latest frame through the handle.

mod camera;
mod still;

pub use camera::CameraDevice;
pub use still::StillImageDevice;

use async_trait::async_trait;
use image::RgbImage;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{CaptureBackend, CaptureConfig};

/// Errors raised while acquiring a capture stream
#[derive(thiserror::Error, Debug)]
pub enum CaptureError {
    /// Permission denied, no device present, or the device failed to open
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),
}

/// Parameters passed to a backend when opening a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub device_index: u32,
    pub width: u32,
    pub height: u32,
    pub front_facing: bool,
}

impl From<&CaptureConfig> for CaptureRequest {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            device_index: config.device_index,
            width: config.width,
            height: config.height,
            front_facing: config.front_facing,
        }
    }
}

/// Live stream exposing its most recent frame
pub trait FrameProvider: Send + Sync {
    /// Latest frame, `None` until the stream has produced one
    fn current_frame(&self) -> Option<Arc<RgbImage>>;

    /// Human-readable name for logging
    fn name(&self) -> &str;
}

/// Backend able to open a capture stream
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    async fn open(&self, request: &CaptureRequest) -> Result<Arc<dyn FrameProvider>, CaptureError>;
}

/// Reference to the open capture stream
#[derive(Clone)]
pub struct CaptureHandle {
    provider: Arc<dyn FrameProvider>,
}

impl CaptureHandle {
    pub fn new(provider: Arc<dyn FrameProvider>) -> Self {
        Self { provider }
    }

    pub fn current_frame(&self) -> Option<Arc<RgbImage>> {
        self.provider.current_frame()
    }

    pub fn name(&self) -> &str {
        self.provider.name()
    }
}

impl std::fmt::Debug for CaptureHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureHandle")
            .field("device", &self.provider.name())
            .finish()
    }
}

/// Owner of the process-wide capture stream
pub struct CaptureSource {
    request: CaptureRequest,
    device: Box<dyn CaptureDevice>,
    /// Open handle, readable without waiting on a pending acquisition
    handle: RwLock<Option<CaptureHandle>>,
    /// Held for the whole duration of an open attempt
    pending: Mutex<()>,
}

impl CaptureSource {
    pub fn new(request: CaptureRequest, device: Box<dyn CaptureDevice>) -> Self {
        Self {
            request,
            device,
            handle: RwLock::new(None),
            pending: Mutex::new(()),
        }
    }

    /// Build the source for the configured backend
    pub fn from_config(config: &CaptureConfig) -> Self {
        let device: Box<dyn CaptureDevice> = match config.backend {
            CaptureBackend::Camera => Box::new(CameraDevice::new()),
            CaptureBackend::Still => Box::new(StillImageDevice::new(config.still_image.clone())),
        };
        Self::new(CaptureRequest::from(config), device)
    }

    /// Open the capture stream, or return the already open one.
    ///
    /// Concurrent callers wait for the first open attempt instead of
    /// prompting the device a second time.
    pub async fn acquire(&self) -> Result<CaptureHandle, CaptureError> {
        if let Some(handle) = self.handle() {
            return Ok(handle);
        }

        let _pending = self.pending.lock().await;

        // Another caller may have finished while we waited
        if let Some(handle) = self.handle() {
            return Ok(handle);
        }

        debug!(
            "Opening capture device #{} at {}x{} (front facing: {})",
            self.request.device_index,
            self.request.width,
            self.request.height,
            self.request.front_facing
        );

        match self.device.open(&self.request).await {
            Ok(provider) => {
                let handle = CaptureHandle::new(provider);
                info!("Capture device ready: {}", handle.name());
                *self.handle.write().unwrap_or_else(PoisonError::into_inner) = Some(handle.clone());
                Ok(handle)
            }
            Err(e) => {
                warn!("Failed to open capture device: {}", e);
                Err(e)
            }
        }
    }

    /// The open handle, if any
    pub fn handle(&self) -> Option<CaptureHandle> {
        self.handle
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_live(&self) -> bool {
        self.handle().is_some()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Provider serving a fixed frame (or none)
    pub(crate) struct FixedFrame {
        frame: Option<Arc<RgbImage>>,
    }

    impl FixedFrame {
        pub(crate) fn new(frame: Option<RgbImage>) -> Self {
            Self {
                frame: frame.map(Arc::new),
            }
        }
    }

    impl FrameProvider for FixedFrame {
        fn current_frame(&self) -> Option<Arc<RgbImage>> {
            self.frame.clone()
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    /// Device counting open attempts, optionally slow or failing
    pub(crate) struct CountingDevice {
        pub(crate) opens: Arc<AtomicUsize>,
        pub(crate) fail: bool,
        pub(crate) delay: Duration,
        pub(crate) frame: Option<RgbImage>,
    }

    impl CountingDevice {
        pub(crate) fn with_frame(frame: Option<RgbImage>) -> Self {
            Self {
                opens: Arc::new(AtomicUsize::new(0)),
                fail: false,
                delay: Duration::ZERO,
                frame,
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                fail: true,
                ..Self::with_frame(None)
            }
        }
    }

    #[async_trait]
    impl CaptureDevice for CountingDevice {
        async fn open(
            &self,
            _request: &CaptureRequest,
        ) -> Result<Arc<dyn FrameProvider>, CaptureError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(CaptureError::DeviceUnavailable("permission denied".into()));
            }
            Ok(Arc::new(FixedFrame::new(self.frame.clone())))
        }
    }

    fn request() -> CaptureRequest {
        CaptureRequest::from(&CaptureConfig::default())
    }

    #[tokio::test]
    async fn test_acquire_is_idempotent() {
        let device = CountingDevice::with_frame(Some(RgbImage::new(4, 4)));
        let opens = device.opens.clone();
        let source = CaptureSource::new(request(), Box::new(device));

        assert!(!source.is_live());
        source.acquire().await.unwrap();
        source.acquire().await.unwrap();

        assert!(source.is_live());
        assert_eq!(opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_acquire_opens_once() {
        let mut device = CountingDevice::with_frame(None);
        device.delay = Duration::from_millis(20);
        let opens = device.opens.clone();
        let source = CaptureSource::new(request(), Box::new(device));

        let (a, b) = tokio::join!(source.acquire(), source.acquire());
        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_acquire_can_retry() {
        let device = CountingDevice::failing();
        let opens = device.opens.clone();
        let source = CaptureSource::new(request(), Box::new(device));

        let err = source.acquire().await.unwrap_err();
        assert!(matches!(err, CaptureError::DeviceUnavailable(_)));
        assert!(!source.is_live());

        let _ = source.acquire().await;
        assert_eq!(opens.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_request_from_config() {
        let request = request();
        assert_eq!(request.width, 640);
        assert_eq!(request.height, 480);
        assert!(request.front_facing);
        assert_eq!(request.device_index, 0);
    }
}
