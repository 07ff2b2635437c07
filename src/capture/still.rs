//! Still-image capture backend
//!
//! Serves one image from disk as a never-changing stream. Used for headless
//! runs and demos where no camera is attached.

use async_trait::async_trait;
use image::RgbImage;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use super::{CaptureDevice, CaptureError, CaptureRequest, FrameProvider};

pub struct StillImageDevice {
    path: Option<PathBuf>,
}

impl StillImageDevice {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

struct StillFrame {
    name: String,
    frame: Arc<RgbImage>,
}

impl FrameProvider for StillFrame {
    fn current_frame(&self) -> Option<Arc<RgbImage>> {
        Some(self.frame.clone())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl CaptureDevice for StillImageDevice {
    async fn open(&self, _request: &CaptureRequest) -> Result<Arc<dyn FrameProvider>, CaptureError> {
        let path = self.path.clone().ok_or_else(|| {
            CaptureError::DeviceUnavailable("no still image configured".to_string())
        })?;

        let load_path = path.clone();
        let frame = tokio::task::spawn_blocking(move || image::open(&load_path))
            .await
            .map_err(|e| CaptureError::DeviceUnavailable(format!("image loader failed: {}", e)))?
            .map_err(|e| {
                CaptureError::DeviceUnavailable(format!("failed to load {:?}: {}", path, e))
            })?
            .to_rgb8();

        debug!(
            "Loaded still image {:?} ({}x{})",
            path,
            frame.width(),
            frame.height()
        );

        Ok(Arc::new(StillFrame {
            name: format!("still image {}", path.display()),
            frame: Arc::new(frame),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaptureConfig;

    #[tokio::test]
    async fn test_missing_path_is_unavailable() {
        let device = StillImageDevice::new(None);
        let request = CaptureRequest::from(&CaptureConfig::default());
        assert!(matches!(
            device.open(&request).await,
            Err(CaptureError::DeviceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_loads_image_from_disk() {
        let path = std::env::temp_dir().join(format!("posture-coach-still-{}.png", std::process::id()));
        RgbImage::from_pixel(8, 6, image::Rgb([10, 20, 30]))
            .save(&path)
            .unwrap();

        let device = StillImageDevice::new(Some(path.clone()));
        let request = CaptureRequest::from(&CaptureConfig::default());
        let provider = device.open(&request).await.unwrap();
        let frame = provider.current_frame().unwrap();
        assert_eq!(frame.dimensions(), (8, 6));
        assert_eq!(frame.get_pixel(0, 0), &image::Rgb([10, 20, 30]));

        let _ = std::fs::remove_file(&path);
    }
}
