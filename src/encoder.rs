//! Frame encoder
//!
//! Copies the latest capture frame onto an off-screen RGB surface and
//! serializes it as JPEG. Runs synchronously on the caller's task; the only
//! work is the copy and the compression.

use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use tracing::{debug, warn};

use crate::api::data_uri;
use crate::capture::CaptureHandle;

/// Lossy still image ready for transmission
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedFrame {
    jpeg: Vec<u8>,
    width: u32,
    height: u32,
}

impl EncodedFrame {
    /// Frame with no payload; never transmitted
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.jpeg.is_empty() || self.width == 0 || self.height == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.jpeg
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// `data:image/jpeg;base64,...` form expected by the analysis service
    pub fn to_data_uri(&self) -> String {
        data_uri::encode(data_uri::JPEG_MIME, &self.jpeg)
    }
}

pub struct FrameEncoder {
    quality: u8,
    surface: RgbImage,
}

impl FrameEncoder {
    /// `quality` is on the 1..=100 JPEG scale
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
            surface: RgbImage::new(0, 0),
        }
    }

    /// Encode whatever frame the handle currently holds.
    ///
    /// Returns an empty frame when the stream has nothing to offer yet.
    pub fn encode(&mut self, handle: &CaptureHandle) -> EncodedFrame {
        match handle.current_frame() {
            Some(frame) => self.encode_image(&frame),
            None => EncodedFrame::empty(),
        }
    }

    pub fn encode_image(&mut self, frame: &RgbImage) -> EncodedFrame {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return EncodedFrame::empty();
        }

        // Source resolution may change between calls
        if self.surface.dimensions() != (width, height) {
            debug!("Resizing encoder surface to {}x{}", width, height);
            self.surface = RgbImage::new(width, height);
        }
        image::imageops::replace(&mut self.surface, frame, 0, 0);

        let mut jpeg = Vec::new();
        if let Err(e) = JpegEncoder::new_with_quality(&mut jpeg, self.quality).encode_image(&self.surface) {
            warn!("JPEG encode failed: {}", e);
            return EncodedFrame::empty();
        }

        EncodedFrame {
            jpeg,
            width,
            height,
        }
    }

    pub fn surface_dimensions(&self) -> (u32, u32) {
        self.surface.dimensions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::tests::FixedFrame;
    use std::sync::Arc;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x * 7 % 255) as u8, (y * 5 % 255) as u8, 128])
        })
    }

    #[test]
    fn test_encodes_jpeg_at_source_size() {
        let mut encoder = FrameEncoder::new(80);
        let frame = encoder.encode_image(&gradient(64, 48));

        assert!(!frame.is_empty());
        assert_eq!(frame.dimensions(), (64, 48));
        assert_eq!(&frame.as_bytes()[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(frame.as_bytes()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }

    #[test]
    fn test_surface_follows_resolution_changes() {
        let mut encoder = FrameEncoder::new(80);
        encoder.encode_image(&gradient(32, 24));
        assert_eq!(encoder.surface_dimensions(), (32, 24));

        encoder.encode_image(&gradient(16, 16));
        assert_eq!(encoder.surface_dimensions(), (16, 16));
    }

    #[test]
    fn test_zero_sized_frame_is_empty() {
        let mut encoder = FrameEncoder::new(80);
        assert!(encoder.encode_image(&RgbImage::new(0, 0)).is_empty());
    }

    #[test]
    fn test_handle_without_frame_is_empty() {
        let handle = CaptureHandle::new(Arc::new(FixedFrame::new(None)));
        let mut encoder = FrameEncoder::new(80);
        assert!(encoder.encode(&handle).is_empty());
    }

    #[test]
    fn test_lower_quality_is_smaller() {
        let image = gradient(96, 96);
        let high = FrameEncoder::new(95).encode_image(&image);
        let low = FrameEncoder::new(10).encode_image(&image);
        assert!(low.as_bytes().len() < high.as_bytes().len());
    }

    #[test]
    fn test_data_uri_prefix() {
        let frame = FrameEncoder::new(80).encode_image(&gradient(8, 8));
        assert!(frame.to_data_uri().starts_with("data:image/jpeg;base64,/9j/"));
    }
}
