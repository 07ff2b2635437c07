//! File-backed preview display
//!
//! Each rendered frame replaces `preview.jpg` in the output directory (write to
//! a temp file, then rename) so viewers never observe a half-written image.
//! Status fields go to the log.

use anyhow::{Context, Result};
use image::{ImageFormat, RgbImage};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

use super::{DisplaySink, StatusClass};

const PREVIEW_FILE: &str = "preview.jpg";
const PREVIEW_TEMP_FILE: &str = "preview.jpg.tmp";

pub struct PreviewSink {
    directory: PathBuf,
    last_status: Mutex<Option<(String, StatusClass)>>,
}

impl PreviewSink {
    pub fn new(directory: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&directory)
            .with_context(|| format!("Failed to create preview directory: {:?}", directory))?;
        info!("Preview frames written to {:?}", directory.join(PREVIEW_FILE));

        Ok(Self {
            directory,
            last_status: Mutex::new(None),
        })
    }

    pub fn preview_path(&self) -> PathBuf {
        self.directory.join(PREVIEW_FILE)
    }

    fn write_atomically(&self, frame: &RgbImage, target: &Path) -> Result<()> {
        let temp = self.directory.join(PREVIEW_TEMP_FILE);
        frame
            .save_with_format(&temp, ImageFormat::Jpeg)
            .with_context(|| format!("Failed to write preview frame: {:?}", temp))?;
        std::fs::rename(&temp, target)
            .with_context(|| format!("Failed to publish preview frame: {:?}", target))?;
        Ok(())
    }
}

impl DisplaySink for PreviewSink {
    fn render(&self, frame: &RgbImage) -> Result<()> {
        self.write_atomically(frame, &self.preview_path())
    }

    fn set_status(&self, text: &str, class: StatusClass) {
        let mut last = self
            .last_status
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        // Labels repeat on nearly every frame, only log transitions
        let changed = match last.as_ref() {
            Some((label, last_class)) => label != text || *last_class != class,
            None => true,
        };
        if changed {
            info!("Status: {} [{}]", text, class.color());
            *last = Some((text.to_string(), class));
        }
    }

    fn set_score(&self, score: u64) {
        debug!("Score: {}", score);
    }

    fn set_time(&self, seconds: u64) {
        debug!("Time: {}s", seconds);
    }
}
