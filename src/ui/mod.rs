//! Display sink and user notifications

pub mod notifications;
mod preview;

pub use notifications::{ConsoleNotifier, Notifier};
pub use preview::PreviewSink;

use image::RgbImage;

/// Marker the service puts in labels for correct posture
const SUCCESS_MARKER: &str = "Correct";

/// Display classification of the status label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusClass {
    #[default]
    Idle,
    Analyzing,
    Positive,
    Negative,
    Stopped,
}

impl StatusClass {
    /// Classify a label returned by the service
    pub fn for_label(label: &str) -> Self {
        if label.contains(SUCCESS_MARKER) {
            StatusClass::Positive
        } else {
            StatusClass::Negative
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            StatusClass::Idle | StatusClass::Stopped => "gray",
            StatusClass::Analyzing => "blue",
            StatusClass::Positive => "green",
            StatusClass::Negative => "red",
        }
    }
}

/// Viewport the session renders into
pub trait DisplaySink: Send + Sync {
    /// Show a decoded annotated frame
    fn render(&self, frame: &RgbImage) -> anyhow::Result<()>;

    fn set_status(&self, text: &str, class: StatusClass);

    fn set_score(&self, score: u64);

    fn set_time(&self, seconds: u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_classification() {
        assert_eq!(
            StatusClass::for_label("Correct: Good! Back is straight"),
            StatusClass::Positive
        );
        assert_eq!(
            StatusClass::for_label("Incorrect: Straighten your back"),
            StatusClass::Negative
        );
        assert_eq!(StatusClass::for_label("Not Started"), StatusClass::Negative);
    }

    #[test]
    fn test_colors() {
        assert_eq!(StatusClass::Analyzing.color(), "blue");
        assert_eq!(StatusClass::Positive.color(), "green");
        assert_eq!(StatusClass::Negative.color(), "red");
        assert_eq!(StatusClass::Stopped.color(), "gray");
    }
}
