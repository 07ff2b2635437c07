//! User-facing notifications
//!
//! Failures and session summaries are surfaced as one notification each.

use tracing::info;

pub const CAMERA_UNAVAILABLE: &str =
    "Error accessing the camera. Please make sure camera permissions are granted.";
pub const START_FAILED: &str = "Error starting exercise. Please try again.";
pub const STOP_FAILED: &str = "Error stopping exercise. Please try again.";

pub fn session_summary(final_score: u64, elapsed_secs: u64) -> String {
    format!(
        "Exercise completed!\nFinal score: {}\nTime: {} seconds",
        final_score, elapsed_secs
    )
}

pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Prints notifications to the terminal
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, message: &str) {
        info!("Notification: {}", message.replace('\n', " | "));
        println!("\n{}\n", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_summary_reports_score_and_time() {
        let summary = session_summary(42, 17);
        assert!(summary.contains("Final score: 42"));
        assert!(summary.contains("Time: 17 seconds"));
    }
}
