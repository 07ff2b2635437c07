//! Command-line flags and the interactive console

use anyhow::{bail, Context, Result};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

use crate::api::CatalogApi;
use crate::config::{CaptureBackend, Config};
use crate::session::{SessionCommand, SessionCoordinator, SessionState, StatusView};

const INSTRUCTIONS_FAILED: &str = "Failed to load instructions.";
const EXERCISES_FAILED: &str = "Failed to load exercises.";

/// Flags given on the command line
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CliOptions {
    pub help: bool,
    pub server: Option<String>,
    pub exercise: Option<String>,
    pub still_image: Option<PathBuf>,
    pub autostart: bool,
}

impl CliOptions {
    /// Parse arguments, excluding the program name
    pub fn parse<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut options = CliOptions::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-h" | "--help" => options.help = true,
                "-a" | "--autostart" => options.autostart = true,
                "--server" => {
                    options.server = Some(args.next().context("--server needs a URL")?);
                }
                "-e" | "--exercise" => {
                    options.exercise = Some(args.next().context("--exercise needs a name")?);
                }
                "--still" => {
                    let path = args.next().context("--still needs an image path")?;
                    options.still_image = Some(PathBuf::from(path));
                }
                other => bail!("Unknown argument: {}", other),
            }
        }

        Ok(options)
    }

    /// Layer the flags over the loaded configuration
    pub fn apply(&self, config: &mut Config) {
        if let Some(server) = &self.server {
            config.server.base_url = server.clone();
        }
        if let Some(exercise) = &self.exercise {
            config.session.default_exercise = exercise.clone();
        }
        if let Some(path) = &self.still_image {
            config.capture.backend = CaptureBackend::Still;
            config.capture.still_image = Some(path.clone());
        }
    }
}

pub fn print_help() {
    println!("posture-coach - Live posture feedback from your webcam");
    println!();
    println!("USAGE:");
    println!("    posture-coach [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help              Print this help message");
    println!("        --server <URL>      Analysis service base URL");
    println!("    -e, --exercise <NAME>   Exercise selected on launch");
    println!("        --still <PATH>      Stream a still image instead of the camera");
    println!("    -a, --autostart         Start a session right away");
    println!();
    println!("ENVIRONMENT:");
    println!("    RUST_LOG                Set log level (e.g., debug, info, warn)");
    println!("    POSTURE_COACH_LOG_PATH  Override the log directory");
}

fn print_console_help() {
    println!("Commands:");
    println!("    start [exercise]   Start a session");
    println!("    stop               Stop the running session");
    println!("    exercise <name>    Select an exercise");
    println!("    exercises          List available exercises");
    println!("    instructions       Show instructions for the selected exercise");
    println!("    status             Show the current status");
    println!("    quit               Exit");
}

pub fn print_prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

/// One line typed at the console
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Start(Option<String>),
    Stop,
    Select(String),
    Exercises,
    Instructions,
    Status,
    Help,
    Quit,
}

impl ConsoleCommand {
    /// `Ok(None)` for blank lines
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };
        let argument = (!rest.is_empty()).then(|| rest.to_string());

        let command = match verb.to_ascii_lowercase().as_str() {
            "start" => ConsoleCommand::Start(argument),
            "stop" => ConsoleCommand::Stop,
            "exercise" | "select" => match argument {
                Some(name) => ConsoleCommand::Select(name),
                None => bail!("Usage: exercise <name>"),
            },
            "exercises" | "list" => ConsoleCommand::Exercises,
            "instructions" => ConsoleCommand::Instructions,
            "status" => ConsoleCommand::Status,
            "help" | "?" => ConsoleCommand::Help,
            "quit" | "exit" => ConsoleCommand::Quit,
            other => bail!("Unknown command '{}', type 'help' for a list", other),
        };
        Ok(Some(command))
    }
}

/// One-line summary of the session for the `status` command
pub fn format_status(state: SessionState, view: &StatusView) -> String {
    format!(
        "[{:?}] {} ({}) | Score: {} | Time: {}s",
        state,
        view.label,
        view.class.color(),
        view.score,
        view.elapsed_secs
    )
}

/// Console state: the selected exercise and the catalog it is looked up in
pub struct Console {
    exercise: String,
    catalog: Arc<dyn CatalogApi>,
}

impl Console {
    pub fn new(exercise: String, catalog: Arc<dyn CatalogApi>) -> Self {
        Self { exercise, catalog }
    }

    pub fn exercise(&self) -> &str {
        &self.exercise
    }

    pub async fn show_instructions(&self) {
        match self.catalog.instructions(&self.exercise).await {
            Ok(text) => println!("{}:\n{}", self.exercise, text),
            Err(e) => {
                warn!("Failed to load instructions for '{}': {}", self.exercise, e);
                println!("{}", INSTRUCTIONS_FAILED);
            }
        }
    }

    async fn list_exercises(&self) {
        match self.catalog.exercises().await {
            Ok(names) => {
                for name in names {
                    let marker = if name == self.exercise { "*" } else { " " };
                    println!(" {} {}", marker, name);
                }
            }
            Err(e) => {
                warn!("Failed to load exercises: {}", e);
                println!("{}", EXERCISES_FAILED);
            }
        }
    }

    /// Act on one console command; `Quit` is left to the caller
    pub async fn handle(
        &mut self,
        command: ConsoleCommand,
        cmd_tx: &mpsc::Sender<SessionCommand>,
        coordinator: &SessionCoordinator,
    ) -> Result<()> {
        match command {
            ConsoleCommand::Start(name) => {
                if let Some(name) = name {
                    if coordinator.state() == SessionState::Idle {
                        self.exercise = name;
                    }
                }
                cmd_tx
                    .send(SessionCommand::Start {
                        exercise: self.exercise.clone(),
                    })
                    .await
                    .context("Session coordinator is gone")?;
            }
            ConsoleCommand::Stop => {
                cmd_tx
                    .send(SessionCommand::Stop)
                    .await
                    .context("Session coordinator is gone")?;
            }
            ConsoleCommand::Select(name) => {
                if coordinator.state() != SessionState::Idle {
                    println!("Stop the current session before changing exercise.");
                } else {
                    self.exercise = name;
                    self.show_instructions().await;
                }
            }
            ConsoleCommand::Exercises => self.list_exercises().await,
            ConsoleCommand::Instructions => self.show_instructions().await,
            ConsoleCommand::Status => {
                println!(
                    "{}",
                    format_status(coordinator.state(), &coordinator.status())
                );
                match self.catalog.server_status().await {
                    Ok(remote) => println!(
                        "Server: {} | Exercise: {} | Score: {} | Time: {}s",
                        remote.label,
                        remote.exercise.as_deref().unwrap_or("-"),
                        remote.score,
                        remote.elapsed_secs
                    ),
                    Err(e) => warn!("Failed to query server status: {}", e),
                }
            }
            ConsoleCommand::Help => print_console_help(),
            ConsoleCommand::Quit => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::StatusClass;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_flags() {
        let options = CliOptions::parse(args(&[
            "--server",
            "http://coach.local:8080",
            "-e",
            "Squat",
            "--still",
            "/tmp/pose.jpg",
            "--autostart",
        ]))
        .unwrap();

        assert_eq!(options.server.as_deref(), Some("http://coach.local:8080"));
        assert_eq!(options.exercise.as_deref(), Some("Squat"));
        assert_eq!(options.still_image, Some(PathBuf::from("/tmp/pose.jpg")));
        assert!(options.autostart);
        assert!(!options.help);
    }

    #[test]
    fn test_parse_rejects_bad_flags() {
        assert!(CliOptions::parse(args(&["--server"])).is_err());
        assert!(CliOptions::parse(args(&["--frobnicate"])).is_err());
        assert_eq!(CliOptions::parse(args(&[])).unwrap(), CliOptions::default());
    }

    #[test]
    fn test_flags_override_config() {
        let mut config = Config::default();
        let options = CliOptions::parse(args(&["--still", "pose.png", "-e", "Squat"])).unwrap();
        options.apply(&mut config);

        assert_eq!(config.capture.backend, CaptureBackend::Still);
        assert_eq!(config.capture.still_image, Some(PathBuf::from("pose.png")));
        assert_eq!(config.session.default_exercise, "Squat");
        assert_eq!(config.server.base_url, "http://127.0.0.1:10000");
    }

    #[test]
    fn test_console_commands() {
        assert_eq!(ConsoleCommand::parse("   ").unwrap(), None);
        assert_eq!(
            ConsoleCommand::parse("start").unwrap(),
            Some(ConsoleCommand::Start(None))
        );
        assert_eq!(
            ConsoleCommand::parse("start  Shoulder Raise ").unwrap(),
            Some(ConsoleCommand::Start(Some("Shoulder Raise".into())))
        );
        assert_eq!(
            ConsoleCommand::parse("exercise Squat").unwrap(),
            Some(ConsoleCommand::Select("Squat".into()))
        );
        assert_eq!(
            ConsoleCommand::parse("STOP").unwrap(),
            Some(ConsoleCommand::Stop)
        );
        assert_eq!(
            ConsoleCommand::parse("exit").unwrap(),
            Some(ConsoleCommand::Quit)
        );
        assert!(ConsoleCommand::parse("exercise").is_err());
        assert!(ConsoleCommand::parse("dance").is_err());
    }

    #[test]
    fn test_format_status() {
        let view = StatusView {
            label: "Correct: Good! Back is straight".into(),
            class: StatusClass::Positive,
            score: 3,
            elapsed_secs: 12,
        };
        assert_eq!(
            format_status(SessionState::Running, &view),
            "[Running] Correct: Good! Back is straight (green) | Score: 3 | Time: 12s"
        );
    }
}
