//! posture-coach client
//!
//! Streams webcam frames to the posture analysis service and shows the
//! annotated result with live feedback on the exercise being performed.

mod api;
mod capture;
mod cli;
mod config;
mod encoder;
mod logging;
mod session;
mod ui;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use api::HttpSessionClient;
use capture::CaptureSource;
use cli::{CliOptions, Console, ConsoleCommand};
use config::Config;
use session::{
    create_session_channels, FrameScheduler, ImmediateScheduler, RefreshScheduler,
    SessionCommand, SessionCoordinator, SessionEvent, SessionParts,
};
use ui::notifications::{self, Notifier};
use ui::{ConsoleNotifier, PreviewSink};

fn main() -> Result<()> {
    let options = match CliOptions::parse(std::env::args().skip(1)) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{:#}", e);
            eprintln!();
            cli::print_help();
            std::process::exit(2);
        }
    };

    if options.help {
        cli::print_help();
        return Ok(());
    }

    // Keep the guard alive until exit so the log file is flushed
    let _log_guard = logging::init_logging()?;
    info!("posture-coach client starting...");

    let mut config = Config::load()?;
    info!("Configuration loaded from {:?}", config.config_path());
    options.apply(&mut config);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    let result = runtime.block_on(run(config, options.autostart));

    // The stdin reader may still be parked in a blocking read
    runtime.shutdown_timeout(Duration::from_millis(500));

    info!("Shutdown complete");
    result
}

async fn run(config: Config, autostart: bool) -> Result<()> {
    let client = Arc::new(HttpSessionClient::new(&config.server)?);
    info!("Analysis service at {}", client.base_url());

    let capture = Arc::new(CaptureSource::from_config(&config.capture));
    let notifier: Arc<dyn Notifier> = Arc::new(ConsoleNotifier);
    let display = Arc::new(PreviewSink::new(config.preview_directory())?);
    println!("Preview: {}", display.preview_path().display());

    let (cmd_tx, cmd_rx, event_tx, _event_rx) = create_session_channels();
    let coordinator = Arc::new(SessionCoordinator::new(
        SessionParts {
            capture: capture.clone(),
            api: client.clone(),
            display,
            notifier: notifier.clone(),
            scheduler: frame_scheduler(config.display.refresh_hz),
            jpeg_quality: config.encoder.jpeg_quality_percent(),
            failure_log_every: config.session.failure_log_every,
        },
        event_tx,
    ));

    // Open the camera up front so permission prompts come before the first start
    if let Err(e) = capture.acquire().await {
        warn!("Capture device not available at launch: {}", e);
        notifier.notify(notifications::CAMERA_UNAVAILABLE);
    }

    let mut console = Console::new(config.session.default_exercise.clone(), client.clone());
    console.show_instructions().await;

    let coordinator_task = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.run(cmd_rx).await })
    };
    let event_printer = tokio::spawn(print_state_changes(coordinator.subscribe()));

    let (shutdown_tx, mut shutdown_rx) = mpsc::unbounded_channel();
    ctrlc::set_handler(move || {
        info!("Ctrl+C received, shutting down...");
        let _ = shutdown_tx.send(());
    })
    .context("Failed to install Ctrl+C handler")?;

    if autostart {
        cmd_tx
            .send(SessionCommand::Start {
                exercise: console.exercise().to_string(),
            })
            .await
            .context("Session coordinator is gone")?;
    }

    println!("Type 'help' for commands.");
    cli::print_prompt();

    let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            line = lines.next(), if stdin_open => {
                let line = match line {
                    Some(Ok(line)) => line,
                    Some(Err(e)) => {
                        warn!("Failed to read console input: {}", e);
                        stdin_open = false;
                        continue;
                    }
                    None => {
                        info!("Console input closed, press Ctrl+C to exit");
                        stdin_open = false;
                        continue;
                    }
                };

                match ConsoleCommand::parse(&line) {
                    Ok(Some(ConsoleCommand::Quit)) => break,
                    Ok(Some(command)) => {
                        console.handle(command, &cmd_tx, &coordinator).await?;
                    }
                    Ok(None) => {}
                    Err(e) => println!("{}", e),
                }
                cli::print_prompt();
            }
        }
    }

    // Stops a running session before the coordinator exits
    let _ = cmd_tx.send(SessionCommand::Shutdown).await;
    if let Err(e) = coordinator_task.await {
        error!("Session coordinator task failed: {}", e);
    }
    event_printer.abort();

    Ok(())
}

/// `0` runs round-trips back to back
fn frame_scheduler(refresh_hz: u32) -> Arc<dyn FrameScheduler> {
    if refresh_hz == 0 {
        info!("Frame pacing disabled, sending frames as fast as the service answers");
        Arc::new(ImmediateScheduler)
    } else {
        Arc::new(RefreshScheduler::new(refresh_hz))
    }
}

async fn print_state_changes(mut events: broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::StateChanged(state)) => println!("\nSession {:?}", state),
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!("Event printer skipped {} events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
