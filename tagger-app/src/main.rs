//! Audio tagger headless host.
//!
//! ## Runtime note
//!
//! The coordinator runs its producer and consumers on dedicated OS threads.
//! Tokio only hosts the event loggers; every coordinator call that may block
//! (start, reconfigure, shutdown) runs off the async workers.

mod commands;
mod settings;
mod state;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use settings::{default_settings_path, load_settings, save_settings, AppSettings};
use state::AppState;
use tagger_core::{ipc::events::top_predictions, Coordinator, SettingsRequest};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "audio-tagger", version, about = "Real-time audio tagging host")]
struct Cli {
    /// Settings file (defaults to the per-user data directory).
    #[arg(long, value_name = "PATH")]
    settings: Option<PathBuf>,

    /// Start on live capture.
    #[arg(long, conflicts_with = "source")]
    live: bool,

    /// Start on the file source with this id.
    #[arg(long, value_name = "ID")]
    source: Option<u32>,

    /// Start with the predictor with this id.
    #[arg(long, value_name = "ID")]
    predictor: Option<u32>,

    /// Write a default settings file and exit.
    #[arg(long)]
    init: bool,
}

impl Cli {
    fn start_request(&self, saved: SettingsRequest) -> SettingsRequest {
        let mut request = match (self.live, self.source) {
            (true, _) => SettingsRequest::live(saved.predictor_id),
            (false, Some(id)) => SettingsRequest::file(id, saved.predictor_id),
            (false, None) => saved,
        };
        if self.predictor.is_some() {
            request.predictor_id = self.predictor;
        }
        request
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tagger_core=info,tagger_app=info")),
        )
        .init();

    let cli = Cli::parse();
    let settings_path = cli.settings.clone().unwrap_or_else(default_settings_path);

    if cli.init {
        save_settings(&settings_path, &AppSettings::default())
            .with_context(|| format!("writing {}", settings_path.display()))?;
        info!(path = %settings_path.display(), "default settings written");
        return Ok(());
    }

    let mut settings = load_settings(&settings_path);
    settings.start = cli.start_request(settings.start);
    info!(path = %settings_path.display(), start = ?settings.start, "audio tagger starting");

    let base = settings_path
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let coordinator = Coordinator::new(
        settings.tagger_config(),
        settings.predictor_registry(&base),
        settings.source_registry(&base),
    )
    .context("invalid pipeline settings")?;
    let state = Arc::new(AppState::new(coordinator, settings, settings_path));

    spawn_prediction_logger(Arc::clone(&state));
    spawn_status_logger(Arc::clone(&state));

    let starter = Arc::clone(&state);
    match tokio::task::spawn_blocking(move || starter.coordinator.start()).await? {
        Ok(()) => info!("pipeline started"),
        // The host stays up so the operator can pick another source.
        Err(e) => error!("pipeline failed to start: {e}"),
    }
    println!("{}", commands::HELP);

    // A plain thread: a blocked stdin read must not hold up runtime shutdown.
    let (done_tx, done_rx) = tokio::sync::oneshot::channel::<()>();
    std::thread::Builder::new()
        .name("tagger-commands".into())
        .spawn({
            let state = Arc::clone(&state);
            move || {
                run_command_loop(&state);
                let _ = done_tx.send(());
            }
        })
        .context("spawning command thread")?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("listening for ctrl-c")?;
            info!("interrupt received");
        }
        _ = done_rx => info!("command loop finished"),
    }

    let stopper = Arc::clone(&state);
    tokio::task::spawn_blocking(move || stopper.coordinator.shutdown()).await??;
    let perf = state.perf_snapshot();
    info!(
        reconfigurations = perf.diagnostics.reconfigure_calls,
        failures = perf.diagnostics.reconfigure_failures,
        reconfigure_p95_ms = perf.reconfigure_ms.p95_ms,
        predictions = perf.diagnostics.pipeline.predictions_published,
        "audio tagger stopped"
    );
    Ok(())
}

fn run_command_loop(state: &AppState) {
    let stdin = std::io::stdin();
    let mut line = String::new();
    loop {
        line.clear();
        match stdin.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("stdin closed: {e}");
                break;
            }
        }
        if line.trim().is_empty() {
            continue;
        }
        match commands::parse(&line) {
            Ok(command) => {
                if !commands::execute(command, state) {
                    break;
                }
            }
            Err(msg) => println!("{msg}"),
        }
    }
}

fn spawn_prediction_logger(state: Arc<AppState>) {
    let mut rx = state.coordinator.subscribe_predictions();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    state.perf_metrics.lock().record_prediction(Instant::now());
                    let top = top_predictions(&event.predictions, 3);
                    let summary: Vec<String> = top
                        .iter()
                        .map(|p| format!("{}={:.2}", p.label, p.probability))
                        .collect();
                    debug!(seq = event.seq, top = %summary.join(" "), "prediction");
                }
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "prediction logger lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

fn spawn_status_logger(state: Arc<AppState>) {
    let mut rx = state.coordinator.subscribe_status();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => match event.detail {
                    Some(detail) => info!(status = ?event.status, detail = detail.as_str(), "status"),
                    None => info!(status = ?event.status, "status"),
                },
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "status logger lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flags_override_the_saved_start() {
        let saved = SettingsRequest::file(2, Some(1));

        let cli = Cli::parse_from(["audio-tagger", "--live"]);
        assert_eq!(cli.start_request(saved), SettingsRequest::live(Some(1)));

        let cli = Cli::parse_from(["audio-tagger", "--source", "7", "--predictor", "0"]);
        assert_eq!(cli.start_request(saved), SettingsRequest::file(7, Some(0)));

        let cli = Cli::parse_from(["audio-tagger"]);
        assert_eq!(cli.start_request(saved), saved);
    }

    #[test]
    fn live_and_source_conflict() {
        assert!(Cli::try_parse_from(["audio-tagger", "--live", "--source", "1"]).is_err());
    }
}
