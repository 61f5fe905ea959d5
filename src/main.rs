//! nickel-sync: keeps an e-reader's book metadata cache, the firmware's
//! catalog and the cover thumbnails consistent with each other.
//!
//! Exit codes: `0` when there's nothing more to do, `1` when books were added
//! or changed and the engine must run again after the firmware imports them,
//! `250` on error.

mod cli;

use clap::Parser;
use nickel_config::{CONFIG_FILE, Config};
use nickel_library::{Outcome, Session, SessionOptions, Status, StatusMessage};
use std::process::ExitCode;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

const EXIT_ERROR: u8 = 250;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = cli::Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(|| cli.onboard_mount.join(CONFIG_FILE));
    // Corrections are only logged once the subscriber is up, below.
    let config = Config::read(&config_path);

    let filter = match &config {
        Ok(config) if config.enable_debug => "debug",
        _ => "info",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let (sender, mut receiver) = mpsc::unbounded_channel::<StatusMessage>();
    let printer = tokio::spawn(async move {
        while let Some(message) = receiver.recv().await {
            match message.progress {
                Some(percent) => println!("{} ({percent}%)", message.body),
                None => println!("{}", message.body),
            }
        }
    });
    let status = Status::new(sender);

    let config = match config {
        Ok(mut config) => {
            config.validate();
            config
        },
        Err(e) => {
            tracing::error!(path = %config_path.display(), error = ?e, "Could not load configuration; using defaults");
            status.message("Error loading configuration; using defaults");
            Config::default()
        },
    };

    let options = SessionOptions {
        onboard_root: cli.onboard_mount,
        sd_root: cli.sd_mount,
        prefer_sd_card: config.prefer_sd_card,
        prefer_kepub: config.prefer_kepub,
        thumbnails: config.thumbnail.settings(),
    };
    let result = run(options, status.clone()).await;

    let code = match result {
        Ok(Outcome::Done) => {
            status.message("Nothing more to do");
            ExitCode::SUCCESS
        },
        Ok(Outcome::RescanRequired) => {
            status.message("Books changed: the device will rescan its content");
            ExitCode::from(1)
        },
        Err(e) => {
            tracing::error!(error = ?e, "Session failed");
            status.message(format!("Error: {}", *e));
            ExitCode::from(EXIT_ERROR)
        },
    };
    // Every sender is gone once this one is; the printer then drains and stops.
    drop(status);
    if let Err(e) = printer.await {
        tracing::warn!(error = %e, "Status printer failed");
    }
    code
}

async fn run(options: SessionOptions, status: Status) -> nickel_library::error::Result<Outcome> {
    let session = Session::open(options, status).await?;
    let reconciled = session.reconciled();
    tracing::info!(
        cached = reconciled.cached,
        synthesized = reconciled.synthesized,
        dropped = reconciled.dropped,
        "Metadata reconciled"
    );
    session.close().await
}
