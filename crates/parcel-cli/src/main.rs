//! Parcel CLI: batch-upload files straight to object storage.
//!
//! Set PARCEL_API_TOKEN and PARCEL_API_URL (or API_URL). See `ClientConfig`
//! for the remaining settings.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use parcel_cli::{build_batch, format_event, init_tracing, resolve_visibility, summarize};
use parcel_client::{ElapsedSnapshot, UploadEvent, UploadOrchestrator};
use parcel_core::{session_from_env, ClientConfig};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::info;

#[derive(Parser)]
#[command(name = "parcel", about = "Parcel batch upload CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload files in order; stops at the first failure
    Upload {
        /// Files to upload, processed in the given order
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Display name for the file at the same position (repeatable)
        #[arg(long = "name", value_name = "NAME")]
        names: Vec<String>,
        /// Description applied to every file
        #[arg(long, default_value = "")]
        description: String,
        /// Publish the records publicly (admin role only)
        #[arg(long)]
        public: bool,
        /// Print the final report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize report")?;
    println!("{}", out);
    Ok(())
}

/// Prints progress lines until the orchestrator goes away. The slow-upload
/// advisory is printed at most once.
async fn print_progress(
    mut events: mpsc::UnboundedReceiver<UploadEvent>,
    mut elapsed: watch::Receiver<ElapsedSnapshot>,
) {
    let mut total = 0;
    let mut advised = false;
    let mut watching = true;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                if let UploadEvent::BatchStarted { total: count } = &event {
                    total = *count;
                }
                if let Some(line) = format_event(&event, total) {
                    eprintln!("{}", line);
                }
            }
            changed = elapsed.changed(), if watching && !advised => {
                if changed.is_err() {
                    watching = false;
                } else {
                    let snapshot = *elapsed.borrow_and_update();
                    if let (true, Some(advisory)) = (snapshot.running, snapshot.advisory()) {
                        eprintln!("{} ({}s elapsed)", advisory, snapshot.elapsed.as_secs());
                        advised = true;
                    }
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Upload {
            files,
            names,
            description,
            public,
            json,
        } => {
            let config = ClientConfig::from_env().context("Invalid upload configuration")?;
            let session = session_from_env().context(
                "Failed to load session. Set PARCEL_API_TOKEN (or API_TOKEN)",
            )?;
            let visibility = resolve_visibility(public, &session)?;
            let mut batch = build_batch(&files, &names, &description, visibility).await?;

            let mut orchestrator = UploadOrchestrator::from_config(&config, &session)
                .context("Failed to create upload client")?;
            let events = orchestrator
                .take_events()
                .context("Progress events already taken")?;
            let progress = (!json).then(|| tokio::spawn(print_progress(events, orchestrator.elapsed())));

            info!(files = batch.len(), api_url = %config.api_url, "Submitting batch");
            let result = orchestrator.run(&mut batch, &session).await;

            // Closes the event channel so the printer drains and exits.
            drop(orchestrator);
            if let Some(progress) = progress {
                progress.await.context("Progress printer panicked")?;
            }

            let report = result?;
            if json {
                print_json(&report)?;
            } else {
                for line in summarize(&report, &batch) {
                    if report.succeeded() {
                        println!("{}", line);
                    } else {
                        eprintln!("{}", line);
                    }
                }
            }

            if !report.succeeded() {
                bail!("Batch upload aborted");
            }
        }
    }

    Ok(())
}
