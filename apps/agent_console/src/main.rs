use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use capture_core::{CaptureClient, CaptureHandle, HttpPaymentGateway, WsPushChannel};
use clap::Parser;
use shared::domain::CallId;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{describe_event, describe_snapshot, Command};

#[derive(Parser, Debug)]
struct Args {
    /// Identifier of the live call to capture payment details on.
    #[arg(long)]
    call_id: String,
    #[arg(long)]
    gateway_url: Option<String>,
    #[arg(long)]
    push_url: Option<String>,
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = config::load_settings(args.config.as_deref())?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let gateway_url = args
        .gateway_url
        .or(settings.gateway_url)
        .context("--gateway-url or APP__GATEWAY_URL is required")?;
    let push_url = args
        .push_url
        .or(settings.push_url)
        .context("--push-url or APP__PUSH_URL is required")?;

    let client = CaptureClient::new_with_dependencies(
        settings.capture,
        Arc::new(HttpPaymentGateway::new(gateway_url)),
        Arc::new(WsPushChannel::new(&push_url)?),
    );

    let mut events = BroadcastStream::new(client.subscribe_events());
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                Ok(event) => println!("{}", describe_event(&event)),
                Err(err) => warn!(%err, "console: event stream lagged"),
            }
        }
    });

    client
        .start(CallId::new(args.call_id))
        .await
        .context("failed to start payment capture")?;
    println!("commands: reset <card|cvc|expiry>, submit, cancel, status, quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };

        // Failures are already printed from the event stream.
        let outcome = match command {
            Command::Reset(field) => client.reset_field(field).await,
            Command::Submit => client.submit().await,
            Command::Cancel => client.cancel().await,
            Command::Status => {
                println!("{}", describe_snapshot(&client.snapshot().await));
                Ok(())
            }
            Command::Quit => break,
        };
        if outcome.is_ok() && matches!(command, Command::Submit | Command::Cancel) {
            break;
        }
    }

    client.shutdown().await;
    info!("console: exiting");
    Ok(())
}
