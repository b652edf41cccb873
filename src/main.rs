//! TicketFlow CLI entry point
//!
//! A thin composition layer: parse arguments, initialize logging, wire
//! SIGINT to the cancellation token, route the verb, and translate a
//! surfaced error into stderr diagnostics plus a non-zero exit code.

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use ticketflow::cli::{execute, Cli};
use ticketflow::output::render_error;

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ticketflow={default_level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            signal_token.cancel();
        }
    });

    if let Err(e) = execute(cli.command, cancel).await {
        render_error(&e);
        std::process::exit(1);
    }
}
