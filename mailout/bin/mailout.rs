#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

use std::path::PathBuf;

use clap::Parser;
use mailout::{Mailout, find_config_file, shutdown::cancel_on_signal};
use mailout_common::{
    logging,
    tracing::{error, info},
};
use tokio_util::sync::CancellationToken;

/// Drain the outbound mail queue once
#[derive(Parser, Debug)]
#[command(name = "mailout")]
#[command(version)]
struct Cli {
    /// Configuration file (default: $MAILOUT_CONFIG, ./mailout.config.ron,
    /// /etc/mailout/mailout.config.ron)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Messages fetched per cycle, overriding the configuration file
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Single-instance lock file, overriding the configuration file
    #[arg(long, conflicts_with = "no_lock")]
    lock_file: Option<PathBuf>,

    /// Run without a lock file
    #[arg(long)]
    no_lock: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => find_config_file()?,
    };
    let mut mailout = Mailout::from_file(&config_path)?;

    if let Some(batch_size) = cli.batch_size {
        mailout.dispatch.batch_size = batch_size;
    }
    if cli.no_lock {
        mailout.lock_file = None;
    } else if cli.lock_file.is_some() {
        mailout.lock_file = cli.lock_file;
    }

    logging::init();

    let cancel = CancellationToken::new();
    let signals = tokio::spawn(cancel_on_signal(cancel.clone()));

    let result = mailout.run(cancel.clone()).await;

    cancel.cancel();
    match signals.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Signal handling failed"),
        Err(e) => error!(error = %e, "Signal task failed"),
    }

    let summary = result?;
    info!(
        batches = summary.batches,
        sent = summary.sent,
        rejected = summary.rejected,
        failed = summary.failed,
        "{summary}"
    );

    Ok(())
}
