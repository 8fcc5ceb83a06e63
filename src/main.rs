//! Scorebot: supervisor entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config
//!   3. Init logger once
//!   4. Spawn Ctrl-C / SIGTERM → shutdown signal watcher
//!   5. Run the supervisor until shutdown, then drain

use tokio_util::sync::CancellationToken;
use tracing::info;

use scorebot::{config, error, logger, supervisor};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), error::AppError> {
    // Load .env if present: ignore errors (file is optional).
    let _ = dotenvy::dotenv();

    let config = config::load()?;

    logger::init(&config.log_level, config.log_level_forced)?;

    info!(
        mode = config.mode.name(),
        database = %config.database_path.display(),
        log_level = %config.log_level,
        "config loaded"
    );

    // Shared shutdown token: signals cancel it, all tasks watch it.
    let shutdown = CancellationToken::new();
    supervisor::spawn_signal_watcher(shutdown.clone());

    supervisor::run(config, shutdown).await?;

    info!("shutdown complete");
    Ok(())
}
