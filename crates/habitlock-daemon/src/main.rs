use anyhow::Result;
use habitlock_daemon::config::DaemonConfig;
use habitlock_daemon::daemon;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = DaemonConfig::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.daemon.log_level)),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("Starting habitlock daemon");

    if let Err(e) = daemon::run(config).await {
        error!("Daemon error: {:#}", e);
        return Err(e);
    }

    info!("habitlock daemon stopped");
    Ok(())
}
