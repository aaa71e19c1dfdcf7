mod cli;

use anyhow::Result;
use boltd::api::ApiServer;
use boltd::config::DaemonConfig;
use boltd::daemon::Daemon;
use boltd::probe::{HostCapabilities, replace_daemon};
use clap::Parser;
use cli::{Cli, Commands};
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::oneshot;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = DaemonConfig::load(cli.config.as_deref())?;
    let _guard = config.logging.init_tracing(cli.verbose)?;

    match cli.command {
        Commands::Serve { bind, port } => {
            if let Some(bind) = bind {
                config.server.bind_address = bind;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            serve(config).await?;
        }

        Commands::Probe => {
            let host = HostCapabilities::probe(&config.idmap)?;
            println!("{}", serde_json::to_string_pretty(&host)?);
        }
    }

    Ok(())
}

/// Serve until Ctrl-C. SIGHUP re-executes the daemon binary in place.
async fn serve(config: DaemonConfig) -> Result<()> {
    info!("🚀 boltd starting up...");

    let daemon = Arc::new(Daemon::init(config)?);
    let server = ApiServer::new(daemon)?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let mut server_task = tokio::spawn(server.run(async {
        let _ = shutdown_rx.await;
    }));
    let mut hangup = signal(SignalKind::hangup())?;

    loop {
        tokio::select! {
            result = &mut server_task => {
                // The server only returns on its own when it failed to start.
                result??;
                return Ok(());
            }
            _ = hangup.recv() => {
                info!("Received SIGHUP, re-executing daemon");
                if let Err(e) = replace_daemon() {
                    error!("Failed to re-execute daemon: {}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    if shutdown_tx.send(()).is_err() {
        warn!("API server already stopped");
    }
    server_task.await??;
    Ok(())
}
