//! Bridge server binary entry point.
//!
//! Usage: remote-call-server [--config <path>] [--bind <addr>] [--timeout-secs <n>]

use clap::Parser;
use remote_call_core::SessionRegistry;
use remote_call_server::{BridgeServer, LogFormat, ServerConfig, ServerResult};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{error, info};

/// Remote call bridge: lets an orchestrator run named calls on connected peers.
#[derive(Parser, Debug)]
#[command(name = "remote-call-server")]
#[command(about = "WebSocket bridge that forwards calls to connected peers")]
struct Args {
    /// Path to a JSON config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to listen on.
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Default call timeout in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

impl Args {
    fn apply(self, config: &mut ServerConfig) {
        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        if let Some(secs) = self.timeout_secs {
            config.call_timeout_secs = secs;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
    }
}

#[tokio::main]
async fn main() -> ServerResult<()> {
    let args = Args::parse();

    let mut config = ServerConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;

    remote_call_server::init_with_config(&config.log_config())?;

    info!(
        bind = %config.bind_addr,
        call_timeout_secs = config.call_timeout_secs,
        log_level = %config.log_level,
        log_format = ?config.log_format,
        "Configuration loaded"
    );

    let server =
        BridgeServer::bind(config.bind_addr, SessionRegistry::new(), config.call_timeout())
            .await?;
    let shutdown = server.shutdown_sender();
    let mut server_task = tokio::spawn(server.run());

    tokio::select! {
        result = &mut server_task => {
            match result {
                Ok(Err(e)) => {
                    error!(error = %e, "Server exited with error");
                    return Err(e);
                }
                Err(e) => error!(error = %e, "Server task panicked"),
                Ok(Ok(())) => {}
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal, exiting...");
            let _ = shutdown.send(());
            let _ = server_task.await;
        }
    }

    Ok(())
}
