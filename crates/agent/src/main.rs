//! Node-agent binary: tail the tunnel log, ship batches to the collector.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};

use argus_agent::{AgentConfig, AgentError, BatchReporter, RealtimeTailer};
use argus_core::ConnectionReport;

#[derive(Parser)]
#[command(name = "argus-agent", about = "Argus node agent")]
struct Cli {
    /// Path to the agent TOML configuration.
    #[arg(long, env = "ARGUS_AGENT_CONFIG", default_value = "agent.toml")]
    config: PathBuf,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), AgentError> {
    init_tracing();
    let cli = Cli::parse();
    let config = AgentConfig::load(&cli.config)?;

    info!(
        node = %config.node_uuid,
        log = %config.xray_log_path.display(),
        "starting node agent"
    );

    let (tx, mut rx) = tokio::sync::mpsc::channel::<Vec<ConnectionReport>>(config.queue_capacity);

    // Tailer task: poll the log, enqueue non-empty batches. The queue is
    // the only state shared with the reporter.
    let mut tailer = RealtimeTailer::new(
        &config.xray_log_path,
        config.log_read_buffer_bytes,
        config.node_uuid,
    );
    let poll_interval = Duration::from_secs(config.poll_interval_seconds);
    let tailer_task = tokio::spawn(async move {
        loop {
            match tailer.poll().await {
                Ok(reports) if reports.is_empty() => {}
                Ok(reports) => {
                    if tx.send(reports).await.is_err() {
                        return;
                    }
                }
                Err(e) => warn!(error = %e, "tail cycle failed, retrying next poll"),
            }
            tokio::time::sleep(poll_interval).await;
        }
    });

    // Reporter task: drain the queue. Credential rejections are fatal for
    // the process; everything else is retried inside the reporter.
    let reporter = BatchReporter::new(config.reporter.clone())?;
    let reporter_task = tokio::spawn(async move {
        while let Some(reports) = rx.recv().await {
            match reporter.send(reports).await {
                Ok(_) => {}
                Err(AgentError::Rejected(status)) => {
                    error!(status, "collector rejected our token; stopping");
                    return Err(AgentError::Rejected(status));
                }
                Err(e) => warn!(error = %e, "batch dropped"),
            }
        }
        Ok(())
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            Ok(())
        }
        result = reporter_task => match result {
            Ok(inner) => inner,
            Err(e) => {
                error!(error = %e, "reporter task panicked");
                Ok(())
            }
        },
        _ = tailer_task => Ok(()),
    }
}
