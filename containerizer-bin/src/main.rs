use clap::Parser;
use color_eyre::eyre;
use containerizer_orchestrator::Orchestrator;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Args, Mode};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = args.load_config()?;
    info!(
        mode = ?args.mode,
        handle = %config.handle,
        control_plane = %format!("{}:{}", config.control_plane_host, config.control_plane_port),
        install_root = %config.install_root.display(),
        "Starting containerizer driver..."
    );

    let mut orchestrator = Orchestrator::new(config)?;
    let result = drive(&mut orchestrator, args.mode).await;
    if let Err(e) = &result {
        error!(error = %e, "lifecycle failed, tearing down");
    }

    let report = orchestrator.teardown().await;
    result?;
    if !report.is_clean() {
        eyre::bail!("teardown finished with {} failed step(s)", report.failures.len());
    }
    info!("Shutdown complete.");
    Ok(())
}

/// Brings the container up for `mode` and holds it until interrupted.
async fn drive(orchestrator: &mut Orchestrator, mode: Mode) -> eyre::Result<()> {
    orchestrator.start_host().await?;
    orchestrator.create_container().await?;
    if mode == Mode::Run {
        orchestrator.deploy_application().await?;
        orchestrator.run_application().await?;
    }

    info!(state = %orchestrator.state(), "Container ready. Press Ctrl-C to tear down.");
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Interrupt received.");
        }
        _ = orchestrator.stream_closed() => {
            warn!("Run stream ended.");
        }
    }
    Ok(())
}
