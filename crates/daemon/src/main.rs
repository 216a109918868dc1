#![forbid(unsafe_code)]

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use checkflow_daemon::{
    config::{Args, DaemonConfig},
    service::{Collaborators, Service},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&args.log))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = DaemonConfig::try_from(args)?;
    let parts = Collaborators::from_config(&config).await?;
    let service = Service::build(&config, parts)?;

    tracing::info!(listen = %config.listen, "daemon starting");
    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("binding {}", config.listen))?;
    axum::serve(listener, service.router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for task in service.background {
        task.abort();
    }
    tracing::info!("daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
