use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use tally::{Config, Server, TodoStore, app, shutdown_signal};
use tracing_subscriber::EnvFilter;

/// Exit status for every way the process ends, including a clean shutdown
/// after SIGINT/SIGTERM. There is no path that exits 0.
const INTERRUPTED: u8 = 1;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    match run().await {
        Ok(()) => tracing::info!("server stopped after interrupt"),
        Err(e) => tracing::error!("{e:#}"),
    }
    ExitCode::from(INTERRUPTED)
}

async fn run() -> anyhow::Result<()> {
    let config = Config::from_env().context("failed to read configuration")?;

    let store: TodoStore = [(1, "wire up the middleware"), (2, "write the tests")]
        .into_iter()
        .collect();
    let router = app(Arc::new(store), config.request_timeout);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let server = Server::bind(addr)
        .grace_period(config.shutdown_grace)
        .body_read_timeout(config.request_timeout)
        .listen(router)
        .await
        .context("failed to init server")?;
    tracing::info!(port = config.port, "server listening on port");

    shutdown_signal().await;
    tracing::info!("signal interrupt detected, shutting down");

    server.shutdown().await.context("failed to shutdown server")
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hyper=warn,hyper_util=warn"));

    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }
}
