//! Bootstrap: load configuration, initialize logging, build the router,
//! bind, and serve, in that order: config → logging → services → serve,
//! with CLI flags (`clap::Parser`) overriding config/env.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tty_agent_core::{config::Config, logging};

use tty_agent_api::{router, AppState};

#[derive(Parser, Debug)]
#[command(name = "tty-agent")]
#[command(about = "Sealos terminal gateway: xterm.js to Kubernetes pods/exec", long_about = None)]
struct Args {
    /// Override the listen port (takes precedence over config/env).
    #[arg(long, env = "TTY_AGENT_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load().context("failed to load configuration")?;
    if let Some(port) = args.port {
        config.server.port = port;
    }

    logging::init_logging(&config.logging).context("failed to initialize logging")?;

    info!(address = %config.server.address(), "tty-agent starting");

    let ticket_ttl_ms = config.ws.ticket_ttl_ms;
    let state = AppState::new(config);
    let _sweeper = state.ticket_store.spawn_sweeper();
    info!(ticket_ttl_ms, "ticket store sweeper started");

    let address = state.config.server.address();
    let app = router::build(state.clone());

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;

    state.mark_ready();
    info!(address = %address, "listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .context("server error")?;

    Ok(())
}
