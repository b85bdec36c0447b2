// /src/main.rs
use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use compass_console::{router, AppState, LiveBackends, ServerConfig};
use console_assets::AssetBank;

#[derive(Parser, Debug)]
#[command(name = "compass-console", about = "Web console for Compass indexes")]
struct Args {
    /// Address to bind (overrides BIND_ADDR)
    #[arg(long)]
    bind: Option<String>,
    /// Port (overrides PORT)
    #[arg(long)]
    port: Option<u16>,
    /// Settings file (overrides COMPASS_SETTINGS_FILE)
    #[arg(long)]
    settings: Option<PathBuf>,
    /// Log filter, e.g. "debug" (overrides RUST_LOG)
    #[arg(long)]
    log: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = match &args.log {
        Some(f) => EnvFilter::try_new(f)?,
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,axum=warn,tower_http=warn")),
    };
    fmt()
        .with_env_filter(filter)
        .compact() // лаконичный формат
        .with_target(false) // без имени таргета
        .init();
    info!("logger initialized");

    ServerConfig::load_dotenvs()?;
    let mut cfg = ServerConfig::from_env()?;
    if let Some(bind) = args.bind {
        cfg.http.bind_addr = bind;
    }
    if let Some(port) = args.port {
        cfg.http.bind_port = port;
    }
    if let Some(settings) = args.settings {
        cfg.storage.settings_file = settings;
    }
    cfg.log_summary(); // аккуратно логируем, ничего не паля

    let cfg = Arc::new(cfg);
    let state = AppState {
        backends: Arc::new(LiveBackends::new(cfg.clone())),
        assets: AssetBank::autodetect(),
    };
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", cfg.http.bind_addr, cfg.http.bind_port).parse()?;
    info!("listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}
