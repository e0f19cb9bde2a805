//! codesandbox server - HTTP front end for the sandbox pool

use clap::Parser;
use codesandbox::config::{
    apply_env_overrides, load_config, load_config_from_path, validate_config, Config, LogConfig,
    LogFormat,
};
use codesandbox::executor::start_executor;
use codesandbox::server::build_router;
use codesandbox::VERSION;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// ---- CLI ----

#[derive(Parser)]
#[command(name = "codesandbox-server", version = VERSION, about = "Pooled code execution server")]
struct Args {
    /// Config file (JSON5 or TOML); defaults to the user config path
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Bind address, overrides server.bind
    #[arg(long)]
    bind: Option<String>,

    /// Port, overrides server.port
    #[arg(long, short)]
    port: Option<u16>,
}

fn load(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => {
            dotenvy::dotenv().ok();
            let mut config = load_config_from_path(path)?;
            apply_env_overrides(&mut config)?;
            config
        }
        None => load_config()?,
    };

    if let Some(bind) = &args.bind {
        config.server.bind = bind.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    Ok(config)
}

fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_new(&log.level).unwrap_or_else(|_| EnvFilter::new("info"));

    match log.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Shutdown signal received");
}

// ---- Main ----

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load(&args)?;

    init_tracing(&config.log);

    let validation = validate_config(&config);
    for issue in &validation.warnings {
        warn!("{}: {}", issue.path, issue.message);
    }
    validation.into_result()?;

    info!(
        image = %config.container.image,
        core_size = config.pool.core_size,
        max_size = config.pool.max_size,
        "Starting codesandbox {}",
        VERSION
    );

    let executor = Arc::new(start_executor(&config).await?);
    let app = build_router(executor.clone());

    // Bind and serve
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let pool = executor.pool();
    pool.shutdown().await;
    let stats = pool.stats();
    info!(
        created = stats.created,
        destroyed = stats.destroyed,
        replaced = stats.replaced,
        evicted = stats.evicted,
        "Server stopped"
    );

    Ok(())
}
