//! TotalMix bridge server.

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use totalmix_bridge::{
    config::{Config, ConfigOverrides},
    create_app,
    osc::TransportError,
    state::AppState,
};

/// HTTP/JSON bridge to the RME TotalMix FX equalizers
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// HTTP port to listen on
    #[arg(long)]
    http_port: Option<u16>,

    /// UDP port TotalMix receives OSC on
    #[arg(long)]
    osc_send: Option<u16>,

    /// UDP port the bridge receives OSC replies on
    #[arg(long)]
    osc_listen: Option<u16>,

    /// Host running TotalMix
    #[arg(long)]
    device_host: Option<String>,

    /// Log every OSC message in and out
    #[arg(long)]
    debug: bool,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl From<Args> for ConfigOverrides {
    fn from(args: Args) -> Self {
        Self {
            http_port: args.http_port,
            device_host: args.device_host,
            osc_send: args.osc_send,
            osc_listen: args.osc_listen,
            debug: args.debug,
            log_file: args.log_file,
        }
    }
}

/// Initialize logging. The returned guard must live until exit so buffered
/// file output is flushed.
fn init_logging(config: &Config) -> anyhow::Result<Option<WorkerGuard>> {
    // RUST_LOG wins, then the configured level, then info
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(config.log_level.as_deref().unwrap_or("info"))
    });
    if config.debug {
        filter = filter.add_directive("totalmix_bridge=debug".parse()?);
    }

    let stdout_layer = fmt::layer().with_target(false).compact();

    match &config.log_file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let file_name = path
                .file_name()
                .context("Log file path has no file name")?;
            std::fs::create_dir_all(&directory)
                .with_context(|| format!("Cannot create log directory {}", directory.display()))?;

            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer().with_ansi(false).with_writer(writer);

            tracing_subscriber::registry()
                .with(filter)
                .with(stdout_layer)
                .with(file_layer)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stdout_layer)
                .init();
            Ok(None)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::from_figment(&ConfigOverrides::from(args))?;
    let _log_guard = init_logging(&config)?;

    info!("Starting TotalMix bridge v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Device {}:{}, listening for OSC on port {}",
        config.device_host, config.device_send_port, config.device_listen_port
    );

    let listen_port = config.device_listen_port;
    let state = match AppState::start(config).await {
        Ok(state) => state,
        Err(e) => {
            if let Some(TransportError::Bind { port, .. }) = e.downcast_ref::<TransportError>() {
                error!("Cannot listen for OSC on UDP port {}", port);
                error!("Is another instance of the bridge already running?");
                error!(
                    "Otherwise pick a free port with --osc-listen and set it as TotalMix's outgoing port"
                );
            } else {
                error!("Failed to start OSC transport: {:#}", e);
            }
            return Err(e);
        }
    };

    if state.config().eager_channel_query {
        match state.registry().ensure_loaded(state.transport()).await {
            Ok(()) => info!(
                "Found {} output channels",
                state.registry().known_count()
            ),
            Err(e) => warn!("Initial channel query failed: {}", e),
        }
    }

    let app = create_app(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], state.config().port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Cannot listen on HTTP port {}", addr.port()))?;
    info!("Server listening on {} (OSC listen port {})", addr, listen_port);

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down gracefully...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    state.shutdown().await;
    info!("Server shut down");
    Ok(())
}
