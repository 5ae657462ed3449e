//! Tracing setup and the `serve` / `check-config` commands.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use devbridge_bridge::{
    handler_fn, spawn_reconnect, MessageBridge, NativeTransport, ReconnectPolicy,
    WebSocketTransport,
};
use devbridge_config::{
    Config, ConfigLoader, ConfigValidator, LoggingConfig, ReconnectConfig, TransportConfig,
    TransportKind,
};
use devbridge_core::{CorrelationStore, ProviderRegistry, ResponseCache};
use devbridge_protocols::{actions, Transport};
use devbridge_runtime::{RequestCoordinator, SessionSynchronizer};

use crate::handlers::register_handlers;
use crate::register::{cache_policy, register_providers, retry_config};

/// Initialize tracing with console and file output.
///
/// The console layer writes to stderr because the native transport owns
/// stdout. Log files rotate daily under `logging.dir`.
pub(crate) fn init_tracing(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let log_dir = logging.log_dir();
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("devbridge")
        .filename_suffix("log")
        .max_log_files(14)
        .build(&log_dir)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Keeps the writer flushing until exit.
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let json_file = logging
        .json
        .then(|| fmt::layer().json().with_writer(non_blocking.clone()));
    let text_file = (!logging.json).then(|| {
        fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .with(json_file)
        .with(text_file)
        .try_init()?;

    Ok(())
}

/// Load and validate the configuration at `path`, printing the findings.
pub(crate) fn check_config(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = ConfigLoader::load(path)?;
    let result = ConfigValidator::validate(&config)?;

    for warning in &result.warnings {
        println!("warning: {}: {}", warning.path, warning.message);
    }
    for err in &result.errors {
        println!("error: {}: {}", err.path, err.message);
    }

    if !result.is_valid() {
        return Err(format!(
            "{} has {} error(s)",
            path.display(),
            result.errors.len()
        )
        .into());
    }

    println!(
        "{} is valid ({} provider(s), {} warning(s))",
        path.display(),
        config.providers.len(),
        result.warnings.len()
    );
    Ok(())
}

fn build_transport(config: &TransportConfig) -> Arc<dyn Transport> {
    match config.kind {
        TransportKind::Native => match &config.command {
            Some(command) => Arc::new(NativeTransport::spawn(command.clone(), config.args.clone())),
            None => Arc::new(NativeTransport::stdio()),
        },
        TransportKind::Websocket => Arc::new(WebSocketTransport::new(
            config.host.clone(),
            config.port,
            config.path.clone(),
        )),
    }
}

fn reconnect_policy(config: &ReconnectConfig) -> ReconnectPolicy {
    ReconnectPolicy {
        base_delay: std::time::Duration::from_millis(config.base_delay_ms),
        max_delay: std::time::Duration::from_millis(config.max_delay_ms),
        max_attempts: config.max_attempts,
    }
}

/// Build every component from `config` and run until ctrl-c, or until the
/// browser closes stdio when running as its native host.
pub(crate) async fn run_serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing(&config.logging)?;
    info!("Starting devbridge v{}", env!("CARGO_PKG_VERSION"));

    let validation = ConfigValidator::validate(&config)?;
    for warning in &validation.warnings {
        warn!("Config {}: {}", warning.path, warning.message);
    }
    if !validation.is_valid() {
        for err in &validation.errors {
            error!("Config {}: {}", err.path, err.message);
        }
        return Err(format!("invalid configuration ({} error(s))", validation.errors.len()).into());
    }

    let shutdown = CancellationToken::new();

    // Shared state, constructed once.
    let store = Arc::new(CorrelationStore::new(config.bridge.request_timeout()));
    let bridge = Arc::new(MessageBridge::with_store(config.bridge.origin, store.clone()));
    let registry = Arc::new(ProviderRegistry::new(config.registry.unavailable_threshold));
    let cache = Arc::new(ResponseCache::new());

    register_providers(&registry, &config.providers, &bridge);
    let coordinator = Arc::new(RequestCoordinator::new(
        registry,
        cache.clone(),
        retry_config(&config.coordinator),
        cache_policy(&config),
    ));

    let sessions = SessionSynchronizer::new(bridge.clone(), config.session.id.clone());
    sessions.attach();
    register_handlers(&bridge, coordinator, &sessions);

    store.spawn_sweeper(config.bridge.sweep_interval(), shutdown.clone());
    if config.cache.enabled {
        cache.spawn_sweeper(config.cache.sweep_interval(), shutdown.clone());
    }

    let stdio_host =
        config.transport.kind == TransportKind::Native && config.transport.command.is_none();
    let transport = build_transport(&config.transport);
    info!(
        "Using {} transport as {} side",
        transport.id(),
        config.bridge.origin.as_str()
    );
    bridge.attach(transport);

    // As a native host, the browser closing stdio ends the process.
    let (closed_tx, mut closed_rx) = mpsc::unbounded_channel::<String>();
    if stdio_host {
        bridge.subscribe(
            actions::DISCONNECTED,
            handler_fn(move |message| {
                let closed_tx = closed_tx.clone();
                async move {
                    let reason = message.payload["reason"]
                        .as_str()
                        .unwrap_or("closed")
                        .to_string();
                    let _ = closed_tx.send(reason);
                    Ok(serde_json::Value::Null)
                }
            }),
        );
    } else if config.bridge.reconnect.enabled {
        spawn_reconnect(
            &bridge,
            reconnect_policy(&config.bridge.reconnect),
            shutdown.clone(),
        );
    }

    bridge.connect().await?;
    if config.transport.kind == TransportKind::Websocket {
        info!(
            "Waiting for a peer on ws://{}{}",
            config.transport.address(),
            config.transport.path
        );
    }

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!("Failed to listen for ctrl-c: {}", e);
            }
            info!("Shutdown requested");
        }
        Some(reason) = closed_rx.recv() => {
            info!("Native host channel closed: {}", reason);
        }
    }

    shutdown.cancel();
    if let Err(e) = bridge.disconnect().await {
        warn!("Disconnect failed: {}", e);
    }
    bridge.shutdown();
    info!("devbridge stopped");
    Ok(())
}
