use std::env;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{debug, error, info, warn};

use rtc_bridge::{
    CommandDispatcher, EventSink, HeadlessSurface, LoopbackFactory, SurfaceHandle,
    SurfaceRegistry, marshaller,
};
use rtc_log::{LogConfig, init_logging};
use rtc_protocol::{Arguments, EventMessage};

mod caller;
use caller::CallerConnection;

mod config;
use config::Config;

mod connections;
use connections::ConnectionManager;

const VERSION: &str = "0.1.0";
const DELIVERY_THREAD: &str = "rtc-delivery";

/// Get default config path based on executable location
fn default_config_path() -> String {
    env::current_exe()
        .ok()
        .and_then(|exe_path| {
            let stem = exe_path.file_stem()?;
            let parent = exe_path.parent()?;
            Some(parent.join(stem).with_extension("json"))
        })
        .and_then(|path| path.to_str().map(|s| s.to_string()))
        .unwrap_or_else(|| "./rtc_host.json".to_string())
}

/// RTC Bridge Host - exposes the bridge over a TCP method channel
#[derive(Parser, Debug)]
#[command(name = "rtc_host")]
#[command(version = VERSION)]
#[command(about = "Method channel host for the RTC bridge", long_about = None)]
struct Args {
    /// Path to configuration file (JSON); defaults are used when the default file is absent
    #[arg(short, long, env = "RTC_CONFIG")]
    config: Option<String>,

    /// Enable logging to file (rtc_host.log in current directory)
    #[arg(long, env = "RTC_LOG_FILE")]
    log_file: bool,

    /// Override the configured log level (trace, debug, info, warn, error)
    #[arg(long, env = "RTC_LOG_LEVEL")]
    level: Option<String>,
}

fn load_config(args: &Args) -> Result<(Config, String), config::ConfigError> {
    match &args.config {
        Some(path) => Ok((Config::from_json_file(path)?, path.clone())),
        None => {
            let path = default_config_path();
            if Path::new(&path).exists() {
                Ok((Config::from_json_file(&path)?, path))
            } else {
                Ok((Config::default(), "<defaults>".to_string()))
            }
        }
    }
}

/// Register the configured headless views; the returned handles keep them alive
fn register_headless_views(config: &Config, surfaces: &SurfaceRegistry) -> Vec<SurfaceHandle> {
    config
        .headless_views
        .iter()
        .map(|view_id| {
            let surface = HeadlessSurface::handle(format!("headless-{}", view_id));
            surfaces.add(*view_id, &surface);
            debug!("Registered headless view {}", view_id);
            surface
        })
        .collect()
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // We can't log errors yet, so we use eprintln! for early failures
    let (mut config, config_source) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Some(level) = &args.level {
        config.log_level = level.clone();
        if let Err(e) = config.validate() {
            eprintln!("Invalid --level: {}", e);
            std::process::exit(1);
        }
    }

    let log_config = if args.log_file {
        match std::fs::File::create("rtc_host.log") {
            Ok(file) => LogConfig::new("rtc_host::")
                .with_level(config.level())
                .with_log_file(file),
            Err(e) => {
                eprintln!("Unable to create rtc_host.log: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        LogConfig::<std::fs::File>::new("rtc_host::").with_level(config.level())
    };

    if let Err(e) = init_logging(log_config) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    info!("RTC Bridge Host v{}", VERSION);
    info!("Configuration: {}", config_source);

    debug!("Settings:");
    debug!("  Local IP: {}", config.local_ip);
    debug!("  Local Port: {}", config.local_port);
    debug!("  Log Level: {}", config.log_level);
    debug!("  Max Frame Size: {}", config.max_frame_size);
    debug!("  SDK Version: {}", config.sdk_version);
    debug!("  Headless Views: {:?}", config.headless_views);

    // 1. Bridge wiring: delivery thread, surfaces, dispatcher
    let connections = ConnectionManager::new();
    let surfaces = Arc::new(SurfaceRegistry::new());
    let _headless_views = register_headless_views(&config, &surfaces);

    let (marshaller, delivery) = marshaller::channel();
    if let Err(e) = delivery.spawn(DELIVERY_THREAD) {
        error!("Failed to start delivery thread: {}", e);
        return;
    }

    let event_connections = connections.clone();
    let sink: Arc<dyn EventSink> =
        Arc::new(move |event: EventMessage| event_connections.broadcast(event));

    let factory = Arc::new(LoopbackFactory::with_sdk_version(config.sdk_version.clone()));
    let dispatcher = Arc::new(CommandDispatcher::new(
        factory,
        surfaces,
        marshaller,
        sink,
    ));

    // 2. TCP listener for method channel callers
    let bind_addr = config.bind_addr();
    info!("Binding TCP on {}...", bind_addr);

    let listener = match TcpListener::bind(&bind_addr).await {
        Ok(listener) => {
            info!("TCP listener started successfully");
            listener
        }
        Err(e) => {
            error!("Failed to bind TCP listener on {}: {}", bind_addr, e);
            return;
        }
    };

    info!("Waiting for callers...(Use Ctrl+C to shutdown)");

    // 3. Main loop (TCP accept + signal handling)
    let max_frame_size = config.max_frame_size.as_bytes();
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C)");
                break;
            }

            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        let caller = CallerConnection::new(
                            stream,
                            addr,
                            dispatcher.clone(),
                            connections.clone(),
                            max_frame_size,
                        );
                        tokio::spawn(caller.handle());
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                    }
                }
            }
        }
    }

    info!("Shutting down host gracefully...");

    if dispatcher.has_session() {
        if let Err(e) = dispatcher.handle("destroy", &Arguments::new()) {
            warn!("Failed to destroy engine session: {}", e);
        }
    }

    info!("Shutdown complete ({} callers still connected).", connections.count());
}
