//! Weather-Station Monitoring Service - Main Daemon
//!
//! A server-side daemon that continuously:
//! 1. Discovers the observation terms held by every telemetry server
//! 2. Reconciles the selected term across all configured stations
//! 3. Converts raw values into display units
//! 4. Publishes the resulting matrix, optionally over HTTP
//!
//! Usage:
//!   cargo run --release                      # Start daemon without HTTP endpoint
//!   cargo run --release -- --endpoint 8080   # Start with HTTP endpoint on port 8080
//!   cargo run --release -- --config my.toml  # Use another configuration file
//!
//! Environment:
//!   WXMON_CONFIG   - configuration file (default: wxmon.toml)
//!   WXMON_ENDPOINT - HTTP endpoint port
//!   RUST_LOG       - log filter, overrides --log-level

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use wxmon_service::config::{self, DEFAULT_CONFIG_PATH};
use wxmon_service::convert::UnitConverter;
use wxmon_service::daemon::{Daemon, DaemonConfig};
use wxmon_service::endpoint::{self, EndpointContext};
use wxmon_service::ingest::HttpSource;
use wxmon_service::logging::init_tracing;
use wxmon_service::stations::StationRegistry;

#[derive(Parser, Debug)]
#[command(name = "wxmon", version, about = "Weather-station telemetry monitoring daemon")]
struct Args {
    /// Configuration file
    #[arg(long, env = "WXMON_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Serve the JSON endpoint on this port
    #[arg(long, env = "WXMON_ENDPOINT")]
    endpoint: Option<u16>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init_tracing(&args.log_level);

    info!(config = %args.config.display(), "starting wxmon");

    let wx_config = match config::load_config(&args.config) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            std::process::exit(1);
        }
    };

    let source = match HttpSource::new(wx_config.settings.request_timeout()) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!(error = %e, "failed to create HTTP client");
            std::process::exit(1);
        }
    };

    let daemon = Daemon::new(
        DaemonConfig::from_settings(&wx_config.settings),
        StationRegistry::from_config(&wx_config),
        UnitConverter::from_config(&wx_config),
        source,
    );

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        if let Err(e) = ctrlc::set_handler(move || stop.store(true, Ordering::Release)) {
            warn!(error = %e, "failed to install Ctrl-C handler");
        }
    }

    info!("initializing catalog and terms");
    daemon.initialize();

    // Start HTTP endpoint if requested (in background thread)
    if let Some(port) = args.endpoint {
        let ctx = EndpointContext::from_daemon(&daemon);
        std::thread::spawn(move || {
            if let Err(e) = endpoint::start_endpoint_server(port, ctx) {
                error!(error = %e, "endpoint server stopped");
            }
        });
    }

    daemon.run(&stop);
}
