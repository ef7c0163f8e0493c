//! Term Listing
//!
//! Scans every configured telemetry server and prints the observation
//! terms it holds, newest first, with the index `POST /terms/select/{index}`
//! and `fetch_snapshot --term-index` expect.
//!
//! Usage:
//!   cargo run --bin list_terms
//!   cargo run --bin list_terms -- --config other.toml --limit 10

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use threadpool::ThreadPool;

use wxmon_service::config::{self, DEFAULT_CONFIG_PATH};
use wxmon_service::ingest::HttpSource;
use wxmon_service::logging::init_tracing;
use wxmon_service::stations::StationRegistry;
use wxmon_service::terms::{discover_terms, format_term};

#[derive(Parser, Debug)]
#[command(about = "List observation terms available on the telemetry servers")]
struct Args {
    #[arg(long, env = "WXMON_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Print at most this many terms
    #[arg(long)]
    limit: Option<usize>,

    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init_tracing(&args.log_level);

    let wx_config = config::load_config(&args.config)?;
    let source = Arc::new(HttpSource::new(wx_config.settings.request_timeout())?);
    let registry = StationRegistry::from_config(&wx_config);
    let pool = ThreadPool::new(wx_config.settings.workers);

    println!("Observation terms");
    println!("=================\n");

    let terms = discover_terms(source, &registry, &pool, wx_config.settings.max_term_pages);
    if terms.is_empty() {
        println!("No terms found on {} server(s).", registry.servers().len());
        return Ok(());
    }

    let shown = args.limit.unwrap_or(terms.len()).min(terms.len());
    for (index, term) in terms.iter().take(shown).enumerate() {
        println!("{:>4}  {}  ({})", index, format_term(*term), term);
    }
    if shown < terms.len() {
        println!("  ... {} more", terms.len() - shown);
    }

    Ok(())
}
