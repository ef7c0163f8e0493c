//! One-shot Snapshot
//!
//! Runs a single reconciliation pass without starting the daemon and prints
//! the resulting table: measurement types down, stations across, `---`
//! where a station has no reading.
//!
//! Usage:
//!   cargo run --bin fetch_snapshot                     # newest term
//!   cargo run --bin fetch_snapshot -- --term-index 3   # fourth newest term
//!   cargo run --bin fetch_snapshot -- --json           # table as JSON

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use wxmon_service::analysis::table::{build_table, TableView};
use wxmon_service::config::{self, DEFAULT_CONFIG_PATH};
use wxmon_service::convert::UnitConverter;
use wxmon_service::daemon::{Daemon, DaemonConfig, PassOutcome};
use wxmon_service::ingest::HttpSource;
use wxmon_service::logging::init_tracing;
use wxmon_service::stations::StationRegistry;

#[derive(Parser, Debug)]
#[command(about = "Reconcile one term across all stations and print the table")]
struct Args {
    #[arg(long, env = "WXMON_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Position in the term list, 0 = newest
    #[arg(long, default_value_t = 0)]
    term_index: usize,

    /// Print the table as JSON
    #[arg(long)]
    json: bool,

    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init_tracing(&args.log_level);

    let wx_config = config::load_config(&args.config)?;
    let source = Arc::new(HttpSource::new(wx_config.settings.request_timeout())?);
    let daemon = Daemon::new(
        DaemonConfig::from_settings(&wx_config.settings),
        StationRegistry::from_config(&wx_config),
        UnitConverter::from_config(&wx_config),
        source,
    );

    daemon.initialize();
    daemon.select_term(args.term_index)?;

    match daemon.run_pass() {
        PassOutcome::Published { .. } => {}
        PassOutcome::Aborted(e) => return Err(e.into()),
        PassOutcome::Skipped => return Err("another pass is already running".into()),
    }

    let state = daemon.state();
    let view = build_table(&state.catalog(), &daemon.registry(), &state.snapshot());

    if args.json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print_table(&view);
    }
    Ok(())
}

fn print_table(view: &TableView) {
    if let Some(label) = &view.term_label {
        println!("Term: {}\n", label);
    }

    let label_width = view
        .rows
        .iter()
        .map(|r| r.label.chars().count())
        .max()
        .unwrap_or(0);
    let widths: Vec<usize> = view
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            view.rows
                .iter()
                .filter_map(|r| r.cells.get(i))
                .map(|cell| cell.chars().count())
                .chain(std::iter::once(c.name.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    print!("{:<label_width$}", "");
    for (column, width) in view.columns.iter().zip(&widths) {
        print!("  {:<width$}", column.name, width = *width);
    }
    println!();

    for row in &view.rows {
        print!("{:<label_width$}", row.label);
        for (cell, width) in row.cells.iter().zip(&widths) {
            print!("  {:>width$}", cell, width = *width);
        }
        println!();
    }
}
