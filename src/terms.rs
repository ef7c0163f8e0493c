/// Term discovery: collects the observation times ("terms") the servers
/// hold data for.
///
/// Each server is scanned with a `lastid` cursor over all of its stations.
/// Every page yields the `point_at` values it contains and moves the cursor
/// to the highest record id seen; the scan ends on an empty page. Two guards
/// keep a misbehaving server from looping forever:
///   - a page cap (`settings.max_term_pages`)
///   - a stall check: a non-empty page that does not move the cursor ends
///     the scan
///
/// Servers are scanned concurrently; the union of their terms is returned
/// newest first.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::DateTime;
use threadpool::ThreadPool;
use tracing::{debug, warn};

use crate::ingest::client::{gather, JsonSource};
use crate::ingest::telemetry::fetch_records_after;
use crate::logging;
use crate::model::{Server, Term};
use crate::stations::StationRegistry;

/// Why a server scan stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanEnd {
    /// An empty page: the server has nothing newer.
    Exhausted,
    /// The page cap was reached.
    PageCap,
    /// A page did not advance the cursor.
    Stalled,
}

/// Terms found on one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerScan {
    pub terms: BTreeSet<Term>,
    pub pages: usize,
    pub end: ScanEnd,
}

impl Default for ServerScan {
    fn default() -> Self {
        Self {
            terms: BTreeSet::new(),
            pages: 0,
            end: ScanEnd::Exhausted,
        }
    }
}

/// Scans one server's records from id 0 upwards.
pub fn scan_server_terms(
    source: &dyn JsonSource,
    server: &Server,
    stations: &[String],
    max_pages: usize,
) -> ServerScan {
    let mut scan = ServerScan::default();
    if stations.is_empty() {
        return scan;
    }

    let mut last_id: i64 = 0;
    loop {
        if scan.pages >= max_pages {
            warn!(server = %server.name, pages = scan.pages, "term scan hit the page cap");
            scan.end = ScanEnd::PageCap;
            break;
        }

        let records = fetch_records_after(source, server, stations, last_id);
        scan.pages += 1;
        if records.is_empty() {
            scan.end = ScanEnd::Exhausted;
            break;
        }

        // Zero and missing timestamps are placeholders, not terms.
        scan.terms.extend(
            records
                .iter()
                .filter_map(|r| r.point_at)
                .filter(|&t| t != 0),
        );

        let page_max = records.iter().map(|r| r.id).max().unwrap_or(last_id);
        if page_max <= last_id {
            warn!(server = %server.name, last_id, "term scan cursor did not advance");
            scan.end = ScanEnd::Stalled;
            break;
        }
        debug!(server = %server.name, last_id = page_max, rows = records.len(), "term page");
        last_id = page_max;
    }

    scan
}

/// Scans every configured server and returns the distinct terms, newest
/// first. Unreachable servers contribute nothing.
pub fn discover_terms(
    source: Arc<dyn JsonSource>,
    registry: &StationRegistry,
    pool: &ThreadPool,
    max_pages: usize,
) -> Vec<Term> {
    let start = Instant::now();

    let jobs: Vec<(Server, Vec<String>)> = registry
        .servers()
        .iter()
        .map(|server| (server.clone(), registry.station_indices_for(&server.name)))
        .collect();

    let scans = gather(pool, jobs, move |(server, stations)| {
        scan_server_terms(source.as_ref(), &server, &stations, max_pages)
    });

    let mut all = BTreeSet::new();
    for scan in scans {
        all.extend(scan.terms);
    }
    let terms: Vec<Term> = all.into_iter().rev().collect();

    logging::log_operation_end("discover_terms", start, terms.len());
    terms
}

/// Renders a term as a UTC timestamp, e.g. `2024-05-01 12:00:00 UTC`.
/// Terms outside chrono's range fall back to the raw number.
pub fn format_term(term: Term) -> String {
    match DateTime::from_timestamp(term, 0) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => term.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
