/// Core daemon implementation for the weather-station monitoring service.
///
/// This module implements the main daemon loop that:
/// 1. Builds the measurement catalog and the term list on startup
/// 2. Runs one pass per poll interval: optional term refresh, then
///    reconciliation of the selected term across every station
/// 3. Publishes each completed matrix to the shared `MonitorState`
///
/// Passes never overlap. A trigger that arrives while a pass is running
/// (operator refresh, term selection) schedules exactly one follow-up pass;
/// further triggers coalesce into it. The next scheduled pass starts a full
/// interval after the previous one finished.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use threadpool::ThreadPool;
use tracing::{debug, info, warn};

use crate::catalog::build_catalog;
use crate::config::Settings;
use crate::convert::UnitConverter;
use crate::error::SelectionError;
use crate::ingest::JsonSource;
use crate::model::Term;
use crate::monitor::MonitorState;
use crate::reconcile::reconcile;
use crate::stations::StationRegistry;
use crate::terms::{discover_terms, format_term};

/// Granularity of the wait between passes; bounds how long a stop request
/// or trigger waits to be noticed.
const WAIT_SLICE: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Delay between the end of one pass and the start of the next (default: 30 s)
    pub poll_interval: Duration,

    /// Page cap per server during term discovery (default: 10 000)
    pub max_term_pages: usize,

    /// Worker threads for concurrent requests (default: 4)
    pub workers: usize,

    /// Rediscover terms at the start of every pass (default: false)
    pub refresh_terms_each_pass: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl DaemonConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            poll_interval: settings.poll_interval(),
            max_term_pages: settings.max_term_pages,
            workers: settings.workers,
            refresh_terms_each_pass: settings.refresh_terms_each_pass,
        }
    }
}

// ---------------------------------------------------------------------------
// Pass control
// ---------------------------------------------------------------------------

/// Single-flight guard and trigger flags, shared with the endpoint.
#[derive(Debug, Default)]
pub struct PassControl {
    in_flight: AtomicBool,
    pending: AtomicBool,
    refresh_terms: AtomicBool,
}

/// Held for the duration of a pass; releases the guard on drop.
#[derive(Debug)]
pub struct InFlight<'a> {
    control: &'a PassControl,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.control.in_flight.store(false, Ordering::Release);
    }
}

impl PassControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the pass slot. `None` while another pass is running.
    pub fn begin(&self) -> Option<InFlight<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight { control: self })
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Asks for a pass as soon as the current one (if any) is done.
    pub fn trigger(&self) {
        self.pending.store(true, Ordering::Release);
    }

    /// Asks for term rediscovery, followed by a pass.
    pub fn request_term_refresh(&self) {
        self.refresh_terms.store(true, Ordering::Release);
        self.trigger();
    }

    /// Consumes an outstanding trigger.
    pub fn take_pending(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    fn take_refresh(&self) -> bool {
        self.refresh_terms.swap(false, Ordering::AcqRel)
    }
}

// ---------------------------------------------------------------------------
// Pass outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// A new snapshot was published.
    Published { term: Term, cells: usize, pass: u64 },
    /// No usable term; the previous snapshot stays.
    Aborted(SelectionError),
    /// Another pass was already running.
    Skipped,
}

// ---------------------------------------------------------------------------
// Daemon State
// ---------------------------------------------------------------------------

/// Main daemon state
pub struct Daemon {
    config: DaemonConfig,
    source: Arc<dyn JsonSource>,
    registry: Arc<StationRegistry>,
    converter: UnitConverter,
    state: Arc<MonitorState>,
    control: Arc<PassControl>,
    pool: ThreadPool,
}

impl Daemon {
    pub fn new(
        config: DaemonConfig,
        registry: StationRegistry,
        converter: UnitConverter,
        source: Arc<dyn JsonSource>,
    ) -> Self {
        let pool = ThreadPool::with_name("wxmon-fetch".to_string(), config.workers.max(1));
        Self {
            config,
            source,
            registry: Arc::new(registry),
            converter,
            state: Arc::new(MonitorState::new()),
            control: Arc::new(PassControl::new()),
            pool,
        }
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    pub fn registry(&self) -> Arc<StationRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn state(&self) -> Arc<MonitorState> {
        Arc::clone(&self.state)
    }

    pub fn control(&self) -> Arc<PassControl> {
        Arc::clone(&self.control)
    }

    /// Startup: build the catalog and discover terms. Unreachable servers
    /// are not fatal; they just contribute nothing.
    pub fn initialize(&self) {
        self.rebuild_catalog();
        self.refresh_terms();
    }

    fn rebuild_catalog(&self) {
        let catalog = build_catalog(
            Arc::clone(&self.source),
            &self.registry,
            &self.converter,
            &self.pool,
        );
        if catalog.is_empty() {
            warn!("measurement catalog is empty; no server answered with definitions");
        }
        self.state.set_catalog(catalog);
    }

    /// Rediscovers terms and resets the selection to the newest one.
    pub fn refresh_terms(&self) -> usize {
        let terms = self.fetch_terms();
        let count = terms.len();
        self.state.replace_terms(terms);
        count
    }

    fn fetch_terms(&self) -> Vec<Term> {
        let terms = discover_terms(
            Arc::clone(&self.source),
            &self.registry,
            &self.pool,
            self.config.max_term_pages,
        );
        let count = terms.len();
        match terms.first() {
            Some(&newest) => info!(count, newest = %format_term(newest), "terms refreshed"),
            None => warn!("no terms found on any server"),
        }
        terms
    }

    /// Selects a term by position in the term list and schedules a pass.
    pub fn select_term(&self, index: usize) -> Result<Term, SelectionError> {
        let term = self.state.select_term(index)?;
        self.control.trigger();
        Ok(term)
    }

    /// Runs one pass now, unless one is already running.
    pub fn run_pass(&self) -> PassOutcome {
        let Some(_guard) = self.control.begin() else {
            debug!("pass already in flight; skipping");
            return PassOutcome::Skipped;
        };

        if self.state.catalog().is_empty() {
            self.rebuild_catalog();
        }
        if self.control.take_refresh() {
            self.refresh_terms();
        } else if self.config.refresh_terms_each_pass {
            // Periodic refresh: an operator's selection survives it.
            self.state.update_terms(self.fetch_terms());
        }

        let term = match self.state.selected_term() {
            Ok(term) => term,
            Err(e) => {
                warn!(error = %e, "pass aborted; keeping previous snapshot");
                return PassOutcome::Aborted(e);
            }
        };

        let matrix = reconcile(
            term,
            Arc::clone(&self.source),
            &self.registry,
            &self.converter,
            &self.pool,
        );
        let cells = matrix.len();
        let pass = self.state.publish(term, matrix);
        info!(pass, term = %format_term(term), cells, "snapshot published");

        PassOutcome::Published { term, cells, pass }
    }

    /// Main daemon loop. Runs until `stop` is set.
    pub fn run(&self, stop: &AtomicBool) {
        info!(
            interval_secs = self.config.poll_interval.as_secs(),
            servers = self.registry.servers().len(),
            stations = self.registry.station_count(),
            "starting daemon loop"
        );

        while !stop.load(Ordering::Acquire) {
            self.run_pass();
            self.wait_for_next_pass(stop);
        }

        info!("daemon loop stopped");
    }

    /// Sleeps until the interval elapses, a trigger arrives or `stop` is set.
    fn wait_for_next_pass(&self, stop: &AtomicBool) {
        let deadline = Instant::now() + self.config.poll_interval;
        loop {
            if stop.load(Ordering::Acquire) || self.control.take_pending() {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            thread::sleep(WAIT_SLICE.min(deadline - now));
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::ingest::fixtures::*;
    use pretty_assertions::assert_eq;

    const CONFIG: &str = r#"
        [units]
        "k" = "C"
        "pa" = "гПа"

        [[server]]
        name = "central"
        url = "http://central"
        [[server.station]]
        index = "5"
        name = "Five"
    "#;

    fn scripted() -> Arc<ScriptedSource> {
        let source = Arc::new(ScriptedSource::new());
        source.respond("http://central/station_taking.json?station=5", fixture_station_taking_json());
        source.respond("http://central/measurement.json", fixture_definitions_json());
        source.respond(
            "http://central/get?streams=0&stations=5&lastid=0",
            r#"[
                {"id": 1, "code": "12101", "point_at": 1714543200},
                {"id": 2, "code": "12101", "point_at": 1714564800}
            ]"#,
        );
        source.respond("http://central/get?streams=0&stations=5&lastid=2", "[]");
        source.respond(
            "http://central/get?stations=5&streams=0&point_at=1714564800",
            fixture_station_records_json(),
        );
        source.respond(
            "http://central/get?stations=5&streams=0&point_at=1714543200",
            r#"[{"id": 1, "code": "12101", "value": "281.15", "unit": "k", "point_at": 1714543200}]"#,
        );
        source
    }

    fn daemon_with(source: Arc<ScriptedSource>) -> Daemon {
        let config = parse_config(CONFIG).expect("test config should parse");
        Daemon::new(
            DaemonConfig::from_settings(&config.settings),
            StationRegistry::from_config(&config),
            UnitConverter::from_config(&config),
            source,
        )
    }

    #[test]
    fn test_daemon_config_defaults() {
        let config = DaemonConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.max_term_pages, 10_000);
        assert_eq!(config.workers, 4);
        assert!(!config.refresh_terms_each_pass);
    }

    #[test]
    fn test_initialize_builds_catalog_and_terms() {
        let daemon = daemon_with(scripted());
        daemon.initialize();

        let state = daemon.state();
        assert_eq!(state.catalog().codes(), vec!["10004", "11001", "12101"]);
        assert_eq!(state.terms().terms, vec![1714564800, 1714543200]);
        assert_eq!(state.selected_term(), Ok(1714564800));
    }

    #[test]
    fn test_pass_publishes_newest_term() {
        let daemon = daemon_with(scripted());
        daemon.initialize();

        let outcome = daemon.run_pass();
        assert_eq!(
            outcome,
            PassOutcome::Published { term: 1714564800, cells: 3, pass: 1 }
        );
        let snapshot = daemon.state().snapshot();
        assert_eq!(snapshot.matrix.get("12101", "5"), Some("26.8"));
    }

    #[test]
    fn test_pass_without_terms_keeps_previous_snapshot() {
        let daemon = daemon_with(Arc::new(ScriptedSource::new()));
        daemon.initialize();

        assert_eq!(daemon.run_pass(), PassOutcome::Aborted(SelectionError::NoTerms));
        assert_eq!(daemon.state().snapshot().pass, 0);
    }

    #[test]
    fn test_select_term_drives_next_pass() {
        let daemon = daemon_with(scripted());
        daemon.initialize();

        assert_eq!(daemon.select_term(1), Ok(1714543200));
        assert!(daemon.control().take_pending(), "selection schedules a pass");

        daemon.run_pass();
        let snapshot = daemon.state().snapshot();
        assert_eq!(snapshot.term, Some(1714543200));
        assert_eq!(snapshot.matrix.get("12101", "5"), Some("8.0"));

        assert!(daemon.select_term(9).is_err());
        assert_eq!(daemon.state().selected_term(), Ok(1714543200));
    }

    #[test]
    fn test_requested_refresh_resets_selection() {
        let daemon = daemon_with(scripted());
        daemon.initialize();
        daemon.select_term(1).expect("index 1 is valid");

        daemon.control().request_term_refresh();
        let outcome = daemon.run_pass();
        assert!(
            matches!(outcome, PassOutcome::Published { term: 1714564800, .. }),
            "refresh selects the newest term again, got {:?}",
            outcome
        );
    }

    #[test]
    fn test_periodic_refresh_keeps_selection() {
        let config = parse_config(CONFIG).expect("test config should parse");
        let daemon = Daemon::new(
            DaemonConfig {
                refresh_terms_each_pass: true,
                ..DaemonConfig::from_settings(&config.settings)
            },
            StationRegistry::from_config(&config),
            UnitConverter::from_config(&config),
            scripted(),
        );
        daemon.initialize();

        assert_eq!(daemon.select_term(1), Ok(1714543200));
        let outcome = daemon.run_pass();
        assert!(
            matches!(outcome, PassOutcome::Published { term: 1714543200, .. }),
            "selected term survives the refresh, got {:?}",
            outcome
        );
        assert_eq!(daemon.state().snapshot().matrix.get("12101", "5"), Some("8.0"));

        daemon.control().request_term_refresh();
        assert!(matches!(
            daemon.run_pass(),
            PassOutcome::Published { term: 1714564800, .. }
        ));
    }

    #[test]
    fn test_pass_is_skipped_while_another_is_in_flight() {
        let daemon = daemon_with(scripted());
        daemon.initialize();

        let control = daemon.control();
        let guard = control.begin().expect("slot should be free");
        assert!(control.is_in_flight());
        assert_eq!(daemon.run_pass(), PassOutcome::Skipped);

        drop(guard);
        assert!(!control.is_in_flight());
        assert!(matches!(daemon.run_pass(), PassOutcome::Published { .. }));
    }

    #[test]
    fn test_triggers_coalesce() {
        let control = PassControl::new();
        control.trigger();
        control.trigger();
        control.trigger();
        assert!(control.take_pending());
        assert!(!control.take_pending(), "three triggers make one follow-up pass");
    }

    #[test]
    fn test_run_returns_when_stopped() {
        let daemon = daemon_with(scripted());
        let stop = AtomicBool::new(true);
        daemon.run(&stop);
        assert_eq!(daemon.state().snapshot().pass, 0);
    }

    #[test]
    fn test_trigger_cuts_wait_short() {
        let daemon = daemon_with(scripted());
        let stop = AtomicBool::new(false);
        daemon.control().trigger();

        let start = Instant::now();
        daemon.wait_for_next_pass(&stop);
        assert!(start.elapsed() < Duration::from_secs(5), "wait must end on trigger");
    }
}
