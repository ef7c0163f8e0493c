/// wxmon_service: weather-station telemetry aggregation service.
///
/// # Module structure
///
/// ```text
/// wxmon_service
/// ├── model       — shared data types (Record, MeasurementType, ReconciledMatrix, …)
/// ├── error       — ConfigError, FetchError, SelectionError
/// ├── logging     — tracing setup, fetch failure classification, timing
/// ├── config      — server/station/unit configuration loader (wxmon.toml)
/// ├── stations    — server and station registry
/// ├── ingest
/// │   ├── client    — URL construction, HTTP transport, fail-soft fetch, fan-out
/// │   ├── telemetry — records, capability and definition pages
/// │   └── fixtures  (test only) — representative API response payloads
/// ├── convert     — unit conversion table and decimal formatting
/// ├── terms       — paginated term discovery across servers
/// ├── catalog     — measurement types reported by the configured stations
/// ├── reconcile   — latest-id-wins selection per (code, station)
/// ├── monitor     — published snapshot, term list and catalog
/// ├── daemon      — polling loop with single-flight passes
/// ├── endpoint    — read-only JSON HTTP API plus term controls
/// └── analysis
///     └── table   — row/column layout of a snapshot for display
/// ```

/// Public modules
pub mod analysis;
pub mod catalog;
pub mod config;
pub mod convert;
pub mod daemon;
pub mod endpoint;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod monitor;
pub mod reconcile;
pub mod stations;
pub mod terms;
