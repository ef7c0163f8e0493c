/// Data ingestion from the station telemetry servers.
///
/// - `client`    - URL construction, HTTP transport, fail-soft fetch, fan-out
/// - `telemetry` - the three server pages (records, capabilities, definitions)
/// - `fixtures`  (test only) - representative API response payloads

pub mod client;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod fixtures;

pub use client::{build_url, gather, HttpSource, JsonSource, ParamValue, QueryParams};
