/// Page-level queries against a station telemetry server.
///
/// Three pages are used:
///   - `get`: raw records, filtered by stations and either a
///     `lastid` cursor or an exact `point_at` term
///   - `station_taking.json`: measurement codes a station reports
///   - `measurement.json`: code definitions (caption + unit)
///
/// All queries are fail-soft: an unreachable server yields no rows.

use crate::ingest::client::{decode_rows, JsonSource, QueryParams};
use crate::model::{CapabilityRow, DefinitionRow, Record, Server, Term};

pub const PAGE_RECORDS: &str = "get";
pub const PAGE_STATION_TAKING: &str = "station_taking.json";
pub const PAGE_MEASUREMENT: &str = "measurement.json";

/// Stream selector sent with every records query.
const STREAM_OBSERVATIONS: i64 = 0;

/// Parameters for one page of the term scan: all of a server's stations,
/// records with id above `last_id`.
pub fn records_after_params(stations: &[String], last_id: i64) -> QueryParams {
    QueryParams::new()
        .with("streams", STREAM_OBSERVATIONS)
        .with("stations", stations)
        .with("lastid", last_id)
}

/// Parameters for all records of one station at one term.
pub fn records_at_params(station: &str, term: Term) -> QueryParams {
    QueryParams::new()
        .with("stations", station)
        .with("streams", STREAM_OBSERVATIONS)
        .with("point_at", term)
}

pub fn fetch_records_after(
    source: &dyn JsonSource,
    server: &Server,
    stations: &[String],
    last_id: i64,
) -> Vec<Record> {
    let rows = source.fetch(&server.base_url, PAGE_RECORDS, &records_after_params(stations, last_id));
    decode_rows(rows, PAGE_RECORDS)
}

pub fn fetch_records_at(
    source: &dyn JsonSource,
    server: &Server,
    station: &str,
    term: Term,
) -> Vec<Record> {
    let rows = source.fetch(&server.base_url, PAGE_RECORDS, &records_at_params(station, term));
    decode_rows(rows, PAGE_RECORDS)
}

pub fn fetch_station_taking(
    source: &dyn JsonSource,
    server: &Server,
    station: &str,
) -> Vec<CapabilityRow> {
    let params = QueryParams::new().with("station", station);
    let rows = source.fetch(&server.base_url, PAGE_STATION_TAKING, &params);
    decode_rows(rows, PAGE_STATION_TAKING)
}

pub fn fetch_definitions(source: &dyn JsonSource, server: &Server) -> Vec<DefinitionRow> {
    let rows = source.fetch(&server.base_url, PAGE_MEASUREMENT, &QueryParams::new());
    decode_rows(rows, PAGE_MEASUREMENT)
}
