/// Reconciliation of overlapping station records into one matrix per term.
///
/// Servers may return several records for the same (code, station) at a
/// term, e.g. a reading and its later correction, in any order. The record
/// with the highest source-assigned id wins. The first record seen for a
/// key is always accepted; later ones replace it only with a strictly
/// greater id, so the outcome does not depend on arrival order.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use threadpool::ThreadPool;

use crate::convert::UnitConverter;
use crate::ingest::client::{gather, JsonSource};
use crate::ingest::telemetry::fetch_records_at;
use crate::logging;
use crate::model::{CellKey, ReconciledMatrix, Record, Server, Term};
use crate::stations::StationRegistry;

/// Records fetched for one queried station.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StationBatch {
    pub station: String,
    pub records: Vec<Record>,
}

/// Picks the maximum-id record per (code, station). Batches are folded in
/// the order given.
pub fn select_latest<I>(batches: I) -> HashMap<CellKey, Record>
where
    I: IntoIterator<Item = StationBatch>,
{
    let mut latest: HashMap<CellKey, Record> = HashMap::new();
    for batch in batches {
        for record in batch.records {
            let key = CellKey::new(record.code.clone(), batch.station.clone());
            match latest.entry(key) {
                Entry::Vacant(slot) => {
                    slot.insert(record);
                }
                Entry::Occupied(mut slot) => {
                    if record.id > slot.get().id {
                        slot.insert(record);
                    }
                }
            }
        }
    }
    latest
}

/// Formats the winning records. Unreadable values become the no-data marker.
pub fn format_cells(latest: HashMap<CellKey, Record>, converter: &UnitConverter) -> ReconciledMatrix {
    let mut matrix = ReconciledMatrix::new();
    for (key, record) in latest {
        let text = converter.format_value(&record.value.as_text(), &record.unit);
        matrix.insert(key, text);
    }
    matrix
}

/// Reduces station batches to the newest record per cell and formats them.
pub fn reconcile_batches<I>(batches: I, converter: &UnitConverter) -> ReconciledMatrix
where
    I: IntoIterator<Item = StationBatch>,
{
    format_cells(select_latest(batches), converter)
}

/// Fetches every configured station at `term` and reconciles the results.
///
/// Stations are queried concurrently. A station whose server is unreachable
/// simply contributes no cells.
pub fn reconcile(
    term: Term,
    source: Arc<dyn JsonSource>,
    registry: &StationRegistry,
    converter: &UnitConverter,
    pool: &ThreadPool,
) -> ReconciledMatrix {
    let start = Instant::now();

    let jobs: Vec<(Server, String)> = registry
        .servers()
        .iter()
        .flat_map(|server| {
            registry
                .station_indices_for(&server.name)
                .into_iter()
                .map(move |station| (server.clone(), station))
        })
        .collect();

    let batches = gather(pool, jobs, move |(server, station)| {
        let records = fetch_records_at(source.as_ref(), &server, &station, term);
        StationBatch { station, records }
    });

    let matrix = reconcile_batches(batches, converter);
    logging::log_operation_end("reconcile", start, matrix.len());
    matrix
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::convert::ConversionTable;
    use crate::ingest::fixtures::*;
    use crate::model::{RawValue, NO_DATA};
    use pretty_assertions::assert_eq;

    fn record(id: i64, code: &str, value: &str, unit: &str) -> Record {
        Record {
            id,
            code: code.to_string(),
            value: RawValue::Text(value.to_string()),
            unit: unit.to_string(),
            point_at: Some(FIXTURE_TERM),
        }
    }

    fn batch(station: &str, records: Vec<Record>) -> StationBatch {
        StationBatch {
            station: station.to_string(),
            records,
        }
    }

    fn converter() -> UnitConverter {
        UnitConverter::new(
            ConversionTable::default(),
            HashMap::from([
                ("k".to_string(), "C".to_string()),
                ("pa".to_string(), "гПа".to_string()),
            ]),
            HashMap::from([("C".to_string(), 1)]),
        )
    }

    #[test]
    fn test_highest_id_wins_in_either_order() {
        let newer = record(7, "12001", "280.15", "k");
        let older = record(5, "12001", "270.15", "k");

        let forward = select_latest(vec![batch("5", vec![newer.clone(), older.clone()])]);
        let backward = select_latest(vec![batch("5", vec![older, newer.clone()])]);

        assert_eq!(forward[&CellKey::new("12001", "5")], newer);
        assert_eq!(backward[&CellKey::new("12001", "5")], newer);
    }

    #[test]
    fn test_first_record_for_key_is_accepted() {
        let latest = select_latest(vec![batch("5", vec![record(0, "12101", "1", "k")])]);
        assert_eq!(latest.len(), 1, "a lone record is the winner whatever its id");
    }

    #[test]
    fn test_equal_id_keeps_first_record() {
        let latest = select_latest(vec![batch(
            "5",
            vec![record(3, "12101", "1", "k"), record(3, "12101", "2", "k")],
        )]);
        assert_eq!(latest[&CellKey::new("12101", "5")].value.as_text(), "1");
    }

    #[test]
    fn test_cells_are_keyed_by_queried_station() {
        let latest = select_latest(vec![
            batch("5", vec![record(1, "12101", "1", "k")]),
            batch("7", vec![record(2, "12101", "2", "k")]),
        ]);
        assert_eq!(latest.len(), 2);
        assert!(latest.contains_key(&CellKey::new("12101", "7")));
    }

    #[test]
    fn test_fixture_batch_reconciles_and_formats() {
        let records: Vec<Record> = serde_json::from_str(fixture_station_records_json())
            .expect("fixture should decode");
        let matrix = reconcile_batches(vec![batch("5", records)], &converter());

        assert_eq!(matrix.len(), 3);
        assert_eq!(matrix.get("12101", "5"), Some("26.8"), "id 9 (300.00 K) beats id 8");
        assert_eq!(matrix.get("10004", "5"), Some(NO_DATA), "garbled value is no data");
        assert_eq!(matrix.get("11001", "5"), Some("270"));
    }

    #[test]
    fn test_empty_value_is_no_data() {
        let matrix = reconcile_batches(vec![batch("5", vec![record(1, "13011", "", "kg m-2")])], &converter());
        assert_eq!(matrix.get("13011", "5"), Some(NO_DATA));
    }

    fn registry() -> StationRegistry {
        let config = parse_config(
            r#"
            [[server]]
            name = "central"
            url = "http://central"
            [[server.station]]
            index = "5"
            name = "Five"
            [[server.station]]
            index = "7"
            name = "Seven"
            "#,
        )
        .expect("test config should parse");
        StationRegistry::from_config(&config)
    }

    #[test]
    fn test_reconcile_queries_each_station_at_term() {
        let source = Arc::new(ScriptedSource::new());
        source.respond(
            "http://central/get?stations=5&streams=0&point_at=1714564800",
            fixture_station_records_json(),
        );
        source.respond(
            "http://central/get?stations=7&streams=0&point_at=1714564800",
            r#"[{"id": 3, "code": "10004", "value": "101325", "unit": "pa", "point_at": 1714564800}]"#,
        );

        let pool = ThreadPool::new(2);
        let matrix = reconcile(FIXTURE_TERM, source, &registry(), &converter(), &pool);

        assert_eq!(matrix.get("12101", "5"), Some("26.8"));
        assert_eq!(matrix.get("10004", "7"), Some("1013.25"));
        assert_eq!(matrix.get("12101", "7"), None);
    }

    #[test]
    fn test_absent_term_yields_empty_matrix() {
        let source = Arc::new(ScriptedSource::new());
        source.respond("http://central/get?stations=5&streams=0&point_at=42", "[]");
        source.respond("http://central/get?stations=7&streams=0&point_at=42", "[]");

        let pool = ThreadPool::new(2);
        let matrix = reconcile(42, source, &registry(), &converter(), &pool);
        assert!(matrix.is_empty());
    }
}
