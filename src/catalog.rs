/// Measurement type catalog.
///
/// Built once at startup. For every server the catalog asks each station
/// which codes it reports (`station_taking.json`), then reads the server's
/// definition list (`measurement.json`) and keeps only the definitions of
/// codes that one of its stations actually reports. The display unit comes
/// from the configured unit preferences.
///
/// Codes are global: when two servers define the same code, the server
/// configured last wins.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use threadpool::ThreadPool;

use crate::convert::UnitConverter;
use crate::ingest::client::{gather, JsonSource};
use crate::ingest::telemetry::{fetch_definitions, fetch_station_taking};
use crate::logging;
use crate::model::{DefinitionRow, MeasurementType, Server};
use crate::stations::StationRegistry;

/// Measurement types keyed by code.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MeasurementCatalog {
    types: HashMap<String, MeasurementType>,
}

impl MeasurementCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the entry for `mt.code`.
    pub fn insert(&mut self, mt: MeasurementType) {
        self.types.insert(mt.code.clone(), mt);
    }

    pub fn get(&self, code: &str) -> Option<&MeasurementType> {
        self.types.get(code)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Codes in display order.
    pub fn codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.types.keys().cloned().collect();
        codes.sort();
        codes
    }

    /// Types in display order.
    pub fn sorted_types(&self) -> Vec<&MeasurementType> {
        let mut types: Vec<&MeasurementType> = self.types.values().collect();
        types.sort_by(|a, b| a.code.cmp(&b.code));
        types
    }

    /// Row label, e.g. `Air temperature, [C]`.
    pub fn row_label(&self, code: &str) -> Option<String> {
        self.get(code).map(row_label)
    }
}

pub fn row_label(mt: &MeasurementType) -> String {
    format!("{}, [{}]", mt.display_name, mt.target_unit)
}

/// Keeps the definitions whose code is in `used` and resolves their display
/// unit. Definition order is kept.
pub fn select_definitions(
    definitions: Vec<DefinitionRow>,
    used: &HashSet<String>,
    converter: &UnitConverter,
) -> Vec<MeasurementType> {
    definitions
        .into_iter()
        .filter(|d| used.contains(&d.bufrcode))
        .map(|d| MeasurementType {
            target_unit: converter.target_unit(&d.unit),
            code: d.bufrcode,
            display_name: d.caption,
            source_unit: d.unit,
        })
        .collect()
}

/// Builds the catalog from every configured server.
///
/// Capability and definition requests run on the pool; results are merged
/// in configuration order so that "last server wins" is deterministic.
pub fn build_catalog(
    source: Arc<dyn JsonSource>,
    registry: &StationRegistry,
    converter: &UnitConverter,
    pool: &ThreadPool,
) -> MeasurementCatalog {
    let start = Instant::now();

    let capability_jobs: Vec<(Server, String)> = registry
        .servers()
        .iter()
        .flat_map(|server| {
            registry
                .station_indices_for(&server.name)
                .into_iter()
                .map(move |station| (server.clone(), station))
        })
        .collect();
    let capability_servers: Vec<String> = capability_jobs.iter().map(|(s, _)| s.name.clone()).collect();

    let capabilities = {
        let source = Arc::clone(&source);
        gather(pool, capability_jobs, move |(server, station)| {
            fetch_station_taking(source.as_ref(), &server, &station)
        })
    };

    let mut used: HashMap<String, HashSet<String>> = HashMap::new();
    for (server, rows) in capability_servers.into_iter().zip(capabilities) {
        used.entry(server)
            .or_default()
            .extend(rows.into_iter().map(|r| r.code));
    }

    let definition_jobs: Vec<Server> = registry.servers().to_vec();
    let definitions = gather(pool, definition_jobs, move |server| {
        fetch_definitions(source.as_ref(), &server)
    });

    let empty = HashSet::new();
    let mut catalog = MeasurementCatalog::new();
    for (server, defs) in registry.servers().iter().zip(definitions) {
        let used_codes = used.get(&server.name).unwrap_or(&empty);
        for mt in select_definitions(defs, used_codes, converter) {
            catalog.insert(mt);
        }
    }

    logging::log_operation_end("build_catalog", start, catalog.len());
    catalog
}
