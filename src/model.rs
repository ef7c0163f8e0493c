/// Core data types for the weather-station monitoring service.
///
/// This module defines the shared domain model imported by all other modules.
/// It contains no I/O, only types and the small amount of logic needed to
/// keep their invariants (record decoding, matrix access).

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Observation round shared by all stations, in seconds since the epoch.
pub type Term = i64;

/// Display string used for a value that could not be read as a number,
/// and for cells that have no reading at all.
pub const NO_DATA: &str = "---";

// ---------------------------------------------------------------------------
// Registry types
// ---------------------------------------------------------------------------

/// A telemetry server as configured at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Server {
    pub name: String,
    pub base_url: String,
}

/// A station reporting through one of the configured servers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Station {
    /// Name of the server the station belongs to.
    pub server: String,
    /// Station identifier, e.g. "34519". Sorted numerically when possible.
    pub index: String,
    pub display_name: String,
}

/// One measurement type as described by a server's definition list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeasurementType {
    /// BUFR-style code, e.g. "12101".
    pub code: String,
    pub display_name: String,
    /// Unit the server reports values in.
    pub source_unit: String,
    /// Unit values are displayed in after conversion.
    pub target_unit: String,
}

// ---------------------------------------------------------------------------
// API payloads
// ---------------------------------------------------------------------------

/// Measurement value as it appears on the wire. Servers send either a JSON
/// string or a JSON number; both are kept as decimal text.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Text(String),
    Number(serde_json::Number),
    #[default]
    Missing,
}

impl RawValue {
    pub fn as_text(&self) -> String {
        match self {
            RawValue::Text(s) => s.clone(),
            RawValue::Number(n) => n.to_string(),
            RawValue::Missing => String::new(),
        }
    }
}

/// One row of the generic records page. The `station` field some servers
/// include is ignored; cells are keyed by the station that was queried.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Record {
    pub id: i64,
    #[serde(alias = "bufrcode")]
    pub code: String,
    #[serde(default)]
    pub value: RawValue,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub point_at: Option<Term>,
}

/// One row of the station capability page (`station_taking.json`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CapabilityRow {
    #[serde(alias = "bufrcode")]
    pub code: String,
}

/// One row of the measurement definitions page (`measurement.json`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DefinitionRow {
    #[serde(alias = "code")]
    pub bufrcode: String,
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub unit: String,
}

// ---------------------------------------------------------------------------
// Reconciled values
// ---------------------------------------------------------------------------

/// Parsed measurement value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellValue {
    Number(Decimal),
    NoData,
}

/// Key of one matrix cell: (measurement code, station index).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub code: String,
    pub station: String,
}

impl CellKey {
    pub fn new(code: impl Into<String>, station: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            station: station.into(),
        }
    }
}

/// Formatted values for one term, keyed by (code, station).
///
/// Holds at most one value per key. Missing keys mean "no reading" and are
/// rendered by the caller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconciledMatrix {
    cells: HashMap<CellKey, String>,
}

impl ReconciledMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: CellKey, text: String) {
        self.cells.insert(key, text);
    }

    pub fn get(&self, code: &str, station: &str) -> Option<&str> {
        self.cells
            .get(&CellKey::new(code, station))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CellKey, &String)> {
        self.cells.iter()
    }

    /// Cells as nested maps, code → station → text, for JSON output.
    /// Keys come out sorted so the same matrix always serializes the same way.
    pub fn to_nested(&self) -> BTreeMap<String, BTreeMap<String, String>> {
        let mut nested: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        for (key, text) in &self.cells {
            nested
                .entry(key.code.clone())
                .or_default()
                .insert(key.station.clone(), text.clone());
        }
        nested
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
