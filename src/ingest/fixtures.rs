/// Test fixtures: representative JSON payloads from a station telemetry
/// server, plus a scripted `JsonSource` that answers by exact URL.
///
/// Payload shapes:
///   get                 : [{id, code|bufrcode, station, value, unit, point_at}]
///   station_taking.json : [{code}]
///   measurement.json    : [{bufrcode, caption, unit}]
///
/// Note: `value` is usually a JSON string, even for numbers, and may be
/// empty or garbled. Parsers must handle this.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;

use crate::error::FetchError;
use crate::ingest::client::{parse_json_array, JsonSource};
use crate::model::Term;

/// Term used by the per-station fixtures (2024-05-01 12:00:00 UTC).
pub(crate) const FIXTURE_TERM: Term = 1_714_564_800;

/// Definitions page: six codes, two of which no fixture station reports.
pub(crate) fn fixture_definitions_json() -> &'static str {
    r#"[
      { "bufrcode": "10004", "caption": "Pressure", "unit": "pa" },
      { "bufrcode": "11001", "caption": "Wind direction", "unit": "degree true" },
      { "bufrcode": "11002", "caption": "Wind speed", "unit": "m/s" },
      { "bufrcode": "12101", "caption": "Air temperature", "unit": "k" },
      { "bufrcode": "13011", "caption": "Total precipitation", "unit": "kg m-2" },
      { "bufrcode": "20001", "caption": "Horizontal visibility", "unit": "m" }
    ]"#
}

/// Capability page for a station reporting temperature, pressure and
/// wind direction.
pub(crate) fn fixture_station_taking_json() -> &'static str {
    r#"[
      { "code": "12101" },
      { "code": "10004" },
      { "code": "11001" }
    ]"#
}

/// First page of a term scan: six records over three distinct terms,
/// including a zero `point_at` that must be ignored.
pub(crate) fn fixture_term_page_json() -> &'static str {
    r#"[
      { "id": 1, "code": "12101", "station": "5", "value": "281.15", "unit": "k", "point_at": 1714543200 },
      { "id": 2, "code": "10004", "station": "5", "value": "101325", "unit": "pa", "point_at": 1714543200 },
      { "id": 3, "code": "12101", "station": "7", "value": "282.05", "unit": "k", "point_at": 1714554000 },
      { "id": 4, "code": "12101", "station": "5", "value": "283.45", "unit": "k", "point_at": 1714564800 },
      { "id": 5, "code": "10004", "station": "7", "value": "", "unit": "pa", "point_at": 0 },
      { "id": 6, "code": "10004", "station": "5", "value": "101280", "unit": "pa", "point_at": 1714564800 }
    ]"#
}

/// Station 5 at `FIXTURE_TERM`. Temperature arrives twice out of order
/// (id 9 is the correction of id 8); pressure has a garbled value.
pub(crate) fn fixture_station_records_json() -> &'static str {
    r#"[
      { "id": 9, "code": "12101", "station": "5", "value": "300.00", "unit": "k", "point_at": 1714564800 },
      { "id": 8, "code": "12101", "station": "5", "value": "290.00", "unit": "k", "point_at": 1714564800 },
      { "id": 10, "code": "10004", "station": "5", "value": "n/a", "unit": "pa", "point_at": 1714564800 },
      { "id": 11, "bufrcode": "11001", "station": "5", "value": 270, "unit": "degree true", "point_at": 1714564800 }
    ]"#
}

// ---------------------------------------------------------------------------
// Scripted source
// ---------------------------------------------------------------------------

/// `JsonSource` answering from a URL → body table. Unknown URLs behave like
/// a refused connection. Every request is recorded.
#[derive(Default)]
pub(crate) struct ScriptedSource {
    responses: Mutex<HashMap<String, Result<String, FetchError>>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedSource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn respond(&self, url: &str, body: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), Ok(body.to_string()));
    }

    pub(crate) fn fail(&self, url: &str, err: FetchError) {
        self.responses.lock().unwrap().insert(url.to_string(), Err(err));
    }

    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl JsonSource for ScriptedSource {
    fn get_json(&self, url: &str) -> Result<Vec<Value>, FetchError> {
        self.requests.lock().unwrap().push(url.to_string());
        match self.responses.lock().unwrap().get(url) {
            Some(Ok(body)) => parse_json_array(body),
            Some(Err(e)) => Err(e.clone()),
            None => Err(FetchError::Connect(format!("no scripted response for {}", url))),
        }
    }
}
