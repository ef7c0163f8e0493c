/// Table view of one snapshot.
///
/// `build_table` takes the catalog, the registry and a published snapshot
/// and lays them out the way an operator reads them: one row per
/// measurement type (sorted by code, labelled `"<caption>, [<unit>]"`), one
/// column per station (sorted by numeric index, labelled with the station
/// name). Cells without a reading show the no-data marker.

use serde::Serialize;

use crate::catalog::{row_label, MeasurementCatalog};
use crate::model::{ReconciledMatrix, Term, NO_DATA};
use crate::monitor::Snapshot;
use crate::stations::StationRegistry;
use crate::terms::format_term;

// ---------------------------------------------------------------------------
// View types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableColumn {
    pub station: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub code: String,
    pub label: String,
    /// One entry per column, in column order.
    pub cells: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableView {
    pub term: Option<Term>,
    /// Human-readable form of `term`.
    pub term_label: Option<String>,
    pub columns: Vec<TableColumn>,
    pub rows: Vec<TableRow>,
}

impl TableView {
    /// Cell text by row and column position.
    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.cells.get(column))
            .map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

pub fn build_table(
    catalog: &MeasurementCatalog,
    registry: &StationRegistry,
    snapshot: &Snapshot,
) -> TableView {
    let columns: Vec<TableColumn> = registry
        .sorted_station_indices()
        .into_iter()
        .map(|station| TableColumn {
            name: registry
                .display_name(&station)
                .unwrap_or(station.as_str())
                .to_string(),
            station,
        })
        .collect();

    let rows = catalog
        .sorted_types()
        .into_iter()
        .map(|mt| TableRow {
            code: mt.code.clone(),
            label: row_label(mt),
            cells: row_cells(&snapshot.matrix, &mt.code, &columns),
        })
        .collect();

    TableView {
        term: snapshot.term,
        term_label: snapshot.term.map(format_term),
        columns,
        rows,
    }
}

fn row_cells(matrix: &ReconciledMatrix, code: &str, columns: &[TableColumn]) -> Vec<String> {
    columns
        .iter()
        .map(|c| matrix.get(code, &c.station).unwrap_or(NO_DATA).to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
