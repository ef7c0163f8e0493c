/// Shared monitoring state: the last published snapshot, the term list and
/// the measurement catalog.
///
/// ## Architecture
///
/// **Writer (daemon pass):**
/// - builds a complete `ReconciledMatrix` off to the side
/// - publishes it with `publish()`, which swaps in a new `Arc<Snapshot>`
///
/// **Readers (endpoint, diagnostics):**
/// - clone the current `Arc<Snapshot>` and release the lock immediately
/// - never observe a half-built matrix
///
/// Failed or aborted passes publish nothing, so readers keep seeing the last
/// known good snapshot.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::catalog::MeasurementCatalog;
use crate::error::SelectionError;
use crate::model::{ReconciledMatrix, Term};

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Result of one completed pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Term the matrix was reconciled for. `None` before the first pass.
    pub term: Option<Term>,
    pub matrix: ReconciledMatrix,
    pub updated_at: Option<DateTime<Utc>>,
    /// Number of passes published so far, starting at 1.
    pub pass: u64,
}

// ---------------------------------------------------------------------------
// Term list
// ---------------------------------------------------------------------------

/// Known terms, newest first, plus the operator's selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TermList {
    pub terms: Vec<Term>,
    /// Index into `terms`. Reset to 0 (the newest term) on every refresh.
    pub selected: usize,
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl TermList {
    pub fn selected_term(&self) -> Result<Term, SelectionError> {
        if self.terms.is_empty() {
            return Err(SelectionError::NoTerms);
        }
        self.terms
            .get(self.selected)
            .copied()
            .ok_or(SelectionError::OutOfRange {
                index: self.selected,
                available: self.terms.len(),
            })
    }

    /// Moves the selection. An invalid index leaves it unchanged.
    pub fn select(&mut self, index: usize) -> Result<Term, SelectionError> {
        if self.terms.is_empty() {
            return Err(SelectionError::NoTerms);
        }
        match self.terms.get(index) {
            Some(&term) => {
                self.selected = index;
                Ok(term)
            }
            None => Err(SelectionError::OutOfRange {
                index,
                available: self.terms.len(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// State shared between the daemon loop and its readers.
///
/// A poisoned lock only means a reader or writer panicked mid-access; the
/// guarded values are always replaced whole, so the inner value is used.
#[derive(Debug, Default)]
pub struct MonitorState {
    snapshot: RwLock<Arc<Snapshot>>,
    terms: RwLock<TermList>,
    catalog: RwLock<Arc<MeasurementCatalog>>,
}

impl MonitorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replaces the published snapshot wholesale and returns its pass number.
    pub fn publish(&self, term: Term, matrix: ReconciledMatrix) -> u64 {
        let mut current = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        let pass = current.pass + 1;
        *current = Arc::new(Snapshot {
            term: Some(term),
            matrix,
            updated_at: Some(Utc::now()),
            pass,
        });
        pass
    }

    pub fn terms(&self) -> TermList {
        self.terms.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Installs a freshly discovered term list; the newest term is selected.
    pub fn replace_terms(&self, terms: Vec<Term>) {
        let mut list = self.terms.write().unwrap_or_else(PoisonError::into_inner);
        *list = TermList {
            terms,
            selected: 0,
            refreshed_at: Some(Utc::now()),
        };
    }

    /// Replaces the term list but keeps the selected term selected when it
    /// is still listed; falls back to the newest term otherwise.
    pub fn update_terms(&self, terms: Vec<Term>) {
        let mut list = self.terms.write().unwrap_or_else(PoisonError::into_inner);
        let selected = list
            .selected_term()
            .ok()
            .and_then(|term| terms.iter().position(|&t| t == term))
            .unwrap_or(0);
        *list = TermList {
            terms,
            selected,
            refreshed_at: Some(Utc::now()),
        };
    }

    pub fn select_term(&self, index: usize) -> Result<Term, SelectionError> {
        self.terms
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .select(index)
    }

    pub fn selected_term(&self) -> Result<Term, SelectionError> {
        self.terms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .selected_term()
    }

    pub fn catalog(&self) -> Arc<MeasurementCatalog> {
        Arc::clone(&self.catalog.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn set_catalog(&self, catalog: MeasurementCatalog) {
        *self.catalog.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(catalog);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CellKey;

    fn matrix_with(text: &str) -> ReconciledMatrix {
        let mut matrix = ReconciledMatrix::new();
        matrix.insert(CellKey::new("12101", "5"), text.to_string());
        matrix
    }

    #[test]
    fn test_initial_snapshot_is_empty() {
        let state = MonitorState::new();
        let snapshot = state.snapshot();
        assert_eq!(snapshot.term, None);
        assert_eq!(snapshot.pass, 0);
        assert!(snapshot.matrix.is_empty());
    }

    #[test]
    fn test_publish_swaps_whole_snapshot() {
        let state = MonitorState::new();
        assert_eq!(state.publish(100, matrix_with("1.0")), 1);
        let held = state.snapshot();

        assert_eq!(state.publish(200, matrix_with("2.0")), 2);
        let current = state.snapshot();

        assert_eq!(held.matrix.get("12101", "5"), Some("1.0"), "readers keep their snapshot");
        assert_eq!(current.term, Some(200));
        assert_eq!(current.matrix.get("12101", "5"), Some("2.0"));
        assert!(current.updated_at.is_some());
    }

    #[test]
    fn test_selection_requires_terms() {
        let state = MonitorState::new();
        assert_eq!(state.selected_term(), Err(SelectionError::NoTerms));
        assert_eq!(state.select_term(0), Err(SelectionError::NoTerms));
    }

    #[test]
    fn test_replace_terms_selects_newest() {
        let state = MonitorState::new();
        state.replace_terms(vec![300, 200, 100]);
        assert_eq!(state.select_term(2), Ok(100));

        state.replace_terms(vec![400, 300]);
        let list = state.terms();
        assert_eq!(list.selected, 0);
        assert_eq!(state.selected_term(), Ok(400));
        assert!(list.refreshed_at.is_some());
    }

    #[test]
    fn test_update_terms_follows_selected_term() {
        let state = MonitorState::new();
        state.replace_terms(vec![300, 200, 100]);
        state.select_term(1).expect("index 1 is valid");

        state.update_terms(vec![400, 300, 200, 100]);
        assert_eq!(state.terms().selected, 2);
        assert_eq!(state.selected_term(), Ok(200));

        state.update_terms(vec![500, 400]);
        assert_eq!(state.selected_term(), Ok(500), "a vanished term falls back to the newest");

        let empty = MonitorState::new();
        empty.update_terms(vec![10]);
        assert_eq!(empty.selected_term(), Ok(10));
    }

    #[test]
    fn test_out_of_range_selection_keeps_previous() {
        let state = MonitorState::new();
        state.replace_terms(vec![300, 200]);
        state.select_term(1).expect("index 1 is valid");

        let err = state.select_term(5).expect_err("index 5 is out of range");
        assert_eq!(err, SelectionError::OutOfRange { index: 5, available: 2 });
        assert_eq!(state.selected_term(), Ok(200));
    }
}
