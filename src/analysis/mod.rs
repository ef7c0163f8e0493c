/// Presentation-ready views over the reconciled data.
///
/// Submodules:
/// - `table` - arranges catalog × stations × matrix into an ordered table
///   with row and column labels.

pub mod table;
