//! Sparse Matrix Builder
//!
//! Converts an interaction log into a compressed sparse user×item matrix
//! plus the id↔index mappings needed to translate model output back into
//! external ids.
//!
//! Invariants:
//! - index assignment follows first appearance in the log, so a fixed input
//!   ordering always produces the same mapping
//! - within one fit cycle, row/column index `i` always maps to the same
//!   user/item id
//! - the matrix is read-only after construction

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{RecError, Result};
use crate::models::{Aggregation, InteractionLog};

/// Bidirectional mapping between external i64 ids and contiguous matrix
/// indices.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdIndex {
    index: HashMap<i64, usize>,
    ids: Vec<i64>,
}

impl IdIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index for `id`, assigning the next contiguous index on
    /// first sight.
    pub fn get_or_insert(&mut self, id: i64) -> usize {
        if let Some(&idx) = self.index.get(&id) {
            return idx;
        }
        let idx = self.ids.len();
        self.index.insert(id, idx);
        self.ids.push(id);
        idx
    }

    pub fn get(&self, id: i64) -> Option<usize> {
        self.index.get(&id).copied()
    }

    pub fn id(&self, index: usize) -> Option<i64> {
        self.ids.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// All known ids, in index order.
    pub fn ids(&self) -> &[i64] {
        &self.ids
    }
}

/// Compressed sparse row matrix with f64 values.
///
/// Row lookup is O(1) via the index pointer array; unseen (row, column)
/// pairs are implicitly zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsrMatrix {
    n_rows: usize,
    n_cols: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    values: Vec<f64>,
}

impl CsrMatrix {
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Column indices and values of one row, sorted by column.
    pub fn row(&self, row: usize) -> (&[usize], &[f64]) {
        assert!(row < self.n_rows, "row {} out of bounds ({})", row, self.n_rows);
        let start = self.indptr[row];
        let end = self.indptr[row + 1];
        (&self.indices[start..end], &self.values[start..end])
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        let (cols, vals) = self.row(row);
        match cols.binary_search(&col) {
            Ok(pos) => vals[pos],
            Err(_) => 0.0,
        }
    }

    /// Swaps rows and columns. Used to iterate item-wise over a user×item
    /// matrix.
    pub fn transpose(&self) -> CsrMatrix {
        let mut counts = vec![0usize; self.n_cols];
        for &col in &self.indices {
            counts[col] += 1;
        }
        let mut indptr = vec![0usize; self.n_cols + 1];
        for col in 0..self.n_cols {
            indptr[col + 1] = indptr[col] + counts[col];
        }

        let mut cursor = indptr.clone();
        let mut indices = vec![0usize; self.nnz()];
        let mut values = vec![0.0f64; self.nnz()];
        for row in 0..self.n_rows {
            let (cols, vals) = self.row(row);
            for (&col, &val) in cols.iter().zip(vals) {
                let pos = cursor[col];
                indices[pos] = row;
                values[pos] = val;
                cursor[col] += 1;
            }
        }

        CsrMatrix {
            n_rows: self.n_cols,
            n_cols: self.n_rows,
            indptr,
            indices,
            values,
        }
    }
}

/// One fit cycle's matrix together with its index mappings. Built and
/// replaced as a unit; shared read-only during prediction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitMatrix {
    pub matrix: CsrMatrix,
    pub users: IdIndex,
    pub items: IdIndex,
}

impl FitMatrix {
    /// Builds the sparse matrix for `log`, assigning fresh indices.
    pub fn build(log: &InteractionLog, aggregation: Aggregation) -> Result<Self> {
        Self::build_with_index(log, aggregation, IdIndex::new(), IdIndex::new())
    }

    /// Builds the sparse matrix for `log` on top of existing index
    /// mappings. Ids already known keep their indices; new ids extend the
    /// mapping. This keeps a prediction-time matrix in the same coordinate
    /// space as the fit-time one.
    pub fn build_with_index(
        log: &InteractionLog,
        aggregation: Aggregation,
        mut users: IdIndex,
        mut items: IdIndex,
    ) -> Result<Self> {
        if log.is_empty() {
            return Err(RecError::EmptyLog);
        }

        // Aggregate duplicates row-wise before laying out the CSR arrays.
        let mut row_entries: Vec<HashMap<usize, f64>> = Vec::new();
        for interaction in log {
            let row = users.get_or_insert(interaction.user_id);
            let col = items.get_or_insert(interaction.item_id);
            if row >= row_entries.len() {
                row_entries.resize_with(row + 1, HashMap::new);
            }
            row_entries[row]
                .entry(col)
                .and_modify(|v| *v = aggregation.combine(*v, interaction.relevance))
                .or_insert(interaction.relevance);
        }
        // Users carried over from a previous mapping but absent from this
        // log keep an empty row.
        row_entries.resize_with(users.len(), HashMap::new);

        let n_rows = users.len();
        let n_cols = items.len();
        let mut indptr = Vec::with_capacity(n_rows + 1);
        let mut indices = Vec::new();
        let mut values = Vec::new();
        indptr.push(0);
        for entries in &row_entries {
            let mut cols: Vec<usize> = entries.keys().copied().collect();
            cols.sort_unstable();
            for col in cols {
                indices.push(col);
                values.push(entries[&col]);
            }
            indptr.push(indices.len());
        }

        tracing::debug!(
            "built {}x{} interaction matrix with {} entries",
            n_rows,
            n_cols,
            values.len()
        );

        Ok(Self {
            matrix: CsrMatrix {
                n_rows,
                n_cols,
                indptr,
                indices,
                values,
            },
            users,
            items,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_log() -> InteractionLog {
        vec![
            (10, 100, 1.0),
            (10, 200, 2.0),
            (20, 200, 3.0),
            (20, 300, 4.0),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_build_assigns_first_appearance_indices() {
        let fit = FitMatrix::build(&sample_log(), Aggregation::Sum).unwrap();

        assert_eq!(fit.users.get(10), Some(0));
        assert_eq!(fit.users.get(20), Some(1));
        assert_eq!(fit.items.get(100), Some(0));
        assert_eq!(fit.items.get(200), Some(1));
        assert_eq!(fit.items.get(300), Some(2));
        assert_eq!(fit.users.id(1), Some(20));
        assert_eq!(fit.matrix.n_rows(), 2);
        assert_eq!(fit.matrix.n_cols(), 3);
        assert_eq!(fit.matrix.nnz(), 4);
    }

    #[test]
    fn test_build_is_deterministic_for_fixed_ordering() {
        let a = FitMatrix::build(&sample_log(), Aggregation::Sum).unwrap();
        let b = FitMatrix::build(&sample_log(), Aggregation::Sum).unwrap();
        assert_eq!(a.users.ids(), b.users.ids());
        assert_eq!(a.items.ids(), b.items.ids());
        assert_eq!(a.matrix.get(0, 1), b.matrix.get(0, 1));
    }

    #[test]
    fn test_duplicate_pairs_aggregate_per_policy() {
        let log: InteractionLog = vec![(1, 7, 1.0), (1, 7, 2.0), (1, 7, 0.5)]
            .into_iter()
            .collect();

        let sum = FitMatrix::build(&log, Aggregation::Sum).unwrap();
        assert_eq!(sum.matrix.get(0, 0), 3.5);

        let max = FitMatrix::build(&log, Aggregation::Max).unwrap();
        assert_eq!(max.matrix.get(0, 0), 2.0);

        let last = FitMatrix::build(&log, Aggregation::Last).unwrap();
        assert_eq!(last.matrix.get(0, 0), 0.5);
    }

    #[test]
    fn test_empty_log_is_an_error() {
        let err = FitMatrix::build(&InteractionLog::new(), Aggregation::Sum).unwrap_err();
        assert!(matches!(err, RecError::EmptyLog));
    }

    #[test]
    fn test_row_lookup() {
        let fit = FitMatrix::build(&sample_log(), Aggregation::Sum).unwrap();
        let (cols, vals) = fit.matrix.row(1);
        assert_eq!(cols, &[1, 2]);
        assert_eq!(vals, &[3.0, 4.0]);
        assert_eq!(fit.matrix.get(0, 2), 0.0);
    }

    #[test]
    fn test_build_with_index_keeps_fit_coordinates() {
        let fit = FitMatrix::build(&sample_log(), Aggregation::Sum).unwrap();

        // Prediction log mentions one known and one new item, one new user.
        let predict_log: InteractionLog = vec![(30, 200, 1.0), (30, 400, 1.0)]
            .into_iter()
            .collect();
        let ctx = FitMatrix::build_with_index(
            &predict_log,
            Aggregation::Sum,
            fit.users.clone(),
            fit.items.clone(),
        )
        .unwrap();

        assert_eq!(ctx.items.get(200), Some(1));
        assert_eq!(ctx.items.get(400), Some(3));
        assert_eq!(ctx.users.get(30), Some(2));
        // Fit-time users keep their rows, now empty.
        assert_eq!(ctx.matrix.n_rows(), 3);
        assert_eq!(ctx.matrix.row(0).0.len(), 0);
        let (cols, _) = ctx.matrix.row(2);
        assert_eq!(cols, &[1, 3]);
    }

    #[test]
    fn test_transpose_round_trip() {
        let fit = FitMatrix::build(&sample_log(), Aggregation::Sum).unwrap();
        let t = fit.matrix.transpose();
        assert_eq!(t.n_rows(), 3);
        assert_eq!(t.n_cols(), 2);
        assert_eq!(t.get(1, 0), 2.0);
        assert_eq!(t.get(1, 1), 3.0);
        assert_eq!(t.get(0, 1), 0.0);

        let back = t.transpose();
        assert_eq!(back.get(0, 0), 1.0);
        assert_eq!(back.get(1, 2), 4.0);
        assert_eq!(back.nnz(), fit.matrix.nnz());
    }
}
