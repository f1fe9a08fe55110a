//! Alternating Least Squares backend for implicit feedback.
//!
//! Decomposes the user×item relevance matrix into user and item latent
//! factors with confidence weighting (c = 1 + alpha * relevance). Each
//! half-iteration solves one ridge system per row against the other side's
//! factors.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use recommender_core::{CsrMatrix, RecError, Result};

use super::{top_k, FactorModel, ItemScope};

/// ALS hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlsConfig {
    /// Number of latent factors (embedding dimension)
    pub factors: usize,
    /// Number of alternating iterations
    pub iterations: usize,
    /// Regularization parameter (lambda)
    pub regularization: f64,
    /// Confidence scaling for implicit feedback
    pub alpha: f64,
    /// Seed for factor initialization; fits are reproducible for a fixed
    /// seed and input
    pub seed: u64,
}

impl Default for AlsConfig {
    fn default() -> Self {
        Self {
            factors: 32,
            iterations: 15,
            regularization: 0.01,
            alpha: 40.0,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AlsState {
    user_factors: Array2<f64>,
    item_factors: Array2<f64>,
}

/// Implicit-feedback ALS factor model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlternatingLeastSquares {
    config: AlsConfig,
    state: Option<AlsState>,
}

impl AlternatingLeastSquares {
    pub fn new(config: AlsConfig) -> Self {
        Self {
            config,
            state: None,
        }
    }

    pub fn config(&self) -> &AlsConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        self.state.is_some()
    }

    /// Derives a user vector from a seen row via one ridge solve against
    /// the fitted item factors. An empty row yields the zero vector.
    fn project_user(
        &self,
        state: &AlsState,
        seen_items: &[usize],
        seen_values: &[f64],
    ) -> Array1<f64> {
        let k = self.config.factors;
        if seen_items.is_empty() {
            return Array1::zeros(k);
        }

        let gram = state.item_factors.t().dot(&state.item_factors);
        solve_row(
            &gram,
            &state.item_factors,
            seen_items,
            seen_values,
            self.config.regularization,
            self.config.alpha,
        )
    }
}

impl Default for AlternatingLeastSquares {
    fn default() -> Self {
        Self::new(AlsConfig::default())
    }
}

impl FactorModel for AlternatingLeastSquares {
    fn fit(&mut self, matrix: &CsrMatrix) -> Result<()> {
        let k = self.config.factors;
        let n_users = matrix.n_rows();
        let n_items = matrix.n_cols();

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut user_factors = random_factors(&mut rng, n_users, k);
        let mut item_factors = random_factors(&mut rng, n_items, k);

        let item_view = matrix.transpose();

        for iteration in 0..self.config.iterations {
            update_side(
                &mut user_factors,
                &item_factors,
                matrix,
                self.config.regularization,
                self.config.alpha,
            );
            update_side(
                &mut item_factors,
                &user_factors,
                &item_view,
                self.config.regularization,
                self.config.alpha,
            );
            debug!("als iteration {}/{} done", iteration + 1, self.config.iterations);
        }

        info!(
            "als fit complete: users={}, items={}, factors={}, nnz={}",
            n_users,
            n_items,
            k,
            matrix.nnz()
        );

        self.state = Some(AlsState {
            user_factors,
            item_factors,
        });
        Ok(())
    }

    fn recommend(
        &self,
        user_index: Option<usize>,
        seen_items: &[usize],
        seen_values: &[f64],
        k: usize,
        filter_seen: bool,
        scope: &ItemScope,
    ) -> Result<Vec<(usize, f64)>> {
        let state = self.state.as_ref().ok_or(RecError::NotFitted)?;

        let user_vector = match user_index {
            Some(row) if row < state.user_factors.nrows() => {
                state.user_factors.row(row).to_owned()
            }
            _ => self.project_user(state, seen_items, seen_values),
        };

        let seen: HashSet<usize> = if filter_seen {
            seen_items.iter().copied().collect()
        } else {
            HashSet::new()
        };

        let n_items = state.item_factors.nrows();
        let score = |item: usize| -> f64 {
            if item < n_items {
                user_vector.dot(&state.item_factors.row(item))
            } else {
                // Item unknown at fit time.
                0.0
            }
        };

        let scored: Vec<(usize, f64)> = match scope {
            ItemScope::Drop(dropped) => (0..n_items)
                .filter(|item| !dropped.contains(item) && !seen.contains(item))
                .map(|item| (item, score(item)))
                .collect(),
            ItemScope::Among(items) => items
                .iter()
                .copied()
                .filter(|item| !seen.contains(item))
                .map(|item| (item, score(item)))
                .collect(),
        };

        Ok(top_k(scored, k))
    }

    fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer(BufWriter::new(file), self)?;
        Ok(())
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        let file = File::open(path)?;
        *self = serde_json::from_reader(BufReader::new(file))?;
        Ok(())
    }
}

fn random_factors(rng: &mut StdRng, rows: usize, k: usize) -> Array2<f64> {
    let mut factors = Array2::zeros((rows, k));
    for i in 0..rows {
        for j in 0..k {
            factors[[i, j]] = rng.gen_range(-0.1..0.1);
        }
    }
    factors
}

/// Recomputes every row of `target` against `other`, where `matrix` holds
/// the interactions from `target`'s side (users: the CSR itself, items:
/// its transpose).
fn update_side(
    target: &mut Array2<f64>,
    other: &Array2<f64>,
    matrix: &CsrMatrix,
    regularization: f64,
    alpha: f64,
) {
    let gram = other.t().dot(other);
    for row in 0..matrix.n_rows() {
        let (cols, vals) = matrix.row(row);
        let solution = solve_row(&gram, other, cols, vals, regularization, alpha);
        target.row_mut(row).assign(&solution);
    }
}

/// Solves (gram + lambda*I + sum_i alpha*r_i * y_i y_i^T) x =
/// sum_i (1 + alpha*r_i) * y_i for one row.
fn solve_row(
    gram: &Array2<f64>,
    other: &Array2<f64>,
    cols: &[usize],
    vals: &[f64],
    regularization: f64,
    alpha: f64,
) -> Array1<f64> {
    let k = gram.nrows();
    let mut a = gram.clone();
    for d in 0..k {
        a[[d, d]] += regularization;
    }
    let mut b = Array1::<f64>::zeros(k);

    for (&col, &val) in cols.iter().zip(vals) {
        if col >= other.nrows() {
            continue;
        }
        let y: ArrayView1<f64> = other.row(col);
        let confidence = alpha * val;
        for p in 0..k {
            let weighted = confidence * y[p];
            for q in 0..k {
                a[[p, q]] += weighted * y[q];
            }
        }
        b.scaled_add(1.0 + confidence, &y);
    }

    solve_linear(a, b)
}

/// Gaussian elimination with partial pivoting. Systems here are k×k with
/// a ridge term on the diagonal, so pivots stay well away from zero.
fn solve_linear(mut a: Array2<f64>, mut b: Array1<f64>) -> Array1<f64> {
    let n = a.nrows();
    for col in 0..n {
        let mut pivot_row = col;
        for row in (col + 1)..n {
            if a[[row, col]].abs() > a[[pivot_row, col]].abs() {
                pivot_row = row;
            }
        }
        if pivot_row != col {
            for c in 0..n {
                let tmp = a[[col, c]];
                a[[col, c]] = a[[pivot_row, c]];
                a[[pivot_row, c]] = tmp;
            }
            b.swap(col, pivot_row);
        }

        let pivot = a[[col, col]];
        for row in (col + 1)..n {
            let factor = a[[row, col]] / pivot;
            if factor == 0.0 {
                continue;
            }
            for c in col..n {
                a[[row, c]] -= factor * a[[col, c]];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = Array1::<f64>::zeros(n);
    for row in (0..n).rev() {
        let mut sum = b[row];
        for c in (row + 1)..n {
            sum -= a[[row, c]] * x[c];
        }
        x[row] = sum / a[[row, row]];
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;
    use recommender_core::{Aggregation, FitMatrix, InteractionLog};

    fn fitted_model() -> (AlternatingLeastSquares, FitMatrix) {
        // u1: i1, i2; u2: i2, i3
        let log: InteractionLog = vec![(1, 1, 1.0), (1, 2, 1.0), (2, 2, 1.0), (2, 3, 1.0)]
            .into_iter()
            .collect();
        let fit = FitMatrix::build(&log, Aggregation::Sum).unwrap();
        let mut model = AlternatingLeastSquares::new(AlsConfig {
            factors: 8,
            iterations: 30,
            regularization: 0.01,
            alpha: 10.0,
            seed: 7,
        });
        model.fit(&fit.matrix).unwrap();
        (model, fit)
    }

    #[test]
    fn test_solve_linear() {
        let a = Array2::from_shape_vec((2, 2), vec![2.0, 1.0, 1.0, 3.0]).unwrap();
        let b = Array1::from_vec(vec![5.0, 10.0]);
        let x = solve_linear(a, b);
        assert!((x[0] - 1.0).abs() < 1e-9);
        assert!((x[1] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_unfitted_model_errors() {
        let model = AlternatingLeastSquares::default();
        let err = model
            .recommend(Some(0), &[], &[], 1, false, &ItemScope::drop_none())
            .unwrap_err();
        assert!(matches!(err, RecError::NotFitted));
    }

    #[test]
    fn test_filter_seen_leaves_only_unseen_item() {
        let (model, fit) = fitted_model();
        // u1's row: seen columns 0 (i1) and 1 (i2); only column 2 (i3)
        // survives filtering.
        let (seen_items, seen_values) = fit.matrix.row(0);
        let recs = model
            .recommend(Some(0), seen_items, seen_values, 1, true, &ItemScope::drop_none())
            .unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].0, 2);
    }

    #[test]
    fn test_seen_items_outrank_unseen_without_filtering() {
        let (model, fit) = fitted_model();
        let (seen_items, seen_values) = fit.matrix.row(0);
        let recs = model
            .recommend(Some(0), seen_items, seen_values, 3, false, &ItemScope::drop_none())
            .unwrap();
        assert_eq!(recs.len(), 3);
        let top_two: Vec<usize> = recs[..2].iter().map(|r| r.0).collect();
        assert!(top_two.contains(&0));
        assert!(top_two.contains(&1));
    }

    #[test]
    fn test_fit_is_deterministic_for_fixed_seed() {
        let (model_a, fit) = fitted_model();
        let (model_b, _) = fitted_model();
        let (seen_items, seen_values) = fit.matrix.row(1);
        let recs_a = model_a
            .recommend(Some(1), seen_items, seen_values, 3, false, &ItemScope::drop_none())
            .unwrap();
        let recs_b = model_b
            .recommend(Some(1), seen_items, seen_values, 3, false, &ItemScope::drop_none())
            .unwrap();
        assert_eq!(recs_a, recs_b);
    }

    #[test]
    fn test_cold_user_scores_zero_with_index_tie_break() {
        let (model, _) = fitted_model();
        let recs = model
            .recommend(None, &[], &[], 2, true, &ItemScope::drop_none())
            .unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0], (0, 0.0));
        assert_eq!(recs[1], (1, 0.0));
    }

    #[test]
    fn test_among_scope_scores_every_listed_column() {
        let (model, _) = fitted_model();
        // Column 9 is unknown to the model and must still come back,
        // scored zero.
        let recs = model
            .recommend(Some(0), &[], &[], 4, false, &ItemScope::Among(vec![2, 0, 9]))
            .unwrap();
        assert_eq!(recs.len(), 3);
        let items: HashSet<usize> = recs.iter().map(|r| r.0).collect();
        assert_eq!(items, [0, 2, 9].into_iter().collect());
        let unknown = recs.iter().find(|r| r.0 == 9).unwrap();
        assert_eq!(unknown.1, 0.0);
    }

    #[test]
    fn test_save_load_round_trip() {
        let (model, fit) = fitted_model();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("als.json");
        model.save(&path).unwrap();

        let mut restored = AlternatingLeastSquares::default();
        restored.load(&path).unwrap();

        let (seen_items, seen_values) = fit.matrix.row(0);
        let original = model
            .recommend(Some(0), seen_items, seen_values, 3, false, &ItemScope::drop_none())
            .unwrap();
        let loaded = restored
            .recommend(Some(0), seen_items, seen_values, 3, false, &ItemScope::drop_none())
            .unwrap();
        assert_eq!(original, loaded);
    }
}
