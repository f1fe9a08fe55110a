//! Factor Model seam.
//!
//! The orchestrator talks to latent-factor backends exclusively through
//! [`FactorModel`], so alternative factorization implementations plug in
//! without touching the recommendation flow. All item/user coordinates at
//! this seam are matrix indices, not external ids.

mod als;

pub use als::{AlsConfig, AlternatingLeastSquares};

use std::collections::HashSet;
use std::path::Path;

use recommender_core::{CsrMatrix, Result};

/// Which item columns a scoring call may return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemScope {
    /// Every item known to the model except the given columns.
    Drop(HashSet<usize>),
    /// Exactly the given columns, in any order.
    Among(Vec<usize>),
}

impl ItemScope {
    pub fn drop_none() -> Self {
        ItemScope::Drop(HashSet::new())
    }

    pub fn allows(&self, item: usize) -> bool {
        match self {
            ItemScope::Drop(dropped) => !dropped.contains(&item),
            ItemScope::Among(items) => items.contains(&item),
        }
    }
}

/// A latent-factor scoring backend.
///
/// The model is read-only during scoring and safe to share across worker
/// partitions.
pub trait FactorModel: Send + Sync {
    /// Trains on a user×item relevance matrix.
    fn fit(&mut self, matrix: &CsrMatrix) -> Result<()>;

    /// Scores items for one user and returns up to `k` (item, score)
    /// pairs, descending by score, ties broken by ascending item index.
    ///
    /// `user_index` is the user's fit-time row when it had one; cold users
    /// pass `None` and are scored from `seen_items`/`seen_values` alone
    /// (an empty row scores every item zero). When `filter_seen` is set,
    /// items present in the seen row never appear in the result.
    ///
    /// With `ItemScope::Among`, `filter_seen == false` and
    /// `k >= scope.len()`, the result contains exactly one entry per
    /// listed column. Pairwise scoring relies on this.
    fn recommend(
        &self,
        user_index: Option<usize>,
        seen_items: &[usize],
        seen_values: &[f64],
        k: usize,
        filter_seen: bool,
        scope: &ItemScope,
    ) -> Result<Vec<(usize, f64)>>;

    /// Persists the fitted state. The format is backend-private.
    fn save(&self, path: &Path) -> Result<()>;

    /// Restores state previously written by `save`.
    fn load(&mut self, path: &Path) -> Result<()>;
}

/// Keeps the `k` best (item, score) pairs, descending by score, ties by
/// ascending item index.
pub(crate) fn top_k(mut scored: Vec<(usize, f64)>, k: usize) -> Vec<(usize, f64)> {
    scored.sort_unstable_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    scored.truncate(k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_scope_allows() {
        let drop = ItemScope::Drop([1, 2].into_iter().collect());
        assert!(drop.allows(0));
        assert!(!drop.allows(1));

        let among = ItemScope::Among(vec![3, 4]);
        assert!(among.allows(3));
        assert!(!among.allows(0));

        assert!(ItemScope::drop_none().allows(7));
    }

    #[test]
    fn test_top_k_orders_and_breaks_ties_by_index() {
        let scored = vec![(3, 0.5), (0, 1.0), (2, 0.5), (1, 0.2)];
        let top = top_k(scored, 3);
        assert_eq!(top, vec![(0, 1.0), (2, 0.5), (3, 0.5)]);
    }

    #[test]
    fn test_top_k_truncates_to_available() {
        let top = top_k(vec![(0, 1.0)], 5);
        assert_eq!(top.len(), 1);
    }
}
