//! Recommendation Orchestrator
//!
//! Partitions the prediction workload by user, applies candidate filtering
//! and seen-item exclusion, and merges per-user results into one ranked
//! relation.
//!
//! # Workflow
//! 1. Build (or reuse) the sparse interaction matrix for the call
//! 2. Drop log items outside the candidate set for every user
//! 3. Score each user partition in parallel against the factor model
//! 4. Assemble flat (user_id, item_id, relevance) rows
//!
//! The fitted model and the cached fit snapshot are read-only during
//! prediction; a fresh fit replaces the snapshot, it never mutates it in
//! place.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use recommender_core::{
    FitMatrix, IdIndex, InteractionLog, RecError, RecommendationRow, Result,
};

use crate::assembler;
use crate::config::EngineConfig;
use crate::model::{FactorModel, ItemScope};

const MODEL_FILE: &str = "model.json";
const FIT_FILE: &str = "fit.json";

/// Uniform fit/predict interface over a pluggable factor model.
pub struct Recommender<M: FactorModel> {
    model: M,
    config: EngineConfig,
    fitted: Option<Arc<FitMatrix>>,
}

impl<M: FactorModel> Recommender<M> {
    pub fn new(model: M) -> Self {
        Self::with_config(model, EngineConfig::default())
    }

    pub fn with_config(model: M, config: EngineConfig) -> Self {
        Self {
            model,
            config,
            fitted: None,
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn fitted(&self) -> Option<&FitMatrix> {
        self.fitted.as_deref()
    }

    /// Rebuilds the interaction matrix and fits the model on it. The
    /// cached snapshot is swapped atomically; readers of the previous
    /// `Arc` are unaffected.
    pub fn fit(&mut self, log: &InteractionLog) -> Result<()> {
        let fit = FitMatrix::build(log, self.config.aggregation)?;
        self.model.fit(&fit.matrix)?;
        info!(
            "fit complete: users={}, items={}, nnz={}",
            fit.users.len(),
            fit.items.len(),
            fit.matrix.nnz()
        );
        self.fitted = Some(Arc::new(fit));
        Ok(())
    }

    /// Top-`k` recommendations per requested user.
    ///
    /// `log` supplies the prediction context; when omitted, the last fit's
    /// matrix is reused. `items` is the candidate set, defaulting to every
    /// item in the context log. Items present in the log but outside the
    /// candidate set are excluded for all users regardless of
    /// `filter_seen_items`; the flag additionally removes each user's own
    /// seen items.
    pub fn recommend(
        &self,
        log: Option<&InteractionLog>,
        k: i64,
        users: &[i64],
        items: Option<&[i64]>,
        filter_seen_items: bool,
    ) -> Result<Vec<RecommendationRow>> {
        if k <= 0 {
            return Err(RecError::InvalidK(k));
        }
        let ctx = self.prediction_context(log)?;

        let log_items: Vec<i64> = match log {
            Some(log) => log.distinct_items(),
            None => ctx.items.ids().to_vec(),
        };
        let candidate_set: HashSet<i64> = match items {
            Some(items) => items.iter().copied().collect(),
            None => log_items.iter().copied().collect(),
        };
        let items_to_drop: HashSet<usize> = log_items
            .iter()
            .copied()
            .filter(|id| !candidate_set.contains(id))
            .filter_map(|id| ctx.items.get(id))
            .collect();
        let scope = ItemScope::Drop(items_to_drop);

        let users = dedup_preserving_order(users);
        let k = k as usize;
        let partition_size = self.config.partition_size.max(1);
        let partitions: Vec<&[i64]> = users.chunks(partition_size).collect();
        debug!(
            "scoring {} users across {} partitions",
            users.len(),
            partitions.len()
        );

        let per_partition = partitions
            .par_iter()
            .map(|partition| {
                self.recommend_partition(partition, &ctx, k, filter_seen_items, &scope)
            })
            .collect::<Result<Vec<_>>>()?;

        let rows = assembler::assemble(per_partition);
        info!(
            "recommend complete: users={}, rows={}",
            users.len(),
            rows.len()
        );
        Ok(rows)
    }

    /// Fits on `log` and recommends against it in one call.
    pub fn fit_recommend(
        &mut self,
        log: &InteractionLog,
        k: i64,
        users: &[i64],
        items: Option<&[i64]>,
        filter_seen_items: bool,
    ) -> Result<Vec<RecommendationRow>> {
        self.fit(log)?;
        self.recommend(None, k, users, items, filter_seen_items)
    }

    /// Scores exactly the requested (user, item) pairs.
    ///
    /// Routes through a grid over the distinct users × distinct items of
    /// `pairs`, then filters down to the input. Every input pair produces
    /// exactly one output row; pairs whose user or item never appeared in
    /// the context score 0.0.
    pub fn score_pairs(
        &self,
        pairs: &[(i64, i64)],
        log: Option<&InteractionLog>,
    ) -> Result<Vec<RecommendationRow>> {
        if pairs.is_empty() {
            return Ok(Vec::new());
        }
        let ctx = self.prediction_context(log)?;

        let users = dedup_preserving_order(&pairs.iter().map(|p| p.0).collect::<Vec<_>>());
        let item_ids = dedup_preserving_order(&pairs.iter().map(|p| p.1).collect::<Vec<_>>());
        let item_indices: Vec<usize> = item_ids
            .iter()
            .filter_map(|&id| ctx.items.get(id))
            .collect();
        let grid_k = item_indices.len();
        let scope = ItemScope::Among(item_indices);

        let per_user: Vec<(i64, Vec<(usize, f64)>)> = users
            .par_iter()
            .map(|&user_id| {
                let user_index = ctx.users.get(user_id);
                let (seen_items, seen_values) = match user_index {
                    Some(row) => ctx.matrix.row(row),
                    None => (&[][..], &[][..]),
                };
                self.model
                    .recommend(user_index, seen_items, seen_values, grid_k, false, &scope)
                    .map(|scored| (user_id, scored))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut grid: HashMap<(i64, i64), f64> = HashMap::new();
        for (user_id, scored) in per_user {
            for (item_index, relevance) in scored {
                if let Some(item_id) = ctx.items.id(item_index) {
                    grid.insert((user_id, item_id), relevance);
                }
            }
        }

        Ok(pairs
            .iter()
            .map(|&(user_id, item_id)| RecommendationRow {
                user_id,
                item_id,
                relevance: grid.get(&(user_id, item_id)).copied().unwrap_or(0.0),
            })
            .collect())
    }

    /// Persists the model and the fit snapshot under `dir`.
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        self.model.save(&dir.join(MODEL_FILE))?;
        if let Some(fit) = &self.fitted {
            let file = File::create(dir.join(FIT_FILE))?;
            serde_json::to_writer(BufWriter::new(file), fit.as_ref())?;
        }
        Ok(())
    }

    /// Restores a model and fit snapshot written by [`Recommender::save`].
    pub fn load(&mut self, dir: &Path) -> Result<()> {
        self.model.load(&dir.join(MODEL_FILE))?;
        let fit_path = dir.join(FIT_FILE);
        self.fitted = if fit_path.exists() {
            let file = File::open(fit_path)?;
            let fit: FitMatrix = serde_json::from_reader(BufReader::new(file))?;
            Some(Arc::new(fit))
        } else {
            None
        };
        Ok(())
    }

    fn prediction_context(&self, log: Option<&InteractionLog>) -> Result<Arc<FitMatrix>> {
        match log {
            Some(log) => {
                // Keep prediction coordinates aligned with the fit-time
                // mapping; new ids extend it.
                let (users, items) = match &self.fitted {
                    Some(fit) => (fit.users.clone(), fit.items.clone()),
                    None => (IdIndex::new(), IdIndex::new()),
                };
                Ok(Arc::new(FitMatrix::build_with_index(
                    log,
                    self.config.aggregation,
                    users,
                    items,
                )?))
            }
            None => self.fitted.clone().ok_or(RecError::NotFitted),
        }
    }

    fn recommend_partition(
        &self,
        partition: &[i64],
        ctx: &FitMatrix,
        k: usize,
        filter_seen_items: bool,
        scope: &ItemScope,
    ) -> Result<Vec<RecommendationRow>> {
        let mut rows = Vec::new();
        for &user_id in partition {
            let user_index = ctx.users.get(user_id);
            if user_index.is_none() && self.config.strict_user_lookup {
                return Err(RecError::UnknownUser(user_id));
            }
            let (seen_items, seen_values) = match user_index {
                Some(row) => ctx.matrix.row(row),
                None => (&[][..], &[][..]),
            };

            let scored = self.model.recommend(
                user_index,
                seen_items,
                seen_values,
                k,
                filter_seen_items,
                scope,
            )?;

            if scored.is_empty() {
                if self.config.strict_exhaustion {
                    return Err(RecError::CandidateExhausted(user_id));
                }
                warn!("user {} has no eligible items after filtering", user_id);
                continue;
            }

            for (item_index, relevance) in scored {
                let item_id = ctx.items.id(item_index).ok_or_else(|| {
                    RecError::Schema(format!(
                        "model returned item index {item_index} outside the catalog"
                    ))
                })?;
                rows.push(RecommendationRow {
                    user_id,
                    item_id,
                    relevance,
                });
            }
        }
        Ok(rows)
    }
}

fn dedup_preserving_order(ids: &[i64]) -> Vec<i64> {
    let mut seen = HashSet::new();
    ids.iter()
        .copied()
        .filter(|id| seen.insert(*id))
        .collect()
}
