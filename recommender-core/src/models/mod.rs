use serde::{Deserialize, Serialize};

use crate::error::{RecError, Result};

/// Column names of the interaction-log relation.
pub mod columns {
    pub const USER_ID: &str = "user_id";
    pub const ITEM_ID: &str = "item_id";
    pub const RELEVANCE: &str = "relevance";
    pub const TIMESTAMP: &str = "timestamp";
}

/// A single (user, item, relevance) event. Multiple events per
/// (user, item) pair are allowed; how they merge is an [`Aggregation`]
/// choice made at matrix-build time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub user_id: i64,
    pub item_id: i64,
    pub relevance: f64,
    pub timestamp: Option<i64>,
}

impl Interaction {
    pub fn new(user_id: i64, item_id: i64, relevance: f64) -> Self {
        Self {
            user_id,
            item_id,
            relevance,
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Owned interaction-log relation.
///
/// Row order is preserved: index assignment during matrix construction and
/// the `Last` aggregation policy both depend on it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InteractionLog {
    rows: Vec<Interaction>,
}

impl InteractionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a log from parallel columns, validating their shape.
    pub fn from_columns(
        user_ids: &[i64],
        item_ids: &[i64],
        relevance: &[f64],
        timestamps: Option<&[i64]>,
    ) -> Result<Self> {
        if user_ids.len() != item_ids.len() || user_ids.len() != relevance.len() {
            return Err(RecError::Schema(format!(
                "column lengths differ: {}={}, {}={}, {}={}",
                columns::USER_ID,
                user_ids.len(),
                columns::ITEM_ID,
                item_ids.len(),
                columns::RELEVANCE,
                relevance.len(),
            )));
        }
        if let Some(ts) = timestamps {
            if ts.len() != user_ids.len() {
                return Err(RecError::Schema(format!(
                    "column lengths differ: {}={}, {}={}",
                    columns::USER_ID,
                    user_ids.len(),
                    columns::TIMESTAMP,
                    ts.len(),
                )));
            }
        }

        let rows = (0..user_ids.len())
            .map(|i| Interaction {
                user_id: user_ids[i],
                item_id: item_ids[i],
                relevance: relevance[i],
                timestamp: timestamps.map(|ts| ts[i]),
            })
            .collect();
        Ok(Self { rows })
    }

    pub fn push(&mut self, interaction: Interaction) {
        self.rows.push(interaction);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Interaction] {
        &self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Interaction> {
        self.rows.iter()
    }

    /// Distinct user ids in first-appearance order.
    pub fn distinct_users(&self) -> Vec<i64> {
        distinct(self.rows.iter().map(|r| r.user_id))
    }

    /// Distinct item ids in first-appearance order.
    pub fn distinct_items(&self) -> Vec<i64> {
        distinct(self.rows.iter().map(|r| r.item_id))
    }
}

impl From<Vec<Interaction>> for InteractionLog {
    fn from(rows: Vec<Interaction>) -> Self {
        Self { rows }
    }
}

impl FromIterator<(i64, i64, f64)> for InteractionLog {
    fn from_iter<T: IntoIterator<Item = (i64, i64, f64)>>(iter: T) -> Self {
        Self {
            rows: iter
                .into_iter()
                .map(|(user_id, item_id, relevance)| Interaction::new(user_id, item_id, relevance))
                .collect(),
        }
    }
}

impl<'a> IntoIterator for &'a InteractionLog {
    type Item = &'a Interaction;
    type IntoIter = std::slice::Iter<'a, Interaction>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

fn distinct(ids: impl Iterator<Item = i64>) -> Vec<i64> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for id in ids {
        if seen.insert(id) {
            out.push(id);
        }
    }
    out
}

/// How duplicate (user, item) relevance values merge during matrix
/// construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    #[default]
    Sum,
    Max,
    Last,
}

impl Aggregation {
    pub fn combine(self, current: f64, incoming: f64) -> f64 {
        match self {
            Aggregation::Sum => current + incoming,
            Aggregation::Max => current.max(incoming),
            Aggregation::Last => incoming,
        }
    }
}

/// One row of the output relation. Column order and types are fixed:
/// (user_id: i64, item_id: i64, relevance: f64).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRow {
    pub user_id: i64,
    pub item_id: i64,
    pub relevance: f64,
}
