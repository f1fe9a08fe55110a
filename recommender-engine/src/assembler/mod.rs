//! Result Assembler
//!
//! Merges per-partition recommendation outputs, which may arrive in any
//! order relative to each other, into one flat relation with fixed column
//! order and types. Uniqueness of (user, item) pairs is an orchestrator
//! invariant; the assembler does not deduplicate.

use recommender_core::RecommendationRow;

/// Flattens partition outputs. Rows for a given user stay contiguous
/// because no partition splits a user.
pub fn assemble(per_partition: Vec<Vec<RecommendationRow>>) -> Vec<RecommendationRow> {
    let total = per_partition.iter().map(Vec::len).sum();
    let mut flat = Vec::with_capacity(total);
    for rows in per_partition {
        flat.extend(rows);
    }
    flat
}

/// Splits the relation into typed columns (user_id, item_id, relevance)
/// for columnar consumers.
pub fn into_columns(rows: &[RecommendationRow]) -> (Vec<i64>, Vec<i64>, Vec<f64>) {
    let mut user_ids = Vec::with_capacity(rows.len());
    let mut item_ids = Vec::with_capacity(rows.len());
    let mut relevance = Vec::with_capacity(rows.len());
    for row in rows {
        user_ids.push(row.user_id);
        item_ids.push(row.item_id);
        relevance.push(row.relevance);
    }
    (user_ids, item_ids, relevance)
}
