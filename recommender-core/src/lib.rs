//! Shared data model for the recommender workspace.
//!
//! Holds the interaction-log relation, the compressed sparse matrix built
//! from it, the id/index mappings needed to translate between the two, and
//! the error taxonomy used across the workspace.

pub mod error;
pub mod models;
pub mod sparse;

pub use error::{RecError, Result};
pub use models::{Aggregation, Interaction, InteractionLog, RecommendationRow};
pub use sparse::{CsrMatrix, FitMatrix, IdIndex};
