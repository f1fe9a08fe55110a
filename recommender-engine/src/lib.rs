//! Recommendation engine: a uniform fit/predict interface over pluggable
//! latent-factor models.
//!
//! # Architecture
//! - **Model Layer**: [`FactorModel`] trait with a reference ALS backend
//! - **Orchestrator Layer**: per-user partitioned top-K recommendation
//!   with seen-item and candidate-set exclusion
//! - **Assembler Layer**: merges partition outputs into one flat relation
//!
//! # Workflow
//! 1. Build the sparse user×item matrix from the interaction log
//! 2. Fit the factor model on it
//! 3. Score requested users in parallel partitions
//! 4. Assemble (user_id, item_id, relevance) rows

pub mod assembler;
pub mod config;
pub mod model;
pub mod orchestrator;

pub use config::EngineConfig;
pub use model::{AlsConfig, AlternatingLeastSquares, FactorModel, ItemScope};
pub use orchestrator::Recommender;

pub use recommender_core::{
    Aggregation, CsrMatrix, FitMatrix, Interaction, InteractionLog, RecError, RecommendationRow,
    Result,
};
