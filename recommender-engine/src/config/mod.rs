use recommender_core::Aggregation;
use serde::Deserialize;
use std::env;

/// Engine-wide configuration.
///
/// `strict_user_lookup` turns a missing user row into an error instead of
/// an all-zero row; `strict_exhaustion` turns a user with zero eligible
/// recommendations into an error instead of a warning.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub aggregation: Aggregation,
    pub partition_size: usize,
    pub strict_user_lookup: bool,
    pub strict_exhaustion: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            aggregation: Aggregation::Sum,
            partition_size: 1024,
            strict_user_lookup: false,
            strict_exhaustion: false,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            aggregation: match env::var("REC_AGGREGATION")
                .unwrap_or_else(|_| "sum".to_string())
                .to_ascii_lowercase()
                .as_str()
            {
                "sum" => Aggregation::Sum,
                "max" => Aggregation::Max,
                "last" => Aggregation::Last,
                other => panic!("REC_AGGREGATION must be sum, max or last, got {other}"),
            },
            partition_size: env::var("REC_PARTITION_SIZE")
                .unwrap_or_else(|_| "1024".to_string())
                .parse()
                .expect("REC_PARTITION_SIZE must be a valid usize"),
            strict_user_lookup: env::var("REC_STRICT_USER_LOOKUP")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .expect("REC_STRICT_USER_LOOKUP must be true or false"),
            strict_exhaustion: env::var("REC_STRICT_EXHAUSTION")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .expect("REC_STRICT_EXHAUSTION must be true or false"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.aggregation, Aggregation::Sum);
        assert_eq!(config.partition_size, 1024);
        assert!(!config.strict_user_lookup);
        assert!(!config.strict_exhaustion);
    }
}
