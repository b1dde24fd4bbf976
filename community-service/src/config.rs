/// Configuration management for Community Service
///
/// Loads configuration from environment variables. All values are
/// process-wide, set at startup, and immutable thereafter.
use serde::{Deserialize, Serialize};

use crate::error::{ServiceError, ServiceResult};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Ranking formula settings
    pub ranking: RankingConfig,
    /// Rating scale bounds
    pub rating: RatingConfig,
    /// Cache staleness policy
    pub cache: CacheConfig,
    /// Site stats refresh policy
    pub stats: StatsConfig,
}

/// Bayesian ranking settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    /// Prior mean: the expected average rating across the whole corpus
    #[serde(default = "default_prior_mean")]
    pub prior_mean: f64,
    /// Prior weight: phantom average-rated reviews assumed before real data
    #[serde(default = "default_prior_weight")]
    pub prior_weight: f64,
}

/// Rating scale bounds (inclusive, fractional ratings allowed)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingConfig {
    #[serde(default = "default_rating_min")]
    pub min: f64,
    #[serde(default = "default_rating_max")]
    pub max: f64,
}

/// Ranking cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Whether ranking queries are memoized at all
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    /// TTL for cached ranking pages in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

/// Site stats snapshot settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsConfig {
    /// How long a stats snapshot may be served before recomputing, seconds
    #[serde(default = "default_stats_refresh_secs")]
    pub refresh_secs: u64,
}

// Default values
fn default_prior_mean() -> f64 {
    3.0
}

fn default_prior_weight() -> f64 {
    5.0
}

fn default_rating_min() -> f64 {
    1.0
}

fn default_rating_max() -> f64 {
    5.0
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_ttl_secs() -> u64 {
    30
}

fn default_stats_refresh_secs() -> u64 {
    60
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> ServiceResult<Self> {
        let config = Config {
            ranking: RankingConfig {
                prior_mean: env_parse("RANKING_PRIOR_MEAN", default_prior_mean()),
                prior_weight: env_parse("RANKING_PRIOR_WEIGHT", default_prior_weight()),
            },
            rating: RatingConfig {
                min: env_parse("RATING_SCALE_MIN", default_rating_min()),
                max: env_parse("RATING_SCALE_MAX", default_rating_max()),
            },
            cache: CacheConfig {
                enabled: env_parse("RANKING_CACHE_ENABLED", default_cache_enabled()),
                ttl_secs: env_parse("RANKING_CACHE_TTL_SECS", default_cache_ttl_secs()),
            },
            stats: StatsConfig {
                refresh_secs: env_parse("STATS_REFRESH_SECS", default_stats_refresh_secs()),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run under
    pub fn validate(&self) -> ServiceResult<()> {
        if !self.ranking.prior_mean.is_finite() || !self.ranking.prior_weight.is_finite() {
            return Err(ServiceError::InvalidInput(
                "ranking priors must be finite".to_string(),
            ));
        }
        if self.ranking.prior_weight < 0.0 {
            return Err(ServiceError::InvalidInput(
                "prior weight must be non-negative".to_string(),
            ));
        }
        if self.rating.min >= self.rating.max {
            return Err(ServiceError::InvalidInput(format!(
                "rating scale is inverted: min={} max={}",
                self.rating.min, self.rating.max
            )));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            ranking: RankingConfig {
                prior_mean: default_prior_mean(),
                prior_weight: default_prior_weight(),
            },
            rating: RatingConfig {
                min: default_rating_min(),
                max: default_rating_max(),
            },
            cache: CacheConfig {
                enabled: default_cache_enabled(),
                ttl_secs: default_cache_ttl_secs(),
            },
            stats: StatsConfig {
                refresh_secs: default_stats_refresh_secs(),
            },
        }
    }
}
