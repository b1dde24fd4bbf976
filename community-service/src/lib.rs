//! Community backend core
//!
//! Rating aggregation, Bayesian-adjusted rankings, forum activity
//! counters, and site-wide stats. Transport, persistence, and auth are
//! external collaborators; this crate owns the denormalized state and
//! its consistency discipline.

pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use config::Config;
pub use error::{ServiceError, ServiceResult};
pub use services::{
    AggregateStore, BayesianScorer, CommunityService, RankingEngine, ReviewStore, StatsProjector,
    ThreadActivityTracker, OVERALL_BUCKET,
};
