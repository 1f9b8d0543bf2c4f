//! Review Ranking Server Library
//!
//! Per-user, opinion tiered review rankings with ratings derived from rank.
//! The library exposes the modules for testing and embedding.

pub mod config;
pub mod review;
pub mod server;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use review::{
    Opinion, RankingError, RankingListManager, RankingSettings, Review, SqliteReviewStore, Tier,
};
pub use server::{run_server, RequestsLoggingLevel};
