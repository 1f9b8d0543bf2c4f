mod errors;
mod opinion;
mod rank_assigner;
mod ranking_manager;
mod rating;
mod review_models;
mod review_store;
mod sqlite_review_store;

pub use errors::{RankingError, RankingResult};
pub use opinion::{Opinion, Tier};
pub use rank_assigner::{RankingList, UserRankings};
pub use ranking_manager::{RankingListManager, RankingSettings, DEFAULT_LOCK_TIMEOUT};
pub use rating::{rating, tier_range, tier_ratings, TierRange};
pub use review_models::{count_words, Review, MAX_DESCRIPTION_WORDS};
pub use review_store::{FullReviewStore, RankingChangeset, RankingListStore, ReviewStore};
pub use sqlite_review_store::SqliteReviewStore;
