use super::opinion::Tier;
use super::review_models::Review;
use anyhow::Result;

/// Point storage of reviews. Implementations persist exactly the fields they
/// are given and never recompute ranks or ratings.
pub trait ReviewStore: Send + Sync {
    /// Returns the review of `subject_id` written by `user_id`.
    /// Returns Ok(None) if the user never reviewed the subject.
    fn get_review(&self, user_id: &str, subject_id: &str) -> Result<Option<Review>>;

    /// Returns the review with the given id, Ok(None) if it does not exist.
    fn get_review_by_id(&self, review_id: &str) -> Result<Option<Review>>;

    /// Inserts or replaces a review.
    fn put_review(&self, review: &Review) -> Result<()>;

    /// Deletes a review. Returns false if it did not exist.
    fn delete_review(&self, review_id: &str) -> Result<bool>;

    /// Returns all of a user's reviews, drafts included, oldest first.
    fn get_user_reviews(&self, user_id: &str) -> Result<Vec<Review>>;

    /// Returns every user's review of a subject, oldest first.
    fn get_subject_reviews(&self, subject_id: &str) -> Result<Vec<Review>>;
}

/// Everything one ranking operation writes. Applied all-or-nothing.
#[derive(Debug, Clone, Default)]
pub struct RankingChangeset {
    pub user_id: String,
    /// Reviews to insert or replace.
    pub upserts: Vec<Review>,
    /// Ids of reviews to delete.
    pub deletions: Vec<String>,
    /// Full replacement contents of the touched ranking lists.
    pub lists: Vec<(Tier, Vec<String>)>,
}

impl RankingChangeset {
    pub fn new(user_id: &str) -> Self {
        RankingChangeset {
            user_id: user_id.to_owned(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletions.is_empty() && self.lists.is_empty()
    }
}

pub trait RankingListStore: Send + Sync {
    /// Returns the ordered review ids of a user's tier, rank 0 first.
    fn load_ranking_list(&self, user_id: &str, tier: Tier) -> Result<Vec<String>>;

    /// Applies a changeset in a single transaction. On error nothing of the
    /// changeset is persisted.
    fn commit(&self, changeset: RankingChangeset) -> Result<()>;
}

/// Combined trait for review storage with ranking list persistence
pub trait FullReviewStore: ReviewStore + RankingListStore {}

impl<T: ReviewStore + RankingListStore> FullReviewStore for T {}
