//! The ranking list manager.
//!
//! Every write loads the user's three ranking lists, mutates them in memory,
//! recomputes rank and rating of every member of the tiers that changed and
//! hands the result to the store as one changeset. Writes of one user are
//! serialized by a per-user lock, reads of whole lists take the same lock in
//! shared mode.

use anyhow::anyhow;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, error, info, warn};

use super::errors::{RankingError, RankingResult};
use super::opinion::{Opinion, Tier};
use super::rank_assigner::UserRankings;
use super::rating::tier_ratings;
use super::review_models::{count_words, Review, MAX_DESCRIPTION_WORDS};
use super::review_store::{FullReviewStore, RankingChangeset};
use crate::server::metrics;

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(5000);

/// Idle user locks are dropped once the table grows past this size.
const USER_LOCKS_PRUNE_THRESHOLD: usize = 256;

#[derive(Debug, Clone)]
pub struct RankingSettings {
    /// How long a write waits for the user's lock before giving up with a
    /// conflict.
    pub lock_timeout: Duration,
}

impl Default for RankingSettings {
    fn default() -> Self {
        RankingSettings {
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

type UserLock = Arc<RwLock<()>>;

pub struct RankingListManager {
    store: Arc<dyn FullReviewStore>,
    settings: RankingSettings,
    user_locks: Mutex<HashMap<String, UserLock>>,
}

fn validate_description(description: &str) -> RankingResult<()> {
    let words = count_words(description);
    if words > MAX_DESCRIPTION_WORDS {
        return Err(RankingError::Validation(format!(
            "Description has {} words, at most {} are allowed",
            words, MAX_DESCRIPTION_WORDS
        )));
    }
    Ok(())
}

fn review_not_found(review_id: &str) -> RankingError {
    RankingError::NotFound(format!("Review {} not found", review_id))
}

fn missing_from_list(review: &Review, tier: Tier) -> RankingError {
    RankingError::Storage(anyhow!(
        "Review {} of user {} is missing from the {} ranking list",
        review.id,
        review.user_id,
        tier.as_str()
    ))
}

fn regression_rejected(review: &Review) -> RankingError {
    RankingError::Validation(format!(
        "Review {} is already ranked and cannot go back to UNDEFINED, delete it instead",
        review.id
    ))
}

fn observe<T>(operation: &'static str, started: Instant, result: &RankingResult<T>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(err) => {
            match err {
                RankingError::Storage(_) => error!("{} failed: {:#}", operation, err),
                _ => warn!("{} rejected: {}", operation, err),
            }
            err.kind()
        }
    };
    metrics::record_ranking_operation(operation, outcome, started.elapsed());
}

/// Writes rank and rating of every member of the touched tiers into
/// `reviews` and queues the rewritten lists plus every member whose rank,
/// rating or opinion changed on `changeset`. `skip` is left off the upserts.
fn rerank_touched(
    rankings: &UserRankings,
    reviews: &mut HashMap<String, Review>,
    changeset: &mut RankingChangeset,
    skip: Option<&str>,
) -> RankingResult<()> {
    for tier in rankings.touched_tiers() {
        let ids = rankings.list(tier).ids();
        let ratings = tier_ratings(tier, ids.len());
        for ((rank, review_id), rating) in ids.iter().enumerate().zip(ratings) {
            let review = reviews.get_mut(review_id).ok_or_else(|| {
                RankingError::Storage(anyhow!(
                    "The {} ranking list of user {} references missing review {}",
                    tier.as_str(),
                    rankings.user_id(),
                    review_id
                ))
            })?;
            let changed = review.rank != Some(rank)
                || review.rating != Some(rating)
                || review.opinion != tier.opinion();
            review.rank = Some(rank);
            review.rating = Some(rating);
            review.opinion = tier.opinion();
            if changed && skip != Some(review_id.as_str()) {
                changeset.upserts.push(review.clone());
            }
        }
        changeset.lists.push((tier, ids.to_vec()));
    }
    Ok(())
}

impl RankingListManager {
    pub fn new(store: Arc<dyn FullReviewStore>, settings: RankingSettings) -> Self {
        RankingListManager {
            store,
            settings,
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    fn user_lock(&self, user_id: &str) -> UserLock {
        let mut locks = self.user_locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks.len() > USER_LOCKS_PRUNE_THRESHOLD {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        locks.entry(user_id.to_owned()).or_default().clone()
    }

    // Nothing between taking the write lock and the store commit awaits, so
    // a dropped caller can never leave a half-applied operation behind.
    async fn lock_for_write(&self, user_id: &str) -> RankingResult<OwnedRwLockWriteGuard<()>> {
        let lock = self.user_lock(user_id);
        tokio::time::timeout(self.settings.lock_timeout, lock.write_owned())
            .await
            .map_err(|_| {
                RankingError::Conflict(format!(
                    "Timed out after {:?} waiting for the ranking lock of user {}",
                    self.settings.lock_timeout, user_id
                ))
            })
    }

    async fn lock_for_read(&self, user_id: &str) -> RankingResult<OwnedRwLockReadGuard<()>> {
        let lock = self.user_lock(user_id);
        tokio::time::timeout(self.settings.lock_timeout, lock.read_owned())
            .await
            .map_err(|_| {
                RankingError::Conflict(format!(
                    "Timed out after {:?} waiting to read the rankings of user {}",
                    self.settings.lock_timeout, user_id
                ))
            })
    }

    /// Locks the owner of `review_id` and returns the review as it is once
    /// the lock is held.
    async fn lock_review_owner(
        &self,
        review_id: &str,
    ) -> RankingResult<(OwnedRwLockWriteGuard<()>, Review)> {
        let owner = self
            .store
            .get_review_by_id(review_id)?
            .ok_or_else(|| review_not_found(review_id))?
            .user_id;
        let guard = self.lock_for_write(&owner).await?;
        // It may have been deleted while we were waiting.
        let review = self
            .store
            .get_review_by_id(review_id)?
            .filter(|review| review.user_id == owner)
            .ok_or_else(|| review_not_found(review_id))?;
        Ok((guard, review))
    }

    fn load_rankings(&self, user_id: &str) -> RankingResult<UserRankings> {
        let mut lists = Vec::with_capacity(Tier::ALL.len());
        for tier in Tier::ALL {
            lists.push((tier, self.store.load_ranking_list(user_id, tier)?));
        }
        Ok(UserRankings::with_lists(user_id, lists))
    }

    fn touched_reviews(&self, rankings: &UserRankings) -> RankingResult<HashMap<String, Review>> {
        if rankings.touched_tiers().is_empty() {
            return Ok(HashMap::new());
        }
        Ok(self
            .store
            .get_user_reviews(rankings.user_id())?
            .into_iter()
            .map(|review| (review.id.clone(), review))
            .collect())
    }

    /// Commits `review` together with the re-rated members of every touched
    /// tier. Returns `review` as stored.
    fn commit_edit(&self, rankings: &UserRankings, review: Review) -> RankingResult<Review> {
        let review_id = review.id.clone();
        let mut reviews = self.touched_reviews(rankings)?;
        reviews.insert(review_id.clone(), review);

        let mut changeset = RankingChangeset::new(rankings.user_id());
        rerank_touched(rankings, &mut reviews, &mut changeset, Some(&review_id))?;
        let review = reviews
            .remove(&review_id)
            .ok_or_else(|| review_not_found(&review_id))?;
        changeset.upserts.push(review.clone());

        self.store.commit(changeset)?;
        Ok(review)
    }

    fn commit_deletion(&self, rankings: &UserRankings, review: &Review) -> RankingResult<()> {
        let mut reviews = self.touched_reviews(rankings)?;
        let mut changeset = RankingChangeset::new(rankings.user_id());
        changeset.deletions.push(review.id.clone());
        rerank_touched(rankings, &mut reviews, &mut changeset, None)?;
        self.store.commit(changeset)?;
        Ok(())
    }

    /// Creates the review of `subject_id` by `user_id`, or updates it if the
    /// user already reviewed the subject.
    ///
    /// A first submission with `Opinion::Undefined` is stored as an unranked
    /// draft. A ranked review can't go back to `Undefined`.
    pub async fn submit_review(
        &self,
        user_id: &str,
        subject_id: &str,
        opinion: Opinion,
        description: &str,
        position: Option<usize>,
    ) -> RankingResult<Review> {
        let started = Instant::now();
        let result = self
            .submit_review_inner(user_id, subject_id, opinion, description, position)
            .await;
        observe("submit_review", started, &result);
        result
    }

    async fn submit_review_inner(
        &self,
        user_id: &str,
        subject_id: &str,
        opinion: Opinion,
        description: &str,
        position: Option<usize>,
    ) -> RankingResult<Review> {
        validate_description(description)?;
        let _guard = self.lock_for_write(user_id).await?;

        let mut rankings = self.load_rankings(user_id)?;
        let review = match self.store.get_review(user_id, subject_id)? {
            None => {
                let review = Review::new(user_id, subject_id, opinion, description);
                if let Some(tier) = opinion.tier() {
                    rankings.insert(tier, &review.id, position);
                }
                review
            }
            Some(mut review) => {
                match (review.tier(), opinion.tier()) {
                    (Some(_), None) => return Err(regression_rejected(&review)),
                    (None, None) => {}
                    (None, Some(new_tier)) => {
                        rankings.insert(new_tier, &review.id, position);
                    }
                    (Some(current), Some(new_tier)) if current == new_tier => {
                        if let Some(position) = position {
                            rankings
                                .move_review(current, &review.id, position)
                                .ok_or_else(|| missing_from_list(&review, current))?;
                        }
                    }
                    (Some(current), Some(new_tier)) => {
                        rankings
                            .change_tier(&review.id, current, new_tier, position)
                            .ok_or_else(|| missing_from_list(&review, current))?;
                    }
                }
                review.opinion = opinion;
                review.description = description.to_owned();
                review.touch();
                review
            }
        };

        let review = self.commit_edit(&rankings, review)?;
        info!(
            "User {} submitted review {} of {} as {} (rank {:?}, rating {:?})",
            user_id,
            review.id,
            subject_id,
            review.opinion.as_str(),
            review.rank,
            review.rating
        );
        Ok(review)
    }

    /// Replaces the description of a review. Rank and rating are untouched.
    pub async fn edit_description(
        &self,
        review_id: &str,
        description: &str,
    ) -> RankingResult<Review> {
        let started = Instant::now();
        let result = self.edit_description_inner(review_id, description).await;
        observe("edit_description", started, &result);
        result
    }

    async fn edit_description_inner(
        &self,
        review_id: &str,
        description: &str,
    ) -> RankingResult<Review> {
        validate_description(description)?;
        let (_guard, mut review) = self.lock_review_owner(review_id).await?;
        review.description = description.to_owned();
        review.touch();
        let rankings = UserRankings::new(&review.user_id);
        let review = self.commit_edit(&rankings, review)?;
        debug!("Updated description of review {}", review.id);
        Ok(review)
    }

    /// Moves a review to the tier of `new_opinion`, at `position` or at the
    /// end of it. Ranks a draft. Keeping the current tier changes nothing.
    pub async fn change_opinion(
        &self,
        review_id: &str,
        new_opinion: Opinion,
        position: Option<usize>,
    ) -> RankingResult<Review> {
        let started = Instant::now();
        let result = self
            .change_opinion_inner(review_id, new_opinion, position)
            .await;
        observe("change_opinion", started, &result);
        result
    }

    async fn change_opinion_inner(
        &self,
        review_id: &str,
        new_opinion: Opinion,
        position: Option<usize>,
    ) -> RankingResult<Review> {
        let (_guard, mut review) = self.lock_review_owner(review_id).await?;
        let mut rankings = self.load_rankings(&review.user_id)?;
        match (review.tier(), new_opinion.tier()) {
            (Some(_), None) => return Err(regression_rejected(&review)),
            (None, None) => return Ok(review),
            (Some(current), Some(new_tier)) if current == new_tier => return Ok(review),
            (Some(current), Some(new_tier)) => {
                rankings
                    .change_tier(&review.id, current, new_tier, position)
                    .ok_or_else(|| missing_from_list(&review, current))?;
            }
            (None, Some(new_tier)) => {
                rankings.insert(new_tier, &review.id, position);
            }
        }
        review.opinion = new_opinion;
        review.touch();

        let review = self.commit_edit(&rankings, review)?;
        info!(
            "Review {} of user {} is now {} (rank {:?}, rating {:?})",
            review.id,
            review.user_id,
            review.opinion.as_str(),
            review.rank,
            review.rating
        );
        Ok(review)
    }

    /// Moves one of `user_id`'s reviews to `new_position` within its tier.
    /// Out of bounds positions are clamped.
    pub async fn reorder_review(
        &self,
        user_id: &str,
        review_id: &str,
        new_position: usize,
    ) -> RankingResult<Review> {
        let started = Instant::now();
        let result = self
            .reorder_review_inner(user_id, review_id, new_position)
            .await;
        observe("reorder_review", started, &result);
        result
    }

    async fn reorder_review_inner(
        &self,
        user_id: &str,
        review_id: &str,
        new_position: usize,
    ) -> RankingResult<Review> {
        let _guard = self.lock_for_write(user_id).await?;
        let mut review = self
            .store
            .get_review_by_id(review_id)?
            .filter(|review| review.user_id == user_id)
            .ok_or_else(|| review_not_found(review_id))?;
        let tier = review.tier().ok_or_else(|| {
            RankingError::Validation(format!(
                "Review {} is a draft and has no rank to change",
                review_id
            ))
        })?;

        let mut rankings = self.load_rankings(user_id)?;
        rankings
            .move_review(tier, review_id, new_position)
            .ok_or_else(|| missing_from_list(&review, tier))?;
        if rankings.touched_tiers().is_empty() {
            return Ok(review);
        }
        review.touch();

        let review = self.commit_edit(&rankings, review)?;
        info!(
            "User {} moved review {} to rank {:?} in {}",
            user_id,
            review_id,
            review.rank,
            tier.as_str()
        );
        Ok(review)
    }

    /// Deletes a review and closes the gap it leaves in its tier. Returns the
    /// review as it was before deletion.
    pub async fn delete_review(&self, review_id: &str) -> RankingResult<Review> {
        let started = Instant::now();
        let result: RankingResult<Review> = async {
            let (_guard, review) = self.lock_review_owner(review_id).await?;
            self.delete_locked(review)
        }
        .await;
        observe("delete_review", started, &result);
        result
    }

    /// Deletes `user_id`'s review of `subject_id`.
    pub async fn delete_review_by_subject(
        &self,
        user_id: &str,
        subject_id: &str,
    ) -> RankingResult<Review> {
        let started = Instant::now();
        let result: RankingResult<Review> = async {
            let _guard = self.lock_for_write(user_id).await?;
            let review = self.store.get_review(user_id, subject_id)?.ok_or_else(|| {
                RankingError::NotFound(format!(
                    "User {} has no review of {}",
                    user_id, subject_id
                ))
            })?;
            self.delete_locked(review)
        }
        .await;
        observe("delete_review", started, &result);
        result
    }

    fn delete_locked(&self, review: Review) -> RankingResult<Review> {
        let mut rankings = self.load_rankings(&review.user_id)?;
        if let Some(tier) = review.tier() {
            if rankings.remove(tier, &review.id).is_none() {
                warn!(
                    "Deleting review {} which was missing from the {} list of user {}",
                    review.id,
                    tier.as_str(),
                    review.user_id
                );
            }
        }
        self.commit_deletion(&rankings, &review)?;
        info!(
            "User {} deleted review {} of {}",
            review.user_id, review.id, review.subject_id
        );
        Ok(review)
    }

    /// Ranked reviews of a user, ordered by rank. Without a tier, all tiers
    /// are concatenated from `Liked` to `Dislike`. Drafts are never listed.
    pub async fn get_ranked_list(
        &self,
        user_id: &str,
        tier: Option<Tier>,
    ) -> RankingResult<Vec<Review>> {
        let started = Instant::now();
        let result = self.get_ranked_list_inner(user_id, tier).await;
        observe("get_ranked_list", started, &result);
        result
    }

    async fn get_ranked_list_inner(
        &self,
        user_id: &str,
        tier: Option<Tier>,
    ) -> RankingResult<Vec<Review>> {
        let _guard = self.lock_for_read(user_id).await?;
        let tiers: Vec<Tier> = match tier {
            Some(tier) => vec![tier],
            None => Tier::ALL.to_vec(),
        };

        let mut reviews: HashMap<String, Review> = self
            .store
            .get_user_reviews(user_id)?
            .into_iter()
            .map(|review| (review.id.clone(), review))
            .collect();
        let mut ranked = Vec::new();
        for tier in tiers {
            for review_id in self.store.load_ranking_list(user_id, tier)? {
                let review = reviews.remove(&review_id).ok_or_else(|| {
                    RankingError::Storage(anyhow!(
                        "The {} ranking list of user {} references missing review {}",
                        tier.as_str(),
                        user_id,
                        review_id
                    ))
                })?;
                ranked.push(review);
            }
        }
        Ok(ranked)
    }

    pub fn get_review(&self, review_id: &str) -> RankingResult<Review> {
        self.store
            .get_review_by_id(review_id)?
            .ok_or_else(|| review_not_found(review_id))
    }

    pub fn get_user_review(&self, user_id: &str, subject_id: &str) -> RankingResult<Review> {
        self.store.get_review(user_id, subject_id)?.ok_or_else(|| {
            RankingError::NotFound(format!("User {} has no review of {}", user_id, subject_id))
        })
    }

    /// All reviews of a user, drafts included, oldest first. With `opinions`
    /// only reviews holding one of them are returned.
    pub fn get_user_reviews(
        &self,
        user_id: &str,
        opinions: Option<&[Opinion]>,
    ) -> RankingResult<Vec<Review>> {
        let reviews = self.store.get_user_reviews(user_id)?;
        Ok(match opinions {
            Some(opinions) => {
                let wanted: HashSet<Opinion> = opinions.iter().copied().collect();
                reviews
                    .into_iter()
                    .filter(|review| wanted.contains(&review.opinion))
                    .collect()
            }
            None => reviews,
        })
    }

    /// Every user's reviews of each of `subject_ids`. Each requested subject
    /// is a key of the result, with an empty list if nobody reviewed it.
    pub fn get_reviews_for_subjects(
        &self,
        subject_ids: &[String],
    ) -> RankingResult<HashMap<String, Vec<Review>>> {
        let mut result = HashMap::with_capacity(subject_ids.len());
        for subject_id in subject_ids {
            if result.contains_key(subject_id) {
                continue;
            }
            let reviews = self.store.get_subject_reviews(subject_id)?;
            result.insert(subject_id.clone(), reviews);
        }
        Ok(result)
    }
}
