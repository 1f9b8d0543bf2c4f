//! Dense, per-tier ranking lists.
//!
//! A `RankingList` is the ordered sequence of review ids of one user's tier;
//! the index of an id is its rank. Every mutation keeps the list dense, so
//! ranks are always exactly `0..len`.

use std::collections::BTreeSet;

use super::opinion::Tier;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RankingList {
    entries: Vec<String>,
}

impl RankingList {
    pub fn from_ids(ids: Vec<String>) -> Self {
        RankingList { entries: ids }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> &[String] {
        &self.entries
    }

    pub fn position_of(&self, review_id: &str) -> Option<usize> {
        self.entries.iter().position(|id| id == review_id)
    }

    /// Inserts `review_id` at `position` (clamped to `0..=len`), or at the
    /// end when no position is given. Entries at or after the position move
    /// down by one. An id already in the list is moved instead of duplicated.
    /// Returns the assigned rank.
    pub fn insert(&mut self, review_id: &str, position: Option<usize>) -> usize {
        if let Some(existing) = self.position_of(review_id) {
            self.entries.remove(existing);
        }
        let rank = position
            .unwrap_or(self.entries.len())
            .min(self.entries.len());
        self.entries.insert(rank, review_id.to_owned());
        rank
    }

    /// Removes `review_id` and closes the gap. Returns its former rank.
    pub fn remove(&mut self, review_id: &str) -> Option<usize> {
        let rank = self.position_of(review_id)?;
        self.entries.remove(rank);
        Some(rank)
    }

    /// Moves `review_id` to `new_position`, clamped to the list bounds.
    /// Returns the new rank, or `None` if the id is not in the list.
    pub fn move_to(&mut self, review_id: &str, new_position: usize) -> Option<usize> {
        self.remove(review_id)?;
        Some(self.insert(review_id, Some(new_position)))
    }
}

/// The three ranking lists of one user, plus the set of tiers changed since
/// they were loaded.
#[derive(Debug, Clone)]
pub struct UserRankings {
    user_id: String,
    liked: RankingList,
    neutral: RankingList,
    dislike: RankingList,
    touched: BTreeSet<Tier>,
}

impl UserRankings {
    pub fn new(user_id: &str) -> Self {
        UserRankings {
            user_id: user_id.to_owned(),
            liked: RankingList::default(),
            neutral: RankingList::default(),
            dislike: RankingList::default(),
            touched: BTreeSet::new(),
        }
    }

    /// Builds the aggregate from persisted lists without marking anything
    /// as touched.
    pub fn with_lists(user_id: &str, lists: impl IntoIterator<Item = (Tier, Vec<String>)>) -> Self {
        let mut rankings = Self::new(user_id);
        for (tier, ids) in lists {
            *rankings.list_mut(tier) = RankingList::from_ids(ids);
        }
        rankings
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn list(&self, tier: Tier) -> &RankingList {
        match tier {
            Tier::Liked => &self.liked,
            Tier::Neutral => &self.neutral,
            Tier::Dislike => &self.dislike,
        }
    }

    fn list_mut(&mut self, tier: Tier) -> &mut RankingList {
        match tier {
            Tier::Liked => &mut self.liked,
            Tier::Neutral => &mut self.neutral,
            Tier::Dislike => &mut self.dislike,
        }
    }

    pub fn tier_of(&self, review_id: &str) -> Option<Tier> {
        Tier::ALL
            .into_iter()
            .find(|tier| self.list(*tier).position_of(review_id).is_some())
    }

    /// Tiers whose membership or order changed, highest priority first.
    pub fn touched_tiers(&self) -> Vec<Tier> {
        self.touched.iter().copied().collect()
    }

    pub fn insert(&mut self, tier: Tier, review_id: &str, position: Option<usize>) -> usize {
        self.touched.insert(tier);
        self.list_mut(tier).insert(review_id, position)
    }

    pub fn remove(&mut self, tier: Tier, review_id: &str) -> Option<usize> {
        let rank = self.list_mut(tier).remove(review_id)?;
        self.touched.insert(tier);
        Some(rank)
    }

    pub fn move_review(&mut self, tier: Tier, review_id: &str, new_position: usize) -> Option<usize> {
        let old_rank = self.list(tier).position_of(review_id)?;
        let new_rank = self.list_mut(tier).move_to(review_id, new_position)?;
        if new_rank != old_rank {
            self.touched.insert(tier);
        }
        Some(new_rank)
    }

    /// Takes `review_id` out of `old_tier` and ranks it in `new_tier`.
    /// Returns the new rank, or `None` if the review was not in `old_tier`.
    pub fn change_tier(
        &mut self,
        review_id: &str,
        old_tier: Tier,
        new_tier: Tier,
        position: Option<usize>,
    ) -> Option<usize> {
        if old_tier == new_tier {
            return self.list(old_tier).position_of(review_id);
        }
        self.remove(old_tier, review_id)?;
        Some(self.insert(new_tier, review_id, position))
    }
}
