//! Rank to rating synthesis.
//!
//! Each tier owns a fixed, disjoint slice of the 0-10 scale. Inside a tier
//! the first ranked review gets the top of the slice and the last one gets
//! the bottom, with the rest spread linearly in between. A tier with a single
//! member sits at the middle of its slice.

use super::opinion::Tier;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierRange {
    pub floor: f64,
    pub ceiling: f64,
}

impl TierRange {
    pub fn span(&self) -> f64 {
        self.ceiling - self.floor
    }

    pub fn midpoint(&self) -> f64 {
        self.floor + self.span() / 2.0
    }
}

pub const LIKED_RANGE: TierRange = TierRange {
    floor: 6.7,
    ceiling: 10.0,
};
pub const NEUTRAL_RANGE: TierRange = TierRange {
    floor: 3.4,
    ceiling: 6.6,
};
pub const DISLIKE_RANGE: TierRange = TierRange {
    floor: 0.0,
    ceiling: 3.3,
};

pub fn tier_range(tier: Tier) -> TierRange {
    match tier {
        Tier::Liked => LIKED_RANGE,
        Tier::Neutral => NEUTRAL_RANGE,
        Tier::Dislike => DISLIKE_RANGE,
    }
}

/// Rating of the review at `rank` in a tier holding `tier_size` reviews.
///
/// The score is rounded to two decimals: that is the precision clients
/// show and the value stored with the review, and it keeps a rating
/// recomputed later bit-identical to the stored one. Rounding is monotonic,
/// so ratings still never increase with rank and tier slices stay disjoint.
///
/// `tier_size` must be at least 1; a `rank` past the end is treated as the
/// last rank.
pub fn rating(tier: Tier, rank: usize, tier_size: usize) -> f64 {
    debug_assert!(tier_size > 0, "rating requested for an empty tier");
    let range = tier_range(tier);
    if tier_size <= 1 {
        return round_rating(range.midpoint());
    }
    let last = tier_size - 1;
    let rank = rank.min(last);
    let raw = range.floor + range.span() * (last - rank) as f64 / last as f64;
    round_rating(raw.clamp(range.floor, range.ceiling))
}

/// Ratings for every rank of a tier holding `tier_size` reviews, rank 0 first.
pub fn tier_ratings(tier: Tier, tier_size: usize) -> Vec<f64> {
    (0..tier_size)
        .map(|rank| rating(tier, rank, tier_size))
        .collect()
}

fn round_rating(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
