//! Opinions and the tiers they rank into.

use serde::{Deserialize, Serialize};

/// A user's opinion of a track or album.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Opinion {
    Liked,
    Neutral,
    Dislike,
    /// Not decided yet. Reviews with this opinion are drafts and never ranked.
    Undefined,
}

/// A ranked opinion bucket. Variants are declared in priority order, so the
/// derived `Ord` sorts `Liked` first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    Liked,
    Neutral,
    Dislike,
}

impl Tier {
    /// All tiers, highest priority first.
    pub const ALL: [Tier; 3] = [Tier::Liked, Tier::Neutral, Tier::Dislike];

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Liked => "LIKED",
            Tier::Neutral => "NEUTRAL",
            Tier::Dislike => "DISLIKE",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "LIKED" => Some(Tier::Liked),
            "NEUTRAL" => Some(Tier::Neutral),
            "DISLIKE" => Some(Tier::Dislike),
            _ => None,
        }
    }

    pub fn opinion(self) -> Opinion {
        match self {
            Tier::Liked => Opinion::Liked,
            Tier::Neutral => Opinion::Neutral,
            Tier::Dislike => Opinion::Dislike,
        }
    }
}

impl Opinion {
    pub fn as_str(self) -> &'static str {
        match self {
            Opinion::Liked => "LIKED",
            Opinion::Neutral => "NEUTRAL",
            Opinion::Dislike => "DISLIKE",
            Opinion::Undefined => "UNDEFINED",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "LIKED" => Some(Opinion::Liked),
            "NEUTRAL" => Some(Opinion::Neutral),
            "DISLIKE" => Some(Opinion::Dislike),
            "UNDEFINED" => Some(Opinion::Undefined),
            _ => None,
        }
    }

    /// The tier this opinion ranks into, `None` for `Undefined`.
    pub fn tier(self) -> Option<Tier> {
        match self {
            Opinion::Liked => Some(Tier::Liked),
            Opinion::Neutral => Some(Tier::Neutral),
            Opinion::Dislike => Some(Tier::Dislike),
            Opinion::Undefined => None,
        }
    }
}
