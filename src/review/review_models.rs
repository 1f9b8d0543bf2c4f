//! Review data model.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use super::opinion::{Opinion, Tier};

/// Longest accepted review description, in whitespace separated words.
pub const MAX_DESCRIPTION_WORDS: usize = 200;

/// One user's review of one track or album.
///
/// `rank` and `rating` are derived from the review's position in its tier's
/// ranking list and are only ever written by the ranking manager. Both are
/// `None` for draft reviews (opinion `Undefined`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: String,
    pub user_id: String,
    pub subject_id: String,
    pub opinion: Opinion,
    pub description: String,
    pub rating: Option<f64>,
    pub rank: Option<usize>,
    #[serde(with = "unix_millis")]
    pub created_at: SystemTime,
    #[serde(with = "unix_millis")]
    pub updated_at: SystemTime,
}

impl Review {
    /// A fresh, not yet ranked review with a random id.
    pub fn new(user_id: &str, subject_id: &str, opinion: Opinion, description: &str) -> Self {
        let now = now_millis();
        Review {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_owned(),
            subject_id: subject_id.to_owned(),
            opinion,
            description: description.to_owned(),
            rating: None,
            rank: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn tier(&self) -> Option<Tier> {
        self.opinion.tier()
    }

    pub fn is_draft(&self) -> bool {
        self.tier().is_none()
    }

    pub fn touch(&mut self) {
        self.updated_at = now_millis();
    }
}

pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Current time truncated to what the store keeps, whole milliseconds.
pub fn now_millis() -> SystemTime {
    millis_to_system_time(system_time_to_millis(SystemTime::now()))
}

pub fn system_time_to_millis(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

pub fn millis_to_system_time(millis: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(millis.max(0) as u64)
}

mod unix_millis {
    use super::{millis_to_system_time, system_time_to_millis};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::SystemTime;

    pub fn serialize<S: Serializer>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(system_time_to_millis(*time))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SystemTime, D::Error> {
        Ok(millis_to_system_time(i64::deserialize(deserializer)?))
    }
}
