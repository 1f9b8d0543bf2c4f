use crate::sqlite_column;
use crate::sqlite_persistence::{
    open_versioned_db, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema,
};
use anyhow::{anyhow, Context, Result};
use rusqlite::{params, types::Type, Connection, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use super::opinion::{Opinion, Tier};
use super::review_models::{millis_to_system_time, system_time_to_millis, Review};
use super::review_store::{RankingChangeset, RankingListStore, ReviewStore};

/// V 0
const REVIEW_TABLE_V_0: Table = Table {
    name: "review",
    columns: &[
        sqlite_column!(
            "id",
            &SqlType::Text,
            is_primary_key = true,
            non_null = true
        ),
        sqlite_column!("user_id", &SqlType::Text, non_null = true),
        sqlite_column!("subject_id", &SqlType::Text, non_null = true),
        sqlite_column!("opinion", &SqlType::Text, non_null = true),
        sqlite_column!("description", &SqlType::Text, non_null = true),
        sqlite_column!("rating", &SqlType::Real),
        sqlite_column!("tier_rank", &SqlType::Integer),
        sqlite_column!("created", &SqlType::Integer, non_null = true),
        sqlite_column!("updated", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_review_user_id", "user_id")],
    unique_constraints: &[&["user_id", "subject_id"]],
};

const RANKING_ENTRY_TABLE_V_0: Table = Table {
    name: "ranking_entry",
    columns: &[
        sqlite_column!("user_id", &SqlType::Text, non_null = true),
        sqlite_column!("tier", &SqlType::Text, non_null = true),
        sqlite_column!("position", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "review_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "review",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
    ],
    indices: &[("idx_ranking_entry_user_tier", "user_id, tier")],
    unique_constraints: &[&["user_id", "tier", "position"], &["review_id"]],
};

/// V 1
const REVIEW_TABLE_V_1: Table = Table {
    name: "review",
    columns: REVIEW_TABLE_V_0.columns,
    indices: &[
        ("idx_review_user_id", "user_id"),
        ("idx_review_subject_id", "subject_id"),
    ],
    unique_constraints: REVIEW_TABLE_V_0.unique_constraints,
};

pub const VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 0,
        tables: &[REVIEW_TABLE_V_0, RANKING_ENTRY_TABLE_V_0],
        migration: None,
    },
    VersionedSchema {
        version: 1,
        tables: &[REVIEW_TABLE_V_1, RANKING_ENTRY_TABLE_V_0],
        migration: Some(|conn: &Connection| {
            conn.execute(
                "CREATE INDEX IF NOT EXISTS idx_review_subject_id ON review(subject_id)",
                [],
            )?;
            Ok(())
        }),
    },
];

const REVIEW_COLUMNS: &str =
    "id, user_id, subject_id, opinion, description, rating, tier_rank, created, updated";

fn review_from_row(row: &Row) -> rusqlite::Result<Review> {
    let opinion_raw: String = row.get(3)?;
    let opinion = Opinion::from_str(&opinion_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            Type::Text,
            format!("Unknown opinion '{}'", opinion_raw).into(),
        )
    })?;
    let rank: Option<i64> = row.get(6)?;
    Ok(Review {
        id: row.get(0)?,
        user_id: row.get(1)?,
        subject_id: row.get(2)?,
        opinion,
        description: row.get(4)?,
        rating: row.get(5)?,
        rank: rank.map(|r| r.max(0) as usize),
        created_at: millis_to_system_time(row.get(7)?),
        updated_at: millis_to_system_time(row.get(8)?),
    })
}

fn upsert_review(conn: &Connection, review: &Review) -> Result<()> {
    let updated = conn
        .execute(
            "UPDATE review SET opinion = ?2, description = ?3, rating = ?4, tier_rank = ?5, updated = ?6
             WHERE id = ?1",
            params![
                review.id,
                review.opinion.as_str(),
                review.description,
                review.rating,
                review.rank.map(|r| r as i64),
                system_time_to_millis(review.updated_at),
            ],
        )
        .with_context(|| format!("Failed to update review {}", review.id))?;
    if updated > 0 {
        return Ok(());
    }
    conn.execute(
        &format!(
            "INSERT INTO review ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            REVIEW_COLUMNS
        ),
        params![
            review.id,
            review.user_id,
            review.subject_id,
            review.opinion.as_str(),
            review.description,
            review.rating,
            review.rank.map(|r| r as i64),
            system_time_to_millis(review.created_at),
            system_time_to_millis(review.updated_at),
        ],
    )
    .with_context(|| format!("Failed to insert review {}", review.id))?;
    Ok(())
}

fn query_reviews(conn: &Connection, condition: &str, arg: &str) -> Result<Vec<Review>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM review WHERE {} ORDER BY created ASC, id ASC",
        REVIEW_COLUMNS, condition
    ))?;
    let reviews = stmt
        .query_map(params![arg], review_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(reviews)
}

/// Review and ranking list storage backed by a single SQLite file.
///
/// All users share one connection, so store calls run one at a time and block
/// the calling thread for their duration. Users still never wait on each
/// other's ranking locks; only the short statements themselves are
/// serialized, which SQLite does for writers to one file anyway.
#[derive(Clone)]
pub struct SqliteReviewStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteReviewStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_db(db_path, VERSIONED_SCHEMAS)?;
        Ok(SqliteReviewStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Review database connection lock poisoned"))
    }
}

impl ReviewStore for SqliteReviewStore {
    fn get_review(&self, user_id: &str, subject_id: &str) -> Result<Option<Review>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM review WHERE user_id = ?1 AND subject_id = ?2",
            REVIEW_COLUMNS
        ))?;
        let mut rows = stmt.query_map(params![user_id, subject_id], review_from_row)?;
        Ok(rows.next().transpose()?)
    }

    fn get_review_by_id(&self, review_id: &str) -> Result<Option<Review>> {
        let conn = self.lock()?;
        Ok(query_reviews(&conn, "id = ?1", review_id)?.into_iter().next())
    }

    fn put_review(&self, review: &Review) -> Result<()> {
        let conn = self.lock()?;
        upsert_review(&conn, review)
    }

    fn delete_review(&self, review_id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM review WHERE id = ?1", params![review_id])?;
        Ok(deleted > 0)
    }

    fn get_user_reviews(&self, user_id: &str) -> Result<Vec<Review>> {
        let conn = self.lock()?;
        query_reviews(&conn, "user_id = ?1", user_id)
    }

    fn get_subject_reviews(&self, subject_id: &str) -> Result<Vec<Review>> {
        let conn = self.lock()?;
        query_reviews(&conn, "subject_id = ?1", subject_id)
    }
}

impl RankingListStore for SqliteReviewStore {
    fn load_ranking_list(&self, user_id: &str, tier: Tier) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT review_id FROM ranking_entry WHERE user_id = ?1 AND tier = ?2 ORDER BY position ASC",
        )?;
        let ids = stmt
            .query_map(params![user_id, tier.as_str()], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    fn commit(&self, changeset: RankingChangeset) -> Result<()> {
        if changeset.is_empty() {
            return Ok(());
        }
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        // Entries of deleted reviews go away through the foreign key cascade.
        for review_id in &changeset.deletions {
            tx.execute("DELETE FROM review WHERE id = ?1", params![review_id])?;
        }
        for review in &changeset.upserts {
            upsert_review(&tx, review)?;
        }
        // Every touched list is cleared before any is refilled, a review
        // moving between tiers would otherwise hit UNIQUE(review_id).
        for (tier, _) in &changeset.lists {
            tx.execute(
                "DELETE FROM ranking_entry WHERE user_id = ?1 AND tier = ?2",
                params![changeset.user_id, tier.as_str()],
            )?;
        }
        {
            let mut insert = tx.prepare(
                "INSERT INTO ranking_entry (user_id, tier, position, review_id) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (tier, ids) in &changeset.lists {
                for (position, review_id) in ids.iter().enumerate() {
                    insert
                        .execute(params![
                            changeset.user_id,
                            tier.as_str(),
                            position as i64,
                            review_id
                        ])
                        .with_context(|| {
                            format!(
                                "Failed to rank review {} at {} in {}",
                                review_id,
                                position,
                                tier.as_str()
                            )
                        })?;
                }
            }
        }

        tx.commit()?;
        debug!(
            "Committed ranking changeset for user {}: {} upserts, {} deletions, {} lists",
            changeset.user_id,
            changeset.upserts.len(),
            changeset.deletions.len(),
            changeset.lists.len()
        );
        Ok(())
    }
}
