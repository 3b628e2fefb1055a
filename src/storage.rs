use crate::deck::Card;
use crate::scheduler::{CardScheduleState, Grade, ScheduleUpdate};
use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use tracing::{debug, warn};

const CARD_COLUMNS: &str = "id, user_id, front, back, interval, ease_factor, review_count,
                            last_reviewed, next_review_date";

/// Per-user card counts
#[derive(Debug, Clone, PartialEq)]
pub struct UserStats {
    pub user_id: String,
    pub total_cards: usize,
    pub due_cards: usize,
    pub mastered_cards: usize,
}

/// A grading event from the review history
#[derive(Debug, Clone)]
pub struct Review {
    pub grade: i32,
    pub interval: u32,
    pub ease_factor: f64,
    pub reviewed_at: DateTime<Utc>,
}

/// Raised when a card changed between load and save
#[derive(Debug, thiserror::Error)]
#[error("card {card_id} was graded concurrently (expected review count {expected})")]
pub struct StaleWrite {
    pub card_id: i64,
    pub expected: u32,
}

pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Open or create the database
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        let storage = Storage { conn };
        storage.init_schema()?;

        Ok(storage)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let storage = Storage {
            conn: Connection::open_in_memory()?,
        };
        storage.init_schema()?;
        Ok(storage)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS cards (
                id INTEGER PRIMARY KEY,
                user_id TEXT NOT NULL,
                front TEXT NOT NULL,
                back TEXT NOT NULL,
                interval INTEGER,
                ease_factor REAL,
                review_count INTEGER NOT NULL DEFAULT 0,
                last_reviewed TEXT,
                next_review_date TEXT,
                UNIQUE(user_id, front)
            );

            CREATE TABLE IF NOT EXISTS reviews (
                id INTEGER PRIMARY KEY,
                card_id INTEGER NOT NULL,
                grade INTEGER NOT NULL,
                interval INTEGER NOT NULL,
                ease_factor REAL NOT NULL,
                reviewed_at TEXT NOT NULL,
                FOREIGN KEY (card_id) REFERENCES cards(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_cards_user ON cards(user_id);
            CREATE INDEX IF NOT EXISTS idx_cards_due ON cards(next_review_date);
            CREATE INDEX IF NOT EXISTS idx_reviews_card ON reviews(card_id);
            ",
        )?;

        Ok(())
    }

    /// Upsert a card (insert or update the back if the front already exists)
    pub fn upsert_card(&self, user_id: &str, front: &str, back: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO cards (user_id, front, back)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id, front) DO UPDATE SET back = ?3",
            params![user_id, front, back],
        )?;

        let id = self.conn.query_row(
            "SELECT id FROM cards WHERE user_id = ?1 AND front = ?2",
            params![user_id, front],
            |row| row.get(0),
        )?;

        Ok(id)
    }

    /// Get a card by ID
    pub fn get_card(&self, id: i64) -> Result<Option<Card>> {
        let sql = format!("SELECT {} FROM cards WHERE id = ?1", CARD_COLUMNS);
        let card = self
            .conn
            .query_row(&sql, params![id], card_from_row)
            .optional()?;

        Ok(card.map(repair_legacy))
    }

    /// All cards owned by a user, oldest first
    pub fn load_cards_for_user(&self, user_id: &str) -> Result<Vec<Card>> {
        let sql = format!(
            "SELECT {} FROM cards WHERE user_id = ?1 ORDER BY id",
            CARD_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let cards = stmt
            .query_map(params![user_id], card_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        debug!(user_id, count = cards.len(), "loaded cards");
        Ok(cards.into_iter().map(repair_legacy).collect())
    }

    /// Persist a card's schedule.
    ///
    /// The write only lands if the stored review count still equals
    /// `expected_review_count`; otherwise another grading got there first and a
    /// `StaleWrite` error is returned.
    pub fn save_card_state(
        &self,
        id: i64,
        expected_review_count: u32,
        state: &CardScheduleState,
    ) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE cards SET
                interval = ?1,
                ease_factor = ?2,
                review_count = ?3,
                last_reviewed = ?4,
                next_review_date = ?5
             WHERE id = ?6 AND review_count = ?7",
            params![
                state.interval,
                state.ease_factor,
                state.review_count,
                state.last_reviewed.map(|t| t.to_rfc3339()),
                state.next_review_date.map(|t| t.to_rfc3339()),
                id,
                expected_review_count,
            ],
        )?;

        if updated == 0 {
            if self.get_card(id)?.is_none() {
                bail!("Card {} not found", id);
            }
            return Err(StaleWrite {
                card_id: id,
                expected: expected_review_count,
            }
            .into());
        }

        Ok(())
    }

    /// Record a grading event
    pub fn record_review(
        &self,
        card_id: i64,
        grade: Grade,
        update: &ScheduleUpdate,
        reviewed_at: DateTime<Utc>,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO reviews (card_id, grade, interval, ease_factor, reviewed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                card_id,
                grade.as_u32(),
                update.interval,
                update.ease_factor,
                reviewed_at.to_rfc3339()
            ],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    /// Delete a card and its review history
    pub fn delete_card(&self, id: i64) -> Result<bool> {
        self.conn
            .execute("DELETE FROM reviews WHERE card_id = ?1", params![id])?;
        let deleted = self
            .conn
            .execute("DELETE FROM cards WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    /// Get all users with card counts
    pub fn get_user_stats(
        &self,
        mastered_interval_days: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<UserStats>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id,
                    COUNT(*),
                    SUM(CASE WHEN next_review_date IS NULL OR next_review_date <= ?1 THEN 1 ELSE 0 END),
                    SUM(CASE WHEN review_count > 0 AND interval >= ?2 THEN 1 ELSE 0 END)
             FROM cards GROUP BY user_id ORDER BY user_id",
        )?;

        let stats = stmt
            .query_map(params![now.to_rfc3339(), mastered_interval_days], |row| {
                Ok(UserStats {
                    user_id: row.get(0)?,
                    total_cards: row.get::<_, i64>(1)? as usize,
                    due_cards: row.get::<_, i64>(2)? as usize,
                    mastered_cards: row.get::<_, i64>(3)? as usize,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(stats)
    }

    /// Get reviews for a card, oldest first
    pub fn get_reviews_for_card(&self, card_id: i64) -> Result<Vec<Review>> {
        let mut stmt = self.conn.prepare(
            "SELECT grade, interval, ease_factor, reviewed_at
             FROM reviews WHERE card_id = ?1 ORDER BY reviewed_at ASC, id ASC",
        )?;

        let reviews = stmt
            .query_map(params![card_id], |row| {
                Ok(Review {
                    grade: row.get(0)?,
                    interval: row.get(1)?,
                    ease_factor: row.get(2)?,
                    reviewed_at: row.get::<_, String>(3)?.parse().map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e))
                    })?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(reviews)
    }
}

// NULL schedule columns mean the card has never been reviewed
fn card_from_row(row: &Row<'_>) -> rusqlite::Result<Card> {
    let defaults = CardScheduleState::default();
    let id: i64 = row.get(0)?;
    let interval: Option<i64> = row.get(4)?;

    Ok(Card {
        id,
        user_id: row.get(1)?,
        front: row.get(2)?,
        back: row.get(3)?,
        schedule: CardScheduleState {
            // Negative legacy values collapse to 0 and are repaired afterwards
            interval: interval.map_or(defaults.interval, |i| {
                i.clamp(0, i64::from(u32::MAX)) as u32
            }),
            ease_factor: row.get::<_, Option<f64>>(5)?.unwrap_or(defaults.ease_factor),
            review_count: row.get::<_, i64>(6)?.max(0) as u32,
            last_reviewed: parse_timestamp(id, "last_reviewed", row.get(7)?),
            next_review_date: parse_timestamp(id, "next_review_date", row.get(8)?),
        },
    })
}

// An unreadable timestamp is dropped, which makes the card due again
fn parse_timestamp(card_id: i64, column: &str, value: Option<String>) -> Option<DateTime<Utc>> {
    let raw = value?;
    match raw.parse() {
        Ok(timestamp) => Some(timestamp),
        Err(e) => {
            warn!(card_id, column, value = %raw, error = %e, "dropping unreadable timestamp");
            None
        }
    }
}

fn repair_legacy(mut card: Card) -> Card {
    if card.schedule.validate().is_err() {
        warn!(
            card_id = card.id,
            interval = card.schedule.interval,
            ease_factor = card.schedule.ease_factor,
            "repairing out-of-range schedule"
        );
        card.schedule = card.schedule.sanitized();
    }
    card
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::compute_next_review;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_new_card_has_default_schedule() {
        let storage = Storage::open_in_memory().unwrap();
        let id = storage.upsert_card("ana", "hello", "hola").unwrap();

        let card = storage.get_card(id).unwrap().unwrap();
        assert_eq!(card.front, "hello");
        assert_eq!(card.schedule, CardScheduleState::default());
    }

    #[test]
    fn test_upsert_updates_back() {
        let storage = Storage::open_in_memory().unwrap();
        let first = storage.upsert_card("ana", "hello", "hola").unwrap();
        let second = storage.upsert_card("ana", "hello", "buenas").unwrap();
        let other = storage.upsert_card("marta", "hello", "hallo").unwrap();

        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(storage.get_card(first).unwrap().unwrap().back, "buenas");
        assert_eq!(storage.load_cards_for_user("ana").unwrap().len(), 1);
    }

    #[test]
    fn test_save_and_reload_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cards.db");

        let id = {
            let storage = Storage::open(&path).unwrap();
            let id = storage.upsert_card("ana", "cat", "gato").unwrap();
            let mut state = storage.get_card(id).unwrap().unwrap().schedule;
            let update = compute_next_review(&state, Grade::Easy, &now()).unwrap();
            state.record_review(&update, now());
            storage.save_card_state(id, 0, &state).unwrap();
            storage.record_review(id, Grade::Easy, &update, now()).unwrap();
            id
        };

        let storage = Storage::open(&path).unwrap();
        let card = storage.get_card(id).unwrap().unwrap();
        assert_eq!(card.schedule.review_count, 1);
        assert_eq!(card.schedule.interval, 3);
        assert_eq!(card.schedule.ease_factor, 2.5);
        assert_eq!(card.schedule.last_reviewed, Some(now()));
        assert_eq!(card.schedule.next_review_date, Some(now() + Duration::days(3)));

        let reviews = storage.get_reviews_for_card(id).unwrap();
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].grade, 4);
        assert_eq!(reviews[0].reviewed_at, now());
    }

    #[test]
    fn test_stale_write_rejected() {
        let storage = Storage::open_in_memory().unwrap();
        let id = storage.upsert_card("ana", "dog", "perro").unwrap();
        let loaded = storage.get_card(id).unwrap().unwrap().schedule;

        let mut first = loaded.clone();
        first.review_count += 1;
        storage.save_card_state(id, loaded.review_count, &first).unwrap();

        let mut second = loaded.clone();
        second.review_count += 1;
        let err = storage
            .save_card_state(id, loaded.review_count, &second)
            .unwrap_err();
        assert!(err.downcast_ref::<StaleWrite>().is_some());
    }

    #[test]
    fn test_save_missing_card() {
        let storage = Storage::open_in_memory().unwrap();
        let err = storage
            .save_card_state(42, 0, &CardScheduleState::default())
            .unwrap_err();
        assert!(err.downcast_ref::<StaleWrite>().is_none());
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_corrupt_timestamp_makes_card_due() {
        let storage = Storage::open_in_memory().unwrap();
        let id = storage.upsert_card("ana", "horse", "caballo").unwrap();
        storage
            .conn
            .execute(
                "UPDATE cards SET interval = 6, review_count = 2,
                    last_reviewed = 'yesterday', next_review_date = 'soon' WHERE id = ?1",
                params![id],
            )
            .unwrap();

        let card = storage.get_card(id).unwrap().unwrap();
        assert_eq!(card.schedule.interval, 6);
        assert_eq!(card.schedule.last_reviewed, None);
        assert_eq!(card.schedule.next_review_date, None);
        assert!(card.schedule.is_due(now()));
    }

    #[test]
    fn test_legacy_rows_are_repaired() {
        let storage = Storage::open_in_memory().unwrap();
        let id = storage.upsert_card("ana", "bird", "pájaro").unwrap();
        storage
            .conn
            .execute(
                "UPDATE cards SET interval = -4, ease_factor = 9.0, review_count = 3 WHERE id = ?1",
                params![id],
            )
            .unwrap();

        let card = storage.get_card(id).unwrap().unwrap();
        assert_eq!(card.schedule.interval, 1);
        assert_eq!(card.schedule.ease_factor, 2.5);
        assert_eq!(card.schedule.review_count, 3);
        assert!(card.schedule.validate().is_ok());
    }

    #[test]
    fn test_delete_card() {
        let storage = Storage::open_in_memory().unwrap();
        let id = storage.upsert_card("ana", "fish", "pez").unwrap();
        assert!(storage.delete_card(id).unwrap());
        assert!(storage.get_card(id).unwrap().is_none());
        assert!(!storage.delete_card(id).unwrap());
    }

    #[test]
    fn test_user_stats() {
        let storage = Storage::open_in_memory().unwrap();
        storage.upsert_card("ana", "one", "uno").unwrap();
        let later = storage.upsert_card("ana", "two", "dos").unwrap();
        let mastered = storage.upsert_card("ana", "three", "tres").unwrap();
        storage.upsert_card("marta", "one", "eins").unwrap();

        let future = CardScheduleState {
            interval: 6,
            review_count: 2,
            last_reviewed: Some(now()),
            next_review_date: Some(now() + Duration::days(6)),
            ..CardScheduleState::default()
        };
        storage.save_card_state(later, 0, &future).unwrap();

        let long = CardScheduleState {
            interval: 40,
            review_count: 5,
            next_review_date: Some(now() - Duration::days(1)),
            ..CardScheduleState::default()
        };
        storage.save_card_state(mastered, 0, &long).unwrap();

        let stats = storage.get_user_stats(21, now()).unwrap();
        assert_eq!(
            stats,
            vec![
                UserStats {
                    user_id: "ana".to_string(),
                    total_cards: 3,
                    due_cards: 2,
                    mastered_cards: 1,
                },
                UserStats {
                    user_id: "marta".to_string(),
                    total_cards: 1,
                    due_cards: 1,
                    mastered_cards: 0,
                },
            ]
        );
    }
}
