use crate::clock::Clock;
use crate::deck::Card;
use crate::scheduler::{CardScheduleState, Grade, ScheduleUpdate, compute_next_review};
use crate::selector::{DueSelection, select_next_card};
use crate::storage::Storage;
use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

/// Schedule of a card after grading
#[derive(Debug, Clone, PartialEq)]
pub struct GradeOutcome {
    pub card_id: i64,
    pub grade: Grade,
    pub update: ScheduleUpdate,
    pub state: CardScheduleState,
}

/// Owned result of a next-card query
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextCard {
    pub card: Option<Card>,
    pub remaining_count: usize,
}

impl From<DueSelection<'_>> for NextCard {
    fn from(selection: DueSelection<'_>) -> Self {
        Self {
            card: selection.card.cloned(),
            remaining_count: selection.remaining_count,
        }
    }
}

impl NextCard {
    /// `{ "card": ... | null, "remainingCount": n }`
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Grades cards and picks the next one, persisting through `Storage`
pub struct ReviewService<C: Clock> {
    storage: Storage,
    clock: C,
}

impl<C: Clock> ReviewService<C> {
    pub fn new(storage: Storage, clock: C) -> Self {
        Self { storage, clock }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Current instant from the service's clock
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now().with_timezone(&Utc)
    }

    /// Grade a card given the raw grade text from the user
    pub fn grade_card_str(&self, card_id: i64, grade: &str) -> Result<GradeOutcome> {
        let grade: Grade = grade.parse()?;
        self.grade_card(card_id, grade)
    }

    /// Apply a grade to a stored card and persist the new schedule
    pub fn grade_card(&self, card_id: i64, grade: Grade) -> Result<GradeOutcome> {
        let card = self
            .storage
            .get_card(card_id)?
            .ok_or_else(|| anyhow!("Card {} not found", card_id))?;

        let now = self.clock.now();
        let update = compute_next_review(&card.schedule, grade, &now)
            .with_context(|| format!("Failed to schedule card {}", card_id))?;

        let reviewed_at = now.with_timezone(&Utc);
        let mut state = card.schedule.clone();
        state.record_review(&update, reviewed_at);

        self.storage
            .save_card_state(card_id, card.schedule.review_count, &state)?;
        self.storage
            .record_review(card_id, grade, &update, reviewed_at)?;

        info!(
            card_id,
            %grade,
            interval = update.interval,
            ease_factor = update.ease_factor,
            "graded card"
        );

        Ok(GradeOutcome {
            card_id,
            grade,
            update,
            state,
        })
    }

    /// Next due card for a user and the number of others still due
    pub fn next_card(&self, user_id: &str) -> Result<NextCard> {
        let cards = self.storage.load_cards_for_user(user_id)?;
        let now = self.now();
        let next = NextCard::from(select_next_card(&cards, now));

        info!(
            user_id,
            card_id = next.card.as_ref().map(|c| c.id),
            remaining = next.remaining_count,
            "selected next card"
        );
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::error::ScheduleError;
    use chrono::{Duration, TimeZone};

    fn jan_first() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn service_at(now: DateTime<Utc>) -> ReviewService<FixedClock<Utc>> {
        ReviewService::new(Storage::open_in_memory().unwrap(), FixedClock(now))
    }

    #[test]
    fn test_good_progression() {
        let service = service_at(jan_first());
        let id = service.storage().upsert_card("ana", "apple", "manzana").unwrap();

        let first = service.grade_card(id, Grade::Good).unwrap();
        assert_eq!(first.update.interval, 1);
        assert_eq!(
            first.update.next_review_date,
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
        );
        assert_eq!(first.state.review_count, 1);

        let second = service.grade_card(id, Grade::Good).unwrap();
        assert_eq!(second.update.interval, 6);

        let third = service.grade_card(id, Grade::Good).unwrap();
        assert_eq!(third.update.interval, 15);

        let stored = service.storage().get_card(id).unwrap().unwrap();
        assert_eq!(stored.schedule.review_count, 3);
        assert_eq!(stored.schedule.interval, 15);
        assert_eq!(stored.schedule.last_reviewed, Some(jan_first()));
        assert_eq!(service.storage().get_reviews_for_card(id).unwrap().len(), 3);
    }

    #[test]
    fn test_invalid_grade_leaves_card_untouched() {
        let service = service_at(jan_first());
        let id = service.storage().upsert_card("ana", "pear", "pera").unwrap();

        let err = service.grade_card_str(id, "perfect").unwrap_err();
        assert_eq!(
            err.downcast_ref::<ScheduleError>(),
            Some(&ScheduleError::InvalidGrade("perfect".to_string()))
        );

        let card = service.storage().get_card(id).unwrap().unwrap();
        assert_eq!(card.schedule, CardScheduleState::default());
        assert!(service.storage().get_reviews_for_card(id).unwrap().is_empty());
    }

    #[test]
    fn test_grade_text_accepted() {
        let service = service_at(jan_first());
        let id = service.storage().upsert_card("ana", "plum", "ciruela").unwrap();

        let outcome = service.grade_card_str(id, "again").unwrap();
        assert_eq!(outcome.grade, Grade::Again);
        assert_eq!(outcome.update.ease_factor, 2.3);
    }

    #[test]
    fn test_grade_missing_card() {
        let service = service_at(jan_first());
        let err = service.grade_card(99, Grade::Good).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_next_card_flow() {
        let service = service_at(jan_first());
        let a = service.storage().upsert_card("ana", "red", "rojo").unwrap();
        let b = service.storage().upsert_card("ana", "blue", "azul").unwrap();
        service.storage().upsert_card("marta", "red", "rot").unwrap();

        let next = service.next_card("ana").unwrap();
        assert_eq!(next.card.as_ref().map(|c| c.id), Some(a));
        assert_eq!(next.remaining_count, 1);

        service.grade_card(a, Grade::Good).unwrap();
        let next = service.next_card("ana").unwrap();
        assert_eq!(next.card.as_ref().map(|c| c.id), Some(b));
        assert_eq!(next.remaining_count, 0);

        service.grade_card(b, Grade::Easy).unwrap();
        let next = service.next_card("ana").unwrap();
        assert!(next.card.is_none());
        assert_eq!(next.remaining_count, 0);
    }

    #[test]
    fn test_user_stats_use_service_clock() {
        let service = service_at(jan_first());
        let id = service.storage().upsert_card("ana", "sun", "sol").unwrap();
        service.grade_card(id, Grade::Good).unwrap();
        assert_eq!(service.now(), jan_first());

        // Due on Jan 2 by the service clock, whatever the wall clock says
        let stats = service.storage().get_user_stats(21, service.now()).unwrap();
        assert_eq!(stats[0].due_cards, 0);

        let later = service_at(jan_first() + Duration::days(2));
        assert_eq!(later.now(), jan_first() + Duration::days(2));
    }

    #[test]
    fn test_graded_card_returns_when_due() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("cards.db");

        let id = {
            let storage = Storage::open(&path).unwrap();
            let service = ReviewService::new(storage, FixedClock(jan_first()));
            let id = service.storage().upsert_card("ana", "red", "rojo").unwrap();
            service.grade_card(id, Grade::Good).unwrap();
            id
        };

        let early = ReviewService::new(
            Storage::open(&path).unwrap(),
            FixedClock(jan_first() + Duration::hours(23)),
        );
        assert!(early.next_card("ana").unwrap().card.is_none());

        let later = ReviewService::new(
            Storage::open(&path).unwrap(),
            FixedClock(jan_first() + Duration::days(3)),
        );
        let next = later.next_card("ana").unwrap();
        assert_eq!(next.card.map(|c| c.id), Some(id));
        assert_eq!(next.remaining_count, 0);
    }

    #[test]
    fn test_next_card_json() {
        let service = service_at(jan_first());
        service.storage().upsert_card("ana", "green", "verde").unwrap();

        let json = service.next_card("ana").unwrap().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["card"]["front"], "green");
        assert_eq!(value["card"]["reviewCount"], 0);
        assert!(value["card"]["nextReviewDate"].is_null());
        assert_eq!(value["remainingCount"], 0);

        let json = service.next_card("nobody").unwrap().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value["card"].is_null());
    }
}
