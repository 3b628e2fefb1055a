use crate::deck::Card;
use crate::scheduler::CardScheduleState;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::cmp::Reverse;

/// How urgently a card should be shown, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DuePriority {
    /// Scheduled in the future, never selected
    NotDue = 0,
    /// Due, but by less than a day
    DueToday = 1,
    /// Due for more than a day
    Overdue = 2,
    /// Never reviewed
    Unseen = 3,
}

impl DuePriority {
    /// Classify a card's schedule at `now`
    pub fn of(state: &CardScheduleState, now: DateTime<Utc>) -> Self {
        if !state.is_due(now) {
            return DuePriority::NotDue;
        }
        if state.review_count == 0 {
            return DuePriority::Unseen;
        }
        match state.next_review_date {
            Some(due) if due < now - Duration::hours(24) => DuePriority::Overdue,
            _ => DuePriority::DueToday,
        }
    }
}

/// The card to present next and how many others are waiting
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DueSelection<'a> {
    pub card: Option<&'a Card>,
    pub remaining_count: usize,
}

/// Pick the highest-priority due card.
///
/// Ties go to the earliest `next_review_date`, with unscheduled cards first, then to
/// input order.
pub fn select_next_card(cards: &[Card], now: DateTime<Utc>) -> DueSelection<'_> {
    let mut due_count = 0;
    let mut best: Option<(&Card, DuePriority)> = None;

    for card in cards {
        let priority = DuePriority::of(&card.schedule, now);
        if priority == DuePriority::NotDue {
            continue;
        }
        due_count += 1;

        let replace = match best {
            None => true,
            Some((current, current_priority)) => {
                rank(priority, &card.schedule) < rank(current_priority, &current.schedule)
            }
        };
        if replace {
            best = Some((card, priority));
        }
    }

    match best {
        Some((card, _)) => DueSelection {
            card: Some(card),
            remaining_count: due_count - 1,
        },
        None => DueSelection {
            card: None,
            remaining_count: 0,
        },
    }
}

// Smaller sorts first; None < Some for the due date
fn rank(
    priority: DuePriority,
    state: &CardScheduleState,
) -> (Reverse<DuePriority>, Option<DateTime<Utc>>) {
    (Reverse(priority), state.next_review_date)
}
