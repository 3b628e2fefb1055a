use crate::error::ScheduleError;
use chrono::{DateTime, Days, Duration, LocalResult, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lowest ease factor a card can reach
pub const MIN_EASE_FACTOR: f64 = 1.3;
/// Highest ease factor, also the starting value for new cards
pub const MAX_EASE_FACTOR: f64 = 2.5;
/// Upper bound for a single interval (about a century)
pub const MAX_INTERVAL_DAYS: u32 = 36_500;

/// Recall quality reported by the user after seeing the answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grade {
    /// Forgot the card
    Again = 1,
    /// Recalled with serious difficulty
    Hard = 2,
    /// Recalled after some hesitation
    Good = 3,
    /// Recalled instantly
    Easy = 4,
}

impl Grade {
    pub const ALL: [Grade; 4] = [Grade::Again, Grade::Hard, Grade::Good, Grade::Easy];

    /// Numeric form (1-4), used for the review history table
    pub fn as_u32(&self) -> u32 {
        *self as u32
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::Again => "again",
            Grade::Hard => "hard",
            Grade::Good => "good",
            Grade::Easy => "easy",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Grade {
    type Err = ScheduleError;

    /// Accepts the grade names (any case) or their digits 1-4
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "again" | "1" => Ok(Grade::Again),
            "hard" | "2" => Ok(Grade::Hard),
            "good" | "3" => Ok(Grade::Good),
            "easy" | "4" => Ok(Grade::Easy),
            _ => Err(ScheduleError::InvalidGrade(s.to_string())),
        }
    }
}

/// Persistent memory-strength record for one flashcard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardScheduleState {
    /// Days until the next review, at least 1
    pub interval: u32,
    /// Interval growth multiplier, within [1.3, 2.5]
    pub ease_factor: f64,
    /// Number of grading events so far
    pub review_count: u32,
    pub last_reviewed: Option<DateTime<Utc>>,
    /// Absent for cards that were never reviewed (immediately due)
    pub next_review_date: Option<DateTime<Utc>>,
}

impl Default for CardScheduleState {
    fn default() -> Self {
        Self {
            interval: 1,
            ease_factor: MAX_EASE_FACTOR,
            review_count: 0,
            last_reviewed: None,
            next_review_date: None,
        }
    }
}

impl CardScheduleState {
    /// Check the interval and ease factor invariants
    pub fn validate(&self) -> Result<(), ScheduleError> {
        let ease_ok = self.ease_factor.is_finite()
            && (MIN_EASE_FACTOR..=MAX_EASE_FACTOR).contains(&self.ease_factor);
        let interval_ok = (1..=MAX_INTERVAL_DAYS).contains(&self.interval);
        if !interval_ok || !ease_ok {
            return Err(ScheduleError::InvalidState {
                interval: self.interval,
                ease_factor: self.ease_factor,
            });
        }
        Ok(())
    }

    /// Clamp a legacy or corrupt record back into range
    pub fn sanitized(mut self) -> Self {
        self.interval = self.interval.clamp(1, MAX_INTERVAL_DAYS);
        self.ease_factor = if self.ease_factor.is_finite() {
            self.ease_factor.clamp(MIN_EASE_FACTOR, MAX_EASE_FACTOR)
        } else {
            MAX_EASE_FACTOR
        };
        self
    }

    /// Merge a scheduler result into this state and count the review
    pub fn record_review(&mut self, update: &ScheduleUpdate, now: DateTime<Utc>) {
        self.interval = update.interval;
        self.ease_factor = update.ease_factor;
        self.next_review_date = Some(update.next_review_date);
        self.review_count += 1;
        self.last_reviewed = Some(now);
    }

    /// Due if never scheduled or the scheduled date has arrived
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_review_date.is_none_or(|due| due <= now)
    }

    pub fn is_mastered(&self, threshold_days: u32) -> bool {
        self.review_count > 0 && self.interval >= threshold_days
    }
}

/// Result of grading a card
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleUpdate {
    pub next_review_date: DateTime<Utc>,
    pub interval: u32,
    pub ease_factor: f64,
}

/// Compute the next interval, ease factor and due date for a card.
///
/// `now` is the grading instant; the due date is `interval` calendar days later in
/// `now`'s time zone, so it keeps the same wall-clock time across DST changes.
/// `state.review_count` is the count before this grading is recorded.
pub fn compute_next_review<Tz: TimeZone>(
    state: &CardScheduleState,
    grade: Grade,
    now: &DateTime<Tz>,
) -> Result<ScheduleUpdate, ScheduleError> {
    state.validate()?;

    let interval = f64::from(state.interval);
    let ease = state.ease_factor;

    let (new_interval, new_ease) = match grade {
        Grade::Again => (1.0, ease - 0.2),
        Grade::Hard => ((interval * 1.2).round(), ease - 0.15),
        Grade::Good => match state.review_count {
            0 => (1.0, ease),
            1 => (6.0, ease),
            _ => ((interval * ease).round(), ease),
        },
        Grade::Easy => ((interval * ease * 1.3).round(), ease + 0.15),
    };

    let interval = new_interval.clamp(1.0, f64::from(MAX_INTERVAL_DAYS)) as u32;
    let ease_factor = match grade {
        Grade::Good => ease,
        _ => strip_step_noise(new_ease).clamp(MIN_EASE_FACTOR, MAX_EASE_FACTOR),
    };
    let next_review_date = add_calendar_days(now, interval)?;

    Ok(ScheduleUpdate {
        next_review_date,
        interval,
        ease_factor,
    })
}

// Snap to the nearest hundredth only when the step left float noise, so
// 2.0 + 0.15 is stored as 2.15 but 1.333 - 0.15 stays 1.183
fn strip_step_noise(x: f64) -> f64 {
    let snapped = (x * 100.0).round() / 100.0;
    if (x - snapped).abs() < 1e-9 { snapped } else { x }
}

fn add_calendar_days<Tz: TimeZone>(
    now: &DateTime<Tz>,
    days: u32,
) -> Result<DateTime<Utc>, ScheduleError> {
    let out_of_range = || ScheduleError::DateOutOfRange {
        days,
        from: now.naive_utc().to_string(),
    };

    let local = now
        .naive_local()
        .checked_add_days(Days::new(u64::from(days)))
        .ok_or_else(out_of_range)?;

    match now.timezone().from_local_datetime(&local) {
        LocalResult::Single(due) => Ok(due.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        // Wall-clock time skipped by a DST gap: keep the offset `now` had
        LocalResult::None => {
            let offset = Duration::seconds(i64::from(now.offset().fix().local_minus_utc()));
            let utc = local.checked_sub_signed(offset).ok_or_else(out_of_range)?;
            Ok(Utc.from_utc_datetime(&utc))
        }
    }
}
