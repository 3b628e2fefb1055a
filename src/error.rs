//! Errors raised by the scheduling core.

/// Failure modes of grade parsing and schedule computation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScheduleError {
    /// Grade text was not one of again, hard, good, easy (or 1-4).
    #[error("invalid grade '{0}': expected again, hard, good or easy")]
    InvalidGrade(String),

    /// Card state violates its invariants.
    #[error("invalid card state: interval {interval}, ease factor {ease_factor}")]
    InvalidState { interval: u32, ease_factor: f64 },

    /// The next review date cannot be represented.
    #[error("next review date is out of range ({days} days after {from})")]
    DateOutOfRange { days: u32, from: String },
}
