use chrono::{DateTime, Local, TimeZone};

/// Source of the current time for grading and selection
pub trait Clock {
    /// Time zone used for calendar-day arithmetic
    type Zone: TimeZone;

    fn now(&self) -> DateTime<Self::Zone>;
}

/// Wall clock in the machine's local time zone
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    type Zone = Local;

    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Clock frozen at a fixed instant
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct FixedClock<Tz: TimeZone>(pub DateTime<Tz>);

#[cfg(test)]
impl<Tz: TimeZone> Clock for FixedClock<Tz> {
    type Zone = Tz;

    fn now(&self) -> DateTime<Tz> {
        self.0.clone()
    }
}
