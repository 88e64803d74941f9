use chrono::{DateTime, Duration, Utc};

/// Query window a controller session reports on. Fixed when the session is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_minutes: u32,
}

impl TimeWindow {
    pub fn ending_now(duration_minutes: u32) -> Self {
        Self::ending_at(Utc::now(), duration_minutes)
    }

    pub fn ending_at(end: DateTime<Utc>, duration_minutes: u32) -> Self {
        Self {
            start: end - Duration::minutes(i64::from(duration_minutes)),
            end,
            duration_minutes,
        }
    }

    pub fn start_millis(&self) -> i64 {
        self.start.timestamp_millis()
    }

    pub fn end_millis(&self) -> i64 {
        self.end.timestamp_millis()
    }

    /// Time-range expression understood by the controller's EUM endpoints.
    pub fn eum_time_range(&self) -> String {
        format!(
            "Custom_Time_Range.BETWEEN_TIMES.{}.{}.{}",
            self.end_millis(),
            self.start_millis(),
            self.duration_minutes
        )
    }
}
