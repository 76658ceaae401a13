// src/ingest/window.rs
//! Splits a date range into contiguous half-open windows `[start, end)`.

use chrono::{DateTime, Duration, Utc};

use crate::error::{Error, Result};

/// Format used on the wire and in file names: UTC, whole seconds, no suffix.
pub const ISO_SECONDS: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn start_iso(&self) -> String {
        iso_seconds(self.start)
    }

    pub fn end_iso(&self) -> String {
        iso_seconds(self.end)
    }

    /// Output file name; a pure function of `start`.
    pub fn file_name(&self) -> String {
        format!("{}.csv", self.start_iso())
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start_iso(), self.end_iso())
    }
}

pub fn iso_seconds(t: DateTime<Utc>) -> String {
    t.format(ISO_SECONDS).to_string()
}

/// Lazy, restartable window sequence. Clone it to iterate again.
#[derive(Debug, Clone)]
pub struct Windows {
    next_start: DateTime<Utc>,
    end: DateTime<Utc>,
    step: Duration,
}

impl Iterator for Windows {
    type Item = TimeWindow;

    fn next(&mut self) -> Option<TimeWindow> {
        if self.next_start >= self.end {
            return None;
        }
        let start = self.next_start;
        // a step past chrono's range clips to the requested end
        let end = start
            .checked_add_signed(self.step)
            .map_or(self.end, |e| e.min(self.end));
        self.next_start = end;
        Some(TimeWindow { start, end })
    }
}

/// Windows of `step_hours` covering `[start, end)`; the last one may be shorter.
pub fn generate(start: DateTime<Utc>, end: DateTime<Utc>, step_hours: u32) -> Result<Windows> {
    if step_hours == 0 {
        return Err(Error::config("window_hours must be > 0", "window_hours"));
    }
    if end <= start {
        return Err(Error::config(
            format!(
                "end_date {} must be after start_date {}",
                iso_seconds(end),
                iso_seconds(start)
            ),
            "end_date",
        ));
    }
    Ok(Windows {
        next_start: start,
        end,
        step: Duration::hours(i64::from(step_hours)),
    })
}
