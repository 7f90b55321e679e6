use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use chrono::{DateTime, TimeDelta, Utc};

use crate::disclosure::Disclosure;

/// Half-open interval `[start, end)` of latest-activity timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookbackWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl LookbackWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }

    pub fn length(&self) -> TimeDelta {
        self.end - self.start
    }

    /// Where `ts` falls relative to this window when a listing is walked in `order`.
    pub fn locate(&self, ts: DateTime<Utc>, order: SortOrder) -> Placement {
        if self.contains(ts) {
            return Placement::Inside;
        }
        let after_end = ts >= self.end;
        match (order, after_end) {
            (SortOrder::NewestFirst, true) | (SortOrder::OldestFirst, false) => Placement::Before,
            (SortOrder::NewestFirst, false) | (SortOrder::OldestFirst, true) => Placement::Past,
        }
    }
}

impl fmt::Display for LookbackWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// Position of an item relative to a window, in listing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Not reached the window yet; skip and keep reading.
    Before,
    Inside,
    /// Crossed the far boundary; everything after this is outside too.
    Past,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::NewestFirst => write!(f, "newest"),
            SortOrder::OldestFirst => write!(f, "oldest"),
        }
    }
}

impl FromStr for SortOrder {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw {
            "newest" | "desc" => Ok(SortOrder::NewestFirst),
            "oldest" | "asc" => Ok(SortOrder::OldestFirst),
            other => bail!("unknown sort order: {other} (valid: newest, oldest)"),
        }
    }
}

/// Polling position carried from one cycle to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PollCursor {
    /// End of the last window whose pages were fully drained.
    pub drained_until: Option<DateTime<Utc>>,
    /// Newest latest-activity timestamp returned by any drained window.
    pub newest_activity: Option<DateTime<Utc>>,
}

impl PollCursor {
    /// The window to query at `now`. Normally the trailing `length`, but it
    /// stretches back to `drained_until` when earlier cycles failed to drain,
    /// never further than `max_lookback` before `now`.
    pub fn plan(&self, now: DateTime<Utc>, length: TimeDelta, max_lookback: Option<TimeDelta>) -> LookbackWindow {
        let trailing = now - length;
        let start = match self.drained_until {
            Some(drained) if drained < trailing => match max_lookback {
                Some(limit) => drained.max(now - limit.max(length)),
                None => drained,
            },
            _ => trailing,
        };
        LookbackWindow::new(start, now)
    }

    /// Give up on catching up; the next plan is the plain trailing window.
    pub fn abandon_catch_up(self) -> PollCursor {
        PollCursor {
            drained_until: None,
            ..self
        }
    }

    pub fn advance(self, window: &LookbackWindow, items: &[Disclosure]) -> PollCursor {
        let newest_in_window = items.iter().map(|d| d.latest_activity_at).max();
        PollCursor {
            drained_until: Some(window.end),
            newest_activity: self.newest_activity.max(newest_in_window),
        }
    }
}
