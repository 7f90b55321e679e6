use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, instrument};

use crate::deadline;
use crate::disclosure::Disclosure;
use crate::store::{ItemStore, ListRequest};
use crate::window::{LookbackWindow, Placement, PollCursor, SortOrder};

/// Everything one successful poll produced.
#[derive(Debug, Clone)]
pub struct CycleItems {
    pub window: LookbackWindow,
    /// Unique by id, oldest activity first.
    pub items: Vec<Disclosure>,
    pub cursor: PollCursor,
    pub pages: usize,
}

/// A poll walked `pages` pages without reaching the end of `window`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLimitExceeded {
    pub window: LookbackWindow,
    pub pages: usize,
}

impl fmt::Display for PageLimitExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "listing did not reach the end of window {} within {} pages",
            self.window, self.pages
        )
    }
}

impl std::error::Error for PageLimitExceeded {}

/// Drains the lookback window from the item store, one page at a time.
pub struct Poller {
    store: Arc<dyn ItemStore>,
    window_length: TimeDelta,
    max_lookback: Option<TimeDelta>,
    page_size: usize,
    max_pages: usize,
    order: SortOrder,
    call_timeout: Duration,
}

impl Poller {
    pub fn new(
        store: Arc<dyn ItemStore>,
        window_length: Duration,
        page_size: usize,
        max_pages: usize,
        order: SortOrder,
        call_timeout: Duration,
    ) -> Result<Self> {
        let window_length = TimeDelta::from_std(window_length).context("window length is out of range")?;
        if window_length <= TimeDelta::zero() {
            bail!("window length must be positive");
        }
        if page_size == 0 {
            bail!("page size must be at least 1");
        }
        if max_pages == 0 {
            bail!("max pages must be at least 1");
        }

        Ok(Self {
            store,
            window_length,
            max_lookback: None,
            page_size,
            max_pages,
            order,
            call_timeout,
        })
    }

    /// Bound how far back a catch-up window may reach after failed cycles.
    pub fn with_max_lookback(mut self, max_lookback: Duration) -> Result<Self> {
        let max_lookback = TimeDelta::from_std(max_lookback).context("max lookback is out of range")?;
        self.max_lookback = Some(max_lookback);
        Ok(self)
    }

    pub fn plan_window(&self, cursor: &PollCursor, now: DateTime<Utc>) -> LookbackWindow {
        cursor.plan(now, self.window_length, self.max_lookback)
    }

    /// Collect every item whose latest activity falls in the planned window.
    ///
    /// Any store failure aborts the poll; the caller keeps its old cursor.
    #[instrument(skip(self, cursor), fields(store = self.store.name()))]
    pub async fn poll(&self, cursor: PollCursor, now: DateTime<Utc>) -> Result<CycleItems> {
        let window = self.plan_window(&cursor, now);
        let mut items = Vec::new();
        let mut ids = HashSet::new();
        let mut after = None;
        let mut pages = 0;

        loop {
            if pages == self.max_pages {
                return Err(PageLimitExceeded { window, pages }.into());
            }

            let request = ListRequest {
                window,
                order: self.order,
                page_size: self.page_size,
                after: after.take(),
            };
            let page = deadline::within(self.call_timeout, "list_recent", self.store.list_recent(&request))
                .await
                .with_context(|| format!("failed to list page {} of window {window}", pages + 1))?;
            pages += 1;

            let mut reached_boundary = false;
            for item in page.items {
                match window.locate(item.latest_activity_at, self.order) {
                    Placement::Before => {
                        debug!(id = %item.id, at = %item.latest_activity_at, "outside window, skipping");
                    }
                    Placement::Inside => {
                        if ids.insert(item.id.clone()) {
                            items.push(item);
                        } else {
                            debug!(id = %item.id, "listed twice in one cycle");
                        }
                    }
                    Placement::Past => {
                        reached_boundary = true;
                        break;
                    }
                }
            }

            if reached_boundary {
                break;
            }
            match page.next {
                Some(next) => after = Some(next),
                None => break,
            }
        }

        items.sort_by_key(|d| d.latest_activity_at);
        let cursor = cursor.advance(&window, &items);
        debug!(pages, items = items.len(), "window drained");

        Ok(CycleItems {
            window,
            items,
            cursor,
            pages,
        })
    }
}
