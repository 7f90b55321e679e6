use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tracing::{info, instrument, warn};

use crate::cache::DedupCache;
use crate::config::Settings;
use crate::dispatcher::{DispatchReport, Dispatcher};
use crate::format::Formatter;
use crate::notify::Notifier;
use crate::poller::{PageLimitExceeded, Poller};
use crate::store::ItemStore;
use crate::window::{LookbackWindow, PollCursor};

/// What one poll cycle did.
#[derive(Debug)]
pub struct CycleReport {
    pub window: LookbackWindow,
    pub listed: usize,
    pub dispatch: DispatchReport,
    /// Set when listing failed and nothing was dispatched.
    pub error: Option<anyhow::Error>,
}

impl CycleReport {
    pub fn is_aborted(&self) -> bool {
        self.error.is_some()
    }
}

/// Drives poll cycles on a fixed period and owns all state carried between them.
pub struct Scheduler {
    poller: Poller,
    dispatcher: Dispatcher,
    cursor: PollCursor,
    interval: Duration,
}

impl Scheduler {
    pub fn new(poller: Poller, dispatcher: Dispatcher, interval: Duration) -> Self {
        Self {
            poller,
            dispatcher,
            cursor: PollCursor::default(),
            interval,
        }
    }

    pub fn from_settings(settings: &Settings, store: Arc<dyn ItemStore>, notifier: Arc<dyn Notifier>) -> Result<Self> {
        settings.validate()?;

        // Reaching back further than the cache remembers could resend items.
        let max_lookback = settings.cache_ttl.saturating_sub(settings.interval);
        let poller = Poller::new(
            store.clone(),
            settings.window,
            settings.page_size,
            settings.max_pages,
            settings.order,
            settings.call_timeout,
        )?
        .with_max_lookback(max_lookback)?;
        let formatter = Formatter::new(settings.footer_icon.as_str(), settings.bounty_mode);
        let cache = DedupCache::new(settings.cache_capacity, settings.cache_ttl)?;
        let dispatcher = Dispatcher::new(store, notifier, formatter, cache, settings.call_timeout)
            .with_detail_fetch(settings.fetch_detail);

        Ok(Self::new(poller, dispatcher, settings.interval))
    }

    pub fn cursor(&self) -> PollCursor {
        self.cursor
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Poll once and deliver whatever is new. Never fails; a listing error
    /// is reported and leaves the cursor where it was, except that a catch-up
    /// window too large for the page limit is given up.
    #[instrument(skip(self))]
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> CycleReport {
        let window = self.poller.plan_window(&self.cursor, now);
        info!(start = %window.start, end = %window.end, "starting poll cycle");

        let cycle = match self.poller.poll(self.cursor, now).await {
            Ok(cycle) => cycle,
            Err(e) => {
                let error = format!("{e:#}");
                warn!(error = %error, "poll cycle aborted");
                if e.downcast_ref::<PageLimitExceeded>().is_some() && self.cursor.drained_until.is_some() {
                    warn!(since = ?self.cursor.drained_until, "backlog exceeds the page limit, resuming from the trailing window");
                    self.cursor = self.cursor.abandon_catch_up();
                }
                return CycleReport {
                    window,
                    listed: 0,
                    dispatch: DispatchReport::default(),
                    error: Some(e),
                };
            }
        };

        let dispatch = self.dispatcher.dispatch(&cycle.items).await;
        self.cursor = cycle.cursor;
        info!(
            listed = cycle.items.len(),
            pages = cycle.pages,
            delivered = dispatch.delivered(),
            already_seen = dispatch.already_seen(),
            failed = dispatch.failed(),
            cached = self.dispatcher.cache().len(),
            "poll cycle complete"
        );

        CycleReport {
            window: cycle.window,
            listed: cycle.items.len(),
            dispatch,
            error: None,
        }
    }

    /// Mark everything currently in the window as delivered without sending it.
    #[instrument(skip(self))]
    pub async fn prime(&mut self, now: DateTime<Utc>) -> Result<usize> {
        let cycle = self
            .poller
            .poll(self.cursor, now)
            .await
            .context("failed to prime dedup cache")?;

        let cache = self.dispatcher.cache_mut();
        for item in &cycle.items {
            cache.remember(&item.id);
        }
        self.cursor = cycle.cursor;

        info!(skipped = cycle.items.len(), "skipping existing backlog");
        Ok(cycle.items.len())
    }

    /// Run a cycle immediately and then once per interval until `shutdown`
    /// resolves. A running cycle is always finished first.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(interval_secs = self.interval.as_secs(), "polling");
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("shutdown requested, stopping");
                    break;
                }
                _ = ticker.tick() => {
                    self.run_cycle(Utc::now()).await;
                }
            }
        }
    }
}
