use std::time::Duration;

use anyhow::{bail, Result};

use crate::format::{BountyMode, DEFAULT_FOOTER_ICON};
use crate::window::SortOrder;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_CACHE_CAPACITY: usize = 4096;
pub const DEFAULT_PAGE_SIZE: usize = 25;
pub const DEFAULT_MAX_PAGES: usize = 50;
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);
/// Upper bound for every configured duration.
pub const MAX_SPAN: Duration = Duration::from_secs(366 * 24 * 60 * 60);

/// Runtime parameters of the polling loop.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub interval: Duration,
    pub window: Duration,
    pub cache_capacity: usize,
    pub cache_ttl: Duration,
    pub page_size: usize,
    pub max_pages: usize,
    pub call_timeout: Duration,
    pub order: SortOrder,
    pub bounty_mode: BountyMode,
    pub footer_icon: String,
    pub fetch_detail: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            window: DEFAULT_WINDOW,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_ttl: default_cache_ttl(DEFAULT_INTERVAL, DEFAULT_WINDOW),
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            order: SortOrder::default(),
            bounty_mode: BountyMode::default(),
            footer_icon: DEFAULT_FOOTER_ICON.to_string(),
            fetch_detail: true,
        }
    }
}

/// Twice the span during which an item can be listed again. Saturates
/// instead of overflowing; `validate` rejects the result in that case.
pub fn default_cache_ttl(interval: Duration, window: Duration) -> Duration {
    interval.saturating_add(window).saturating_mul(2)
}

impl Settings {
    /// Reject timing combinations under which items could be missed or sent twice.
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            bail!("poll interval must be greater than zero");
        }
        for (name, span) in [
            ("poll interval", self.interval),
            ("window", self.window),
            ("cache TTL", self.cache_ttl),
            ("call timeout", self.call_timeout),
        ] {
            if span > MAX_SPAN {
                bail!("{name} ({}s) must be at most {}s", span.as_secs(), MAX_SPAN.as_secs());
            }
        }
        if self.window <= self.interval {
            bail!(
                "window ({}s) must be longer than the poll interval ({}s)",
                self.window.as_secs(),
                self.interval.as_secs()
            );
        }
        let relist_span = self.interval.saturating_add(self.window);
        if self.cache_ttl < relist_span {
            bail!(
                "cache TTL ({}s) must be at least interval + window ({}s)",
                self.cache_ttl.as_secs(),
                relist_span.as_secs()
            );
        }
        if self.cache_capacity == 0 {
            bail!("cache capacity must be at least 1");
        }
        if self.page_size == 0 {
            bail!("page size must be at least 1");
        }
        if self.max_pages == 0 {
            bail!("max pages must be at least 1");
        }
        if self.call_timeout.is_zero() {
            bail!("call timeout must be greater than zero");
        }
        Ok(())
    }
}
