use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::cache::DedupCache;
use crate::deadline;
use crate::disclosure::Disclosure;
use crate::format::Formatter;
use crate::notify::Notifier;
use crate::store::ItemStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Delivered,
    AlreadySeen,
    DetailFailed,
    DeliveryFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    pub id: String,
    pub outcome: Outcome,
}

/// Per-item results of one dispatch, in delivery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub outcomes: Vec<ItemOutcome>,
}

impl DispatchReport {
    pub fn count(&self, outcome: Outcome) -> usize {
        self.outcomes.iter().filter(|o| o.outcome == outcome).count()
    }

    pub fn delivered(&self) -> usize {
        self.count(Outcome::Delivered)
    }

    pub fn already_seen(&self) -> usize {
        self.count(Outcome::AlreadySeen)
    }

    pub fn failed(&self) -> usize {
        self.count(Outcome::DetailFailed) + self.count(Outcome::DeliveryFailed)
    }
}

impl fmt::Display for DispatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} delivered, {} already seen, {} failed",
            self.delivered(),
            self.already_seen(),
            self.failed()
        )
    }
}

/// Turns new disclosures into delivered notifications, remembering what went out.
pub struct Dispatcher {
    store: Arc<dyn ItemStore>,
    notifier: Arc<dyn Notifier>,
    formatter: Formatter,
    cache: DedupCache,
    call_timeout: Duration,
    fetch_detail: bool,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn ItemStore>,
        notifier: Arc<dyn Notifier>,
        formatter: Formatter,
        cache: DedupCache,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            formatter,
            cache,
            call_timeout,
            fetch_detail: true,
        }
    }

    /// Render listed items as-is instead of fetching each one's detail first.
    pub fn with_detail_fetch(mut self, enabled: bool) -> Self {
        self.fetch_detail = enabled;
        self
    }

    pub fn cache(&self) -> &DedupCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut DedupCache {
        &mut self.cache
    }

    /// Deliver each unseen item in order. A failing item never stops the rest.
    #[instrument(skip_all, fields(items = items.len(), notifier = self.notifier.name()))]
    pub async fn dispatch(&mut self, items: &[Disclosure]) -> DispatchReport {
        let mut report = DispatchReport::default();
        for item in items {
            let outcome = self.dispatch_one(item).await;
            report.outcomes.push(ItemOutcome {
                id: item.id.clone(),
                outcome,
            });
        }
        report
    }

    async fn dispatch_one(&mut self, item: &Disclosure) -> Outcome {
        if self.cache.seen(&item.id) {
            debug!(id = %item.id, "already delivered, skipping");
            return Outcome::AlreadySeen;
        }

        let detail = if self.fetch_detail {
            let fetched = deadline::within(self.call_timeout, "get_detail", self.store.get_detail(&item.id)).await;
            match fetched {
                Ok(detail) => detail,
                Err(e) => {
                    warn!(id = %item.id, store = self.store.name(), error = %e, "detail fetch failed");
                    return Outcome::DetailFailed;
                }
            }
        } else {
            item.clone()
        };

        let payload = self.formatter.render(&detail);
        let delivered = deadline::within(self.call_timeout, "deliver", self.notifier.deliver(&payload)).await;
        if let Err(e) = delivered {
            warn!(id = %item.id, notifier = self.notifier.name(), error = %e, "delivery failed");
            return Outcome::DeliveryFailed;
        }

        self.cache.remember(&item.id);
        info!(id = %item.id, title = %detail.title, team = %detail.team.name, "delivered");
        Outcome::Delivered
    }
}
