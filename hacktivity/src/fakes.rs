//! In-memory store and notifier used by unit tests.

use std::collections::HashSet;
use std::sync::Mutex;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::disclosure::{Disclosure, Reporter, Severity, Team};
use crate::notify::{Notifier, Payload};
use crate::store::{ItemStore, ListRequest, Page};
use crate::window::SortOrder;

pub(crate) fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + chrono::TimeDelta::minutes(minute as i64)
}

pub(crate) fn disclosure(id: &str, latest_activity_at: DateTime<Utc>) -> Disclosure {
    Disclosure {
        id: id.to_string(),
        title: format!("Finding {id}"),
        url: format!("https://hackerone.com/reports/{id}"),
        substate: None,
        severity: Some(Severity::High),
        bounties: vec![],
        disclosed_at: Some(latest_activity_at),
        latest_activity_at,
        reporter: Reporter {
            username: "alice".to_string(),
            ..Reporter::default()
        },
        team: Team {
            name: "Acme".to_string(),
            ..Team::default()
        },
    }
}

/// Pages through `feed` in the requested order, ignoring the window like a
/// server that only sorts.
#[derive(Default)]
pub(crate) struct FakeStore {
    feed: Mutex<Vec<Disclosure>>,
    fail_list_call: Mutex<Option<usize>>,
    failing_details: Mutex<HashSet<String>>,
    list_requests: Mutex<Vec<ListRequest>>,
    detail_requests: Mutex<Vec<String>>,
}

impl FakeStore {
    pub(crate) fn with_feed(feed: Vec<Disclosure>) -> Self {
        let store = Self::default();
        store.set_feed(feed);
        store
    }

    pub(crate) fn set_feed(&self, feed: Vec<Disclosure>) {
        *self.feed.lock().unwrap() = feed;
    }

    /// Make the `n`th list call (1-based, counted over the store's lifetime) fail.
    pub(crate) fn fail_list_call(&self, n: usize) {
        *self.fail_list_call.lock().unwrap() = Some(n);
    }

    pub(crate) fn fail_detail(&self, id: &str) {
        self.failing_details.lock().unwrap().insert(id.to_string());
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.list_requests.lock().unwrap().len()
    }

    pub(crate) fn list_requests(&self) -> Vec<ListRequest> {
        self.list_requests.lock().unwrap().clone()
    }

    pub(crate) fn detail_requests(&self) -> Vec<String> {
        self.detail_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ItemStore for FakeStore {
    async fn list_recent(&self, request: &ListRequest) -> Result<Page> {
        let call = {
            let mut requests = self.list_requests.lock().unwrap();
            requests.push(request.clone());
            requests.len()
        };
        if *self.fail_list_call.lock().unwrap() == Some(call) {
            bail!("store unavailable");
        }

        let mut feed = self.feed.lock().unwrap().clone();
        match request.order {
            SortOrder::NewestFirst => feed.sort_by(|a, b| b.latest_activity_at.cmp(&a.latest_activity_at)),
            SortOrder::OldestFirst => feed.sort_by_key(|d| d.latest_activity_at),
        }

        let start: usize = match &request.after {
            Some(token) => token.parse()?,
            None => 0,
        };
        let end = (start + request.page_size).min(feed.len());
        let next = (end < feed.len()).then(|| end.to_string());
        Ok(Page {
            items: feed.get(start..end).unwrap_or_default().to_vec(),
            next,
        })
    }

    async fn get_detail(&self, id: &str) -> Result<Disclosure> {
        self.detail_requests.lock().unwrap().push(id.to_string());
        if self.failing_details.lock().unwrap().contains(id) {
            bail!("detail for {id} unavailable");
        }
        self.feed
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or_else(|| anyhow!("report {id} not found"))
    }

    fn name(&self) -> &str {
        "fake"
    }
}

#[derive(Default)]
pub(crate) struct FakeNotifier {
    delivered: Mutex<Vec<Payload>>,
    failing: Mutex<HashSet<String>>,
}

impl FakeNotifier {
    pub(crate) fn fail_for(&self, id: &str) {
        self.failing.lock().unwrap().insert(id.to_string());
    }

    pub(crate) fn recover(&self, id: &str) {
        self.failing.lock().unwrap().remove(id);
    }

    pub(crate) fn delivered(&self) -> Vec<Payload> {
        self.delivered.lock().unwrap().clone()
    }

    /// Report ids in delivery order, taken from each attachment's link.
    pub(crate) fn delivered_ids(&self) -> Vec<String> {
        self.delivered()
            .iter()
            .map(|p| report_id(p).to_string())
            .collect()
    }
}

fn report_id(payload: &Payload) -> &str {
    payload
        .attachments
        .first()
        .and_then(|a| a.title_link.rsplit('/').next())
        .unwrap_or_default()
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn deliver(&self, payload: &Payload) -> Result<()> {
        let id = report_id(payload).to_string();
        if self.failing.lock().unwrap().contains(&id) {
            bail!("webhook returned HTTP 500");
        }
        self.delivered.lock().unwrap().push(payload.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "fake"
    }
}
