use async_trait::async_trait;

use crate::disclosure::Disclosure;
use crate::window::{LookbackWindow, SortOrder};

#[derive(Debug, Clone, PartialEq)]
pub struct ListRequest {
    pub window: LookbackWindow,
    pub order: SortOrder,
    pub page_size: usize,
    /// Opaque continuation token from the previous page, if any.
    pub after: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<Disclosure>,
    pub next: Option<String>,
}

/// Source of disclosed reports.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// One page of reports whose latest activity may fall inside `request.window`,
    /// sorted by latest activity in `request.order`.
    async fn list_recent(&self, request: &ListRequest) -> anyhow::Result<Page>;

    /// Every rendering field for a single report.
    async fn get_detail(&self, id: &str) -> anyhow::Result<Disclosure>;

    fn name(&self) -> &str;
}
