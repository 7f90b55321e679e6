use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::disclosure::{Bounty, Disclosure, Reporter, Severity, Substate, Team};
use crate::store::{ItemStore, ListRequest, Page};
use crate::window::SortOrder;

pub const HACKERONE_BASE_URL: &str = "https://hackerone.com";

const DISCLOSED_FRAGMENT: &str = r#"
fragment DisclosedNode on Disclosed {
  severity_rating
  total_awarded_amount
  currency
  latest_disclosable_activity_at
  report {
    _id
    url
    title
    substate
    disclosed_at
    bounties {
      awarded_amount
      awarded_currency
    }
  }
  team {
    name
    handle
    url
    profile_picture(size: medium)
  }
  reporter {
    name
    username
    url
    profile_picture(size: medium)
  }
}
"#;

const FEED_QUERY: &str = r#"
query HacktivityFeed($since: DateTime!, $first: Int!, $after: String, $direction: OrderDirection!) {
  hacktivity_items(
    first: $first
    after: $after
    secure_order_by: { latest_disclosable_activity_at: { _direction: $direction } }
    where: {
      report: { disclosed_at: { _is_null: false } }
      latest_disclosable_activity_at: { _gte: $since }
    }
  ) {
    pageInfo {
      hasNextPage
      endCursor
    }
    nodes {
      __typename
      ...DisclosedNode
    }
  }
}
"#;

const DETAIL_QUERY: &str = r#"
query DisclosedReport($id: Int!) {
  hacktivity_items(first: 1, where: { report: { id: { _eq: $id } } }) {
    nodes {
      __typename
      ...DisclosedNode
    }
  }
}
"#;

#[derive(Deserialize)]
struct HacktivityData {
    hacktivity_items: HacktivityConnection,
}

#[derive(Deserialize)]
struct HacktivityConnection {
    #[serde(rename = "pageInfo")]
    page_info: Option<PageInfo>,
    #[serde(default)]
    nodes: Vec<HacktivityNode>,
}

#[derive(Deserialize)]
struct PageInfo {
    #[serde(rename = "hasNextPage")]
    has_next_page: bool,
    #[serde(rename = "endCursor")]
    end_cursor: Option<String>,
}

#[derive(Deserialize)]
struct HacktivityNode {
    #[serde(rename = "__typename")]
    typename: String,
    severity_rating: Option<String>,
    total_awarded_amount: Option<Scalar>,
    currency: Option<String>,
    latest_disclosable_activity_at: Option<DateTime<Utc>>,
    report: Option<ReportNode>,
    team: Option<TeamNode>,
    reporter: Option<ReporterNode>,
}

#[derive(Deserialize)]
struct ReportNode {
    #[serde(rename = "_id")]
    id: Option<Scalar>,
    url: Option<String>,
    title: Option<String>,
    substate: Option<String>,
    disclosed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    bounties: Vec<BountyNode>,
}

#[derive(Deserialize)]
struct BountyNode {
    awarded_amount: Option<Scalar>,
    awarded_currency: Option<String>,
}

#[derive(Deserialize)]
struct TeamNode {
    name: Option<String>,
    handle: Option<String>,
    url: Option<String>,
    profile_picture: Option<String>,
}

#[derive(Deserialize)]
struct ReporterNode {
    name: Option<String>,
    username: Option<String>,
    url: Option<String>,
    profile_picture: Option<String>,
}

/// GraphQL scalars that arrive as either strings or numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Number(serde_json::Number),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Text(s) => s,
            Scalar::Number(n) => n.to_string(),
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Text(s) => s.trim().parse().ok(),
            Scalar::Number(n) => n.as_f64(),
        }
    }
}

enum Attempt {
    Data(Value),
    StaleToken,
}

/// HackerOne hacktivity over the public GraphQL endpoint.
pub struct HackerOneClient {
    client: reqwest::Client,
    base_url: String,
    csrf_token: RwLock<Option<String>>,
}

impl HackerOneClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("hacktivity/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            csrf_token: RwLock::new(None),
        })
    }

    /// Scrape a fresh CSRF token from the hacktivity page.
    #[instrument(skip(self))]
    async fn refresh_csrf(&self) -> Result<()> {
        let url = format!("{}/hacktivity", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("{url} returned HTTP {status}");
        }

        let html = response
            .text()
            .await
            .with_context(|| format!("failed to read body from {url}"))?;
        let token = extract_csrf_token(&html).context("no csrf-token meta tag on hacktivity page")?;

        debug!("refreshed CSRF token");
        *self.csrf_token.write().await = Some(token);
        Ok(())
    }

    /// Run a GraphQL query, refreshing the CSRF token once if HackerOne rejects it.
    #[instrument(skip(self, query, variables))]
    async fn graphql(&self, operation: &str, query: &str, variables: Value) -> Result<Value> {
        if self.csrf_token.read().await.is_none() {
            if let Err(e) = self.refresh_csrf().await {
                warn!(error = %e, "could not obtain CSRF token, querying without one");
            }
        }

        let body = json!({
            "operationName": operation,
            "query": format!("{query}\n{DISCLOSED_FRAGMENT}"),
            "variables": variables,
        });

        match self.graphql_once(&body).await? {
            Attempt::Data(data) => Ok(data),
            Attempt::StaleToken => {
                info!("CSRF token rejected, refreshing");
                self.refresh_csrf().await?;
                match self.graphql_once(&body).await? {
                    Attempt::Data(data) => Ok(data),
                    Attempt::StaleToken => bail!("GraphQL request rejected after CSRF refresh"),
                }
            }
        }
    }

    async fn graphql_once(&self, body: &Value) -> Result<Attempt> {
        let url = format!("{}/graphql", self.base_url);
        let mut request = self.client.post(&url).json(body);
        if let Some(token) = self.csrf_token.read().await.as_deref() {
            request = request.header("x-csrf-token", token);
        }

        let response = request.send().await.context("GraphQL request failed")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            if status == reqwest::StatusCode::INTERNAL_SERVER_ERROR && text.contains("\"STANDARD_ERROR\"") {
                return Ok(Attempt::StaleToken);
            }
            bail!("GraphQL API returned HTTP {status}");
        }

        let json: Value = response
            .json()
            .await
            .context("failed to parse GraphQL response")?;

        if let Some(errors) = json.get("errors") {
            bail!("GraphQL errors: {errors}");
        }

        json.get("data")
            .cloned()
            .map(Attempt::Data)
            .context("missing 'data' field in GraphQL response")
    }
}

#[async_trait]
impl ItemStore for HackerOneClient {
    #[instrument(skip(self, request), fields(window = %request.window, after = ?request.after))]
    async fn list_recent(&self, request: &ListRequest) -> Result<Page> {
        let direction = match request.order {
            SortOrder::NewestFirst => "DESC",
            SortOrder::OldestFirst => "ASC",
        };
        let variables = json!({
            "since": request.window.start.to_rfc3339(),
            "first": request.page_size,
            "after": request.after,
            "direction": direction,
        });

        let data = self.graphql("HacktivityFeed", FEED_QUERY, variables).await?;
        parse_feed(data, &self.base_url)
    }

    #[instrument(skip(self))]
    async fn get_detail(&self, id: &str) -> Result<Disclosure> {
        let numeric: i64 = id
            .parse()
            .with_context(|| format!("report id is not numeric: {id}"))?;

        let data = self
            .graphql("DisclosedReport", DETAIL_QUERY, json!({ "id": numeric }))
            .await?;
        let page = parse_feed(data, &self.base_url)?;

        page.items
            .into_iter()
            .find(|d| d.id == id)
            .with_context(|| format!("report {id} not found in hacktivity"))
    }

    fn name(&self) -> &str {
        "HackerOne"
    }
}

fn parse_feed(data: Value, base_url: &str) -> Result<Page> {
    let data: HacktivityData =
        serde_json::from_value(data).context("failed to deserialize hacktivity response")?;
    let connection = data.hacktivity_items;

    let items = connection
        .nodes
        .into_iter()
        .filter_map(|node| into_disclosure(node, base_url))
        .collect();

    let next = match connection.page_info {
        Some(PageInfo {
            has_next_page: true,
            end_cursor: Some(cursor),
        }) => Some(cursor),
        Some(PageInfo {
            has_next_page: true,
            end_cursor: None,
        }) => {
            warn!("hacktivity reported another page without a cursor");
            None
        }
        _ => None,
    };

    Ok(Page { items, next })
}

fn into_disclosure(node: HacktivityNode, base_url: &str) -> Option<Disclosure> {
    if node.typename != "Disclosed" {
        debug!(typename = %node.typename, "ignoring non-disclosure hacktivity item");
        return None;
    }

    let Some(report) = node.report else {
        warn!("disclosed hacktivity item without a report");
        return None;
    };
    let Some(id) = report.id.map(Scalar::into_string) else {
        warn!("disclosed report without an id");
        return None;
    };
    let Some(latest_activity_at) = node.latest_disclosable_activity_at.or(report.disclosed_at) else {
        warn!(id = %id, "disclosed report without any activity timestamp");
        return None;
    };

    let severity = node.severity_rating.as_deref().and_then(|raw| {
        raw.parse::<Severity>()
            .map_err(|e| debug!(id = %id, error = %e, "ignoring severity"))
            .ok()
    });
    let substate = report.substate.as_deref().and_then(|raw| {
        raw.parse::<Substate>()
            .map_err(|e| debug!(id = %id, error = %e, "ignoring substate"))
            .ok()
    });

    let mut bounties: Vec<Bounty> = report
        .bounties
        .iter()
        .filter_map(|b| {
            let amount = b.awarded_amount.as_ref()?.as_f64()?;
            let currency = b.awarded_currency.clone().unwrap_or_else(|| "USD".to_string());
            Some(Bounty::new(amount, currency))
        })
        .collect();
    if bounties.is_empty() {
        let total = node.total_awarded_amount.as_ref().and_then(Scalar::as_f64);
        if let Some(amount) = total.filter(|a| *a > 0.0) {
            let currency = node.currency.unwrap_or_else(|| "USD".to_string());
            bounties.push(Bounty::new(amount, currency));
        }
    }

    let team = node.team.map_or_else(Team::default, |t| Team {
        name: t.name.unwrap_or_default(),
        handle: t.handle.unwrap_or_default(),
        url: t.url.map(|u| absolutize(base_url, &u)).unwrap_or_default(),
        profile_picture: t.profile_picture.map(|p| absolutize(base_url, &p)),
    });
    let reporter = node.reporter.map_or_else(Reporter::default, |r| Reporter {
        username: r.username.unwrap_or_default(),
        name: r.name.filter(|n| !n.trim().is_empty()),
        url: r.url.map(|u| absolutize(base_url, &u)).unwrap_or_default(),
        profile_picture: r.profile_picture.map(|p| absolutize(base_url, &p)),
    });

    Some(Disclosure {
        url: report
            .url
            .map(|u| absolutize(base_url, &u))
            .unwrap_or_else(|| format!("{base_url}/reports/{id}")),
        title: report.title.unwrap_or_default(),
        id,
        substate,
        severity,
        bounties,
        disclosed_at: report.disclosed_at,
        latest_activity_at,
        reporter,
        team,
    })
}

/// HackerOne returns some asset URLs relative to the site root.
fn absolutize(base_url: &str, url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else if url.starts_with('/') {
        format!("{base_url}{url}")
    } else {
        format!("{base_url}/{url}")
    }
}

static META_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<meta\b[^>]*>").expect("Invalid meta tag regex"));

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+))"#)
        .expect("Invalid attribute regex")
});

/// Content of the `<meta name="csrf-token">` tag, in any attribute order or
/// quoting style.
fn extract_csrf_token(html: &str) -> Option<String> {
    META_TAG.find_iter(html).find_map(|tag| {
        let mut name = None;
        let mut content = None;
        for attr in ATTRIBUTE.captures_iter(tag.as_str()) {
            let value = attr.get(2).or_else(|| attr.get(3)).or_else(|| attr.get(4))?.as_str();
            match attr[1].to_ascii_lowercase().as_str() {
                "name" => name = Some(value),
                "content" => content = Some(value),
                _ => {}
            }
        }
        match name {
            Some(name) if name.eq_ignore_ascii_case("csrf-token") => content.map(str::to_string),
            _ => None,
        }
    })
}
