use std::time::Duration;

use clap::{Parser, ValueEnum};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use hacktivity::config::{self, Settings};
use hacktivity::format::DEFAULT_FOOTER_ICON;
use hacktivity::hackerone::HACKERONE_BASE_URL;
use hacktivity::{BountyMode, SortOrder};

/// Post newly disclosed HackerOne reports to a Slack channel
#[derive(Parser, Debug)]
#[command(name = "hacktivity", version)]
pub struct Cli {
    /// Slack incoming webhook URL
    #[arg(long, env = "SLACK_WEBHOOK_URL", hide_env_values = true, required_unless_present = "dry_run")]
    pub webhook_url: Option<String>,

    /// Seconds between poll cycles
    #[arg(long, env = "HACKTIVITY_INTERVAL_SECS", default_value_t = config::DEFAULT_INTERVAL.as_secs())]
    pub interval_secs: u64,

    /// Lookback window in seconds; must exceed the interval
    #[arg(long, env = "HACKTIVITY_WINDOW_SECS", default_value_t = config::DEFAULT_WINDOW.as_secs())]
    pub window_secs: u64,

    /// Maximum number of delivered ids remembered
    #[arg(long, env = "HACKTIVITY_CACHE_CAPACITY", default_value_t = config::DEFAULT_CACHE_CAPACITY)]
    pub cache_capacity: usize,

    /// How long a delivered id is remembered [default: 2 x (interval + window)]
    #[arg(long, env = "HACKTIVITY_CACHE_TTL_SECS")]
    pub cache_ttl_secs: Option<u64>,

    /// Reports requested per page
    #[arg(long, env = "HACKTIVITY_PAGE_SIZE", default_value_t = config::DEFAULT_PAGE_SIZE)]
    pub page_size: usize,

    /// Give up on a cycle after this many pages
    #[arg(long, env = "HACKTIVITY_MAX_PAGES", default_value_t = config::DEFAULT_MAX_PAGES)]
    pub max_pages: usize,

    /// Timeout in seconds for each HackerOne or webhook call
    #[arg(long, env = "HACKTIVITY_TIMEOUT_SECS", default_value_t = config::DEFAULT_CALL_TIMEOUT.as_secs())]
    pub timeout_secs: u64,

    /// Listing order requested from HackerOne (newest, oldest)
    #[arg(long, env = "HACKTIVITY_ORDER", default_value_t = SortOrder::NewestFirst)]
    pub order: SortOrder,

    /// How multiple bounty awards are shown (total, first)
    #[arg(long, env = "HACKTIVITY_BOUNTY", default_value_t = BountyMode::Total)]
    pub bounty: BountyMode,

    /// HackerOne base URL
    #[arg(long, env = "HACKERONE_BASE_URL", default_value = HACKERONE_BASE_URL)]
    pub hackerone_url: String,

    /// Icon shown next to the message footer
    #[arg(long, env = "HACKTIVITY_FOOTER_ICON", default_value = DEFAULT_FOOTER_ICON)]
    pub footer_icon: String,

    /// Render listed reports directly instead of fetching each report's detail
    #[arg(long)]
    pub no_detail: bool,

    /// Treat reports already in the window at startup as delivered
    #[arg(long)]
    pub skip_backlog: bool,

    /// Run a single poll cycle and exit
    #[arg(long)]
    pub once: bool,

    /// Print payloads to stdout instead of posting them
    #[arg(long)]
    pub dry_run: bool,

    /// Log output format
    #[arg(long, value_enum, env = "HACKTIVITY_LOG_FORMAT", default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(flatten)]
    pub verbosity: Verbosity<InfoLevel>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

impl Cli {
    pub fn settings(&self) -> Settings {
        let interval = Duration::from_secs(self.interval_secs);
        let window = Duration::from_secs(self.window_secs);
        let cache_ttl = self
            .cache_ttl_secs
            .map_or_else(|| config::default_cache_ttl(interval, window), Duration::from_secs);

        Settings {
            interval,
            window,
            cache_capacity: self.cache_capacity,
            cache_ttl,
            page_size: self.page_size,
            max_pages: self.max_pages,
            call_timeout: Duration::from_secs(self.timeout_secs),
            order: self.order,
            bounty_mode: self.bounty,
            footer_icon: self.footer_icon.clone(),
            fetch_detail: !self.no_detail,
        }
    }
}
