pub mod cache;
pub mod config;
pub mod disclosure;
pub mod dispatcher;
pub mod format;
pub mod hackerone;
pub mod notify;
pub mod poller;
pub mod scheduler;
pub mod slack;
pub mod store;
pub mod window;

mod deadline;
#[cfg(test)]
mod fakes;

pub use cache::DedupCache;
pub use config::Settings;
pub use disclosure::{Bounty, Disclosure, Reporter, Severity, Substate, Team};
pub use dispatcher::{DispatchReport, Dispatcher, Outcome};
pub use format::{BountyMode, Formatter};
pub use hackerone::HackerOneClient;
pub use notify::{Notifier, Payload, StdoutNotifier};
pub use poller::{CycleItems, Poller};
pub use scheduler::{CycleReport, Scheduler};
pub use slack::SlackWebhook;
pub use store::{ItemStore, ListRequest, Page};
pub use window::{LookbackWindow, PollCursor, SortOrder};
