use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};

/// A publicly disclosed report as seen in the hacktivity feed.
#[derive(Debug, Clone, PartialEq)]
pub struct Disclosure {
    pub id: String,
    pub title: String,
    pub url: String,
    pub substate: Option<Substate>,
    pub severity: Option<Severity>,
    pub bounties: Vec<Bounty>,
    pub disclosed_at: Option<DateTime<Utc>>,
    pub latest_activity_at: DateTime<Utc>,
    pub reporter: Reporter,
    pub team: Team,
}

impl fmt::Display for Disclosure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Report {}: {}", self.id, self.title)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Reporter {
    pub username: String,
    pub name: Option<String>,
    pub url: String,
    pub profile_picture: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Team {
    pub name: String,
    pub handle: String,
    pub url: String,
    pub profile_picture: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bounty {
    pub amount: f64,
    pub currency: String,
}

impl Bounty {
    pub fn new(amount: f64, currency: impl Into<String>) -> Self {
        Self {
            amount,
            currency: currency.into(),
        }
    }
}

impl fmt::Display for Bounty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.amount.fract() == 0.0 {
            write!(f, "{:.0} {}", self.amount, self.currency)
        } else {
            write!(f, "{:.2} {}", self.amount, self.currency)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
    Critical,
}

struct SeverityRow {
    severity: Severity,
    key: &'static str,
    label: &'static str,
    color: &'static str,
}

// Indexed by `Severity as usize`.
const SEVERITY_TABLE: [SeverityRow; 5] = [
    SeverityRow { severity: Severity::None, key: "none", label: "None", color: "#ccc" },
    SeverityRow { severity: Severity::Low, key: "low", label: "Low", color: "#f1c40f" },
    SeverityRow { severity: Severity::Medium, key: "medium", label: "Medium", color: "#e67e22" },
    SeverityRow { severity: Severity::High, key: "high", label: "High", color: "#ce3f4b" },
    SeverityRow { severity: Severity::Critical, key: "critical", label: "Critical", color: "#9b1b30" },
];

impl Severity {
    pub fn label(self) -> &'static str {
        SEVERITY_TABLE[self as usize].label
    }

    pub fn color(self) -> &'static str {
        SEVERITY_TABLE[self as usize].color
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Severity {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        let key = raw.trim().to_lowercase();
        match SEVERITY_TABLE.iter().find(|row| row.key == key) {
            Some(row) => Ok(row.severity),
            None => bail!("unknown severity rating: {raw}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Substate {
    New,
    Triaged,
    NeedsMoreInfo,
    Resolved,
    NotApplicable,
    Informative,
    Duplicate,
    Spam,
    PendingProgramReview,
    Retesting,
}

struct SubstateRow {
    substate: Substate,
    key: &'static str,
    color: Option<&'static str>,
}

// Indexed by `Substate as usize`. Colours match the HackerOne report UI.
const SUBSTATE_TABLE: [SubstateRow; 10] = [
    SubstateRow { substate: Substate::New, key: "new", color: Some("#8e44ad") },
    SubstateRow { substate: Substate::Triaged, key: "triaged", color: Some("#e67e22") },
    SubstateRow { substate: Substate::NeedsMoreInfo, key: "needs-more-info", color: None },
    SubstateRow { substate: Substate::Resolved, key: "resolved", color: Some("#609828") },
    SubstateRow { substate: Substate::NotApplicable, key: "not-applicable", color: Some("#ce3f4b") },
    SubstateRow { substate: Substate::Informative, key: "informative", color: Some("#ccc") },
    SubstateRow { substate: Substate::Duplicate, key: "duplicate", color: Some("#a78260") },
    SubstateRow { substate: Substate::Spam, key: "spam", color: Some("#555") },
    SubstateRow { substate: Substate::PendingProgramReview, key: "pending-program-review", color: None },
    SubstateRow { substate: Substate::Retesting, key: "retesting", color: None },
];

impl Substate {
    pub fn key(self) -> &'static str {
        SUBSTATE_TABLE[self as usize].key
    }

    pub fn color(self) -> Option<&'static str> {
        SUBSTATE_TABLE[self as usize].color
    }
}

impl fmt::Display for Substate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Substate {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        let key = raw.trim().to_lowercase().replace('_', "-");
        match SUBSTATE_TABLE.iter().find(|row| row.key == key) {
            Some(row) => Ok(row.substate),
            None => bail!("unknown report substate: {raw}"),
        }
    }
}
