use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};

use crate::disclosure::{Bounty, Disclosure, Severity};
use crate::notify::{Attachment, Field, Payload};

pub const FOOTER: &str = "HackerOne Disclosure Bot";

pub const DEFAULT_FOOTER_ICON: &str = "https://profile-photos.hackerone-user-content.com/variants/000/000/013/fa942b9b1cbf4faf37482bf68458e1195aab9c02_original.png/0621f211aae8984f02f017decf83d0064fe91a6a16b11f840ecf5b53ddb7b872";

/// How a report with several bounty awards is summarised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BountyMode {
    /// Sum every award paid in the first award's currency.
    #[default]
    Total,
    /// Only the first award.
    First,
}

impl fmt::Display for BountyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BountyMode::Total => write!(f, "total"),
            BountyMode::First => write!(f, "first"),
        }
    }
}

impl FromStr for BountyMode {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw {
            "total" => Ok(BountyMode::Total),
            "first" => Ok(BountyMode::First),
            other => bail!("unknown bounty mode: {other} (valid: total, first)"),
        }
    }
}

/// Renders disclosures into webhook payloads.
#[derive(Debug, Clone)]
pub struct Formatter {
    footer_icon: String,
    bounty_mode: BountyMode,
}

impl Default for Formatter {
    fn default() -> Self {
        Self::new(DEFAULT_FOOTER_ICON, BountyMode::default())
    }
}

impl Formatter {
    pub fn new(footer_icon: impl Into<String>, bounty_mode: BountyMode) -> Self {
        Self {
            footer_icon: footer_icon.into(),
            bounty_mode,
        }
    }

    pub fn render(&self, disclosure: &Disclosure) -> Payload {
        let reporter = &disclosure.reporter;
        let author_name = match reporter.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => format!("{name} ({})", reporter.username),
            _ => reporter.username.clone(),
        };

        let mut fields = Vec::new();
        let mut fallback = format!("\"{}\" - {}", disclosure.title, disclosure.url);

        let severity = disclosure.severity.filter(|s| *s != Severity::None);
        if let Some(severity) = severity {
            fallback.push_str(&format!(" - {}", severity.label()));
            fields.push(Field::short("Severity", severity.label()));
        }

        if let Some(bounty) = summarize_bounties(&disclosure.bounties, self.bounty_mode) {
            fallback.push_str(&format!(" - {bounty}"));
            fields.push(Field::short("Bounty", bounty.to_string()));
        }

        let attachment = Attachment {
            author_name,
            author_link: reporter.url.clone(),
            author_icon: reporter.profile_picture.clone(),
            title: disclosure.to_string(),
            title_link: disclosure.url.clone(),
            color: color_for(disclosure).map(str::to_string),
            fields,
            footer: FOOTER.to_string(),
            footer_icon: self.footer_icon.clone(),
            fallback,
            mrkdwn_in: vec!["text".to_string(), "pretext".to_string()],
            timestamp: disclosure.disclosed_at.map(|t| t.timestamp()),
        };

        Payload {
            username: format!("{} disclosed", disclosure.team.name),
            icon_url: disclosure.team.profile_picture.clone(),
            attachments: vec![attachment],
        }
    }
}

/// Substate colour when the substate has one, otherwise the severity colour.
///
/// The substate wins even over a critical severity: a resolved report is
/// green whatever its rating. Severity colours only show for substates
/// without a palette entry or when there is no substate.
fn color_for(disclosure: &Disclosure) -> Option<&'static str> {
    disclosure
        .substate
        .and_then(|s| s.color())
        .or_else(|| disclosure.severity.map(Severity::color))
}

fn summarize_bounties(bounties: &[Bounty], mode: BountyMode) -> Option<Bounty> {
    let first = bounties.first()?;
    match mode {
        BountyMode::First => Some(first.clone()),
        BountyMode::Total => {
            let amount: f64 = bounties
                .iter()
                .filter(|b| b.currency == first.currency)
                .map(|b| b.amount)
                .sum();
            Some(Bounty::new(amount, first.currency.clone()))
        }
    }
}
