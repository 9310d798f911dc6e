//! Entity kinds and raw records

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A raw entity record as handed over by the platform client or query runner.
///
/// Field sets differ per kind (a campaign has `subject_line` and `metrics`,
/// a flow has `trigger_type` and `structure`, ...). The orchestration core
/// never interprets fields beyond the sampling sort key and the tag audit.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Which marketing entity an analysis pass is about.
///
/// Selects the prompt brief, the output schema and the sampling sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Campaign,
    Flow,
    List,
    /// Cross-entity pass over two or more of the other kinds
    Unified,
}

impl EntityKind {
    /// The three kinds that can be built from raw records.
    pub const CONSTITUENTS: [Self; 3] = [Self::Campaign, Self::Flow, Self::List];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Campaign => "campaign",
            Self::Flow => "flow",
            Self::List => "list",
            Self::Unified => "unified",
        }
    }

    /// Plural noun used in prompts and log lines ("3 campaigns").
    pub const fn plural(self) -> &'static str {
        match self {
            Self::Campaign => "campaigns",
            Self::Flow => "flows",
            Self::List => "lists",
            Self::Unified => "entities",
        }
    }

    /// Record field used to order records when sampling, most recent first.
    pub const fn recency_field(self) -> Option<&'static str> {
        match self {
            Self::Campaign => Some("send_time"),
            Self::Flow | Self::List => Some("updated"),
            Self::Unified => None,
        }
    }

    pub const fn is_constituent(self) -> bool {
        !matches!(self, Self::Unified)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "campaign" | "campaigns" => Ok(Self::Campaign),
            "flow" | "flows" => Ok(Self::Flow),
            "list" | "lists" => Ok(Self::List),
            "unified" => Ok(Self::Unified),
            other => Err(format!(
                "unknown entity kind '{other}' (expected campaign, flow, list or unified)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_singular_and_plural_names() {
        assert_eq!("campaigns".parse::<EntityKind>(), Ok(EntityKind::Campaign));
        assert_eq!(" Flow ".parse::<EntityKind>(), Ok(EntityKind::Flow));
        assert_eq!("lists".parse::<EntityKind>(), Ok(EntityKind::List));
        assert!("segments".parse::<EntityKind>().is_err());
    }

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&EntityKind::Unified).unwrap();
        assert_eq!(json, "\"unified\"");
    }
}
