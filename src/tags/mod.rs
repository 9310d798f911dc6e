//! Tag Audit
//!
//! Deterministic tag statistics across entity kinds: frequency per kind,
//! tags shared by every kind, tags found in only one kind, and naming
//! problems against the `category:value` lowercase convention. No provider
//! is involved; the unified prompt receives the result through
//! [`TagAudit::context_notes`].

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;
use std::sync::OnceLock;

use crate::types::{EntityKind, Record, Snapshot};

const TAG_FORMAT_PATTERN: &str = r"^[a-z0-9_\-:]+$";

/// How many tags a single context line lists before eliding the rest.
const MAX_TAGS_PER_NOTE: usize = 15;

#[allow(clippy::expect_used)]
fn tag_format() -> &'static Regex {
    static TAG_FORMAT: OnceLock<Regex> = OnceLock::new();
    TAG_FORMAT.get_or_init(|| Regex::new(TAG_FORMAT_PATTERN).expect("tag format pattern compiles"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingIssue {
    /// Contains uppercase letters
    Case,
    /// Characters outside `a-z 0-9 _ - :`
    Format,
    /// No `category:value` separator
    MissingColon,
}

impl NamingIssue {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Case => "case",
            Self::Format => "format",
            Self::MissingColon => "missing_colon",
        }
    }

    /// Every convention `tag` breaks.
    pub fn detect(tag: &str) -> Vec<Self> {
        let mut issues = Vec::new();
        if tag != tag.to_lowercase() {
            issues.push(Self::Case);
        }
        if !tag_format().is_match(tag) {
            issues.push(Self::Format);
        }
        if !tag.contains(':') {
            issues.push(Self::MissingColon);
        }
        issues
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TagAudit {
    /// Uses of each tag, per kind
    pub frequency: BTreeMap<EntityKind, BTreeMap<String, usize>>,
    /// Tags used by every audited kind (empty with fewer than two kinds)
    pub shared: BTreeSet<String>,
    /// Tags used by exactly one kind
    pub unique: BTreeMap<EntityKind, BTreeSet<String>>,
    pub naming_issues: BTreeMap<NamingIssue, BTreeSet<String>>,
}

impl TagAudit {
    /// Audit the `tags` field of every record. Unified snapshots are skipped.
    pub fn from_snapshots(snapshots: &[&Snapshot]) -> Self {
        let mut frequency: BTreeMap<EntityKind, BTreeMap<String, usize>> = BTreeMap::new();
        for snapshot in snapshots.iter().filter(|s| s.kind().is_constituent()) {
            let counts = frequency.entry(snapshot.kind()).or_default();
            for tag in snapshot.records().iter().flat_map(record_tags) {
                *counts.entry(tag).or_default() += 1;
            }
        }

        let sets: BTreeMap<EntityKind, BTreeSet<&String>> = frequency
            .iter()
            .map(|(kind, counts)| (*kind, counts.keys().collect()))
            .collect();

        let shared = if sets.len() >= 2 {
            let mut iter = sets.values();
            let first = iter.next().cloned().unwrap_or_default();
            iter.fold(first, |acc, set| acc.intersection(set).copied().collect())
                .into_iter()
                .cloned()
                .collect()
        } else {
            BTreeSet::new()
        };

        let unique = sets
            .iter()
            .map(|(kind, set)| {
                let only_here = set
                    .iter()
                    .filter(|tag| {
                        sets.iter()
                            .filter(|(other, _)| *other != kind)
                            .all(|(_, other_set)| !other_set.contains(*tag))
                    })
                    .map(|tag| (*tag).clone())
                    .collect();
                (*kind, only_here)
            })
            .collect();

        let mut naming_issues: BTreeMap<NamingIssue, BTreeSet<String>> = BTreeMap::new();
        for tag in sets.values().flatten() {
            for issue in NamingIssue::detect(tag) {
                naming_issues.entry(issue).or_default().insert((*tag).clone());
            }
        }

        Self {
            frequency,
            shared,
            unique,
            naming_issues,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.frequency.values().all(BTreeMap::is_empty)
    }

    /// Plain-language follow-ups, one per finding.
    pub fn recommendations(&self) -> Vec<String> {
        let mut recs = Vec::new();
        if !self.shared.is_empty() {
            recs.push(format!(
                "Consider consolidating tags used across every entity type: {}",
                join(&self.shared)
            ));
        }
        for (issue, tags) in &self.naming_issues {
            let advice = match issue {
                NamingIssue::Case => "Normalize tag case to lowercase",
                NamingIssue::Format => "Restrict tags to a-z, 0-9, _, - and :",
                NamingIssue::MissingColon => "Adopt a category:value format for tags",
            };
            recs.push(format!("{advice}: {}", join(tags)));
        }
        for (kind, tags) in self.unique.iter().filter(|(_, t)| !t.is_empty()) {
            recs.push(format!("Tags unique to {}: {}", kind.plural(), join(tags)));
        }
        if recs.is_empty() {
            recs.push("Tag usage is consistent and well-structured.".to_string());
        }
        recs
    }

    /// Short notes for the unified prompt's context section.
    ///
    /// Empty when no record carries tags.
    pub fn context_notes(&self) -> BTreeMap<String, String> {
        let mut notes = BTreeMap::new();
        if self.is_empty() {
            return notes;
        }

        let mut usage = String::new();
        for (kind, counts) in &self.frequency {
            if !usage.is_empty() {
                usage.push_str("; ");
            }
            let uses: usize = counts.values().sum();
            let _ = write!(usage, "{}: {} distinct, {uses} uses", kind.plural(), counts.len());
        }
        notes.insert("tag_usage".to_string(), usage);

        if !self.shared.is_empty() {
            notes.insert("shared_tags".to_string(), join(&self.shared));
        }

        if !self.naming_issues.is_empty() {
            let issues = self
                .naming_issues
                .iter()
                .map(|(issue, tags)| format!("{} [{}]", issue.as_str(), join(tags)))
                .collect::<Vec<_>>()
                .join("; ");
            notes.insert("tag_naming_issues".to_string(), issues);
        }

        let specific = self
            .unique
            .iter()
            .filter(|(_, tags)| !tags.is_empty())
            .map(|(kind, tags)| format!("{} [{}]", kind.plural(), join(tags)))
            .collect::<Vec<_>>();
        if !specific.is_empty() {
            notes.insert("kind_specific_tags".to_string(), specific.join("; "));
        }

        notes
    }
}

/// Tags of one record: strings, or objects carrying a `name`.
fn record_tags(record: &Record) -> Vec<String> {
    record
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(|tag| match tag {
                    Value::String(s) => Some(s.as_str()),
                    Value::Object(o) => o.get("name").and_then(Value::as_str),
                    _ => None,
                })
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn join(tags: &BTreeSet<String>) -> String {
    let mut out = tags
        .iter()
        .take(MAX_TAGS_PER_NOTE)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if tags.len() > MAX_TAGS_PER_NOTE {
        let _ = write!(out, " (+{} more)", tags.len() - MAX_TAGS_PER_NOTE);
    }
    out
}
