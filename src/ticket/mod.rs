//! Ticket model
//!
//! A ticket is a Markdown document with a YAML front-matter prelude, stored
//! in one of three status directories. The directory is the source of truth
//! for status; the timestamps in the front matter are advisory metadata and
//! a disagreement between the two is a diagnostic, never something to fix
//! silently.

pub mod frontmatter;
pub mod store;

pub use store::{ListOutcome, TicketDiagnostic, TicketStore};

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Result, TicketflowError};

pub const DEFAULT_PRIORITY: u32 = 2;
pub const MAX_PRIORITY: u32 = 99;
pub const MAX_SLUG_LEN: usize = 64;

static SLUG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]*$").unwrap());
static ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{6}-\d{6}-[a-z0-9][a-z0-9-]*$").unwrap());

/// Validate a user-supplied slug.
pub fn validate_slug(slug: &str) -> Result<()> {
    if slug.is_empty() || slug.len() > MAX_SLUG_LEN {
        return Err(TicketflowError::ticket_invalid(
            slug,
            "validate-slug",
            format!("slug must be 1..={MAX_SLUG_LEN} characters"),
        ));
    }
    if !SLUG_RE.is_match(slug) {
        return Err(TicketflowError::ticket_invalid(
            slug,
            "validate-slug",
            "slug must match [a-z0-9][a-z0-9-]*",
        ));
    }
    Ok(())
}

/// Ticket identifier: `YYMMDD-HHMMSS-<slug>`, UTC timestamp.
///
/// The id is derived from the filename and never stored in the front
/// matter; the filename is canonical.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(String);

impl TicketId {
    pub fn generate(now: DateTime<Utc>, slug: &str) -> Result<Self> {
        validate_slug(slug)?;
        Ok(Self(format!("{}-{slug}", now.format("%y%m%d-%H%M%S"))))
    }

    pub fn parse(s: &str) -> Result<Self> {
        if !ID_RE.is_match(s) {
            return Err(TicketflowError::ticket_invalid(
                s,
                "parse-id",
                "id must match YYMMDD-HHMMSS-<slug>",
            ));
        }
        Ok(Self(s.to_string()))
    }

    /// Whether a string is shaped like a ticket id. Used to pick ticket
    /// branches out of `git branch --list` output.
    pub fn looks_like(s: &str) -> bool {
        ID_RE.is_match(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The slug portion after the timestamp prefix.
    pub fn slug(&self) -> &str {
        &self.0[14..]
    }

    pub fn filename(&self) -> String {
        format!("{}.md", self.0)
    }
}

impl std::fmt::Display for TicketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ticket status, determined by the parent directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Todo,
    Doing,
    Done,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::Doing => "doing",
            Self::Done => "done",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filter for ticket enumeration. `Active` is todo ∪ doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    Todo,
    Doing,
    Done,
    Active,
    All,
}

impl StatusFilter {
    pub fn statuses(&self) -> &'static [Status] {
        match self {
            Self::Todo => &[Status::Todo],
            Self::Doing => &[Status::Doing],
            Self::Done => &[Status::Done],
            Self::Active => &[Status::Todo, Status::Doing],
            Self::All => &[Status::Todo, Status::Doing, Status::Done],
        }
    }
}

/// Tagged reference to another ticket (or free-form related note).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relation {
    Parent(String),
    ParentOf(String),
    Related(String),
}

impl Relation {
    pub fn parse(s: &str) -> Self {
        if let Some(id) = s.strip_prefix("parent:") {
            Self::Parent(id.to_string())
        } else if let Some(id) = s.strip_prefix("parent-of:") {
            Self::ParentOf(id.to_string())
        } else {
            Self::Related(s.to_string())
        }
    }
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parent(id) => write!(f, "parent:{id}"),
            Self::ParentOf(id) => write!(f, "parent-of:{id}"),
            Self::Related(s) => f.write_str(s),
        }
    }
}

/// In-memory ticket record.
#[derive(Debug, Clone)]
pub struct Ticket {
    pub id: TicketId,
    /// Absolute path of the backing file.
    pub path: PathBuf,
    /// Status derived from the containing directory.
    pub status: Status,
    pub priority: u32,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub related: Vec<Relation>,
    /// Markdown body after the closing front-matter fence.
    pub content: String,
    /// Unknown front-matter keys, preserved in order for round-trip.
    pub(crate) extra: serde_yaml::Mapping,
}

impl Ticket {
    pub fn new(id: TicketId, path: PathBuf, created_at: DateTime<Utc>, content: String) -> Self {
        Self {
            id,
            path,
            status: Status::Todo,
            priority: DEFAULT_PRIORITY,
            description: String::new(),
            created_at,
            started_at: None,
            closed_at: None,
            related: Vec::new(),
            content,
            extra: serde_yaml::Mapping::new(),
        }
    }

    /// The status the timestamps claim, independent of the directory.
    pub fn status_from_timestamps(&self) -> Status {
        match (self.started_at, self.closed_at) {
            (None, _) => Status::Todo,
            (Some(_), None) => Status::Doing,
            (Some(_), Some(_)) => Status::Done,
        }
    }

    /// The parent ticket id, if any.
    pub fn parent(&self) -> Option<&str> {
        self.related.iter().find_map(|r| match r {
            Relation::Parent(id) => Some(id.as_str()),
            _ => None,
        })
    }

    /// Record a parent link; a ticket has at most one parent.
    pub fn set_parent(&mut self, parent_id: &str) -> Result<()> {
        if self.parent().is_some() {
            return Err(TicketflowError::ticket_invalid(
                self.id.as_str(),
                "set-parent",
                "ticket already has a parent",
            ));
        }
        self.related.push(Relation::Parent(parent_id.to_string()));
        Ok(())
    }

    /// Field-level consistency: priority range, timestamp ordering, at most
    /// one parent relation.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| {
            TicketflowError::ticket_invalid(self.id.as_str(), "validate", reason)
        };
        if self.priority < 1 || self.priority > MAX_PRIORITY {
            return Err(invalid(format!(
                "priority {} outside 1..={MAX_PRIORITY}",
                self.priority
            )));
        }
        if let Some(started) = self.started_at {
            if started < self.created_at {
                return Err(invalid("started_at precedes created_at".to_string()));
            }
            if let Some(closed) = self.closed_at {
                if closed < started {
                    return Err(invalid("closed_at precedes started_at".to_string()));
                }
            }
        } else if self.closed_at.is_some() {
            return Err(invalid("closed_at set without started_at".to_string()));
        }
        let parents = self
            .related
            .iter()
            .filter(|r| matches!(r, Relation::Parent(_)))
            .count();
        if parents > 1 {
            return Err(invalid(format!("{parents} parent relations, at most 1 allowed")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, secs).unwrap()
    }

    #[test]
    fn id_generation_uses_utc_timestamp() {
        let id = TicketId::generate(ts(0), "add-tests").unwrap();
        assert_eq!(id.as_str(), "250101-120000-add-tests");
        assert_eq!(id.slug(), "add-tests");
        assert_eq!(id.filename(), "250101-120000-add-tests.md");
    }

    #[test]
    fn slug_validation_rejects_bad_shapes() {
        assert!(validate_slug("add-tests").is_ok());
        assert!(validate_slug("a").is_ok());
        assert!(validate_slug("").is_err());
        assert!(validate_slug("-leading-dash").is_err());
        assert!(validate_slug("Upper").is_err());
        assert!(validate_slug("has_underscore").is_err());
        assert!(validate_slug(&"x".repeat(MAX_SLUG_LEN + 1)).is_err());
    }

    #[test]
    fn id_parse_round_trips() {
        let id = TicketId::parse("250101-120000-fix-bug").unwrap();
        assert_eq!(id.to_string(), "250101-120000-fix-bug");
        assert!(TicketId::parse("main").is_err());
        assert!(TicketId::parse("250101-fix").is_err());
        assert!(TicketId::looks_like("250101-120000-fix"));
        assert!(!TicketId::looks_like("feature/fix"));
    }

    #[test]
    fn status_from_timestamps_is_a_closed_sum() {
        let id = TicketId::generate(ts(0), "x").unwrap();
        let mut ticket = Ticket::new(id, PathBuf::from("/t/x.md"), ts(0), String::new());
        assert_eq!(ticket.status_from_timestamps(), Status::Todo);
        ticket.started_at = Some(ts(1));
        assert_eq!(ticket.status_from_timestamps(), Status::Doing);
        ticket.closed_at = Some(ts(2));
        assert_eq!(ticket.status_from_timestamps(), Status::Done);
    }

    #[test]
    fn validate_enforces_timestamp_ordering() {
        let id = TicketId::generate(ts(5), "x").unwrap();
        let mut ticket = Ticket::new(id, PathBuf::from("/t/x.md"), ts(5), String::new());
        assert!(ticket.validate().is_ok());

        ticket.started_at = Some(ts(1));
        assert!(ticket.validate().is_err());

        ticket.started_at = Some(ts(6));
        ticket.closed_at = Some(ts(3));
        assert!(ticket.validate().is_err());

        ticket.closed_at = Some(ts(9));
        assert!(ticket.validate().is_ok());
    }

    #[test]
    fn at_most_one_parent() {
        let id = TicketId::generate(ts(0), "child").unwrap();
        let mut ticket = Ticket::new(id, PathBuf::from("/t/c.md"), ts(0), String::new());
        ticket.set_parent("250101-110000-parent").unwrap();
        assert!(ticket.set_parent("250101-110001-other").is_err());
        assert_eq!(ticket.parent(), Some("250101-110000-parent"));
    }

    #[test]
    fn relation_tags_round_trip() {
        for raw in ["parent:250101-120000-a", "parent-of:250101-120000-b", "see docs"] {
            assert_eq!(Relation::parse(raw).to_string(), raw);
        }
    }

    #[test]
    fn active_filter_unions_todo_and_doing() {
        assert_eq!(
            StatusFilter::Active.statuses(),
            &[Status::Todo, Status::Doing]
        );
        assert_eq!(StatusFilter::All.statuses().len(), 3);
    }
}
