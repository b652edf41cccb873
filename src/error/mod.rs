//! Error taxonomy for ticketflow
//!
//! Every fallible operation in the core returns [`TicketflowError`], a single
//! enum with one variant per state domain (tickets, git, worktrees, config)
//! plus a handful of cross-cutting variants. Each domain variant carries a
//! sentinel `*Kind`, the subject it refers to, the underlying cause, and a
//! breadcrumb vector accumulated as the error crosses layer boundaries.
//!
//! Classification predicates ([`TicketflowError::is_not_found`],
//! [`TicketflowError::is_already_exists`]) recognize sentinels through the
//! cause chain, so callers never match on message strings.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TicketflowError>;

/// Sentinel kinds for the ticket store domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketErrorKind {
    NotFound,
    AlreadyExists,
    Invalid,
    AlreadyStarted,
    AlreadyClosed,
    NotDone,
    AmbiguousId,
}

impl std::fmt::Display for TicketErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotFound => "ticket not found",
            Self::AlreadyExists => "ticket already exists",
            Self::Invalid => "ticket is invalid",
            Self::AlreadyStarted => "ticket already started",
            Self::AlreadyClosed => "ticket already closed",
            Self::NotDone => "ticket is not done",
            Self::AmbiguousId => "ticket id prefix is ambiguous",
        };
        f.write_str(s)
    }
}

/// Sentinel kinds for the git domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitErrorKind {
    NotARepository,
    DirtyWorkspace,
    BranchExists,
    BranchNotFound,
    MergeFailed,
    PushFailed,
    CommandFailed,
}

impl std::fmt::Display for GitErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotARepository => "not a git repository",
            Self::DirtyWorkspace => "workspace has uncommitted changes",
            Self::BranchExists => "branch already exists",
            Self::BranchNotFound => "branch not found",
            Self::MergeFailed => "merge failed",
            Self::PushFailed => "push failed",
            Self::CommandFailed => "git command failed",
        };
        f.write_str(s)
    }
}

/// Sentinel kinds for the worktree domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorktreeErrorKind {
    Exists,
    NotFound,
    CreateFailed,
    RemoveFailed,
}

impl std::fmt::Display for WorktreeErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Exists => "worktree already exists",
            Self::NotFound => "worktree not found",
            Self::CreateFailed => "worktree creation failed",
            Self::RemoveFailed => "worktree removal failed",
        };
        f.write_str(s)
    }
}

/// Sentinel kinds for the configuration domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorKind {
    NotFound,
    Invalid,
}

impl std::fmt::Display for ConfigErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotFound => "configuration not found",
            Self::Invalid => "configuration is invalid",
        };
        f.write_str(s)
    }
}

type BoxedCause = Box<dyn std::error::Error + Send + Sync>;

/// The unified error type for ticketflow.
#[derive(Error, Debug)]
pub enum TicketflowError {
    #[error("{kind}: {id}")]
    Ticket {
        kind: TicketErrorKind,
        id: String,
        op: &'static str,
        #[source]
        source: Option<BoxedCause>,
        context: Vec<String>,
    },

    #[error("{kind} (git {op})")]
    Git {
        kind: GitErrorKind,
        op: String,
        subject: Option<String>,
        stderr: Option<String>,
        #[source]
        source: Option<BoxedCause>,
        context: Vec<String>,
    },

    #[error("{kind}")]
    Worktree {
        kind: WorktreeErrorKind,
        path: Option<PathBuf>,
        branch: Option<String>,
        #[source]
        source: Option<BoxedCause>,
        context: Vec<String>,
    },

    #[error("{kind}")]
    Config {
        kind: ConfigErrorKind,
        path: Option<PathBuf>,
        #[source]
        source: Option<BoxedCause>,
        context: Vec<String>,
    },

    #[error("permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("invalid context: {message}")]
    InvalidContext { message: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("{message}")]
    Other {
        message: String,
        #[source]
        source: Option<BoxedCause>,
        context: Vec<String>,
    },
}

impl TicketflowError {
    pub fn ticket(kind: TicketErrorKind, id: impl Into<String>, op: &'static str) -> Self {
        Self::Ticket {
            kind,
            id: id.into(),
            op,
            source: None,
            context: Vec::new(),
        }
    }

    pub fn ticket_not_found(id: impl Into<String>, op: &'static str) -> Self {
        Self::ticket(TicketErrorKind::NotFound, id, op)
    }

    pub fn ticket_exists(id: impl Into<String>, op: &'static str) -> Self {
        Self::ticket(TicketErrorKind::AlreadyExists, id, op)
    }

    pub fn ticket_invalid(
        id: impl Into<String>,
        op: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        Self::ticket(TicketErrorKind::Invalid, id, op).with_context(reason)
    }

    pub fn git(kind: GitErrorKind, op: impl Into<String>) -> Self {
        Self::Git {
            kind,
            op: op.into(),
            subject: None,
            stderr: None,
            source: None,
            context: Vec::new(),
        }
    }

    pub fn git_with_subject(
        kind: GitErrorKind,
        op: impl Into<String>,
        subject: impl Into<String>,
    ) -> Self {
        Self::Git {
            kind,
            op: op.into(),
            subject: Some(subject.into()),
            stderr: None,
            source: None,
            context: Vec::new(),
        }
    }

    pub fn worktree(kind: WorktreeErrorKind, path: Option<PathBuf>, branch: Option<String>) -> Self {
        Self::Worktree {
            kind,
            path,
            branch,
            source: None,
            context: Vec::new(),
        }
    }

    pub fn config(kind: ConfigErrorKind, path: Option<PathBuf>) -> Self {
        Self::Config {
            kind,
            path,
            source: None,
            context: Vec::new(),
        }
    }

    pub fn invalid_context(message: impl Into<String>) -> Self {
        Self::InvalidContext {
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
            source: None,
            context: Vec::new(),
        }
    }

    /// Wrap an I/O error together with the path it concerns, so the
    /// rendered failure always names its subject.
    pub fn io_at(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        let path = path.into();
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            return Self::PermissionDenied { path };
        }
        Self::Other {
            message: format!("io error at {}", path.display()),
            source: Some(Box::new(err)),
            context: Vec::new(),
        }
    }

    /// Attach an underlying cause.
    pub fn with_source(mut self, cause: impl Into<BoxedCause>) -> Self {
        match &mut self {
            Self::Ticket { source, .. }
            | Self::Git { source, .. }
            | Self::Worktree { source, .. }
            | Self::Config { source, .. }
            | Self::Other { source, .. } => *source = Some(cause.into()),
            Self::PermissionDenied { .. } | Self::InvalidContext { .. } | Self::Cancelled => {}
        }
        self
    }

    /// Attach the captured stderr of a failed git invocation.
    pub fn with_stderr(mut self, text: impl Into<String>) -> Self {
        if let Self::Git { stderr, .. } = &mut self {
            let text = text.into();
            if !text.trim().is_empty() {
                *stderr = Some(text.trim_end().to_string());
            }
        }
        self
    }

    /// Push a breadcrumb onto the context vector.
    pub fn with_context(mut self, note: impl Into<String>) -> Self {
        match &mut self {
            Self::Ticket { context, .. }
            | Self::Git { context, .. }
            | Self::Worktree { context, .. }
            | Self::Config { context, .. }
            | Self::Other { context, .. } => context.push(note.into()),
            Self::PermissionDenied { .. } | Self::InvalidContext { .. } | Self::Cancelled => {}
        }
        self
    }

    pub fn context(&self) -> &[String] {
        match self {
            Self::Ticket { context, .. }
            | Self::Git { context, .. }
            | Self::Worktree { context, .. }
            | Self::Config { context, .. }
            | Self::Other { context, .. } => context,
            _ => &[],
        }
    }

    fn classify(&self) -> Option<Classification> {
        match self {
            Self::Ticket { kind, .. } => match kind {
                TicketErrorKind::NotFound => Some(Classification::NotFound),
                TicketErrorKind::AlreadyExists | TicketErrorKind::AlreadyStarted => {
                    Some(Classification::AlreadyExists)
                }
                _ => None,
            },
            Self::Git { kind, .. } => match kind {
                GitErrorKind::BranchNotFound => Some(Classification::NotFound),
                GitErrorKind::BranchExists => Some(Classification::AlreadyExists),
                _ => None,
            },
            Self::Worktree { kind, .. } => match kind {
                WorktreeErrorKind::NotFound => Some(Classification::NotFound),
                WorktreeErrorKind::Exists => Some(Classification::AlreadyExists),
                _ => None,
            },
            Self::Config { kind, .. } => match kind {
                ConfigErrorKind::NotFound => Some(Classification::NotFound),
                ConfigErrorKind::Invalid => None,
            },
            _ => None,
        }
    }

    /// True when this error, or any error in its cause chain, is a
    /// "not found" sentinel.
    pub fn is_not_found(&self) -> bool {
        self.chain_classified_as(Classification::NotFound)
    }

    /// True when this error, or any error in its cause chain, is an
    /// "already exists" sentinel.
    pub fn is_already_exists(&self) -> bool {
        self.chain_classified_as(Classification::AlreadyExists)
    }

    fn chain_classified_as(&self, wanted: Classification) -> bool {
        if self.classify() == Some(wanted) {
            return true;
        }
        let mut cause = std::error::Error::source(self);
        while let Some(err) = cause {
            if let Some(inner) = err.downcast_ref::<TicketflowError>() {
                if inner.classify() == Some(wanted) {
                    return true;
                }
            }
            cause = err.source();
        }
        false
    }

    /// An actionable hint surfaced alongside classified failures.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::Ticket { kind, .. } => match kind {
                TicketErrorKind::NotFound | TicketErrorKind::AmbiguousId => {
                    Some("run `ticketflow list --status all` to see known tickets")
                }
                TicketErrorKind::AlreadyStarted => {
                    Some("run `ticketflow status` to inspect the active ticket")
                }
                TicketErrorKind::AlreadyClosed => {
                    Some("use `ticketflow restore <id>` to reopen a closed ticket")
                }
                _ => None,
            },
            Self::Git {
                kind: GitErrorKind::DirtyWorkspace,
                ..
            } => Some("commit or stash your changes first"),
            Self::Worktree {
                kind: WorktreeErrorKind::Exists,
                ..
            } => Some("run `ticketflow worktree list` to inspect existing worktrees"),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Classification {
    NotFound,
    AlreadyExists,
}

impl From<std::io::Error> for TicketflowError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            return Self::PermissionDenied {
                path: PathBuf::new(),
            };
        }
        Self::Other {
            message: "io error".to_string(),
            source: Some(Box::new(err)),
            context: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_predicate_matches_ticket_sentinel() {
        let err = TicketflowError::ticket_not_found("250101-120000-fix", "get");
        assert!(err.is_not_found());
        assert!(!err.is_already_exists());
    }

    #[test]
    fn already_exists_predicate_matches_git_branch() {
        let err = TicketflowError::git_with_subject(
            GitErrorKind::BranchExists,
            "branch",
            "250101-120000-fix",
        );
        assert!(err.is_already_exists());
        assert!(!err.is_not_found());
    }

    #[test]
    fn predicates_walk_the_cause_chain() {
        let inner = TicketflowError::ticket_not_found("250101-120000-fix", "find");
        let outer = TicketflowError::other("start failed").with_source(inner);
        assert!(outer.is_not_found());
    }

    #[test]
    fn context_accumulates_in_order() {
        let err = TicketflowError::ticket_invalid("x", "parse", "bad slug")
            .with_context("while creating ticket");
        assert_eq!(err.context(), ["bad slug", "while creating ticket"]);
    }

    #[test]
    fn ambiguous_id_is_distinct_from_not_found() {
        let err = TicketflowError::ticket(TicketErrorKind::AmbiguousId, "2501", "find");
        assert!(!err.is_not_found());
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn suggestion_for_closed_ticket_points_at_restore() {
        let err = TicketflowError::ticket(TicketErrorKind::AlreadyClosed, "abc", "start");
        assert_eq!(
            err.suggestion(),
            Some("use `ticketflow restore <id>` to reopen a closed ticket")
        );
    }

    #[test]
    fn permission_denied_io_error_maps_to_sentinel() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let err = TicketflowError::from(io);
        assert!(matches!(err, TicketflowError::PermissionDenied { .. }));
    }

    #[test]
    fn io_at_attaches_the_path() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let err = TicketflowError::io_at("/repo/current-ticket.md", io);
        match err {
            TicketflowError::PermissionDenied { path } => {
                assert_eq!(path, PathBuf::from("/repo/current-ticket.md"));
            }
            other => panic!("expected PermissionDenied, got {other:?}"),
        }

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err = TicketflowError::io_at("/repo/tickets/todo/x.md", io);
        assert!(err.to_string().contains("/repo/tickets/todo/x.md"));
    }
}
