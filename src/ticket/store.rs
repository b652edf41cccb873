//! Directory-partitioned ticket store
//!
//! The store exclusively owns the files under `todo/`, `doing/` and `done/`.
//! Writes are atomic (temp file in the destination directory, fsync, chmod,
//! rename); enumeration treats missing directories as empty and reads files
//! with bounded parallelism, collecting results into a deterministic order
//! once all reads complete.

use chrono::{Timelike, Utc};
use futures::stream::{self, StreamExt};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::frontmatter::{self, RawTicket};
use super::{validate_slug, Status, StatusFilter, Ticket, TicketId};
use crate::config::Config;
use crate::error::{Result, TicketErrorKind, TicketflowError};

/// Upper bound on concurrent file reads during enumeration.
const ENUMERATION_WORKERS: usize = 8;

/// Result of an enumeration: parsed tickets plus per-file diagnostics for
/// entries that could not be parsed or whose directory disagrees with their
/// timestamps. Diagnostics are surfaced, never silently repaired.
#[derive(Debug, Default)]
pub struct ListOutcome {
    pub tickets: Vec<Ticket>,
    pub diagnostics: Vec<TicketDiagnostic>,
}

#[derive(Debug, Clone)]
pub struct TicketDiagnostic {
    pub path: PathBuf,
    pub message: String,
}

pub struct TicketStore {
    todo_dir: PathBuf,
    doing_dir: PathBuf,
    done_dir: PathBuf,
    template: String,
    cancel: CancellationToken,
}

impl TicketStore {
    pub fn new(config: &Config, project_root: &Path, cancel: CancellationToken) -> Self {
        Self {
            todo_dir: config.todo_path(project_root),
            doing_dir: config.doing_path(project_root),
            done_dir: config.done_path(project_root),
            template: config.tickets.template.clone(),
            cancel,
        }
    }

    pub fn dir_for(&self, status: Status) -> &Path {
        match status {
            Status::Todo => &self.todo_dir,
            Status::Doing => &self.doing_dir,
            Status::Done => &self.done_dir,
        }
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(TicketflowError::Cancelled);
        }
        Ok(())
    }

    /// Create a new ticket in `todo/` from a slug.
    ///
    /// Rejects ids that collide with an existing ticket, including
    /// prefix-of relationships in either direction, so that prefix lookup
    /// stays unambiguous.
    pub async fn create(&self, slug: &str) -> Result<Ticket> {
        validate_slug(slug)?;
        let now = Utc::now().with_nanosecond(0).unwrap_or_else(Utc::now);
        let id = TicketId::generate(now, slug)?;

        for status in StatusFilter::All.statuses() {
            for existing in self.enumerate_ids(*status).await? {
                if existing == *id.as_str()
                    || existing.starts_with(id.as_str())
                    || id.as_str().starts_with(&existing)
                {
                    return Err(TicketflowError::ticket_exists(id.as_str(), "create")
                        .with_context(format!("collides with existing ticket {existing}")));
                }
            }
        }

        let path = self.todo_dir.join(id.filename());
        // created_at matches the id timestamp's whole-second resolution.
        let ticket = Ticket::new(id, path, now, self.template.clone());

        tokio::fs::create_dir_all(&self.todo_dir).await?;
        self.write_ticket(&ticket).await?;
        debug!("created ticket {} at {}", ticket.id, ticket.path.display());
        Ok(ticket)
    }

    /// Exact-id lookup, searching `todo → doing → done`.
    pub async fn get(&self, id: &TicketId) -> Result<Ticket> {
        for status in StatusFilter::All.statuses() {
            let path = self.dir_for(*status).join(id.filename());
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return self.load(&path, *status).await;
            }
        }
        Err(TicketflowError::ticket_not_found(id.as_str(), "get"))
    }

    /// Lookup by exact id or unique prefix across all three directories.
    pub async fn find(&self, id_or_prefix: &str) -> Result<Ticket> {
        let mut matches: Vec<(String, Status)> = Vec::new();
        for status in StatusFilter::All.statuses() {
            for existing in self.enumerate_ids(*status).await? {
                if existing == id_or_prefix {
                    // Exact hit wins outright, in search order.
                    let path = self.dir_for(*status).join(format!("{existing}.md"));
                    return self.load(&path, *status).await;
                }
                if existing.starts_with(id_or_prefix) {
                    matches.push((existing, *status));
                }
            }
        }

        match matches.len() {
            0 => Err(TicketflowError::ticket_not_found(id_or_prefix, "find")),
            1 => {
                let (id, status) = matches.remove(0);
                let path = self.dir_for(status).join(format!("{id}.md"));
                self.load(&path, status).await
            }
            n => Err(
                TicketflowError::ticket(TicketErrorKind::AmbiguousId, id_or_prefix, "find")
                    .with_context(format!(
                        "{n} tickets match: {}",
                        matches
                            .iter()
                            .map(|(id, _)| id.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    )),
            ),
        }
    }

    /// Enumerate tickets matching the filter.
    ///
    /// Sort is stable: priority ascending, then `created_at` descending,
    /// then id as a final tie-break. Unparseable files and
    /// directory/timestamp disagreements are reported as diagnostics.
    pub async fn list(&self, filter: StatusFilter) -> Result<ListOutcome> {
        let mut work = Vec::new();
        for status in filter.statuses() {
            for path in self.enumerate_paths(*status).await? {
                work.push((path, *status));
            }
        }

        let loads = stream::iter(work.into_iter().map(|(path, status)| async move {
            let loaded = self.load(&path, status).await;
            (path, status, loaded)
        }))
        .buffer_unordered(ENUMERATION_WORKERS)
        .collect::<Vec<_>>()
        .await;

        let mut outcome = ListOutcome::default();
        for (path, status, loaded) in loads {
            match loaded {
                Ok(ticket) => {
                    if ticket.status_from_timestamps() != status {
                        outcome.diagnostics.push(TicketDiagnostic {
                            path: path.clone(),
                            message: format!(
                                "ticket is in {status}/ but its timestamps say {}",
                                ticket.status_from_timestamps()
                            ),
                        });
                    }
                    outcome.tickets.push(ticket);
                }
                Err(TicketflowError::Cancelled) => return Err(TicketflowError::Cancelled),
                Err(err) => outcome.diagnostics.push(TicketDiagnostic {
                    path,
                    message: err.to_string(),
                }),
            }
        }

        outcome.tickets.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(b.created_at.cmp(&a.created_at))
                .then(a.id.cmp(&b.id))
        });
        outcome
            .diagnostics
            .sort_by(|a, b| a.path.cmp(&b.path));
        Ok(outcome)
    }

    /// Serialize the record back to its stored path, atomically.
    pub async fn update(&self, ticket: &Ticket) -> Result<()> {
        ticket.validate()?;
        self.write_ticket(ticket).await
    }

    pub async fn read_content(&self, id: &TicketId) -> Result<String> {
        Ok(self.get(id).await?.content)
    }

    /// Replace only the Markdown body, preserving front matter.
    pub async fn write_content(&self, id: &TicketId, content: &str) -> Result<()> {
        let mut ticket = self.get(id).await?;
        ticket.content = content.to_string();
        self.update(&ticket).await
    }

    /// Rename the backing file into another status directory and update the
    /// record in place. The caller (the lifecycle engine) is responsible
    /// for writing timestamps first and committing afterwards.
    pub async fn move_to(&self, ticket: &mut Ticket, to: Status) -> Result<()> {
        self.check_cancelled()?;
        let target_dir = self.dir_for(to);
        tokio::fs::create_dir_all(target_dir).await?;
        let target = target_dir.join(ticket.id.filename());
        tokio::fs::rename(&ticket.path, &target)
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    TicketflowError::ticket_not_found(ticket.id.as_str(), "move")
                        .with_context(format!("{} is gone", ticket.path.display()))
                } else {
                    TicketflowError::from(e)
                }
            })?;
        debug!(
            "moved ticket {} {} -> {}",
            ticket.id,
            ticket.status,
            to
        );
        ticket.path = target;
        ticket.status = to;
        Ok(())
    }

    async fn load(&self, path: &Path, status: Status) -> Result<Ticket> {
        self.check_cancelled()?;
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let id = TicketId::parse(stem)?;

        let text = tokio::fs::read_to_string(path).await?;
        let raw = frontmatter::parse(&text).map_err(|e| {
            TicketflowError::ticket(TicketErrorKind::Invalid, id.as_str(), "parse").with_source(e)
        })?;

        Ok(Ticket {
            id,
            path: path.to_path_buf(),
            status,
            priority: raw.priority,
            description: raw.description,
            created_at: raw.created_at,
            started_at: raw.started_at,
            closed_at: raw.closed_at,
            related: raw.related,
            content: raw.content,
            extra: raw.extra,
        })
    }

    async fn enumerate_paths(&self, status: Status) -> Result<Vec<PathBuf>> {
        let dir = self.dir_for(status);
        let mut reader = match tokio::fs::read_dir(dir).await {
            Ok(reader) => reader,
            // A missing status directory is an empty one.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut paths = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("md") {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    async fn enumerate_ids(&self, status: Status) -> Result<Vec<String>> {
        Ok(self
            .enumerate_paths(status)
            .await?
            .iter()
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect())
    }

    async fn write_ticket(&self, ticket: &Ticket) -> Result<()> {
        let raw = RawTicket {
            priority: ticket.priority,
            description: ticket.description.clone(),
            created_at: ticket.created_at,
            started_at: ticket.started_at,
            closed_at: ticket.closed_at,
            related: ticket.related.clone(),
            content: ticket.content.clone(),
            extra: ticket.extra.clone(),
        };
        let text = frontmatter::serialize(&raw);
        self.write_atomic(&ticket.path, text.as_bytes())
    }

    /// Temp file in the destination directory, fsync, chmod, rename.
    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        self.check_cancelled()?;
        let dir = path
            .parent()
            .ok_or_else(|| TicketflowError::other(format!("no parent for {}", path.display())))?;

        let io_at = |e| TicketflowError::io_at(path, e);
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_at)?;
        tmp.write_all(bytes).map_err(io_at)?;
        tmp.as_file().sync_all().map_err(io_at)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o644))
                .map_err(io_at)?;
        }
        self.check_cancelled()?;
        tmp.persist(path)
            .map_err(|e| TicketflowError::io_at(path, e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::TempDir;

    fn store(root: &Path) -> TicketStore {
        TicketStore::new(&Config::default(), root, CancellationToken::new())
    }

    #[tokio::test]
    async fn create_places_ticket_in_todo() {
        let dir = TempDir::new().unwrap();
        let store = store(dir.path());

        let ticket = store.create("add-tests").await.unwrap();
        assert_eq!(ticket.status, Status::Todo);
        assert!(ticket.id.as_str().ends_with("-add-tests"));
        assert!(ticket.path.starts_with(dir.path().join("tickets/todo")));
        assert!(ticket.path.exists());
    }

    #[tokio::test]
    async fn create_rejects_invalid_slug() {
        let dir = TempDir::new().unwrap();
        let store = store(dir.path());
        assert!(store.create("Bad Slug").await.is_err());
    }

    #[tokio::test]
    async fn get_and_find_resolve_exact_and_prefix() {
        let dir = TempDir::new().unwrap();
        let store = store(dir.path());
        let created = store.create("fix-parser").await.unwrap();

        let by_id = store.get(&created.id).await.unwrap();
        assert_eq!(by_id.id, created.id);

        // Property: a unique prefix finds the same ticket as the full id.
        let prefix = &created.id.as_str()[..10];
        let by_prefix = store.find(prefix).await.unwrap();
        assert_eq!(by_prefix.id, created.id);

        let err = store.find("zzzzzz").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn ambiguous_prefix_is_a_distinct_error() {
        let dir = TempDir::new().unwrap();
        let store = store(dir.path());

        // Same timestamp prefix, different slugs: share the first 14 chars.
        let a = store.create("alpha").await.unwrap();
        let mut b = a.clone();
        b.id = TicketId::parse(&a.id.as_str().replace("alpha", "beta")).unwrap();
        b.path = store.dir_for(Status::Todo).join(b.id.filename());
        store.update(&b).await.unwrap();

        let err = store.find(&a.id.as_str()[..6]).await.unwrap_err();
        assert!(matches!(
            err,
            TicketflowError::Ticket {
                kind: TicketErrorKind::AmbiguousId,
                ..
            }
        ));
        assert!(!err.is_not_found());
    }

    #[tokio::test]
    async fn list_sorts_by_priority_then_created_at_desc() {
        let dir = TempDir::new().unwrap();
        let store = store(dir.path());

        let mut old_low = store.create("old-low").await.unwrap();
        old_low.priority = 1;
        old_low.created_at = old_low.created_at - chrono::Duration::hours(2);
        store.update(&old_low).await.unwrap();

        let mut new_low = store.create("new-low").await.unwrap();
        new_low.priority = 1;
        store.update(&new_low).await.unwrap();

        let mut high = store.create("high").await.unwrap();
        high.priority = 3;
        store.update(&high).await.unwrap();

        let outcome = store.list(StatusFilter::All).await.unwrap();
        let slugs: Vec<&str> = outcome.tickets.iter().map(|t| t.id.slug()).collect();
        assert_eq!(slugs, ["new-low", "old-low", "high"]);
        assert!(outcome.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn list_missing_directories_are_empty() {
        let dir = TempDir::new().unwrap();
        let store = store(dir.path());
        let outcome = store.list(StatusFilter::All).await.unwrap();
        assert!(outcome.tickets.is_empty());
        assert!(outcome.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn corrupt_front_matter_becomes_a_diagnostic_not_an_abort() {
        let dir = TempDir::new().unwrap();
        let store = store(dir.path());
        store.create("good").await.unwrap();

        let bad = store
            .dir_for(Status::Todo)
            .join("250101-120000-broken.md");
        std::fs::write(&bad, "---\npriority: [unclosed\n---\nbody").unwrap();

        let outcome = store.list(StatusFilter::All).await.unwrap();
        assert_eq!(outcome.tickets.len(), 1);
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(outcome.diagnostics[0].path, bad);
    }

    #[tokio::test]
    async fn location_timestamp_disagreement_is_reported_not_migrated() {
        let dir = TempDir::new().unwrap();
        let store = store(dir.path());
        let mut ticket = store.create("confused").await.unwrap();

        // Stamp started_at while the file stays in todo/.
        ticket.started_at = Some(ticket.created_at + chrono::Duration::minutes(1));
        store.update(&ticket).await.unwrap();

        let outcome = store.list(StatusFilter::All).await.unwrap();
        assert_eq!(outcome.tickets.len(), 1);
        assert_eq!(outcome.tickets[0].status, Status::Todo);
        assert_eq!(outcome.diagnostics.len(), 1);
        assert!(outcome.diagnostics[0].message.contains("todo/"));
    }

    #[tokio::test]
    async fn update_round_trip_is_byte_stable() {
        let dir = TempDir::new().unwrap();
        let store = store(dir.path());
        let ticket = store.create("stable").await.unwrap();

        let before = std::fs::read_to_string(&ticket.path).unwrap();
        let loaded = store.get(&ticket.id).await.unwrap();
        store.update(&loaded).await.unwrap();
        let after = std::fs::read_to_string(&ticket.path).unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn content_io_replaces_only_the_body() {
        let dir = TempDir::new().unwrap();
        let store = store(dir.path());
        let ticket = store.create("noted").await.unwrap();

        store
            .write_content(&ticket.id, "\n# Notes\n\nreplaced body\n")
            .await
            .unwrap();

        let content = store.read_content(&ticket.id).await.unwrap();
        assert_eq!(content, "\n# Notes\n\nreplaced body\n");

        // Front matter is untouched by a body replacement.
        let reloaded = store.get(&ticket.id).await.unwrap();
        assert_eq!(reloaded.created_at, ticket.created_at);
        assert_eq!(reloaded.priority, ticket.priority);
    }

    #[tokio::test]
    async fn move_to_renames_between_status_directories() {
        let dir = TempDir::new().unwrap();
        let store = store(dir.path());
        let mut ticket = store.create("movable").await.unwrap();
        let old_path = ticket.path.clone();

        store.move_to(&mut ticket, Status::Doing).await.unwrap();
        assert!(!old_path.exists());
        assert!(ticket.path.exists());
        assert_eq!(ticket.status, Status::Doing);
        assert!(ticket.path.starts_with(dir.path().join("tickets/doing")));
    }

    #[tokio::test]
    async fn move_of_a_vanished_file_reports_not_found() {
        let dir = TempDir::new().unwrap();
        let store = store(dir.path());
        let mut ticket = store.create("racer").await.unwrap();

        // Simulate the losing side of a concurrent start race.
        std::fs::remove_file(&ticket.path).unwrap();
        let err = store.move_to(&mut ticket, Status::Doing).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits_io() {
        let dir = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        let store = TicketStore::new(&Config::default(), dir.path(), cancel.clone());
        cancel.cancel();
        let err = store.create("too-late").await.unwrap_err();
        assert!(matches!(err, TicketflowError::Cancelled));
    }
}
