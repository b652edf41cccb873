//! Lifecycle engine
//!
//! Each verb is a short transaction over the three state domains: the
//! ticket store, the git repository, and the worktree set. Preconditions
//! are checked up front, writes are sequenced so the most recoverable step
//! happens last (ticket file → git index → worktree), and partial failures
//! run compensating actions rather than leaving the domains disagreeing.
//!
//! The engine is rooted at the current working tree. Ticket files travel
//! inside the repository, so a linked worktree carries its own checkout of
//! the status directories; running `close` inside the worktree is what
//! lands the close commit on the feature branch.

use chrono::{Timelike, Utc};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{Config, CONFIG_FILE_NAME};
use crate::error::{GitErrorKind, Result, TicketErrorKind, TicketflowError};
use crate::git::GitGateway;
use crate::subprocess::SubprocessManager;
use crate::ticket::store::TicketDiagnostic;
use crate::ticket::{Relation, Status, StatusFilter, Ticket, TicketId, TicketStore};
use crate::worktree::{WorktreeCoordinator, WorktreeRecord};

#[derive(Debug)]
pub struct InitResult {
    pub root: PathBuf,
    pub config_created: bool,
    pub created_dirs: Vec<PathBuf>,
}

#[derive(Debug)]
pub struct StartResult {
    pub ticket: Ticket,
    pub branch: String,
    pub worktree: Option<WorktreeRecord>,
    pub restarted: bool,
}

#[derive(Debug)]
pub struct CloseResult {
    pub ticket: Ticket,
    pub branch: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreAction {
    /// done → doing, with a commit.
    Reopened,
    /// doing → todo, inverting a completed start: worktree removed,
    /// branch deleted, move committed.
    Unstarted,
    /// doing → todo after a crashed start; index reset, no commit.
    RevertedStart,
}

#[derive(Debug)]
pub struct RestoreResult {
    pub ticket: Ticket,
    pub action: RestoreAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupReason {
    /// The ticket is in `done/`.
    TicketDone,
    /// The ticket file is gone and the branch has no commits ahead of the
    /// default branch.
    OrphanBranch,
}

#[derive(Debug)]
pub struct CleanupAction {
    pub branch: String,
    pub worktree: Option<PathBuf>,
    pub reason: CleanupReason,
}

#[derive(Debug)]
pub struct CleanupResult {
    pub actions: Vec<CleanupAction>,
    pub dry_run: bool,
}

#[derive(Debug, Default)]
pub struct StatusCounts {
    pub todo: usize,
    pub doing: usize,
    pub done: usize,
}

#[derive(Debug)]
pub struct StatusReport {
    pub branch: String,
    pub dirty: bool,
    pub current: Option<Ticket>,
    pub counts: StatusCounts,
    pub warnings: Vec<String>,
}

#[derive(Debug)]
pub struct ListResult {
    pub tickets: Vec<Ticket>,
    pub diagnostics: Vec<TicketDiagnostic>,
}

pub struct LifecycleEngine {
    project_root: PathBuf,
    config: Config,
    store: TicketStore,
    git: GitGateway,
    worktrees: WorktreeCoordinator,
    cancel: CancellationToken,
}

impl LifecycleEngine {
    pub fn new(
        project_root: PathBuf,
        config: Config,
        subprocess: SubprocessManager,
        cancel: CancellationToken,
    ) -> Self {
        let git = GitGateway::new(
            &project_root,
            config.git_timeout(),
            subprocess.clone(),
            cancel.clone(),
        );
        let store = TicketStore::new(&config, &project_root, cancel.clone());
        let worktrees = WorktreeCoordinator::new(
            &config,
            &project_root,
            git.clone(),
            subprocess,
            cancel.clone(),
        );
        Self {
            project_root,
            config,
            store,
            git,
            worktrees,
            cancel,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn worktrees(&self) -> &WorktreeCoordinator {
        &self.worktrees
    }

    fn now() -> chrono::DateTime<Utc> {
        let now = Utc::now();
        now.with_nanosecond(0).unwrap_or(now)
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(TicketflowError::Cancelled);
        }
        Ok(())
    }

    /// Idempotent project scaffolding: the status directories plus a
    /// default `.ticketflow.yaml` if none exists yet.
    pub async fn init(root: &Path, cancel: &CancellationToken) -> Result<InitResult> {
        let config = Config::default();
        let mut created_dirs = Vec::new();
        for dir in [
            config.todo_path(root),
            config.doing_path(root),
            config.done_path(root),
        ] {
            if !dir.is_dir() {
                tokio::fs::create_dir_all(&dir).await?;
                created_dirs.push(dir);
            }
        }

        let config_path = root.join(CONFIG_FILE_NAME);
        let config_created = if config_path.is_file() {
            false
        } else {
            config.save(&config_path, cancel).await?;
            true
        };

        Ok(InitResult {
            root: root.to_path_buf(),
            config_created,
            created_dirs,
        })
    }

    /// Create a todo ticket (optionally linked to a parent) and commit it
    /// on the current branch.
    pub async fn new_ticket(&self, slug: &str, parent: Option<&str>) -> Result<Ticket> {
        self.git.ensure_repository().await?;

        let mut ticket = self.store.create(slug).await?;
        let mut commit_paths = vec![path_str(&ticket.path)];

        if let Some(parent_ref) = parent {
            let mut parent_ticket = match self.store.find(parent_ref).await {
                Ok(t) => t,
                Err(e) => {
                    // The child file exists but is not yet committed; take
                    // it back out so the failed verb leaves no trace.
                    let _ = tokio::fs::remove_file(&ticket.path).await;
                    return Err(e.with_context(format!("resolving --parent {parent_ref}")));
                }
            };
            ticket.set_parent(parent_ticket.id.as_str())?;
            self.store.update(&ticket).await?;

            parent_ticket
                .related
                .push(Relation::ParentOf(ticket.id.as_str().to_string()));
            self.store.update(&parent_ticket).await?;
            commit_paths.push(path_str(&parent_ticket.path));
        }

        self.git.add(&commit_paths).await?;
        self.git
            .commit(&format!("Add ticket: {}", ticket.id))
            .await?;
        Ok(ticket)
    }

    /// Promote a todo ticket to doing: stamp `started_at`, move the file,
    /// commit the move, then create the branch and (optionally) the linked
    /// worktree.
    pub async fn start(&self, id_or_prefix: &str) -> Result<StartResult> {
        self.check_cancelled()?;
        let mut ticket = self.store.find(id_or_prefix).await?;
        let id = ticket.id.clone();

        match ticket.status {
            Status::Doing => {
                return Err(TicketflowError::ticket(
                    TicketErrorKind::AlreadyStarted,
                    id.as_str(),
                    "start",
                ))
            }
            Status::Done => {
                return Err(TicketflowError::ticket(
                    TicketErrorKind::AlreadyClosed,
                    id.as_str(),
                    "start",
                ))
            }
            Status::Todo => {}
        }

        if self.git.has_uncommitted_changes().await? {
            return Err(TicketflowError::git(GitErrorKind::DirtyWorkspace, "start")
                .with_context(format!("cannot start {id} with uncommitted changes")));
        }

        let branch_exists = self.git.branch_exists(id.as_str()).await?;
        let attached = if branch_exists {
            self.git.find_worktree_by_branch(id.as_str()).await?
        } else {
            None
        };
        if branch_exists && attached.is_none() {
            return Err(TicketflowError::git_with_subject(
                GitErrorKind::BranchExists,
                "start",
                id.as_str(),
            )
            .with_context("a branch named after this ticket already exists"));
        }
        let restarted = attached.is_some();

        // Step 1: stamp started_at.
        let old_path = ticket.path.clone();
        ticket.started_at = Some(Self::now());
        self.store.update(&ticket).await?;

        // Step 2: todo/ → doing/. The losing side of a concurrent start
        // observes the file gone and fails as "already started".
        if let Err(e) = self.store.move_to(&mut ticket, Status::Doing).await {
            let err = if e.is_not_found() {
                TicketflowError::ticket(TicketErrorKind::AlreadyStarted, id.as_str(), "start")
                    .with_source(e)
            } else {
                e
            };
            return Err(err);
        }

        // Step 3: commit the move.
        let commit_paths = [path_str(&old_path), path_str(&ticket.path)];
        if let Err(e) = self.commit_paths(&commit_paths, &format!("Start ticket: {id}")).await {
            self.rollback_uncommitted_move(&mut ticket, &commit_paths).await;
            return Err(e.with_context("start rolled back after failed commit"));
        }

        // Step 4: branch + worktree. From here on a failure is compensated
        // with a forward commit that undoes the move.
        let worktree = if self.config.worktree.enabled {
            let record = if let Some(entry) = attached {
                WorktreeRecord {
                    branch: id.as_str().to_string(),
                    path: entry.path,
                    reported_by_git: true,
                }
            } else {
                match self.worktrees.create(id.as_str(), "HEAD").await {
                    Ok(record) => record,
                    Err(e) => {
                        self.compensate_started_ticket(&mut ticket).await;
                        return Err(e.with_context("start rolled back after failed worktree create"));
                    }
                }
            };
            // The worktree carries its own checkout of the status
            // directories; the link points inside it.
            let doing_in_worktree = self
                .config
                .doing_path(&record.path)
                .join(ticket.id.filename());
            if let Err(e) = self
                .worktrees
                .link_current_ticket(&record.path, &doing_in_worktree)
            {
                self.compensate_started_ticket(&mut ticket).await;
                return Err(e.with_context("start rolled back after failed current-ticket link"));
            }
            Some(record)
        } else {
            if !branch_exists {
                if let Err(e) = self.git.create_branch(id.as_str()).await {
                    self.compensate_started_ticket(&mut ticket).await;
                    return Err(e.with_context("start rolled back after failed branch create"));
                }
            }
            if let Err(e) = self.git.checkout(id.as_str()).await {
                self.compensate_started_ticket(&mut ticket).await;
                return Err(e.with_context("start rolled back after failed checkout"));
            }
            if let Err(e) = self
                .worktrees
                .link_current_ticket(&self.project_root, &ticket.path)
            {
                self.compensate_started_ticket(&mut ticket).await;
                return Err(e.with_context("start rolled back after failed current-ticket link"));
            }
            None
        };

        Ok(StartResult {
            branch: id.as_str().to_string(),
            ticket,
            worktree,
            restarted,
        })
    }

    /// Finalize the current working directory's ticket. Must run where
    /// `current-ticket.md` resolves to a ticket in `doing/` — inside the
    /// worktree when worktrees are enabled.
    pub async fn close(&self, reason: Option<&str>) -> Result<CloseResult> {
        self.check_cancelled()?;
        let Some(link_target) = WorktreeCoordinator::current_ticket_path(&self.project_root)
        else {
            let mut message = format!(
                "no current ticket here ({} has no current-ticket.md)",
                self.project_root.display()
            );
            if self.config.worktree.enabled {
                message.push_str("; run close from inside the ticket's worktree");
            }
            return Err(TicketflowError::invalid_context(message));
        };

        let stem = link_target
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let id = TicketId::parse(stem)?;
        let mut ticket = self.store.get(&id).await?;
        match ticket.status {
            Status::Doing => {}
            Status::Done => {
                return Err(TicketflowError::ticket(
                    TicketErrorKind::AlreadyClosed,
                    id.as_str(),
                    "close",
                ))
            }
            Status::Todo => {
                return Err(TicketflowError::invalid_context(format!(
                    "current-ticket.md points at {id}, which is still in todo/"
                )))
            }
        }

        let branch = self.git.current_branch().await?;
        let old_path = ticket.path.clone();
        let original_content = ticket.content.clone();

        ticket.closed_at = Some(Self::now());
        if let Some(reason) = reason {
            if !ticket.content.ends_with('\n') && !ticket.content.is_empty() {
                ticket.content.push('\n');
            }
            ticket
                .content
                .push_str(&format!("\n## Close reason\n\n{reason}\n"));
        }
        self.store.update(&ticket).await?;

        if let Err(e) = self.store.move_to(&mut ticket, Status::Done).await {
            // The file never moved; put the record back as it was.
            ticket.closed_at = None;
            ticket.content = original_content;
            let _ = self.store.update(&ticket).await;
            return Err(e);
        }

        let commit_paths = [path_str(&old_path), path_str(&ticket.path)];
        if let Err(e) = self
            .commit_paths(&commit_paths, &format!("Close ticket: {id}"))
            .await
        {
            self.rollback_uncommitted_close(&mut ticket, original_content, &commit_paths)
                .await;
            return Err(e.with_context("close rolled back after failed commit"));
        }

        // The worktree itself stays; cleanup reclaims it after the merge.
        WorktreeCoordinator::unlink_current_ticket(&self.project_root)?;

        Ok(CloseResult {
            ticket,
            branch,
        })
    }

    /// Reverse a close while the branch still exists, or recover a start
    /// that crashed between the rename and the commit.
    pub async fn restore(&self, id_or_prefix: &str) -> Result<RestoreResult> {
        self.check_cancelled()?;
        let mut ticket = self.store.find(id_or_prefix).await?;
        let id = ticket.id.clone();
        let branch_exists = self.git.branch_exists(id.as_str()).await?;

        match ticket.status {
            Status::Done => {
                if !branch_exists {
                    return Err(TicketflowError::git_with_subject(
                        GitErrorKind::BranchNotFound,
                        "restore",
                        id.as_str(),
                    )
                    .with_context("cannot reopen a ticket whose branch is gone"));
                }
                let old_path = ticket.path.clone();
                ticket.closed_at = None;
                self.store.update(&ticket).await?;
                self.store.move_to(&mut ticket, Status::Doing).await?;
                let commit_paths = [path_str(&old_path), path_str(&ticket.path)];
                self.commit_paths(&commit_paths, &format!("Restore ticket: {id}"))
                    .await?;
                self.relink_after_restore(&ticket).await?;
                Ok(RestoreResult {
                    ticket,
                    action: RestoreAction::Reopened,
                })
            }
            Status::Doing if !branch_exists => {
                // Crashed start: the rename happened but the commit (and
                // branch) never did. Undo the move and reset the index.
                let old_path = ticket.path.clone();
                ticket.started_at = None;
                self.store.update(&ticket).await?;
                self.store.move_to(&mut ticket, Status::Todo).await?;
                self.git
                    .reset_paths([path_str(&old_path), path_str(&ticket.path)])
                    .await?;
                Ok(RestoreResult {
                    ticket,
                    action: RestoreAction::RevertedStart,
                })
            }
            Status::Doing => {
                // Full inverse of a completed start. Release in reverse
                // acquisition order: worktree, then branch, then the file
                // move with its commit.
                if let Some(entry) = self.git.find_worktree_by_branch(id.as_str()).await? {
                    WorktreeCoordinator::unlink_current_ticket(&entry.path)?;
                    self.worktrees.remove(&entry.path).await?;
                }
                // With worktrees disabled the branch may be checked out
                // right here; step off it before deleting.
                if self.git.current_branch().await? == id.as_str() {
                    self.git.checkout(&self.config.git.default_branch).await?;
                }
                WorktreeCoordinator::unlink_current_ticket(&self.project_root)?;
                self.git.delete_branch(id.as_str(), true).await?;

                let old_path = ticket.path.clone();
                ticket.started_at = None;
                self.store.update(&ticket).await?;
                self.store.move_to(&mut ticket, Status::Todo).await?;
                let commit_paths = [path_str(&old_path), path_str(&ticket.path)];
                self.commit_paths(&commit_paths, &format!("Restore ticket: {id}"))
                    .await?;
                Ok(RestoreResult {
                    ticket,
                    action: RestoreAction::Unstarted,
                })
            }
            Status::Todo => Err(TicketflowError::ticket(
                TicketErrorKind::NotDone,
                id.as_str(),
                "restore",
            )
            .with_context("ticket is in todo/, nothing to restore")),
        }
    }

    async fn relink_after_restore(&self, ticket: &Ticket) -> Result<()> {
        if self.config.worktree.enabled {
            if let Some(entry) = self.git.find_worktree_by_branch(ticket.id.as_str()).await? {
                let doing_in_worktree = self
                    .config
                    .doing_path(&entry.path)
                    .join(ticket.id.filename());
                self.worktrees
                    .link_current_ticket(&entry.path, &doing_in_worktree)?;
            }
        } else {
            self.worktrees
                .link_current_ticket(&self.project_root, &ticket.path)?;
        }
        Ok(())
    }

    /// Reclaim worktrees and delete ticket branches.
    ///
    /// With an id: that ticket must be done. Without: every branch shaped
    /// like a ticket id is considered — eligible when its ticket is done,
    /// or when the ticket file is missing and the branch has no commits
    /// ahead of the default branch.
    pub async fn cleanup(&self, id: Option<&str>, dry_run: bool) -> Result<CleanupResult> {
        self.check_cancelled()?;
        let mut actions = Vec::new();

        match id {
            Some(id_or_prefix) => {
                let ticket = self.store.find(id_or_prefix).await?;
                if ticket.status != Status::Done {
                    return Err(TicketflowError::ticket(
                        TicketErrorKind::NotDone,
                        ticket.id.as_str(),
                        "cleanup",
                    ));
                }
                if let Some(action) = self
                    .cleanup_branch(ticket.id.as_str(), CleanupReason::TicketDone, dry_run)
                    .await?
                {
                    actions.push(action);
                }
            }
            None => {
                let branches = self.git.list_branches("*").await?;
                for branch in branches.iter().filter(|b| TicketId::looks_like(b)) {
                    let reason = match self.ticket_status_for_branch(branch).await? {
                        Some(Status::Done) => CleanupReason::TicketDone,
                        Some(_) => continue,
                        None => {
                            let (ahead, _) = self
                                .git
                                .divergence_info(branch, &self.config.git.default_branch)
                                .await?;
                            if ahead > 0 {
                                debug!("keeping orphan branch {branch}: {ahead} commits ahead");
                                continue;
                            }
                            CleanupReason::OrphanBranch
                        }
                    };
                    if let Some(action) = self.cleanup_branch(branch, reason, dry_run).await? {
                        actions.push(action);
                    }
                }
            }
        }

        Ok(CleanupResult { actions, dry_run })
    }

    async fn ticket_status_for_branch(&self, branch: &str) -> Result<Option<Status>> {
        let id = match TicketId::parse(branch) {
            Ok(id) => id,
            Err(_) => return Ok(None),
        };
        match self.store.get(&id).await {
            Ok(ticket) => Ok(Some(ticket.status)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn cleanup_branch(
        &self,
        branch: &str,
        reason: CleanupReason,
        dry_run: bool,
    ) -> Result<Option<CleanupAction>> {
        let worktree = self.git.find_worktree_by_branch(branch).await?;
        let worktree_path = worktree.map(|e| e.path);

        if dry_run {
            return Ok(Some(CleanupAction {
                branch: branch.to_string(),
                worktree: worktree_path,
                reason,
            }));
        }

        if let Some(path) = &worktree_path {
            self.worktrees.remove(path).await?;
        }
        match self.git.delete_branch(branch, true).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                warn!("branch {branch} vanished during cleanup");
            }
            Err(e) => return Err(e),
        }

        Ok(Some(CleanupAction {
            branch: branch.to_string(),
            worktree: worktree_path,
            reason,
        }))
    }

    /// Read-only projection: current ticket, git state, per-status counts,
    /// and any invariant violations worth surfacing.
    pub async fn status(&self) -> Result<StatusReport> {
        let branch = self.git.current_branch().await?;
        let dirty = self.git.has_uncommitted_changes().await?;

        let outcome = self.store.list(StatusFilter::All).await?;
        let mut counts = StatusCounts::default();
        let mut warnings: Vec<String> = outcome
            .diagnostics
            .iter()
            .map(|d| format!("{}: {}", d.path.display(), d.message))
            .collect();

        for ticket in &outcome.tickets {
            match ticket.status {
                Status::Todo => counts.todo += 1,
                Status::Doing => counts.doing += 1,
                Status::Done => counts.done += 1,
            }
            if ticket.status == Status::Doing
                && !self.git.branch_exists(ticket.id.as_str()).await?
            {
                warnings.push(format!(
                    "ticket {} is in doing/ but branch {} does not exist; \
                     `ticketflow restore {}` will move it back to todo/",
                    ticket.id, ticket.id, ticket.id
                ));
            }
        }

        let current = match WorktreeCoordinator::current_ticket_path(&self.project_root) {
            Some(path) => {
                let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
                match TicketId::parse(stem) {
                    Ok(id) => self.store.get(&id).await.ok(),
                    Err(_) => None,
                }
            }
            None => None,
        };

        Ok(StatusReport {
            branch,
            dirty,
            current,
            counts,
            warnings,
        })
    }

    pub async fn list(&self, filter: StatusFilter, count: Option<usize>) -> Result<ListResult> {
        let mut outcome = self.store.list(filter).await?;
        if let Some(count) = count {
            outcome.tickets.truncate(count);
        }
        Ok(ListResult {
            tickets: outcome.tickets,
            diagnostics: outcome.diagnostics,
        })
    }

    pub async fn show(&self, id_or_prefix: &str) -> Result<Ticket> {
        self.store.find(id_or_prefix).await
    }

    pub async fn worktree_list(&self) -> Result<Vec<WorktreeRecord>> {
        self.worktrees.list().await
    }

    /// Remove worktrees whose ticket is no longer in `doing/`, then prune
    /// git's worktree bookkeeping.
    pub async fn worktree_clean(&self) -> Result<Vec<WorktreeRecord>> {
        let records = self.worktrees.list().await?;
        let mut removed = Vec::new();
        for record in records {
            if self.ticket_status_for_branch(&record.branch).await? == Some(Status::Doing) {
                continue;
            }
            self.worktrees.remove(&record.path).await?;
            removed.push(record);
        }
        self.worktrees.prune().await?;
        Ok(removed)
    }

    async fn commit_paths(&self, paths: &[String], message: &str) -> Result<()> {
        self.git.add(paths).await?;
        self.git.commit(message).await
    }

    /// Reverse an uncommitted move: rename back, clear the stamp, unstage.
    async fn rollback_uncommitted_move(&self, ticket: &mut Ticket, commit_paths: &[String]) {
        if let Err(e) = self.store.move_to(ticket, Status::Todo).await {
            warn!("rollback: could not move {} back to todo/: {e}", ticket.id);
            return;
        }
        ticket.started_at = None;
        if let Err(e) = self.store.update(ticket).await {
            warn!("rollback: could not clear started_at on {}: {e}", ticket.id);
        }
        if let Err(e) = self.git.reset_paths(commit_paths.iter().cloned()).await {
            warn!("rollback: could not reset the index for {}: {e}", ticket.id);
        }
    }

    async fn rollback_uncommitted_close(
        &self,
        ticket: &mut Ticket,
        original_content: String,
        commit_paths: &[String],
    ) {
        if let Err(e) = self.store.move_to(ticket, Status::Doing).await {
            warn!("rollback: could not move {} back to doing/: {e}", ticket.id);
            return;
        }
        ticket.closed_at = None;
        ticket.content = original_content;
        if let Err(e) = self.store.update(ticket).await {
            warn!("rollback: could not clear closed_at on {}: {e}", ticket.id);
        }
        if let Err(e) = self.git.reset_paths(commit_paths.iter().cloned()).await {
            warn!("rollback: could not reset the index for {}: {e}", ticket.id);
        }
    }

    /// Compensate a start whose move is already committed: reclaim
    /// whatever step 4 managed to create (worktree, checkout, branch),
    /// then move the file back with a forward commit.
    async fn compensate_started_ticket(&self, ticket: &mut Ticket) {
        let id = ticket.id.clone();

        // If the failed start already checked the branch out here, step
        // off it first so the revert commit lands on the original branch.
        match self.git.current_branch().await {
            Ok(current) if current == id.as_str() => {
                if let Err(e) = self.git.checkout(&self.config.git.default_branch).await {
                    warn!("compensation: could not leave branch {id}: {e}");
                    return;
                }
            }
            Ok(_) => {}
            Err(e) => warn!("compensation: could not read the current branch: {e}"),
        }

        // A created worktree holds the branch checked out; reclaim it
        // before the branch delete.
        match self.git.find_worktree_by_branch(id.as_str()).await {
            Ok(Some(entry)) => {
                if let Err(e) = self.worktrees.remove(&entry.path).await {
                    warn!("compensation: could not remove the worktree for {id}: {e}");
                }
            }
            Ok(None) => {}
            Err(e) => warn!("compensation: could not inspect worktrees for {id}: {e}"),
        }

        if let Err(e) = WorktreeCoordinator::unlink_current_ticket(&self.project_root) {
            warn!("compensation: could not remove current-ticket.md: {e}");
        }

        let doing_path = ticket.path.clone();
        if let Err(e) = self.store.move_to(ticket, Status::Todo).await {
            warn!("compensation: could not move {id} back to todo/: {e}");
            return;
        }
        ticket.started_at = None;
        if let Err(e) = self.store.update(ticket).await {
            warn!("compensation: could not clear started_at on {id}: {e}");
        }
        let paths = [path_str(&doing_path), path_str(&ticket.path)];
        if let Err(e) = self
            .commit_paths(&paths, &format!("Revert start ticket: {id}"))
            .await
        {
            warn!("compensation: could not commit the revert for {id}: {e}");
        }
        match self.git.delete_branch(id.as_str(), true).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => warn!("compensation: could not delete branch {id}: {e}"),
        }
    }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
