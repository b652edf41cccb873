//! Worktree coordination
//!
//! Reconciles the ticket in `doing/` with a linked git worktree on a branch
//! named after the ticket id. The coordinator exclusively owns the worktree
//! base directory; the `current-ticket.md` symlink inside each working
//! directory is written through [`WorktreeCoordinator::link_current_ticket`]
//! on behalf of the lifecycle engine.
//!
//! Path resolution always prefers git's own report
//! (`find_worktree_by_branch`) over the computed `<base>/<id>` location, so
//! worktrees created outside this tool keep working; the computed path is
//! only a provisional fallback for diagnostics.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{Result, TicketflowError, WorktreeErrorKind};
use crate::git::GitGateway;
use crate::subprocess::{ProcessCommandBuilder, SubprocessManager};
use crate::ticket::TicketId;

/// Name of the symlink pointing at the active ticket file.
pub const CURRENT_TICKET_LINK: &str = "current-ticket.md";

/// A worktree bound to a ticket branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeRecord {
    pub branch: String,
    pub path: PathBuf,
    /// False when the path is the computed fallback rather than git's
    /// report, which signals inconsistent git state to diagnostics.
    pub reported_by_git: bool,
}

pub struct WorktreeCoordinator {
    base_dir: PathBuf,
    git: GitGateway,
    init_commands: Vec<String>,
    init_timeout: Duration,
    subprocess: SubprocessManager,
    cancel: CancellationToken,
}

impl WorktreeCoordinator {
    pub fn new(
        config: &Config,
        project_root: &Path,
        git: GitGateway,
        subprocess: SubprocessManager,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            base_dir: config.worktree_base(project_root),
            git,
            init_commands: config.worktree.init_commands.clone(),
            init_timeout: config.init_commands_timeout(),
            subprocess,
            cancel,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Where the worktree for `id` lives, preferring git's report.
    pub async fn resolve(&self, id: &str) -> Result<WorktreeRecord> {
        if let Some(entry) = self.git.find_worktree_by_branch(id).await? {
            return Ok(WorktreeRecord {
                branch: id.to_string(),
                path: entry.path,
                reported_by_git: true,
            });
        }
        Ok(WorktreeRecord {
            branch: id.to_string(),
            path: self.base_dir.join(id),
            reported_by_git: false,
        })
    }

    /// Create the worktree (and its branch) for a ticket, then run the
    /// configured init commands inside it.
    ///
    /// Init-command failures are warnings; the worktree is never rolled
    /// back because of them.
    pub async fn create(&self, id: &str, base_branch: &str) -> Result<WorktreeRecord> {
        let path = self.base_dir.join(id);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(TicketflowError::worktree(
                WorktreeErrorKind::Exists,
                Some(path),
                Some(id.to_string()),
            ));
        }
        if self.git.branch_exists(id).await? {
            return Err(TicketflowError::git_with_subject(
                crate::error::GitErrorKind::BranchExists,
                "worktree-create",
                id,
            ));
        }

        tokio::fs::create_dir_all(&self.base_dir).await?;
        self.git.add_worktree(&path, id, base_branch).await?;
        debug!("created worktree for {id} at {}", path.display());

        self.run_init_commands(&path).await;

        Ok(WorktreeRecord {
            branch: id.to_string(),
            path,
            reported_by_git: true,
        })
    }

    /// Re-attach a worktree to an already existing ticket branch
    /// (idempotent `start` after a crash or manual branch creation).
    pub async fn attach(&self, id: &str) -> Result<WorktreeRecord> {
        let path = self.base_dir.join(id);
        tokio::fs::create_dir_all(&self.base_dir).await?;
        self.git.attach_worktree(&path, id).await?;
        self.run_init_commands(&path).await;
        Ok(WorktreeRecord {
            branch: id.to_string(),
            path,
            reported_by_git: true,
        })
    }

    async fn run_init_commands(&self, dir: &Path) {
        for command in &self.init_commands {
            if self.cancel.is_cancelled() {
                warn!("init commands interrupted by cancellation");
                return;
            }
            let rendered = shell_words::split(command)
                .map(|words| shell_words::join(&words))
                .unwrap_or_else(|_| command.clone());
            debug!("running init command in {}: {rendered}", dir.display());

            let result = self
                .subprocess
                .runner()
                .run(
                    ProcessCommandBuilder::new("sh")
                        .args(["-c", command])
                        .current_dir(dir)
                        .timeout(self.init_timeout)
                        .cancel_token(self.cancel.clone())
                        .build(),
                )
                .await;

            match result {
                Ok(output) if output.status.success() => {}
                Ok(output) => {
                    warn!(
                        "init command failed (exit {:?}): {rendered}",
                        output.status.code()
                    );
                }
                Err(e) => {
                    warn!("init command did not run: {rendered}: {e}");
                }
            }
        }
    }

    /// Point `current-ticket.md` inside `working_dir` at the ticket file,
    /// using a relative target. The link is replaced via unlink + symlink;
    /// readers must tolerate the gap.
    pub fn link_current_ticket(&self, working_dir: &Path, ticket_path: &Path) -> Result<()> {
        let link = working_dir.join(CURRENT_TICKET_LINK);
        let target = pathdiff::diff_paths(ticket_path, working_dir)
            .unwrap_or_else(|| ticket_path.to_path_buf());

        match std::fs::remove_file(&link) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(TicketflowError::io_at(&link, e)),
        }
        #[cfg(unix)]
        std::os::unix::fs::symlink(&target, &link)
            .map_err(|e| TicketflowError::io_at(&link, e))?;
        #[cfg(windows)]
        std::os::windows::fs::symlink_file(&target, &link)
            .map_err(|e| TicketflowError::io_at(&link, e))?;
        debug!("linked {} -> {}", link.display(), target.display());
        Ok(())
    }

    /// Remove `current-ticket.md` from a working directory, tolerating its
    /// absence.
    pub fn unlink_current_ticket(working_dir: &Path) -> Result<()> {
        let link = working_dir.join(CURRENT_TICKET_LINK);
        match std::fs::remove_file(&link) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TicketflowError::io_at(&link, e)),
        }
    }

    /// Resolve the ticket file the working directory's link points at, if
    /// the link exists. The returned path is absolute.
    pub fn current_ticket_path(working_dir: &Path) -> Option<PathBuf> {
        let link = working_dir.join(CURRENT_TICKET_LINK);
        let target = std::fs::read_link(&link).ok()?;
        let absolute = if target.is_absolute() {
            target
        } else {
            working_dir.join(target)
        };
        std::fs::canonicalize(&absolute).ok()
    }

    /// Remove a worktree, recovering locally when git has already forgotten
    /// the path: prune the bookkeeping and delete the directory ourselves.
    pub async fn remove(&self, path: &Path) -> Result<()> {
        match self.git.remove_worktree(path).await {
            Ok(()) => Ok(()),
            Err(TicketflowError::Worktree {
                kind: WorktreeErrorKind::NotFound,
                ..
            }) => {
                self.git.prune_worktrees().await?;
                if tokio::fs::try_exists(path).await.unwrap_or(false) {
                    tokio::fs::remove_dir_all(path).await?;
                }
                debug!("pruned stale worktree at {}", path.display());
                Ok(())
            }
            Err(other) => Err(other),
        }
    }

    pub async fn prune(&self) -> Result<()> {
        self.git.prune_worktrees().await
    }

    /// Worktrees whose branch is shaped like a ticket id.
    pub async fn list(&self) -> Result<Vec<WorktreeRecord>> {
        let entries = self.git.list_worktrees().await?;
        Ok(entries
            .into_iter()
            .filter_map(|e| {
                let branch = e.branch?;
                TicketId::looks_like(&branch).then(|| WorktreeRecord {
                    branch,
                    path: e.path,
                    reported_by_git: true,
                })
            })
            .collect())
    }
}
