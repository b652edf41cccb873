//! Typed gateway over the `git` subprocess
//!
//! Every method issues exactly one git invocation bound to the gateway's
//! working directory, with the configured per-call deadline and the
//! invocation's cancellation token attached. Failures come back as
//! [`TicketflowError::Git`] (or a worktree-domain error for the worktree
//! subcommands) carrying the operation name, the subject in scope, and the
//! captured stderr.
//!
//! The gateway is stateless: it owns no files and caches nothing.

pub mod parsing;

pub use parsing::WorktreeEntry;

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{GitErrorKind, Result, TicketflowError, WorktreeErrorKind};
use crate::subprocess::{ProcessCommandBuilder, ProcessError, ProcessOutput, SubprocessManager};

#[derive(Clone)]
pub struct GitGateway {
    workdir: PathBuf,
    timeout: Duration,
    subprocess: SubprocessManager,
    cancel: CancellationToken,
}

impl GitGateway {
    pub fn new(
        workdir: impl Into<PathBuf>,
        timeout: Duration,
        subprocess: SubprocessManager,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            workdir: workdir.into(),
            timeout,
            subprocess,
            cancel,
        }
    }

    /// A gateway identical to this one but bound to another directory.
    ///
    /// Used when a commit has to land in a specific worktree.
    pub fn in_dir(&self, dir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: dir.into(),
            timeout: self.timeout,
            subprocess: self.subprocess.clone(),
            cancel: self.cancel.clone(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    async fn run_raw(&self, op: &'static str, args: &[String]) -> Result<ProcessOutput> {
        let command = ProcessCommandBuilder::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .timeout(self.timeout)
            .cancel_token(self.cancel.clone())
            .build();

        self.subprocess
            .runner()
            .run(command)
            .await
            .map_err(|e| match e {
                ProcessError::Cancelled => TicketflowError::Cancelled,
                other => TicketflowError::git(GitErrorKind::CommandFailed, op).with_source(other),
            })
    }

    /// Run git and require a zero exit, returning trimmed stdout.
    async fn run(&self, op: &'static str, args: &[String]) -> Result<String> {
        let output = self.run_raw(op, args).await?;
        if output.status.success() {
            Ok(output.stdout.trim_end().to_string())
        } else {
            Err(classify_failure(op, None, &output))
        }
    }

    async fn run_with_subject(
        &self,
        op: &'static str,
        subject: &str,
        args: &[String],
    ) -> Result<String> {
        let output = self.run_raw(op, args).await?;
        if output.status.success() {
            Ok(output.stdout.trim_end().to_string())
        } else {
            Err(classify_failure(op, Some(subject), &output))
        }
    }

    pub async fn current_branch(&self) -> Result<String> {
        self.run("current-branch", &args(["branch", "--show-current"]))
            .await
    }

    pub async fn create_branch(&self, name: &str) -> Result<()> {
        let output = self.run_raw("create-branch", &args(["branch", name])).await?;
        if output.status.success() {
            return Ok(());
        }
        if output.stderr.contains("already exists") {
            return Err(
                TicketflowError::git_with_subject(GitErrorKind::BranchExists, "create-branch", name)
                    .with_stderr(output.stderr),
            );
        }
        Err(classify_failure("create-branch", Some(name), &output))
    }

    pub async fn delete_branch(&self, name: &str, force: bool) -> Result<()> {
        let flag = if force { "-D" } else { "-d" };
        let output = self
            .run_raw("delete-branch", &args(["branch", flag, name]))
            .await?;
        if output.status.success() {
            return Ok(());
        }
        if output.stderr.contains("not found") {
            return Err(TicketflowError::git_with_subject(
                GitErrorKind::BranchNotFound,
                "delete-branch",
                name,
            )
            .with_stderr(output.stderr));
        }
        Err(classify_failure("delete-branch", Some(name), &output))
    }

    pub async fn branch_exists(&self, name: &str) -> Result<bool> {
        let refname = format!("refs/heads/{name}");
        let output = self
            .run_raw(
                "branch-exists",
                &args(["show-ref", "--verify", "--quiet", &refname]),
            )
            .await?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(classify_failure("branch-exists", Some(name), &output)),
        }
    }

    pub async fn checkout(&self, name: &str) -> Result<()> {
        let output = self.run_raw("checkout", &args(["checkout", name])).await?;
        if output.status.success() {
            return Ok(());
        }
        if output.stderr.contains("did not match") || output.stderr.contains("pathspec") {
            return Err(TicketflowError::git_with_subject(
                GitErrorKind::BranchNotFound,
                "checkout",
                name,
            )
            .with_stderr(output.stderr));
        }
        Err(classify_failure("checkout", Some(name), &output))
    }

    pub async fn add<I, S>(&self, paths: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut full = vec!["add".to_string(), "--".to_string()];
        full.extend(paths.into_iter().map(|p| p.as_ref().to_string()));
        self.run("add", &full).await.map(|_| ())
    }

    pub async fn commit(&self, message: &str) -> Result<()> {
        self.run("commit", &args(["commit", "-m", message]))
            .await
            .map(|_| ())
    }

    /// Unstage the given paths without touching the working tree.
    pub async fn reset_paths<I, S>(&self, paths: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut full = vec!["reset".to_string(), "--quiet".to_string(), "--".to_string()];
        full.extend(paths.into_iter().map(|p| p.as_ref().to_string()));
        self.run("reset", &full).await.map(|_| ())
    }

    pub async fn merge_squash(&self, branch: &str) -> Result<()> {
        let output = self
            .run_raw("merge-squash", &args(["merge", "--squash", branch]))
            .await?;
        if output.status.success() {
            return Ok(());
        }
        Err(
            TicketflowError::git_with_subject(GitErrorKind::MergeFailed, "merge-squash", branch)
                .with_stderr(output.stderr),
        )
    }

    pub async fn push(&self, remote: &str, branch: &str, set_upstream: bool) -> Result<()> {
        let mut full = vec!["push".to_string()];
        if set_upstream {
            full.push("-u".to_string());
        }
        full.push(remote.to_string());
        full.push(branch.to_string());
        let output = self.run_raw("push", &full).await?;
        if output.status.success() {
            return Ok(());
        }
        Err(
            TicketflowError::git_with_subject(GitErrorKind::PushFailed, "push", branch)
                .with_stderr(output.stderr),
        )
    }

    pub async fn has_uncommitted_changes(&self) -> Result<bool> {
        let stdout = self
            .run("status", &args(["status", "--porcelain"]))
            .await?;
        Ok(!stdout.trim().is_empty())
    }

    pub async fn root_path(&self) -> Result<PathBuf> {
        let stdout = self
            .run("root-path", &args(["rev-parse", "--show-toplevel"]))
            .await?;
        Ok(PathBuf::from(stdout))
    }

    /// The trunk branch as git sees it, falling back to `main`/`master`
    /// when no remote HEAD is configured.
    pub async fn default_branch(&self) -> Result<String> {
        let output = self
            .run_raw(
                "default-branch",
                &args(["symbolic-ref", "--short", "refs/remotes/origin/HEAD"]),
            )
            .await?;
        if output.status.success() {
            let name = output.stdout.trim();
            return Ok(name.strip_prefix("origin/").unwrap_or(name).to_string());
        }
        for candidate in ["main", "master"] {
            if self.branch_exists(candidate).await? {
                return Ok(candidate.to_string());
            }
        }
        Err(TicketflowError::git(
            GitErrorKind::BranchNotFound,
            "default-branch",
        ))
    }

    pub async fn list_worktrees(&self) -> Result<Vec<WorktreeEntry>> {
        let stdout = self
            .run(
                "worktree-list",
                &args(["worktree", "list", "--porcelain"]),
            )
            .await?;
        Ok(parsing::parse_worktree_list(&stdout))
    }

    /// `git worktree add -b <branch> <path> <base>`.
    pub async fn add_worktree(&self, path: &Path, branch: &str, base: &str) -> Result<()> {
        let path_str = path.to_string_lossy();
        let output = self
            .run_raw(
                "worktree-add",
                &args(["worktree", "add", "-b", branch, path_str.as_ref(), base]),
            )
            .await?;
        if output.status.success() {
            return Ok(());
        }
        if output.stderr.contains("already exists") {
            let err = if output.stderr.contains("branch") {
                TicketflowError::git_with_subject(GitErrorKind::BranchExists, "worktree-add", branch)
                    .with_stderr(output.stderr.as_str())
            } else {
                TicketflowError::worktree(
                    WorktreeErrorKind::Exists,
                    Some(path.to_path_buf()),
                    Some(branch.to_string()),
                )
                .with_context(output.stderr.trim_end().to_string())
            };
            return Err(err);
        }
        Err(TicketflowError::worktree(
            WorktreeErrorKind::CreateFailed,
            Some(path.to_path_buf()),
            Some(branch.to_string()),
        )
        .with_context(output.stderr.trim_end().to_string()))
    }

    /// Attach a worktree to an existing branch (idempotent restart path).
    pub async fn attach_worktree(&self, path: &Path, branch: &str) -> Result<()> {
        let path_str = path.to_string_lossy();
        let output = self
            .run_raw(
                "worktree-add",
                &args(["worktree", "add", path_str.as_ref(), branch]),
            )
            .await?;
        if output.status.success() {
            return Ok(());
        }
        Err(TicketflowError::worktree(
            WorktreeErrorKind::CreateFailed,
            Some(path.to_path_buf()),
            Some(branch.to_string()),
        )
        .with_context(output.stderr.trim_end().to_string()))
    }

    pub async fn remove_worktree(&self, path: &Path) -> Result<()> {
        let path_str = path.to_string_lossy();
        let output = self
            .run_raw(
                "worktree-remove",
                &args(["worktree", "remove", "--force", path_str.as_ref()]),
            )
            .await?;
        if output.status.success() {
            return Ok(());
        }
        let kind = if output.stderr.contains("is not a working tree")
            || output.stderr.contains("No such file")
        {
            WorktreeErrorKind::NotFound
        } else {
            WorktreeErrorKind::RemoveFailed
        };
        Err(
            TicketflowError::worktree(kind, Some(path.to_path_buf()), None)
                .with_context(output.stderr.trim_end().to_string()),
        )
    }

    pub async fn prune_worktrees(&self) -> Result<()> {
        self.run("worktree-prune", &args(["worktree", "prune"]))
            .await
            .map(|_| ())
    }

    pub async fn find_worktree_by_branch(&self, branch: &str) -> Result<Option<WorktreeEntry>> {
        let entries = self.list_worktrees().await?;
        Ok(entries
            .into_iter()
            .find(|e| e.branch.as_deref() == Some(branch)))
    }

    pub async fn has_worktree(&self, path: &Path) -> Result<bool> {
        let entries = self.list_worktrees().await?;
        Ok(entries.iter().any(|e| e.path == path))
    }

    /// Run an arbitrary git command inside another worktree directory.
    pub async fn run_in_worktree(&self, path: &Path, command_args: &[&str]) -> Result<String> {
        self.in_dir(path)
            .run("run-in-worktree", &args(command_args.iter().copied()))
            .await
    }

    pub async fn branch_commit(&self, branch: &str) -> Result<String> {
        let output = self
            .run_raw(
                "branch-commit",
                &args(["rev-parse", "--verify", branch]),
            )
            .await?;
        if output.status.success() {
            return Ok(output.stdout.trim().to_string());
        }
        Err(TicketflowError::git_with_subject(
            GitErrorKind::BranchNotFound,
            "branch-commit",
            branch,
        )
        .with_stderr(output.stderr))
    }

    /// `(ahead, behind)` of `branch` relative to `base`.
    pub async fn divergence_info(&self, branch: &str, base: &str) -> Result<(u64, u64)> {
        let range = format!("{base}...{branch}");
        let stdout = self
            .run_with_subject(
                "divergence",
                branch,
                &args(["rev-list", "--left-right", "--count", &range]),
            )
            .await?;
        parsing::parse_divergence_counts(&stdout).ok_or_else(|| {
            TicketflowError::git_with_subject(GitErrorKind::CommandFailed, "divergence", branch)
                .with_context(format!("unparseable rev-list output: {stdout:?}"))
        })
    }

    pub async fn diverged_from(&self, branch: &str, base: &str) -> Result<bool> {
        let (ahead, _) = self.divergence_info(branch, base).await?;
        Ok(ahead > 0)
    }

    /// Short names of local branches matching a glob pattern.
    pub async fn list_branches(&self, pattern: &str) -> Result<Vec<String>> {
        let stdout = self
            .run(
                "list-branches",
                &args(["branch", "--list", pattern, "--format=%(refname:short)"]),
            )
            .await?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Errors with `NotARepository` unless the working directory is inside
    /// a git repository.
    pub async fn ensure_repository(&self) -> Result<()> {
        self.run("rev-parse", &args(["rev-parse", "--git-dir"]))
            .await
            .map(|_| ())
    }
}

fn args<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items.into_iter().map(|s| s.as_ref().to_string()).collect()
}

fn classify_failure(op: &'static str, subject: Option<&str>, output: &ProcessOutput) -> TicketflowError {
    let kind = if output.stderr.contains("not a git repository") {
        GitErrorKind::NotARepository
    } else {
        GitErrorKind::CommandFailed
    };
    let err = match subject {
        Some(subject) => TicketflowError::git_with_subject(kind, op, subject),
        None => TicketflowError::git(kind, op),
    };
    err.with_stderr(output.stderr.clone())
        .with_context(format!("exit status {:?}", output.status.code()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subprocess::MockProcessRunner;
    use std::sync::Arc;

    fn gateway(mock: MockProcessRunner) -> GitGateway {
        GitGateway::new(
            "/repo",
            Duration::from_secs(30),
            SubprocessManager::new(Arc::new(mock)),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn current_branch_trims_stdout() {
        let mut mock = MockProcessRunner::new();
        mock.expect_command("git")
            .with_args(|a| a == ["branch", "--show-current"])
            .returns_stdout("main\n")
            .returns_success()
            .finish();

        let git = gateway(mock);
        assert_eq!(git.current_branch().await.unwrap(), "main");
    }

    #[tokio::test]
    async fn branch_exists_maps_exit_codes() {
        let mut mock = MockProcessRunner::new();
        mock.expect_command("git")
            .with_args(|a| a.first().map(String::as_str) == Some("show-ref"))
            .returns_exit_code(1)
            .finish();

        let git = gateway(mock);
        assert!(!git.branch_exists("missing").await.unwrap());
    }

    #[tokio::test]
    async fn not_a_repository_is_classified() {
        let mut mock = MockProcessRunner::new();
        mock.expect_command("git")
            .with_args(|a| a == ["status", "--porcelain"])
            .returns_stderr("fatal: not a git repository (or any of the parent directories)")
            .returns_exit_code(128)
            .finish();

        let git = gateway(mock);
        let err = git.has_uncommitted_changes().await.unwrap_err();
        assert!(matches!(
            err,
            TicketflowError::Git {
                kind: GitErrorKind::NotARepository,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn create_branch_collision_is_branch_exists() {
        let mut mock = MockProcessRunner::new();
        mock.expect_command("git")
            .with_args(|a| a.first().map(String::as_str) == Some("branch"))
            .returns_stderr("fatal: a branch named 'x' already exists")
            .returns_exit_code(128)
            .finish();

        let git = gateway(mock);
        let err = git.create_branch("x").await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn add_worktree_builds_expected_invocation() {
        let mut mock = MockProcessRunner::new();
        mock.expect_command("git")
            .with_args(|a| {
                a == [
                    "worktree",
                    "add",
                    "-b",
                    "250101-120000-fix",
                    "/wt/250101-120000-fix",
                    "main",
                ]
            })
            .returns_success()
            .finish();

        let git = gateway(mock);
        git.add_worktree(Path::new("/wt/250101-120000-fix"), "250101-120000-fix", "main")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn remove_worktree_missing_path_is_not_found() {
        let mut mock = MockProcessRunner::new();
        mock.expect_command("git")
            .with_args(|a| a.first().map(String::as_str) == Some("worktree"))
            .returns_stderr("fatal: '/wt/x' is not a working tree")
            .returns_exit_code(128)
            .finish();

        let git = gateway(mock);
        let err = git.remove_worktree(Path::new("/wt/x")).await.unwrap_err();
        assert!(matches!(
            err,
            TicketflowError::Worktree {
                kind: WorktreeErrorKind::NotFound,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn divergence_info_returns_ahead_behind() {
        let mut mock = MockProcessRunner::new();
        mock.expect_command("git")
            .with_args(|a| a.first().map(String::as_str) == Some("rev-list"))
            .returns_stdout("3\t7\n")
            .returns_success()
            .finish();

        let git = gateway(mock);
        let (ahead, behind) = git.divergence_info("feature", "main").await.unwrap();
        assert_eq!((ahead, behind), (7, 3));
    }

    #[tokio::test]
    async fn find_worktree_by_branch_scans_porcelain_output() {
        let mut mock = MockProcessRunner::new();
        mock.expect_command("git")
            .with_args(|a| a == ["worktree", "list", "--porcelain"])
            .returns_stdout(
                "worktree /repo\nHEAD aaa\nbranch refs/heads/main\n\n\
                 worktree /wt/250101-120000-fix\nHEAD bbb\nbranch refs/heads/250101-120000-fix\n",
            )
            .returns_success()
            .finish();

        let git = gateway(mock);
        let found = git
            .find_worktree_by_branch("250101-120000-fix")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.path, PathBuf::from("/wt/250101-120000-fix"));
    }

    #[tokio::test]
    async fn merge_conflict_is_merge_failed() {
        let mut mock = MockProcessRunner::new();
        mock.expect_command("git")
            .with_args(|a| a == ["merge", "--squash", "250101-120000-fix"])
            .returns_stderr("CONFLICT (content): Merge conflict in src/lib.rs")
            .returns_exit_code(1)
            .finish();

        let git = gateway(mock);
        let err = git.merge_squash("250101-120000-fix").await.unwrap_err();
        assert!(matches!(
            err,
            TicketflowError::Git {
                kind: GitErrorKind::MergeFailed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn branch_commit_resolves_or_reports_not_found() {
        let mut mock = MockProcessRunner::new();
        mock.expect_command("git")
            .with_args(|a| a == ["rev-parse", "--verify", "feature"])
            .returns_stdout("abc123def\n")
            .returns_success()
            .finish();
        mock.expect_command("git")
            .with_args(|a| a == ["rev-parse", "--verify", "missing"])
            .returns_stderr("fatal: Needed a single revision")
            .returns_exit_code(128)
            .finish();

        let git = gateway(mock);
        assert_eq!(git.branch_commit("feature").await.unwrap(), "abc123def");
        assert!(git.branch_commit("missing").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn default_branch_falls_back_to_local_main() {
        let mut mock = MockProcessRunner::new();
        mock.expect_command("git")
            .with_args(|a| a.first().map(String::as_str) == Some("symbolic-ref"))
            .returns_stderr("fatal: ref refs/remotes/origin/HEAD is not a symbolic ref")
            .returns_exit_code(128)
            .finish();
        mock.expect_command("git")
            .with_args(|a| a == ["show-ref", "--verify", "--quiet", "refs/heads/main"])
            .returns_exit_code(0)
            .finish();

        let git = gateway(mock);
        assert_eq!(git.default_branch().await.unwrap(), "main");
    }

    #[tokio::test]
    async fn push_failure_is_push_failed() {
        let mut mock = MockProcessRunner::new();
        mock.expect_command("git")
            .with_args(|a| a.first().map(String::as_str) == Some("push"))
            .returns_stderr("error: failed to push some refs")
            .returns_exit_code(1)
            .finish();

        let git = gateway(mock);
        let err = git.push("origin", "feature", true).await.unwrap_err();
        assert!(matches!(
            err,
            TicketflowError::Git {
                kind: GitErrorKind::PushFailed,
                ..
            }
        ));
    }
}
