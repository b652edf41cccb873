//! Project configuration
//!
//! One `.ticketflow.yaml` at the project root. Loading is tolerant of
//! missing sections (each falls back to its default) and strict about
//! values: an unknown output format, an out-of-range timeout or an empty
//! default branch is `ConfigInvalid`, not a warning. Load and save both
//! honor the cancellation token — checked before I/O and again before the
//! final rename.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{ConfigErrorKind, Result, TicketflowError};

pub const CONFIG_FILE_NAME: &str = ".ticketflow.yaml";

/// Environment override for the config file location.
pub const CONFIG_PATH_ENV: &str = "TICKETFLOW_CONFIG";
/// Environment override for `output.default_format`.
pub const OUTPUT_FORMAT_ENV: &str = "TICKETFLOW_OUTPUT_FORMAT";

/// Hard cap on config file size.
pub const MAX_CONFIG_SIZE: u64 = 1024 * 1024;

const DEFAULT_GIT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_INIT_TIMEOUT_SECS: u64 = 60;
const MAX_TIMEOUT_SECS: u64 = 3600;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub git: GitConfig,
    pub worktree: WorktreeConfig,
    pub tickets: TicketsConfig,
    pub output: OutputConfig,
    pub timeouts: TimeoutsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    pub default_branch: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            default_branch: "main".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorktreeConfig {
    pub enabled: bool,
    pub base_dir: PathBuf,
    pub init_commands: Vec<String>,
}

impl Default for WorktreeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_dir: PathBuf::from("../ticketflow-worktrees"),
            init_commands: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TicketsConfig {
    pub dir: PathBuf,
    pub todo_dir: PathBuf,
    pub doing_dir: PathBuf,
    pub done_dir: PathBuf,
    pub template: String,
}

impl Default for TicketsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("tickets"),
            todo_dir: PathBuf::from("todo"),
            doing_dir: PathBuf::from("doing"),
            done_dir: PathBuf::from("done"),
            template: "\n# Summary\n\n# Tasks\n- [ ] \n".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = TicketflowError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(
                TicketflowError::config(ConfigErrorKind::Invalid, None)
                    .with_context(format!("unknown output format {other:?}")),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub default_format: OutputFormat,
    pub json_pretty: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            default_format: OutputFormat::Text,
            json_pretty: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    /// Seconds per git invocation; 0 means the default of 30.
    pub git: u64,
    /// Seconds per init command; 0 means the default of 60.
    pub init_commands: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            git: DEFAULT_GIT_TIMEOUT_SECS,
            init_commands: DEFAULT_INIT_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Validate the value constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| {
            TicketflowError::config(ConfigErrorKind::Invalid, None).with_context(reason)
        };
        if self.git.default_branch.trim().is_empty() {
            return Err(invalid("git.default_branch must not be empty".to_string()));
        }
        if self.tickets.dir.as_os_str().is_empty() {
            return Err(invalid("tickets.dir must not be empty".to_string()));
        }
        if self.timeouts.git > MAX_TIMEOUT_SECS {
            return Err(invalid(format!(
                "timeouts.git {} exceeds {MAX_TIMEOUT_SECS}",
                self.timeouts.git
            )));
        }
        if self.timeouts.init_commands > MAX_TIMEOUT_SECS {
            return Err(invalid(format!(
                "timeouts.init_commands {} exceeds {MAX_TIMEOUT_SECS}",
                self.timeouts.init_commands
            )));
        }
        Ok(())
    }

    pub async fn load(path: &Path, cancel: &CancellationToken) -> Result<Self> {
        if cancel.is_cancelled() {
            return Err(TicketflowError::Cancelled);
        }

        let metadata = tokio::fs::metadata(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TicketflowError::config(ConfigErrorKind::NotFound, Some(path.to_path_buf()))
            } else {
                e.into()
            }
        })?;
        if metadata.len() > MAX_CONFIG_SIZE {
            return Err(
                TicketflowError::config(ConfigErrorKind::Invalid, Some(path.to_path_buf()))
                    .with_context(format!("{} bytes exceeds the 1 MiB cap", metadata.len())),
            );
        }

        let text = tokio::fs::read_to_string(path).await?;
        if cancel.is_cancelled() {
            return Err(TicketflowError::Cancelled);
        }

        let config: Config = serde_yaml::from_str(&text).map_err(|e| {
            TicketflowError::config(ConfigErrorKind::Invalid, Some(path.to_path_buf()))
                .with_source(e)
        })?;
        config.validate().map_err(|e| {
            e.with_context(format!("while loading {}", path.display()))
        })?;
        Ok(config)
    }

    /// Atomic save: sibling temp file, fsync, chmod, rename.
    pub async fn save(&self, path: &Path, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(TicketflowError::Cancelled);
        }
        self.validate()?;
        let text = serde_yaml::to_string(self).map_err(|e| {
            TicketflowError::config(ConfigErrorKind::Invalid, Some(path.to_path_buf()))
                .with_source(e)
        })?;

        let dir = path
            .parent()
            .ok_or_else(|| TicketflowError::other(format!("no parent for {}", path.display())))?;
        let io_at = |e| TicketflowError::io_at(path, e);
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_at)?;
        tmp.write_all(text.as_bytes()).map_err(io_at)?;
        tmp.as_file().sync_all().map_err(io_at)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o644))
                .map_err(io_at)?;
        }
        if cancel.is_cancelled() {
            return Err(TicketflowError::Cancelled);
        }
        tmp.persist(path)
            .map_err(|e| TicketflowError::io_at(path, e.error))?;
        Ok(())
    }

    /// Walk upward from `start` looking for the config file.
    pub fn find_project_root(start: &Path) -> Option<PathBuf> {
        let mut dir = Some(start);
        while let Some(current) = dir {
            if current.join(CONFIG_FILE_NAME).is_file() {
                return Some(current.to_path_buf());
            }
            dir = current.parent();
        }
        None
    }

    /// The config path, honoring the `TICKETFLOW_CONFIG` override.
    pub fn config_path(project_root: &Path) -> PathBuf {
        match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => project_root.join(CONFIG_FILE_NAME),
        }
    }

    /// The effective output format: env override, then config default.
    pub fn effective_format(&self) -> OutputFormat {
        if let Ok(value) = std::env::var(OUTPUT_FORMAT_ENV) {
            if let Ok(format) = value.parse() {
                return format;
            }
        }
        self.output.default_format
    }

    fn resolve(root: &Path, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        }
    }

    pub fn tickets_path(&self, root: &Path) -> PathBuf {
        Self::resolve(root, &self.tickets.dir)
    }

    pub fn todo_path(&self, root: &Path) -> PathBuf {
        Self::resolve(&self.tickets_path(root), &self.tickets.todo_dir)
    }

    pub fn doing_path(&self, root: &Path) -> PathBuf {
        Self::resolve(&self.tickets_path(root), &self.tickets.doing_dir)
    }

    pub fn done_path(&self, root: &Path) -> PathBuf {
        Self::resolve(&self.tickets_path(root), &self.tickets.done_dir)
    }

    pub fn worktree_base(&self, root: &Path) -> PathBuf {
        Self::resolve(root, &self.worktree.base_dir)
    }

    pub fn git_timeout(&self) -> Duration {
        let secs = if self.timeouts.git == 0 {
            DEFAULT_GIT_TIMEOUT_SECS
        } else {
            self.timeouts.git
        };
        Duration::from_secs(secs)
    }

    pub fn init_commands_timeout(&self) -> Duration {
        let secs = if self.timeouts.init_commands == 0 {
            DEFAULT_INIT_TIMEOUT_SECS
        } else {
            self.timeouts.init_commands
        };
        Duration::from_secs(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn token() -> CancellationToken {
        CancellationToken::new()
    }

    #[tokio::test]
    async fn defaults_are_valid_and_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        let config = Config::default();
        config.validate().unwrap();
        config.save(&path, &token()).await.unwrap();

        let loaded = Config::load(&path, &token()).await.unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn partial_config_fills_in_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        tokio::fs::write(&path, "git:\n  default_branch: develop\n")
            .await
            .unwrap();

        let loaded = Config::load(&path, &token()).await.unwrap();
        assert_eq!(loaded.git.default_branch, "develop");
        assert!(loaded.worktree.enabled);
        assert_eq!(loaded.tickets.dir, PathBuf::from("tickets"));
    }

    #[tokio::test]
    async fn missing_file_is_config_not_found() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(&dir.path().join("nope.yaml"), &token())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn empty_default_branch_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        tokio::fs::write(&path, "git:\n  default_branch: \"\"\n")
            .await
            .unwrap();

        let err = Config::load(&path, &token()).await.unwrap_err();
        assert!(matches!(
            err,
            TicketflowError::Config {
                kind: ConfigErrorKind::Invalid,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn timeout_above_cap_is_rejected() {
        let mut config = Config::default();
        config.timeouts.git = 3601;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_timeout_means_default() {
        let mut config = Config::default();
        config.timeouts.git = 0;
        config.timeouts.init_commands = 0;
        assert_eq!(config.git_timeout(), Duration::from_secs(30));
        assert_eq!(config.init_commands_timeout(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn oversized_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let mut big = String::from("git:\n  default_branch: main\n# ");
        big.push_str(&"x".repeat(MAX_CONFIG_SIZE as usize + 16));
        tokio::fs::write(&path, big).await.unwrap();

        let err = Config::load(&path, &token()).await.unwrap_err();
        assert!(matches!(
            err,
            TicketflowError::Config {
                kind: ConfigErrorKind::Invalid,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn broken_yaml_is_config_invalid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        tokio::fs::write(&path, "git: [unclosed\n").await.unwrap();

        let err = Config::load(&path, &token()).await.unwrap_err();
        assert!(matches!(
            err,
            TicketflowError::Config {
                kind: ConfigErrorKind::Invalid,
                ..
            }
        ));
    }

    #[test]
    fn derived_paths_resolve_relative_against_root() {
        let config = Config::default();
        let root = Path::new("/srv/project");
        assert_eq!(
            config.todo_path(root),
            PathBuf::from("/srv/project/tickets/todo")
        );
        assert_eq!(
            config.worktree_base(root),
            PathBuf::from("/srv/project/../ticketflow-worktrees")
        );
    }

    #[test]
    fn absolute_paths_are_kept() {
        let mut config = Config::default();
        config.tickets.dir = PathBuf::from("/var/tickets");
        let root = Path::new("/srv/project");
        assert_eq!(
            config.done_path(root),
            PathBuf::from("/var/tickets/done")
        );
    }

    #[test]
    fn find_project_root_walks_upward() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "").unwrap();

        let found = Config::find_project_root(&nested).unwrap();
        assert_eq!(found, dir.path());
    }

    #[tokio::test]
    async fn cancelled_save_does_not_touch_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = Config::default().save(&path, &cancel).await.unwrap_err();
        assert!(matches!(err, TicketflowError::Cancelled));
        assert!(!path.exists());
    }

    #[test]
    fn output_format_parses_the_two_permitted_values() {
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("yaml".parse::<OutputFormat>().is_err());
    }
}
