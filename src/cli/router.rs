//! Command routing
//!
//! Resolves the project context (root discovery, config, output format),
//! builds the lifecycle engine, and dispatches each verb. All rendering
//! happens here at the edge; the engine only returns structured results.

use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::cli::args::{Commands, FormatArg, WorktreeCommands};
use crate::config::{Config, OutputFormat, CONFIG_PATH_ENV};
use crate::error::{ConfigErrorKind, Result, TicketflowError};
use crate::lifecycle::LifecycleEngine;
use crate::output::Renderer;
use crate::subprocess::SubprocessManager;

pub async fn execute(command: Commands, cancel: CancellationToken) -> Result<()> {
    let cwd = std::env::current_dir()?;

    if let Commands::Init = command {
        // init may run before any config exists; re-running inside an
        // initialized project stays idempotent by targeting its root.
        let root = Config::find_project_root(&cwd).unwrap_or(cwd);
        let result = LifecycleEngine::init(&root, &cancel).await?;
        let config = Config::default();
        Renderer::new(config.effective_format(), config.output.json_pretty).init(&result);
        return Ok(());
    }

    let (root, config) = load_project(&cwd, &cancel).await?;
    let engine = LifecycleEngine::new(root, config, SubprocessManager::production(), cancel);
    let config = engine.config();

    let renderer = |format: Option<FormatArg>| {
        let format = format
            .map(OutputFormat::from)
            .unwrap_or_else(|| config.effective_format());
        Renderer::new(format, config.output.json_pretty)
    };

    match command {
        Commands::Init => unreachable!("handled above"),
        Commands::New {
            slug,
            parent,
            format,
        } => {
            let ticket = engine.new_ticket(&slug, parent.as_deref()).await?;
            renderer(format).created(&ticket);
        }
        Commands::List {
            status,
            count,
            format,
        } => {
            let result = engine.list(status.into(), count).await?;
            renderer(format).list(&result);
        }
        Commands::Show { id, format } => {
            let ticket = engine.show(&id).await?;
            renderer(format).show(&ticket);
        }
        Commands::Start { id } => {
            let result = engine.start(&id).await?;
            renderer(None).started(&result);
        }
        Commands::Close { reason } => {
            let result = engine.close(reason.as_deref()).await?;
            renderer(None).closed(&result);
        }
        Commands::Restore { id } => {
            let result = engine.restore(&id).await?;
            renderer(None).restored(&result);
        }
        Commands::Cleanup { id, dry_run } => {
            let result = engine.cleanup(id.as_deref(), dry_run).await?;
            renderer(None).cleanup(&result);
        }
        Commands::Status { format } => {
            let report = engine.status().await?;
            renderer(format).status(&report);
        }
        Commands::Worktree { command } => match command {
            WorktreeCommands::List => {
                let records = engine.worktree_list().await?;
                renderer(None).worktree_list(&records);
            }
            WorktreeCommands::Clean => {
                let removed = engine.worktree_clean().await?;
                if removed.is_empty() {
                    println!("No stale worktrees");
                } else {
                    for record in &removed {
                        println!("Removed worktree {} ({})", record.path.display(), record.branch);
                    }
                }
            }
        },
    }

    Ok(())
}

/// Locate the project and load its configuration, honoring the
/// `TICKETFLOW_CONFIG` override.
async fn load_project(
    cwd: &std::path::Path,
    cancel: &CancellationToken,
) -> Result<(PathBuf, Config)> {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV).filter(|v| !v.is_empty()) {
        let path = PathBuf::from(path);
        let config = Config::load(&path, cancel).await?;
        let root = path
            .parent()
            .map(|p| p.to_path_buf())
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| cwd.to_path_buf());
        return Ok((root, config));
    }

    let root = Config::find_project_root(cwd).ok_or_else(|| {
        TicketflowError::config(ConfigErrorKind::NotFound, None)
            .with_context(format!("no .ticketflow.yaml above {}", cwd.display()))
            .with_context("run `ticketflow init` first")
    })?;
    let config = Config::load(&root.join(crate::config::CONFIG_FILE_NAME), cancel).await?;
    Ok((root, config))
}
