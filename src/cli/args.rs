//! CLI argument structures

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::OutputFormat;
use crate::ticket::StatusFilter;

/// Ticket-driven development workflow with git worktree integration
#[derive(Parser)]
#[command(name = "ticketflow")]
#[command(about = "ticketflow - manage tickets as files, one git worktree per active ticket", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the project: status directories plus a default config
    Init,

    /// Create a new todo ticket
    New {
        /// Slug appended to the timestamp to form the ticket id
        slug: String,

        /// Link the new ticket under a parent ticket
        #[arg(long, value_name = "ID")]
        parent: Option<String>,

        #[arg(long, value_enum)]
        format: Option<FormatArg>,
    },

    /// List tickets
    List {
        /// Which status directories to enumerate
        #[arg(long, value_enum, default_value_t = StatusArg::Active)]
        status: StatusArg,

        /// Show at most this many tickets
        #[arg(long, value_name = "N")]
        count: Option<usize>,

        #[arg(long, value_enum)]
        format: Option<FormatArg>,
    },

    /// Print one ticket
    Show {
        /// Ticket id or unique prefix
        id: String,

        #[arg(long, value_enum)]
        format: Option<FormatArg>,
    },

    /// Promote a todo ticket to doing: branch plus optional worktree
    Start {
        /// Ticket id or unique prefix
        id: String,
    },

    /// Finalize the current working directory's ticket
    Close {
        /// Appended to the ticket body before the close commit
        #[arg(long, value_name = "TEXT")]
        reason: Option<String>,
    },

    /// Reverse a close (or recover an interrupted start)
    Restore {
        /// Ticket id or unique prefix
        id: String,
    },

    /// Remove worktrees and merged ticket branches
    Cleanup {
        /// Ticket id; when omitted, every eligible ticket branch
        id: Option<String>,

        /// Report actions without performing them
        #[arg(long)]
        dry_run: bool,
    },

    /// Report the current ticket and git state
    Status {
        #[arg(long, value_enum)]
        format: Option<FormatArg>,
    },

    /// Inspect or prune ticket worktrees
    Worktree {
        #[command(subcommand)]
        command: WorktreeCommands,
    },
}

#[derive(Subcommand)]
pub enum WorktreeCommands {
    /// List worktrees attached to ticket branches
    List,
    /// Remove worktrees whose ticket is no longer in doing/
    Clean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatusArg {
    Todo,
    Doing,
    Done,
    Active,
    All,
}

impl From<StatusArg> for StatusFilter {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Todo => StatusFilter::Todo,
            StatusArg::Doing => StatusFilter::Doing,
            StatusArg::Done => StatusFilter::Done,
            StatusArg::Active => StatusFilter::Active,
            StatusArg::All => StatusFilter::All,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Text,
    Json,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Text => OutputFormat::Text,
            FormatArg::Json => OutputFormat::Json,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_the_full_verb_surface() {
        Cli::try_parse_from(["ticketflow", "init"]).unwrap();
        Cli::try_parse_from(["ticketflow", "new", "add-tests", "--parent", "250101-120000-x"])
            .unwrap();
        Cli::try_parse_from(["ticketflow", "list", "--status", "all", "--count", "5"]).unwrap();
        Cli::try_parse_from(["ticketflow", "show", "2501", "--format", "json"]).unwrap();
        Cli::try_parse_from(["ticketflow", "start", "250101-120000-x"]).unwrap();
        Cli::try_parse_from(["ticketflow", "close", "--reason", "merged upstream"]).unwrap();
        Cli::try_parse_from(["ticketflow", "restore", "250101-120000-x"]).unwrap();
        Cli::try_parse_from(["ticketflow", "cleanup", "--dry-run"]).unwrap();
        Cli::try_parse_from(["ticketflow", "status"]).unwrap();
        Cli::try_parse_from(["ticketflow", "worktree", "list"]).unwrap();
        Cli::try_parse_from(["ticketflow", "worktree", "clean"]).unwrap();
    }

    #[test]
    fn list_defaults_to_active() {
        let cli = Cli::try_parse_from(["ticketflow", "list"]).unwrap();
        match cli.command {
            Commands::List { status, .. } => assert_eq!(status, StatusArg::Active),
            _ => panic!("expected list"),
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!(Cli::try_parse_from(["ticketflow", "list", "--status", "archived"]).is_err());
    }
}
