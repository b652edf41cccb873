//! TicketFlow: tickets as Markdown files, one git worktree per active ticket
//!
//! The crate keeps three state domains consistent through the ticket
//! lifecycle (`new → start → close → cleanup`):
//!
//! - the **ticket store** — Markdown files with YAML front matter across
//!   `todo/`, `doing/` and `done/` directories, where the directory *is*
//!   the status;
//! - the **git repository** — branches, HEAD, the index and the commit
//!   graph, driven through a typed subprocess gateway;
//! - the **worktree set** — one linked worktree per active ticket, on a
//!   branch named after the ticket id.
//!
//! Layering is strict and lower layers know nothing about upper ones:
//! `cli` → `lifecycle` → {`ticket`, `worktree`} → `git` → `subprocess`.

pub mod cli;
pub mod config;
pub mod error;
pub mod git;
pub mod lifecycle;
pub mod output;
pub mod subprocess;
pub mod ticket;
pub mod worktree;

pub use error::{Result, TicketflowError};
