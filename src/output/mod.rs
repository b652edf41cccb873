//! Text and JSON renderers over lifecycle results
//!
//! With `--format json` stdout carries exactly one JSON document — an
//! object for single-result verbs, an array for `list`. Diagnostics and
//! warnings always go to stderr so the document stays parseable.

use serde_json::{json, Value};

use crate::config::OutputFormat;
use crate::lifecycle::{
    CleanupReason, CleanupResult, CloseResult, InitResult, ListResult, RestoreAction,
    RestoreResult, StartResult, StatusReport,
};
use crate::ticket::store::TicketDiagnostic;
use crate::ticket::Ticket;
use crate::worktree::WorktreeRecord;

pub struct Renderer {
    format: OutputFormat,
    json_pretty: bool,
}

impl Renderer {
    pub fn new(format: OutputFormat, json_pretty: bool) -> Self {
        Self {
            format,
            json_pretty,
        }
    }

    fn emit(&self, value: &Value) {
        let rendered = if self.json_pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        match rendered {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("error: could not render JSON output: {e}"),
        }
    }

    fn ticket_value(ticket: &Ticket) -> Value {
        json!({
            "id": ticket.id.as_str(),
            "status": ticket.status.as_str(),
            "priority": ticket.priority,
            "description": &ticket.description,
            "created_at": ticket.created_at.to_rfc3339(),
            "started_at": ticket.started_at.map(|t| t.to_rfc3339()),
            "closed_at": ticket.closed_at.map(|t| t.to_rfc3339()),
            "related": ticket.related.iter().map(|r| r.to_string()).collect::<Vec<_>>(),
            "path": &ticket.path,
        })
    }

    fn print_diagnostics(diagnostics: &[TicketDiagnostic]) {
        for diagnostic in diagnostics {
            eprintln!(
                "warning: skipping {}: {}",
                diagnostic.path.display(),
                diagnostic.message
            );
        }
    }

    pub fn init(&self, result: &InitResult) {
        match self.format {
            OutputFormat::Json => self.emit(&json!({
                "root": &result.root,
                "config_created": result.config_created,
                "created_dirs": &result.created_dirs,
            })),
            OutputFormat::Text => {
                if result.config_created {
                    println!("Created {}", result.root.join(".ticketflow.yaml").display());
                }
                for dir in &result.created_dirs {
                    println!("Created {}", dir.display());
                }
                if !result.config_created && result.created_dirs.is_empty() {
                    println!("Already initialized at {}", result.root.display());
                }
            }
        }
    }

    pub fn created(&self, ticket: &Ticket) {
        match self.format {
            OutputFormat::Json => self.emit(&Self::ticket_value(ticket)),
            OutputFormat::Text => {
                println!("Created ticket {}", ticket.id);
                println!("  file: {}", ticket.path.display());
                if let Some(parent) = ticket.parent() {
                    println!("  parent: {parent}");
                }
                println!("Next: ticketflow start {}", ticket.id);
            }
        }
    }

    pub fn show(&self, ticket: &Ticket) {
        match self.format {
            OutputFormat::Json => self.emit(&Self::ticket_value(ticket)),
            OutputFormat::Text => {
                println!("id:          {}", ticket.id);
                println!("status:      {}", ticket.status);
                println!("priority:    {}", ticket.priority);
                if !ticket.description.is_empty() {
                    println!("description: {}", ticket.description);
                }
                println!("created_at:  {}", ticket.created_at.to_rfc3339());
                if let Some(started) = ticket.started_at {
                    println!("started_at:  {}", started.to_rfc3339());
                }
                if let Some(closed) = ticket.closed_at {
                    println!("closed_at:   {}", closed.to_rfc3339());
                }
                for relation in &ticket.related {
                    println!("related:     {relation}");
                }
                if !ticket.content.trim().is_empty() {
                    println!("\n{}", ticket.content.trim_end());
                }
            }
        }
    }

    pub fn list(&self, result: &ListResult) {
        Self::print_diagnostics(&result.diagnostics);
        match self.format {
            OutputFormat::Json => {
                let tickets: Vec<Value> = result.tickets.iter().map(Self::ticket_value).collect();
                self.emit(&Value::Array(tickets));
            }
            OutputFormat::Text => {
                if result.tickets.is_empty() {
                    println!("No tickets found");
                    return;
                }
                for ticket in &result.tickets {
                    let description = if ticket.description.is_empty() {
                        ticket.id.slug()
                    } else {
                        &ticket.description
                    };
                    println!(
                        "{:5}  {:2}  {}  {}",
                        ticket.status.as_str(),
                        ticket.priority,
                        ticket.id,
                        description
                    );
                }
            }
        }
    }

    pub fn started(&self, result: &StartResult) {
        match self.format {
            OutputFormat::Json => self.emit(&json!({
                "ticket": Self::ticket_value(&result.ticket),
                "branch": &result.branch,
                "worktree": result.worktree.as_ref().map(|w| &w.path),
                "restarted": result.restarted,
            })),
            OutputFormat::Text => {
                if result.restarted {
                    println!("Restarted ticket {}", result.ticket.id);
                } else {
                    println!("Started ticket {}", result.ticket.id);
                }
                println!("  branch: {}", result.branch);
                match &result.worktree {
                    Some(worktree) => {
                        println!("  worktree: {}", worktree.path.display());
                        println!("Next: cd {}", worktree.path.display());
                    }
                    None => println!("  checked out branch in place"),
                }
            }
        }
    }

    pub fn closed(&self, result: &CloseResult) {
        match self.format {
            OutputFormat::Json => self.emit(&json!({
                "ticket": Self::ticket_value(&result.ticket),
                "branch": &result.branch,
            })),
            OutputFormat::Text => {
                println!("Closed ticket {}", result.ticket.id);
                println!("  commit is on branch {}", result.branch);
                println!(
                    "Next: merge {} and run ticketflow cleanup {}",
                    result.branch, result.ticket.id
                );
            }
        }
    }

    pub fn restored(&self, result: &RestoreResult) {
        match self.format {
            OutputFormat::Json => self.emit(&json!({
                "ticket": Self::ticket_value(&result.ticket),
                "action": match result.action {
                    RestoreAction::Reopened => "reopened",
                    RestoreAction::Unstarted => "unstarted",
                    RestoreAction::RevertedStart => "reverted-start",
                },
            })),
            OutputFormat::Text => match result.action {
                RestoreAction::Reopened => {
                    println!("Reopened ticket {} (done -> doing)", result.ticket.id);
                }
                RestoreAction::Unstarted => {
                    println!(
                        "Unstarted ticket {} (doing -> todo, branch and worktree removed)",
                        result.ticket.id
                    );
                }
                RestoreAction::RevertedStart => {
                    println!(
                        "Reverted interrupted start of {} (doing -> todo, index reset)",
                        result.ticket.id
                    );
                }
            },
        }
    }

    pub fn cleanup(&self, result: &CleanupResult) {
        match self.format {
            OutputFormat::Json => {
                let actions: Vec<Value> = result
                    .actions
                    .iter()
                    .map(|a| {
                        json!({
                            "branch": &a.branch,
                            "worktree": &a.worktree,
                            "reason": match a.reason {
                                CleanupReason::TicketDone => "ticket-done",
                                CleanupReason::OrphanBranch => "orphan-branch",
                            },
                        })
                    })
                    .collect();
                self.emit(&json!({
                    "dry_run": result.dry_run,
                    "actions": actions,
                }));
            }
            OutputFormat::Text => {
                let verb = if result.dry_run { "Would remove" } else { "Removed" };
                if result.actions.is_empty() {
                    println!("Nothing to clean up");
                    return;
                }
                for action in &result.actions {
                    let why = match action.reason {
                        CleanupReason::TicketDone => "ticket is done",
                        CleanupReason::OrphanBranch => "no ticket, no commits ahead",
                    };
                    match &action.worktree {
                        Some(path) => println!(
                            "{verb} branch {} and worktree {} ({why})",
                            action.branch,
                            path.display()
                        ),
                        None => println!("{verb} branch {} ({why})", action.branch),
                    }
                }
            }
        }
    }

    pub fn status(&self, report: &StatusReport) {
        for warning in &report.warnings {
            eprintln!("warning: {warning}");
        }
        match self.format {
            OutputFormat::Json => self.emit(&json!({
                "branch": &report.branch,
                "dirty": report.dirty,
                "current": report.current.as_ref().map(Self::ticket_value),
                "counts": {
                    "todo": report.counts.todo,
                    "doing": report.counts.doing,
                    "done": report.counts.done,
                },
            })),
            OutputFormat::Text => {
                println!("branch: {}{}", report.branch, if report.dirty { " (dirty)" } else { "" });
                match &report.current {
                    Some(ticket) => println!("current ticket: {} ({})", ticket.id, ticket.status),
                    None => println!("current ticket: none"),
                }
                println!(
                    "tickets: {} todo, {} doing, {} done",
                    report.counts.todo, report.counts.doing, report.counts.done
                );
            }
        }
    }

    pub fn worktree_list(&self, records: &[WorktreeRecord]) {
        match self.format {
            OutputFormat::Json => {
                let entries: Vec<Value> = records
                    .iter()
                    .map(|r| json!({ "branch": &r.branch, "path": &r.path }))
                    .collect();
                self.emit(&Value::Array(entries));
            }
            OutputFormat::Text => {
                if records.is_empty() {
                    println!("No ticket worktrees");
                    return;
                }
                for record in records {
                    println!("{}  {}", record.branch, record.path.display());
                }
            }
        }
    }
}

/// Stderr rendering for a surfaced failure: kind, subject, cause chain,
/// and an actionable suggestion when the error classifies as one of the
/// recognizable categories.
pub fn render_error(err: &crate::error::TicketflowError) {
    eprintln!("error: {err}");
    for note in err.context() {
        eprintln!("  note: {note}");
    }
    let mut cause = std::error::Error::source(err);
    while let Some(inner) = cause {
        eprintln!("  caused by: {inner}");
        cause = inner.source();
    }
    if let Some(suggestion) = err.suggestion() {
        eprintln!("  hint: {suggestion}");
    }
}
