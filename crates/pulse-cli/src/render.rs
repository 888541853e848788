//! Live terminal rendering of session views.
//!
//! Generated content goes to stdout. Tool pills, phase changes and the final
//! summary go to stderr, so `pulse generate ... > post.txt` captures only the
//! post.

use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crossterm::style::Stylize;
use pulse_core::{
    group_by_category, ReasoningPhase, SessionObserver, SessionOutcome, SessionView,
    ToolDisplayTable, ToolEventRecord, ToolStatus,
};

use crate::metrics::SessionMetrics;

/// How the printed text must change to match a new view.
#[derive(Debug, PartialEq, Eq)]
pub enum TextUpdate<'a> {
    Unchanged,
    Append(&'a str),
    /// A content snapshot rewrote text that was already printed.
    Replace(&'a str),
}

pub fn text_update<'a>(printed: &str, current: &'a str) -> TextUpdate<'a> {
    if current == printed {
        TextUpdate::Unchanged
    } else if let Some(suffix) = current.strip_prefix(printed) {
        TextUpdate::Append(suffix)
    } else {
        TextUpdate::Replace(current)
    }
}

pub fn tool_line(record: &ToolEventRecord, table: &ToolDisplayTable) -> String {
    let display = table.lookup(&record.tool);
    let status = match record.status {
        ToolStatus::Started => "running".yellow(),
        ToolStatus::Completed => "done".green(),
        ToolStatus::Error => "failed".red(),
    };
    let mut line = format!(
        "  {} {} {}",
        display.icon,
        table.label(&record.tool).bold(),
        status
    );
    if let Some(message) = &record.message {
        line.push_str(&format!(" {}", format!("({})", message).dark_grey()));
    }
    line
}

pub fn phase_line(phase: ReasoningPhase) -> String {
    format!(
        "  {} {}",
        format!("[{}/3]", phase.step()).dark_grey(),
        phase.label().cyan()
    )
}

/// Tool groups, outcome and follow-up hints for a finished session.
pub fn summary(view: &SessionView, table: &ToolDisplayTable, elapsed: Duration) -> String {
    let mut out = String::new();

    let groups = group_by_category(&view.tools, table);
    if !groups.is_empty() {
        out.push_str(&format!("{}\n", "Tools used".bold()));
        for group in groups {
            let names: Vec<String> = group
                .records
                .iter()
                .map(|record| {
                    let display = table.lookup(&record.tool);
                    let mark = if record.status == ToolStatus::Error { " ✗" } else { "" };
                    format!("{} {}{}", display.icon, table.label(&record.tool), mark)
                })
                .collect();
            out.push_str(&format!("  {}: {}\n", group.category.title(), names.join(", ")));
        }
    }

    let line = SessionMetrics::from_view(view, elapsed).summary_line(&view.outcome);
    match &view.outcome {
        SessionOutcome::Completed => out.push_str(&format!("{}\n", line.green())),
        SessionOutcome::Cancelled | SessionOutcome::Streaming => {
            out.push_str(&format!("{}\n", line.yellow()))
        }
        SessionOutcome::BackendError { message } => {
            out.push_str(&format!("{}\n", line.red()));
            out.push_str(&format!("Backend error: {}\n", message));
        }
        SessionOutcome::TransportFailure { message, .. } => {
            out.push_str(&format!("{}\n", line.red()));
            out.push_str(&format!("Connection problem: {}\n", message));
            if view.outcome.suggests_retry() {
                out.push_str("This is usually temporary; try again.\n");
            }
        }
    }

    if view.outcome == SessionOutcome::Completed {
        if let Some(thread_id) = &view.thread_id {
            out.push_str(&format!(
                "{}\n",
                format!("Refine with: pulse refine --thread-id {} \"<feedback>\"", thread_id)
                    .dark_grey()
            ));
        }
    }
    out
}

#[derive(Debug, Default)]
struct RenderState {
    printed: String,
    tools: HashMap<String, ToolStatus>,
    phase: ReasoningPhase,
}

/// Session observer that streams text to stdout and status to stderr.
#[derive(Debug)]
pub struct TerminalRenderer {
    table: ToolDisplayTable,
    live: bool,
    state: Mutex<RenderState>,
}

impl TerminalRenderer {
    /// With `live == false` nothing is printed while streaming.
    pub fn new(table: ToolDisplayTable, live: bool) -> Self {
        Self {
            table,
            live,
            state: Mutex::new(RenderState::default()),
        }
    }

    pub fn table(&self) -> &ToolDisplayTable {
        &self.table
    }

    /// Whether stdout was left mid-line.
    pub fn needs_newline(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        !state.printed.is_empty() && !state.printed.ends_with('\n')
    }
}

impl SessionObserver for TerminalRenderer {
    fn on_update(&self, view: &SessionView) {
        if !self.live {
            return;
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stdout = io::stdout().lock();
        let mut stderr = io::stderr().lock();

        for record in &view.tools {
            if state.tools.get(&record.tool) != Some(&record.status) {
                let _ = writeln!(stderr, "{}", tool_line(record, &self.table));
                state.tools.insert(record.tool.clone(), record.status);
            }
        }

        if view.phase != state.phase {
            let _ = writeln!(stderr, "{}", phase_line(view.phase));
            state.phase = view.phase;
        }

        match text_update(&state.printed, &view.text) {
            TextUpdate::Unchanged => {}
            TextUpdate::Append(suffix) => {
                let _ = write!(stdout, "{}", suffix);
            }
            TextUpdate::Replace(text) => {
                let _ = writeln!(stdout);
                let _ = writeln!(stderr, "{}", "── revised ──".dark_grey());
                let _ = write!(stdout, "{}", text);
            }
        }
        let _ = stdout.flush();
        state.printed = view.text.clone();
    }
}
