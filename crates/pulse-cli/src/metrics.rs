//! End-of-session summary line.

use std::time::Duration;

use pulse_core::{SessionOutcome, SessionView, ToolStatus};

/// Format a Duration as human-readable elapsed time (e.g., "1h 23m 45s").
pub fn format_elapsed_time(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    match (hours, minutes, seconds) {
        (h, m, s) if h > 0 => format!("{}h {}m {}s", h, m, s),
        (_, m, s) if m > 0 => format!("{}m {}s", m, s),
        (_, _, s) if s > 0 => format!("{}s", s),
        _ => format!("{}ms", duration.as_millis()),
    }
}

/// Counters shown once a session ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMetrics {
    pub elapsed: Duration,
    pub chars: usize,
    pub tools_completed: usize,
    pub tools_failed: usize,
}

impl SessionMetrics {
    pub fn from_view(view: &SessionView, elapsed: Duration) -> Self {
        let count = |status: ToolStatus| view.tools.iter().filter(|t| t.status == status).count();
        Self {
            elapsed,
            chars: view.text.chars().count(),
            tools_completed: count(ToolStatus::Completed),
            tools_failed: count(ToolStatus::Error),
        }
    }

    pub fn summary_line(&self, outcome: &SessionOutcome) -> String {
        let verb = match outcome {
            SessionOutcome::Streaming => "Still streaming after",
            SessionOutcome::Completed => "Completed in",
            SessionOutcome::Cancelled => "Cancelled after",
            SessionOutcome::BackendError { .. } | SessionOutcome::TransportFailure { .. } => {
                "Failed after"
            }
        };
        let mut line = format!(
            "{} {} · {} chars",
            verb,
            format_elapsed_time(self.elapsed),
            self.chars
        );
        if self.tools_completed > 0 {
            line.push_str(&format!(" · {} tools", self.tools_completed));
        }
        if self.tools_failed > 0 {
            line.push_str(&format!(" · {} failed", self.tools_failed));
        }
        line
    }
}
