//! Latest-status-per-tool bookkeeping for one session.

use tracing::debug;

use crate::event::{ToolEventRecord, ToolStatus};

/// One record per tool name, overwritten in place by newer events.
///
/// Arrival order is authoritative; the embedded timestamp is never used to
/// reorder. Records are never removed, so every tool invoked during the
/// session keeps its last known status.
#[derive(Debug, Clone, Default)]
pub struct ToolStatusTracker {
    /// First-seen order.
    records: Vec<ToolEventRecord>,
}

impl ToolStatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: ToolEventRecord) {
        match self.records.iter_mut().find(|r| r.tool == event.tool) {
            Some(existing) => {
                debug!(
                    tool = %event.tool,
                    from = existing.status.as_str(),
                    to = event.status.as_str(),
                    "Tool status updated"
                );
                *existing = event;
            }
            None => {
                debug!(tool = %event.tool, status = event.status.as_str(), "Tool first seen");
                self.records.push(event);
            }
        }
    }

    /// Running tools first, then everything else; first-seen order within
    /// each group. Recomputed on every call.
    pub fn snapshot(&self) -> Vec<ToolEventRecord> {
        let (mut started, finished): (Vec<_>, Vec<_>) = self
            .records
            .iter()
            .cloned()
            .partition(|r| r.status == ToolStatus::Started);
        started.extend(finished);
        started
    }
}
