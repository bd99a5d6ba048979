//! Progress events emitted during a merge and the sink they are pushed to.
//!
//! The engine never talks to a UI directly: hosts hand in a `ProgressSink`
//! (a closure, a `ChannelSink`, or `NullSink`) and forward events as they like.

use serde::Serialize;
use std::sync::mpsc::Sender;

/// Event name for status and progress payloads
pub const MERGE_PROGRESS: &str = "mergeProgress";
/// Event name for the payload-less cancellation notice
pub const MERGE_CANCELLED: &str = "mergeCancelled";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MergeEvent {
    /// Numeric progress: seconds written so far out of the total
    Progress {
        percentage: f64,
        current: f64,
        total: f64,
        message: String,
    },
    /// Plain status line
    Status { message: String },
    /// The running merge was cancelled
    Cancelled,
}

impl MergeEvent {
    pub fn status(message: impl Into<String>) -> Self {
        Self::Status {
            message: message.into(),
        }
    }

    pub fn progress(percentage: f64, current: f64, total: f64) -> Self {
        Self::Progress {
            percentage,
            current,
            total,
            message: format!("Merging... {:.1}%", percentage),
        }
    }

    /// Name a UI bridge would publish this event under
    pub fn name(&self) -> &'static str {
        match self {
            Self::Cancelled => MERGE_CANCELLED,
            _ => MERGE_PROGRESS,
        }
    }

    /// One JSON object per event: `{"event": name, "payload": ...}`
    pub fn to_json_line(&self) -> String {
        let value = match self {
            Self::Cancelled => serde_json::json!({ "event": self.name() }),
            _ => serde_json::json!({ "event": self.name(), "payload": self }),
        };
        value.to_string()
    }
}

/// Receiver of merge events. Implementations must not block for long:
/// events are emitted from the thread driving the merge.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: MergeEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(MergeEvent) + Send + Sync,
{
    fn emit(&self, event: MergeEvent) {
        self(event)
    }
}

/// Forwards events into an mpsc channel
#[derive(Debug, Clone)]
pub struct ChannelSink(pub Sender<MergeEvent>);

impl ProgressSink for ChannelSink {
    fn emit(&self, event: MergeEvent) {
        // A dropped receiver only means nobody is listening any more
        let _ = self.0.send(event);
    }
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: MergeEvent) {}
}
