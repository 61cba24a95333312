//! Channels between a pipeline and the world outside its owner thread.
//!
//! - [`ChangeNotifier`]: lets sources (or any other thread) report that a
//!   stage's output changed. Notifications are applied on the next
//!   `Pipeline::process_events`.
//! - [`ProgressSink`]: optional observer receiving progress and status
//!   updates, e.g. a status bar.

use super::status::PipelineStatus;
use super::time::TimeInterval;
use crate::id::NodeId;
use crossbeam_channel::Sender;

/// A stage's output changed over `interval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeNotification {
    pub node: NodeId,
    pub interval: TimeInterval,
}

/// Cloneable, thread-safe handle for reporting changes to one pipeline.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    tx: Sender<ChangeNotification>,
    node: NodeId,
}

impl ChangeNotifier {
    pub(crate) fn new(tx: Sender<ChangeNotification>, node: NodeId) -> Self {
        Self { tx, node }
    }

    /// Node this notifier reports for.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Report that the output changed over `interval`.
    ///
    /// Returns false once the pipeline is gone.
    pub fn target_changed(&self, interval: TimeInterval) -> bool {
        self.tx
            .send(ChangeNotification {
                node: self.node,
                interval,
            })
            .is_ok()
    }
}

/// Receives progress and status updates. Implementations must not block.
pub trait ProgressSink: Send + Sync {
    /// Fractional progress of background work running for `node`.
    fn progress(&self, node: NodeId, fraction: f64, text: Option<&str>);

    /// The status of `node` changed.
    fn status(&self, node: NodeId, status: &PipelineStatus);
}
