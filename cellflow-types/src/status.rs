//! Per-cell evaluation state

use serde::{Deserialize, Serialize};

/// Where a cell is in its evaluation lifecycle.
///
/// A cell is created `Waiting`, becomes `Running` when a job is launched
/// for it, and `Complete` when the job reports back. It never leaves
/// `Complete` except by deletion: re-evaluation after an edit is modelled
/// as deleting the old identity and creating a fresh one.
///
/// Serializes externally tagged: `"Waiting"`, `"Running"`, or
/// `{"Complete": <output>}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeEvalStatus<O> {
    Waiting,
    Running,
    Complete(O),
}

impl<O> NodeEvalStatus<O> {
    pub fn is_complete(&self) -> bool {
        matches!(self, NodeEvalStatus::Complete(_))
    }

    pub fn is_running(&self) -> bool {
        matches!(self, NodeEvalStatus::Running)
    }

    /// The completed output, if any.
    pub fn output(&self) -> Option<&O> {
        match self {
            NodeEvalStatus::Complete(output) => Some(output),
            _ => None,
        }
    }
}

/// A cell's parsed input paired with its evaluation status.
///
/// The input is kept alongside the status because invalidation is decided
/// by comparing inputs for equality during re-parses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeState<I, O> {
    pub input: I,
    pub status: NodeEvalStatus<O>,
}

impl<I, O> NodeState<I, O> {
    /// The state of a freshly created cell.
    pub fn waiting(input: I) -> Self {
        Self {
            input,
            status: NodeEvalStatus::Waiting,
        }
    }
}
