//! Shared types for cellflow
//!
//! This crate provides the data model the live evaluation pipeline is
//! expressed in: stable cell identities ([`NodeId`]), ordered identity lists
//! with attached values ([`NodeList`]), the monoidal diff types that flow
//! between components ([`TailUpdate`], [`MapUpdate`], [`NodeListUpdate`],
//! [`Overwrite`]), and per-cell evaluation state ([`NodeState`],
//! [`NodeEvalStatus`]).
//!
//! Everything outward-facing serializes to the JSON wire format consumed by
//! UI clients: a snapshot is `{"orderedNodes": […], "nodeMap": {…}}` and a
//! diff is `{"orderedNodesUpdate": …, "nodeMapUpdate": …}`.

use serde::{Deserialize, Serialize};
use std::fmt;

mod node_list;
mod status;
mod update;

pub use node_list::{compute_node_list_update, NodeList};
pub use status::{NodeEvalStatus, NodeState};
pub use update::{MapEltUpdate, MapUpdate, NodeListUpdate, Overwrite, TailUpdate};

/// Stable identity for a cell.
///
/// Identities survive edits: a cell whose parsed form is unchanged keeps its
/// `NodeId` across a re-parse, which is how evaluation results survive edits
/// that only affect later cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl NodeId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        NodeId(id)
    }
}

impl From<NodeId> for u64 {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Monotonic allocator for [`NodeId`]s.
///
/// A plain per-instance counter rather than a global atomic, so identity
/// allocation is deterministic for a given engine instance: the first cell
/// ever parsed gets id 1, the next id 2, and so on. Ids are never reused.
#[derive(Debug)]
pub struct FreshNames {
    next: u64,
}

impl FreshNames {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Allocate the next identity.
    pub fn fresh(&mut self) -> NodeId {
        let id = NodeId(self.next);
        self.next += 1;
        id
    }
}

impl Default for FreshNames {
    fn default() -> Self {
        Self::new()
    }
}

/// A byte range in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Merge two spans to create a span that covers both.
    pub fn merge(&self, other: &Span) -> Self {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}
