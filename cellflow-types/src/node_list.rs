//! Ordered identity lists
//!
//! A [`NodeList`] pairs an ordered sequence of [`NodeId`]s with a map from
//! id to attached value. The two views are kept consistent: the map's key
//! set always equals the set of ordered ids, and the order has no
//! duplicates. Both the parser's cell list and the evaluator's per-cell
//! state use this shape.

use crate::update::{MapEltUpdate, MapUpdate, NodeListUpdate, TailUpdate};
use crate::{FreshNames, NodeId};
use ambox::Update;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An ordered sequence of node identities with attached values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeList<A> {
    ordered_nodes: Vec<NodeId>,
    node_map: HashMap<NodeId, A>,
}

impl<A> NodeList<A> {
    pub fn new() -> Self {
        Self {
            ordered_nodes: Vec::new(),
            node_map: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.ordered_nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered_nodes.is_empty()
    }

    /// Node identities in list order.
    pub fn ids(&self) -> &[NodeId] {
        &self.ordered_nodes
    }

    pub fn get(&self, id: &NodeId) -> Option<&A> {
        self.node_map.get(id)
    }

    /// Attached values in list order.
    pub fn values(&self) -> impl Iterator<Item = &A> {
        self.ordered_nodes.iter().map(|id| {
            self.node_map
                .get(id)
                .expect("ordered node missing from node map")
        })
    }

    /// The diff that builds this list from an empty one. Used to replay a
    /// snapshot through a diff-shaped channel.
    pub fn into_update(self) -> NodeListUpdate<A> {
        let mut nodes = MapUpdate::new();
        for (id, value) in self.node_map {
            nodes.insert(id, MapEltUpdate::Create(value));
        }
        NodeListUpdate {
            ordered: TailUpdate {
                num_dropped: 0,
                new_tail: self.ordered_nodes,
            },
            nodes,
        }
    }

    pub(crate) fn apply_parts(
        &mut self,
        ordered: &TailUpdate<NodeId>,
        nodes: &MapUpdate<NodeId, A>,
    ) where
        A: Clone,
    {
        ordered.apply_to(&mut self.ordered_nodes);
        nodes.apply_to(&mut self.node_map);
        debug_assert_eq!(self.ordered_nodes.len(), self.node_map.len());
    }
}

impl<A> Default for NodeList<A> {
    fn default() -> Self {
        Self::new()
    }
}

/// Diff a node list against a freshly parsed value sequence.
///
/// Values are compared position-wise; the longest common prefix keeps its
/// identities, everything after it is dropped and the new suffix gets fresh
/// ids. Deliberately a prefix comparison, not an LCS: under the linear
/// dependency model any change at position `k` invalidates every later
/// cell, even one whose text happens to reparse identically.
pub fn compute_node_list_update<A>(
    list: &NodeList<A>,
    new_values: Vec<A>,
    names: &mut FreshNames,
) -> NodeListUpdate<A>
where
    A: Clone + PartialEq,
{
    let prefix = list
        .values()
        .zip(new_values.iter())
        .take_while(|(old, new)| *old == *new)
        .count();

    let mut nodes = MapUpdate::new();
    for id in &list.ordered_nodes[prefix..] {
        nodes.insert(*id, MapEltUpdate::Delete);
    }

    let mut new_tail = Vec::with_capacity(new_values.len() - prefix);
    for value in new_values.into_iter().skip(prefix) {
        let id = names.fresh();
        nodes.insert(id, MapEltUpdate::Create(value));
        new_tail.push(id);
    }

    NodeListUpdate {
        ordered: TailUpdate {
            num_dropped: list.len() - prefix,
            new_tail,
        },
        nodes,
    }
}
