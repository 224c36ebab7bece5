//! Monoidal diff types
//!
//! Each diff type here implements [`Update`]: an associative composition
//! with an identity, plus in-place application to its state type. Producers
//! fold several diffs into one batch; subscribers apply the batch and land
//! exactly on the producer's state.

use crate::{NodeId, NodeList};
use ambox::Update;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;

/// Replace-or-keep diff, the file watcher's incremental type.
///
/// `NoChange` is the identity; composition is latest-wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Overwrite<T> {
    NoChange,
    OverwriteWith(T),
}

impl<T: Clone> Update for Overwrite<T> {
    type State = T;

    fn empty() -> Self {
        Overwrite::NoChange
    }

    fn then(self, later: Self) -> Self {
        match later {
            Overwrite::NoChange => self,
            overwrite => overwrite,
        }
    }

    fn is_empty(&self) -> bool {
        matches!(self, Overwrite::NoChange)
    }

    fn apply_to(&self, state: &mut T) {
        if let Overwrite::OverwriteWith(value) = self {
            *state = value.clone();
        }
    }
}

/// Edit at the tail of an ordered list: drop the last `num_dropped`
/// elements, then append `new_tail`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TailUpdate<A> {
    pub num_dropped: usize,
    pub new_tail: Vec<A>,
}

impl<A: Clone> Update for TailUpdate<A> {
    type State = Vec<A>;

    fn empty() -> Self {
        Self {
            num_dropped: 0,
            new_tail: Vec::new(),
        }
    }

    /// Collapse two tail edits into one. A later drop first consumes the
    /// earlier append; only the remainder deepens the drop into the
    /// original list.
    fn then(self, later: Self) -> Self {
        let TailUpdate {
            num_dropped,
            mut new_tail,
        } = self;
        if later.num_dropped <= new_tail.len() {
            let keep = new_tail.len() - later.num_dropped;
            new_tail.truncate(keep);
            new_tail.extend(later.new_tail);
            TailUpdate {
                num_dropped,
                new_tail,
            }
        } else {
            TailUpdate {
                num_dropped: num_dropped + (later.num_dropped - new_tail.len()),
                new_tail: later.new_tail,
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.num_dropped == 0 && self.new_tail.is_empty()
    }

    fn apply_to(&self, state: &mut Vec<A>) {
        let keep = state.len().saturating_sub(self.num_dropped);
        state.truncate(keep);
        state.extend(self.new_tail.iter().cloned());
    }
}

/// Diff for a single map entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tag", content = "value", rename_all = "lowercase")]
pub enum MapEltUpdate<A> {
    Create(A),
    Update(A),
    Delete,
}

impl<A> MapEltUpdate<A> {
    /// Compose two entry diffs. `None` means the pair annihilates: an entry
    /// created and deleted within one batch never existed for observers.
    ///
    /// The remaining pairings (create-after-create, update-after-delete, …)
    /// cannot be produced by a consistent producer; composition keeps the
    /// later edit so a release-build subscriber degrades gracefully.
    fn then(self, later: Self) -> Option<Self> {
        use MapEltUpdate::*;
        match (self, later) {
            (Create(_), Update(b)) => Some(Create(b)),
            (Create(_), Delete) => None,
            (Update(_), Update(b)) => Some(Update(b)),
            (Update(_), Delete) => Some(Delete),
            (Delete, Create(b)) => Some(Update(b)),
            (_, later) => {
                debug_assert!(false, "inconsistent map entry composition");
                Some(later)
            }
        }
    }
}

/// Point-wise diff over a map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
#[serde(bound(
    serialize = "K: Serialize, A: Serialize",
    deserialize = "K: Deserialize<'de> + Eq + Hash, A: Deserialize<'de>"
))]
pub struct MapUpdate<K, A>(pub HashMap<K, MapEltUpdate<A>>);

impl<K: Eq + Hash, A: PartialEq> PartialEq for MapUpdate<K, A> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<K: Eq + Hash, A: Eq> Eq for MapUpdate<K, A> {}

impl<K: Eq + Hash, A> MapUpdate<K, A> {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// A diff touching a single key.
    pub fn single(key: K, update: MapEltUpdate<A>) -> Self {
        let mut entries = HashMap::new();
        entries.insert(key, update);
        Self(entries)
    }

    pub fn insert(&mut self, key: K, update: MapEltUpdate<A>) {
        self.0.insert(key, update);
    }
}

impl<K: Eq + Hash, A> Default for MapUpdate<K, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, A> Update for MapUpdate<K, A>
where
    K: Eq + Hash + Clone,
    A: Clone,
{
    type State = HashMap<K, A>;

    fn empty() -> Self {
        Self::new()
    }

    fn then(mut self, later: Self) -> Self {
        for (key, second) in later.0 {
            match self.0.remove(&key) {
                None => {
                    self.0.insert(key, second);
                }
                Some(first) => {
                    if let Some(combined) = first.then(second) {
                        self.0.insert(key, combined);
                    }
                }
            }
        }
        self
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn apply_to(&self, state: &mut HashMap<K, A>) {
        for (key, update) in &self.0 {
            match update {
                MapEltUpdate::Create(value) => {
                    let previous = state.insert(key.clone(), value.clone());
                    debug_assert!(previous.is_none(), "create over existing map entry");
                }
                MapEltUpdate::Update(value) => {
                    let previous = state.insert(key.clone(), value.clone());
                    debug_assert!(previous.is_some(), "update of absent map entry");
                }
                MapEltUpdate::Delete => {
                    let previous = state.remove(key);
                    debug_assert!(previous.is_some(), "delete of absent map entry");
                }
            }
        }
    }
}

/// Diff over a [`NodeList`]: a tail edit on the identity order plus a
/// point-wise edit on the attached values.
///
/// Consistent by construction: every id appearing in `new_tail` has a
/// `Create` entry, every dropped id a `Delete` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeListUpdate<A> {
    #[serde(rename = "orderedNodesUpdate")]
    pub ordered: TailUpdate<NodeId>,
    #[serde(rename = "nodeMapUpdate")]
    pub nodes: MapUpdate<NodeId, A>,
}

impl<A> NodeListUpdate<A> {
    /// A diff replacing a single node's value.
    pub fn elt_update(id: NodeId, value: A) -> Self
    where
        A: Clone,
    {
        Self {
            ordered: TailUpdate::empty(),
            nodes: MapUpdate::single(id, MapEltUpdate::Update(value)),
        }
    }

    /// Transform the attached values, preserving structure. Used to lift a
    /// parser diff into an evaluator diff by wrapping each new cell input
    /// in its initial evaluation state.
    pub fn map_values<B>(self, f: impl Fn(A) -> B) -> NodeListUpdate<B> {
        let nodes = self
            .nodes
            .0
            .into_iter()
            .map(|(id, update)| {
                let update = match update {
                    MapEltUpdate::Create(value) => MapEltUpdate::Create(f(value)),
                    MapEltUpdate::Update(value) => MapEltUpdate::Update(f(value)),
                    MapEltUpdate::Delete => MapEltUpdate::Delete,
                };
                (id, update)
            })
            .collect();
        NodeListUpdate {
            ordered: self.ordered,
            nodes: MapUpdate(nodes),
        }
    }
}

impl<A: Clone> Update for NodeListUpdate<A> {
    type State = NodeList<A>;

    fn empty() -> Self {
        Self {
            ordered: TailUpdate::empty(),
            nodes: MapUpdate::empty(),
        }
    }

    fn then(self, later: Self) -> Self {
        Self {
            ordered: self.ordered.then(later.ordered),
            nodes: self.nodes.then(later.nodes),
        }
    }

    fn is_empty(&self) -> bool {
        self.ordered.is_empty() && self.nodes.is_empty()
    }

    fn apply_to(&self, state: &mut NodeList<A>) {
        state.apply_parts(&self.ordered, &self.nodes);
    }
}
