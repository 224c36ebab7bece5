//! Cell parser actor
//!
//! Subscribes to the file watcher, re-parses each snapshot with the
//! pluggable parse function, and maintains the ordered cell list with
//! stable identities. Each text change becomes at most one
//! [`NodeListUpdate`]: the longest common prefix of old and new cells keeps
//! its [`NodeId`]s, the rest of the old list is dropped and the new suffix
//! gets fresh ids.

use ambox::{Inbox, Mailbox, StateServer, Subscribe, Update};
use cellflow_types::{
    compute_node_list_update, FreshNames, NodeList, NodeListUpdate, Overwrite,
};
use std::sync::Arc;

/// Pure parse function supplied by the language front-end.
///
/// Must be total (parse errors are encoded in the cell type) and produce
/// equality-comparable cells; equality is what decides invalidation.
pub type ParseFn<I> = Arc<dyn Fn(&str) -> Vec<I> + Send + Sync>;

/// Messages handled by the parser actor.
pub enum ParseMsg<I> {
    /// A text snapshot or change from the watcher.
    Text(Overwrite<String>),
    /// Downstream subscription to the cell list.
    Subscribe(Subscribe<NodeList<I>, NodeListUpdate<I>>),
}

/// Actor state: the parse function, the identity allocator, and the
/// cell-list server.
pub struct CellParser<I> {
    parse: ParseFn<I>,
    names: FreshNames,
    server: StateServer<NodeList<I>, NodeListUpdate<I>>,
}

impl<I> CellParser<I>
where
    I: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new(parse: ParseFn<I>) -> Self {
        Self {
            parse,
            names: FreshNames::new(),
            server: StateServer::new(NodeList::new()),
        }
    }

    fn on_text(&mut self, change: Overwrite<String>) {
        let text = match change {
            Overwrite::NoChange => return,
            Overwrite::OverwriteWith(text) => text,
        };
        let new_cells = (self.parse)(&text);
        let update = compute_node_list_update(self.server.state(), new_cells, &mut self.names);
        if update.is_empty() {
            return;
        }
        tracing::debug!(
            dropped = update.ordered.num_dropped,
            created = update.ordered.new_tail.len(),
            total = self.server.state().len() - update.ordered.num_dropped
                + update.ordered.new_tail.len(),
            "cell list updated"
        );
        self.server.update(update);
        self.server.flush_diffs();
    }

    /// Serial message loop. Consecutive queued text changes are composed
    /// latest-wins before parsing, so a burst of edits costs one re-parse
    /// and subscribers see one composite diff.
    pub async fn run(mut self, mut inbox: Inbox<ParseMsg<I>>) {
        while let Some(msg) = inbox.recv().await {
            match msg {
                ParseMsg::Text(mut change) => {
                    let mut deferred = None;
                    while let Some(next) = inbox.try_recv() {
                        match next {
                            ParseMsg::Text(later) => change = change.then(later),
                            other => {
                                deferred = Some(other);
                                break;
                            }
                        }
                    }
                    self.on_text(change);
                    if let Some(ParseMsg::Subscribe(request)) = deferred {
                        self.server.subscribe(request);
                    }
                }
                ParseMsg::Subscribe(request) => self.server.subscribe(request),
            }
        }
    }
}

/// Spawn the parser actor.
pub fn spawn<I>(parse: ParseFn<I>) -> Mailbox<ParseMsg<I>>
where
    I: Clone + PartialEq + Send + Sync + 'static,
{
    let actor = CellParser::new(parse);
    ambox::launch("cell-parser", |inbox| actor.run(inbox))
}
