//! Cellflow live evaluation engine
//!
//! Watches a source file, parses it into an ordered list of independently
//! evaluable cells, and drives the cells through a pluggable evaluation
//! function, pushing streaming differential updates to any number of
//! subscribed clients.
//!
//! # Architecture
//!
//! Three long-lived actors, each both a subscriber upstream and a
//! publisher downstream:
//!
//! ```text
//! ┌──────────────┐  Overwrite<String>  ┌──────────────┐  NodeListUpdate<I>
//! │ file watcher │ ──────────────────▶ │ cell parser  │ ──────────────────┐
//! └──────────────┘                     └──────────────┘                   ▼
//!                                                             ┌───────────────────┐
//!                    NodeListUpdate<NodeState<I, O>>          │   DAG evaluator   │
//!                ◀────────────────────────────────────────────│  (+ worker jobs)  │
//!                          subscribed clients                 └───────────────────┘
//! ```
//!
//! Data flows strictly forward: file text, then the cell list, then
//! per-cell evaluation status. Each arrow is an incremental stream, a
//! snapshot followed by diffs that reconstruct the producer's state
//! exactly.
//!
//! The language itself stays outside: a front-end supplies a pure parse
//! function and an interruptible evaluation function through
//! [`EngineConfig`], and the engine threads an opaque environment through
//! successive cells.

pub mod block;
pub mod error;
pub mod evaluator;
pub mod parser;
pub mod watcher;

pub use block::{HighlightKind, Lexeme, LexemeId, SourceBlock};
pub use error::EngineError;
pub use evaluator::{CancelToken, EvalFn, EvalMsg};
pub use parser::{ParseFn, ParseMsg};
pub use watcher::WatchMsg;

use ambox::{Mailbox, Subscribe};
use cellflow_types::{NodeList, NodeListUpdate, NodeState, Overwrite};
use notify::RecommendedWatcher;
use std::path::Path;

/// The capabilities a language front-end plugs into the engine.
pub struct EngineConfig<I, O, S> {
    /// Pure parse function: text to ordered cells.
    pub parse: ParseFn<I>,
    /// Evaluation function: environment and cell to output and next
    /// environment. Must tolerate cooperative cancellation.
    pub eval: EvalFn<I, O, S>,
}

impl<I, O, S> EngineConfig<I, O, S> {
    pub fn new(
        parse: impl Fn(&str) -> Vec<I> + Send + Sync + 'static,
        eval: impl Fn(S, &I, &CancelToken) -> (O, S) + Send + Sync + 'static,
    ) -> Self {
        Self {
            parse: std::sync::Arc::new(parse),
            eval: std::sync::Arc::new(eval),
        }
    }
}

/// Handle to a running engine.
///
/// Holds the actor mailboxes and the filesystem watcher guard; dropping
/// the handle detaches the engine from the filesystem. Clients subscribe
/// through it to the per-cell status stream.
pub struct LiveEngine<I, O, S> {
    evaluator: Mailbox<EvalMsg<I, O, S>>,
    _fs_guard: RecommendedWatcher,
}

impl<I, O, S> LiveEngine<I, O, S>
where
    I: Clone + PartialEq + Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
    S: Clone + Send + Sync + 'static,
{
    /// Register `client` for status diffs and return the current snapshot.
    /// Between the snapshot and the first delivered diff no update is lost.
    pub async fn subscribe(
        &self,
        client: Mailbox<NodeListUpdate<NodeState<I, O>>>,
    ) -> NodeList<NodeState<I, O>> {
        ambox::subscribe(&self.results_mailbox(), client).await
    }

    /// The evaluator's subscription endpoint, for callers that manage
    /// their own request/response wiring.
    pub fn results_mailbox(
        &self,
    ) -> Mailbox<Subscribe<NodeList<NodeState<I, O>>, NodeListUpdate<NodeState<I, O>>>> {
        self.evaluator.slice(EvalMsg::Subscribe)
    }
}

/// Start watching and evaluating a source file.
///
/// Spawns the watcher, parser, and evaluator actors and wires their
/// subscriptions, leaves-first. The file need not exist yet: a missing or
/// unreadable file evaluates as empty text.
pub async fn watch_and_eval_file<I, O, S>(
    path: &Path,
    config: EngineConfig<I, O, S>,
    initial_env: S,
) -> Result<LiveEngine<I, O, S>, EngineError>
where
    I: Clone + PartialEq + Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
    S: Clone + Send + Sync + 'static,
{
    let (watch_mailbox, fs_guard) = watcher::spawn(path)?;
    let parse_mailbox = parser::spawn(config.parse);
    let eval_mailbox = evaluator::spawn(config.eval, initial_env);

    // Evaluator subscribes to the parser: the snapshot cell list arrives
    // replayed as a build-from-empty diff.
    parse_mailbox.send(ParseMsg::Subscribe(Subscribe {
        reply: eval_mailbox.slice(|cells: NodeList<I>| EvalMsg::Source(cells.into_update())),
        subscriber: eval_mailbox.slice(EvalMsg::Source),
    }));

    // Parser subscribes to the watcher: the snapshot text arrives as an
    // overwrite of the empty document.
    watch_mailbox.send(WatchMsg::Subscribe(Subscribe {
        reply: parse_mailbox.slice(|text: String| ParseMsg::Text(Overwrite::OverwriteWith(text))),
        subscriber: parse_mailbox.slice(ParseMsg::Text),
    }));

    tracing::info!(path = %path.display(), "watching");

    Ok(LiveEngine {
        evaluator: eval_mailbox,
        _fs_guard: fs_guard,
    })
}
