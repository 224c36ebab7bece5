//! Incremental state servers
//!
//! A state server owns a state value and serves it incrementally: a new
//! subscriber atomically receives the full current state, then a stream of
//! diffs that reconstructs every later state exactly. Producers batch the
//! updates belonging to one logical reaction and commit them with a single
//! [`StateServer::flush_diffs`]; subscribers never observe a half-applied
//! batch.

use crate::mailbox::Mailbox;
use tokio::sync::mpsc;

/// A composable diff over some state type.
///
/// Implementations form a monoid: [`Update::empty`] is the identity of
/// [`Update::then`], and `then` is associative. Application must respect
/// composition: applying `a.then(b)` equals applying `a` then `b`.
pub trait Update: Clone {
    /// The state this diff applies to.
    type State;

    /// The diff that changes nothing.
    fn empty() -> Self;

    /// Sequential composition: `self` first, `later` second, collapsed
    /// into a single diff.
    fn then(self, later: Self) -> Self;

    /// Whether this diff is observably the identity.
    fn is_empty(&self) -> bool;

    /// Apply this diff to a state in place.
    fn apply_to(&self, state: &mut Self::State);
}

/// Subscription request for a state server over state `S` with diffs `U`.
///
/// Delivered through the inbox of the actor owning the server, so snapshot
/// delivery and registration are atomic with respect to its message loop.
pub struct Subscribe<S, U> {
    /// Where the one-off state snapshot goes.
    pub reply: Mailbox<S>,
    /// Where every subsequently flushed diff goes.
    pub subscriber: Mailbox<U>,
}

/// A state value served incrementally to any number of subscribers.
pub struct StateServer<S, U> {
    state: S,
    pending: U,
    subscribers: Vec<Mailbox<U>>,
}

impl<S, U> StateServer<S, U>
where
    S: Clone + Send + 'static,
    U: Update<State = S> + Send + 'static,
{
    /// Create a server holding the given initial state.
    pub fn new(state: S) -> Self {
        Self {
            state,
            pending: U::empty(),
            subscribers: Vec::new(),
        }
    }

    /// The server's current state.
    ///
    /// This is the producer's own view: updates are applied here as soon as
    /// they are issued, while subscribers only see them at the next flush.
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Answer a subscription: send the current state to the reply mailbox
    /// and register the subscriber for all future flushed diffs.
    ///
    /// Must not be called mid-batch; every handler flushes before returning
    /// to the message loop, so subscriptions always see a committed state.
    pub fn subscribe(&mut self, request: Subscribe<S, U>) {
        debug_assert!(self.pending.is_empty(), "subscribe with unflushed diffs");
        request.reply.send(self.state.clone());
        self.subscribers.push(request.subscriber);
    }

    /// Apply a diff to the state and fold it into the pending batch.
    pub fn update(&mut self, diff: U) {
        diff.apply_to(&mut self.state);
        let pending = std::mem::replace(&mut self.pending, U::empty());
        self.pending = pending.then(diff);
    }

    /// Commit the pending batch: broadcast it to every subscriber and reset
    /// the accumulator. A no-op when nothing is pending.
    pub fn flush_diffs(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let batch = std::mem::replace(&mut self.pending, U::empty());
        for subscriber in &self.subscribers {
            subscriber.send(batch.clone());
        }
    }
}

/// Subscribe to a state server from outside its actor.
///
/// Sends a [`Subscribe`] request and waits for the snapshot. The returned
/// state together with the diffs arriving at `client` reconstructs the
/// producer's state exactly; no diff is lost in between.
pub async fn subscribe<S, U>(server: &Mailbox<Subscribe<S, U>>, client: Mailbox<U>) -> S
where
    S: Send + 'static,
    U: Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel();
    server.send(Subscribe {
        reply: Mailbox::from_sender(tx),
        subscriber: client,
    });
    rx.recv().await.expect("state server dropped without replying")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::{launch, Inbox};

    /// Toy diff: append a suffix to a string state.
    #[derive(Debug, Clone, PartialEq)]
    struct Append(String);

    impl Update for Append {
        type State = String;

        fn empty() -> Self {
            Append(String::new())
        }

        fn then(self, later: Self) -> Self {
            Append(self.0 + &later.0)
        }

        fn is_empty(&self) -> bool {
            self.0.is_empty()
        }

        fn apply_to(&self, state: &mut String) {
            state.push_str(&self.0);
        }
    }

    fn client<M: Send + 'static>() -> (Mailbox<M>, mpsc::UnboundedReceiver<M>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Mailbox::from_sender(tx), rx)
    }

    #[test]
    fn test_subscribe_then_flush_delivers_composite() {
        let mut server = StateServer::<String, Append>::new("base".to_string());

        let (sub, mut rx) = client();
        let (reply, mut snap_rx) = client();
        server.subscribe(Subscribe {
            reply,
            subscriber: sub,
        });
        assert_eq!(snap_rx.try_recv().unwrap(), "base");

        // A logical reaction made of several updates flushes as one diff.
        server.update(Append("-a".into()));
        server.update(Append("-b".into()));
        server.update(Append("-c".into()));
        server.flush_diffs();

        assert_eq!(rx.try_recv().unwrap(), Append("-a-b-c".into()));
        assert!(rx.try_recv().is_err());
        assert_eq!(server.state(), "base-a-b-c");
    }

    #[test]
    fn test_flush_without_updates_broadcasts_nothing() {
        let mut server = StateServer::<String, Append>::new(String::new());
        let (sub, mut rx) = client();
        let (reply, _snap_rx) = client();
        server.subscribe(Subscribe {
            reply,
            subscriber: sub,
        });

        server.flush_diffs();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_updates_apply_eagerly_to_producer_state() {
        let mut server = StateServer::<String, Append>::new("x".to_string());
        server.update(Append("y".into()));
        assert_eq!(server.state(), "xy");
    }

    #[tokio::test]
    async fn test_subscribe_helper_roundtrip() {
        enum Msg {
            Subscribe(Subscribe<String, Append>),
            Push(Append),
        }

        let mb = launch("toy-server", |mut inbox: Inbox<Msg>| async move {
            let mut server = StateServer::<String, Append>::new("init".to_string());
            while let Some(msg) = inbox.recv().await {
                match msg {
                    Msg::Subscribe(req) => server.subscribe(req),
                    Msg::Push(diff) => {
                        server.update(diff);
                        server.flush_diffs();
                    }
                }
            }
        });

        let (sub, mut rx) = client();
        let snapshot = subscribe(&mb.slice(Msg::Subscribe), sub).await;
        assert_eq!(snapshot, "init");

        mb.send(Msg::Push(Append("!".into())));
        let diff = rx.recv().await.unwrap();

        let mut replica = snapshot;
        diff.apply_to(&mut replica);
        assert_eq!(replica, "init!");
    }
}
