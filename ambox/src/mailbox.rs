//! Typed mailboxes and the actor launch primitive
//!
//! An actor owns an [`Inbox`] and processes it serially; everyone else holds
//! [`Mailbox`] handles. A mailbox can be narrowed to a sub-variant of the
//! actor's message type with [`Mailbox::slice`], which is how subscription
//! and reply wiring is done without exposing an actor's full message enum.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// A typed, non-blocking send handle for an actor's inbox.
///
/// Sends never block: inboxes are unbounded. Messages from a single sender
/// to a single receiver are delivered in order. Sending to an actor that has
/// stopped is not an error; the message is dropped.
pub struct Mailbox<M> {
    send: Arc<dyn Fn(M) + Send + Sync>,
}

impl<M> Clone for Mailbox<M> {
    fn clone(&self) -> Self {
        Self {
            send: self.send.clone(),
        }
    }
}

impl<M: Send + 'static> Mailbox<M> {
    /// Wrap a raw channel sender as a mailbox.
    pub fn from_sender(tx: UnboundedSender<M>) -> Self {
        Self {
            send: Arc::new(move |msg| {
                if tx.send(msg).is_err() {
                    tracing::debug!("message to stopped actor dropped");
                }
            }),
        }
    }

    /// Enqueue a message. Never blocks.
    pub fn send(&self, msg: M) {
        (self.send)(msg);
    }

    /// Narrow this mailbox to a sub-variant of its message type.
    ///
    /// The returned mailbox injects into the same inbox via `lift`, so a
    /// component can hand out send endpoints for just the messages it wants
    /// a peer to produce.
    pub fn slice<N>(&self, lift: impl Fn(N) -> M + Send + Sync + 'static) -> Mailbox<N>
    where
        N: Send + 'static,
    {
        let send = self.send.clone();
        Mailbox {
            send: Arc::new(move |msg| send(lift(msg))),
        }
    }
}

/// The receiving half of an actor's inbox.
///
/// Owned exclusively by the actor's message loop. The inbox keeps a sender
/// for itself so the actor can mint self-addressed mailboxes (used by worker
/// threads to report back).
pub struct Inbox<M> {
    tx: UnboundedSender<M>,
    rx: UnboundedReceiver<M>,
}

impl<M: Send + 'static> Inbox<M> {
    /// Create a fresh inbox and a mailbox addressing it.
    pub fn new() -> (Mailbox<M>, Inbox<M>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Mailbox::from_sender(tx.clone()), Inbox { tx, rx })
    }

    /// Wait for the next message.
    pub async fn recv(&mut self) -> Option<M> {
        self.rx.recv().await
    }

    /// Take a message if one is already queued. Used by actors that
    /// coalesce bursts before reacting.
    pub fn try_recv(&mut self) -> Option<M> {
        self.rx.try_recv().ok()
    }

    /// A mailbox addressing this inbox.
    pub fn mailbox(&self) -> Mailbox<M> {
        Mailbox::from_sender(self.tx.clone())
    }

    /// A mailbox addressing this inbox through the given injection.
    pub fn self_mailbox<N>(&self, lift: impl Fn(N) -> M + Send + Sync + 'static) -> Mailbox<N>
    where
        N: Send + 'static,
    {
        self.mailbox().slice(lift)
    }
}

/// Spawn an actor behavior on its own task and return its mailbox.
///
/// The behavior receives the actor's [`Inbox`] and is expected to run a
/// serial message loop over it. The actor lives until its loop returns.
pub fn launch<M, F, Fut>(name: &'static str, behavior: F) -> Mailbox<M>
where
    M: Send + 'static,
    F: FnOnce(Inbox<M>) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (mailbox, inbox) = Inbox::new();
    let fut = behavior(inbox);
    tokio::spawn(async move {
        tracing::debug!(actor = name, "actor started");
        fut.await;
        tracing::debug!(actor = name, "actor stopped");
    });
    mailbox
}
