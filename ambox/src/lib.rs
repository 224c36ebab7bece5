//! Ambox - mailbox actor runtime for cellflow
//!
//! This crate provides the two pieces of infrastructure the live evaluation
//! pipeline is built from:
//!
//! - A minimal **actor runtime**: each actor owns a typed inbox and runs a
//!   message loop on its own task. Everyone else holds [`Mailbox`] handles,
//!   which are cloneable, non-blocking send endpoints.
//! - **Incremental state servers**: a [`server::StateServer`] owns a state
//!   value and serves it incrementally. Subscribers get the full state once,
//!   then a stream of monoidal diffs that reconstructs every later state.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────┐   diffs    ┌────────────────────┐   diffs
//! │  Producer actor    │ ─────────▶ │  Consumer actor    │ ─────────▶ …
//! │  ┌──────────────┐  │            │  ┌──────────────┐  │
//! │  │ StateServer  │  │  snapshot  │  │ StateServer  │  │
//! │  │ state+pending│  │ ─────────▶ │  │ state+pending│  │
//! │  └──────────────┘  │ (on sub)   │  └──────────────┘  │
//! └────────────────────┘            └────────────────────┘
//! ```
//!
//! Actors are spawned with [`launch`] and communicate only by sending
//! messages; an actor may block (await) on its own inbox and on nothing
//! else. Request/response is done by including a reply mailbox in the
//! request, typically produced by narrowing the caller's own inbox with
//! [`Mailbox::slice`].

pub mod mailbox;
pub mod server;

pub use mailbox::{launch, Inbox, Mailbox};
pub use server::{subscribe, StateServer, Subscribe, Update};
