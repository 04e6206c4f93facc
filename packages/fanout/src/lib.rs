#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! # fanout
//!
//! In-process publish/subscribe: an [`Event`] broadcasts a typed argument to every callback
//! subscribed to it, in a well-defined priority order, and copes with the awkward cases that
//! event systems run into in practice:
//!
//! * A callback fires the event it is subscribed to, or adds more callbacks to it.
//! * Two threads fire the same event at the same time.
//! * A subscriber goes away while still subscribed.
//! * Subscribers must not run on the thread that raised the event, or not yet.
//!
//! # Subscribing and firing
//!
//! ```
//! use std::sync::{Arc, Mutex};
//!
//! use fanout::{Event, Priority, Request};
//!
//! let requests = Event::<String>::new();
//! let seen = Arc::new(Mutex::new(Vec::new()));
//!
//! // Reject empty paths before anything else sees them.
//! requests.add(Priority::Condition, |path: &String| {
//!     if path.is_empty() { Request::Skip } else { Request::Continue }
//! });
//!
//! let log = Arc::clone(&seen);
//! requests.add(0, move |path: &String| log.lock().unwrap().push(path.clone()));
//!
//! requests.fire(String::from("/index.html"));
//! requests.fire(String::new());
//!
//! assert_eq!(*seen.lock().unwrap(), ["/index.html"]);
//! ```
//!
//! # Priorities
//!
//! Every connection is placed in a bucket according to its [`Priority`]. Buckets run in this
//! order:
//!
//! 1. [`Priority::Condition`] - in insertion order. A [`Request::Skip`] here cancels the rest
//!    of the fire.
//! 2. [`Priority::First`] - most recently added first.
//! 3. Positive numbers - highest number first, insertion order within a number.
//! 4. Zero - insertion order.
//! 5. Negative numbers - closest to zero first, most recently added first within a number.
//! 6. [`Priority::Last`] - most recently added first.
//!
//! Outside the condition bucket, [`Request::Skip`] only skips the remainder of the bucket it was
//! returned in. [`EventState::skip()`] cancels the rest of the fire from anywhere.
//!
//! # Lifetimes
//!
//! Every connection carries a [`Validator`]. A connection whose validator has become invalid is
//! never invoked again and is removed from its event the next time the event fires. The owning
//! side of a validator is an [`Invalidator`]; [`Handler`] packages a callback together with the
//! invalidators of all its subscriptions, so dropping the handler unsubscribes it everywhere.
//!
//! ```
//! use fanout::{Event, Handler};
//!
//! let ticks = Event::<u64>::new();
//!
//! {
//!     let mut handler = Handler::new(|tick: &u64| println!("tick {tick}"));
//!     handler.subscribe(&ticks, 0);
//!     ticks.fire(1);
//! }
//!
//! // The handler is gone, so this fire prunes its connection.
//! ticks.fire(2);
//! assert!(ticks.is_empty());
//! ```
//!
//! # Deferred delivery
//!
//! An event with a [`Manager`] attached does not run its subscribers when fired. The fire is
//! queued on the manager and runs when the owner of the manager drains it, typically once per
//! iteration of some main loop.
//!
//! [`Queue`] buffers arguments and replays them on demand, optionally filtered by conditions.
//! [`Chain`] is an event that is fired by the events it follows, for building pipelines.
//!
//! # Diagnostics
//!
//! The crate emits structured diagnostics through [`tracing`](https://docs.rs/tracing): `trace`
//! level for per-fire details such as deferrals and staging, `debug` level for manager drain
//! summaries and link teardown. It never installs a subscriber of its own.

mod buckets;
mod chain;
mod connection;
mod constants;
mod error;
mod event;
mod event_builder;
mod handler;
mod manager;
mod priority;
mod queue;
mod request;
mod state;
mod validity;

pub(crate) use buckets::*;
pub use chain::*;
pub(crate) use connection::*;
pub(crate) use constants::*;
pub use error::*;
pub use event::*;
pub use event_builder::*;
pub use handler::*;
pub use manager::*;
pub use priority::*;
pub use queue::*;
pub use request::*;
pub use state::*;
pub use validity::*;
