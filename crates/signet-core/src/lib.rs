#![forbid(unsafe_code)]

//! Core: thread-safe events with re-entrant connect, disconnect, and trigger.
//!
//! # Role in signet
//! `signet-core` is the notification primitive. Producers own an [`Event`]
//! and trigger it; consumers connect callbacks and keep the returned
//! [`Handle`] for as long as they may need to disconnect.
//!
//! # Primary responsibilities
//! - **Event**: callback list keyed by argument type, triggered synchronously.
//! - **Handle**: reference-counted, type-erased token for one connection.
//! - **ScopedConnection / ConnectionSet**: owners that disconnect on drop.
//! - **Registry** (internal): pooled connection records on two intrusive
//!   lists behind a re-entrant lock.
//!
//! # Concurrency
//! Any thread may connect, disconnect, clear, or trigger. Every operation
//! takes the event's re-entrant lock, and triggers hold it while callbacks
//! run, so callbacks may freely call back into the same event (including
//! disconnecting themselves or triggering it again) on the same thread.
//! Other threads wait until the trigger finishes.
//!
//! # Example
//! ```
//! use std::sync::{Arc, Mutex};
//! use signet_core::{Event, Handle};
//!
//! let on_toggled: Event<bool> = Event::new();
//! let seen = Arc::new(Mutex::new(Vec::new()));
//!
//! let seen_cb = Arc::clone(&seen);
//! let mut handle: Handle = on_toggled.connect(move |on| seen_cb.lock().unwrap().push(*on));
//!
//! on_toggled.trigger(&true);
//! handle.disconnect();
//! on_toggled.trigger(&false);
//!
//! assert_eq!(*seen.lock().unwrap(), vec![true]);
//! ```
//!
//! # Feature flags
//! - `tracing`: emit `tracing` records for connect, disconnect, reclaim,
//!   clear, teardown, and a span per trigger.

pub mod config;
pub mod event;
pub mod handle;
mod record;
pub mod registry;
pub mod scoped;

pub use config::EventConfig;
pub use event::Event;
pub use handle::Handle;
pub use registry::RegistryStats;
pub use scoped::{ConnectionSet, ScopedConnection};
