#![forbid(unsafe_code)]

//! The public event type.
//!
//! # Failure Modes
//!
//! - **Callback panics**: the panic unwinds out of [`Event::trigger`]. The
//!   registry stays consistent; callbacks after the panicking one are not
//!   invoked for that trigger.
//! - **Lock order**: callbacks run with the event's lock held. A callback
//!   that blocks on a lock another thread holds while that thread triggers
//!   or connects to this event deadlocks. The event cannot detect this.
//! - **Self-referencing callbacks**: a callback that captures a handle to
//!   its own connection forms a reference cycle, broken by
//!   [`Event::clear`] or by dropping the event.

use std::sync::Arc;

use crate::config::EventConfig;
use crate::handle::Handle;
use crate::record::Callback;
use crate::registry::{Registry, RegistryStats};
use crate::scoped::ScopedConnection;

/// A list of callbacks invoked together when the event triggers.
///
/// `A` is the argument type passed (by reference) to every callback: `()`
/// for no arguments, a tuple for several. Callback return values are
/// discarded.
///
/// # Invariants
///
/// 1. One trigger invokes each connection that was live when the walk
///    reached it exactly once, most recently connected first.
/// 2. Connections made during a trigger are not invoked by that trigger.
/// 3. A connection disconnected during a trigger is not invoked afterwards,
///    including later in the same trigger.
/// 4. Dropping a [`Handle`] does not disconnect.
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use signet_core::Event;
///
/// let on_resize: Event<(u16, u16)> = Event::new();
/// let area = Arc::new(AtomicU32::new(0));
///
/// let area_cb = Arc::clone(&area);
/// let mut handle = on_resize.connect(move |(w, h)| {
///     area_cb.store(u32::from(*w) * u32::from(*h), Ordering::Relaxed);
/// });
///
/// on_resize.trigger(&(80, 24));
/// assert_eq!(area.load(Ordering::Relaxed), 1920);
///
/// handle.disconnect();
/// assert!(on_resize.is_empty());
/// ```
pub struct Event<A = ()> {
    registry: Arc<Registry<A>>,
}

impl<A: 'static> Event<A> {
    /// Create an event with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(EventConfig::default())
    }

    /// Create an event with explicit settings.
    #[must_use]
    pub fn with_config(config: EventConfig) -> Self {
        Self {
            registry: Arc::new(Registry::new(&config)),
        }
    }

    /// Subscribe `callback`. The returned handle can disconnect it.
    pub fn connect<F, R>(&self, callback: F) -> Handle
    where
        F: Fn(&A) -> R + Send + Sync + 'static,
    {
        let callback: Callback<A> = Arc::new(move |args: &A| {
            let _ = callback(args);
        });
        self.registry.connect(callback)
    }

    /// Subscribe `callback` for as long as the returned guard lives.
    pub fn connect_scoped<F, R>(&self, callback: F) -> ScopedConnection
    where
        F: Fn(&A) -> R + Send + Sync + 'static,
    {
        self.connect(callback).scoped()
    }

    /// Invoke every live callback with `args`, on this thread.
    pub fn trigger(&self, args: &A) {
        // The walk runs on its own strong reference to the registry.
        let registry = Arc::clone(&self.registry);
        registry.trigger(args);
    }

    /// Same as [`trigger`](Self::trigger).
    #[inline]
    pub fn emit(&self, args: &A) {
        self.trigger(args);
    }

    /// Diagnostic label from [`EventConfig`].
    #[must_use]
    pub fn label(&self) -> &str {
        self.registry.label()
    }
}

impl<A> Event<A> {
    /// Disconnect every subscription.
    ///
    /// Outstanding handles stay non-empty until dropped or disconnected, but
    /// their callbacks never fire again.
    pub fn clear(&self) {
        self.registry.clear();
    }

    /// True when no subscription would fire on trigger.
    ///
    /// Records kept only by outstanding handles after a disconnect or clear
    /// do not count, and neither does the free list.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry.live() == 0
    }

    /// Number of subscriptions that fire on trigger.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.live()
    }

    /// Record counters for diagnostics and tests.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        self.registry.stats()
    }
}

impl<A: 'static> Default for Event<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> Drop for Event<A> {
    fn drop(&mut self) {
        self.registry.clear();
    }
}

impl<A> std::fmt::Debug for Event<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("registry", &self.registry)
            .finish()
    }
}
