#![forbid(unsafe_code)]

//! Connection records: one slot per subscription.
//!
//! Records live in a `Vec`-backed arena owned by the registry and are
//! threaded onto one of two intrusive lists (active or free) through
//! `prev`/`next` slot indices. A record is addressed from outside the
//! registry by a [`ConnectionKey`]: its slot index plus the slot's
//! generation at the time the key was issued.

use std::sync::Arc;

/// Type-erased callback stored in a record.
///
/// Held behind an `Arc` so a trigger can keep the closure alive for the
/// duration of its own invocation even if the callback disconnects itself.
pub(crate) type Callback<A> = Arc<dyn Fn(&A) + Send + Sync>;

/// Which intrusive list currently owns a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ListKind {
    Active,
    Free,
}

/// Stable address of a record inside one registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ConnectionKey {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl ConnectionKey {
    #[inline]
    pub(crate) fn slot(self) -> usize {
        self.index as usize
    }
}

/// One subscription's activation state and callback.
pub(crate) struct ConnectionRecord<A> {
    pub(crate) prev: Option<u32>,
    pub(crate) next: Option<u32>,
    pub(crate) list: ListKind,
    /// True while the callback may be invoked.
    pub(crate) active: bool,
    /// Outstanding [`Handle`](crate::Handle)s referencing this record.
    pub(crate) handle_refs: u32,
    /// Bumped every time the record is reclaimed; invalidates old keys.
    pub(crate) generation: u32,
    pub(crate) callback: Option<Callback<A>>,
}

impl<A> ConnectionRecord<A> {
    /// A fresh record, parked on the free list.
    pub(crate) fn vacant() -> Self {
        Self {
            prev: None,
            next: None,
            list: ListKind::Free,
            active: false,
            handle_refs: 0,
            generation: 0,
            callback: None,
        }
    }

    /// Mark the record live with `callback`. Links are left to the caller.
    pub(crate) fn activate(&mut self, callback: Callback<A>) {
        debug_assert_eq!(self.handle_refs, 0, "recycled record still has handles");
        self.active = true;
        self.callback = Some(callback);
    }

    /// Stop the subscription and hand back the callback.
    ///
    /// The callback is returned rather than dropped so the caller can drop it
    /// after releasing its borrow of the arena: captured state may itself own
    /// handles into the same registry.
    #[must_use = "drop the callback outside the arena borrow"]
    pub(crate) fn deactivate(&mut self) -> Option<Callback<A>> {
        self.active = false;
        self.callback.take()
    }

    /// True once nothing can reach the record: no handles, not active.
    #[inline]
    pub(crate) fn is_reclaimable(&self) -> bool {
        !self.active && self.handle_refs == 0
    }

    #[inline]
    pub(crate) fn key(&self, index: u32) -> ConnectionKey {
        ConnectionKey {
            index,
            generation: self.generation,
        }
    }
}

impl<A> std::fmt::Debug for ConnectionRecord<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRecord")
            .field("prev", &self.prev)
            .field("next", &self.next)
            .field("list", &self.list)
            .field("active", &self.active)
            .field("handle_refs", &self.handle_refs)
            .field("generation", &self.generation)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}
