#![forbid(unsafe_code)]

//! Connection registry: the active list, the free list, and the lock.
//!
//! # Design
//!
//! Records live in a `Vec` arena ([`Slots`]) and are threaded onto two
//! intrusive doubly linked lists by slot index:
//!
//! - the **active list**, walked by [`Registry::trigger`] head to tail;
//! - the **free list**, a pool of retired records reused by the next connect.
//!
//! The arena sits in a `RefCell` behind a `parking_lot::ReentrantMutex`. The
//! lock is held for the whole of every operation, including while callbacks
//! run, and is re-entrant so a callback can connect, disconnect, clear, or
//! trigger the same registry. The `RefCell` borrow, by contrast, is only ever
//! held for short stretches of list surgery and never across user code.
//!
//! # Walk cursors
//!
//! Each in-progress trigger pushes a cursor (the next slot it will visit)
//! onto `cursors`. Nested triggers on the same thread stack their own. When a
//! record is unlinked from the active list, every cursor parked on it is
//! advanced to the record's successor first, so a walk never follows a link
//! into the free list or into a recycled record. New connections are linked at
//! the head, behind every cursor, so an in-progress walk never sees them.
//!
//! # Invariants
//!
//! 1. A record is on exactly one list; `list` says which.
//! 2. An inactive record with no handles is reclaimed immediately.
//! 3. `live` equals the number of active records; `linked` the active-list
//!    length; `free` the free-list length.
//! 4. Every cursor is `None` or names a record on the active list.

use std::borrow::Cow;
use std::cell::RefCell;
use std::sync::Arc;

use parking_lot::ReentrantMutex;

#[cfg(feature = "tracing")]
use tracing::{debug, trace};

use crate::config::EventConfig;
use crate::handle::{ConnectionOwner, Handle};
use crate::record::{Callback, ConnectionKey, ConnectionRecord, ListKind};

/// Point-in-time counters for one registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Active records: their callbacks fire on trigger.
    pub live: usize,
    /// Deactivated records still pinned by outstanding handles.
    pub inactive: usize,
    /// Records parked on the free list.
    pub free: usize,
    /// Total records ever allocated (arena size).
    pub allocated: usize,
}

/// Record arena plus list heads. Not synchronized on its own.
pub(crate) struct Slots<A> {
    records: Vec<ConnectionRecord<A>>,
    active_head: Option<u32>,
    free_head: Option<u32>,
    linked: usize,
    live: usize,
    free: usize,
    cursors: Vec<Option<u32>>,
}

impl<A> Slots<A> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        let mut slots = Self {
            records: Vec::with_capacity(capacity),
            active_head: None,
            free_head: None,
            linked: 0,
            live: 0,
            free: 0,
            cursors: Vec::new(),
        };
        for _ in 0..capacity {
            let idx = slots.alloc_index();
            slots.records.push(ConnectionRecord::vacant());
            slots.push_free(idx);
        }
        slots
    }

    /// Resolve a key to its record, rejecting stale generations.
    fn record_mut(&mut self, key: ConnectionKey) -> Option<&mut ConnectionRecord<A>> {
        let record = self
            .records
            .get_mut(key.slot())
            .filter(|r| r.generation == key.generation && r.list == ListKind::Active);
        debug_assert!(record.is_some(), "stale connection key {key:?}");
        record
    }

    fn record(&self, key: ConnectionKey) -> Option<&ConnectionRecord<A>> {
        self.records
            .get(key.slot())
            .filter(|r| r.generation == key.generation && r.list == ListKind::Active)
    }

    fn alloc_index(&self) -> u32 {
        assert!(
            self.records.len() < u32::MAX as usize,
            "connection pool capacity exceeded"
        );
        self.records.len() as u32
    }

    /// Take a record off the free list, or grow the arena.
    ///
    /// Returns the slot index and whether it was recycled.
    fn acquire(&mut self) -> (u32, bool) {
        if let Some(idx) = self.pop_free() {
            return (idx, true);
        }
        let idx = self.alloc_index();
        self.records.push(ConnectionRecord::vacant());
        (idx, false)
    }

    fn pop_free(&mut self) -> Option<u32> {
        let idx = self.free_head?;
        let next = self.records[idx as usize].next;
        self.free_head = next;
        if let Some(n) = next {
            self.records[n as usize].prev = None;
        }
        self.records[idx as usize].next = None;
        self.free -= 1;
        Some(idx)
    }

    fn push_free(&mut self, idx: u32) {
        let head = self.free_head;
        let record = &mut self.records[idx as usize];
        record.list = ListKind::Free;
        record.prev = None;
        record.next = head;
        if let Some(h) = head {
            self.records[h as usize].prev = Some(idx);
        }
        self.free_head = Some(idx);
        self.free += 1;
    }

    fn link_front(&mut self, idx: u32) {
        let head = self.active_head;
        let record = &mut self.records[idx as usize];
        record.list = ListKind::Active;
        record.prev = None;
        record.next = head;
        if let Some(h) = head {
            self.records[h as usize].prev = Some(idx);
        }
        self.active_head = Some(idx);
        self.linked += 1;
    }

    fn unlink_active(&mut self, idx: u32) {
        let (prev, next) = {
            let record = &self.records[idx as usize];
            debug_assert_eq!(record.list, ListKind::Active);
            (record.prev, record.next)
        };

        // Any walk about to visit this record skips straight past it.
        for cursor in &mut self.cursors {
            if *cursor == Some(idx) {
                *cursor = next;
            }
        }

        match prev {
            Some(p) => self.records[p as usize].next = next,
            None => self.active_head = next,
        }
        if let Some(n) = next {
            self.records[n as usize].prev = prev;
        }

        let record = &mut self.records[idx as usize];
        record.prev = None;
        record.next = None;
        self.linked -= 1;
    }

    /// Move an unreachable record from the active list to the free list.
    fn reclaim(&mut self, idx: u32) {
        debug_assert!(self.records[idx as usize].is_reclaimable());
        self.unlink_active(idx);
        let record = &mut self.records[idx as usize];
        record.generation = record.generation.wrapping_add(1);
        self.push_free(idx);
    }

    /// Link a new live record holding `callback`, with one handle reference.
    ///
    /// Returns the record's key and whether its slot was recycled.
    pub(crate) fn connect(&mut self, callback: Callback<A>) -> (ConnectionKey, bool) {
        let (idx, reused) = self.acquire();
        let record = &mut self.records[idx as usize];
        record.activate(callback);
        record.handle_refs = 1;
        let key = record.key(idx);
        self.link_front(idx);
        self.live += 1;
        (key, reused)
    }

    /// Deactivate the record and drop one handle reference.
    ///
    /// Returns the released callback (to be dropped by the caller outside the
    /// borrow) and whether the record went back to the free list.
    pub(crate) fn disconnect(&mut self, key: ConnectionKey) -> (Option<Callback<A>>, bool) {
        let Some(record) = self.record_mut(key) else {
            return (None, false);
        };
        let was_active = record.active;
        let callback = record.deactivate();
        debug_assert!(record.handle_refs > 0, "disconnect without a handle");
        record.handle_refs = record.handle_refs.saturating_sub(1);
        let reclaim = record.is_reclaimable();

        if was_active {
            self.live -= 1;
        }
        if reclaim {
            self.reclaim(key.index);
        }
        (callback, reclaim)
    }

    /// Add one handle reference.
    pub(crate) fn retain(&mut self, key: ConnectionKey) {
        if let Some(record) = self.record_mut(key) {
            record.handle_refs = record.handle_refs.saturating_add(1);
        }
    }

    /// Drop one handle reference without deactivating.
    ///
    /// Returns true if the record went back to the free list.
    pub(crate) fn release(&mut self, key: ConnectionKey) -> bool {
        let Some(record) = self.record_mut(key) else {
            return false;
        };
        debug_assert!(record.handle_refs > 0, "release without a handle");
        record.handle_refs = record.handle_refs.saturating_sub(1);
        if record.is_reclaimable() {
            self.reclaim(key.index);
            true
        } else {
            false
        }
    }

    /// Deactivate every record on the active list.
    ///
    /// Records without handles are reclaimed on the spot; the rest stay
    /// linked, inactive, until their last handle goes. Returns the released
    /// callbacks.
    pub(crate) fn clear(&mut self) -> Vec<Callback<A>> {
        let mut released = Vec::with_capacity(self.live);
        let mut cursor = self.active_head;
        while let Some(idx) = cursor {
            let record = &mut self.records[idx as usize];
            cursor = record.next;
            let was_active = record.active;
            if let Some(callback) = record.deactivate() {
                released.push(callback);
            }
            let reclaim = record.is_reclaimable();
            if was_active {
                self.live -= 1;
            }
            if reclaim {
                self.reclaim(idx);
            }
        }
        released
    }

    /// Callback of the record `cursors[depth]` names, advancing the cursor.
    ///
    /// Inactive records are skipped. Returns `None` at the end of the list.
    fn advance(&mut self, depth: usize) -> Option<Callback<A>> {
        loop {
            let idx = self.cursors[depth]?;
            let record = &self.records[idx as usize];
            let next = record.next;
            let callback = record.callback.clone();
            self.cursors[depth] = next;
            if callback.is_some() {
                return callback;
            }
        }
    }

    pub(crate) fn is_live(&self, key: ConnectionKey) -> bool {
        self.record(key).is_some_and(|r| r.active)
    }

    pub(crate) fn handle_count(&self, key: ConnectionKey) -> u32 {
        self.record(key).map_or(0, |r| r.handle_refs)
    }

    pub(crate) fn live(&self) -> usize {
        self.live
    }

    pub(crate) fn stats(&self) -> RegistryStats {
        RegistryStats {
            live: self.live,
            inactive: self.linked - self.live,
            free: self.free,
            allocated: self.records.len(),
        }
    }

    /// Slot indices on the active list, head first.
    #[cfg(test)]
    fn active_order(&self) -> Vec<u32> {
        let mut out = Vec::new();
        let mut cursor = self.active_head;
        while let Some(idx) = cursor {
            out.push(idx);
            cursor = self.records[idx as usize].next;
        }
        out
    }
}

/// Cursor registration for one trigger walk.
///
/// Pops its cursor (and any left by nested walks) when dropped, including
/// during unwinding out of a panicking callback.
struct Walk<'a, A> {
    slots: &'a RefCell<Slots<A>>,
    depth: usize,
}

impl<'a, A> Walk<'a, A> {
    fn begin(slots: &'a RefCell<Slots<A>>) -> Self {
        let mut guard = slots.borrow_mut();
        let head = guard.active_head;
        guard.cursors.push(head);
        let depth = guard.cursors.len() - 1;
        Self { slots, depth }
    }

    fn next_callback(&self) -> Option<Callback<A>> {
        self.slots.borrow_mut().advance(self.depth)
    }
}

impl<A> Drop for Walk<'_, A> {
    fn drop(&mut self) {
        if let Ok(mut slots) = self.slots.try_borrow_mut() {
            slots.cursors.truncate(self.depth);
        }
    }
}

/// Shared, lock-guarded connection storage for one event.
///
/// Owned through an `Arc` by the [`Event`](crate::Event) and by every
/// [`Handle`] it issued, so the storage outlives the longest-lived handle.
pub(crate) struct Registry<A> {
    label: Cow<'static, str>,
    slots: ReentrantMutex<RefCell<Slots<A>>>,
}

impl<A> Registry<A> {
    pub(crate) fn new(config: &EventConfig) -> Self {
        Self {
            label: config.label.clone(),
            slots: ReentrantMutex::new(RefCell::new(Slots::with_capacity(config.capacity))),
        }
    }

    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    /// Run `f` on the arena with the lock held.
    fn with_slots<R>(&self, f: impl FnOnce(&mut Slots<A>) -> R) -> R {
        let guard = self.slots.lock();
        let mut slots = guard.borrow_mut();
        f(&mut slots)
    }

    /// Subscribe `callback` and return the first handle to it.
    pub(crate) fn connect(self: &Arc<Self>, callback: Callback<A>) -> Handle
    where
        A: 'static,
    {
        let (key, reused) = self.with_slots(|slots| slots.connect(callback));

        #[cfg(feature = "tracing")]
        trace!(label = %self.label, slot = key.index, reused, "connect");
        #[cfg(not(feature = "tracing"))]
        let _ = reused;

        let owner: Arc<dyn ConnectionOwner> = Arc::clone(self) as Arc<dyn ConnectionOwner>;
        Handle::attached(owner, key)
    }

    /// Invoke every live callback once, most recently connected first.
    pub(crate) fn trigger(&self, args: &A) {
        let guard = self.slots.lock();
        let slots: &RefCell<Slots<A>> = &guard;

        #[cfg(feature = "tracing")]
        let _span = tracing::trace_span!(
            "event_trigger",
            label = %self.label,
            live = slots.borrow().live()
        )
        .entered();

        let walk = Walk::begin(slots);
        while let Some(callback) = walk.next_callback() {
            callback(args);
        }
    }

    /// Deactivate every connection.
    pub(crate) fn clear(&self) {
        let released = self.with_slots(Slots::clear);

        #[cfg(feature = "tracing")]
        debug!(label = %self.label, deactivated = released.len(), "clear");

        drop(released);
    }

    pub(crate) fn live(&self) -> usize {
        self.with_slots(|slots| slots.live())
    }

    pub(crate) fn stats(&self) -> RegistryStats {
        self.with_slots(|slots| slots.stats())
    }
}

impl<A> ConnectionOwner for Registry<A> {
    fn retain(&self, key: ConnectionKey) {
        self.with_slots(|slots| slots.retain(key));
    }

    fn release(&self, key: ConnectionKey) {
        let reclaimed = self.with_slots(|slots| slots.release(key));

        #[cfg(feature = "tracing")]
        trace!(label = %self.label, slot = key.index, reclaimed, "release handle");
        #[cfg(not(feature = "tracing"))]
        let _ = reclaimed;
    }

    fn disconnect(&self, key: ConnectionKey) {
        let (callback, reclaimed) = self.with_slots(|slots| slots.disconnect(key));

        #[cfg(feature = "tracing")]
        trace!(label = %self.label, slot = key.index, reclaimed, "disconnect");
        #[cfg(not(feature = "tracing"))]
        let _ = reclaimed;

        drop(callback);
    }

    fn is_live(&self, key: ConnectionKey) -> bool {
        self.with_slots(|slots| slots.is_live(key))
    }

    fn handle_count(&self, key: ConnectionKey) -> u32 {
        self.with_slots(|slots| slots.handle_count(key))
    }
}

impl<A> Drop for Registry<A> {
    fn drop(&mut self) {
        let slots = self.slots.get_mut().get_mut();
        let released = slots.clear();

        #[cfg(feature = "tracing")]
        debug!(
            label = %self.label,
            released = released.len(),
            allocated = slots.records.len(),
            "registry teardown"
        );

        drop(released);
    }
}

impl<A> std::fmt::Debug for Registry<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let guard = self.slots.lock();
        let stats = match guard.try_borrow() {
            Ok(slots) => Some(slots.stats()),
            Err(_) => None,
        };
        f.debug_struct("Registry")
            .field("label", &self.label)
            .field("stats", &stats)
            .finish()
    }
}
