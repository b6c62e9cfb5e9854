#![forbid(unsafe_code)]

//! Subscription handles.
//!
//! A [`Handle`] is the caller's side of one connection. It keeps the owning
//! registry alive and pins the connection record by holding one handle
//! reference on it.
//!
//! # Drop is not disconnect
//!
//! Dropping a handle only releases its reference. The subscription keeps
//! firing until [`Handle::disconnect`] is called (through this handle or any
//! clone of it), the event is cleared, or the event is dropped. Code that
//! wants "stop when I go away" semantics should hold a
//! [`ScopedConnection`] instead.

use std::sync::Arc;

use crate::record::ConnectionKey;
use crate::scoped::ScopedConnection;

/// The registry side of a handle, erased over the event's argument type.
pub(crate) trait ConnectionOwner: Send + Sync {
    /// Add one handle reference.
    fn retain(&self, key: ConnectionKey);
    /// Drop one handle reference; reclaims if the record is also inactive.
    fn release(&self, key: ConnectionKey);
    /// Deactivate and drop one handle reference.
    fn disconnect(&self, key: ConnectionKey);
    fn is_live(&self, key: ConnectionKey) -> bool;
    fn handle_count(&self, key: ConnectionKey) -> u32;
}

struct Link {
    owner: Arc<dyn ConnectionOwner>,
    key: ConnectionKey,
}

/// Reference-counted token for one connection.
///
/// Not generic over the event's argument type, so handles from different
/// events can be stored together.
///
/// ```
/// use signet_core::{Event, Handle};
///
/// let clicked: Event<()> = Event::new();
/// let toggled: Event<bool> = Event::new();
///
/// let mut handles: Vec<Handle> = vec![
///     clicked.connect(|_| {}),
///     toggled.connect(|on| assert!(*on)),
/// ];
/// toggled.trigger(&true);
///
/// for handle in &mut handles {
///     handle.disconnect();
/// }
/// assert!(clicked.is_empty() && toggled.is_empty());
/// ```
#[derive(Default)]
pub struct Handle {
    link: Option<Link>,
}

impl Handle {
    /// A handle that references nothing.
    #[must_use]
    pub const fn empty() -> Self {
        Self { link: None }
    }

    /// Wrap a key whose handle reference the registry already counted.
    pub(crate) fn attached(owner: Arc<dyn ConnectionOwner>, key: ConnectionKey) -> Self {
        Self {
            link: Some(Link { owner, key }),
        }
    }

    /// End the subscription: its callback will not be invoked again.
    ///
    /// The handle is emptied by the first call, so further calls are no-ops.
    /// Other clones of this handle stay non-empty but see
    /// [`is_active`](Self::is_active) return false.
    pub fn disconnect(&mut self) {
        if let Some(link) = self.link.take() {
            link.owner.disconnect(link.key);
        }
    }

    /// True while this handle references a connection.
    ///
    /// This is the handle's own state: it turns false after
    /// [`disconnect`](Self::disconnect) on this handle, not after a clone
    /// disconnects.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// True while the referenced connection still fires on trigger.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.link
            .as_ref()
            .is_some_and(|link| link.owner.is_live(link.key))
    }

    /// Number of handles (this one included) referencing the connection.
    ///
    /// Returns 0 for an empty handle.
    #[must_use]
    pub fn handle_count(&self) -> u32 {
        self.link
            .as_ref()
            .map_or(0, |link| link.owner.handle_count(link.key))
    }

    /// True if both handles reference the same connection.
    #[must_use]
    pub fn same_connection(&self, other: &Handle) -> bool {
        match (&self.link, &other.link) {
            (Some(a), Some(b)) => {
                a.key == b.key && std::ptr::addr_eq(Arc::as_ptr(&a.owner), Arc::as_ptr(&b.owner))
            }
            _ => false,
        }
    }

    /// Convert into a guard that disconnects when dropped.
    pub fn scoped(self) -> ScopedConnection {
        ScopedConnection::new(self)
    }

    fn release(&mut self) {
        if let Some(link) = self.link.take() {
            link.owner.release(link.key);
        }
    }
}

impl Clone for Handle {
    fn clone(&self) -> Self {
        let link = self.link.as_ref().map(|link| {
            link.owner.retain(link.key);
            Link {
                owner: Arc::clone(&link.owner),
                key: link.key,
            }
        });
        Self { link }
    }

    /// Releases the current reference before taking one on `source`'s.
    fn clone_from(&mut self, source: &Self) {
        self.release();
        *self = source.clone();
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.link {
            Some(link) => f
                .debug_struct("Handle")
                .field("slot", &link.key.index)
                .field("generation", &link.key.generation)
                .finish(),
            None => f.write_str("Handle(empty)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Event;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter(event: &Event<()>) -> (Handle, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_cb = Arc::clone(&hits);
        let handle = event.connect(move |_| {
            hits_cb.fetch_add(1, Ordering::Relaxed);
        });
        (handle, hits)
    }

    #[test]
    fn default_handle_is_empty() {
        let mut handle = Handle::default();
        assert!(!handle.is_connected());
        assert!(!handle.is_active());
        assert_eq!(handle.handle_count(), 0);
        handle.disconnect();
        assert!(!handle.is_connected());
    }

    #[test]
    fn disconnect_twice_is_noop() {
        let event = Event::<()>::new();
        let (mut handle, hits) = counter(&event);
        handle.disconnect();
        handle.disconnect();
        assert!(!handle.is_connected());
        event.trigger(&());
        assert_eq!(hits.load(Ordering::Relaxed), 0);
        assert_eq!(event.stats().free, 1);
    }

    #[test]
    fn clone_counts_references() {
        let event = Event::<()>::new();
        let (handle, _) = counter(&event);
        assert_eq!(handle.handle_count(), 1);

        let copy = handle.clone();
        assert_eq!(handle.handle_count(), 2);
        assert!(copy.same_connection(&handle));

        drop(copy);
        assert_eq!(handle.handle_count(), 1);
    }

    #[test]
    fn disconnect_through_clone_leaves_other_pinned() {
        let event = Event::<()>::new();
        let (mut handle, hits) = counter(&event);
        let copy = handle.clone();

        handle.disconnect();
        assert!(copy.is_connected());
        assert!(!copy.is_active());
        assert_eq!(event.stats().inactive, 1);

        event.trigger(&());
        assert_eq!(hits.load(Ordering::Relaxed), 0);

        drop(copy);
        let stats = event.stats();
        assert_eq!(stats.inactive, 0);
        assert_eq!(stats.free, 1);
    }

    #[test]
    fn clone_from_releases_previous_reference() {
        let event = Event::<()>::new();
        let (first, _) = counter(&event);
        let (second, _) = counter(&event);

        let mut slot = first.clone();
        assert_eq!(first.handle_count(), 2);

        slot.clone_from(&second);
        assert_eq!(first.handle_count(), 1);
        assert_eq!(second.handle_count(), 2);
        assert!(slot.same_connection(&second));
    }

    #[test]
    fn clone_from_same_connection_keeps_count() {
        let event = Event::<()>::new();
        let (handle, _) = counter(&event);
        let mut copy = handle.clone();
        copy.clone_from(&handle);
        assert_eq!(handle.handle_count(), 2);
    }

    #[test]
    fn handles_from_different_events_differ() {
        let a = Event::<()>::new();
        let b = Event::<()>::new();
        let (ha, _) = counter(&a);
        let (hb, _) = counter(&b);
        // Both are slot 0, generation 0 in their own registries.
        assert!(!ha.same_connection(&hb));
    }

    #[test]
    fn handle_outlives_event() {
        let (mut handle, hits) = {
            let event = Event::<()>::new();
            counter(&event)
        };
        assert!(handle.is_connected());
        assert!(!handle.is_active());
        assert_eq!(hits.load(Ordering::Relaxed), 0);
        handle.disconnect();
        assert!(!handle.is_connected());
    }

    #[test]
    fn debug_format() {
        let event = Event::<()>::new();
        let (handle, _) = counter(&event);
        assert!(format!("{handle:?}").contains("slot"));
        assert_eq!(format!("{:?}", Handle::empty()), "Handle(empty)");
    }
}
