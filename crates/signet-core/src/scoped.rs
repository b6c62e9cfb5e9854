#![forbid(unsafe_code)]

//! Owners that disconnect on drop.
//!
//! - [`ScopedConnection`]: one handle, disconnected when the guard drops.
//! - [`ConnectionSet`]: many handles (typically one owner subscribed to
//!   several events), disconnected together.

use crate::handle::Handle;

/// RAII guard that disconnects its connection when dropped.
#[must_use = "dropping a ScopedConnection disconnects it immediately"]
#[derive(Debug, Default)]
pub struct ScopedConnection {
    handle: Handle,
}

impl ScopedConnection {
    /// Take ownership of `handle`.
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// True until the guard disconnects.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.handle.is_connected()
    }

    /// Disconnect now instead of at drop.
    pub fn disconnect(&mut self) {
        self.handle.disconnect();
    }

    /// Give the plain handle back; the subscription is no longer tied to
    /// this guard's lifetime.
    pub fn release(mut self) -> Handle {
        std::mem::take(&mut self.handle)
    }
}

impl From<Handle> for ScopedConnection {
    fn from(handle: Handle) -> Self {
        Self::new(handle)
    }
}

impl Drop for ScopedConnection {
    fn drop(&mut self) {
        self.handle.disconnect();
    }
}

/// A bag of handles disconnected as a group.
///
/// ```
/// use signet_core::{ConnectionSet, Event};
///
/// let on_click: Event<()> = Event::new();
/// let on_drag: Event<(i32, i32)> = Event::new();
///
/// {
///     let mut connections = ConnectionSet::new();
///     connections.push(on_click.connect(|_| {}));
///     connections.push(on_drag.connect(|(dx, dy)| { let _ = dx + dy; }));
///     assert_eq!(connections.len(), 2);
/// }
///
/// assert!(on_click.is_empty());
/// assert!(on_drag.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct ConnectionSet {
    handles: Vec<Handle>,
}

impl ConnectionSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handle to the group.
    pub fn push(&mut self, handle: Handle) {
        self.handles.push(handle);
    }

    /// Number of handles held (including ones already disconnected).
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Disconnect every held handle and empty the set.
    pub fn disconnect_all(&mut self) {
        for mut handle in self.handles.drain(..) {
            handle.disconnect();
        }
    }
}

impl Extend<Handle> for ConnectionSet {
    fn extend<I: IntoIterator<Item = Handle>>(&mut self, iter: I) {
        self.handles.extend(iter);
    }
}

impl FromIterator<Handle> for ConnectionSet {
    fn from_iter<I: IntoIterator<Item = Handle>>(iter: I) -> Self {
        Self {
            handles: iter.into_iter().collect(),
        }
    }
}

impl Drop for ConnectionSet {
    fn drop(&mut self) {
        self.disconnect_all();
    }
}
