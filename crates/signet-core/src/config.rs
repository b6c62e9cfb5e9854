#![forbid(unsafe_code)]

//! Construction-time settings for an [`Event`](crate::Event).

use std::borrow::Cow;

/// Label used when none is configured.
pub const DEFAULT_LABEL: &str = "event";

/// Settings applied when an event's registry is created.
///
/// ```
/// use signet_core::{Event, EventConfig};
///
/// let config = EventConfig::default().with_capacity(8).with_label("on_click");
/// let event: Event<()> = Event::with_config(config);
/// assert_eq!(event.label(), "on_click");
/// assert_eq!(event.stats().free, 8);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventConfig {
    /// Records pre-allocated onto the free list.
    pub capacity: usize,
    /// Diagnostic name attached to log records.
    pub label: Cow<'static, str>,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            capacity: 0,
            label: Cow::Borrowed(DEFAULT_LABEL),
        }
    }
}

impl EventConfig {
    /// Pre-allocate `capacity` connection records.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the diagnostic label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<Cow<'static, str>>) -> Self {
        self.label = label.into();
        self
    }
}
