//! Event bus for the household apps host
//!
//! The bus is a single broadcast channel carrying every event. The app
//! runtime subscribes to it and dispatches events to apps one at a time;
//! apps describe what they want to hear with an [`EventFilter`] instead of
//! registering callbacks on the bus.

use ha_core::{Context, Event, EventData, EventType};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

/// Events buffered per subscriber before it lags
const CHANNEL_CAPACITY: usize = 1024;

/// The event bus for publishing and subscribing to events
pub struct EventBus {
    sender: broadcast::Sender<Event<Value>>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Subscribe to all events
    pub fn subscribe_all(&self) -> broadcast::Receiver<Event<Value>> {
        self.sender.subscribe()
    }

    /// Fire an event to every subscriber
    pub fn fire(&self, event: Event<Value>) {
        debug!(event_type = %event.event_type, "Firing event");
        // A send error only means nobody is listening
        let _ = self.sender.send(event);
    }

    /// Fire an event whose data is a typed payload
    pub fn fire_typed<T: EventData + serde::Serialize>(&self, data: T, context: Context) {
        let data = serde_json::to_value(&data).unwrap_or_default();
        self.fire(Event::new(T::event_type(), data, context));
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Selects bus events by type and by exact values of top-level data fields
///
/// `EventFilter::new("html5_notification.clicked").with("action", "done")`
/// matches a push-notification click on the "done" button only.
#[derive(Debug, Clone, PartialEq)]
pub struct EventFilter {
    event_type: EventType,
    data: Vec<(String, Value)>,
}

impl EventFilter {
    pub fn new(event_type: impl Into<EventType>) -> Self {
        Self {
            event_type: event_type.into(),
            data: Vec::new(),
        }
    }

    /// Require a data field to equal the given value
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.push((key.into(), value.into()));
        self
    }

    pub fn matches(&self, event: &Event<Value>) -> bool {
        event.event_type == self.event_type
            && self
                .data
                .iter()
                .all(|(key, expected)| event.data.get(key) == Some(expected))
    }
}
