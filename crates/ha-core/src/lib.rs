//! Core types for the household automation apps
//!
//! Everything the apps exchange with the automation host is expressed with
//! these types: entity ids, entity states, bus events, service calls and the
//! context that ties them together.

mod context;
mod entity_id;
mod event;
mod service_call;
mod state;

pub use context::Context;
pub use entity_id::{EntityId, EntityIdError};
pub use event::{Event, EventData, EventType};
pub use service_call::ServiceCall;
pub use state::{State, StateReading};

/// State value reported when the host has no value for an entity yet
pub const STATE_UNKNOWN: &str = "unknown";

/// State value reported when the device behind an entity is unreachable
pub const STATE_UNAVAILABLE: &str = "unavailable";

pub const STATE_ON: &str = "on";
pub const STATE_OFF: &str = "off";

/// Value of a device tracker / key sensor while its owner is away
pub const STATE_NOT_HOME: &str = "not_home";
pub const STATE_HOME: &str = "home";

/// Standard event types seen by the apps
pub mod events {
    use super::*;

    /// Event type for state changes
    pub const STATE_CHANGED: &str = "state_changed";

    /// Fired when an action button of an html5 push notification is pressed
    pub const HTML5_NOTIFICATION_CLICKED: &str = "html5_notification.clicked";

    /// Data for STATE_CHANGED events
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    pub struct StateChangedData {
        pub entity_id: EntityId,
        pub old_state: Option<State>,
        pub new_state: Option<State>,
    }

    impl StateChangedData {
        /// Raw old state value, if any
        pub fn old_value(&self) -> Option<&str> {
            self.old_state.as_ref().map(|s| s.state.as_str())
        }

        /// Raw new state value, if any
        pub fn new_value(&self) -> Option<&str> {
            self.new_state.as_ref().map(|s| s.state.as_str())
        }
    }

    impl EventData for StateChangedData {
        fn event_type() -> &'static str {
            STATE_CHANGED
        }
    }
}
