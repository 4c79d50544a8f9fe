//! Household automation apps
//!
//! The apps run on top of an automation host reached through the [`Hass`]
//! trait. They never block and never run concurrently: the host delivers
//! state changes, bus events and fired timers to the [`AppManager`] one at a
//! time, and every delay is expressed as a scheduled [`AppTimer`].
//!
//! - [`PresenceTracker`] keeps a debounced presence state per person and the
//!   derived house state.
//! - [`NotificationDispatcher`] delivers notifications according to their
//!   level and queues briefings for persons that cannot be reached.
//! - [`ReminderApp`] sends recurring reminders until they are marked done.

pub mod constraints;
pub mod error;
pub mod hass;
pub mod manager;
pub mod notification;
pub mod presence;
pub mod reminder;

pub use constraints::AppConstraints;
pub use error::{AppError, AppResult};
pub use hass::{AppTimer, Hass};
pub use manager::AppManager;
pub use notification::{
    BriefingItem, BriefingList, CancelHandle, Notification, NotificationDispatcher,
    NotificationId, NotificationKind, NotificationLevel, Target,
};
pub use presence::{HouseState, PresenceChange, PresenceState, PresenceTracker, PresenceView};
pub use reminder::ReminderApp;
