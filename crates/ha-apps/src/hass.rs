//! The automation host as seen by the apps

use crate::error::AppResult;
use crate::notification::NotificationId;
use crate::presence::PresenceState;
use chrono::{NaiveDateTime, NaiveTime};
use ha_core::{EntityId, StateReading};
use ha_scheduler::TimerHandle;
use serde_json::Value;
use std::time::Duration;

/// Payload of every timer the apps schedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppTimer {
    /// Debounced presence transition, valid only while `person` is still `armed`
    Presence {
        person: String,
        armed: PresenceState,
    },
    /// Delivery attempt of a scheduled notification
    Notification(NotificationId),
    /// Daily check of the named reminder
    Reminder(String),
}

/// Host services used by the apps
///
/// All methods return immediately. Service calls are dispatched, not awaited:
/// an `Err` means the call could not be dispatched at all.
pub trait Hass {
    /// Current local wall-clock time
    fn now(&self) -> NaiveDateTime;

    fn get_state(&self, entity_id: &EntityId) -> StateReading;

    /// Select an option of an input_select
    fn select_option(&self, entity_id: &EntityId, option: &str) -> AppResult<()>;

    fn set_state(&self, entity_id: &EntityId, state: &str) -> AppResult<()>;

    fn call_service(&self, domain: &str, service: &str, data: Value) -> AppResult<()>;

    fn run_in(&self, delay: Duration, timer: AppTimer) -> TimerHandle;

    fn run_every(&self, start: Duration, interval: Duration, timer: AppTimer) -> TimerHandle;

    fn run_daily(&self, at: NaiveTime, timer: AppTimer) -> TimerHandle;

    /// Cancel a timer; unknown or expired handles are ignored
    fn cancel_timer(&self, handle: TimerHandle);
}
