//! Recurring reminders, repeated until marked done

use crate::constraints::AppConstraints;
use crate::error::AppResult;
use crate::hass::{AppTimer, Hass};
use crate::notification::{
    CancelHandle, Notification, NotificationDispatcher, NotificationKind, NotificationLevel,
};
use crate::presence::PresenceView;
use ha_config::ReminderConfig;
use ha_core::events::HTML5_NOTIFICATION_CLICKED;
use ha_core::Event;
use ha_event_bus::EventFilter;
use ha_scheduler::TimerHandle;
use serde_json::{json, Value};
use tracing::{debug, info};

/// Push notification action that marks a reminder as done
pub const DONE_ACTION: &str = "done";

/// Sends a repeating reminder on every reminder day
///
/// The reminder notification carries a `done` action and its name as `tag`.
/// Clicking `done` cancels it; a click without a tag cancels every reminder.
#[derive(Debug)]
pub struct ReminderApp {
    config: ReminderConfig,
    constraints: AppConstraints,
    done_filter: EventFilter,
    daily: Option<TimerHandle>,
    active: Option<CancelHandle>,
}

impl ReminderApp {
    pub fn new(config: ReminderConfig, constraints: AppConstraints) -> Self {
        Self {
            config,
            constraints,
            done_filter: EventFilter::new(HTML5_NOTIFICATION_CLICKED).with("action", DONE_ACTION),
            daily: None,
            active: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Schedule the daily date check
    pub fn initialize(&mut self, hass: &dyn Hass) {
        if let Some(handle) = self.daily.take() {
            hass.cancel_timer(handle);
        }
        let handle = hass.run_daily(
            self.config.reminder_time,
            AppTimer::Reminder(self.config.name.clone()),
        );
        debug!(reminder = %self.config.name, at = %self.config.reminder_time, %handle, "Daily check scheduled");
        self.daily = Some(handle);
    }

    /// Daily check: send the reminder if today is a reminder day
    pub fn on_timer(
        &mut self,
        hass: &dyn Hass,
        presence: &dyn PresenceView,
        dispatcher: &mut NotificationDispatcher,
    ) -> AppResult<()> {
        if !self.constraints.allows(hass, presence) {
            debug!(reminder = %self.config.name, "Reminder check skipped by constraints");
            return Ok(());
        }
        let today = hass.now().date();
        if !self.config.is_reminder_day(today) {
            return Ok(());
        }

        if let Some(handle) = self.active.take() {
            dispatcher.cancel(hass, handle);
        }
        let notification = Notification::new(
            NotificationKind::Repeat,
            NotificationLevel::Home,
            &self.config.title,
            &self.config.message,
            &self.config.notifications.targets,
        )
        .with_interval(self.config.notifications.interval())
        .with_data(self.action_data());
        self.active = Some(dispatcher.notify(hass, presence, notification));
        info!(reminder = %self.config.name, %today, "Reminder day, reminder sent");
        Ok(())
    }

    /// Cancel the active reminder when its `done` action was clicked
    pub fn on_event(
        &mut self,
        hass: &dyn Hass,
        dispatcher: &mut NotificationDispatcher,
        event: &Event<Value>,
    ) {
        if !self.done_filter.matches(event) || !self.constraints.enabled(hass) {
            return;
        }
        if event.data_str("tag").map_or(false, |tag| tag != self.config.name) {
            return;
        }
        if let Some(handle) = self.active.take() {
            dispatcher.cancel(hass, handle);
            info!(reminder = %self.config.name, "Reminder done");
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    fn action_data(&self) -> Value {
        json!({
            "tag": self.config.name,
            "actions": [{"action": DONE_ACTION, "title": "Done"}],
        })
    }
}
