//! Owns every app and routes host callbacks to them

use crate::constraints::AppConstraints;
use crate::error::{AppError, AppResult};
use crate::hass::{AppTimer, Hass};
use crate::notification::{CancelHandle, Notification, NotificationDispatcher};
use crate::presence::{PresenceChange, PresenceTracker};
use crate::reminder::ReminderApp;
use ha_config::AppsConfig;
use ha_core::events::{StateChangedData, STATE_CHANGED};
use ha_core::Event;
use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, error, info, instrument};

/// The household apps
///
/// Callbacks take `&mut self` and run to completion, so the host must deliver
/// them one at a time.
#[derive(Debug)]
pub struct AppManager {
    presence: PresenceTracker,
    notifications: NotificationDispatcher,
    reminders: IndexMap<String, ReminderApp>,
}

impl AppManager {
    /// Build the apps; a reminder with an invalid configuration is left out
    pub fn new(config: &AppsConfig) -> Self {
        let mut reminders = IndexMap::new();
        for (name, parsed) in config.reminder_configs() {
            let app = parsed.map_err(AppError::from).and_then(|reminder| {
                let constraints = reminder.constraints.merged(&config.constraints_for(&name));
                let constraints = AppConstraints::new(&name, &constraints, config)?;
                Ok(ReminderApp::new(reminder, constraints))
            });
            match app {
                Ok(app) => {
                    reminders.insert(name, app);
                }
                Err(err) => error!(reminder = %name, %err, "Reminder disabled"),
            }
        }

        Self {
            presence: PresenceTracker::new(config),
            notifications: NotificationDispatcher::new(config),
            reminders,
        }
    }

    #[instrument(skip_all)]
    pub fn initialize(&mut self, hass: &dyn Hass) -> AppResult<()> {
        self.presence.initialize(hass)?;
        for reminder in self.reminders.values_mut() {
            reminder.initialize(hass);
        }
        info!(
            persons = self.presence.persons().count(),
            reminders = self.reminders.len(),
            house = %self.presence.house_presence_state(),
            "Apps initialized"
        );
        Ok(())
    }

    pub fn on_state_changed(&mut self, hass: &dyn Hass, change: &StateChangedData) -> AppResult<()> {
        let changes = self.presence.on_state_changed(hass, change)?;
        for presence_change in &changes {
            self.on_presence_change(hass, presence_change)?;
        }
        self.notifications
            .on_state_changed(hass, &self.presence, change)
    }

    /// Handle a bus event; state changes are routed to [`AppManager::on_state_changed`]
    pub fn on_event(&mut self, hass: &dyn Hass, event: &Event<Value>) -> AppResult<()> {
        if event.event_type.as_str() == STATE_CHANGED {
            let change: StateChangedData = serde_json::from_value(event.data.clone())?;
            return self.on_state_changed(hass, &change);
        }
        for reminder in self.reminders.values_mut() {
            reminder.on_event(hass, &mut self.notifications, event);
        }
        Ok(())
    }

    pub fn on_timer(&mut self, hass: &dyn Hass, timer: AppTimer) -> AppResult<()> {
        match timer {
            AppTimer::Presence { person, armed } => {
                if let Some(change) = self.presence.on_timer(hass, &person, armed)? {
                    self.on_presence_change(hass, &change)?;
                }
                Ok(())
            }
            AppTimer::Notification(id) => self.notifications.on_timer(hass, &self.presence, id),
            AppTimer::Reminder(name) => match self.reminders.get_mut(&name) {
                Some(reminder) => reminder.on_timer(hass, &self.presence, &mut self.notifications),
                None => {
                    debug!(reminder = %name, "Timer of unknown reminder ignored");
                    Ok(())
                }
            },
        }
    }

    fn on_presence_change(&mut self, hass: &dyn Hass, change: &PresenceChange) -> AppResult<()> {
        self.notifications.on_presence_change(hass, change)
    }

    /// Send a notification on behalf of another automation
    pub fn notify(&mut self, hass: &dyn Hass, notification: Notification) -> CancelHandle {
        self.notifications.notify(hass, &self.presence, notification)
    }

    pub fn cancel(&mut self, hass: &dyn Hass, handle: CancelHandle) {
        self.notifications.cancel(hass, handle);
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn notifications(&self) -> &NotificationDispatcher {
        &self.notifications
    }

    pub fn reminder(&self, name: &str) -> Option<&ReminderApp> {
        self.reminders.get(name)
    }
}
