//! Enable switch and disabled states of an app

use crate::error::AppResult;
use crate::hass::Hass;
use crate::presence::{HouseState, PresenceView};
use chrono::{Datelike, Weekday};
use ha_config::{AppsConfig, ConfigError, ConstraintsConfig};
use ha_core::{EntityId, StateReading, STATE_OFF, STATE_ON};
use tracing::trace;

/// Decides whether an app may act right now
///
/// Every check fails closed: an enable switch or mode that cannot be read
/// disables the app. Only a missing enable switch counts as enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConstraints {
    app: String,
    enable: EntityId,
    disabled_presence: Vec<HouseState>,
    disabled_modes: Vec<(String, EntityId)>,
    disabled_days: Vec<Weekday>,
}

impl AppConstraints {
    pub fn new(app: &str, config: &ConstraintsConfig, apps: &AppsConfig) -> AppResult<Self> {
        let enable = match &config.enable_input_boolean {
            Some(entity) => entity.clone(),
            None => EntityId::new("input_boolean", app)?,
        };
        let disabled_presence = config
            .disabled_presence
            .iter()
            .map(|state| state.parse())
            .collect::<AppResult<Vec<HouseState>>>()?;
        let disabled_modes = config
            .disabled_modes
            .iter()
            .map(|mode| {
                apps.mode(mode)
                    .map(|entity| (mode.clone(), entity.clone()))
                    .ok_or_else(|| ConfigError::InvalidValue {
                        key: format!("{app}.disabled_modes"),
                        reason: format!("mode '{mode}' is not configured"),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            app: app.to_string(),
            enable,
            disabled_presence,
            disabled_modes,
            disabled_days: config.disabled_days.clone(),
        })
    }

    pub fn enable_entity(&self) -> &EntityId {
        &self.enable
    }

    /// State of the enable switch
    pub fn enabled(&self, hass: &dyn Hass) -> bool {
        match hass.get_state(&self.enable) {
            StateReading::Missing => true,
            reading => reading.is(STATE_ON),
        }
    }

    /// Enabled and in none of the disabled states
    pub fn allows(&self, hass: &dyn Hass, presence: &dyn PresenceView) -> bool {
        if !self.enabled(hass) {
            trace!(app = %self.app, "Disabled by switch");
            return false;
        }
        let house = presence.house_state();
        if self.disabled_presence.contains(&house) {
            trace!(app = %self.app, %house, "Disabled by house presence");
            return false;
        }
        if let Some((mode, _)) = self
            .disabled_modes
            .iter()
            .find(|(_, entity)| !hass.get_state(entity).is(STATE_OFF))
        {
            trace!(app = %self.app, mode = %mode, "Disabled by mode");
            return false;
        }
        let today = hass.now().weekday();
        if self.disabled_days.contains(&today) {
            trace!(app = %self.app, %today, "Disabled on this weekday");
            return false;
        }
        true
    }
}
