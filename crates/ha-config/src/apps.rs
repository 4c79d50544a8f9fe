//! The `apps.yaml` document: persons, house, modes and reminders

use crate::error::{ConfigError, ConfigResult};
use crate::loader::load_yaml;
use crate::reminder::ReminderConfig;
use chrono::Weekday;
use ha_core::EntityId;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_yaml::Value;
use std::path::Path;
use tracing::{debug, info};

/// File name of the apps configuration inside the config directory
pub const APPS_FILE: &str = "apps.yaml";

/// Target keywords that can never be used as person names
const RESERVED_NAMES: [&str; 2] = ["everyone", "home"];

/// Option strings of the house presence input_select
const HOUSE_STATES: [&str; 4] = ["everyone", "someone", "noone", "vacation"];

/// Entities of a single person
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PersonConfig {
    /// Key sensor or device tracker reporting `home` / `not_home`
    pub keys: EntityId,
    /// input_select holding the person's presence state
    pub presence_state: EntityId,
    #[serde(default)]
    pub notifier: Option<EntityId>,
    #[serde(default)]
    pub phone_call_bool: Option<EntityId>,
    /// MQTT topic the keys tracker is mirrored to
    #[serde(default)]
    pub keys_topic: Option<String>,
}

/// House level entities
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HouseConfig {
    pub presence_state: EntityId,
    #[serde(default)]
    pub notifier: Option<EntityId>,
}

/// Enable switch and disabled states of an app
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConstraintsConfig {
    /// Overrides the default `input_boolean.<app name>` switch
    pub enable_input_boolean: Option<EntityId>,
    /// House presence states in which the app does nothing
    pub disabled_presence: Vec<String>,
    /// Mode names (keys of `modes`) that disable the app while on
    pub disabled_modes: Vec<String>,
    pub disabled_days: Vec<Weekday>,
}

impl ConstraintsConfig {
    /// Union of both blocks; the enable switch of `self` wins when set
    pub fn merged(&self, other: &ConstraintsConfig) -> ConstraintsConfig {
        fn union<T: Clone + PartialEq>(a: &[T], b: &[T]) -> Vec<T> {
            let mut out = a.to_vec();
            for item in b {
                if !out.contains(item) {
                    out.push(item.clone());
                }
            }
            out
        }

        ConstraintsConfig {
            enable_input_boolean: self
                .enable_input_boolean
                .clone()
                .or_else(|| other.enable_input_boolean.clone()),
            disabled_presence: union(&self.disabled_presence, &other.disabled_presence),
            disabled_modes: union(&self.disabled_modes, &other.disabled_modes),
            disabled_days: union(&self.disabled_days, &other.disabled_days),
        }
    }
}

/// Complete apps configuration, immutable after loading
#[derive(Debug, Clone, Deserialize)]
pub struct AppsConfig {
    pub persons: IndexMap<String, PersonConfig>,
    pub house: HouseConfig,
    #[serde(default)]
    pub modes: IndexMap<String, EntityId>,
    /// Constraints per app name
    #[serde(default)]
    pub constraints: IndexMap<String, ConstraintsConfig>,
    /// Raw reminder sections, parsed one by one so a bad reminder stays local
    #[serde(default)]
    pub reminders: IndexMap<String, Value>,
}

impl AppsConfig {
    /// Load `apps.yaml` from the config directory
    pub fn load(config_dir: impl AsRef<Path>) -> ConfigResult<Self> {
        let config_dir = config_dir.as_ref();
        info!("Loading apps configuration from {:?}", config_dir);
        let value = load_yaml(config_dir, APPS_FILE)?;
        Self::from_value(value)
    }

    /// Parse a configuration from YAML text without tag processing
    pub fn from_yaml(content: &str) -> ConfigResult<Self> {
        let value: Value = serde_yaml::from_str(content).map_err(|e| ConfigError::ParseYaml {
            path: APPS_FILE.into(),
            source: e,
        })?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> ConfigResult<Self> {
        let config: Self = serde_yaml::from_value(value).map_err(|e| ConfigError::ParseYaml {
            path: APPS_FILE.into(),
            source: e,
        })?;
        config.validate()?;
        debug!(
            "Apps configuration: {} persons, {} modes, {} reminders",
            config.persons.len(),
            config.modes.len(),
            config.reminders.len()
        );
        Ok(config)
    }

    /// Check cross references and entity domains
    pub fn validate(&self) -> ConfigResult<()> {
        if self.persons.is_empty() {
            return Err(validation("at least one person must be configured"));
        }

        for (name, person) in &self.persons {
            if RESERVED_NAMES.contains(&name.as_str()) {
                return Err(validation(format!(
                    "person name '{name}' is reserved as a notification target"
                )));
            }
            expect_domain(&format!("persons.{name}.presence_state"), &person.presence_state, "input_select")?;
            if let Some(notifier) = &person.notifier {
                expect_domain(&format!("persons.{name}.notifier"), notifier, "notify")?;
            }
            if let Some(call) = &person.phone_call_bool {
                expect_domain(&format!("persons.{name}.phone_call_bool"), call, "input_boolean")?;
            }
        }

        expect_domain("house.presence_state", &self.house.presence_state, "input_select")?;
        if let Some(notifier) = &self.house.notifier {
            expect_domain("house.notifier", notifier, "notify")?;
        }

        for (mode, entity) in &self.modes {
            expect_domain(&format!("modes.{mode}"), entity, "input_boolean")?;
        }

        for (app, constraints) in &self.constraints {
            self.validate_constraints(&format!("constraints.{app}"), constraints)?;
        }

        Ok(())
    }

    /// Check that a constraints block only names known house states and modes
    pub fn validate_constraints(&self, key: &str, constraints: &ConstraintsConfig) -> ConfigResult<()> {
        for state in &constraints.disabled_presence {
            if !HOUSE_STATES.contains(&state.as_str()) {
                return Err(ConfigError::invalid(
                    format!("{key}.disabled_presence"),
                    format!("'{state}' is not a house presence state"),
                ));
            }
        }
        for mode in &constraints.disabled_modes {
            if !self.modes.contains_key(mode) {
                return Err(ConfigError::invalid(
                    format!("{key}.disabled_modes"),
                    format!("mode '{mode}' is not configured"),
                ));
            }
        }
        if let Some(entity) = &constraints.enable_input_boolean {
            expect_domain(&format!("{key}.enable_input_boolean"), entity, "input_boolean")?;
        }
        Ok(())
    }

    pub fn person(&self, name: &str) -> ConfigResult<&PersonConfig> {
        self.persons.get(name).ok_or_else(|| ConfigError::UnknownPerson {
            name: name.to_string(),
        })
    }

    /// Entity of a named mode switch
    pub fn mode(&self, name: &str) -> Option<&EntityId> {
        self.modes.get(name)
    }

    pub fn sleep_mode(&self) -> Option<&EntityId> {
        self.mode("sleep_mode")
    }

    /// Constraints of an app, empty when none are configured
    pub fn constraints_for(&self, app: &str) -> ConstraintsConfig {
        self.constraints.get(app).cloned().unwrap_or_default()
    }

    /// Parse every reminder section, keeping failures next to their name
    pub fn reminder_configs(&self) -> Vec<(String, ConfigResult<ReminderConfig>)> {
        self.reminders
            .iter()
            .map(|(name, raw)| {
                let parsed = ReminderConfig::from_yaml(name, raw).and_then(|reminder| {
                    self.validate_reminder(name, &reminder)?;
                    Ok(reminder)
                });
                (name.clone(), parsed)
            })
            .collect()
    }

    fn validate_reminder(&self, name: &str, reminder: &ReminderConfig) -> ConfigResult<()> {
        for target in reminder.notifications.target_names() {
            if !RESERVED_NAMES.contains(&target) && !self.persons.contains_key(target) {
                return Err(ConfigError::UnknownPerson {
                    name: target.to_string(),
                });
            }
        }
        self.validate_constraints(&format!("reminders.{name}.constraints"), &reminder.constraints)
    }
}

fn validation(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationFailed {
        message: message.into(),
    }
}

fn expect_domain(key: &str, entity: &EntityId, domain: &str) -> ConfigResult<()> {
    if entity.in_domain(domain) {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            key,
            format!("expected a {domain} entity, got '{entity}'"),
        ))
    }
}
