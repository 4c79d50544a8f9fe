//! Reminder configuration and reminder-day arithmetic

use crate::apps::ConstraintsConfig;
use crate::error::{ConfigError, ConfigResult};
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use serde_yaml::Value;
use std::time::Duration;

const DATE_FORMAT: &str = "%d.%m.%Y";
const TIME_FORMAT: &str = "%H:%M";

/// Unit of a repeat rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatUnit {
    Days,
    Weeks,
    /// Counted as 30 days
    Months,
}

impl RepeatUnit {
    pub fn days(self) -> u32 {
        match self {
            Self::Days => 1,
            Self::Weeks => 7,
            Self::Months => 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RepeatRule {
    #[serde(rename = "type")]
    pub unit: RepeatUnit,
    pub frequency: u32,
}

impl RepeatRule {
    /// Distance between two reminder days
    pub fn period_days(&self) -> u32 {
        self.unit.days().saturating_mul(self.frequency)
    }
}

/// Who gets the reminder and how often it repeats until done
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NotificationSettings {
    pub targets: String,
    /// Minutes between repeats
    #[serde(default = "default_interval")]
    pub interval: u64,
}

fn default_interval() -> u64 {
    60
}

impl NotificationSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval.saturating_mul(60))
    }

    /// Trimmed, non-empty names of the comma separated target list
    pub fn target_names(&self) -> impl Iterator<Item = &str> {
        self.targets.split(',').map(str::trim).filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct RawReminder {
    title: String,
    message: String,
    reminder_date: String,
    reminder_time: String,
    #[serde(default)]
    repeat: Option<RepeatRule>,
    notifications: NotificationSettings,
    #[serde(default)]
    constraints: ConstraintsConfig,
}

/// A validated reminder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderConfig {
    pub name: String,
    pub title: String,
    pub message: String,
    pub reminder_date: NaiveDate,
    pub reminder_time: NaiveTime,
    /// Without a rule the reminder fires on its start date only
    pub repeat: Option<RepeatRule>,
    pub notifications: NotificationSettings,
    pub constraints: ConstraintsConfig,
}

impl ReminderConfig {
    pub fn from_yaml(name: &str, value: &Value) -> ConfigResult<Self> {
        let raw: RawReminder = serde_yaml::from_value(value.clone())
            .map_err(|e| ConfigError::invalid(format!("reminders.{name}"), e))?;

        let reminder_date = NaiveDate::parse_from_str(raw.reminder_date.trim(), DATE_FORMAT)
            .map_err(|e| {
                ConfigError::invalid(
                    format!("reminders.{name}.reminder_date"),
                    format!("'{}' is not dd.mm.yyyy: {e}", raw.reminder_date),
                )
            })?;
        let reminder_time = NaiveTime::parse_from_str(raw.reminder_time.trim(), TIME_FORMAT)
            .map_err(|e| {
                ConfigError::invalid(
                    format!("reminders.{name}.reminder_time"),
                    format!("'{}' is not HH:MM: {e}", raw.reminder_time),
                )
            })?;

        if let Some(rule) = &raw.repeat {
            if rule.frequency == 0 {
                return Err(ConfigError::invalid(
                    format!("reminders.{name}.repeat.frequency"),
                    "must be greater than zero",
                ));
            }
            if rule.unit.days().checked_mul(rule.frequency).is_none() {
                return Err(ConfigError::invalid(
                    format!("reminders.{name}.repeat.frequency"),
                    format!("{} {:?} is out of range", rule.frequency, rule.unit),
                ));
            }
        }
        if raw.notifications.target_names().next().is_none() {
            return Err(ConfigError::invalid(
                format!("reminders.{name}.notifications.targets"),
                "no targets given",
            ));
        }
        if raw.notifications.interval == 0 {
            return Err(ConfigError::invalid(
                format!("reminders.{name}.notifications.interval"),
                "must be greater than zero",
            ));
        }
        if raw.notifications.interval.checked_mul(60).is_none() {
            return Err(ConfigError::invalid(
                format!("reminders.{name}.notifications.interval"),
                format!("{} minutes is out of range", raw.notifications.interval),
            ));
        }

        Ok(Self {
            name: name.to_string(),
            title: raw.title,
            message: raw.message,
            reminder_date,
            reminder_time,
            repeat: raw.repeat,
            notifications: raw.notifications,
            constraints: raw.constraints,
        })
    }

    /// Whether a reminder is due on the given date
    pub fn is_reminder_day(&self, date: NaiveDate) -> bool {
        let days = (date - self.reminder_date).num_days();
        if days < 0 {
            return false;
        }
        match &self.repeat {
            Some(rule) => days % i64::from(rule.period_days()) == 0,
            None => days == 0,
        }
    }
}
