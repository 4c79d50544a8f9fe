//! Entity state and the app-side view of a state read

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Context, EntityId, STATE_UNAVAILABLE, STATE_UNKNOWN};

/// The state of an entity at a point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    pub entity_id: EntityId,

    /// The state value (e.g., "on", "not_home", "just_arrived")
    pub state: String,

    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,

    /// When the state value last changed
    pub last_changed: DateTime<Utc>,

    /// When the state was last written, even with an unchanged value
    pub last_updated: DateTime<Utc>,

    pub context: Context,
}

impl State {
    pub fn new(
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
        context: Context,
    ) -> Self {
        let now = Utc::now();
        Self {
            entity_id,
            state: state.into(),
            attributes,
            last_changed: now,
            last_updated: now,
            context,
        }
    }

    /// Create an updated state, preserving last_changed if the value is the same
    pub fn with_update(
        &self,
        new_state: impl Into<String>,
        new_attributes: HashMap<String, serde_json::Value>,
        context: Context,
    ) -> Self {
        let now = Utc::now();
        let new_state = new_state.into();
        let last_changed = if self.state != new_state {
            now
        } else {
            self.last_changed
        };

        Self {
            entity_id: self.entity_id.clone(),
            state: new_state,
            attributes: new_attributes,
            last_changed,
            last_updated: now,
            context,
        }
    }

    /// Get an attribute value by key
    pub fn attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// The result of reading an entity's state from the host
///
/// `unknown`, `unavailable` and a missing entity are transient read failures:
/// callers treat them as "no actionable state" and never infer a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateReading {
    Value(String),
    Unknown,
    Unavailable,
    Missing,
}

impl StateReading {
    /// Classify a raw value as returned by the state store
    pub fn from_raw(raw: Option<&str>) -> Self {
        match raw {
            None => Self::Missing,
            Some(STATE_UNKNOWN) => Self::Unknown,
            Some(STATE_UNAVAILABLE) => Self::Unavailable,
            Some(value) => Self::Value(value.to_string()),
        }
    }

    /// The actionable value, if the read succeeded
    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Whether the read produced exactly this value
    pub fn is(&self, expected: &str) -> bool {
        self.value() == Some(expected)
    }

    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Value(_))
    }
}

impl From<Option<String>> for StateReading {
    fn from(raw: Option<String>) -> Self {
        Self::from_raw(raw.as_deref())
    }
}
