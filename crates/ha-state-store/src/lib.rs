//! Entity state storage for the household apps host
//!
//! The StateStore keeps the current state of every entity, fires a
//! STATE_CHANGED event for each write and implements the `input_select`
//! option semantics the presence apps rely on. [`StateFilter`] describes a
//! state listener (`entity`, optional `old`/`new` values).

use dashmap::DashMap;
use ha_core::events::StateChangedData;
use ha_core::{Context, EntityId, State, StateReading};
use ha_event_bus::EventBus;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Attribute holding the selectable options of an `input_select`
pub const ATTR_OPTIONS: &str = "options";

/// Errors returned by state writes
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StateStoreError {
    #[error("entity {0} does not exist")]
    NotFound(String),

    #[error("'{option}' is not an option of {entity_id}")]
    InvalidOption { entity_id: String, option: String },
}

/// The state store tracks all entity states
pub struct StateStore {
    /// All entity states keyed by entity_id string
    states: DashMap<String, State>,
    /// Event bus for firing state change events
    event_bus: Arc<EventBus>,
}

impl StateStore {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            states: DashMap::new(),
            event_bus,
        }
    }

    /// Set the state of an entity and fire STATE_CHANGED
    ///
    /// `last_changed` only moves when the state value actually changes.
    #[instrument(skip(self, state, attributes, context), fields(entity_id = %entity_id))]
    pub fn set(
        &self,
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
        context: Context,
    ) -> State {
        let key = entity_id.to_string();
        let old_state = self.states.get(&key).map(|s| s.clone());

        let new_state = match &old_state {
            Some(existing) => existing.with_update(state, attributes, context.clone()),
            None => State::new(entity_id.clone(), state, attributes, context.clone()),
        };

        debug!(
            state = %new_state.state,
            changed = old_state.as_ref().map(|s| s.state != new_state.state).unwrap_or(true),
            "Setting entity state"
        );

        self.states.insert(key, new_state.clone());

        self.event_bus.fire_typed(
            StateChangedData {
                entity_id,
                old_state,
                new_state: Some(new_state.clone()),
            },
            context,
        );

        new_state
    }

    /// Set only the state value, keeping the existing attributes
    pub fn set_value(&self, entity_id: EntityId, state: impl Into<String>, context: Context) -> State {
        let attributes = self
            .states
            .get(&entity_id.to_string())
            .map(|s| s.attributes.clone())
            .unwrap_or_default();
        self.set(entity_id, state, attributes, context)
    }

    /// Select an option of an `input_select`
    ///
    /// Fails if the entity does not exist or if it declares options and the
    /// requested one is not among them.
    pub fn select_option(
        &self,
        entity_id: &EntityId,
        option: &str,
        context: Context,
    ) -> Result<State, StateStoreError> {
        let current = self
            .get(&entity_id.to_string())
            .ok_or_else(|| StateStoreError::NotFound(entity_id.to_string()))?;

        if let Some(options) = current.attribute::<Vec<String>>(ATTR_OPTIONS) {
            if !options.iter().any(|o| o == option) {
                warn!(entity_id = %entity_id, option, "Rejected unknown option");
                return Err(StateStoreError::InvalidOption {
                    entity_id: entity_id.to_string(),
                    option: option.to_string(),
                });
            }
        }

        Ok(self.set(entity_id.clone(), option, current.attributes, context))
    }

    pub fn get(&self, entity_id: &str) -> Option<State> {
        self.states.get(entity_id).map(|s| s.clone())
    }

    /// Get the state value, or None if the entity doesn't exist
    pub fn get_state(&self, entity_id: &str) -> Option<String> {
        self.states.get(entity_id).map(|s| s.state.clone())
    }

    /// Read an entity's state, classifying transient failures
    pub fn read(&self, entity_id: &str) -> StateReading {
        StateReading::from(self.get_state(entity_id))
    }

    pub fn exists(&self, entity_id: &str) -> bool {
        self.states.contains_key(entity_id)
    }
}

/// Describes a state listener: an entity plus optional old/new values
///
/// Mirrors `listen_state(entity, old=..., new=...)`: the filter matches a
/// change of `entity_id` whose previous value equals `old` (if set) and whose
/// current value equals `new` (if set). Attribute-only writes, where the
/// value did not change, never match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateFilter {
    pub entity_id: EntityId,
    pub old: Option<String>,
    pub new: Option<String>,
}

impl StateFilter {
    pub fn entity(entity_id: EntityId) -> Self {
        Self {
            entity_id,
            old: None,
            new: None,
        }
    }

    pub fn old(mut self, value: impl Into<String>) -> Self {
        self.old = Some(value.into());
        self
    }

    pub fn new_value(mut self, value: impl Into<String>) -> Self {
        self.new = Some(value.into());
        self
    }

    pub fn matches(&self, change: &StateChangedData) -> bool {
        if change.entity_id != self.entity_id {
            return false;
        }
        let (old, new) = (change.old_value(), change.new_value());
        if old == new {
            return false;
        }
        self.old.as_deref().map_or(true, |o| old == Some(o))
            && self.new.as_deref().map_or(true, |n| new == Some(n))
    }
}
