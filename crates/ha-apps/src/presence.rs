//! Debounced presence state per person and the derived house state

use crate::error::{AppError, AppResult};
use crate::hass::{AppTimer, Hass};
use ha_config::{AppsConfig, ConfigError, HouseConfig, PersonConfig};
use ha_core::events::StateChangedData;
use ha_core::{StateReading, STATE_HOME, STATE_NOT_HOME};
use ha_scheduler::TimerHandle;
use ha_state_store::StateFilter;
use indexmap::IndexMap;
use serde_json::json;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, instrument, trace};

/// How long `JustArrived` holds before it becomes `Home`
pub const JUST_ARRIVED_HOLD: Duration = Duration::from_secs(5 * 60);
/// How long `JustLeft` holds before it becomes `Away`
pub const JUST_LEFT_HOLD: Duration = Duration::from_secs(5 * 60);
/// How long `Away` holds before it becomes `ExtendedAway`
pub const EXTENDED_AWAY_HOLD: Duration = Duration::from_secs(24 * 60 * 60);

/// Presence of a single person
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresenceState {
    Home,
    JustArrived,
    JustLeft,
    Away,
    ExtendedAway,
}

impl PresenceState {
    pub const ALL: [PresenceState; 5] = [
        Self::Home,
        Self::JustArrived,
        Self::JustLeft,
        Self::Away,
        Self::ExtendedAway,
    ];

    /// Option string of the person's input_select
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Home => "home",
            Self::JustArrived => "just_arrived",
            Self::JustLeft => "just_left",
            Self::Away => "away",
            Self::ExtendedAway => "extended_away",
        }
    }

    /// `Home` or `JustArrived`
    pub fn is_present(self) -> bool {
        matches!(self, Self::Home | Self::JustArrived)
    }

    /// The timed transition armed while in this state
    fn hold(self) -> Option<(Duration, PresenceState)> {
        match self {
            Self::JustArrived => Some((JUST_ARRIVED_HOLD, Self::Home)),
            Self::JustLeft => Some((JUST_LEFT_HOLD, Self::Away)),
            Self::Away => Some((EXTENDED_AWAY_HOLD, Self::ExtendedAway)),
            Self::Home | Self::ExtendedAway => None,
        }
    }
}

impl fmt::Display for PresenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresenceState {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| AppError::UnknownOption {
                kind: "presence state",
                value: s.to_string(),
            })
    }
}

/// Presence of the whole household
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HouseState {
    Everyone,
    Someone,
    NoOne,
    Vacation,
}

impl HouseState {
    pub const ALL: [HouseState; 4] = [Self::Everyone, Self::Someone, Self::NoOne, Self::Vacation];

    /// Option string of the house input_select
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Everyone => "everyone",
            Self::Someone => "someone",
            Self::NoOne => "noone",
            Self::Vacation => "vacation",
        }
    }

    /// Derive the house state from a snapshot of every person's state
    pub fn from_persons(states: impl IntoIterator<Item = PresenceState>) -> Self {
        let states: Vec<PresenceState> = states.into_iter().collect();
        if states.iter().all(|s| s.is_present()) {
            Self::Everyone
        } else if states.iter().all(|s| *s == PresenceState::ExtendedAway) {
            Self::Vacation
        } else if states.iter().all(|s| !s.is_present()) {
            Self::NoOne
        } else {
            Self::Someone
        }
    }
}

impl fmt::Display for HouseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HouseState {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| AppError::UnknownOption {
                kind: "house state",
                value: s.to_string(),
            })
    }
}

/// A committed person transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceChange {
    pub person: String,
    pub old: PresenceState,
    pub new: PresenceState,
}

impl PresenceChange {
    /// The person went from an absent state to a present one
    pub fn is_arrival(&self) -> bool {
        !self.old.is_present() && self.new.is_present()
    }
}

/// Read access to presence, handed to apps that gate on it
pub trait PresenceView {
    fn presence_state(&self, person: &str) -> Option<PresenceState>;

    fn house_state(&self) -> HouseState;

    fn is_present(&self, person: &str) -> bool {
        self.presence_state(person)
            .map_or(false, PresenceState::is_present)
    }
}

#[derive(Debug)]
struct TrackedPerson {
    config: PersonConfig,
    keys_filter: StateFilter,
    state: PresenceState,
    pending: Option<TimerHandle>,
}

/// Per-person presence state machines plus the derived house state
#[derive(Debug)]
pub struct PresenceTracker {
    persons: IndexMap<String, TrackedPerson>,
    house: HouseConfig,
}

impl PresenceTracker {
    /// Every person starts `Home` until [`PresenceTracker::initialize`] reads the key sensors
    pub fn new(config: &AppsConfig) -> Self {
        let persons = config
            .persons
            .iter()
            .map(|(name, person)| {
                let tracked = TrackedPerson {
                    config: person.clone(),
                    keys_filter: StateFilter::entity(person.keys.clone()),
                    state: PresenceState::Home,
                    pending: None,
                };
                (name.clone(), tracked)
            })
            .collect();

        Self {
            persons,
            house: config.house.clone(),
        }
    }

    /// Set every person from their key sensor and write all input_selects
    #[instrument(skip_all)]
    pub fn initialize(&mut self, hass: &dyn Hass) -> AppResult<()> {
        for (name, person) in self.persons.iter_mut() {
            let keys = hass.get_state(&person.config.keys);
            person.state = if keys.is(STATE_NOT_HOME) {
                PresenceState::Away
            } else {
                PresenceState::Home
            };
            hass.select_option(&person.config.presence_state, person.state.as_str())?;
            info!(person = %name, state = %person.state, "Initial presence");
            arm(hass, name, person);
        }
        self.update_house(hass)
    }

    /// Evaluate a state change of any entity; only key sensors matter
    pub fn on_state_changed(
        &mut self,
        hass: &dyn Hass,
        change: &StateChangedData,
    ) -> AppResult<Vec<PresenceChange>> {
        let mut requests = Vec::new();
        for (name, person) in &self.persons {
            if !person.keys_filter.matches(change) {
                continue;
            }
            let reading = StateReading::from_raw(change.new_value());
            let Some(value) = reading.value() else {
                debug!(person = %name, ?reading, "Key sensor has no usable state");
                continue;
            };
            let target = if value == STATE_NOT_HOME {
                matches!(person.state, PresenceState::Home | PresenceState::JustArrived)
                    .then_some(PresenceState::JustLeft)
            } else {
                (!person.state.is_present()).then_some(PresenceState::JustArrived)
            };
            if let Some(target) = target {
                requests.push((name.clone(), target));
            }
        }

        let mut changes = Vec::new();
        for (name, target) in requests {
            if let Some(change) = self.set_presence_person(hass, &name, target)? {
                changes.push(change);
            }
        }
        Ok(changes)
    }

    /// Handle a fired debounce timer
    pub fn on_timer(
        &mut self,
        hass: &dyn Hass,
        person: &str,
        armed: PresenceState,
    ) -> AppResult<Option<PresenceChange>> {
        let tracked = self.tracked_mut(person)?;
        if tracked.state != armed {
            debug!(person, %armed, current = %tracked.state, "Stale presence timer ignored");
            return Ok(None);
        }
        tracked.pending = None;
        match armed.hold() {
            Some((_, target)) => self.set_presence_person(hass, person, target),
            None => Ok(None),
        }
    }

    /// Move a person to `target`, then recompute the house state
    ///
    /// `JustArrived` requested while `JustLeft` collapses to `Home`. Asking for
    /// the current state does nothing.
    #[instrument(skip(self, hass))]
    pub fn set_presence_person(
        &mut self,
        hass: &dyn Hass,
        person: &str,
        target: PresenceState,
    ) -> AppResult<Option<PresenceChange>> {
        let tracked = self.tracked_mut(person)?;
        let old = tracked.state;
        let target = if old == PresenceState::JustLeft && target == PresenceState::JustArrived {
            PresenceState::Home
        } else {
            target
        };
        if target == old {
            trace!(person, state = %old, "Presence unchanged");
            return Ok(None);
        }

        tracked.state = target;
        if let Some(handle) = tracked.pending.take() {
            hass.cancel_timer(handle);
        }
        hass.select_option(&tracked.config.presence_state, target.as_str())?;
        if let Some(topic) = &tracked.config.keys_topic {
            let payload = if target.is_present() {
                STATE_HOME
            } else {
                STATE_NOT_HOME
            };
            hass.call_service("mqtt", "publish", json!({"topic": topic, "payload": payload}))?;
        }
        info!(person, old = %old, new = %target, "Presence changed");
        arm(hass, person, tracked);

        self.update_house(hass)?;
        Ok(Some(PresenceChange {
            person: person.to_string(),
            old,
            new: target,
        }))
    }

    /// Current house state derived from all persons
    pub fn house_presence_state(&self) -> HouseState {
        HouseState::from_persons(self.persons.values().map(|p| p.state))
    }

    /// Write the house input_select if its stored value differs
    fn update_house(&self, hass: &dyn Hass) -> AppResult<()> {
        let new = self.house_presence_state();
        let stored = hass.get_state(&self.house.presence_state);
        if stored.is(new.as_str()) {
            return Ok(());
        }
        hass.select_option(&self.house.presence_state, new.as_str())?;
        info!(old = ?stored.value(), new = %new, "House presence changed");
        Ok(())
    }

    fn tracked_mut(&mut self, person: &str) -> AppResult<&mut TrackedPerson> {
        self.persons.get_mut(person).ok_or_else(|| {
            ConfigError::UnknownPerson {
                name: person.to_string(),
            }
            .into()
        })
    }

    /// Persons whose state is one of `states`, in configuration order
    pub fn who_in_state(&self, states: &[PresenceState]) -> Vec<&str> {
        self.persons
            .iter()
            .filter(|(_, p)| states.contains(&p.state))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn persons_home(&self) -> Vec<&str> {
        self.who_in_state(&[PresenceState::Home, PresenceState::JustArrived])
    }

    pub fn everyone_home(&self) -> bool {
        self.persons_home().len() == self.persons.len()
    }

    pub fn someone_home(&self) -> bool {
        !self.persons_home().is_empty()
    }

    pub fn noone_home(&self) -> bool {
        self.persons_home().is_empty()
    }

    pub fn everyone_extended_away(&self) -> bool {
        self.who_in_state(&[PresenceState::ExtendedAway]).len() == self.persons.len()
    }

    pub fn house_in_state(&self, states: &[HouseState]) -> bool {
        states.contains(&self.house_presence_state())
    }

    pub fn persons(&self) -> impl Iterator<Item = &str> {
        self.persons.keys().map(String::as_str)
    }
}

impl PresenceView for PresenceTracker {
    fn presence_state(&self, person: &str) -> Option<PresenceState> {
        self.persons.get(person).map(|p| p.state)
    }

    fn house_state(&self) -> HouseState {
        self.house_presence_state()
    }
}

/// Arm the timed transition of the person's current state
fn arm(hass: &dyn Hass, name: &str, person: &mut TrackedPerson) {
    if let Some((hold, _)) = person.state.hold() {
        let handle = hass.run_in(
            hold,
            AppTimer::Presence {
                person: name.to_string(),
                armed: person.state,
            },
        );
        debug!(person = name, state = %person.state, %handle, ?hold, "Armed presence timer");
        person.pending = Some(handle);
    }
}
