//! Fake automation host with a virtual clock

#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use ha_apps::{AppManager, AppResult, AppTimer, Hass};
use ha_config::AppsConfig;
use ha_core::events::StateChangedData;
use ha_core::{Context, EntityId, Event, State, StateReading};
use ha_scheduler::{until_next, TimerHandle};
use ha_service_registry::ServiceError;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

pub const CONFIG: &str = r#"
persons:
  Dimitri:
    keys: sensor.dimitri
    keys_topic: location/dimitri_keys
    presence_state: input_select.dimitri_presence
    notifier: notify.dimitri_handy
  Sabrina:
    keys: sensor.sabrina
    presence_state: input_select.sabrina_presence
    notifier: notify.sabrina_handy
house:
  presence_state: input_select.house_presence
  notifier: notify.house
modes:
  sleep_mode: input_boolean.sleep_mode
reminders:
  plants:
    title: Plants
    message: Water the plants
    reminder_date: 01.01.2024
    reminder_time: "18:00"
    repeat: { type: weeks, frequency: 1 }
    notifications: { targets: Dimitri, interval: 60 }
    constraints:
      disabled_presence: [vacation]
"#;

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceCallRecord {
    pub domain: String,
    pub service: String,
    pub data: Value,
}

#[derive(Debug)]
struct Timer {
    handle: TimerHandle,
    due: NaiveDateTime,
    every: Option<chrono::Duration>,
    payload: AppTimer,
}

#[derive(Debug)]
struct Inner {
    now: NaiveDateTime,
    states: HashMap<String, String>,
    selects: Vec<(String, String)>,
    calls: Vec<ServiceCallRecord>,
    timers: Vec<Timer>,
    next_handle: u64,
    failing: HashSet<String>,
}

pub struct FakeHass {
    inner: Mutex<Inner>,
}

/// Monday 2024-01-01 08:00
pub fn start_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(8, 0, 0)
        .unwrap()
}

pub fn minutes(n: u64) -> Duration {
    Duration::from_secs(n * 60)
}

pub fn hours(n: u64) -> Duration {
    minutes(n * 60)
}

pub fn config() -> AppsConfig {
    AppsConfig::from_yaml(CONFIG).unwrap()
}

/// Host where everyone's keys are home and sleep mode is off
pub fn everyone_home() -> FakeHass {
    let hass = FakeHass::new(start_time());
    hass.set("sensor.dimitri", "home");
    hass.set("sensor.sabrina", "home");
    hass.set("input_boolean.sleep_mode", "off");
    hass
}

/// Initialized manager over the default configuration
pub fn manager(hass: &FakeHass) -> AppManager {
    let mut manager = AppManager::new(&config());
    manager.initialize(hass).unwrap();
    manager
}

impl FakeHass {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            inner: Mutex::new(Inner {
                now,
                states: HashMap::new(),
                selects: Vec::new(),
                calls: Vec::new(),
                timers: Vec::new(),
                next_handle: 1,
                failing: HashSet::new(),
            }),
        }
    }

    /// Set a state without notifying anyone
    pub fn set(&self, entity_id: &str, value: &str) {
        self.inner
            .lock()
            .unwrap()
            .states
            .insert(entity_id.to_string(), value.to_string());
    }

    pub fn remove(&self, entity_id: &str) {
        self.inner.lock().unwrap().states.remove(entity_id);
    }

    /// Set a state and deliver the change to the apps
    pub fn change(&self, apps: &mut AppManager, entity_id: &str, value: &str) -> AppResult<()> {
        let entity: EntityId = entity_id.parse().unwrap();
        let old = self
            .inner
            .lock()
            .unwrap()
            .states
            .insert(entity_id.to_string(), value.to_string());
        let change = StateChangedData {
            entity_id: entity.clone(),
            old_state: old.map(|v| State::new(entity.clone(), v, HashMap::new(), Context::new())),
            new_state: Some(State::new(entity, value, HashMap::new(), Context::new())),
        };
        apps.on_state_changed(self, &change)
    }

    pub fn fire(&self, apps: &mut AppManager, event_type: &str, data: Value) -> AppResult<()> {
        apps.on_event(self, &Event::new(event_type, data, Context::new()))
    }

    /// Move the clock forward, delivering every timer that falls due
    pub fn advance(&self, apps: &mut AppManager, by: Duration) -> AppResult<()> {
        let target = self.now() + chrono::Duration::from_std(by).unwrap();
        loop {
            let next = {
                let mut inner = self.inner.lock().unwrap();
                let Some(index) = inner
                    .timers
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.due <= target)
                    .min_by_key(|(_, t)| (t.due, t.handle))
                    .map(|(i, _)| i)
                else {
                    break;
                };
                let due = inner.timers[index].due;
                inner.now = due;
                match inner.timers[index].every {
                    Some(every) => {
                        inner.timers[index].due = due + every;
                        inner.timers[index].payload.clone()
                    }
                    None => inner.timers.remove(index).payload,
                }
            };
            apps.on_timer(self, next)?;
        }
        self.inner.lock().unwrap().now = target;
        Ok(())
    }

    /// Make calls to this service fail
    pub fn fail_service(&self, domain: &str, service: &str) {
        self.inner
            .lock()
            .unwrap()
            .failing
            .insert(format!("{domain}.{service}"));
    }

    pub fn state(&self, entity_id: &str) -> Option<String> {
        self.inner.lock().unwrap().states.get(entity_id).cloned()
    }

    /// Number of select_option writes to the entity
    pub fn selects(&self, entity_id: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .selects
            .iter()
            .filter(|(e, _)| e == entity_id)
            .count()
    }

    pub fn calls(&self, domain: &str, service: &str) -> Vec<Value> {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.domain == domain && c.service == service)
            .map(|c| c.data.clone())
            .collect()
    }

    /// Titles delivered through a notify service, in order
    pub fn notified(&self, service: &str) -> Vec<String> {
        self.calls("notify", service)
            .iter()
            .filter_map(|data| data["title"].as_str().map(str::to_string))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().unwrap().calls.clear();
    }

    pub fn timer_count(&self) -> usize {
        self.inner.lock().unwrap().timers.len()
    }

    fn schedule(&self, delay: Duration, every: Option<Duration>, payload: AppTimer) -> TimerHandle {
        let mut inner = self.inner.lock().unwrap();
        let handle = TimerHandle::new(inner.next_handle);
        inner.next_handle += 1;
        let due = inner.now + chrono::Duration::from_std(delay).unwrap();
        inner.timers.push(Timer {
            handle,
            due,
            every: every.map(|e| chrono::Duration::from_std(e).unwrap()),
            payload,
        });
        handle
    }
}

impl Hass for FakeHass {
    fn now(&self) -> NaiveDateTime {
        self.inner.lock().unwrap().now
    }

    fn get_state(&self, entity_id: &EntityId) -> StateReading {
        let inner = self.inner.lock().unwrap();
        StateReading::from_raw(inner.states.get(&entity_id.to_string()).map(String::as_str))
    }

    fn select_option(&self, entity_id: &EntityId, option: &str) -> AppResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.states.insert(entity_id.to_string(), option.to_string());
        inner.selects.push((entity_id.to_string(), option.to_string()));
        Ok(())
    }

    fn set_state(&self, entity_id: &EntityId, state: &str) -> AppResult<()> {
        self.set(&entity_id.to_string(), state);
        Ok(())
    }

    fn call_service(&self, domain: &str, service: &str, data: Value) -> AppResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.failing.contains(&format!("{domain}.{service}")) {
            return Err(ServiceError::CallFailed(format!("{domain}.{service} unreachable")).into());
        }
        inner.calls.push(ServiceCallRecord {
            domain: domain.to_string(),
            service: service.to_string(),
            data,
        });
        Ok(())
    }

    fn run_in(&self, delay: Duration, timer: AppTimer) -> TimerHandle {
        self.schedule(delay, None, timer)
    }

    fn run_every(&self, start: Duration, interval: Duration, timer: AppTimer) -> TimerHandle {
        self.schedule(start, Some(interval), timer)
    }

    fn run_daily(&self, at: NaiveTime, timer: AppTimer) -> TimerHandle {
        let delay = until_next(at, self.now());
        self.schedule(delay, Some(Duration::from_secs(24 * 60 * 60)), timer)
    }

    fn cancel_timer(&self, handle: TimerHandle) {
        self.inner
            .lock()
            .unwrap()
            .timers
            .retain(|t| t.handle != handle);
    }
}
