//! Notification delivery with per-person briefings
//!
//! A notification is addressed with a comma separated target expression over
//! person names and the keywords `everyone` (house channel plus every person)
//! and `home` (house channel only).
//!
//! `Emergency` notifications go to every resolved channel. `Home`
//! notifications go only to persons that are present while sleep mode is
//! off; every person target that cannot be reached gets the notification
//! queued in its [`BriefingList`], keyed by title, and receives it on arrival
//! or when sleep mode turns off.

use crate::error::AppResult;
use crate::hass::{AppTimer, Hass};
use crate::presence::{PresenceChange, PresenceView};
use ha_config::AppsConfig;
use ha_core::events::StateChangedData;
use ha_core::{EntityId, STATE_OFF};
use ha_scheduler::TimerHandle;
use ha_state_store::StateFilter;
use indexmap::IndexMap;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Delay before the single delivery attempt of a `Single` notification
pub const SINGLE_DELAY: Duration = Duration::from_secs(1);

/// Repeat interval when none is given
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(3600);

const EVERYONE: &str = "everyone";
const HOME: &str = "home";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// One delivery attempt shortly after `notify`
    Single,
    /// Delivered immediately and then every interval until canceled
    Repeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    /// Always delivered, never queued
    Emergency,
    /// Delivered to present persons outside sleep mode, queued otherwise
    Home,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NotificationId(u64);

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "notification#{}", self.0)
    }
}

/// Returned by [`NotificationDispatcher::notify`]; pass it to
/// [`NotificationDispatcher::cancel`] to stop the notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[must_use]
pub struct CancelHandle(NotificationId);

impl CancelHandle {
    pub fn id(&self) -> NotificationId {
        self.0
    }
}

/// A notification request
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub level: NotificationLevel,
    pub title: String,
    pub message: String,
    pub targets: String,
    pub interval: Duration,
    pub data: Value,
}

impl Notification {
    pub fn new(
        kind: NotificationKind,
        level: NotificationLevel,
        title: impl Into<String>,
        message: impl Into<String>,
        targets: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            level,
            title: title.into(),
            message: message.into(),
            targets: targets.into(),
            interval: DEFAULT_INTERVAL,
            data: json!({}),
        }
    }

    /// Repeat interval of a `Repeat` notification
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Extra data handed to the channel, e.g. push notification actions
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    fn payload(&self) -> Value {
        json!({
            "title": self.title,
            "message": self.message,
            "data": self.data,
        })
    }
}

/// A resolved notification target
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    House,
    Person(String),
}

/// A queued notification waiting for its recipient
#[derive(Debug, Clone, PartialEq)]
pub struct BriefingItem {
    pub title: String,
    pub message: String,
    pub data: Value,
}

impl From<&Notification> for BriefingItem {
    fn from(notification: &Notification) -> Self {
        Self {
            title: notification.title.clone(),
            message: notification.message.clone(),
            data: notification.data.clone(),
        }
    }
}

/// Queued notifications per person, keyed by title
///
/// A person without pending items has no entry.
#[derive(Debug, Clone, Default)]
pub struct BriefingList {
    items: IndexMap<String, IndexMap<String, BriefingItem>>,
}

impl BriefingList {
    /// Queue an item, replacing an older item with the same title
    pub fn add(&mut self, person: &str, item: BriefingItem) {
        self.items
            .entry(person.to_string())
            .or_default()
            .insert(item.title.clone(), item);
    }

    pub fn get(&self, person: &str, title: &str) -> Option<&BriefingItem> {
        self.items.get(person).and_then(|items| items.get(title))
    }

    pub fn remove(&mut self, person: &str, title: &str) -> Option<BriefingItem> {
        let items = self.items.get_mut(person)?;
        let removed = items.shift_remove(title);
        if items.is_empty() {
            self.items.shift_remove(person);
        }
        removed
    }

    /// Remove the title from every person
    pub fn remove_title(&mut self, title: &str) -> usize {
        let mut removed = 0;
        self.items.retain(|_, items| {
            if items.shift_remove(title).is_some() {
                removed += 1;
            }
            !items.is_empty()
        });
        removed
    }

    /// Take every item queued for the person
    pub fn take(&mut self, person: &str) -> Vec<BriefingItem> {
        self.items
            .shift_remove(person)
            .map(|items| items.into_values().collect())
            .unwrap_or_default()
    }

    pub fn pending(&self, person: &str) -> usize {
        self.items.get(person).map_or(0, IndexMap::len)
    }

    pub fn contains_person(&self, person: &str) -> bool {
        self.items.contains_key(person)
    }

    /// Whether any person has an item with this title
    pub fn contains_title(&self, title: &str) -> bool {
        self.items.values().any(|items| items.contains_key(title))
    }

    /// Persons with pending items
    pub fn persons(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug)]
struct Scheduled {
    notification: Notification,
    timer: TimerHandle,
}

/// Delivers notifications and keeps the briefings of unreachable persons
#[derive(Debug)]
pub struct NotificationDispatcher {
    /// Notification channel per person, in configuration order
    notifiers: IndexMap<String, Option<EntityId>>,
    house_notifier: Option<EntityId>,
    sleep_mode: Option<EntityId>,
    sleep_mode_off: Option<StateFilter>,
    scheduled: HashMap<NotificationId, Scheduled>,
    /// Titles of delivered single notifications whose briefings are still queued
    delivered: HashMap<NotificationId, String>,
    briefings: BriefingList,
    next_id: u64,
}

impl NotificationDispatcher {
    pub fn new(config: &AppsConfig) -> Self {
        let sleep_mode = config.sleep_mode().cloned();
        Self {
            notifiers: config
                .persons
                .iter()
                .map(|(name, person)| (name.clone(), person.notifier.clone()))
                .collect(),
            house_notifier: config.house.notifier.clone(),
            sleep_mode_off: sleep_mode
                .clone()
                .map(|entity| StateFilter::entity(entity).new_value(STATE_OFF)),
            sleep_mode,
            scheduled: HashMap::new(),
            delivered: HashMap::new(),
            briefings: BriefingList::default(),
            next_id: 1,
        }
    }

    /// Schedule a notification and return the handle that cancels it
    #[instrument(skip_all, fields(title = %notification.title, targets = %notification.targets))]
    pub fn notify(
        &mut self,
        hass: &dyn Hass,
        presence: &dyn PresenceView,
        mut notification: Notification,
    ) -> CancelHandle {
        let id = NotificationId(self.next_id);
        self.next_id += 1;

        if notification.kind == NotificationKind::Repeat && notification.interval.is_zero() {
            warn!(%id, "Repeat notification without interval, using {:?}", DEFAULT_INTERVAL);
            notification.interval = DEFAULT_INTERVAL;
        }

        if notification.level == NotificationLevel::Home {
            self.queue_unreachable(hass, presence, &notification);
        }

        let timer = match notification.kind {
            NotificationKind::Single => hass.run_in(SINGLE_DELAY, AppTimer::Notification(id)),
            NotificationKind::Repeat => hass.run_every(
                Duration::ZERO,
                notification.interval,
                AppTimer::Notification(id),
            ),
        };
        info!(%id, kind = ?notification.kind, level = ?notification.level, %timer, "Notification scheduled");

        self.scheduled.insert(
            id,
            Scheduled {
                notification,
                timer,
            },
        );
        CancelHandle(id)
    }

    /// Stop a notification and drop its queued briefings
    ///
    /// A single notification that already fired has no timer left, but its
    /// briefings are still withdrawn. Canceling twice does nothing.
    pub fn cancel(&mut self, hass: &dyn Hass, handle: CancelHandle) {
        let title = match self.scheduled.remove(&handle.0) {
            Some(scheduled) => {
                hass.cancel_timer(scheduled.timer);
                scheduled.notification.title
            }
            None => match self.delivered.remove(&handle.0) {
                Some(title) => title,
                None => {
                    debug!(id = %handle.0, "Cancel of inactive notification ignored");
                    return;
                }
            },
        };
        let removed = self.briefings.remove_title(&title);
        info!(id = %handle.0, %title, briefings_removed = removed, "Notification canceled");
    }

    /// Deliver a scheduled notification whose timer fired
    pub fn on_timer(
        &mut self,
        hass: &dyn Hass,
        presence: &dyn PresenceView,
        id: NotificationId,
    ) -> AppResult<()> {
        let Some(scheduled) = self.scheduled.get(&id) else {
            debug!(%id, "Timer of unknown notification ignored");
            return Ok(());
        };
        let notification = scheduled.notification.clone();
        if notification.kind == NotificationKind::Repeat {
            return self.send(hass, presence, &notification);
        }

        self.scheduled.remove(&id);
        let result = self.send(hass, presence, &notification);
        let briefings = &self.briefings;
        self.delivered.retain(|_, title| briefings.contains_title(title));
        if briefings.contains_title(&notification.title) {
            self.delivered.insert(id, notification.title);
        }
        result
    }

    /// Deliver to every available channel of the notification's targets
    ///
    /// Every channel is attempted; the first failure is returned.
    pub fn send(
        &mut self,
        hass: &dyn Hass,
        presence: &dyn PresenceView,
        notification: &Notification,
    ) -> AppResult<()> {
        if notification.level == NotificationLevel::Home {
            self.queue_unreachable(hass, presence, notification);
        }

        let mut result = Ok(());
        for (target, channel) in self.get_targets(hass, presence, &notification.targets, notification.level) {
            match hass.call_service("notify", channel.object_id(), notification.payload()) {
                Ok(()) => {
                    info!(title = %notification.title, %channel, "Notification sent");
                    if let Target::Person(person) = &target {
                        self.briefings.remove(person, &notification.title);
                    }
                }
                Err(err) => {
                    error!(title = %notification.title, %channel, %err, "Notification delivery failed");
                    if result.is_ok() {
                        result = Err(err);
                    }
                }
            }
        }
        result
    }

    /// Expand a target expression into the channels to deliver to
    ///
    /// Below `Emergency`, targets that are not available are left out.
    pub fn get_targets(
        &self,
        hass: &dyn Hass,
        presence: &dyn PresenceView,
        targets: &str,
        level: NotificationLevel,
    ) -> Vec<(Target, EntityId)> {
        self.resolve(targets)
            .into_iter()
            .filter(|target| {
                level == NotificationLevel::Emergency
                    || self.target_available(hass, presence, target)
            })
            .filter_map(|target| match self.channel(&target) {
                Some(channel) => Some((target, channel.clone())),
                None => {
                    warn!(destination = ?target, "No notification channel configured");
                    None
                }
            })
            .collect()
    }

    /// Resolve keywords and names into targets, without duplicates
    pub fn resolve(&self, targets: &str) -> Vec<Target> {
        let mut resolved = Vec::new();
        let mut push = |target: Target| {
            if !resolved.contains(&target) {
                resolved.push(target);
            }
        };

        for name in targets.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match name {
                EVERYONE => {
                    push(Target::House);
                    for person in self.notifiers.keys() {
                        push(Target::Person(person.clone()));
                    }
                }
                HOME => push(Target::House),
                person if self.notifiers.contains_key(person) => {
                    push(Target::Person(person.to_string()))
                }
                unknown => warn!(name = unknown, "Unknown notification target"),
            }
        }
        resolved
    }

    /// Present and not suppressed; the house channel only needs the latter
    pub fn target_available(&self, hass: &dyn Hass, presence: &dyn PresenceView, target: &Target) -> bool {
        let present = match target {
            Target::House => true,
            Target::Person(person) => presence.is_present(person),
        };
        present && !self.suppressed(hass)
    }

    /// Sleep mode blocks non-emergency delivery; an unreadable switch counts as on
    pub fn suppressed(&self, hass: &dyn Hass) -> bool {
        self.sleep_mode
            .as_ref()
            .map_or(false, |entity| !hass.get_state(entity).is(STATE_OFF))
    }

    fn channel(&self, target: &Target) -> Option<&EntityId> {
        match target {
            Target::House => self.house_notifier.as_ref(),
            Target::Person(person) => self.notifiers.get(person).and_then(Option::as_ref),
        }
    }

    fn queue_unreachable(&mut self, hass: &dyn Hass, presence: &dyn PresenceView, notification: &Notification) {
        for target in self.resolve(&notification.targets) {
            let Target::Person(person) = &target else {
                continue;
            };
            if self.target_available(hass, presence, &target) {
                continue;
            }
            if self.channel(&target).is_none() {
                warn!(person = %person, "Cannot queue briefing without a notification channel");
                continue;
            }
            debug!(person = %person, title = %notification.title, "Queued for briefing");
            self.briefings.add(person, BriefingItem::from(notification));
        }
    }

    /// Deliver and clear everything queued for the person
    #[instrument(skip(self, hass))]
    pub fn send_briefing(&mut self, hass: &dyn Hass, person: &str) -> AppResult<()> {
        if !self.briefings.contains_person(person) {
            return Ok(());
        }
        let Some(channel) = self.notifiers.get(person).and_then(Option::as_ref) else {
            warn!(person, "No notification channel for briefing");
            return Ok(());
        };
        let items = self.briefings.take(person);

        let mut result = Ok(());
        for item in &items {
            let data = json!({
                "title": item.title,
                "message": item.message,
                "data": item.data,
            });
            if let Err(err) = hass.call_service("notify", channel.object_id(), data) {
                error!(person, title = %item.title, %err, "Briefing delivery failed");
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        info!(person, items = items.len(), "Briefing sent");
        result
    }

    /// Flush the briefing of a person who just arrived
    pub fn on_presence_change(&mut self, hass: &dyn Hass, change: &PresenceChange) -> AppResult<()> {
        if change.is_arrival() && !self.suppressed(hass) {
            self.send_briefing(hass, &change.person)?;
        }
        Ok(())
    }

    /// Flush every present person's briefing once sleep mode turns off
    pub fn on_state_changed(
        &mut self,
        hass: &dyn Hass,
        presence: &dyn PresenceView,
        change: &StateChangedData,
    ) -> AppResult<()> {
        if !self
            .sleep_mode_off
            .as_ref()
            .map_or(false, |filter| filter.matches(change))
        {
            return Ok(());
        }
        info!("Sleep mode off, sending briefings");
        let persons: Vec<String> = self
            .briefings
            .persons()
            .filter(|person| presence.is_present(person))
            .map(str::to_string)
            .collect();
        let mut result = Ok(());
        for person in persons {
            if let Err(err) = self.send_briefing(hass, &person) {
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }

    pub fn briefings(&self) -> &BriefingList {
        &self.briefings
    }

    pub fn is_scheduled(&self, handle: CancelHandle) -> bool {
        self.scheduled.contains_key(&handle.0)
    }
}
