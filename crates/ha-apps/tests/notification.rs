mod common;

use common::*;
use ha_apps::{
    AppError, AppManager, Notification, NotificationKind, NotificationLevel, Target,
};
use std::time::Duration;

fn single(level: NotificationLevel, title: &str, targets: &str) -> Notification {
    Notification::new(NotificationKind::Single, level, title, format!("{title}!"), targets)
}

fn repeat(title: &str, targets: &str, interval: Duration) -> Notification {
    Notification::new(
        NotificationKind::Repeat,
        NotificationLevel::Home,
        title,
        format!("{title}!"),
        targets,
    )
    .with_interval(interval)
}

/// Dimitri is away, Sabrina is home, sleep mode is off
fn dimitri_away() -> (FakeHass, AppManager) {
    let hass = everyone_home();
    hass.set("sensor.dimitri", "not_home");
    let apps = manager(&hass);
    (hass, apps)
}

#[test]
fn test_emergency_bypasses_briefing() {
    let (hass, mut apps) = dimitri_away();
    hass.set("input_boolean.sleep_mode", "on");

    let _handle = apps.notify(&hass, single(NotificationLevel::Emergency, "Water leak", "Dimitri"));
    assert!(apps.notifications().briefings().is_empty());

    hass.advance(&mut apps, Duration::from_secs(1)).unwrap();
    assert_eq!(hass.notified("dimitri_handy"), vec!["Water leak"]);
    assert!(apps.notifications().briefings().is_empty());
}

#[test]
fn test_single_waits_one_second() {
    let hass = everyone_home();
    let mut apps = manager(&hass);

    let _handle = apps.notify(&hass, single(NotificationLevel::Home, "Washer done", "Dimitri"));
    hass.advance(&mut apps, Duration::from_millis(900)).unwrap();
    assert!(hass.notified("dimitri_handy").is_empty());

    hass.advance(&mut apps, Duration::from_millis(100)).unwrap();
    assert_eq!(hass.notified("dimitri_handy"), vec!["Washer done"]);

    hass.advance(&mut apps, hours(1)).unwrap();
    assert_eq!(hass.notified("dimitri_handy").len(), 1);
}

#[test]
fn test_home_level_to_absent_person_is_queued() {
    let (hass, mut apps) = dimitri_away();

    let _handle = apps.notify(&hass, single(NotificationLevel::Home, "T", "Dimitri"));
    let briefings = apps.notifications().briefings();
    assert_eq!(briefings.get("Dimitri", "T").map(|i| i.message.as_str()), Some("T!"));
    assert!(hass.notified("dimitri_handy").is_empty());

    hass.advance(&mut apps, Duration::from_secs(1)).unwrap();
    assert!(hass.notified("dimitri_handy").is_empty());
    assert_eq!(apps.notifications().briefings().pending("Dimitri"), 1);
}

#[test]
fn test_briefing_flushed_on_arrival() {
    let (hass, mut apps) = dimitri_away();
    let _handle = apps.notify(&hass, single(NotificationLevel::Home, "T", "Dimitri"));
    hass.advance(&mut apps, Duration::from_secs(1)).unwrap();

    hass.change(&mut apps, "sensor.dimitri", "home").unwrap();
    assert_eq!(hass.notified("dimitri_handy"), vec!["T"]);
    assert!(!apps.notifications().briefings().contains_person("Dimitri"));
}

#[test]
fn test_return_within_debounce_flushes_briefing() {
    let hass = everyone_home();
    let mut apps = manager(&hass);
    hass.change(&mut apps, "sensor.dimitri", "not_home").unwrap();

    let _handle = apps.notify(&hass, single(NotificationLevel::Home, "T", "Dimitri"));
    hass.advance(&mut apps, minutes(2)).unwrap();
    assert_eq!(apps.notifications().briefings().pending("Dimitri"), 1);

    // just_left -> home collapse counts as an arrival
    hass.change(&mut apps, "sensor.dimitri", "home").unwrap();
    assert_eq!(hass.notified("dimitri_handy"), vec!["T"]);
    assert!(apps.notifications().briefings().is_empty());
}

#[test]
fn test_cancel_stops_repeats_and_removes_briefings() {
    let (hass, mut apps) = dimitri_away();

    let handle = apps.notify(&hass, repeat("Bin full", "Dimitri,Sabrina", minutes(10)));
    hass.advance(&mut apps, Duration::ZERO).unwrap();
    assert_eq!(hass.notified("sabrina_handy"), vec!["Bin full"]);
    assert_eq!(apps.notifications().briefings().pending("Dimitri"), 1);

    hass.advance(&mut apps, minutes(10)).unwrap();
    assert_eq!(hass.notified("sabrina_handy").len(), 2);

    apps.cancel(&hass, handle);
    assert!(!apps.notifications().is_scheduled(handle));
    assert!(apps.notifications().briefings().is_empty());

    hass.advance(&mut apps, hours(2)).unwrap();
    assert_eq!(hass.notified("sabrina_handy").len(), 2);

    // canceling again is a no-op
    apps.cancel(&hass, handle);
    hass.change(&mut apps, "sensor.dimitri", "home").unwrap();
    assert!(hass.notified("dimitri_handy").is_empty());
}

#[test]
fn test_repeat_reaches_person_after_arrival() {
    let (hass, mut apps) = dimitri_away();

    let _handle = apps.notify(&hass, repeat("Bin full", "Dimitri", minutes(30)));
    hass.advance(&mut apps, minutes(10)).unwrap();
    assert!(hass.notified("dimitri_handy").is_empty());

    hass.change(&mut apps, "sensor.dimitri", "home").unwrap();
    assert_eq!(hass.notified("dimitri_handy"), vec!["Bin full"]);

    hass.advance(&mut apps, minutes(20)).unwrap();
    assert_eq!(hass.notified("dimitri_handy"), vec!["Bin full", "Bin full"]);
    assert!(apps.notifications().briefings().is_empty());
}

#[test]
fn test_sleep_mode_suppresses_and_flushes_on_off() {
    let hass = everyone_home();
    hass.set("input_boolean.sleep_mode", "on");
    let mut apps = manager(&hass);

    let _handle = apps.notify(&hass, single(NotificationLevel::Home, "Washer done", "everyone"));
    hass.advance(&mut apps, Duration::from_secs(1)).unwrap();
    assert!(hass.notified("house").is_empty());
    assert!(hass.notified("dimitri_handy").is_empty());
    assert_eq!(apps.notifications().briefings().pending("Dimitri"), 1);
    assert_eq!(apps.notifications().briefings().pending("Sabrina"), 1);

    hass.change(&mut apps, "input_boolean.sleep_mode", "off").unwrap();
    assert_eq!(hass.notified("dimitri_handy"), vec!["Washer done"]);
    assert_eq!(hass.notified("sabrina_handy"), vec!["Washer done"]);
    assert!(hass.notified("house").is_empty());
    assert!(apps.notifications().briefings().is_empty());
}

#[test]
fn test_sleep_mode_off_skips_absent_persons() {
    let (hass, mut apps) = dimitri_away();
    hass.set("input_boolean.sleep_mode", "on");

    let _handle = apps.notify(&hass, single(NotificationLevel::Home, "Washer done", "Dimitri,Sabrina"));
    hass.advance(&mut apps, Duration::from_secs(1)).unwrap();

    hass.change(&mut apps, "input_boolean.sleep_mode", "off").unwrap();
    assert_eq!(hass.notified("sabrina_handy"), vec!["Washer done"]);
    assert!(hass.notified("dimitri_handy").is_empty());
    assert_eq!(apps.notifications().briefings().pending("Dimitri"), 1);
}

#[test]
fn test_arrival_during_sleep_mode_keeps_briefing() {
    let (hass, mut apps) = dimitri_away();
    let _handle = apps.notify(&hass, single(NotificationLevel::Home, "T", "Dimitri"));
    hass.advance(&mut apps, Duration::from_secs(1)).unwrap();

    hass.set("input_boolean.sleep_mode", "on");
    hass.change(&mut apps, "sensor.dimitri", "home").unwrap();
    assert!(hass.notified("dimitri_handy").is_empty());

    hass.change(&mut apps, "input_boolean.sleep_mode", "off").unwrap();
    assert_eq!(hass.notified("dimitri_handy"), vec!["T"]);
}

#[test]
fn test_unreadable_sleep_mode_suppresses() {
    let hass = everyone_home();
    hass.set("input_boolean.sleep_mode", "unavailable");
    let mut apps = manager(&hass);

    let _handle = apps.notify(&hass, single(NotificationLevel::Home, "T", "Sabrina"));
    hass.advance(&mut apps, Duration::from_secs(1)).unwrap();
    assert!(hass.notified("sabrina_handy").is_empty());
    assert_eq!(apps.notifications().briefings().pending("Sabrina"), 1);
}

#[test]
fn test_briefing_keyed_by_title() {
    let (hass, mut apps) = dimitri_away();

    let _a = apps.notify(&hass, single(NotificationLevel::Home, "Bin full", "Dimitri"));
    let _b = apps.notify(&hass, single(NotificationLevel::Home, "Washer done", "Dimitri"));
    let _c = apps.notify(
        &hass,
        Notification::new(
            NotificationKind::Single,
            NotificationLevel::Home,
            "Bin full",
            "Still full",
            "Dimitri",
        ),
    );

    let briefings = apps.notifications().briefings();
    assert_eq!(briefings.pending("Dimitri"), 2);
    assert_eq!(
        briefings.get("Dimitri", "Bin full").map(|i| i.message.as_str()),
        Some("Still full")
    );
}

#[test]
fn test_delivery_removes_stale_briefing_of_same_title() {
    let (hass, mut apps) = dimitri_away();

    let _queued = apps.notify(&hass, single(NotificationLevel::Home, "Bin full", "Dimitri"));
    let _other = apps.notify(&hass, single(NotificationLevel::Home, "Plants", "Dimitri"));
    let _urgent = apps.notify(&hass, single(NotificationLevel::Emergency, "Bin full", "Dimitri"));
    hass.advance(&mut apps, Duration::from_secs(1)).unwrap();

    assert_eq!(hass.notified("dimitri_handy"), vec!["Bin full"]);
    let briefings = apps.notifications().briefings();
    assert!(briefings.get("Dimitri", "Bin full").is_none());
    assert!(briefings.get("Dimitri", "Plants").is_some());
}

#[test]
fn test_target_resolution() {
    let hass = everyone_home();
    let apps = manager(&hass);
    let dispatcher = apps.notifications();

    assert_eq!(dispatcher.resolve("home"), vec![Target::House]);
    assert_eq!(
        dispatcher.resolve("everyone"),
        vec![
            Target::House,
            Target::Person("Dimitri".into()),
            Target::Person("Sabrina".into()),
        ]
    );
    assert_eq!(
        dispatcher.resolve("Sabrina, Nobody,Sabrina ,home"),
        vec![Target::Person("Sabrina".into()), Target::House]
    );
    assert!(dispatcher.resolve("").is_empty());
}

#[test]
fn test_get_targets_filters_by_level() {
    let (hass, apps) = dimitri_away();
    let dispatcher = apps.notifications();

    let channels = |level| -> Vec<String> {
        dispatcher
            .get_targets(&hass, apps.presence(), "everyone", level)
            .into_iter()
            .map(|(_, channel)| channel.to_string())
            .collect()
    };

    assert_eq!(
        channels(NotificationLevel::Emergency),
        vec!["notify.house", "notify.dimitri_handy", "notify.sabrina_handy"]
    );
    assert_eq!(
        channels(NotificationLevel::Home),
        vec!["notify.house", "notify.sabrina_handy"]
    );
}

#[test]
fn test_delivery_error_is_returned() {
    let hass = everyone_home();
    let mut apps = manager(&hass);
    hass.fail_service("notify", "dimitri_handy");

    let _handle = apps.notify(&hass, single(NotificationLevel::Emergency, "Alarm", "Dimitri,Sabrina"));
    let result = hass.advance(&mut apps, Duration::from_secs(1));

    assert!(matches!(result, Err(AppError::Service(_))));
    assert_eq!(hass.notified("sabrina_handy"), vec!["Alarm"]);
}

#[test]
fn test_cancel_after_single_fired_withdraws_briefing() {
    let (hass, mut apps) = dimitri_away();

    let handle = apps.notify(&hass, single(NotificationLevel::Home, "Bin full", "Dimitri"));
    hass.advance(&mut apps, Duration::from_secs(2)).unwrap();
    assert!(!apps.notifications().is_scheduled(handle));
    assert_eq!(apps.notifications().briefings().pending("Dimitri"), 1);

    apps.cancel(&hass, handle);
    assert_eq!(apps.notifications().briefings().pending("Dimitri"), 0);

    hass.change(&mut apps, "sensor.dimitri", "home").unwrap();
    assert!(hass.notified("dimitri_handy").is_empty());
}

#[test]
fn test_cancel_after_delivery_keeps_other_briefings() {
    let (hass, mut apps) = dimitri_away();

    let delivered = apps.notify(&hass, single(NotificationLevel::Home, "Washer done", "Sabrina"));
    let _queued = apps.notify(&hass, single(NotificationLevel::Home, "Plants", "Dimitri"));
    hass.advance(&mut apps, Duration::from_secs(1)).unwrap();
    assert_eq!(hass.notified("sabrina_handy"), vec!["Washer done"]);

    apps.cancel(&hass, delivered);
    apps.cancel(&hass, delivered);
    assert_eq!(apps.notifications().briefings().pending("Dimitri"), 1);
}

#[test]
fn test_repeat_without_interval_uses_default() {
    let hass = everyone_home();
    let mut apps = manager(&hass);

    let _handle = apps.notify(&hass, repeat("Bin full", "Sabrina", Duration::ZERO));
    hass.advance(&mut apps, Duration::ZERO).unwrap();
    assert_eq!(hass.notified("sabrina_handy").len(), 1);

    hass.advance(&mut apps, minutes(59)).unwrap();
    assert_eq!(hass.notified("sabrina_handy").len(), 1);

    hass.advance(&mut apps, minutes(1)).unwrap();
    assert_eq!(hass.notified("sabrina_handy").len(), 2);
}
