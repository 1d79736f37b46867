//! Publish/subscribe across objects

use gobj::{
    EventAction, EventFlags, GClassBuilder, GMethods, GobjId, Json, Runtime, Subscription,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn ac_record(rt: &mut Runtime, gobj: GobjId, event: &str, kw: Json, _src: Option<GobjId>) -> i32 {
    let _ = rt.incr_stat(gobj, event, 1);
    let _ = rt.write_user_data(gobj, "last", kw);
    0
}

fn ac_refuse(_rt: &mut Runtime, _gobj: GobjId, _event: &str, _kw: Json, _src: Option<GobjId>) -> i32 {
    -1
}

#[derive(Default)]
struct PublisherHooks {
    added: Arc<AtomicUsize>,
    deleted: Arc<AtomicUsize>,
}

impl GMethods for PublisherHooks {
    fn mt_subscription_added(&self, _rt: &mut Runtime, _gobj: GobjId, subs: &Subscription) -> i32 {
        self.added.fetch_add(1, Ordering::SeqCst);
        if subs.event.as_deref() == Some("EV_SECRET") {
            return -1;
        }
        0
    }

    fn mt_subscription_deleted(&self, _rt: &mut Runtime, _gobj: GobjId, _subs: &Subscription) {
        self.deleted.fetch_add(1, Ordering::SeqCst);
    }
}

struct Fixture {
    rt: Runtime,
    publisher: GobjId,
    a: GobjId,
    b: GobjId,
    added: Arc<AtomicUsize>,
    deleted: Arc<AtomicUsize>,
}

fn fixture() -> Fixture {
    let hooks = PublisherHooks::default();
    let added = hooks.added.clone();
    let deleted = hooks.deleted.clone();

    let mut rt = Runtime::with_defaults();
    rt.register_gclass(GClassBuilder::new("C_YUNO").state("ST_IDLE", vec![]))
        .unwrap();
    rt.register_gclass(
        GClassBuilder::new("C_SENSOR")
            .state("ST_IDLE", vec![])
            .event_type("EV_READING", EventFlags::OUTPUT)
            .event_type("EV_ALARM", EventFlags::OUTPUT | EventFlags::NO_WARN_SUBS)
            .event_type("EV_SECRET", EventFlags::OUTPUT)
            .methods(hooks),
    )
    .unwrap();
    rt.register_gclass(
        GClassBuilder::new("C_LISTENER")
            .state(
                "ST_IDLE",
                vec![
                    EventAction::new("EV_READING", ac_record, None),
                    EventAction::new("EV_ALARM", ac_record, None),
                    EventAction::new("EV_SAMPLE", ac_record, None),
                ],
            ),
    )
    .unwrap();
    rt.register_gclass(
        GClassBuilder::new("C_GATE").state(
            "ST_IDLE",
            vec![
                EventAction::new("EV_READING", ac_refuse, None),
                EventAction::new("EV_ALARM", ac_refuse, None),
            ],
        ),
    )
    .unwrap();

    let yuno = rt.create_yuno("yuno", "C_YUNO", json!({})).unwrap();
    let publisher = rt.create_child("sensor", "C_SENSOR", json!({}), yuno).unwrap();
    let a = rt.create_child("a", "C_LISTENER", json!({}), yuno).unwrap();
    let b = rt.create_child("b", "C_LISTENER", json!({}), yuno).unwrap();
    Fixture {
        rt,
        publisher,
        a,
        b,
        added,
        deleted,
    }
}

#[test]
fn test_publish_reaches_subscribers() {
    let Fixture {
        mut rt, publisher, a, b, ..
    } = fixture();
    rt.subscribe_event(publisher, Some("EV_READING"), json!({}), a).unwrap();
    rt.subscribe_event(publisher, None, json!({}), b).unwrap();

    let sent = rt
        .publish_event(publisher, "EV_READING", json!({"value": 21}))
        .unwrap();
    assert_eq!(sent, 2);
    assert_eq!(rt.read_user_data(a, "last"), Some(&json!({"value": 21})));
    assert_eq!(rt.read_stat(b, "EV_READING"), Some(&json!(1)));

    assert_eq!(rt.publish_event(publisher, "EV_ALARM", json!({})).unwrap(), 1);
    assert_eq!(rt.read_stat(a, "EV_ALARM"), None);
    assert_eq!(rt.read_stat(b, "EV_ALARM"), Some(&json!(1)));
}

#[test]
fn test_publish_requires_output_event() {
    let Fixture {
        mut rt, publisher, a, ..
    } = fixture();
    assert!(rt.subscribe_event(publisher, Some("EV_SAMPLE"), json!({}), a).is_err());
    assert!(rt.publish_event(publisher, "EV_SAMPLE", json!({})).is_err());
    assert_eq!(rt.publish_event(publisher, "EV_READING", json!({})).unwrap(), 0);
}

#[test]
fn test_kw_shaping_and_rename() {
    let Fixture {
        mut rt, publisher, a, ..
    } = fixture();
    rt.subscribe_event(
        publisher,
        Some("EV_READING"),
        json!({
            "__config__": {"__rename_event_name__": "EV_SAMPLE"},
            "__global__": {"site": "north"},
            "__local__": {"raw": null},
        }),
        a,
    )
    .unwrap();

    rt.publish_event(publisher, "EV_READING", json!({"value": 3, "raw": "0x03"}))
        .unwrap();
    assert_eq!(rt.read_stat(a, "EV_SAMPLE"), Some(&json!(1)));
    assert_eq!(rt.read_stat(a, "EV_READING"), None);
    assert_eq!(
        rt.read_user_data(a, "last"),
        Some(&json!({"value": 3, "site": "north"}))
    );
}

#[test]
fn test_repeated_subscription_is_replaced() {
    let Fixture {
        mut rt,
        publisher,
        a,
        added,
        deleted,
        ..
    } = fixture();
    let first = rt.subscribe_event(publisher, Some("EV_READING"), json!({}), a).unwrap();
    let second = rt.subscribe_event(publisher, Some("EV_READING"), json!({}), a).unwrap();
    assert_ne!(first, second);
    assert!(rt.subscription(first).is_none());
    assert_eq!(
        rt.find_subscriptions(publisher, Some("EV_READING"), &json!({}), Some(a)),
        vec![second]
    );
    assert_eq!(added.load(Ordering::SeqCst), 2);
    assert_eq!(deleted.load(Ordering::SeqCst), 1);

    assert_eq!(rt.publish_event(publisher, "EV_READING", json!({})).unwrap(), 1);
}

#[test]
fn test_refused_subscription() {
    let Fixture {
        mut rt, publisher, a, ..
    } = fixture();
    assert!(rt.subscribe_event(publisher, Some("EV_SECRET"), json!({}), a).is_err());
    assert!(rt
        .find_subscribings(a, None, &json!({}), Some(publisher))
        .is_empty());
}

#[test]
fn test_hard_subscription_survives_unsubscribe() {
    let Fixture {
        mut rt, publisher, a, b, ..
    } = fixture();
    let hard_kw = json!({"__config__": {"__hard_subscription__": true}});
    let hard = rt
        .subscribe_event(publisher, Some("EV_READING"), hard_kw.clone(), a)
        .unwrap();
    rt.subscribe_event(publisher, Some("EV_READING"), json!({}), b).unwrap();

    assert_eq!(rt.unsubscribe_event(publisher, Some("EV_READING"), &hard_kw, a).unwrap(), 0);
    assert!(rt.subscription(hard).is_some());
    assert_eq!(rt.unsubscribe_event(publisher, Some("EV_READING"), &json!({}), b).unwrap(), 1);

    assert_eq!(rt.unsubscribe_list(&[hard], true), 1);
    assert!(rt.find_subscriptions(publisher, None, &json!({}), None).is_empty());
}

#[test]
fn test_destroy_drops_subscriptions_both_ways() {
    let Fixture {
        mut rt, publisher, a, b, ..
    } = fixture();
    rt.subscribe_event(
        publisher,
        Some("EV_READING"),
        json!({"__config__": {"__hard_subscription__": true}}),
        a,
    )
    .unwrap();
    rt.subscribe_event(publisher, Some("EV_ALARM"), json!({}), b).unwrap();

    rt.destroy(a).unwrap();
    assert_eq!(rt.find_subscriptions(publisher, None, &json!({}), None).len(), 1);

    rt.destroy(publisher).unwrap();
    assert!(rt.find_subscribings(b, None, &json!({}), None).is_empty());
    assert_eq!(rt.stats_summary().subscriptions, 0);
}

#[test]
fn test_own_event_refusal_stops_broadcast() {
    let Fixture {
        mut rt, publisher, a, ..
    } = fixture();
    let yuno = rt.yuno().unwrap();
    let gate = rt.create_child("gate", "C_GATE", json!({}), yuno).unwrap();

    rt.subscribe_event(
        publisher,
        Some("EV_READING"),
        json!({"__config__": {"__own_event__": true}}),
        gate,
    )
    .unwrap();
    rt.subscribe_event(publisher, Some("EV_READING"), json!({}), a).unwrap();

    assert_eq!(rt.publish_event(publisher, "EV_READING", json!({})).unwrap(), 0);
    assert_eq!(rt.read_stat(a, "EV_READING"), None);
}

#[test]
fn test_state_changes_are_published() {
    let mut rt = Runtime::with_defaults();
    rt.register_gclass(GClassBuilder::new("C_YUNO").state("ST_IDLE", vec![]))
        .unwrap();
    rt.register_gclass(
        GClassBuilder::new("C_DOOR")
            .state("ST_CLOSED", vec![EventAction::without_action("EV_OPEN", Some("ST_OPEN"))])
            .state("ST_OPEN", vec![]),
    )
    .unwrap();
    rt.register_gclass(GClassBuilder::new("C_WATCHER").state(
        "ST_IDLE",
        vec![EventAction::new("EV_STATE_CHANGED", ac_record, None)],
    ))
    .unwrap();
    rt.register_gclass(GClassBuilder::new("C_DEAF").state("ST_IDLE", vec![]))
        .unwrap();

    let yuno = rt.create_yuno("yuno", "C_YUNO", json!({})).unwrap();
    let door = rt.create_child("door", "C_DOOR", json!({}), yuno).unwrap();
    let watcher = rt.create_child("watcher", "C_WATCHER", json!({}), yuno).unwrap();
    let deaf = rt.create_child("deaf", "C_DEAF", json!({}), yuno).unwrap();
    rt.subscribe_event(door, Some("EV_STATE_CHANGED"), json!({}), watcher).unwrap();
    rt.subscribe_event(door, Some("EV_STATE_CHANGED"), json!({}), deaf).unwrap();

    rt.send_event(door, "EV_OPEN", json!({}), None).unwrap();
    assert_eq!(
        rt.read_user_data(watcher, "last"),
        Some(&json!({"previous_state": "ST_CLOSED", "current_state": "ST_OPEN"}))
    );
}
