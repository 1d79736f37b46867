//! Publish/subscribe between objects
//!
//! A subscription links a publisher and a subscriber for one event (or
//! every event). Its kw may carry:
//! - `__config__`: `__hard_subscription__` (survives plain unsubscription),
//!   `__own_event__` (a refusing subscriber stops the broadcast),
//!   `__rename_event_name__` (deliver under another event name)
//! - `__global__`: keys merged into each published kw
//! - `__local__`: keys removed from each published kw
//!
//! Publishing delivers through `send_event`, so subscribers receive the
//! event in their FSM like any other.

use crate::error::{GobjError, Result};
use crate::gclass::EV_STATE_CHANGED;
use crate::methods::PreFilter;
use crate::runtime::Runtime;
use crate::trace::TraceLevels;
use crate::types::{EventFlags, GclassFlags, GobjId, Json, JsonMap, SubscriptionId};
use serde_json::json;

pub const KW_CONFIG: &str = "__config__";
pub const KW_GLOBAL: &str = "__global__";
pub const KW_LOCAL: &str = "__local__";
pub const CONFIG_HARD_SUBSCRIPTION: &str = "__hard_subscription__";
pub const CONFIG_OWN_EVENT: &str = "__own_event__";
pub const CONFIG_RENAME_EVENT: &str = "__rename_event_name__";

/// A live subscription
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub publisher: GobjId,
    pub subscriber: GobjId,
    /// `None` subscribes every event
    pub event: Option<String>,
    pub hard: bool,
    pub own_event: bool,
    pub rename: Option<String>,
    pub config: Option<JsonMap>,
    pub global: Option<JsonMap>,
    pub local: Option<JsonMap>,
}

impl Subscription {
    fn matches_event(&self, event: &str) -> bool {
        self.event.as_deref().map_or(true, |e| e == event)
    }

    pub fn to_json(&self) -> Json {
        json!({
            "id": self.id.0,
            "publisher": self.publisher.0,
            "subscriber": self.subscriber.0,
            "event": self.event,
            "hard": self.hard,
            "own_event": self.own_event,
            "rename": self.rename,
            "__config__": self.config,
            "__global__": self.global,
            "__local__": self.local,
        })
    }
}

/// Subscription kw split into its three dictionaries
#[derive(Debug, Default, PartialEq)]
struct SubsKw {
    config: Option<JsonMap>,
    global: Option<JsonMap>,
    local: Option<JsonMap>,
}

impl SubsKw {
    fn parse(kw: &Json) -> Self {
        let dict = |key: &str| kw.get(key).and_then(Json::as_object).cloned();
        Self {
            config: dict(KW_CONFIG),
            global: dict(KW_GLOBAL),
            local: dict(KW_LOCAL),
        }
    }

    /// Every dictionary present in the query equals the subscription's
    fn matches(&self, subs: &Subscription) -> bool {
        let eq = |query: &Option<JsonMap>, have: &Option<JsonMap>| query.is_none() || query == have;
        eq(&self.config, &subs.config) && eq(&self.global, &subs.global) && eq(&self.local, &subs.local)
    }

    /// All three dictionaries equal, absent ones included
    fn matches_exactly(&self, subs: &Subscription) -> bool {
        self.config == subs.config && self.global == subs.global && self.local == subs.local
    }
}

fn config_flag(config: Option<&JsonMap>, key: &str) -> bool {
    match config.and_then(|c| c.get(key)) {
        Some(Json::Bool(b)) => *b,
        Some(Json::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Json::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

impl Runtime {
    fn check_output_event(&self, publisher: GobjId, event: &str) -> Result<Option<EventFlags>> {
        let ev = self
            .event_type(publisher, event)
            .filter(|e| e.is_output() || e.is_system());
        if ev.is_none() {
            let no_check = self
                .gobj(publisher)
                .is_some_and(|g| g.gclass.has_flag(GclassFlags::NO_CHECK_OUTPUT_EVENTS));
            if !no_check {
                tracing::error!(gobj = %self.full_name(publisher), event, "event not in output event list");
                return Err(GobjError::Parameter(format!(
                    "{}: {event} is not an output event",
                    self.short_name(publisher)
                )));
            }
        }
        Ok(ev.map(|e| e.flags))
    }

    fn tracing_subscriptions(&self, a: GobjId, b: GobjId) -> bool {
        self.is_tracing(a, TraceLevels::SUBSCRIPTIONS) || self.is_tracing(b, TraceLevels::SUBSCRIPTIONS)
    }

    /// Subscribe `subscriber` to `event` of `publisher` (`None`: every event).
    ///
    /// An identical subscription is replaced. The publisher's
    /// `mt_subscription_added` may refuse the new subscription.
    pub fn subscribe_event(
        &mut self,
        publisher: GobjId,
        event: Option<&str>,
        kw: Json,
        subscriber: GobjId,
    ) -> Result<SubscriptionId> {
        self.live(publisher).inspect_err(|_| {
            tracing::error!(publisher = %publisher, event, "subscribe: publisher not found");
        })?;
        self.live(subscriber).inspect_err(|_| {
            tracing::error!(subscriber = %subscriber, event, "subscribe: subscriber not found");
        })?;
        if let Some(ev) = event.filter(|e| !e.is_empty()) {
            self.check_output_event(publisher, ev)?;
        }

        let parsed = SubsKw::parse(&kw);
        let repeated: Vec<SubscriptionId> = self
            .subscriptions_of(publisher)
            .filter(|s| {
                s.subscriber == subscriber && s.event.as_deref() == event && parsed.matches_exactly(s)
            })
            .map(|s| s.id)
            .collect();
        if !repeated.is_empty() {
            tracing::error!(
                publisher = %self.full_name(publisher),
                subscriber = %self.full_name(subscriber),
                event,
                "subscription repeated, will be replaced"
            );
            self.unsubscribe_list(&repeated, true);
        }

        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        let subs = Subscription {
            id,
            publisher,
            subscriber,
            event: event.filter(|e| !e.is_empty()).map(str::to_string),
            hard: config_flag(parsed.config.as_ref(), CONFIG_HARD_SUBSCRIPTION),
            own_event: config_flag(parsed.config.as_ref(), CONFIG_OWN_EVENT),
            rename: parsed
                .config
                .as_ref()
                .and_then(|c| c.get(CONFIG_RENAME_EVENT))
                .and_then(Json::as_str)
                .map(str::to_string),
            config: parsed.config,
            global: parsed.global,
            local: parsed.local,
        };

        if self.tracing_subscriptions(publisher, subscriber) {
            tracing::info!(
                target: "gobj::trace",
                subscriber = %self.full_name(subscriber),
                publisher = %self.full_name(publisher),
                event = event.unwrap_or_default(),
                kw = %kw,
                "subscribing"
            );
        }

        self.subscriptions.insert(id, subs.clone());
        if let Some(node) = self.gobj_mut(publisher) {
            node.subscriptions.push(id);
        }
        if let Some(node) = self.gobj_mut(subscriber) {
            node.subscribings.push(id);
        }

        let gclass = self.live(publisher)?.gclass.clone();
        if gclass.methods().mt_subscription_added(self, publisher, &subs) < 0 {
            self.delete_subscription(id, true, false);
            tracing::warn!(
                publisher = %self.full_name(publisher),
                subscriber = %self.full_name(subscriber),
                event,
                "subscription refused by publisher"
            );
            return Err(GobjError::operational(self.full_name(publisher), "subscription refused"));
        }
        Ok(id)
    }

    /// Remove the subscriptions identical to the given one; hard ones stay.
    ///
    /// Returns the number removed.
    pub fn unsubscribe_event(
        &mut self,
        publisher: GobjId,
        event: Option<&str>,
        kw: &Json,
        subscriber: GobjId,
    ) -> Result<usize> {
        self.live(publisher)?;
        self.live(subscriber)?;
        let parsed = SubsKw::parse(kw);
        let found: Vec<SubscriptionId> = self
            .subscriptions_of(publisher)
            .filter(|s| {
                s.subscriber == subscriber && s.event.as_deref() == event && parsed.matches_exactly(s)
            })
            .map(|s| s.id)
            .collect();
        if found.is_empty() {
            tracing::error!(
                publisher = %self.full_name(publisher),
                subscriber = %self.full_name(subscriber),
                event,
                "no subscription found"
            );
        }
        Ok(self.unsubscribe_list(&found, false))
    }

    /// Remove the listed subscriptions; hard ones only when `force`
    pub fn unsubscribe_list(&mut self, ids: &[SubscriptionId], force: bool) -> usize {
        ids.iter()
            .filter(|id| self.delete_subscription(**id, force, true))
            .count()
    }

    /// Forced removal of everything `id` publishes or subscribes to
    pub(crate) fn unsubscribe_all(&mut self, id: GobjId) {
        let Some(gobj) = self.gobj(id) else {
            return;
        };
        let mut ids = gobj.subscriptions.clone();
        ids.extend(gobj.subscribings.iter().copied());
        for sid in ids {
            self.delete_subscription(sid, true, true);
        }
    }

    fn delete_subscription(&mut self, id: SubscriptionId, force: bool, inform: bool) -> bool {
        let Some(subs) = self.subscriptions.get(&id).cloned() else {
            return false;
        };
        if subs.hard && !force {
            return false;
        }

        if self.tracing_subscriptions(subs.publisher, subs.subscriber) {
            tracing::info!(
                target: "gobj::trace",
                subscriber = %self.full_name(subs.subscriber),
                publisher = %self.full_name(subs.publisher),
                event = subs.event.as_deref().unwrap_or_default(),
                "unsubscribing"
            );
        }

        if inform {
            if let Some(gclass) = self.gobj(subs.publisher).map(|g| g.gclass.clone()) {
                gclass
                    .methods()
                    .mt_subscription_deleted(self, subs.publisher, &subs);
            }
        }

        self.subscriptions.remove(&id);
        if let Some(node) = self.gobj_mut(subs.publisher) {
            node.subscriptions.retain(|s| *s != id);
        }
        if let Some(node) = self.gobj_mut(subs.subscriber) {
            node.subscribings.retain(|s| *s != id);
        }
        true
    }

    fn subscriptions_of(&self, publisher: GobjId) -> impl Iterator<Item = &Subscription> + '_ {
        self.gobj(publisher)
            .map(|g| g.subscriptions.as_slice())
            .unwrap_or(&[])
            .iter()
            .filter_map(|sid| self.subscriptions.get(sid))
    }

    pub fn subscription(&self, id: SubscriptionId) -> Option<&Subscription> {
        self.subscriptions.get(&id)
    }

    /// Subscriptions held by `publisher`, filtered by event, kw dictionaries and subscriber
    pub fn find_subscriptions(
        &self,
        publisher: GobjId,
        event: Option<&str>,
        kw: &Json,
        subscriber: Option<GobjId>,
    ) -> Vec<SubscriptionId> {
        let query = SubsKw::parse(kw);
        self.subscriptions_of(publisher)
            .filter(|s| event.map_or(true, |e| s.event.as_deref() == Some(e)))
            .filter(|s| subscriber.map_or(true, |sub| s.subscriber == sub))
            .filter(|s| query.matches(s))
            .map(|s| s.id)
            .collect()
    }

    /// Subscriptions made by `subscriber`, filtered by event, kw dictionaries and publisher
    pub fn find_subscribings(
        &self,
        subscriber: GobjId,
        event: Option<&str>,
        kw: &Json,
        publisher: Option<GobjId>,
    ) -> Vec<SubscriptionId> {
        let query = SubsKw::parse(kw);
        self.gobj(subscriber)
            .map(|g| g.subscribings.as_slice())
            .unwrap_or(&[])
            .iter()
            .filter_map(|sid| self.subscriptions.get(sid))
            .filter(|s| event.map_or(true, |e| s.event.as_deref() == Some(e)))
            .filter(|s| publisher.map_or(true, |p| s.publisher == p))
            .filter(|s| query.matches(s))
            .map(|s| s.id)
            .collect()
    }

    /// Deliver `event` to the subscribers of `publisher`.
    ///
    /// Returns the number of deliveries. The broadcast stops early when the
    /// pre-filter says so, when an own-event subscriber refuses the event,
    /// or when the publisher gets destroyed by a subscriber.
    pub fn publish_event(&mut self, publisher: GobjId, event: &str, kw: Json) -> Result<usize> {
        let gclass = self
            .live(publisher)
            .inspect_err(|_| tracing::error!(gobj = %publisher, event, "publish: gobj not found"))?
            .gclass
            .clone();
        if event.is_empty() {
            tracing::error!(gobj = %self.full_name(publisher), "publish: event empty");
            return Err(GobjError::Parameter("event empty".to_string()));
        }
        let ev_flags = self.check_output_event(publisher, event)?;
        let kw = match kw {
            Json::Null => Json::Object(JsonMap::new()),
            other => other,
        };

        let traced = self.is_tracing(publisher, TraceLevels::SUBSCRIPTIONS);
        if traced {
            tracing::info!(
                target: "gobj::trace",
                gobj = %self.full_name(publisher),
                state = self.current_state(publisher).unwrap_or_default(),
                event,
                "publishing"
            );
        }

        if !gclass.methods().mt_publish_event(self, publisher, event, &kw) {
            return Ok(0);
        }

        let snapshot = self
            .gobj(publisher)
            .map(|g| g.subscriptions.clone())
            .unwrap_or_default();
        let mut sent = 0;
        let mut owned = false;
        for sid in snapshot {
            let Some(subs) = self.subscriptions.get(&sid).cloned() else {
                continue;
            };
            match gclass
                .methods()
                .mt_publication_pre_filter(self, publisher, &subs, event, &kw)
            {
                PreFilter::Stop => break,
                PreFilter::Skip => continue,
                PreFilter::Deliver => {}
            }
            let subscriber = subs.subscriber;
            if self.is_destroying(subscriber) || !subs.matches_event(event) {
                continue;
            }
            if !gclass
                .methods()
                .mt_publication_filter(self, publisher, event, &kw, subscriber)
            {
                continue;
            }
            if event == EV_STATE_CHANGED && !self.has_input_event(subscriber, event) {
                continue;
            }

            let mut kw2publish = kw.clone();
            if let Some(map) = kw2publish.as_object_mut() {
                if let Some(local) = &subs.local {
                    for key in local.keys() {
                        map.remove(key);
                    }
                }
                if let Some(global) = &subs.global {
                    map.extend(global.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
            }
            let name = subs.rename.as_deref().unwrap_or(event);

            if traced {
                tracing::info!(
                    target: "gobj::trace",
                    subscriber = %self.short_name(subscriber),
                    publisher = %self.short_name(publisher),
                    event = name,
                    "delivering"
                );
            }

            let refused = match self.send_event(subscriber, name, kw2publish, Some(publisher)) {
                Ok(ret) => ret < 0,
                Err(_) => true,
            };
            if refused && subs.own_event {
                owned = true;
                break;
            }
            sent += 1;

            if self.is_destroying(publisher) {
                break;
            }
        }

        if sent == 0 && !owned && !ev_flags.is_some_and(|f| f.contains(EventFlags::NO_WARN_SUBS)) {
            tracing::warn!(gobj = %self.full_name(publisher), event, "publish event without subscribers");
        }
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gclass::{EventAction, GClassBuilder};
    use crate::methods::GMethods;
    use std::sync::{Arc, Mutex};

    type Inbox = Arc<Mutex<Vec<(String, Json)>>>;

    fn recorder(
        inbox: Inbox,
    ) -> impl Fn(&mut Runtime, GobjId, &str, Json, Option<GobjId>) -> i32 + Send + Sync + 'static {
        move |_rt: &mut Runtime, _gobj: GobjId, event: &str, kw: Json, _src: Option<GobjId>| {
            inbox.lock().unwrap().push((event.to_string(), kw));
            0
        }
    }

    struct Refuser;

    impl GMethods for Refuser {
        fn mt_subscription_added(&self, _rt: &mut Runtime, _gobj: GobjId, _subs: &Subscription) -> i32 {
            -1
        }
    }

    fn runtime(inbox: Inbox) -> (Runtime, GobjId, GobjId) {
        let mut rt = Runtime::with_defaults();
        rt.register_gclass(GClassBuilder::new("C_YUNO").state("ST_IDLE", vec![]))
            .unwrap();
        rt.register_gclass(
            GClassBuilder::new("C_PUB")
                .state("ST_IDLE", vec![])
                .state("ST_BUSY", vec![])
                .event_type("EV_DATA", EventFlags::OUTPUT)
                .event_type("EV_QUIET", EventFlags::OUTPUT | EventFlags::NO_WARN_SUBS)
                .event_type("EV_INTERNAL", EventFlags::empty()),
        )
        .unwrap();
        rt.register_gclass(
            GClassBuilder::new("C_SUB").state(
                "ST_IDLE",
                vec![
                    EventAction::new("EV_DATA", recorder(inbox.clone()), None),
                    EventAction::new("EV_RENAMED", recorder(inbox.clone()), None),
                    EventAction::new(EV_STATE_CHANGED, recorder(inbox), None),
                ],
            ),
        )
        .unwrap();
        let yuno = rt.create_yuno("yuno", "C_YUNO", json!({})).unwrap();
        let publisher = rt.create_child("pub", "C_PUB", json!({}), yuno).unwrap();
        let subscriber = rt.create_child("sub", "C_SUB", json!({}), yuno).unwrap();
        (rt, publisher, subscriber)
    }

    #[test]
    fn test_publish_delivers_with_kw_rewrites() {
        let inbox = Inbox::default();
        let (mut rt, publisher, subscriber) = runtime(inbox.clone());
        rt.subscribe_event(
            publisher,
            Some("EV_DATA"),
            json!({"__global__": {"origin": "pub"}, "__local__": {"secret": null}}),
            subscriber,
        )
        .unwrap();

        let sent = rt
            .publish_event(publisher, "EV_DATA", json!({"value": 1, "secret": "x"}))
            .unwrap();
        assert_eq!(sent, 1);
        let got = inbox.lock().unwrap().clone();
        assert_eq!(got, vec![("EV_DATA".to_string(), json!({"value": 1, "origin": "pub"}))]);
    }

    #[test]
    fn test_output_event_check() {
        let (mut rt, publisher, subscriber) = runtime(Inbox::default());
        assert!(rt
            .subscribe_event(publisher, Some("EV_INTERNAL"), json!({}), subscriber)
            .is_err());
        assert!(rt.publish_event(publisher, "EV_INTERNAL", json!({})).is_err());
        assert_eq!(rt.publish_event(publisher, "EV_QUIET", json!({})).unwrap(), 0);
    }

    #[test]
    fn test_subscribe_all_and_state_changed_filter() {
        let inbox = Inbox::default();
        let (mut rt, publisher, subscriber) = runtime(inbox.clone());
        rt.subscribe_event(publisher, None, json!({}), subscriber).unwrap();

        rt.change_state(publisher, "ST_BUSY").unwrap();
        let got = inbox.lock().unwrap().clone();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].0, EV_STATE_CHANGED);
        assert_eq!(got[0].1["previous_state"], "ST_IDLE");
        assert_eq!(got[0].1["current_state"], "ST_BUSY");
    }

    #[test]
    fn test_rename_and_repeat() {
        let inbox = Inbox::default();
        let (mut rt, publisher, subscriber) = runtime(inbox.clone());
        let kw = json!({"__config__": {"__rename_event_name__": "EV_RENAMED"}});
        let first = rt
            .subscribe_event(publisher, Some("EV_DATA"), kw.clone(), subscriber)
            .unwrap();
        let second = rt
            .subscribe_event(publisher, Some("EV_DATA"), kw, subscriber)
            .unwrap();
        assert_ne!(first, second);
        assert!(rt.subscription(first).is_none());
        assert_eq!(rt.find_subscriptions(publisher, None, &Json::Null, None), vec![second]);

        rt.publish_event(publisher, "EV_DATA", json!({})).unwrap();
        assert_eq!(inbox.lock().unwrap()[0].0, "EV_RENAMED");
    }

    #[test]
    fn test_hard_subscription_and_destroy() {
        let (mut rt, publisher, subscriber) = runtime(Inbox::default());
        let kw = json!({"__config__": {"__hard_subscription__": true}});
        let sid = rt
            .subscribe_event(publisher, Some("EV_DATA"), kw.clone(), subscriber)
            .unwrap();
        assert!(rt.subscription(sid).unwrap().hard);

        assert_eq!(rt.unsubscribe_event(publisher, Some("EV_DATA"), &kw, subscriber).unwrap(), 0);
        assert_eq!(rt.find_subscribings(subscriber, None, &Json::Null, Some(publisher)), vec![sid]);

        rt.destroy(subscriber).unwrap();
        assert!(rt.subscription(sid).is_none());
        assert!(rt.find_subscriptions(publisher, None, &Json::Null, None).is_empty());
        assert_eq!(rt.stats_summary().subscriptions, 0);
    }

    #[test]
    fn test_unsubscribe_and_filters() {
        let (mut rt, publisher, subscriber) = runtime(Inbox::default());
        let global = json!({"__global__": {"tag": 1}});
        rt.subscribe_event(publisher, Some("EV_DATA"), global.clone(), subscriber)
            .unwrap();
        rt.subscribe_event(publisher, Some("EV_QUIET"), json!({}), subscriber)
            .unwrap();

        assert_eq!(rt.find_subscriptions(publisher, Some("EV_DATA"), &Json::Null, None).len(), 1);
        assert_eq!(rt.find_subscriptions(publisher, None, &global, None).len(), 1);
        assert_eq!(rt.find_subscribings(subscriber, None, &Json::Null, None).len(), 2);

        assert_eq!(rt.unsubscribe_event(publisher, Some("EV_DATA"), &global, subscriber).unwrap(), 1);
        assert_eq!(rt.unsubscribe_event(publisher, Some("EV_DATA"), &global, subscriber).unwrap(), 0);
        assert_eq!(rt.find_subscribings(subscriber, None, &Json::Null, None).len(), 1);
    }

    #[test]
    fn test_publisher_may_refuse() {
        let mut rt = Runtime::with_defaults();
        rt.register_gclass(GClassBuilder::new("C_YUNO").state("ST_IDLE", vec![]))
            .unwrap();
        rt.register_gclass(
            GClassBuilder::new("C_PICKY")
                .state("ST_IDLE", vec![])
                .event_type("EV_DATA", EventFlags::OUTPUT)
                .methods(Refuser),
        )
        .unwrap();
        let yuno = rt.create_yuno("yuno", "C_YUNO", json!({})).unwrap();
        let picky = rt.create_child("picky", "C_PICKY", json!({}), yuno).unwrap();
        assert!(rt.subscribe_event(picky, Some("EV_DATA"), json!({}), yuno).is_err());
        assert_eq!(rt.stats_summary().subscriptions, 0);
    }

    #[test]
    fn test_own_event_stops_broadcast() {
        let inbox = Inbox::default();
        let (mut rt, publisher, subscriber) = runtime(inbox.clone());
        rt.register_gclass(
            GClassBuilder::new("C_OWNER").state(
                "ST_IDLE",
                vec![EventAction::new("EV_DATA", |_: &mut Runtime, _, _: &str, _, _| -1, None)],
            ),
        )
        .unwrap();
        let yuno = rt.yuno().unwrap();
        let owner = rt.create_child("owner", "C_OWNER", json!({}), yuno).unwrap();
        rt.subscribe_event(
            publisher,
            Some("EV_DATA"),
            json!({"__config__": {"__own_event__": true}}),
            owner,
        )
        .unwrap();
        rt.subscribe_event(publisher, Some("EV_DATA"), json!({}), subscriber)
            .unwrap();

        assert_eq!(rt.publish_event(publisher, "EV_DATA", json!({})).unwrap(), 0);
        assert!(inbox.lock().unwrap().is_empty());
    }
}
