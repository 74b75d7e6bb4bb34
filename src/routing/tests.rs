use super::*;
use crate::protocol::{Envelope, Qos};
use crate::transport::{RawMessage, Transport};
use crate::utils::{Result, WireError};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Transport double that records every request.
#[derive(Default)]
struct RecordingTransport {
    connected: AtomicBool,
    fail_subscribe: AtomicBool,
    subscribed: Mutex<Vec<String>>,
    unsubscribed: Mutex<Vec<String>>,
}

impl RecordingTransport {
    fn connected() -> Arc<Self> {
        let t = Self::default();
        t.connected.store(true, Ordering::SeqCst);
        Arc::new(t)
    }

    fn disconnected() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn subscribed(&self) -> Vec<String> {
        self.subscribed.lock().unwrap().clone()
    }

    fn unsubscribed(&self) -> Vec<String> {
        self.unsubscribed.lock().unwrap().clone()
    }
}

impl Transport for RecordingTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn subscribe(&self, filter: &str, _qos: Qos) -> Result<()> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(WireError::Transport("queue full".into()));
        }
        self.subscribed.lock().unwrap().push(filter.to_string());
        Ok(())
    }

    fn unsubscribe(&self, filter: &str) -> Result<()> {
        self.unsubscribed.lock().unwrap().push(filter.to_string());
        Ok(())
    }

    fn publish(&self, _envelope: &Envelope) -> Result<()> {
        Ok(())
    }
}

fn counter() -> (Arc<AtomicUsize>, Handler) {
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    let handler: Handler = Arc::new(move |_: &Inbound| {
        c.fetch_add(1, Ordering::SeqCst);
    });
    (count, handler)
}

#[test]
fn test_template_pattern_replaces_placeholders() {
    let template = RouteTemplate::parse("microdrop/{sender}/state/voltage").unwrap();
    assert_eq!(template.pattern(), "microdrop/+/state/voltage");

    let template = RouteTemplate::parse("microdrop/{sender}/notify/{receiver}/{endpoint}").unwrap();
    assert_eq!(template.pattern(), "microdrop/+/notify/+/+");

    let template = RouteTemplate::parse("$SYS/brokers/+/clients/#").unwrap();
    assert_eq!(template.pattern(), "$SYS/brokers/+/clients/#");
}

#[test]
fn test_template_rejects_malformed() {
    assert!(RouteTemplate::parse("").is_err());
    assert!(RouteTemplate::parse("microdrop/{sender/state").is_err());
    assert!(RouteTemplate::parse("microdrop/a+b/state").is_err());
    assert!(RouteTemplate::parse("microdrop/#/state").is_err());
}

#[test]
fn test_template_matches_captures_params() {
    let template = RouteTemplate::parse("microdrop/{sender}/state/{key}").unwrap();
    let params = template.matches("microdrop/dropbot/state/voltage").unwrap();
    assert_eq!(params.get("sender").map(String::as_str), Some("dropbot"));
    assert_eq!(params.get("key").map(String::as_str), Some("voltage"));

    assert!(template.matches("microdrop/dropbot/state").is_none());
    assert!(template.matches("microdrop/dropbot/state/voltage/extra").is_none());
    assert!(template.matches("microdrop/dropbot/error/voltage").is_none());
    assert!(template.matches("microdrop//state/voltage").is_none());
}

#[test]
fn test_template_multi_level_wildcard() {
    let template = RouteTemplate::parse("microdrop/#").unwrap();
    assert!(template.matches("microdrop/a/b/c").is_some());
    assert!(template.matches("other/a").is_none());
}

#[test]
fn test_router_remove_route_reports_unused_pattern() {
    let mut router = Router::new();
    let (_, h1) = counter();
    let (_, h2) = counter();
    let a = router.add_route(RouteTemplate::parse("m/{s}/state/k").unwrap(), h1);
    let b = router.add_route(RouteTemplate::parse("m/+/state/k").unwrap(), h2);
    assert!(router.mark_active("m/+/state/k"));
    assert!(!router.mark_active("m/+/state/k"));

    assert_eq!(router.remove_route(a), None);
    assert_eq!(router.remove_route(b), Some("m/+/state/k".to_string()));
    assert!(router.active_patterns().is_empty());
    assert_eq!(router.remove_route(b), None);
}

#[test]
fn test_add_subscription_subscribes_derived_pattern() {
    let transport = RecordingTransport::connected();
    let manager = SubscriptionManager::new("microdrop", transport.clone());
    let (_, handler) = counter();

    manager
        .add_subscription("microdrop/{sender}/state/voltage", handler)
        .unwrap();

    assert_eq!(transport.subscribed(), vec!["microdrop/+/state/voltage"]);
    assert_eq!(manager.active_patterns(), vec!["microdrop/+/state/voltage"]);
}

#[test]
fn test_same_pattern_subscribes_once_and_both_handlers_fire() {
    let transport = RecordingTransport::connected();
    let manager = SubscriptionManager::new("microdrop", transport.clone());
    let (first, h1) = counter();
    let (second, h2) = counter();

    manager.add_subscription("microdrop/{sender}/state/voltage", h1).unwrap();
    manager.add_subscription("microdrop/{plugin}/state/voltage", h2).unwrap();
    assert_eq!(transport.subscribed().len(), 1);
    assert_eq!(manager.route_count(), 2);

    let handled = manager.dispatch(Envelope::new("microdrop/dropbot/state/voltage", json!(100)));
    assert_eq!(handled, 2);
    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 1);
}

#[test]
fn test_dispatch_passes_params_and_address() {
    let transport = RecordingTransport::connected();
    let manager = SubscriptionManager::new("microdrop", transport);
    let seen = Arc::new(Mutex::new(None));
    let s = seen.clone();
    manager
        .add_subscription(
            "microdrop/{sender}/state/{key}",
            Arc::new(move |inbound: &Inbound| {
                *s.lock().unwrap() = Some((
                    inbound.param("sender").map(str::to_string),
                    inbound.param("key").map(str::to_string),
                    inbound.address.clone(),
                    inbound.payload().clone(),
                ));
            }),
        )
        .unwrap();

    manager.dispatch(Envelope::new("microdrop/dropbot/state/voltage", json!({"v": 1})));

    let (sender, key, address, payload) = seen.lock().unwrap().clone().unwrap();
    assert_eq!(sender.as_deref(), Some("dropbot"));
    assert_eq!(key.as_deref(), Some("voltage"));
    assert_eq!(address, Some(crate::protocol::Address::state("dropbot", "voltage")));
    assert_eq!(payload, json!({"v": 1}));
}

#[test]
fn test_add_subscription_while_disconnected_records_route_only() {
    let transport = RecordingTransport::disconnected();
    let manager = SubscriptionManager::new("microdrop", transport.clone());
    let (count, handler) = counter();

    manager.add_subscription("microdrop/trigger/me/{action}", handler).unwrap();

    assert!(transport.subscribed().is_empty());
    assert!(manager.active_patterns().is_empty());
    assert_eq!(manager.route_count(), 1);

    // The route still dispatches if a message arrives by other means.
    manager.dispatch(Envelope::new("microdrop/trigger/me/start", json!({})));
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_deferred_patterns_only_subscribed_when_requested() {
    let transport = RecordingTransport::disconnected();
    let manager = SubscriptionManager::new("microdrop", transport.clone());
    let (_, handler) = counter();
    manager.add_subscription("microdrop/trigger/me/{action}", handler).unwrap();

    transport.connected.store(true, Ordering::SeqCst);
    manager.on_connected(false, false);
    assert!(transport.subscribed().is_empty());

    manager.on_connected(true, true);
    assert_eq!(transport.subscribed(), vec!["microdrop/trigger/me/+"]);
    assert_eq!(manager.active_patterns(), vec!["microdrop/trigger/me/+"]);
}

#[test]
fn test_reconnect_without_session_resubscribes_active() {
    let transport = RecordingTransport::connected();
    let manager = SubscriptionManager::new("microdrop", transport.clone());
    let (_, handler) = counter();
    manager.add_subscription("microdrop/status/{sender}", handler).unwrap();

    manager.on_connected(true, false);
    assert_eq!(transport.subscribed().len(), 1);

    manager.on_connected(false, false);
    assert_eq!(
        transport.subscribed(),
        vec!["microdrop/status/+", "microdrop/status/+"]
    );
}

#[test]
fn test_failed_subscribe_is_not_marked_active() {
    let transport = RecordingTransport::connected();
    transport.fail_subscribe.store(true, Ordering::SeqCst);
    let manager = SubscriptionManager::new("microdrop", transport.clone());
    let (_, handler) = counter();

    assert!(manager.add_subscription("microdrop/status/{sender}", handler).is_ok());
    assert!(manager.active_patterns().is_empty());
}

#[test]
fn test_invalid_template_is_an_error() {
    let manager = SubscriptionManager::new("microdrop", RecordingTransport::connected());
    let (_, handler) = counter();
    assert!(matches!(
        manager.add_subscription("microdrop/{sender/state", handler),
        Err(WireError::InvalidTemplate(_))
    ));
}

#[test]
fn test_remove_route_unsubscribes_last_user() {
    let transport = RecordingTransport::connected();
    let manager = SubscriptionManager::new("microdrop", transport.clone());
    let (_, h1) = counter();
    let (_, h2) = counter();
    let a = manager.add_subscription("microdrop/{s}/state/voltage", h1).unwrap();
    let b = manager.add_subscription("microdrop/+/state/voltage", h2).unwrap();

    manager.remove_route(a).unwrap();
    assert!(transport.unsubscribed().is_empty());

    manager.remove_route(b).unwrap();
    assert_eq!(transport.unsubscribed(), vec!["microdrop/+/state/voltage"]);
    assert!(manager.active_patterns().is_empty());
}

#[test]
fn test_state_query_over_covered_topic_uses_last_value() {
    let transport = RecordingTransport::connected();
    let manager = SubscriptionManager::new("microdrop", transport.clone());
    let (long_lived, handler) = counter();
    manager.add_subscription("microdrop/{sender}/state/voltage", handler).unwrap();
    manager.dispatch(Envelope::new("microdrop/dropbot/state/voltage", json!(120)));

    let (query_hits, query) = counter();
    let (_, cached) = manager
        .add_state_query("microdrop/dropbot/state/voltage", query)
        .unwrap();

    assert_eq!(cached, Some(json!(120)));
    assert_eq!(transport.subscribed(), vec!["microdrop/+/state/voltage"]);
    assert_eq!(long_lived.load(Ordering::SeqCst), 1);
    assert_eq!(query_hits.load(Ordering::SeqCst), 0);
}

#[test]
fn test_state_query_over_covered_topic_without_value_waits() {
    let transport = RecordingTransport::connected();
    let manager = SubscriptionManager::new("microdrop", transport.clone());
    let (_, handler) = counter();
    manager.add_subscription("microdrop/dropbot/state/voltage", handler).unwrap();

    let (query_hits, query) = counter();
    let (_, cached) = manager
        .add_state_query("microdrop/dropbot/state/voltage", query)
        .unwrap();
    assert_eq!(cached, None);
    assert_eq!(transport.subscribed().len(), 1);

    manager.dispatch(Envelope::new("microdrop/dropbot/state/voltage", json!(5)));
    assert_eq!(query_hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_state_query_on_new_topic_subscribes() {
    let transport = RecordingTransport::connected();
    let manager = SubscriptionManager::new("microdrop", transport.clone());
    let (_, query) = counter();

    let (id, cached) = manager
        .add_state_query("microdrop/dropbot/state/voltage", query)
        .unwrap();
    assert_eq!(cached, None);
    assert_eq!(transport.subscribed(), vec!["microdrop/dropbot/state/voltage"]);

    manager.remove_route(id).unwrap();
    assert_eq!(transport.unsubscribed(), vec!["microdrop/dropbot/state/voltage"]);
}

#[test]
fn test_router_last_state_follows_coverage() {
    let mut router = Router::new();
    let topic = "microdrop/dropbot/state/voltage";

    router.record_state(&Envelope::new(topic, json!(1)));
    assert_eq!(router.last_state(topic), None);

    let (_, handler) = counter();
    let id = router.add_route(
        RouteTemplate::parse("microdrop/{sender}/state/voltage").unwrap(),
        handler,
    );
    router.mark_active("microdrop/+/state/voltage");
    router.record_state(&Envelope::new(topic, json!(3)));
    assert_eq!(router.last_state(topic), Some(&json!(3)));

    router.record_state(&Envelope::new(topic, json!(null)));
    assert_eq!(router.last_state(topic), None);

    router.record_state(&Envelope::new(topic, json!(4)));
    assert_eq!(
        router.remove_route(id).as_deref(),
        Some("microdrop/+/state/voltage")
    );
    assert_eq!(router.last_state(topic), None);
}

#[test]
fn test_state_query_after_unsubscribe_subscribes_again() {
    let transport = RecordingTransport::connected();
    let manager = SubscriptionManager::new("microdrop", transport.clone());
    let topic = "microdrop/dropbot/state/voltage";
    let (_, handler) = counter();
    let id = manager.add_subscription("microdrop/+/state/voltage", handler).unwrap();
    manager.dispatch(Envelope::new(topic, json!(2)));
    manager.remove_route(id).unwrap();

    let (_, query) = counter();
    let (_, cached) = manager.add_state_query(topic, query).unwrap();
    assert_eq!(cached, None);
    assert_eq!(
        transport.subscribed(),
        vec!["microdrop/+/state/voltage", "microdrop/dropbot/state/voltage"]
    );
}

#[test]
fn test_dollar_topics_need_literal_first_level() {
    let any = RouteTemplate::parse("#").unwrap();
    let single = RouteTemplate::parse("+/brokers/#").unwrap();
    let placeholder = RouteTemplate::parse("{root}/brokers/#").unwrap();
    let sys = RouteTemplate::parse("$SYS/brokers/+/clients/#").unwrap();
    let topic = "$SYS/brokers/n1/clients/a/connected";

    assert!(any.matches(topic).is_none());
    assert!(single.matches(topic).is_none());
    assert!(placeholder.matches(topic).is_none());
    assert!(sys.matches(topic).is_some());
}

#[test]
fn test_catch_all_route_skips_dollar_topics() {
    let manager = SubscriptionManager::new("microdrop", RecordingTransport::connected());
    let (all, h1) = counter();
    let (sys, h2) = counter();
    manager.add_subscription("#", h1).unwrap();
    manager.add_subscription("$SYS/#", h2).unwrap();

    manager.dispatch(Envelope::new("$SYS/brokers/n1/clients/a/connected", json!({})));
    manager.dispatch(Envelope::new("microdrop/dropbot/state/voltage", json!(1)));

    assert_eq!(all.load(Ordering::SeqCst), 1);
    assert_eq!(sys.load(Ordering::SeqCst), 1);
}

#[test]
fn test_malformed_messages_are_dropped() {
    let manager = SubscriptionManager::new("microdrop", RecordingTransport::connected());
    let (count, handler) = counter();
    manager.add_subscription("microdrop/#", handler).unwrap();

    assert_eq!(manager.dispatch_raw(&RawMessage::new("microdrop/a/state/k", "")), 0);
    assert_eq!(manager.dispatch_raw(&RawMessage::new("microdrop/a/state/k", "{not json")), 0);
    assert_eq!(
        manager.dispatch_raw(&RawMessage::new(vec![0xff, 0xfe], "{}")),
        0
    );
    assert_eq!(count.load(Ordering::SeqCst), 0);

    assert_eq!(manager.dispatch_raw(&RawMessage::new("microdrop/a/state/k", "42")), 1);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_handler_may_register_routes_during_dispatch() {
    let transport = RecordingTransport::connected();
    let manager = Arc::new(SubscriptionManager::new("microdrop", transport.clone()));
    let m = manager.clone();
    manager
        .add_subscription(
            "microdrop/trigger/me/{action}",
            Arc::new(move |_: &Inbound| {
                let _ = m.add_route("microdrop/status/{sender}", Arc::new(|_: &Inbound| {}));
            }),
        )
        .unwrap();

    manager.dispatch(Envelope::new("microdrop/trigger/me/start", json!({})));
    assert_eq!(manager.route_count(), 2);
}
