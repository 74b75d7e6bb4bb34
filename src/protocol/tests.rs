use super::identity::decamelize;
use super::payload::flatten_deep;
use super::*;
use serde_json::json;

#[test]
fn test_address_topics() {
    let base = "microdrop";
    assert_eq!(
        Address::state("dropbot", "voltage").topic(base),
        "microdrop/dropbot/state/voltage"
    );
    assert_eq!(
        Address::error("dropbot", "voltage").topic(base),
        "microdrop/dropbot/error/voltage"
    );
    assert_eq!(
        Address::put("dropbot", "voltage").topic(base),
        "microdrop/put/dropbot/voltage"
    );
    assert_eq!(
        Address::notify("routes-model", "ui", "get-subscriptions").topic(base),
        "microdrop/routes-model/notify/ui/get-subscriptions"
    );
    assert_eq!(Address::status("dropbot").topic(base), "microdrop/status/dropbot");
    assert_eq!(
        Address::trigger("device-model", "load-device").topic(base),
        "microdrop/trigger/device-model/load-device"
    );
    assert_eq!(
        Address::signal("broker", "client-connected").topic(base),
        "microdrop/broker/signal/client-connected"
    );
}

#[test]
fn test_address_parse_roundtrips_every_family() {
    let base = "microdrop";
    let addresses = [
        Address::state("a", "k"),
        Address::error("a", "k"),
        Address::put("b", "k"),
        Address::notify("a", "b", "e"),
        Address::status("a"),
        Address::trigger("b", "go"),
        Address::signal("a", "t"),
    ];
    for address in addresses {
        let topic = address.topic(base);
        assert_eq!(Address::parse(base, &topic), Some(address));
    }
}

#[test]
fn test_address_parse_rejects_foreign_topics() {
    assert_eq!(Address::parse("microdrop", "other/a/state/k"), None);
    assert_eq!(Address::parse("microdrop", "microdrop/a/bogus/k"), None);
    assert_eq!(Address::parse("microdrop", "microdrop//state/k"), None);
    assert_eq!(Address::parse("microdrop", "microdropx/a/state/k"), None);
}

#[test]
fn test_address_family_and_key() {
    let address = Address::trigger("device-model", "load-device");
    assert_eq!(address.family(), Family::Trigger);
    assert_eq!(address.key(), "load-device");
    assert!(Family::State.retained_by_default());
    assert!(!Family::Signal.retained_by_default());
}

#[test]
fn test_envelope_payload_survives_the_wire() {
    let envelope = Envelope::new("microdrop/dropbot/state/voltage", json!({"voltage": 120}));
    let bytes = envelope.encode_payload().unwrap();
    let decoded = Envelope::decode(envelope.topic.as_bytes(), &bytes).unwrap();
    assert_eq!(decoded.payload, json!({"voltage": 120}));
    assert_eq!(decoded.topic, "microdrop/dropbot/state/voltage");
}

#[test]
fn test_envelope_decode_drops_malformed() {
    // topic that is not a string
    assert!(Envelope::decode(&[0xff, 0xfe, 0x31], b"{}").is_none());
    assert!(Envelope::decode(b"", b"{}").is_none());
    assert!(Envelope::decode(b"microdrop/a/state/k", b"").is_none());
    assert!(Envelope::decode(b"microdrop/a/state/k", b"{not json").is_none());
    // scalars are payloads too
    assert_eq!(
        Envelope::decode(b"microdrop/a/state/k", b"5").unwrap().payload,
        json!(5)
    );
}

#[test]
fn test_qos_levels() {
    assert_eq!(Qos::try_from(2).unwrap(), Qos::ExactlyOnce);
    assert!(Qos::try_from(3).is_err());
    assert_eq!(u8::from(Qos::AtLeastOnce), 1);
}

#[test]
fn test_header_wraps_objects_in_place() {
    let header = Header::new("routes-model", "1.2");
    let wrapped = header.wrap("routes", json!({"val": 5}));
    assert_eq!(wrapped["val"], 5);
    assert_eq!(wrapped[HEADER_KEY]["plugin_name"], "routes-model");
    assert_eq!(wrapped[HEADER_KEY]["plugin_version"], "1.2");
}

#[test]
fn test_header_wraps_scalars_under_key() {
    let header = Header::new("dropbot", "0.0");
    let wrapped = header.wrap("voltage", json!(120));
    assert_eq!(wrapped["voltage"], 120);
    assert_eq!(Header::sender_of(&wrapped), Some("dropbot"));
}

#[test]
fn test_header_sender_of() {
    assert_eq!(Header::sender_of(&json!({"__head__": {"pluginName": "ui"}})), Some("ui"));
    assert_eq!(Header::sender_of(&json!({"__head__": {"plugin_name": "ui"}})), Some("ui"));
    assert_eq!(Header::sender_of(&json!({"__head__": {"plugin_name": ""}})), None);
    assert_eq!(Header::sender_of(&json!({"val": 5})), None);
    assert_eq!(Header::sender_of(&json!([1, 2])), None);

    let header = Header::from_payload(&json!({"__head__": {"pluginName": "ui"}})).unwrap();
    assert_eq!(header.plugin_name, "ui");
    assert_eq!(header.plugin_version, "");
}

#[test]
fn test_notify_reply_shape() {
    let reply = NotifyReply::from_value(&json!({
        "status": "success",
        "response": {"val": 5},
        "__head__": {"plugin_name": "routes-model", "plugin_version": "0.0"}
    }))
    .unwrap();
    assert_eq!(reply.status, Some(Status::Success));
    assert_eq!(reply.response, json!({"val": 5}));
    assert_eq!(reply.head.unwrap().plugin_name, "routes-model");

    let failed = NotifyReply::from_value(&json!({"status": "error", "response": []})).unwrap();
    assert_eq!(failed.status, Some(Status::Failed));

    assert!(NotifyReply::from_value(&json!("done")).is_err());
}

#[test]
fn test_client_lifecycle_shape() {
    let body = ClientLifecycle {
        client_name: "electrode-model".to_string(),
        client_path: "/home/user/plugins/electrode".to_string(),
    };
    let value = serde_json::to_value(&body).unwrap();
    assert_eq!(
        value,
        json!({"clientName": "electrode-model", "clientPath": "/home/user/plugins/electrode"})
    );
    assert_eq!(ClientLifecycle::from_value(&value).unwrap(), body);
}

#[test]
fn test_flatten_deep() {
    assert_eq!(flatten_deep(json!(["a", ["b", ["c"]]])), json!(["a", "b", "c"]));
    assert_eq!(flatten_deep(json!("boom")), json!(["boom"]));
    assert_eq!(flatten_deep(json!({"x": 1})), json!([{"x": 1}]));
}

#[test]
fn test_compound_client_id_parse() {
    let id = CompoundClientId::parse("electrode-model>>/home/user/plugins/electrode");
    assert_eq!(id.name, "electrode-model");
    assert_eq!(id.path.as_deref(), Some("/home/user/plugins/electrode"));
    assert!(id.session.is_none());
    assert!(id.is_plugin());

    let bare = CompoundClientId::parse("web-ui");
    assert_eq!(bare.name, "web-ui");
    assert!(bare.path.is_none());
    assert!(!bare.is_plugin());

    let with_session = CompoundClientId::parse("dropbot>>/opt/dropbot>>1718000000.42");
    assert_eq!(with_session.path.as_deref(), Some("/opt/dropbot"));
    assert_eq!(with_session.session.as_deref(), Some("1718000000.42"));
}

#[test]
fn test_compound_client_id_generate() {
    let id = CompoundClientId::generate("dropbot", Some("/opt/dropbot"));
    let reparsed = CompoundClientId::parse(&id.to_string());
    assert_eq!(reparsed, id);

    assert_eq!(CompoundClientId::generate("web-ui", None).to_string(), "web-ui");
}

#[test]
fn test_decamelize() {
    assert_eq!(decamelize("DeviceModel"), "device-model");
    assert_eq!(decamelize("HTTPServer"), "http-server");
    assert_eq!(decamelize("StepUIPlugin"), "step-ui-plugin");
    assert_eq!(decamelize("routes"), "routes");
}
