use super::*;

#[test]
fn new_frame_has_timestamp_and_no_routing() {
    let frame = Frame::new("cursor:moved", Data::new());
    assert!(frame.ts > 0);
    assert!(frame.room.is_none());
    assert!(frame.from.is_none());
}

#[test]
fn prefix_splits_on_first_colon() {
    assert_eq!(Frame::new("object:create", Data::new()).prefix(), "object");
    assert_eq!(Frame::new("room:roster", Data::new()).prefix(), "room");
    assert_eq!(Frame::new("ping", Data::new()).prefix(), "ping");
}

#[test]
fn builders_set_routing_and_data() {
    let frame = Frame::new("room:part", Data::new())
        .with_room("proj-1")
        .with_from("client-a")
        .with_data("id", "client-a");
    assert_eq!(frame.room.as_deref(), Some("proj-1"));
    assert_eq!(frame.from.as_deref(), Some("client-a"));
    assert_eq!(frame.data.get("id"), Some(&serde_json::json!("client-a")));
}

#[test]
fn json_omits_absent_routing_fields() {
    let frame = Frame::new("room:part", Data::new());
    let text = frame.to_json().unwrap();
    assert!(!text.contains("\"room\""));
    assert!(!text.contains("\"from\""));
}

#[test]
fn from_json_defaults_missing_data() {
    let text = format!(r#"{{"id":"{}","ts":1,"syscall":"room:part"}}"#, uuid::Uuid::nil());
    let frame = Frame::from_json(&text).unwrap();
    assert!(frame.data.is_empty());
}

#[test]
fn from_json_rejects_garbage() {
    assert!(Frame::from_json("{nope").is_err());
}
