use crate::protocol::*;
use serde_json::json;

#[test]
fn test_epoch_seconds_and_millis_normalize_to_same_date() {
    let from_seconds = Timestamp::from_epoch(1_700_000_000);
    let from_millis = Timestamp::from_epoch(1_700_000_000_000);
    assert_eq!(from_seconds, from_millis);
    assert_eq!(
        from_seconds.as_utc().date_naive(),
        from_millis.as_utc().date_naive()
    );
}

#[test]
fn test_epoch_threshold_boundary_pins_the_heuristic() {
    // The last value below the threshold reads as seconds
    let seconds = Timestamp::from_epoch(9_999_999_999);
    assert_eq!(seconds.as_utc().timestamp(), 9_999_999_999);

    // The threshold value itself reads as milliseconds
    let millis = Timestamp::from_epoch(10_000_000_000);
    assert_eq!(millis.as_utc().timestamp_millis(), 10_000_000_000);
}

#[test]
fn test_timestamp_deserializes_from_all_three_shapes() {
    let from_iso: Timestamp =
        serde_json::from_value(json!("2023-11-14T22:13:20Z")).expect("ISO string");
    let from_seconds: Timestamp =
        serde_json::from_value(json!(1_700_000_000)).expect("epoch seconds");
    let from_millis: Timestamp =
        serde_json::from_value(json!(1_700_000_000_000i64)).expect("epoch millis");

    assert_eq!(from_iso, from_seconds);
    assert_eq!(from_seconds, from_millis);
}

#[test]
fn test_timestamp_deserializes_from_float_epoch() {
    let from_float: Timestamp =
        serde_json::from_value(json!(1_700_000_000.0)).expect("float epoch");
    assert_eq!(from_float, Timestamp::from_epoch(1_700_000_000));
}

#[test]
fn test_timestamp_rejects_garbage_text() {
    let result: Result<Timestamp, _> = serde_json::from_value(json!("not a date"));
    assert!(result.is_err());
}

#[test]
fn test_timestamp_serializes_as_rfc3339() {
    let value = serde_json::to_value(Timestamp::from_epoch(1_700_000_000)).expect("serialize");
    let text = value.as_str().expect("string");
    assert!(text.starts_with("2023-11-14T22:13:20"));
}

#[test]
fn test_notification_event_snapshot_decodes_by_tag() {
    let payload = json!({
        "kind": "snapshot",
        "payload": [{
            "id": 1,
            "title": "New request in your industry",
            "url": "/requests/42",
            "type": "NEW_REQUEST_IN_INDUSTRY",
            "referenceId": "42",
            "createdAt": 1_700_000_000,
            "isRead": false
        }]
    });

    let event: NotificationEvent = serde_json::from_value(payload).expect("decode");
    match event {
        NotificationEvent::Snapshot(list) => {
            assert_eq!(list.len(), 1);
            assert_eq!(list[0].id, 1);
            assert_eq!(list[0].kind, NotificationKind::NewRequestInIndustry);
            assert!(!list[0].is_read);
        }
        NotificationEvent::Push(_) => panic!("expected snapshot"),
    }
}

#[test]
fn test_notification_event_push_decodes_by_tag() {
    let payload = json!({
        "kind": "push",
        "payload": {
            "id": 7,
            "title": "Your response was chosen",
            "url": "/requests/9",
            "type": "MY_RESPONSE_CHOSEN",
            "referenceId": "9",
            "createdAt": "2024-03-01T10:00:00Z",
            "isRead": false,
            "device": "mobile"
        }
    });

    let event: NotificationEvent = serde_json::from_value(payload).expect("decode");
    match event {
        NotificationEvent::Push(n) => {
            assert_eq!(n.id, 7);
            assert_eq!(n.kind, NotificationKind::MyResponseChosen);
            assert_eq!(n.device.as_deref(), Some("mobile"));
        }
        NotificationEvent::Snapshot(_) => panic!("expected push"),
    }
}

#[test]
fn test_notification_event_without_discriminator_is_an_error() {
    // Bare arrays and objects are rejected; the tag is mandatory
    let bare_array = json!([{"id": 1}]);
    assert!(serde_json::from_value::<NotificationEvent>(bare_array).is_err());

    let bare_object = json!({"id": 1, "title": "x"});
    assert!(serde_json::from_value::<NotificationEvent>(bare_object).is_err());
}

#[test]
fn test_chat_update_decodes_with_optional_fields_missing() {
    let payload = json!({
        "chatId": "chat-1",
        "timestamp": 1_700_000_000,
        "updateType": "MESSAGE_READ"
    });

    let update: ChatUpdate = serde_json::from_value(payload).expect("decode");
    assert_eq!(update.chat_id, "chat-1");
    assert_eq!(update.update_type, ChatUpdateKind::MessageRead);
    assert_eq!(update.unread_count, None);
    assert_eq!(update.message_preview, None);
}

#[test]
fn test_chat_update_decodes_full_delta() {
    let payload = json!({
        "chatId": "chat-2",
        "messagePreview": "see attached",
        "senderName": "Acme Oy",
        "senderEmail": "acme@example.com",
        "timestamp": "2024-03-01T10:00:00Z",
        "unreadCount": 3,
        "updateType": "NEW_MESSAGE"
    });

    let update: ChatUpdate = serde_json::from_value(payload).expect("decode");
    assert_eq!(update.update_type, ChatUpdateKind::NewMessage);
    assert_eq!(update.unread_count, Some(3));
    assert_eq!(update.message_preview.as_deref(), Some("see attached"));
}

#[test]
fn test_conversation_event_decodes_message_and_typing() {
    let message = json!({
        "kind": "message",
        "payload": {
            "id": 12,
            "message": "hello",
            "senderName": "Acme Oy",
            "senderEmail": "acme@example.com",
            "timestamp": 1_700_000_000_000i64,
            "isRead": false
        }
    });
    let event: ConversationEvent = serde_json::from_value(message).expect("decode message");
    match event {
        ConversationEvent::Message(m) => {
            assert_eq!(m.id, Some(12));
            assert_eq!(m.message.as_deref(), Some("hello"));
        }
        ConversationEvent::Typing(_) => panic!("expected message"),
    }

    let typing = json!({
        "kind": "typing",
        "payload": {"userEmail": "acme@example.com", "isTyping": true}
    });
    let event: ConversationEvent = serde_json::from_value(typing).expect("decode typing");
    match event {
        ConversationEvent::Typing(t) => {
            assert_eq!(t.user_email, "acme@example.com");
            assert!(t.is_typing);
        }
        ConversationEvent::Message(_) => panic!("expected typing"),
    }
}

#[test]
fn test_file_message_payload_decodes_flat_metadata() {
    let payload = json!({
        "message": null,
        "senderName": "Acme Oy",
        "senderEmail": "acme@example.com",
        "timestamp": 1_700_000_000,
        "isRead": true,
        "messageType": "file",
        "fileName": "offer.pdf",
        "fileUrl": "https://files.example.com/offer.pdf",
        "fileType": "application/pdf",
        "fileSize": 48213
    });

    let message: ChatMessagePayload = serde_json::from_value(payload).expect("decode");
    assert_eq!(message.message_type, Some(MessageKind::File));
    assert_eq!(message.file_name.as_deref(), Some("offer.pdf"));
    assert_eq!(message.file_size, Some(48_213));
}

#[test]
fn test_command_serializes_with_action_tag() {
    let command = Command::Publish {
        destination: topics::AUTH.to_string(),
        payload: json!({"token": "t", "email": "e"}),
    };
    let value = serde_json::to_value(&command).expect("serialize");
    assert_eq!(value["action"], "publish");
    assert_eq!(value["destination"], topics::AUTH);

    let command = Command::Subscribe {
        destination: topics::NOTIFICATIONS.to_string(),
    };
    let value = serde_json::to_value(&command).expect("serialize");
    assert_eq!(value["action"], "subscribe");
}

#[test]
fn test_conversation_topic_naming() {
    assert_eq!(topics::conversation("abc"), "/topic/chats/abc");
    assert_eq!(topics::chat_send("abc"), "/app/chats/abc/send");
    assert_eq!(topics::chat_typing("abc"), "/app/chats/abc/typing");
    assert_eq!(topics::chat_read("abc"), "/app/chats/abc/read");
}

#[test]
fn test_outbound_command_bodies_use_camel_case() {
    let body = MarkNotificationRead {
        notification_id: 5,
        device: "desktop".to_string(),
    };
    let value = serde_json::to_value(&body).expect("serialize");
    assert_eq!(value["notificationId"], 5);
    assert_eq!(value["device"], "desktop");

    let body = TypingSignal { is_typing: true };
    let value = serde_json::to_value(&body).expect("serialize");
    assert_eq!(value["isTyping"], true);
}
