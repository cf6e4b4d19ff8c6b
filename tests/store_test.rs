use std::collections::HashMap;

use tempfile::TempDir;
use whatsapp_mcp::store::messages::MessageQuery;
use whatsapp_mcp::store::models::{Chat, DeliveryAttempt, MediaMetadata, Message, WebhookRegistration};
use whatsapp_mcp::store::{MessageStore, StoreError};

fn open_store() -> (MessageStore, TempDir) {
    let dir = TempDir::new().unwrap();
    let store = MessageStore::open(dir.path().join("messages.db").to_str().unwrap()).unwrap();
    (store, dir)
}

fn chat(jid: &str, push_name: &str, contact_name: &str, last: i64) -> Chat {
    Chat {
        jid: jid.to_string(),
        push_name: push_name.to_string(),
        contact_name: contact_name.to_string(),
        last_message_time: last,
        unread_count: 0,
        is_group: false,
    }
}

fn message(id: &str, chat_jid: &str, sender: &str, text: &str, ts: i64) -> Message {
    Message {
        id: id.to_string(),
        chat_jid: chat_jid.to_string(),
        sender_jid: sender.to_string(),
        text: text.to_string(),
        timestamp: ts,
        is_from_me: false,
        message_type: "text".to_string(),
    }
}

const ALICE: &str = "5511999990001@s.whatsapp.net";
const BOB: &str = "5511999990002@s.whatsapp.net";

#[test]
fn save_chat_rejects_empty_jid() {
    let (store, _dir) = open_store();
    let err = store.save_chat(&chat("", "x", "", 1)).unwrap_err();
    assert!(matches!(err, StoreError::InvalidArgument(_)));
}

#[test]
fn chat_merge_policy() {
    let (store, _dir) = open_store();

    store.save_chat(&chat(ALICE, "Alice", "", 100)).unwrap();

    // An empty name never overwrites a non-empty one.
    store.save_chat(&chat(ALICE, "", "Alice Saved", 200)).unwrap();
    let row = store.get_chat_by_jid(ALICE).unwrap().unwrap();
    assert_eq!(row.push_name, "Alice");
    assert_eq!(row.contact_name, "Alice Saved");
    assert_eq!(row.last_message_time, 200);

    // last_message_time only advances.
    store.save_chat(&chat(ALICE, "", "", 50)).unwrap();
    let row = store.get_chat_by_jid(ALICE).unwrap().unwrap();
    assert_eq!(row.last_message_time, 200);

    // A new non-empty name replaces an existing one.
    store.save_chat(&chat(ALICE, "Alice B", "", 300)).unwrap();
    let row = store.get_chat_by_jid(ALICE).unwrap().unwrap();
    assert_eq!(row.push_name, "Alice B");
}

#[test]
fn is_group_is_set_once() {
    let (store, _dir) = open_store();
    let group_jid = "120363040000000001@g.us";
    store
        .save_chat(&Chat {
            jid: group_jid.to_string(),
            is_group: true,
            last_message_time: 10,
            ..Default::default()
        })
        .unwrap();
    // A later upsert claiming otherwise must not flip the flag.
    store.save_chat(&chat(group_jid, "", "", 20)).unwrap();
    assert!(store.get_chat_by_jid(group_jid).unwrap().unwrap().is_group);
}

#[test]
fn message_requires_existing_chat() {
    let (store, _dir) = open_store();
    let err = store
        .save_message(&message("M1", ALICE, ALICE, "hi", 100))
        .unwrap_err();
    assert!(matches!(err, StoreError::Integrity(_)));
}

#[test]
fn save_bulk_is_atomic() {
    let (store, _dir) = open_store();
    store.save_chat(&chat(ALICE, "Alice", "", 100)).unwrap();

    let batch = vec![
        message("M1", ALICE, ALICE, "ok", 100),
        // Chat row for BOB does not exist: the whole batch must roll back.
        message("M2", BOB, BOB, "orphan", 101),
    ];
    assert!(store.save_bulk(&batch).is_err());
    assert!(store.get_message_by_id("M1").unwrap().is_none());
}

#[test]
fn message_upsert_is_idempotent() {
    let (store, _dir) = open_store();
    store.save_chat(&chat(ALICE, "Alice", "", 100)).unwrap();

    store.save_message(&message("M1", ALICE, ALICE, "first", 100)).unwrap();
    store.save_message(&message("M1", ALICE, ALICE, "second", 100)).unwrap();

    let row = store.get_message_by_id("M1").unwrap().unwrap();
    assert_eq!(row.text, "second");
    let all = store
        .get_chat_messages(ALICE, &MessageQuery::with_limit(10))
        .unwrap();
    assert_eq!(all.len(), 1);
}

#[test]
fn messages_order_newest_first_with_id_tie_break() {
    let (store, _dir) = open_store();
    store.save_chat(&chat(ALICE, "Alice", "", 100)).unwrap();
    store.save_message(&message("A", ALICE, ALICE, "1", 100)).unwrap();
    store.save_message(&message("C", ALICE, ALICE, "2", 200)).unwrap();
    store.save_message(&message("B", ALICE, ALICE, "3", 200)).unwrap();

    let rows = store
        .get_chat_messages(ALICE, &MessageQuery::with_limit(10))
        .unwrap();
    let ids: Vec<&str> = rows.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["C", "B", "A"]);
}

#[test]
fn message_query_filters() {
    let (store, _dir) = open_store();
    store.save_chat(&chat(ALICE, "Alice", "", 100)).unwrap();
    for (id, sender, ts) in [("M1", ALICE, 100), ("M2", BOB, 200), ("M3", ALICE, 300)] {
        store.save_message(&message(id, ALICE, sender, "x", ts)).unwrap();
    }

    let before = store
        .get_chat_messages(
            ALICE,
            &MessageQuery {
                limit: 10,
                before: Some(300),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(before.len(), 2);

    let after = store
        .get_chat_messages(
            ALICE,
            &MessageQuery {
                limit: 10,
                after: Some(100),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(after.len(), 2);

    let from_alice = store
        .get_chat_messages(
            ALICE,
            &MessageQuery {
                limit: 10,
                sender: Some(ALICE.to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(from_alice.len(), 2);
}

#[test]
fn chat_search_glob_and_substring() {
    let (store, _dir) = open_store();
    store.save_chat(&chat("1@g.us", "Tech Team", "", 300)).unwrap();
    store.save_chat(&chat("2@g.us", "tech team", "", 200)).unwrap();
    store.save_chat(&chat("3@g.us", "Support", "", 100)).unwrap();

    // Glob patterns are case-sensitive.
    let glob = store.search_chats("Tech*", 10).unwrap();
    assert_eq!(glob.len(), 1);
    assert_eq!(glob[0].push_name, "Tech Team");

    // Substring matching is case-insensitive.
    let like = store.search_chats("tech", 10).unwrap();
    assert_eq!(like.len(), 2);

    let class = store.search_chats("[Tt]ech*", 10).unwrap();
    assert_eq!(class.len(), 2);
}

#[test]
fn sender_only_search_returns_all_their_messages() {
    let (store, _dir) = open_store();
    store.save_chat(&chat(ALICE, "Alice", "", 100)).unwrap();
    store.save_chat(&chat(BOB, "Bob", "", 100)).unwrap();
    store.save_message(&message("M1", ALICE, ALICE, "one", 100)).unwrap();
    store.save_message(&message("M2", BOB, ALICE, "two", 300)).unwrap();
    store.save_message(&message("M3", BOB, BOB, "three", 200)).unwrap();

    let rows = store
        .search_messages_with_names(None, Some(ALICE), 10)
        .unwrap();
    let ids: Vec<&str> = rows.iter().map(|m| m.id.as_str()).collect();
    // Alice's messages across every chat, newest first.
    assert_eq!(ids, vec!["M2", "M1"]);
}

#[test]
fn text_search_glob_is_case_sensitive() {
    let (store, _dir) = open_store();
    store.save_chat(&chat(ALICE, "Alice", "", 100)).unwrap();
    store.save_message(&message("M1", ALICE, ALICE, "TODO: ship it", 100)).unwrap();
    store.save_message(&message("M2", ALICE, ALICE, "todo: rest", 200)).unwrap();

    let glob = store.search_messages_with_names(Some("*TODO*"), None, 10).unwrap();
    assert_eq!(glob.len(), 1);
    assert_eq!(glob[0].id, "M1");

    let like = store.search_messages_with_names(Some("todo"), None, 10).unwrap();
    assert_eq!(like.len(), 2);
}

#[test]
fn with_names_join_resolves_display_names() {
    let (store, _dir) = open_store();
    store.save_chat(&chat(ALICE, "alice push", "Alice Saved", 100)).unwrap();
    store.save_chat(&chat(BOB, "bob push", "", 100)).unwrap();
    store.save_message(&message("M1", BOB, ALICE, "hello", 100)).unwrap();
    store
        .save_push_names(&HashMap::from([(ALICE.to_string(), "Alice Latest".to_string())]))
        .unwrap();

    let row = store.get_message_with_names("M1").unwrap().unwrap();
    assert_eq!(row.sender_push_name, "Alice Latest");
    assert_eq!(row.sender_contact_name, "Alice Saved");
    // Chat name coalesces contact_name, push_name, then JID.
    assert_eq!(row.chat_name, "bob push");
    assert_eq!(row.sender_display_name(), "Alice Saved");
}

#[test]
fn oldest_message_and_older_than() {
    let (store, _dir) = open_store();
    store.save_chat(&chat(ALICE, "Alice", "", 100)).unwrap();
    for (id, ts) in [("M1", 300), ("M2", 100), ("M3", 200)] {
        store.save_message(&message(id, ALICE, ALICE, "x", ts)).unwrap();
    }

    let oldest = store.get_oldest_message(ALICE).unwrap().unwrap();
    assert_eq!(oldest.id, "M2");

    let older = store.get_messages_older_than(ALICE, 300, 10).unwrap();
    let ids: Vec<&str> = older.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["M3", "M2"]);
}

#[test]
fn push_name_cache_roundtrip() {
    let (store, _dir) = open_store();
    store
        .save_push_names(&HashMap::from([
            (ALICE.to_string(), "Alice".to_string()),
            (BOB.to_string(), String::new()), // empty names are dropped
        ]))
        .unwrap();

    assert_eq!(store.get_push_name(ALICE).unwrap(), "Alice");
    assert_eq!(store.get_push_name(BOB).unwrap(), "");

    let all = store.load_all_push_names().unwrap();
    assert_eq!(all.len(), 1);
}

#[test]
fn media_metadata_lifecycle() {
    let (store, _dir) = open_store();

    // FK: the owning message must exist first.
    let orphan = MediaMetadata {
        message_id: "M1".to_string(),
        download_status: "pending".to_string(),
        ..Default::default()
    };
    assert!(matches!(
        store.save_media_metadata(&orphan).unwrap_err(),
        StoreError::Integrity(_)
    ));

    store.save_chat(&chat(ALICE, "Alice", "", 100)).unwrap();
    store.save_message(&message("M1", ALICE, ALICE, "[Image]", 100)).unwrap();
    let meta = MediaMetadata {
        message_id: "M1".to_string(),
        file_name: "image_M1.jpg".to_string(),
        file_size: 1024,
        mime_type: "image/jpeg".to_string(),
        download_status: "pending".to_string(),
        ..Default::default()
    };
    store.save_media_metadata(&meta).unwrap();

    store
        .mark_media_downloaded("M1", "images/M1_20241231_100000_image_M1.jpg")
        .unwrap();
    let row = store.get_media_metadata("M1").unwrap().unwrap();
    assert_eq!(row.download_status, "downloaded");
    assert!(!row.file_path.is_empty());
    assert!(row.download_timestamp.is_some());

    store.mark_media_failed("M1", "failed", "attempt 1: boom").unwrap();
    let row = store.get_media_metadata("M1").unwrap().unwrap();
    assert_eq!(row.download_status, "failed");
    assert_eq!(row.download_error.as_deref(), Some("attempt 1: boom"));
}

#[test]
fn webhook_crud_and_stats() {
    let (store, _dir) = open_store();

    let reg = WebhookRegistration {
        id: "wh-1".to_string(),
        url: "https://example.com/hook".to_string(),
        secret: "s3cret".to_string(),
        event_types: vec!["message".to_string()],
        active: true,
        created_at: 1000,
        updated_at: 1000,
    };
    store.create_webhook(&reg).unwrap();

    let loaded = store.get_webhook("wh-1").unwrap();
    assert_eq!(loaded.url, reg.url);
    assert_eq!(loaded.event_types, vec!["message"]);

    assert!(matches!(
        store.get_webhook("missing").unwrap_err(),
        StoreError::NotFound
    ));

    let mut updated = loaded.clone();
    updated.active = false;
    updated.updated_at = 2000;
    store.update_webhook(&updated).unwrap();
    assert!(store.list_webhooks(true).unwrap().is_empty());
    assert_eq!(store.list_webhooks(false).unwrap().len(), 1);

    // upsert keeps the id stable for system:primary style registrations
    store.upsert_webhook(&reg).unwrap();
    assert!(store.get_webhook("wh-1").unwrap().active);

    for (attempt, success, code, at) in
        [(1, false, Some(500), 5000), (2, false, Some(500), 5005), (3, true, Some(200), 5020)]
    {
        store
            .record_delivery(&DeliveryAttempt {
                webhook_id: "wh-1".to_string(),
                payload_id: "p-1".to_string(),
                event_type: "message.received".to_string(),
                attempt_number: attempt,
                status_code: code,
                success,
                error: (!success).then(|| "boom".to_string()),
                attempted_at: at,
            })
            .unwrap();
    }

    let stats = store.get_delivery_stats("wh-1", 0).unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.successful, 1);
    assert_eq!(stats.failed, 2);
    assert!((stats.success_rate - 33.333).abs() < 0.01);
    assert_eq!(stats.last_delivery_at, Some(5020));
    assert_eq!(stats.last_failure_at, Some(5005));

    // The since filter cuts off older attempts.
    let recent = store.get_delivery_stats("wh-1", 5010).unwrap();
    assert_eq!(recent.total, 1);
    assert_eq!(recent.failed, 0);

    store.delete_webhook("wh-1").unwrap();
    assert!(matches!(
        store.delete_webhook("wh-1").unwrap_err(),
        StoreError::NotFound
    ));
}
