use std::str::FromStr;
use std::sync::Arc;

use chrono_tz::Tz;
use serde_json::{json, Value};
use tempfile::TempDir;

use whatsapp_mcp::canonical::Canonicaliser;
use whatsapp_mcp::history::HistoryCoordinator;
use whatsapp_mcp::mcp::server::{McpServer, RpcRequest};
use whatsapp_mcp::protocol::InProcessPort;
use whatsapp_mcp::store::models::{Chat, Message};
use whatsapp_mcp::store::MessageStore;

const OWN_JID: &str = "5599000000000@s.whatsapp.net";
const MARIA: &str = "5511999999999@s.whatsapp.net";
const TS: i64 = 1_735_639_200;

struct Fixture {
    server: McpServer,
    store: Arc<MessageStore>,
    port: Arc<InProcessPort>,
    _dir: TempDir,
}

fn fixture(logged_in: bool) -> Fixture {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(
        MessageStore::open(dir.path().join("messages.db").to_str().unwrap()).unwrap(),
    );
    let port = if logged_in {
        Arc::new(InProcessPort::logged_in(OWN_JID.parse().unwrap()))
    } else {
        Arc::new(InProcessPort::disconnected())
    };
    let canonical = Canonicaliser::new(port.clone());
    let history = Arc::new(HistoryCoordinator::new(
        store.clone(),
        port.clone(),
        canonical.clone(),
    ));
    let server = McpServer::new(
        store.clone(),
        port.clone(),
        history,
        canonical,
        Tz::from_str("UTC").unwrap(),
    );
    Fixture {
        server,
        store,
        port,
        _dir: dir,
    }
}

fn request(method: &str, params: Value) -> RpcRequest {
    serde_json::from_value(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": params,
    }))
    .unwrap()
}

async fn call_tool(server: &McpServer, name: &str, arguments: Value) -> (String, bool) {
    let response = server
        .handle(request("tools/call", json!({ "name": name, "arguments": arguments })))
        .await
        .unwrap();
    let result = response.result.expect("tools/call should not be a protocol error");
    let text = result["content"][0]["text"].as_str().unwrap().to_string();
    let is_error = result["isError"].as_bool().unwrap();
    (text, is_error)
}

fn seed_chats(store: &MessageStore) {
    for (jid, name, last) in [
        ("1@g.us", "Tech Team", 300),
        ("2@g.us", "tech team", 200),
        ("3@g.us", "Support", 100),
    ] {
        store
            .save_chat(&Chat {
                jid: jid.to_string(),
                push_name: name.to_string(),
                last_message_time: last,
                is_group: true,
                ..Default::default()
            })
            .unwrap();
    }
}

fn seed_conversation(store: &MessageStore) {
    store
        .save_chat(&Chat {
            jid: MARIA.to_string(),
            push_name: "Maria".to_string(),
            last_message_time: TS + 60,
            ..Default::default()
        })
        .unwrap();
    for (id, text, ts, from_me) in [
        ("M1", "hi", TS, false),
        ("M2", "hello!", TS + 30, true),
        ("M3", "lunch tomorrow?", TS + 60, false),
    ] {
        store
            .save_message(&Message {
                id: id.to_string(),
                chat_jid: MARIA.to_string(),
                sender_jid: if from_me { OWN_JID } else { MARIA }.to_string(),
                text: text.to_string(),
                timestamp: ts,
                is_from_me: from_me,
                message_type: "text".to_string(),
            })
            .unwrap();
    }
}

#[tokio::test]
async fn initialize_advertises_capabilities() {
    let fx = fixture(true);
    let response = fx.server.handle(request("initialize", json!({}))).await.unwrap();
    let result = response.result.unwrap();
    assert_eq!(result["serverInfo"]["name"], "WhatsApp MCP");
    assert!(result["capabilities"]["tools"].is_object());
    assert!(result["capabilities"]["prompts"].is_object());
    assert!(result["capabilities"]["resources"].is_object());
}

#[tokio::test]
async fn notifications_get_no_response() {
    let fx = fixture(true);
    let notification: RpcRequest = serde_json::from_value(json!({
        "jsonrpc": "2.0",
        "method": "notifications/initialized",
    }))
    .unwrap();
    assert!(fx.server.handle(notification).await.is_none());
}

#[tokio::test]
async fn unknown_method_is_a_protocol_error() {
    let fx = fixture(true);
    let response = fx.server.handle(request("bogus/method", json!({}))).await.unwrap();
    assert_eq!(response.error.unwrap().code, -32601);
}

#[tokio::test]
async fn tools_list_names_the_fixed_set() {
    let fx = fixture(true);
    let response = fx.server.handle(request("tools/list", json!({}))).await.unwrap();
    let tools = response.result.unwrap()["tools"].as_array().unwrap().clone();
    let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
    assert_eq!(
        names,
        vec![
            "list_chats",
            "get_chat_messages",
            "search_messages",
            "find_chat",
            "send_message",
            "load_more_messages",
        ]
    );
}

#[tokio::test]
async fn find_chat_glob_is_case_sensitive_substring_is_not() {
    let fx = fixture(true);
    seed_chats(&fx.store);

    let (text, is_error) = call_tool(&fx.server, "find_chat", json!({ "search": "Tech*" })).await;
    assert!(!is_error);
    assert!(text.contains("Found 1 matching chats"));
    assert!(text.contains("Tech Team"));
    assert!(!text.contains("tech team"));

    let (text, _) = call_tool(&fx.server, "find_chat", json!({ "search": "tech" })).await;
    assert!(text.contains("Found 2 matching chats"));
}

#[tokio::test]
async fn get_chat_messages_renders_oldest_first_with_direction() {
    let fx = fixture(true);
    seed_conversation(&fx.store);

    let (text, is_error) =
        call_tool(&fx.server, "get_chat_messages", json!({ "chat_jid": MARIA })).await;
    assert!(!is_error);
    assert!(text.contains("Retrieved 3 messages"));

    let hi = text.find("hi").unwrap();
    let hello = text.find("hello!").unwrap();
    let lunch = text.find("lunch tomorrow?").unwrap();
    assert!(hi < hello && hello < lunch, "messages must be oldest first");

    assert!(text.contains("← Maria: hi"));
    assert!(text.contains("→ You: hello!"));
}

#[tokio::test]
async fn search_messages_by_sender_only() {
    let fx = fixture(true);
    seed_conversation(&fx.store);

    let (text, is_error) =
        call_tool(&fx.server, "search_messages", json!({ "from": MARIA })).await;
    assert!(!is_error);
    assert!(text.contains("Found 2 messages"));
    assert!(text.contains("hi"));
    assert!(text.contains("lunch tomorrow?"));
    assert!(!text.contains("hello!"));

    let (_, is_error) = call_tool(&fx.server, "search_messages", json!({})).await;
    assert!(is_error);
}

#[tokio::test]
async fn send_message_dispatches_and_persists() {
    let fx = fixture(true);

    let (text, is_error) = call_tool(
        &fx.server,
        "send_message",
        json!({ "chat_jid": MARIA, "text": "see you at 8" }),
    )
    .await;
    assert!(!is_error, "{text}");
    assert!(text.contains("Message sent successfully"));

    let sent = fx.port.sent_messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1, "see you at 8");

    // The outbound message is visible to subsequent reads.
    let (text, _) = call_tool(&fx.server, "get_chat_messages", json!({ "chat_jid": MARIA })).await;
    assert!(text.contains("→ You: see you at 8"));
}

#[tokio::test]
async fn send_message_requires_login() {
    let fx = fixture(false);
    let (text, is_error) = call_tool(
        &fx.server,
        "send_message",
        json!({ "chat_jid": MARIA, "text": "hi" }),
    )
    .await;
    assert!(is_error);
    assert!(text.contains("not connected"));
}

#[tokio::test]
async fn load_more_messages_needs_an_anchor() {
    let fx = fixture(true);
    let (text, is_error) = call_tool(
        &fx.server,
        "load_more_messages",
        json!({ "chat_jid": MARIA, "wait_for_sync": false }),
    )
    .await;
    assert!(is_error);
    assert!(text.contains("no messages in database"));
}

#[tokio::test]
async fn load_more_messages_async_mode_confirms_request() {
    let fx = fixture(true);
    seed_conversation(&fx.store);

    let (text, is_error) = call_tool(
        &fx.server,
        "load_more_messages",
        json!({ "chat_jid": MARIA, "count": 25, "wait_for_sync": false }),
    )
    .await;
    assert!(!is_error, "{text}");
    assert!(text.contains("History sync request sent"));
    assert_eq!(fx.port.history_requests().len(), 1);
    assert_eq!(fx.port.history_requests()[0].count, 25);
}

#[tokio::test]
async fn prompts_and_resources_are_served() {
    let fx = fixture(true);

    let response = fx.server.handle(request("prompts/list", json!({}))).await.unwrap();
    assert_eq!(
        response.result.unwrap()["prompts"].as_array().unwrap().len(),
        4
    );

    let response = fx
        .server
        .handle(request(
            "prompts/get",
            json!({ "name": "search_keyword", "arguments": { "keyword": "invoice" } }),
        ))
        .await
        .unwrap();
    let text = response.result.unwrap()["messages"][0]["content"]["text"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(text.contains("invoice"));

    let response = fx.server.handle(request("resources/list", json!({}))).await.unwrap();
    let resources = response.result.unwrap()["resources"].as_array().unwrap().clone();
    assert_eq!(resources.len(), 3);

    let uri = resources[0]["uri"].as_str().unwrap();
    let response = fx
        .server
        .handle(request("resources/read", json!({ "uri": uri })))
        .await
        .unwrap();
    assert!(response.result.unwrap()["contents"][0]["text"]
        .as_str()
        .unwrap()
        .contains("search_messages"));
}
