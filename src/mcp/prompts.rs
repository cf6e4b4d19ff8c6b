//! Prompt templates guiding the calling model through common workflows.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::mcp::server::RpcError;

struct PromptDef {
    name: &'static str,
    description: &'static str,
    arguments: &'static [(&'static str, &'static str, bool)],
}

const PROMPTS: &[PromptDef] = &[
    PromptDef {
        name: "search_person_messages",
        description: "Find ALL messages from a specific person across all WhatsApp chats",
        arguments: &[(
            "contact_name",
            "Name of the person whose messages you want to find",
            true,
        )],
    },
    PromptDef {
        name: "get_context_about_person",
        description: "Get comprehensive context about someone by analyzing all their messages",
        arguments: &[
            ("contact_name", "Name of the person to analyze", true),
            (
                "focus",
                "Focus area: 'recent' for recent activity only, 'all' for complete history (default: all)",
                false,
            ),
        ],
    },
    PromptDef {
        name: "analyze_conversation",
        description: "Analyze recent messages from a specific conversation",
        arguments: &[("contact_name", "Name of the contact or group", true)],
    },
    PromptDef {
        name: "search_keyword",
        description: "Search for specific text or keywords across all WhatsApp conversations",
        arguments: &[("keyword", "Text or keyword to search for", true)],
    },
];

pub fn list_prompts() -> Value {
    let prompts: Vec<Value> = PROMPTS
        .iter()
        .map(|p| {
            json!({
                "name": p.name,
                "description": p.description,
                "arguments": p.arguments.iter().map(|(name, description, required)| json!({
                    "name": name,
                    "description": description,
                    "required": required,
                })).collect::<Vec<_>>(),
            })
        })
        .collect();
    json!({ "prompts": prompts })
}

pub fn get_prompt(params: Option<Value>) -> Result<Value, RpcError> {
    #[derive(Deserialize)]
    struct Params {
        name: String,
        #[serde(default)]
        arguments: std::collections::HashMap<String, String>,
    }
    let params: Params = serde_json::from_value(params.unwrap_or(Value::Null))
        .map_err(|e| RpcError::invalid_params(format!("invalid prompt request: {e}")))?;

    let arg = |key: &str| params.arguments.get(key).cloned().unwrap_or_default();

    let (description, text) = match params.name.as_str() {
        "search_person_messages" => {
            let contact = arg("contact_name");
            (
                "Find all messages from a person",
                format!(
                    "Find every message from {contact} across all WhatsApp chats.\n\n\
                     1. Call find_chat(search=\"{contact}\") to resolve their JID.\n\
                     2. Call search_messages(from=\"<their JID>\") with NO query parameter; \
                     this returns their messages from every chat, not just the DM.\n\
                     3. Summarise what they have been talking about, most recent first."
                ),
            )
        }
        "get_context_about_person" => {
            let contact = arg("contact_name");
            let focus = params
                .arguments
                .get("focus")
                .cloned()
                .unwrap_or_else(|| "all".to_string());
            (
                "Build context about a person",
                format!(
                    "Build a picture of {contact} from their WhatsApp messages (focus: {focus}).\n\n\
                     1. find_chat(search=\"{contact}\") for the JID.\n\
                     2. search_messages(from=\"<their JID>\") for their messages everywhere.\n\
                     3. If focus is 'recent', limit yourself to the last few weeks of results.\n\
                     4. Report recurring topics, tone, open questions and anything time-sensitive."
                ),
            )
        }
        "analyze_conversation" => {
            let contact = arg("contact_name");
            (
                "Analyze one conversation",
                format!(
                    "Analyze the recent history of the conversation with {contact}.\n\n\
                     1. find_chat(search=\"{contact}\") for the chat JID.\n\
                     2. get_chat_messages(chat_jid=\"<JID>\", limit=100) for the recent history.\n\
                     3. Summarise threads of discussion, decisions made and pending follow-ups."
                ),
            )
        }
        "search_keyword" => {
            let keyword = arg("keyword");
            (
                "Search for a keyword",
                format!(
                    "Search all WhatsApp conversations for \"{keyword}\".\n\n\
                     1. search_messages(query=\"{keyword}\").\n\
                     2. For each hit, note the chat, the sender and the date.\n\
                     3. Group the findings by conversation."
                ),
            )
        }
        other => {
            return Err(RpcError::invalid_params(format!("unknown prompt: {other}")));
        }
    };

    Ok(json!({
        "description": description,
        "messages": [{
            "role": "user",
            "content": { "type": "text", "text": text },
        }],
    }))
}
