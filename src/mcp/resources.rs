//! Static documentation resources.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::mcp::server::RpcError;

const CROSS_CHAT_SEARCH_URI: &str = "whatsapp://guide/cross-chat-search";
const WORKFLOWS_URI: &str = "whatsapp://guide/workflows";
const JID_FORMAT_URI: &str = "whatsapp://guide/jid-format";

const CROSS_CHAT_SEARCH_GUIDE: &str = "\
# Finding Messages Across All Chats

To find every message from one person, resolve their JID with `find_chat`
and then call `search_messages` with only the `from` parameter:

```
search_messages(from=\"5511999999999@s.whatsapp.net\")
```

Omitting `query` is deliberate: with only a sender filter the search returns
that person's messages from every chat they participate in, DMs and groups
alike. Add `query` to narrow the results to specific content.
";

const WORKFLOWS_GUIDE: &str = "\
# WhatsApp MCP Workflow Guide

Standard flow:

1. `find_chat(search=...)` to resolve a chat JID. Never guess JIDs.
2. `get_chat_messages(chat_jid=...)` for one chat's history, or
   `search_messages(...)` for cross-chat search.
3. `send_message(chat_jid=..., text=...)` to reply.
4. `load_more_messages(chat_jid=...)` when older history is needed; it asks
   the primary device for messages beyond what is stored locally.

Pattern matching in `find_chat` and `search_messages`: plain text matches as
a case-insensitive substring; patterns containing `*`, `?` or `[abc]` match
as case-sensitive globs.
";

const JID_FORMAT_GUIDE: &str = "\
# WhatsApp JID Formats

- Direct chats: `<phone>@s.whatsapp.net` (e.g. `5511999999999@s.whatsapp.net`)
- Groups: `<id>@g.us`
- Newsletters: `<id>@newsletter`

Some contacts appear under an opaque `<id>@lid` identifier instead of a
phone number. The bridge collapses both forms to one canonical JID, so the
JID returned by `find_chat` is always the right one to use.
";

pub fn list_resources() -> Value {
    json!({
        "resources": [
            {
                "uri": CROSS_CHAT_SEARCH_URI,
                "name": "Finding Messages Across All Chats",
                "description": "How to find all messages from a person across all conversations",
                "mimeType": "text/markdown",
            },
            {
                "uri": WORKFLOWS_URI,
                "name": "WhatsApp MCP Workflow Guide",
                "description": "Common WhatsApp operations and the preferred tool-call sequence",
                "mimeType": "text/markdown",
            },
            {
                "uri": JID_FORMAT_URI,
                "name": "WhatsApp JID Formats",
                "description": "What the different JID suffixes mean",
                "mimeType": "text/markdown",
            },
        ]
    })
}

pub fn read_resource(params: Option<Value>) -> Result<Value, RpcError> {
    #[derive(Deserialize)]
    struct Params {
        uri: String,
    }
    let params: Params = serde_json::from_value(params.unwrap_or(Value::Null))
        .map_err(|e| RpcError::invalid_params(format!("invalid resource request: {e}")))?;

    let text = match params.uri.as_str() {
        CROSS_CHAT_SEARCH_URI => CROSS_CHAT_SEARCH_GUIDE,
        WORKFLOWS_URI => WORKFLOWS_GUIDE,
        JID_FORMAT_URI => JID_FORMAT_GUIDE,
        other => {
            return Err(RpcError::invalid_params(format!(
                "unknown resource: {other}"
            )));
        }
    };

    Ok(json!({
        "contents": [{
            "uri": params.uri,
            "mimeType": "text/markdown",
            "text": text,
        }]
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_listed_resource_is_readable() {
        let listed = list_resources();
        for resource in listed["resources"].as_array().unwrap() {
            let uri = resource["uri"].as_str().unwrap();
            let read = read_resource(Some(json!({ "uri": uri }))).unwrap();
            assert!(read["contents"][0]["text"].as_str().unwrap().len() > 50);
        }
    }
}
