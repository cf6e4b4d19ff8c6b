//! Tool definitions advertised by `tools/list`.

use serde_json::{json, Value};

pub fn list_tools() -> Value {
    json!({
        "tools": [
            {
                "name": "list_chats",
                "description": "List all WhatsApp conversations (DMs and groups) ordered by most \
                    recent activity. Use find_chat instead when looking for one specific chat by \
                    name. Returns JID, name, last message time and unread count per chat.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "limit": {
                            "type": "number",
                            "description": "maximum number of chats to return (default: 50, max: 100)"
                        }
                    }
                }
            },
            {
                "name": "get_chat_messages",
                "description": "Retrieve message history from ONE specific chat, oldest first. \
                    Use search_messages with 'from' to find a person's messages across all chats. \
                    Prefer before_timestamp/after_timestamp (ISO 8601, interpreted in the server \
                    timezone) over offset for stable pagination. The optional 'from' filter \
                    restricts output to one sender within this chat.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "chat_jid": {
                            "type": "string",
                            "description": "chat JID from find_chat or list_chats; never construct JIDs manually"
                        },
                        "limit": {
                            "type": "number",
                            "description": "maximum number of messages to return (default: 50, max: 200)"
                        },
                        "offset": {
                            "type": "number",
                            "description": "number of messages to skip (default: 0; prefer timestamps)"
                        },
                        "before_timestamp": {
                            "type": "string",
                            "description": "messages before this ISO 8601 timestamp, e.g. '2024-12-31T15:04:05'"
                        },
                        "after_timestamp": {
                            "type": "string",
                            "description": "messages after this ISO 8601 timestamp"
                        },
                        "from": {
                            "type": "string",
                            "description": "sender JID filter, scoped to this chat only"
                        }
                    },
                    "required": ["chat_jid"]
                }
            },
            {
                "name": "search_messages",
                "description": "Search messages across ALL chats by text and/or sender. To get \
                    every message from one person everywhere, pass only 'from' and omit 'query'. \
                    Text matching: case-insensitive substring by default; patterns containing \
                    *, ? or [abc] are matched as case-sensitive globs.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "text to search for (supports *, ?, [abc] wildcards); omit to filter by sender only"
                        },
                        "from": {
                            "type": "string",
                            "description": "sender JID; returns all matching messages from this sender across every chat"
                        },
                        "limit": {
                            "type": "number",
                            "description": "maximum number of results (default: 50, max: 200)"
                        }
                    }
                }
            },
            {
                "name": "find_chat",
                "description": "Find chats by name or JID. Step 1 before sending or reading \
                    messages. Case-insensitive substring by default; patterns containing *, ? or \
                    [abc] are matched as case-sensitive globs. Searches contact names, push names \
                    and JIDs.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "search": {
                            "type": "string",
                            "description": "search pattern"
                        }
                    },
                    "required": ["search"]
                }
            },
            {
                "name": "send_message",
                "description": "Send a text message to a chat (DM or group). Get chat_jid from \
                    find_chat first; never construct JIDs manually. Preserve the user's exact \
                    wording.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "chat_jid": {
                            "type": "string",
                            "description": "recipient chat JID from find_chat or list_chats"
                        },
                        "text": {
                            "type": "string",
                            "description": "exact message text to send"
                        }
                    },
                    "required": ["chat_jid", "text"]
                }
            },
            {
                "name": "load_more_messages",
                "description": "Fetch additional message history for a chat from the primary \
                    device. With wait_for_sync=true (default) the call blocks until the messages \
                    arrive (typically 2-10 seconds) and returns them; with false they load in the \
                    background. Only works once the chat has at least one stored message.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "chat_jid": {
                            "type": "string",
                            "description": "chat JID to fetch history for"
                        },
                        "count": {
                            "type": "number",
                            "description": "number of messages to fetch (default: 50, max: 200)"
                        },
                        "wait_for_sync": {
                            "type": "boolean",
                            "description": "wait for the messages to arrive before returning (default: true)"
                        }
                    },
                    "required": ["chat_jid"]
                }
            }
        ]
    })
}
