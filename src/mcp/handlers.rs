//! Tool implementations and output formatting.

use std::fmt::Write as _;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone};
use serde::Deserialize;
use serde_json::Value;

use crate::mcp::server::McpServer;
use crate::store::messages::MessageQuery;
use crate::store::models::{Chat, Message, MessageWithNames};
use crate::types::jid::Jid;

const DEFAULT_LIMIT: i64 = 50;
const MAX_CHAT_LIMIT: i64 = 100;
const MAX_MESSAGE_LIMIT: i64 = 200;

fn parse_args<T: for<'de> Deserialize<'de>>(args: Value) -> Result<T, String> {
    serde_json::from_value(args).map_err(|e| format!("invalid arguments: {e}"))
}

fn clamp_limit(limit: Option<f64>, max: i64) -> i64 {
    let limit = limit.map(|l| l as i64).unwrap_or(DEFAULT_LIMIT);
    limit.clamp(1, max)
}

impl McpServer {
    fn format_date_time(&self, ts: i64) -> String {
        DateTime::from_timestamp(ts, 0)
            .unwrap_or_default()
            .with_timezone(&self.timezone)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    }

    fn format_time(&self, ts: i64) -> String {
        DateTime::from_timestamp(ts, 0)
            .unwrap_or_default()
            .with_timezone(&self.timezone)
            .format("%H:%M:%S")
            .to_string()
    }

    /// Parses an ISO 8601 timestamp (`2024-12-31T15:04:05` or bare date) in
    /// the configured display timezone.
    fn parse_timestamp(&self, raw: &str) -> Result<i64, String> {
        let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
            .or_else(|_| {
                NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .map(|d| d.and_hms_opt(0, 0, 0).unwrap_or_default())
            })
            .map_err(|_| format!("invalid timestamp '{raw}', expected ISO 8601"))?;
        self.timezone
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.timestamp())
            .ok_or_else(|| format!("timestamp '{raw}' does not exist in the configured timezone"))
    }

    fn format_chat_line(&self, out: &mut String, index: usize, chat: &Chat, with_time: bool) {
        let chat_type = if chat.is_group { "Group" } else { "DM" };
        let _ = writeln!(out, "{}. [{}] {}", index + 1, chat_type, chat.display_name());
        let _ = writeln!(out, "   JID: {}", chat.jid);
        if !chat.contact_name.is_empty()
            && !chat.push_name.is_empty()
            && chat.contact_name != chat.push_name
        {
            let _ = writeln!(
                out,
                "   (Contact: {}, Push: {})",
                chat.contact_name, chat.push_name
            );
        }
        if with_time {
            let _ = writeln!(
                out,
                "   Last message: {}",
                self.format_date_time(chat.last_message_time)
            );
            if chat.unread_count > 0 {
                let _ = writeln!(out, "   Unread: {}", chat.unread_count);
            }
        }
        out.push('\n');
    }

    /// Renders messages oldest-first with direction arrows and resolved
    /// sender names; the local user is labelled `You`.
    fn format_messages_oldest_first(&self, out: &mut String, messages: &[MessageWithNames]) {
        for msg in messages.iter().rev() {
            let (direction, sender) = if msg.is_from_me {
                ("→", "You")
            } else {
                ("←", msg.sender_display_name())
            };
            let _ = writeln!(
                out,
                "[{}] {} {}: {}",
                self.format_time(msg.timestamp),
                direction,
                sender,
                msg.text
            );
        }
    }

    pub(super) async fn tool_list_chats(&self, args: Value) -> Result<String, String> {
        #[derive(Deserialize)]
        struct Args {
            limit: Option<f64>,
        }
        let args: Args = parse_args(args)?;
        let limit = clamp_limit(args.limit, MAX_CHAT_LIMIT);

        let chats = self
            .store
            .list_chats(limit)
            .map_err(|e| format!("failed to list chats: {e}"))?;

        let mut out = format!("Found {} chats:\n\n", chats.len());
        for (i, chat) in chats.iter().enumerate() {
            self.format_chat_line(&mut out, i, chat, true);
        }
        Ok(out)
    }

    pub(super) async fn tool_get_chat_messages(&self, args: Value) -> Result<String, String> {
        #[derive(Deserialize)]
        struct Args {
            chat_jid: String,
            limit: Option<f64>,
            offset: Option<f64>,
            before_timestamp: Option<String>,
            after_timestamp: Option<String>,
            from: Option<String>,
        }
        let args: Args = parse_args(args)?;
        if args.chat_jid.is_empty() {
            return Err("chat_jid parameter is required".into());
        }

        let chat_jid = self
            .canonical
            .canonicalise_str(&args.chat_jid)
            .await
            .map_err(|e| e.to_string())?;

        let query = MessageQuery {
            limit: clamp_limit(args.limit, MAX_MESSAGE_LIMIT),
            offset: args.offset.map(|o| o as i64).unwrap_or(0).max(0),
            before: args
                .before_timestamp
                .as_deref()
                .map(|raw| self.parse_timestamp(raw))
                .transpose()?,
            after: args
                .after_timestamp
                .as_deref()
                .map(|raw| self.parse_timestamp(raw))
                .transpose()?,
            sender: args.from,
        };

        let messages = self
            .store
            .get_chat_messages_with_names(&chat_jid, &query)
            .map_err(|e| format!("failed to get messages: {e}"))?;

        let mut out = format!(
            "Retrieved {} messages from chat {}:\n\n",
            messages.len(),
            chat_jid
        );
        self.format_messages_oldest_first(&mut out, &messages);
        Ok(out)
    }

    pub(super) async fn tool_search_messages(&self, args: Value) -> Result<String, String> {
        #[derive(Deserialize)]
        struct Args {
            query: Option<String>,
            from: Option<String>,
            limit: Option<f64>,
        }
        let args: Args = parse_args(args)?;

        let query = args.query.as_deref().filter(|q| !q.is_empty());
        let from = args.from.as_deref().filter(|f| !f.is_empty());
        if query.is_none() && from.is_none() {
            return Err("provide a query, a from sender, or both".into());
        }
        let limit = clamp_limit(args.limit, MAX_MESSAGE_LIMIT);

        let messages = self
            .store
            .search_messages_with_names(query, from, limit)
            .map_err(|e| format!("search failed: {e}"))?;

        let described = match (query, from) {
            (Some(q), Some(f)) => format!("matching '{q}' from {f}"),
            (Some(q), None) => format!("matching '{q}'"),
            (None, Some(f)) => format!("from {f}"),
            (None, None) => unreachable!(),
        };
        let mut out = format!("Found {} messages {described}:\n\n", messages.len());
        for (i, msg) in messages.iter().enumerate() {
            let sender = if msg.is_from_me {
                "You"
            } else {
                msg.sender_display_name()
            };
            let _ = writeln!(
                out,
                "{}. [{}] {} in chat {}:",
                i + 1,
                self.format_date_time(msg.timestamp),
                sender,
                msg.chat_jid
            );
            let _ = writeln!(out, "   {}\n", msg.text);
        }
        Ok(out)
    }

    pub(super) async fn tool_find_chat(&self, args: Value) -> Result<String, String> {
        #[derive(Deserialize)]
        struct Args {
            search: String,
        }
        let args: Args = parse_args(args)?;
        if args.search.is_empty() {
            return Err("search parameter is required".into());
        }

        let chats = self
            .store
            .search_chats(&args.search, 100)
            .map_err(|e| format!("failed to search chats: {e}"))?;

        let mut out = format!("Found {} matching chats:\n\n", chats.len());
        for (i, chat) in chats.iter().enumerate() {
            self.format_chat_line(&mut out, i, chat, false);
        }
        Ok(out)
    }

    pub(super) async fn tool_send_message(&self, args: Value) -> Result<String, String> {
        #[derive(Deserialize)]
        struct Args {
            chat_jid: String,
            text: String,
        }
        let args: Args = parse_args(args)?;
        if args.chat_jid.is_empty() {
            return Err("chat_jid parameter is required".into());
        }
        if args.text.is_empty() {
            return Err("text parameter is required".into());
        }
        if !self.port.is_logged_in() {
            return Err("WhatsApp is not connected".into());
        }

        let target: Jid = args
            .chat_jid
            .parse()
            .map_err(|e| format!("invalid chat JID: {e}"))?;

        let response = self
            .port
            .send_text(&target, &args.text)
            .await
            .map_err(|e| format!("failed to send message: {e}"))?;

        // Persist the outbound message so subsequent reads include it.
        let chat_jid = self.canonical.canonicalise(&target).await;
        let sender_jid = self.canonical.canonicalise(&response.sender).await;
        let chat = Chat {
            jid: chat_jid.clone(),
            push_name: String::new(),
            contact_name: String::new(),
            last_message_time: response.timestamp,
            unread_count: 0,
            is_group: target.is_group(),
        };
        self.store
            .save_chat(&chat)
            .map_err(|e| format!("message sent but not persisted: {e}"))?;
        self.store
            .save_message(&Message {
                id: response.id,
                chat_jid: chat_jid.clone(),
                sender_jid,
                text: args.text,
                timestamp: response.timestamp,
                is_from_me: true,
                message_type: "text".to_string(),
            })
            .map_err(|e| format!("message sent but not persisted: {e}"))?;

        Ok(format!("Message sent successfully to {chat_jid}"))
    }

    pub(super) async fn tool_load_more_messages(&self, args: Value) -> Result<String, String> {
        #[derive(Deserialize)]
        struct Args {
            chat_jid: String,
            count: Option<f64>,
            wait_for_sync: Option<bool>,
        }
        let args: Args = parse_args(args)?;
        if args.chat_jid.is_empty() {
            return Err("chat_jid parameter is required".into());
        }
        if !self.port.is_logged_in() {
            return Err("WhatsApp is not connected".into());
        }

        let count = clamp_limit(args.count, MAX_MESSAGE_LIMIT) as u32;
        let wait = args.wait_for_sync.unwrap_or(true);

        let messages = self
            .history
            .request_history_sync(&args.chat_jid, count, wait)
            .await
            .map_err(|e| format!("failed to load messages: {e}"))?;

        if !wait {
            return Ok(format!(
                "History sync request sent for chat {} ({count} messages). Messages will load in \
                 the background. Use get_chat_messages to see them once loaded.",
                args.chat_jid
            ));
        }

        let mut out = format!(
            "Loaded {} additional messages from chat {}:\n\n",
            messages.len(),
            args.chat_jid
        );
        self.format_messages_oldest_first(&mut out, &messages);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::sync::Arc;

    use chrono_tz::Tz;

    use super::*;
    use crate::canonical::Canonicaliser;
    use crate::history::HistoryCoordinator;
    use crate::protocol::InProcessPort;
    use crate::store::MessageStore;

    fn test_server(tz: &str) -> (McpServer, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            MessageStore::open(dir.path().join("t.db").to_str().unwrap()).unwrap(),
        );
        let port = Arc::new(InProcessPort::disconnected());
        let canonical = Canonicaliser::new(port.clone());
        let history = Arc::new(HistoryCoordinator::new(
            store.clone(),
            port.clone(),
            canonical.clone(),
        ));
        let server = McpServer::new(
            store,
            port,
            history,
            canonical,
            Tz::from_str(tz).unwrap(),
        );
        (server, dir)
    }

    #[test]
    fn timestamps_render_in_configured_timezone() {
        let (server, _dir) = test_server("America/Sao_Paulo");
        // 2024-12-31T10:00:00Z is 07:00 in São Paulo (UTC-3).
        assert_eq!(
            server.format_date_time(1_735_639_200),
            "2024-12-31 07:00:00"
        );
        assert_eq!(server.format_time(1_735_639_200), "07:00:00");
    }

    #[test]
    fn timestamp_parsing_accepts_datetime_and_date() {
        let (server, _dir) = test_server("UTC");
        assert_eq!(
            server.parse_timestamp("2024-12-31T10:00:00").unwrap(),
            1_735_639_200
        );
        assert_eq!(
            server.parse_timestamp("2024-12-31").unwrap(),
            1_735_603_200
        );
        assert!(server.parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn limits_are_clamped() {
        assert_eq!(clamp_limit(None, MAX_CHAT_LIMIT), 50);
        assert_eq!(clamp_limit(Some(1000.0), MAX_CHAT_LIMIT), 100);
        assert_eq!(clamp_limit(Some(1000.0), MAX_MESSAGE_LIMIT), 200);
        assert_eq!(clamp_limit(Some(0.0), MAX_MESSAGE_LIMIT), 1);
    }
}
