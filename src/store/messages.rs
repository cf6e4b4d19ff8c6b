use diesel::prelude::*;
use diesel::sql_types::{BigInt, Text};
use diesel::upsert::excluded;

use crate::store::error::Result;
use crate::store::models::{Message, MessageWithNames};
use crate::store::schema::messages;
use crate::store::{is_glob_pattern, MessageStore};

/// Filters for single-chat message reads. `before`/`after` are exclusive
/// epoch-second bounds; zero-valued fields are inactive.
#[derive(Debug, Clone, Default)]
pub struct MessageQuery {
    pub limit: i64,
    pub offset: i64,
    pub before: Option<i64>,
    pub after: Option<i64>,
    pub sender: Option<String>,
}

impl MessageQuery {
    pub fn with_limit(limit: i64) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }
}

const WITH_NAMES_SELECT: &str = r#"
SELECT m.id, m.chat_jid, m.sender_jid, m.text, m.timestamp, m.is_from_me, m.message_type,
       COALESCE(p.push_name, '') AS sender_push_name,
       COALESCE(sc.contact_name, '') AS sender_contact_name,
       COALESCE(NULLIF(c.contact_name, ''), NULLIF(c.push_name, ''), c.jid) AS chat_name
FROM messages m
JOIN chats c ON c.jid = m.chat_jid
LEFT JOIN push_names p ON p.jid = m.sender_jid
LEFT JOIN chats sc ON sc.jid = m.sender_jid
"#;

impl MessageStore {
    /// Upserts one message. The owning chat must already exist; a missing
    /// chat surfaces as an integrity violation.
    pub fn save_message(&self, msg: &Message) -> Result<()> {
        let mut conn = self.conn()?;
        Self::upsert_message(&mut conn, msg)?;
        Ok(())
    }

    /// Upserts a batch of messages inside a single transaction; all or
    /// nothing. All referenced chats must already exist.
    pub fn save_bulk(&self, batch: &[Message]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn()?;
        conn.immediate_transaction::<_, diesel::result::Error, _>(|conn| {
            for msg in batch {
                Self::upsert_message(conn, msg)?;
            }
            Ok(())
        })?;
        Ok(())
    }

    fn upsert_message(
        conn: &mut SqliteConnection,
        msg: &Message,
    ) -> std::result::Result<(), diesel::result::Error> {
        diesel::insert_into(messages::table)
            .values(msg)
            .on_conflict(messages::id)
            .do_update()
            .set((
                messages::chat_jid.eq(excluded(messages::chat_jid)),
                messages::sender_jid.eq(excluded(messages::sender_jid)),
                messages::text.eq(excluded(messages::text)),
                messages::timestamp.eq(excluded(messages::timestamp)),
                messages::is_from_me.eq(excluded(messages::is_from_me)),
                messages::message_type.eq(excluded(messages::message_type)),
            ))
            .execute(conn)?;
        Ok(())
    }

    pub fn get_message_by_id(&self, id: &str) -> Result<Option<Message>> {
        let mut conn = self.conn()?;
        let msg = messages::table
            .find(id)
            .select(Message::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(msg)
    }

    /// Messages of one chat, newest first, ties broken by id descending.
    pub fn get_chat_messages(&self, chat_jid: &str, query: &MessageQuery) -> Result<Vec<Message>> {
        let mut conn = self.conn()?;
        let mut stmt = messages::table
            .select(Message::as_select())
            .filter(messages::chat_jid.eq(chat_jid))
            .into_boxed();

        if let Some(sender) = query.sender.as_deref().filter(|s| !s.is_empty()) {
            stmt = stmt.filter(messages::sender_jid.eq(sender.to_string()));
        }
        if let Some(before) = query.before {
            stmt = stmt.filter(messages::timestamp.lt(before));
        }
        if let Some(after) = query.after {
            stmt = stmt.filter(messages::timestamp.gt(after));
        }

        let rows = stmt
            .order((messages::timestamp.desc(), messages::id.desc()))
            .limit(query.limit)
            .offset(query.offset)
            .load(&mut conn)?;
        Ok(rows)
    }

    /// Same as [`get_chat_messages`], joined with display names.
    ///
    /// [`get_chat_messages`]: MessageStore::get_chat_messages
    pub fn get_chat_messages_with_names(
        &self,
        chat_jid: &str,
        query: &MessageQuery,
    ) -> Result<Vec<MessageWithNames>> {
        let mut conn = self.conn()?;
        let sender = query.sender.clone().unwrap_or_default();
        let before = query.before.unwrap_or(0);
        let after = query.after.unwrap_or(0);

        let sql = format!(
            "{WITH_NAMES_SELECT}
             WHERE m.chat_jid = ?
               AND (? = '' OR m.sender_jid = ?)
               AND (? = 0 OR m.timestamp < ?)
               AND (? = 0 OR m.timestamp > ?)
             ORDER BY m.timestamp DESC, m.id DESC
             LIMIT ? OFFSET ?"
        );

        let rows = diesel::sql_query(sql)
            .bind::<Text, _>(chat_jid)
            .bind::<Text, _>(&sender)
            .bind::<Text, _>(&sender)
            .bind::<BigInt, _>(before)
            .bind::<BigInt, _>(before)
            .bind::<BigInt, _>(after)
            .bind::<BigInt, _>(after)
            .bind::<BigInt, _>(query.limit)
            .bind::<BigInt, _>(query.offset)
            .load::<MessageWithNames>(&mut conn)?;
        Ok(rows)
    }

    /// Cross-chat search. An empty/absent text query with a non-empty
    /// sender filter returns every message from that sender. Text matching
    /// follows the glob-vs-substring rule.
    pub fn search_messages_with_names(
        &self,
        query: Option<&str>,
        sender: Option<&str>,
        limit: i64,
    ) -> Result<Vec<MessageWithNames>> {
        let mut conn = self.conn()?;
        let raw = query.unwrap_or_default();
        let sender = sender.unwrap_or_default();

        let (op, pattern) = if is_glob_pattern(raw) {
            ("GLOB", raw.to_string())
        } else {
            ("LIKE", format!("%{raw}%"))
        };

        let sql = format!(
            "{WITH_NAMES_SELECT}
             WHERE (? = '' OR m.sender_jid = ?)
               AND (? = '' OR m.text {op} ?)
             ORDER BY m.timestamp DESC, m.id DESC
             LIMIT ?"
        );

        let rows = diesel::sql_query(sql)
            .bind::<Text, _>(sender)
            .bind::<Text, _>(sender)
            .bind::<Text, _>(raw)
            .bind::<Text, _>(&pattern)
            .bind::<BigInt, _>(limit)
            .load::<MessageWithNames>(&mut conn)?;
        Ok(rows)
    }

    /// Single enriched message, used for webhook payloads.
    pub fn get_message_with_names(&self, id: &str) -> Result<Option<MessageWithNames>> {
        let mut conn = self.conn()?;
        let sql = format!("{WITH_NAMES_SELECT} WHERE m.id = ?");
        let mut rows = diesel::sql_query(sql)
            .bind::<Text, _>(id)
            .load::<MessageWithNames>(&mut conn)?;
        Ok(rows.pop())
    }

    /// Oldest message of a chat; the anchor for history backfill.
    pub fn get_oldest_message(&self, chat_jid: &str) -> Result<Option<Message>> {
        let mut conn = self.conn()?;
        let msg = messages::table
            .filter(messages::chat_jid.eq(chat_jid))
            .order((messages::timestamp.asc(), messages::id.asc()))
            .select(Message::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(msg)
    }

    /// Messages strictly older than the given timestamp, newest first.
    pub fn get_messages_older_than(
        &self,
        chat_jid: &str,
        timestamp: i64,
        limit: i64,
    ) -> Result<Vec<MessageWithNames>> {
        let mut conn = self.conn()?;
        let sql = format!(
            "{WITH_NAMES_SELECT}
             WHERE m.chat_jid = ? AND m.timestamp < ?
             ORDER BY m.timestamp DESC, m.id DESC
             LIMIT ?"
        );
        let rows = diesel::sql_query(sql)
            .bind::<Text, _>(chat_jid)
            .bind::<BigInt, _>(timestamp)
            .bind::<BigInt, _>(limit)
            .load::<MessageWithNames>(&mut conn)?;
        Ok(rows)
    }
}
