use diesel::prelude::*;
use diesel::sql_types::{BigInt, Bool, Integer, Text};

use crate::store::error::{Result, StoreError};
use crate::store::models::{Chat, GroupParticipantRow};
use crate::store::schema::{chats, group_participants};
use crate::store::{is_glob_pattern, MessageStore};

impl MessageStore {
    /// Upserts a chat. Merge policy: a non-empty name wins over an empty
    /// one, an empty name never overwrites, `last_message_time` only moves
    /// forward, and `is_group` is set once and never flipped.
    pub fn save_chat(&self, chat: &Chat) -> Result<()> {
        if chat.jid.is_empty() {
            return Err(StoreError::InvalidArgument(
                "chat JID cannot be empty".into(),
            ));
        }

        let mut conn = self.conn()?;
        diesel::sql_query(
            r#"
            INSERT INTO chats (jid, push_name, contact_name, last_message_time, unread_count, is_group)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(jid) DO UPDATE SET
                push_name = COALESCE(NULLIF(excluded.push_name, ''), chats.push_name),
                contact_name = COALESCE(NULLIF(excluded.contact_name, ''), chats.contact_name),
                last_message_time = MAX(chats.last_message_time, excluded.last_message_time),
                unread_count = excluded.unread_count
            "#,
        )
        .bind::<Text, _>(&chat.jid)
        .bind::<Text, _>(&chat.push_name)
        .bind::<Text, _>(&chat.contact_name)
        .bind::<BigInt, _>(chat.last_message_time)
        .bind::<Integer, _>(chat.unread_count)
        .bind::<Bool, _>(chat.is_group)
        .execute(&mut conn)?;
        Ok(())
    }

    pub fn get_chat_by_jid(&self, jid: &str) -> Result<Option<Chat>> {
        let mut conn = self.conn()?;
        let chat = chats::table
            .find(jid)
            .select(Chat::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(chat)
    }

    /// Recent chats, most recently active first.
    pub fn list_chats(&self, limit: i64) -> Result<Vec<Chat>> {
        let mut conn = self.conn()?;
        let rows = chats::table
            .order(chats::last_message_time.desc())
            .limit(limit)
            .select(Chat::as_select())
            .load(&mut conn)?;
        Ok(rows)
    }

    /// Pattern search over push names, contact names and JIDs. Substring
    /// (case-insensitive) by default, GLOB when the pattern contains any of
    /// `*?[`.
    pub fn search_chats(&self, pattern: &str, limit: i64) -> Result<Vec<Chat>> {
        let mut conn = self.conn()?;

        let rows = if is_glob_pattern(pattern) {
            diesel::sql_query(
                r#"
                SELECT jid, push_name, contact_name, last_message_time, unread_count, is_group
                FROM chats
                WHERE push_name GLOB ? OR contact_name GLOB ? OR jid GLOB ?
                ORDER BY last_message_time DESC
                LIMIT ?
                "#,
            )
            .bind::<Text, _>(pattern)
            .bind::<Text, _>(pattern)
            .bind::<Text, _>(pattern)
            .bind::<BigInt, _>(limit)
            .load::<Chat>(&mut conn)?
        } else {
            let like = format!("%{pattern}%");
            diesel::sql_query(
                r#"
                SELECT jid, push_name, contact_name, last_message_time, unread_count, is_group
                FROM chats
                WHERE push_name LIKE ? OR contact_name LIKE ? OR jid LIKE ?
                ORDER BY last_message_time DESC
                LIMIT ?
                "#,
            )
            .bind::<Text, _>(&like)
            .bind::<Text, _>(&like)
            .bind::<Text, _>(&like)
            .bind::<BigInt, _>(limit)
            .load::<Chat>(&mut conn)?
        };
        Ok(rows)
    }

    /// Replaces the participant snapshot of a group.
    pub fn save_group_participants(
        &self,
        group_jid: &str,
        participants: &[GroupParticipantRow],
    ) -> Result<()> {
        let mut conn = self.conn()?;
        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            diesel::delete(
                group_participants::table.filter(group_participants::group_jid.eq(group_jid)),
            )
            .execute(conn)?;
            for row in participants {
                diesel::insert_into(group_participants::table)
                    .values(row)
                    .execute(conn)?;
            }
            Ok(())
        })?;
        Ok(())
    }

    pub fn get_group_participants(&self, group_jid: &str) -> Result<Vec<GroupParticipantRow>> {
        let mut conn = self.conn()?;
        let rows = group_participants::table
            .filter(group_participants::group_jid.eq(group_jid))
            .select(GroupParticipantRow::as_select())
            .load(&mut conn)?;
        Ok(rows)
    }
}
