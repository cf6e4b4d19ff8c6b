use std::collections::HashMap;

use chrono::Utc;
use diesel::prelude::*;
use diesel::upsert::excluded;

use crate::store::error::Result;
use crate::store::models::PushNameRow;
use crate::store::schema::push_names;
use crate::store::MessageStore;

impl MessageStore {
    /// Bulk-upserts push names with `updated_at = now`. Empty names are
    /// dropped; the cache only holds authoritative values.
    pub fn save_push_names(&self, names: &HashMap<String, String>) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        let now = Utc::now().timestamp();
        let mut conn = self.conn()?;
        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            for (jid, name) in names {
                if jid.is_empty() || name.is_empty() {
                    continue;
                }
                diesel::insert_into(push_names::table)
                    .values(PushNameRow {
                        jid: jid.clone(),
                        push_name: name.clone(),
                        updated_at: now,
                    })
                    .on_conflict(push_names::jid)
                    .do_update()
                    .set((
                        push_names::push_name.eq(excluded(push_names::push_name)),
                        push_names::updated_at.eq(excluded(push_names::updated_at)),
                    ))
                    .execute(conn)?;
            }
            Ok(())
        })?;
        Ok(())
    }

    /// Push name for one JID; empty string when unknown.
    pub fn get_push_name(&self, jid: &str) -> Result<String> {
        let mut conn = self.conn()?;
        let name = push_names::table
            .find(jid)
            .select(push_names::push_name)
            .first::<String>(&mut conn)
            .optional()?;
        Ok(name.unwrap_or_default())
    }

    /// Loads the whole cache for batch processing (history sync).
    pub fn load_all_push_names(&self) -> Result<HashMap<String, String>> {
        let mut conn = self.conn()?;
        let rows: Vec<(String, String)> = push_names::table
            .select((push_names::jid, push_names::push_name))
            .load(&mut conn)?;
        Ok(rows.into_iter().collect())
    }
}
