use chrono::Utc;
use diesel::prelude::*;

use crate::store::error::Result;
use crate::store::models::{download_status, MediaMetadata};
use crate::store::schema::media_metadata;
use crate::store::MessageStore;

impl MessageStore {
    /// Upserts a media-metadata row. The owning message must already exist.
    pub fn save_media_metadata(&self, meta: &MediaMetadata) -> Result<()> {
        let mut conn = self.conn()?;
        diesel::insert_into(media_metadata::table)
            .values(meta)
            .on_conflict(media_metadata::message_id)
            .do_update()
            .set(meta)
            .execute(&mut conn)?;
        Ok(())
    }

    pub fn get_media_metadata(&self, message_id: &str) -> Result<Option<MediaMetadata>> {
        let mut conn = self.conn()?;
        let meta = media_metadata::table
            .find(message_id)
            .select(MediaMetadata::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(meta)
    }

    /// Marks a media row downloaded, recording its relative path.
    pub fn mark_media_downloaded(&self, message_id: &str, file_path: &str) -> Result<()> {
        let mut conn = self.conn()?;
        diesel::update(media_metadata::table.find(message_id))
            .set((
                media_metadata::file_path.eq(file_path),
                media_metadata::download_status.eq(download_status::DOWNLOADED),
                media_metadata::download_timestamp.eq(Some(Utc::now().timestamp())),
                media_metadata::download_error.eq(None::<String>),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    /// Marks a media row terminally failed (`failed` or `expired`) with the
    /// accumulated error trail.
    pub fn mark_media_failed(&self, message_id: &str, status: &str, error: &str) -> Result<()> {
        let mut conn = self.conn()?;
        diesel::update(media_metadata::table.find(message_id))
            .set((
                media_metadata::download_status.eq(status),
                media_metadata::download_timestamp.eq(Some(Utc::now().timestamp())),
                media_metadata::download_error.eq(Some(error)),
            ))
            .execute(&mut conn)?;
        Ok(())
    }
}
