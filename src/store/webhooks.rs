use diesel::prelude::*;

use crate::store::error::{Result, StoreError};
use crate::store::models::{DeliveryAttempt, DeliveryStats, WebhookRegistration};
use crate::store::schema::{webhook_deliveries, webhook_registrations};
use crate::store::MessageStore;

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = webhook_registrations)]
struct WebhookRow {
    id: String,
    url: String,
    secret: String,
    event_types: String,
    active: bool,
    created_at: i64,
    updated_at: i64,
}

impl WebhookRow {
    fn from_registration(reg: &WebhookRegistration) -> Result<Self> {
        let event_types = serde_json::to_string(&reg.event_types)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(Self {
            id: reg.id.clone(),
            url: reg.url.clone(),
            secret: reg.secret.clone(),
            event_types,
            active: reg.active,
            created_at: reg.created_at,
            updated_at: reg.updated_at,
        })
    }

    fn into_registration(self) -> Result<WebhookRegistration> {
        let event_types = serde_json::from_str(&self.event_types)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(WebhookRegistration {
            id: self.id,
            url: self.url,
            secret: self.secret,
            event_types,
            active: self.active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl MessageStore {
    pub fn create_webhook(&self, reg: &WebhookRegistration) -> Result<()> {
        let row = WebhookRow::from_registration(reg)?;
        let mut conn = self.conn()?;
        diesel::insert_into(webhook_registrations::table)
            .values(&row)
            .execute(&mut conn)?;
        Ok(())
    }

    /// Creates or replaces a registration; used for the `system:primary`
    /// webhook taken from the environment.
    pub fn upsert_webhook(&self, reg: &WebhookRegistration) -> Result<()> {
        let row = WebhookRow::from_registration(reg)?;
        let mut conn = self.conn()?;
        diesel::insert_into(webhook_registrations::table)
            .values(&row)
            .on_conflict(webhook_registrations::id)
            .do_update()
            .set((
                webhook_registrations::url.eq(&row.url),
                webhook_registrations::secret.eq(&row.secret),
                webhook_registrations::event_types.eq(&row.event_types),
                webhook_registrations::active.eq(row.active),
                webhook_registrations::updated_at.eq(row.updated_at),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    pub fn get_webhook(&self, id: &str) -> Result<WebhookRegistration> {
        let mut conn = self.conn()?;
        let row = webhook_registrations::table
            .find(id)
            .select(WebhookRow::as_select())
            .first(&mut conn)
            .optional()?
            .ok_or(StoreError::NotFound)?;
        row.into_registration()
    }

    pub fn list_webhooks(&self, active_only: bool) -> Result<Vec<WebhookRegistration>> {
        let mut conn = self.conn()?;
        let mut query = webhook_registrations::table
            .select(WebhookRow::as_select())
            .into_boxed();
        if active_only {
            query = query.filter(webhook_registrations::active.eq(true));
        }
        let rows = query
            .order(webhook_registrations::created_at.desc())
            .load(&mut conn)?;
        rows.into_iter().map(WebhookRow::into_registration).collect()
    }

    pub fn update_webhook(&self, reg: &WebhookRegistration) -> Result<()> {
        let row = WebhookRow::from_registration(reg)?;
        let mut conn = self.conn()?;
        let updated = diesel::update(webhook_registrations::table.find(&row.id))
            .set((
                webhook_registrations::url.eq(&row.url),
                webhook_registrations::secret.eq(&row.secret),
                webhook_registrations::event_types.eq(&row.event_types),
                webhook_registrations::active.eq(row.active),
                webhook_registrations::updated_at.eq(row.updated_at),
            ))
            .execute(&mut conn)?;
        if updated == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    pub fn delete_webhook(&self, id: &str) -> Result<()> {
        let mut conn = self.conn()?;
        let deleted =
            diesel::delete(webhook_registrations::table.find(id)).execute(&mut conn)?;
        if deleted == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Appends one delivery attempt to the audit log.
    pub fn record_delivery(&self, attempt: &DeliveryAttempt) -> Result<()> {
        let mut conn = self.conn()?;
        diesel::insert_into(webhook_deliveries::table)
            .values(attempt)
            .execute(&mut conn)?;
        Ok(())
    }

    pub fn list_deliveries(&self, webhook_id: &str) -> Result<Vec<(String, i32, bool, Option<i32>)>> {
        let mut conn = self.conn()?;
        let rows = webhook_deliveries::table
            .filter(webhook_deliveries::webhook_id.eq(webhook_id))
            .order(webhook_deliveries::id.asc())
            .select((
                webhook_deliveries::payload_id,
                webhook_deliveries::attempt_number,
                webhook_deliveries::success,
                webhook_deliveries::status_code,
            ))
            .load(&mut conn)?;
        Ok(rows)
    }

    /// Delivery statistics for a webhook since the given timestamp.
    pub fn get_delivery_stats(&self, webhook_id: &str, since: i64) -> Result<DeliveryStats> {
        let mut conn = self.conn()?;
        let rows: Vec<(bool, i64)> = webhook_deliveries::table
            .filter(webhook_deliveries::webhook_id.eq(webhook_id))
            .filter(webhook_deliveries::attempted_at.ge(since))
            .select((webhook_deliveries::success, webhook_deliveries::attempted_at))
            .load(&mut conn)?;

        let total = rows.len() as i64;
        let successful = rows.iter().filter(|(ok, _)| *ok).count() as i64;
        let failed = total - successful;
        let success_rate = if total > 0 {
            successful as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        let last_delivery_at = rows.iter().map(|(_, at)| *at).max();
        let last_failure_at = rows
            .iter()
            .filter(|(ok, _)| !*ok)
            .map(|(_, at)| *at)
            .max();

        Ok(DeliveryStats {
            total,
            successful,
            failed,
            success_rate,
            last_delivery_at,
            last_failure_at,
        })
    }
}
