//! Outbound webhook fan-out: bounded queue, worker pool, retry with
//! backoff, HMAC signing and an append-only delivery audit.

pub mod api;
pub mod delivery;
pub mod manager;

pub use delivery::{sign_payload, DeliveryError};
pub use manager::{MediaReference, MessageEventData, WebhookManager, WebhookPayload};
