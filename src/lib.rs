//! Persistent single-account bridge between a WhatsApp Web session and an
//! MCP endpoint.
//!
//! The bridge ingests the linked account's complete message stream into a
//! locally searchable SQLite archive, fans messages out to registered HTTP
//! webhooks with at-least-once semantics, and serves a fixed MCP tool set
//! (list chats, read chat, cross-chat search, send, on-demand history
//! backfill). The WhatsApp Web protocol client itself is an external
//! collaborator behind [`protocol::ProtocolPort`].

pub mod app;
pub mod canonical;
pub mod config;
pub mod handlers;
pub mod history;
pub mod http;
pub mod lid_map;
pub mod mcp;
pub mod media;
pub mod paths;
pub mod protocol;
pub mod store;
pub mod types;
pub mod webhook;
