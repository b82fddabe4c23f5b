//! Backend for protected temporary inboxes.
//!
//! An email address is "protected" with a password; logging in with that
//! password lists the messages sent to the address, read live from a Gmail
//! mailbox and rendered from their MIME payloads.

pub mod api;
pub mod auth;
pub mod config;
pub mod domain;
pub mod mail;
pub mod server;
pub mod store;
