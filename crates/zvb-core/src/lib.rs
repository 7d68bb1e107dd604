//! Core domain + application logic for the ZiVPN admin bot.
//!
//! This crate is intentionally framework-agnostic. Telegram, the provisioning
//! HTTP API and systemd live behind ports (traits) so the conversation and
//! backup/restore logic can be exercised without any of them.

pub mod api;
pub mod archive;
pub mod bot;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod menu;
pub mod messaging;
pub mod restart;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};
