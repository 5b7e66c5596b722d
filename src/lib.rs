//! UniConnect synchronization layer
//!
//! Real-time chat, notification fan-out and the community boards of the
//! UniConnect campus app, on top of a document store with live queries:
//! - `storage`: document store trait, queries, live queries, sled backend
//! - `identity`: the signed-in user as reported by the auth provider
//! - `sync`: chat keys, chat directory, messages, chat list, notifications
//! - `community`: profiles, activities and questions
//! - `services`: wiring of every service over one store and session
//! - `config`: environment configuration

pub mod community;
pub mod config;
pub mod identity;
pub mod services;
pub mod storage;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use config::AppConfig;
pub use services::Services;
