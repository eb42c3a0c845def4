//! nerida: chat session core. A themed HTML-fragment renderer, a
//! hierarchical realtime store with push-based listeners, per-day
//! session paths, sidebar history reconciliation, and the send/persist
//! controller that ties them to a remote chat endpoint.

pub mod api;
pub mod auth;
pub mod chat;
pub mod controller;
pub mod history;
pub mod render;
pub mod scope;
pub mod session;
pub mod store;
pub mod theme;
