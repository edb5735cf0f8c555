//! Read-only HTTP query API

pub mod handlers;
pub mod server;
pub mod types;
