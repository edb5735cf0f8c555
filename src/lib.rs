//! Peerwatch - C2C Stablecoin Market Monitor
//!
//! Watches peer-to-peer stablecoin markets on multiple exchanges,
//! compares observed fiat prices against an FX reference rate, alerts on
//! exploitable spreads, and persists every observation with hourly and
//! daily aggregates for history queries.

pub mod adapters;
pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod monitor;
pub mod state;
