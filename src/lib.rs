//! Offline-first request layer for the expense-sharing API.
//!
//! Reads are cached as they succeed and served from the cache while the API
//! is unreachable. Writes made while offline are queued durably and replayed
//! in order once connectivity returns.

pub mod api;
pub mod config;
pub mod connectivity;
pub mod logging;
pub mod offline;
pub mod store;
