//! Disk-backed caching proxy for tile-like origins.
//!
//! The [`cache`] module holds the coalescing cache engine; [`server`] exposes
//! it over HTTP.

pub mod cache;
pub mod config;
pub mod error;
pub mod metrics;
pub mod origin;
pub mod server;
