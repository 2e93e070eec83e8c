//! Tempo Core
//!
//! Domain types, traits, and error handling for the Tempo coaching backend.
//! This crate has minimal dependencies and defines the shared vocabulary
//! used by the cache, queue, storage, worker and API crates.

pub mod checkin;
pub mod client;
pub mod config;
pub mod error;
pub mod ids;
pub mod insight;
pub mod job;
pub mod plan;
pub mod ports;
pub mod range;

pub use error::{Error, Result};
pub use ids::*;
pub use range::DateRange;
