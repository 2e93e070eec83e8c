//! Request handlers organized by resource.

pub mod checkins;
pub mod clients;
pub mod health;
pub mod insights;
pub mod plans;
