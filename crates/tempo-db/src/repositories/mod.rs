//! Repository implementations for PostgreSQL.

mod checkin;
mod client;
mod insight;
mod plan;

pub use checkin::PgCheckinStore;
pub use client::PgClientRepository;
pub use insight::PgInsightStore;
pub use plan::PgPlanStore;
