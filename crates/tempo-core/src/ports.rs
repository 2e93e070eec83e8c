//! Port traits (hexagonal architecture).
//!
//! These traits define the interfaces between the core domain and external adapters.

use crate::checkin::{Checkin, CheckinInput, CheckinQuery, Page, Upserted};
use crate::client::{Client, NewClient};
use crate::ids::*;
use crate::insight::{ComputedInsight, Insight};
use crate::job::{EnqueueRequest, FailOutcome, JobDelivery, JobHandle, JobState};
use crate::plan::{NewPlan, NewWorkout, NewWorkoutItem, Plan, PlanDetail, Workout, WorkoutItem};
use crate::range::DateRange;
use crate::Result;
use async_trait::async_trait;
use std::time::Duration;

/// TTL-capable key/value store used for caches, counters and idempotency records.
///
/// All mutations of shared keys go through the atomic primitives here;
/// callers never read-modify-write.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Set a value with an expiry in seconds.
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;

    /// Set only if the key does not exist. Returns true when the value was written.
    async fn set_if_absent(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool>;

    /// Returns true when a key was removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Delete only while the key still holds `expected`.
    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool>;

    /// Atomic increment; a missing key counts from zero.
    async fn increment(&self, key: &str) -> Result<i64>;

    /// Refresh a key's expiry without touching its value.
    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool>;

    /// Remaining seconds to live. `None` when the key is missing or has no expiry.
    async fn ttl(&self, key: &str) -> Result<Option<u64>>;

    /// Liveness probe.
    async fn ping(&self) -> Result<()>;
}

/// Durable at-least-once job queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Submit a job. Submissions whose id matches an outstanding job are absorbed.
    async fn enqueue(&self, queue: &str, request: EnqueueRequest) -> Result<JobHandle>;

    /// Lease the next ready job, if any. The lease expires after `lease`
    /// unless the job is completed or failed first.
    async fn fetch(&self, queue: &str, lease: Duration) -> Result<Option<JobDelivery>>;

    /// Mark a leased job as done.
    async fn complete(&self, queue: &str, id: &JobId) -> Result<()>;

    /// Report a failed attempt; the queue decides between retry and failure.
    async fn fail(&self, queue: &str, id: &JobId, reason: &str) -> Result<FailOutcome>;

    /// Current state of a job still within retention.
    async fn state(&self, queue: &str, id: &JobId) -> Result<Option<JobState>>;
}

/// Relational store of clients and the coaches who own them.
#[async_trait]
pub trait ClientRepository: Send + Sync {
    async fn create(&self, coach: CoachId, client: &NewClient) -> Result<Client>;

    /// The client, but only if `coach` owns it.
    ///
    /// Absent and not-owned both come back as `None`.
    async fn find_owned(&self, coach: CoachId, client: ClientId) -> Result<Option<Client>>;

    async fn list_owned(&self, coach: CoachId) -> Result<Vec<Client>>;
}

/// Document store of daily check-ins.
#[async_trait]
pub trait CheckinStore: Send + Sync {
    /// Create or amend the check-in of one (client, date), merging metric keys.
    async fn upsert(&self, client: ClientId, input: &CheckinInput) -> Result<Upserted<CheckinId>>;

    /// Newest-first page, using `limit + 1` over-fetch to detect more pages.
    async fn query(&self, query: &CheckinQuery) -> Result<Page<Checkin>>;
}

/// Document store of derived insights.
#[async_trait]
pub trait InsightStore: Send + Sync {
    /// Atomic upsert keyed by (client, range).
    async fn upsert(&self, insight: &ComputedInsight) -> Result<Insight>;

    async fn find(&self, client: ClientId, range: DateRange) -> Result<Option<Insight>>;
}

/// Relational store of training plans.
///
/// Every lookup is scoped to the coach who wrote the plan; plans, workouts
/// and items belonging to anyone else read as absent.
#[async_trait]
pub trait PlanStore: Send + Sync {
    /// The caller has already checked that `coach` owns `client`.
    async fn create(&self, coach: CoachId, client: ClientId, plan: &NewPlan) -> Result<Plan>;

    /// Plans for one client, newest first.
    async fn list_for_client(&self, coach: CoachId, client: ClientId) -> Result<Vec<Plan>>;

    async fn find_owned(&self, coach: CoachId, plan: PlanId) -> Result<Option<PlanDetail>>;

    /// `None` when the plan is not `coach`'s.
    async fn add_workout(&self, coach: CoachId, plan: PlanId, workout: &NewWorkout) -> Result<Option<Workout>>;

    /// Upserts the exercise by name and appends the item in one transaction.
    /// `None` when the workout is not `coach`'s.
    async fn add_item(
        &self,
        coach: CoachId,
        workout: WorkoutId,
        item: &NewWorkoutItem,
    ) -> Result<Option<WorkoutItem>>;
}
