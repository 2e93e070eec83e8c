//! In-memory implementations of the storage ports.
//!
//! Each keeps the same uniqueness rules as the Postgres schema so
//! upsert and ownership behaviour can be exercised without a database.

use crate::pagination::{MAX_LIMIT, MIN_LIMIT, page_from_overfetch};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use tempo_core::checkin::{Checkin, CheckinInput, CheckinQuery, Page, Upserted};
use tempo_core::client::{Client, NewClient};
use tempo_core::ids::{CheckinId, ClientId, CoachId, ExerciseId, InsightId, PlanId, WorkoutId, WorkoutItemId};
use tempo_core::insight::{ComputedInsight, Insight};
use tempo_core::plan::{
    Exercise, NewPlan, NewWorkout, NewWorkoutItem, Plan, PlanDetail, Workout, WorkoutItem,
};
use tempo_core::ports::{CheckinStore, ClientRepository, InsightStore, PlanStore};
use tempo_core::range::DateRange;
use tempo_core::Result;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryClientRepository {
    clients: RwLock<HashMap<ClientId, Client>>,
}

impl MemoryClientRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClientRepository for MemoryClientRepository {
    async fn create(&self, coach: CoachId, client: &NewClient) -> Result<Client> {
        let created = Client {
            id: ClientId::new(),
            coach_id: coach,
            name: client.name.clone(),
            email: client.email.clone(),
            created_at: Utc::now(),
        };
        self.clients.write().await.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_owned(&self, coach: CoachId, client: ClientId) -> Result<Option<Client>> {
        Ok(self
            .clients
            .read()
            .await
            .get(&client)
            .filter(|c| c.coach_id == coach)
            .cloned())
    }

    async fn list_owned(&self, coach: CoachId) -> Result<Vec<Client>> {
        let mut owned: Vec<Client> = self
            .clients
            .read()
            .await
            .values()
            .filter(|c| c.coach_id == coach)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(owned)
    }
}

#[derive(Default)]
pub struct MemoryCheckinStore {
    checkins: RwLock<HashMap<(ClientId, NaiveDate), Checkin>>,
}

impl MemoryCheckinStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored check-ins across all clients.
    pub async fn len(&self) -> usize {
        self.checkins.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CheckinStore for MemoryCheckinStore {
    async fn upsert(&self, client: ClientId, input: &CheckinInput) -> Result<Upserted<CheckinId>> {
        let mut checkins = self.checkins.write().await;
        let now = Utc::now();

        if let Some(existing) = checkins.get_mut(&(client, input.date)) {
            for (key, value) in &input.metrics {
                existing.metrics.insert(key.clone(), value.clone());
            }
            if input.notes.is_some() {
                existing.notes = input.notes.clone();
            }
            existing.updated_at = now;
            return Ok(Upserted {
                id: existing.id,
                created: false,
            });
        }

        let checkin = Checkin {
            id: CheckinId::new(),
            client_id: client,
            date: input.date,
            metrics: input.metrics.clone(),
            notes: input.notes.clone(),
            created_at: now,
            updated_at: now,
        };
        let id = checkin.id;
        checkins.insert((client, input.date), checkin);
        Ok(Upserted { id, created: true })
    }

    async fn query(&self, query: &CheckinQuery) -> Result<Page<Checkin>> {
        let limit = query.limit.clamp(MIN_LIMIT, MAX_LIMIT);
        let mut rows: Vec<Checkin> = self
            .checkins
            .read()
            .await
            .values()
            .filter(|c| c.client_id == query.client_id)
            .filter(|c| query.range.contains(c.date))
            .filter(|c| query.cursor.is_none_or(|cursor| c.date < cursor))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
        rows.truncate(limit as usize + 1);
        Ok(page_from_overfetch(rows, limit))
    }
}

#[derive(Default)]
pub struct MemoryInsightStore {
    insights: RwLock<HashMap<(ClientId, DateRange), Insight>>,
}

impl MemoryInsightStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InsightStore for MemoryInsightStore {
    async fn upsert(&self, insight: &ComputedInsight) -> Result<Insight> {
        let mut insights = self.insights.write().await;
        let now = Utc::now();
        let stored = insights
            .entry((insight.client_id, insight.range))
            .and_modify(|existing| {
                existing.signals = insight.signals;
                existing.summary = insight.summary.clone();
                existing.updated_at = now;
            })
            .or_insert_with(|| Insight {
                id: InsightId::new(),
                client_id: insight.client_id,
                range: insight.range,
                signals: insight.signals,
                summary: insight.summary.clone(),
                created_at: now,
                updated_at: now,
            });
        Ok(stored.clone())
    }

    async fn find(&self, client: ClientId, range: DateRange) -> Result<Option<Insight>> {
        Ok(self.insights.read().await.get(&(client, range)).cloned())
    }
}

#[derive(Default)]
struct PlanTables {
    plans: HashMap<PlanId, Plan>,
    workouts: Vec<Workout>,
    items: Vec<WorkoutItem>,
    exercises: HashMap<String, ExerciseId>,
}

impl PlanTables {
    fn owned_plan(&self, coach: CoachId, plan: PlanId) -> Option<&Plan> {
        self.plans.get(&plan).filter(|p| p.coach_id == coach)
    }
}

/// Plans, workouts, items and exercises behind one lock, so adding an item
/// and upserting its exercise happen together.
#[derive(Default)]
pub struct MemoryPlanStore {
    tables: RwLock<PlanTables>,
}

impl MemoryPlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Distinct exercises recorded so far.
    pub async fn exercise_count(&self) -> usize {
        self.tables.read().await.exercises.len()
    }
}

#[async_trait]
impl PlanStore for MemoryPlanStore {
    async fn create(&self, coach: CoachId, client: ClientId, plan: &NewPlan) -> Result<Plan> {
        let created = Plan {
            id: PlanId::new(),
            coach_id: coach,
            client_id: client,
            title: plan.title.clone(),
            start_date: plan.start_date,
            end_date: plan.end_date,
            created_at: Utc::now(),
        };
        self.tables.write().await.plans.insert(created.id, created.clone());
        Ok(created)
    }

    async fn list_for_client(&self, coach: CoachId, client: ClientId) -> Result<Vec<Plan>> {
        let mut plans: Vec<Plan> = self
            .tables
            .read()
            .await
            .plans
            .values()
            .filter(|p| p.coach_id == coach && p.client_id == client)
            .cloned()
            .collect();
        plans.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(plans)
    }

    async fn find_owned(&self, coach: CoachId, plan: PlanId) -> Result<Option<PlanDetail>> {
        let tables = self.tables.read().await;
        let Some(found) = tables.owned_plan(coach, plan) else {
            return Ok(None);
        };
        let mut workouts: Vec<Workout> = tables
            .workouts
            .iter()
            .filter(|w| w.plan_id == plan)
            .cloned()
            .collect();
        // Stable sort keeps insertion order within a day.
        workouts.sort_by_key(|w| w.scheduled_day);
        let items = tables
            .items
            .iter()
            .filter(|i| workouts.iter().any(|w| w.id == i.workout_id))
            .cloned()
            .collect();
        Ok(Some(PlanDetail::assemble(found.clone(), workouts, items)))
    }

    async fn add_workout(&self, coach: CoachId, plan: PlanId, workout: &NewWorkout) -> Result<Option<Workout>> {
        let mut tables = self.tables.write().await;
        if tables.owned_plan(coach, plan).is_none() {
            return Ok(None);
        }
        let created = Workout {
            id: WorkoutId::new(),
            plan_id: plan,
            scheduled_day: workout.scheduled_day,
            title: workout.title.clone(),
            created_at: Utc::now(),
        };
        tables.workouts.push(created.clone());
        Ok(Some(created))
    }

    async fn add_item(
        &self,
        coach: CoachId,
        workout: WorkoutId,
        item: &NewWorkoutItem,
    ) -> Result<Option<WorkoutItem>> {
        let mut tables = self.tables.write().await;
        let Some(plan) = tables.workouts.iter().find(|w| w.id == workout).map(|w| w.plan_id) else {
            return Ok(None);
        };
        if tables.owned_plan(coach, plan).is_none() {
            return Ok(None);
        }
        let exercise_id = *tables
            .exercises
            .entry(item.exercise_name.clone())
            .or_insert_with(ExerciseId::new);
        let created = WorkoutItem {
            id: WorkoutItemId::new(),
            workout_id: workout,
            exercise: Exercise {
                id: exercise_id,
                name: item.exercise_name.clone(),
            },
            sets: item.sets,
            reps: item.reps,
            rpe: item.rpe,
            notes: item.notes.clone(),
            created_at: Utc::now(),
        };
        tables.items.push(created.clone());
        Ok(Some(created))
    }
}
