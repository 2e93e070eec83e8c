//! PostgreSQL implementation of PlanStore.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tempo_core::ids::{ClientId, CoachId, ExerciseId, PlanId, WorkoutId, WorkoutItemId};
use tempo_core::plan::{
    Exercise, NewPlan, NewWorkout, NewWorkoutItem, Plan, PlanDetail, Workout, WorkoutItem,
};
use tempo_core::ports::PlanStore;
use tempo_core::{Error, Result};

const PLAN_COLUMNS: &str = "id, coach_id, client_id, title, start_date, end_date, created_at";

pub struct PgPlanStore {
    pool: PgPool,
}

fn db_err(e: sqlx::Error) -> Error {
    Error::Database(e.to_string())
}

fn narrow<T: TryFrom<i64>>(column: &str, value: i64) -> Result<T> {
    T::try_from(value).map_err(|_| Error::Database(format!("{column} out of range: {value}")))
}

impl PgPlanStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_plan(r: &PgRow) -> Plan {
        Plan {
            id: PlanId::from_uuid(r.get::<uuid::Uuid, _>("id")),
            coach_id: CoachId::from_uuid(r.get::<uuid::Uuid, _>("coach_id")),
            client_id: ClientId::from_uuid(r.get::<uuid::Uuid, _>("client_id")),
            title: r.get("title"),
            start_date: r.get("start_date"),
            end_date: r.get("end_date"),
            created_at: r.get("created_at"),
        }
    }

    fn row_to_workout(r: &PgRow) -> Result<Workout> {
        Ok(Workout {
            id: WorkoutId::from_uuid(r.get::<uuid::Uuid, _>("id")),
            plan_id: PlanId::from_uuid(r.get::<uuid::Uuid, _>("plan_id")),
            scheduled_day: narrow("scheduled_day", r.get::<i16, _>("scheduled_day").into())?,
            title: r.get("title"),
            created_at: r.get("created_at"),
        })
    }

    fn row_to_item(r: &PgRow) -> Result<WorkoutItem> {
        Ok(WorkoutItem {
            id: WorkoutItemId::from_uuid(r.get::<uuid::Uuid, _>("id")),
            workout_id: WorkoutId::from_uuid(r.get::<uuid::Uuid, _>("workout_id")),
            exercise: Exercise {
                id: ExerciseId::from_uuid(r.get::<uuid::Uuid, _>("exercise_id")),
                name: r.get("exercise_name"),
            },
            sets: narrow("sets", r.get::<i32, _>("sets").into())?,
            reps: r
                .get::<Option<i32>, _>("reps")
                .map(|v| narrow("reps", v.into()))
                .transpose()?,
            rpe: r
                .get::<Option<i16>, _>("rpe")
                .map(|v| narrow("rpe", v.into()))
                .transpose()?,
            notes: r.get("notes"),
            created_at: r.get("created_at"),
        })
    }
}

#[async_trait]
impl PlanStore for PgPlanStore {
    async fn create(&self, coach: CoachId, client: ClientId, plan: &NewPlan) -> Result<Plan> {
        let row = sqlx::query(&format!(
            r#"INSERT INTO plans (id, coach_id, client_id, title, start_date, end_date)
               VALUES ($1, $2, $3, $4, $5, $6)
               RETURNING {PLAN_COLUMNS}"#
        ))
        .bind(PlanId::new().as_uuid())
        .bind(coach.as_uuid())
        .bind(client.as_uuid())
        .bind(&plan.title)
        .bind(plan.start_date)
        .bind(plan.end_date)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(Self::row_to_plan(&row))
    }

    async fn list_for_client(&self, coach: CoachId, client: ClientId) -> Result<Vec<Plan>> {
        let rows = sqlx::query(&format!(
            "SELECT {PLAN_COLUMNS} FROM plans WHERE client_id = $1 AND coach_id = $2 ORDER BY created_at DESC, id DESC"
        ))
        .bind(client.as_uuid())
        .bind(coach.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.iter().map(Self::row_to_plan).collect())
    }

    async fn find_owned(&self, coach: CoachId, plan: PlanId) -> Result<Option<PlanDetail>> {
        let Some(row) = sqlx::query(&format!(
            "SELECT {PLAN_COLUMNS} FROM plans WHERE id = $1 AND coach_id = $2"
        ))
        .bind(plan.as_uuid())
        .bind(coach.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        else {
            return Ok(None);
        };

        let workouts = sqlx::query(
            r#"SELECT id, plan_id, scheduled_day, title, created_at
               FROM workouts
               WHERE plan_id = $1
               ORDER BY scheduled_day ASC, created_at ASC, id ASC"#,
        )
        .bind(plan.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?
        .iter()
        .map(Self::row_to_workout)
        .collect::<Result<Vec<_>>>()?;

        let items = sqlx::query(
            r#"SELECT wi.id, wi.workout_id, wi.exercise_id, e.name AS exercise_name,
                      wi.sets, wi.reps, wi.rpe, wi.notes, wi.created_at
               FROM workout_items wi
               JOIN workouts w ON w.id = wi.workout_id
               JOIN exercises e ON e.id = wi.exercise_id
               WHERE w.plan_id = $1
               ORDER BY wi.created_at ASC, wi.id ASC"#,
        )
        .bind(plan.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?
        .iter()
        .map(Self::row_to_item)
        .collect::<Result<Vec<_>>>()?;

        Ok(Some(PlanDetail::assemble(Self::row_to_plan(&row), workouts, items)))
    }

    async fn add_workout(&self, coach: CoachId, plan: PlanId, workout: &NewWorkout) -> Result<Option<Workout>> {
        // Inserts nothing unless the plan belongs to the coach.
        let row = sqlx::query(
            r#"INSERT INTO workouts (id, plan_id, scheduled_day, title)
               SELECT $1, p.id, $3, $4 FROM plans p WHERE p.id = $2 AND p.coach_id = $5
               RETURNING id, plan_id, scheduled_day, title, created_at"#,
        )
        .bind(WorkoutId::new().as_uuid())
        .bind(plan.as_uuid())
        .bind(i16::from(workout.scheduled_day))
        .bind(&workout.title)
        .bind(coach.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(Self::row_to_workout).transpose()
    }

    async fn add_item(
        &self,
        coach: CoachId,
        workout: WorkoutId,
        item: &NewWorkoutItem,
    ) -> Result<Option<WorkoutItem>> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let owned = sqlx::query(
            r#"SELECT 1 FROM workouts w JOIN plans p ON p.id = w.plan_id
               WHERE w.id = $1 AND p.coach_id = $2"#,
        )
        .bind(workout.as_uuid())
        .bind(coach.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;
        if owned.is_none() {
            return Ok(None);
        }

        // The no-op update makes RETURNING yield the existing row on conflict.
        let exercise = sqlx::query(
            r#"INSERT INTO exercises (id, name) VALUES ($1, $2)
               ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
               RETURNING id"#,
        )
        .bind(ExerciseId::new().as_uuid())
        .bind(&item.exercise_name)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;
        let exercise_id = ExerciseId::from_uuid(exercise.get::<uuid::Uuid, _>("id"));

        let row = sqlx::query(
            r#"INSERT INTO workout_items (id, workout_id, exercise_id, sets, reps, rpe, notes)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING id, workout_id, exercise_id, $8::text AS exercise_name,
                         sets, reps, rpe, notes, created_at"#,
        )
        .bind(WorkoutItemId::new().as_uuid())
        .bind(workout.as_uuid())
        .bind(exercise_id.as_uuid())
        .bind(narrow::<i32>("sets", item.sets.into())?)
        .bind(item.reps.map(|v| narrow::<i32>("reps", v.into())).transpose()?)
        .bind(item.rpe.map(i16::from))
        .bind(&item.notes)
        .bind(&item.exercise_name)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Self::row_to_item(&row).map(Some)
    }
}
