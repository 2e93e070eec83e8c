//! Training plan handlers.

use axum::extract::rejection::JsonRejection;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::Response,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;
use tempo_core::ids::{PlanId, WorkoutId};
use tempo_core::plan::{NewPlan, NewWorkout, NewWorkoutItem, Plan, PlanDetail, WorkoutDetail, WorkoutItem};
use tempo_core::range::{format_date, parse_date};

use crate::auth::Actor;
use crate::error::ApiError;
use crate::handlers::clients::owned_client;
use crate::idempotency::{IdempotencyKey, Snapshot};
use crate::state::AppState;

const MAX_TITLE_LEN: usize = 200;
const MAX_ITEM_NOTES_LEN: usize = 5_000;

fn title(raw: &str, field: &str) -> Result<String, ApiError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_TITLE_LEN {
        return Err(ApiError::bad_request(format!("`{field}` must be 1-200 characters")));
    }
    Ok(trimmed.to_string())
}

fn bounded<T: TryFrom<i64>>(value: i64, field: &str, min: i64, max: i64) -> Result<T, ApiError> {
    let out_of_range = || ApiError::bad_request(format!("`{field}` must be between {min} and {max}"));
    if !(min..=max).contains(&value) {
        return Err(out_of_range());
    }
    T::try_from(value).map_err(|_| out_of_range())
}

/// Malformed ids read the same as ids that do not exist.
fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T, ApiError> {
    raw.parse().map_err(|_| ApiError::not_found(format!("{what} not found")))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePlanRequest {
    pub title: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl CreatePlanRequest {
    fn validate(self) -> Result<NewPlan, ApiError> {
        let title = title(&self.title, "title")?;
        let start_date = self.start_date.as_deref().map(parse_date).transpose()?;
        let end_date = self.end_date.as_deref().map(parse_date).transpose()?;
        if matches!((start_date, end_date), (Some(start), Some(end)) if start > end) {
            return Err(ApiError::bad_request("`startDate` must not be after `endDate`"));
        }
        Ok(NewPlan {
            title,
            start_date,
            end_date,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddWorkoutRequest {
    pub scheduled_day: i64,
    pub title: String,
}

impl AddWorkoutRequest {
    fn validate(self) -> Result<NewWorkout, ApiError> {
        Ok(NewWorkout {
            scheduled_day: bounded(self.scheduled_day, "scheduledDay", 1, 7)?,
            title: title(&self.title, "title")?,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    pub exercise_name: String,
    pub sets: i64,
    pub reps: Option<i64>,
    pub rpe: Option<i64>,
    pub notes: Option<String>,
}

impl AddItemRequest {
    fn validate(self) -> Result<NewWorkoutItem, ApiError> {
        if self.notes.as_ref().is_some_and(|n| n.len() > MAX_ITEM_NOTES_LEN) {
            return Err(ApiError::bad_request("`notes` must be at most 5000 characters"));
        }
        Ok(NewWorkoutItem {
            exercise_name: title(&self.exercise_name, "exerciseName")?,
            sets: bounded(self.sets, "sets", 1, 100)?,
            reps: self.reps.map(|r| bounded(r, "reps", 1, 500)).transpose()?,
            rpe: self.rpe.map(|r| bounded(r, "rpe", 1, 10)).transpose()?,
            notes: self.notes,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanResponse {
    pub id: String,
    pub client_id: String,
    pub title: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub created_at: String,
}

impl From<&Plan> for PlanResponse {
    fn from(plan: &Plan) -> Self {
        Self {
            id: plan.id.to_string(),
            client_id: plan.client_id.to_string(),
            title: plan.title.clone(),
            start_date: plan.start_date.map(format_date),
            end_date: plan.end_date.map(format_date),
            created_at: plan.created_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
pub struct ExerciseResponse {
    pub id: String,
    pub name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemResponse {
    pub id: String,
    pub exercise: ExerciseResponse,
    pub sets: u32,
    pub reps: Option<u32>,
    pub rpe: Option<u8>,
    pub notes: Option<String>,
    pub created_at: String,
}

impl From<WorkoutItem> for ItemResponse {
    fn from(item: WorkoutItem) -> Self {
        Self {
            id: item.id.to_string(),
            exercise: ExerciseResponse {
                id: item.exercise.id.to_string(),
                name: item.exercise.name,
            },
            sets: item.sets,
            reps: item.reps,
            rpe: item.rpe,
            notes: item.notes,
            created_at: item.created_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutResponse {
    pub id: String,
    pub scheduled_day: u8,
    pub title: String,
    pub created_at: String,
    pub items: Vec<ItemResponse>,
}

impl From<WorkoutDetail> for WorkoutResponse {
    fn from(detail: WorkoutDetail) -> Self {
        let WorkoutDetail { workout, items } = detail;
        Self {
            id: workout.id.to_string(),
            scheduled_day: workout.scheduled_day,
            title: workout.title,
            created_at: workout.created_at.to_rfc3339(),
            items: items.into_iter().map(ItemResponse::from).collect(),
        }
    }
}

#[derive(Serialize)]
pub struct PlanDetailResponse {
    #[serde(flatten)]
    pub plan: PlanResponse,
    pub workouts: Vec<WorkoutResponse>,
}

#[derive(Serialize)]
pub struct PlanEnvelope {
    pub plan: PlanDetailResponse,
}

#[derive(Serialize)]
pub struct ListPlansResponse {
    pub plans: Vec<PlanResponse>,
}

pub async fn create_plan(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    key: IdempotencyKey,
    Path(client_id): Path<String>,
    payload: Result<Json<CreatePlanRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let client = owned_client(&state, actor, &client_id).await?;

    let route = format!("POST /clients/{}/plans", client.id);
    let state = &state;
    state
        .idempotency
        .run(actor.coach_id, &route, key, move || async move {
            let Json(request) = payload?;
            let new_plan = request.validate()?;
            let plan = state.plans.create(actor.coach_id, client.id, &new_plan).await?;
            Ok(Snapshot::new(StatusCode::CREATED, json!({ "planId": plan.id })))
        })
        .await
}

pub async fn list_plans(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(client_id): Path<String>,
) -> Result<Json<ListPlansResponse>, ApiError> {
    let client = owned_client(&state, actor, &client_id).await?;
    let plans = state.plans.list_for_client(actor.coach_id, client.id).await?;
    Ok(Json(ListPlansResponse {
        plans: plans.iter().map(PlanResponse::from).collect(),
    }))
}

pub async fn get_plan(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(plan_id): Path<String>,
) -> Result<Json<PlanEnvelope>, ApiError> {
    let plan_id: PlanId = parse_id(&plan_id, "Plan")?;
    let PlanDetail { plan, workouts } = state
        .plans
        .find_owned(actor.coach_id, plan_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Plan not found"))?;

    Ok(Json(PlanEnvelope {
        plan: PlanDetailResponse {
            plan: PlanResponse::from(&plan),
            workouts: workouts.into_iter().map(WorkoutResponse::from).collect(),
        },
    }))
}

pub async fn add_workout(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    key: IdempotencyKey,
    Path(plan_id): Path<String>,
    payload: Result<Json<AddWorkoutRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let plan_id: PlanId = parse_id(&plan_id, "Plan")?;

    let route = format!("POST /plans/{plan_id}/workouts");
    let state = &state;
    state
        .idempotency
        .run(actor.coach_id, &route, key, move || async move {
            let Json(request) = payload?;
            let new_workout = request.validate()?;
            let workout = state
                .plans
                .add_workout(actor.coach_id, plan_id, &new_workout)
                .await?
                .ok_or_else(|| ApiError::not_found("Plan not found"))?;
            Ok(Snapshot::new(StatusCode::CREATED, json!({ "workoutId": workout.id })))
        })
        .await
}

pub async fn add_item(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    key: IdempotencyKey,
    Path(workout_id): Path<String>,
    payload: Result<Json<AddItemRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let workout_id: WorkoutId = parse_id(&workout_id, "Workout")?;

    let route = format!("POST /workouts/{workout_id}/items");
    let state = &state;
    state
        .idempotency
        .run(actor.coach_id, &route, key, move || async move {
            let Json(request) = payload?;
            let new_item = request.validate()?;
            let item = state
                .plans
                .add_item(actor.coach_id, workout_id, &new_item)
                .await?
                .ok_or_else(|| ApiError::not_found("Workout not found"))?;
            Ok(Snapshot::new(StatusCode::CREATED, json!({ "itemId": item.id })))
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(sets: i64, rpe: Option<i64>) -> AddItemRequest {
        AddItemRequest {
            exercise_name: " Back Squat ".into(),
            sets,
            reps: Some(5),
            rpe,
            notes: None,
        }
    }

    #[test]
    fn test_item_bounds() {
        let ok = item(5, Some(8)).validate().unwrap();
        assert_eq!(ok.exercise_name, "Back Squat");
        assert_eq!(ok.rpe, Some(8));

        assert!(item(0, None).validate().is_err());
        assert!(item(101, None).validate().is_err());
        assert!(item(5, Some(11)).validate().is_err());
    }

    #[test]
    fn test_workout_day_bounds() {
        let day = |scheduled_day| AddWorkoutRequest { scheduled_day, title: "Lower".into() };
        assert_eq!(day(7).validate().unwrap().scheduled_day, 7);
        assert!(day(0).validate().is_err());
        assert!(day(8).validate().is_err());
    }

    #[test]
    fn test_plan_dates_must_be_ordered() {
        let plan = |start: &str, end: &str| CreatePlanRequest {
            title: "Block".into(),
            start_date: Some(start.into()),
            end_date: Some(end.into()),
        };
        assert!(plan("2026-01-01", "2026-03-31").validate().is_ok());
        assert!(plan("2026-04-01", "2026-03-31").validate().is_err());
        assert!(plan("2026-02-30", "2026-03-31").validate().is_err());
    }
}
