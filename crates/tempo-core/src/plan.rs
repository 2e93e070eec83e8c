//! Training plans a coach writes for a client.
//!
//! A plan holds workouts scheduled on a day of the week, and each workout
//! holds items that reference a shared exercise by name.

use crate::ids::{ClientId, CoachId, ExerciseId, PlanId, WorkoutId, WorkoutItemId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub coach_id: CoachId,
    pub client_id: ClientId,
    pub title: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPlan {
    pub title: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workout {
    pub id: WorkoutId,
    pub plan_id: PlanId,
    /// 1 (Monday) through 7.
    pub scheduled_day: u8,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWorkout {
    pub scheduled_day: u8,
    pub title: String,
}

/// Exercises are shared across plans and unique by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exercise {
    pub id: ExerciseId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutItem {
    pub id: WorkoutItemId,
    pub workout_id: WorkoutId,
    pub exercise: Exercise,
    pub sets: u32,
    pub reps: Option<u32>,
    pub rpe: Option<u8>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWorkoutItem {
    pub exercise_name: String,
    pub sets: u32,
    pub reps: Option<u32>,
    pub rpe: Option<u8>,
    pub notes: Option<String>,
}

/// A workout together with its items, in creation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutDetail {
    #[serde(flatten)]
    pub workout: Workout,
    pub items: Vec<WorkoutItem>,
}

/// A plan with its workouts ordered by scheduled day, then creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDetail {
    #[serde(flatten)]
    pub plan: Plan,
    pub workouts: Vec<WorkoutDetail>,
}

impl PlanDetail {
    /// Group items under their workouts, keeping the order each list came in.
    pub fn assemble(plan: Plan, workouts: Vec<Workout>, items: Vec<WorkoutItem>) -> Self {
        let mut details: Vec<WorkoutDetail> = workouts
            .into_iter()
            .map(|workout| WorkoutDetail { workout, items: Vec::new() })
            .collect();
        for item in items {
            if let Some(detail) = details.iter_mut().find(|d| d.workout.id == item.workout_id) {
                detail.items.push(item);
            }
        }
        Self { plan, workouts: details }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workout(plan_id: PlanId, day: u8) -> Workout {
        Workout {
            id: WorkoutId::new(),
            plan_id,
            scheduled_day: day,
            title: format!("Day {day}"),
            created_at: Utc::now(),
        }
    }

    fn item(workout_id: WorkoutId, name: &str) -> WorkoutItem {
        WorkoutItem {
            id: WorkoutItemId::new(),
            workout_id,
            exercise: Exercise { id: ExerciseId::new(), name: name.into() },
            sets: 3,
            reps: Some(8),
            rpe: None,
            notes: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_assemble_groups_items_under_workouts() {
        let plan = Plan {
            id: PlanId::new(),
            coach_id: CoachId::new(),
            client_id: ClientId::new(),
            title: "Block A".into(),
            start_date: None,
            end_date: None,
            created_at: Utc::now(),
        };
        let monday = workout(plan.id, 1);
        let thursday = workout(plan.id, 4);
        let items = vec![
            item(monday.id, "Back Squat"),
            item(thursday.id, "Bench Press"),
            item(monday.id, "Romanian Deadlift"),
            item(WorkoutId::new(), "Stray"),
        ];

        let detail = PlanDetail::assemble(plan, vec![monday, thursday], items);

        let names: Vec<Vec<&str>> = detail
            .workouts
            .iter()
            .map(|w| w.items.iter().map(|i| i.exercise.name.as_str()).collect())
            .collect();
        assert_eq!(names, vec![vec!["Back Squat", "Romanian Deadlift"], vec!["Bench Press"]]);
    }
}
