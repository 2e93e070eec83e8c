//! Aggregate signals over check-in history.
//!
//! Pure functions: the same check-ins always produce the same signals and
//! the same summary text.

use serde_json::Value;
use tempo_core::checkin::{Checkin, Metrics};
use tempo_core::insight::InsightSignals;

/// A logical metric and the field names it may be recorded under,
/// in lookup order.
#[derive(Debug, Clone, Copy)]
pub struct MetricSpec {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
}

pub const SLEEP: MetricSpec = MetricSpec {
    name: "sleep",
    aliases: &["sleep", "sleepHours", "sleep_hours"],
};

pub const SORENESS: MetricSpec = MetricSpec {
    name: "soreness",
    aliases: &["soreness", "sorenessLevel", "soreness_level"],
};

pub const WEIGHT: MetricSpec = MetricSpec {
    name: "weight",
    aliases: &["weight", "bodyweight", "body_weight"],
};

/// Average sleep below this many hours counts as low.
pub const LOW_SLEEP_HOURS: f64 = 7.0;
/// Average soreness at or above this level counts as high.
pub const HIGH_SORENESS: f64 = 6.0;

pub const NOTHING_NOTABLE: &str = "No notable signals detected for this period.";
const RECOVERY_WARNING: &str = "Recovery warning: low average sleep with high soreness.";

/// Finite numbers, or non-blank strings that parse to one.
fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) if !s.trim().is_empty() => {
            s.trim().parse::<f64>().ok().filter(|f| f.is_finite())
        }
        _ => None,
    }
}

/// First alias that is present and numeric wins.
pub fn pick_metric(metrics: &Metrics, spec: &MetricSpec) -> Option<f64> {
    spec.aliases
        .iter()
        .filter_map(|alias| metrics.get(*alias))
        .find_map(to_number)
}

/// Mean of the values present; `None` for no values.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Newest minus oldest value, by check-in date. Needs two data points.
fn delta(checkins: &[Checkin], spec: &MetricSpec) -> Option<f64> {
    let mut points = checkins
        .iter()
        .filter_map(|c| pick_metric(&c.metrics, spec).map(|v| (c.date, v)));
    let first = points.next()?;
    let (mut oldest, mut newest, mut count) = (first, first, 1usize);
    for point in points {
        count += 1;
        if point.0 < oldest.0 {
            oldest = point;
        }
        if point.0 > newest.0 {
            newest = point;
        }
    }
    (count >= 2).then(|| newest.1 - oldest.1)
}

fn mean_of(checkins: &[Checkin], spec: &MetricSpec) -> Option<f64> {
    let values: Vec<f64> = checkins
        .iter()
        .filter_map(|c| pick_metric(&c.metrics, spec))
        .collect();
    mean(&values)
}

/// Compute signals over `checkins`, in any order.
pub fn aggregate(checkins: &[Checkin]) -> InsightSignals {
    InsightSignals {
        avg_sleep: mean_of(checkins, &SLEEP),
        avg_soreness: mean_of(checkins, &SORENESS),
        weight_delta: delta(checkins, &WEIGHT),
    }
}

/// Rule-based summary. Triggered sentences are joined with a space.
pub fn summarize(signals: &InsightSignals) -> String {
    let mut lines: Vec<String> = Vec::new();

    let low_sleep = signals.avg_sleep.is_some_and(|s| s < LOW_SLEEP_HOURS);
    let high_soreness = signals.avg_soreness.is_some_and(|s| s >= HIGH_SORENESS);
    if low_sleep && high_soreness {
        lines.push(RECOVERY_WARNING.to_string());
    }

    match signals.weight_delta {
        Some(d) if d < 0.0 => lines.push(format!("Weight trend: down {:.1} over the period.", d.abs())),
        Some(d) if d > 0.0 => lines.push(format!("Weight trend: up {d:.1} over the period.")),
        _ => {}
    }

    if lines.is_empty() {
        NOTHING_NOTABLE.to_string()
    } else {
        lines.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempo_core::ids::{CheckinId, ClientId};
    use tempo_core::range::parse_date;

    fn checkin(date: &str, metrics: Value) -> Checkin {
        Checkin {
            id: CheckinId::new(),
            client_id: ClientId::new(),
            date: parse_date(date).unwrap(),
            metrics: metrics.as_object().cloned().unwrap(),
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_recovery_warning_and_weight_down() {
        // Newest first, as the store returns them.
        let checkins = vec![
            checkin("2026-01-02", json!({"sleep": 6, "soreness": 7, "weight": 78})),
            checkin("2026-01-01", json!({"sleep": 6, "soreness": 7, "weight": 80})),
        ];
        let signals = aggregate(&checkins);
        assert_eq!(signals.avg_sleep, Some(6.0));
        assert_eq!(signals.avg_soreness, Some(7.0));
        assert_eq!(signals.weight_delta, Some(-2.0));

        let summary = summarize(&signals);
        assert!(summary.contains("Recovery warning"));
        assert!(summary.contains("down 2.0"));
        assert_eq!(
            summary,
            "Recovery warning: low average sleep with high soreness. Weight trend: down 2.0 over the period."
        );
    }

    #[test]
    fn test_delta_uses_dates_not_input_order() {
        let checkins = vec![
            checkin("2026-01-01", json!({"weight": 80})),
            checkin("2026-01-10", json!({"weight": 81.5})),
            checkin("2026-01-05", json!({"weight": 70})),
        ];
        assert_eq!(aggregate(&checkins).weight_delta, Some(1.5));
        assert_eq!(
            summarize(&aggregate(&checkins)),
            "Weight trend: up 1.5 over the period."
        );
    }

    #[test]
    fn test_absent_metrics_do_not_count() {
        let checkins = vec![
            checkin("2026-01-03", json!({"sleep": 8})),
            checkin("2026-01-02", json!({"notes": "rest day"})),
            checkin("2026-01-01", json!({"sleep": 6, "weight": 80})),
        ];
        let signals = aggregate(&checkins);
        assert_eq!(signals.avg_sleep, Some(7.0));
        assert_eq!(signals.avg_soreness, None);
        // A single weight reading has no trend.
        assert_eq!(signals.weight_delta, None);
        assert_eq!(summarize(&signals), NOTHING_NOTABLE);
    }

    #[test]
    fn test_alias_priority_and_string_values() {
        let metrics = json!({"sleep_hours": "5.5", "sleepHours": 9, "soreness_level": " 4 "});
        let metrics = metrics.as_object().unwrap();
        // Key order decides, not field order in the record.
        assert_eq!(pick_metric(metrics, &SLEEP), Some(9.0));
        assert_eq!(pick_metric(metrics, &SORENESS), Some(4.0));
        assert_eq!(pick_metric(metrics, &WEIGHT), None);
    }

    #[test]
    fn test_non_numeric_alias_falls_through() {
        let metrics = json!({"sleep": "", "sleepHours": "abc", "sleep_hours": 6.5});
        assert_eq!(pick_metric(metrics.as_object().unwrap(), &SLEEP), Some(6.5));

        let metrics = json!({"weight": true, "bodyweight": null, "body_weight": "NaN"});
        assert_eq!(pick_metric(metrics.as_object().unwrap(), &WEIGHT), None);
    }

    #[test]
    fn test_empty_history() {
        let signals = aggregate(&[]);
        assert_eq!(signals, InsightSignals::default());
        assert_eq!(summarize(&signals), NOTHING_NOTABLE);
    }

    #[test]
    fn test_thresholds_are_exclusive_and_inclusive() {
        let at_threshold = InsightSignals {
            avg_sleep: Some(7.0),
            avg_soreness: Some(6.0),
            weight_delta: Some(0.0),
        };
        assert_eq!(summarize(&at_threshold), NOTHING_NOTABLE);

        let warning = InsightSignals {
            avg_sleep: Some(6.9),
            avg_soreness: Some(6.0),
            weight_delta: None,
        };
        assert_eq!(summarize(&warning), RECOVERY_WARNING);
    }
}
