use super::IngestPlan;
use chrono::NaiveDate;

/// Drop days older than the retention window from the plan.
///
/// Only applies when the newest discovered day is itself within the window;
/// a sensor that stopped producing fresh logs still gets its old batch
/// ingested in full.
pub fn apply_rolling_retention(
    plan: &mut IngestPlan,
    today: NaiveDate,
    retention_days: u32,
) -> Vec<NaiveDate> {
    let Some(newest) = plan.days.iter().map(|d| d.day).max() else {
        return Vec::new();
    };

    let window = i64::from(retention_days);
    if (today - newest).num_days() > window {
        return Vec::new();
    }

    let mut dropped = Vec::new();
    plan.days.retain(|d| {
        if (today - d.day).num_days() > window {
            dropped.push(d.day);
            false
        } else {
            true
        }
    });
    dropped
}
