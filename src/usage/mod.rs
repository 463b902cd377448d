pub mod pricing;
pub mod snapshot;

pub use pricing::{CostBreakdown, calculate_cost, cost_breakdown};
pub use snapshot::{DailyActivity, TokenUsage, UsageCacheSnapshot, load_snapshot};

use serde::Serialize;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

/// A model's snapshot usage with the locally calculated cost attached.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelUsageWithCost {
    #[serde(flatten)]
    pub usage: TokenUsage,
    pub calculated_cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedCostSummary {
    pub total_cost: f64,
    pub total_sessions: u64,
    pub total_messages: u64,
    pub first_session_date: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HourCount {
    pub hour: u32,
    pub count: u64,
}

/// Derived views over the usage snapshot.
///
/// Nothing is cached: every call reads the snapshot file again, so the
/// views always reflect the document as it is on disk.
#[derive(Debug, Clone)]
pub struct UsageStats {
    snapshot_path: PathBuf,
}

impl UsageStats {
    pub fn new(snapshot_path: impl Into<PathBuf>) -> Self {
        Self {
            snapshot_path: snapshot_path.into(),
        }
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    pub fn snapshot(&self) -> Option<UsageCacheSnapshot> {
        load_snapshot(&self.snapshot_path)
    }

    pub fn daily_activity(&self, days: usize) -> Vec<DailyActivity> {
        daily_activity(self.snapshot().as_ref(), days)
    }

    pub fn model_usage(&self) -> BTreeMap<String, ModelUsageWithCost> {
        model_usage(self.snapshot().as_ref())
    }

    pub fn total_stats(&self) -> DerivedCostSummary {
        total_stats(self.snapshot().as_ref())
    }

    pub fn hourly_distribution(&self) -> Vec<HourCount> {
        hourly_distribution(self.snapshot().as_ref())
    }

    pub fn cost_distribution(&self) -> CostBreakdown {
        cost_distribution(self.snapshot().as_ref())
    }
}

/// The most recent `days` entries, oldest first.
pub fn daily_activity(snapshot: Option<&UsageCacheSnapshot>, days: usize) -> Vec<DailyActivity> {
    let Some(snapshot) = snapshot else {
        return Vec::new();
    };
    let activity = &snapshot.daily_activity;
    let start = activity.len().saturating_sub(days);
    activity[start..].to_vec()
}

pub fn model_usage(snapshot: Option<&UsageCacheSnapshot>) -> BTreeMap<String, ModelUsageWithCost> {
    let Some(snapshot) = snapshot else {
        return BTreeMap::new();
    };
    snapshot
        .model_usage
        .iter()
        .map(|(model, usage)| {
            let with_cost = ModelUsageWithCost {
                usage: usage.clone(),
                calculated_cost: calculate_cost(usage, model),
            };
            (model.clone(), with_cost)
        })
        .collect()
}

/// Summary totals. The cost is always recalculated from token counts; the
/// per-model `costUSD` figures in the snapshot are not consulted.
pub fn total_stats(snapshot: Option<&UsageCacheSnapshot>) -> DerivedCostSummary {
    let Some(snapshot) = snapshot else {
        return DerivedCostSummary::default();
    };
    let total_cost = snapshot
        .model_usage
        .iter()
        .map(|(model, usage)| calculate_cost(usage, model))
        .sum();

    DerivedCostSummary {
        total_cost,
        total_sessions: snapshot.total_sessions,
        total_messages: snapshot.total_messages,
        first_session_date: snapshot.first_session_date.clone(),
    }
}

/// Observed hours in ascending order. Hours with no entry are omitted.
pub fn hourly_distribution(snapshot: Option<&UsageCacheSnapshot>) -> Vec<HourCount> {
    let Some(snapshot) = snapshot else {
        return Vec::new();
    };
    let mut hours: Vec<HourCount> = snapshot
        .hour_counts
        .iter()
        .filter_map(|(hour, count)| {
            let hour = hour.trim().parse::<u32>().ok()?;
            Some(HourCount {
                hour,
                count: *count,
            })
        })
        .collect();
    hours.sort_by_key(|entry| entry.hour);
    hours
}

/// Spend per token category, summed across all models.
pub fn cost_distribution(snapshot: Option<&UsageCacheSnapshot>) -> CostBreakdown {
    let mut total = CostBreakdown::default();
    if let Some(snapshot) = snapshot {
        for (model, usage) in &snapshot.model_usage {
            total += cost_breakdown(usage, model);
        }
    }
    total
}
