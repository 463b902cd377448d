//! Shapes the per-page payloads from the usage snapshot, the message store and
//! the inspection readers.
//!
//! The snapshot and the store can disagree about cost and message totals.
//! Those two sources are reconciled here, and only here, with
//! [`prefer_non_zero`].

use crate::{
    config::{DataPaths, DisplayConfig},
    inventory::{
        projects::{self, ProjectRegistry},
        settings::{self, Permissions},
        todos::{self, TodoFile, TodoStats},
    },
    storage::{SessionSummary, StoreHandle},
    usage::{self, CostBreakdown, DailyActivity, UsageStats, snapshot::UsageCacheSnapshot},
};
use serde::Serialize;
use std::path::PathBuf;

/// Returns `primary` unless it is zero, in which case `fallback` wins.
pub fn prefer_non_zero<T: PartialEq + Default>(primary: T, fallback: T) -> T {
    if primary == T::default() {
        fallback
    } else {
        primary
    }
}

/// Compact display label for a model id, e.g. `claude-opus-4-5-20251101`
/// becomes `opus-4.5`.
pub fn short_model_name(model: &str) -> String {
    let lower = model.to_lowercase();
    for family in ["sonnet", "opus"] {
        let marker = format!("{family}-");
        let Some(pos) = lower.find(&marker) else {
            continue;
        };
        let mut parts = lower[pos + marker.len()..].split('-');
        let Some(major) = parts.next().filter(|part| is_version_number(part)) else {
            continue;
        };
        return match parts.next().filter(|part| is_version_number(part)) {
            Some(minor) => format!("{family}-{major}.{minor}"),
            None => format!("{family}-{major}"),
        };
    }

    // Otherwise the second and third dash-separated segments.
    let short = model.split('-').skip(1).take(2).collect::<Vec<_>>().join("-");
    if short.is_empty() {
        model.to_string()
    } else {
        short
    }
}

fn is_version_number(part: &str) -> bool {
    (1..=2).contains(&part.len()) && part.bytes().all(|b| b.is_ascii_digit())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelCost {
    pub model: String,
    pub full_model: String,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelUsageRow {
    pub model: String,
    pub full_model: String,
    pub cost: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read: u64,
    pub cache_write: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HourSlot {
    pub hour: u32,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardOverview {
    pub total_conversations: u64,
    pub total_messages: u64,
    pub total_cost: f64,
    pub avg_response_time: f64,
    pub total_projects: usize,
    pub total_starts: u64,
    pub todo_stats: TodoStats,
    pub daily_activity: Vec<DailyActivity>,
    pub cost_by_model: Vec<ModelCost>,
    pub cost_distribution: CostBreakdown,
    pub recent_sessions: Vec<SessionSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostOverview {
    pub total_cost: f64,
    pub total_messages: u64,
    pub first_session_date: Option<String>,
    /// Milliseconds.
    pub avg_response_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsOverview {
    pub summary: CostOverview,
    pub daily_activity: Vec<DailyActivity>,
    pub model_usage: Vec<ModelUsageRow>,
    pub hourly: Vec<HourSlot>,
}

/// Per-model spend with non-zero cost, most expensive first.
pub fn cost_by_model(snapshot: Option<&UsageCacheSnapshot>) -> Vec<ModelCost> {
    let mut rows: Vec<ModelCost> = usage::model_usage(snapshot)
        .into_iter()
        .filter(|(_, usage)| usage.calculated_cost > 0.0)
        .map(|(model, usage)| ModelCost {
            model: short_model_name(&model),
            cost: usage.calculated_cost,
            full_model: model,
        })
        .collect();
    rows.sort_by(|a, b| b.cost.total_cmp(&a.cost));
    rows
}

pub fn model_usage_rows(snapshot: Option<&UsageCacheSnapshot>) -> Vec<ModelUsageRow> {
    let mut rows: Vec<ModelUsageRow> = usage::model_usage(snapshot)
        .into_iter()
        .map(|(model, with_cost)| ModelUsageRow {
            model: short_model_name(&model),
            cost: with_cost.calculated_cost,
            input_tokens: with_cost.usage.input_tokens,
            output_tokens: with_cost.usage.output_tokens,
            cache_read: with_cost.usage.cache_read_input_tokens,
            cache_write: with_cost.usage.cache_creation_input_tokens,
            full_model: model,
        })
        .collect();
    rows.sort_by(|a, b| b.cost.total_cmp(&a.cost));
    rows
}

/// The hourly histogram padded to all 24 hours of the day.
pub fn full_day_hours(snapshot: Option<&UsageCacheSnapshot>) -> Vec<HourSlot> {
    let observed = usage::hourly_distribution(snapshot);
    (0..24)
        .map(|hour| HourSlot {
            hour,
            count: observed
                .iter()
                .find(|entry| entry.hour == hour)
                .map_or(0, |entry| entry.count),
        })
        .collect()
}

/// Everything a request needs to build a page.
#[derive(Clone)]
pub struct Dashboard {
    usage: UsageStats,
    store: StoreHandle,
    claude_json: PathBuf,
    projects_dir: PathBuf,
    todos_dir: PathBuf,
    settings_path: PathBuf,
    display: DisplayConfig,
}

impl Dashboard {
    pub fn new(paths: DataPaths, display: DisplayConfig) -> Self {
        Self {
            usage: UsageStats::new(paths.stats_path),
            store: StoreHandle::new(paths.db_path),
            claude_json: paths.claude_json,
            projects_dir: paths.projects_dir,
            todos_dir: paths.todos_dir,
            settings_path: paths.settings_path,
            display,
        }
    }

    pub fn usage(&self) -> &UsageStats {
        &self.usage
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    pub fn display(&self) -> &DisplayConfig {
        &self.display
    }

    pub fn projects(&self) -> ProjectRegistry {
        projects::load(&self.claude_json, &self.projects_dir)
    }

    pub fn todos(&self) -> Vec<TodoFile> {
        todos::load(&self.todos_dir)
    }

    pub fn permissions(&self) -> Permissions {
        settings::load_permissions(&self.settings_path)
    }

    pub async fn overview(&self) -> DashboardOverview {
        // One snapshot read per page keeps the cards consistent with each other.
        let snapshot = self.usage.snapshot();
        let snapshot = snapshot.as_ref();

        let db_stats = self.store.session_stats().await;
        let recent_sessions = self
            .store
            .recent_sessions(self.display.recent_sessions_limit)
            .await;
        let registry = self.projects();
        let todo_stats = todos::todo_stats(&self.todos());
        let totals = usage::total_stats(snapshot);

        DashboardOverview {
            total_conversations: db_stats.total_sessions,
            total_messages: db_stats.total_messages,
            total_cost: prefer_non_zero(totals.total_cost, db_stats.total_cost),
            avg_response_time: db_stats.avg_response_time,
            total_projects: registry.projects.len(),
            total_starts: registry.num_startups,
            todo_stats,
            daily_activity: usage::daily_activity(snapshot, self.display.overview_days),
            cost_by_model: cost_by_model(snapshot),
            cost_distribution: usage::cost_distribution(snapshot),
            recent_sessions,
        }
    }

    pub async fn analytics(&self) -> AnalyticsOverview {
        let snapshot = self.usage.snapshot();
        let snapshot = snapshot.as_ref();

        let db_stats = self.store.session_stats().await;
        let totals = usage::total_stats(snapshot);

        AnalyticsOverview {
            summary: CostOverview {
                total_cost: prefer_non_zero(totals.total_cost, db_stats.total_cost),
                total_messages: prefer_non_zero(totals.total_messages, db_stats.total_messages),
                first_session_date: totals.first_session_date,
                avg_response_time: db_stats.avg_response_time,
            },
            daily_activity: usage::daily_activity(snapshot, self.display.analytics_days),
            model_usage: model_usage_rows(snapshot),
            hourly: full_day_hours(snapshot),
        }
    }
}
