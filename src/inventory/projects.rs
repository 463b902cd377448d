use super::{
    absorb, bool_field, count_field, modified_at, number_field, read_json, string_list,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

/// Per-project settings and counters as recorded in `~/.claude.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    pub allowed_tools: Vec<String>,
    pub mcp_context_uris: Vec<String>,
    pub mcp_servers: BTreeMap<String, Value>,
    pub enabled_mcpjson_servers: Vec<String>,
    pub disabled_mcpjson_servers: Vec<String>,
    pub has_trust_dialog_accepted: bool,
    pub project_onboarding_seen_count: u64,
    pub has_claude_md_external_includes_approved: bool,
    pub has_claude_md_external_includes_warning_shown: bool,
    pub ignore_patterns: Vec<String>,
    pub last_total_web_search_requests: u64,
    pub last_cost: f64,
    #[serde(rename = "lastAPIDuration")]
    pub last_api_duration: f64,
}

impl ProjectConfig {
    /// Reads each setting on its own, so one odd value cannot zero the cost
    /// figures the project list is sorted by.
    fn from_value(value: &Value) -> Self {
        Self {
            allowed_tools: string_list(value, "allowedTools"),
            mcp_context_uris: string_list(value, "mcpContextUris"),
            mcp_servers: value
                .get("mcpServers")
                .and_then(Value::as_object)
                .map(|servers| {
                    servers
                        .iter()
                        .map(|(name, server)| (name.clone(), server.clone()))
                        .collect()
                })
                .unwrap_or_default(),
            enabled_mcpjson_servers: string_list(value, "enabledMcpjsonServers"),
            disabled_mcpjson_servers: string_list(value, "disabledMcpjsonServers"),
            has_trust_dialog_accepted: bool_field(value, "hasTrustDialogAccepted"),
            project_onboarding_seen_count: count_field(value, "projectOnboardingSeenCount"),
            has_claude_md_external_includes_approved: bool_field(
                value,
                "hasClaudeMdExternalIncludesApproved",
            ),
            has_claude_md_external_includes_warning_shown: bool_field(
                value,
                "hasClaudeMdExternalIncludesWarningShown",
            ),
            ignore_patterns: string_list(value, "ignorePatterns"),
            last_total_web_search_requests: count_field(value, "lastTotalWebSearchRequests"),
            last_cost: number_field(value, "lastCost"),
            last_api_duration: number_field(value, "lastAPIDuration"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub path: String,
    pub name: String,
    pub config: ProjectConfig,
    pub last_used: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStats {
    pub total_projects: usize,
    pub total_cost: f64,
    pub total_duration: f64,
    pub avg_cost_per_project: f64,
}

/// The project list plus the global counters stored alongside it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRegistry {
    /// Sorted by `last_cost`, most expensive first.
    pub projects: Vec<Project>,
    pub num_startups: u64,
}

impl ProjectRegistry {
    pub fn project_stats(&self) -> ProjectStats {
        let total_cost: f64 = self.projects.iter().map(|p| p.config.last_cost).sum();
        let total_duration: f64 = self
            .projects
            .iter()
            .map(|p| p.config.last_api_duration)
            .sum();
        let total_projects = self.projects.len();
        let avg_cost_per_project = if total_projects > 0 {
            total_cost / total_projects as f64
        } else {
            0.0
        };

        ProjectStats {
            total_projects,
            total_cost,
            total_duration,
            avg_cost_per_project,
        }
    }

    pub fn project_by_path(&self, path: &str) -> Option<&Project> {
        self.projects.iter().find(|project| project.path == path)
    }
}

/// Loads the project registry from `claude_json`, stamping each project with
/// the newest file time found under `projects_dir`.
pub fn load(claude_json: &Path, projects_dir: &Path) -> ProjectRegistry {
    let Some(root) = absorb("projects registry", read_json(claude_json)) else {
        return ProjectRegistry::default();
    };

    let num_startups = count_field(&root, "numStartups");

    let mut projects: Vec<Project> = root
        .get("projects")
        .and_then(Value::as_object)
        .map(|entries| {
            entries
                .iter()
                .filter(|(_, config)| config.is_object())
                .map(|(path, config)| Project {
                    path: path.clone(),
                    name: project_name(path),
                    config: ProjectConfig::from_value(config),
                    last_used: last_used(projects_dir, path),
                })
                .collect()
        })
        .unwrap_or_default();

    projects.sort_by(|a, b| b.config.last_cost.total_cmp(&a.config.last_cost));

    ProjectRegistry {
        projects,
        num_startups,
    }
}

fn project_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(path)
        .to_string()
}

/// Transcript directories are named after the project path with every `/`
/// replaced by `-`.
pub fn transcript_dir(projects_dir: &Path, project_path: &str) -> PathBuf {
    projects_dir.join(project_path.replace('/', "-"))
}

fn last_used(projects_dir: &Path, project_path: &str) -> Option<DateTime<Utc>> {
    let dir = transcript_dir(projects_dir, project_path);
    let entries = fs::read_dir(&dir).ok()?;
    entries
        .filter_map(Result::ok)
        .filter_map(|entry| modified_at(&entry.path()))
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_registry(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join(".claude.json");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn projects_sort_by_last_cost_and_carry_names() {
        let dir = TempDir::new().unwrap();
        let registry_path = write_registry(
            &dir,
            r#"{
                "numStartups": 42,
                "projects": {
                    "/home/dev/cheap": { "lastCost": 0.5, "lastAPIDuration": 1000 },
                    "/home/dev/pricey": { "lastCost": 7.25, "allowedTools": ["Bash"], "hasTrustDialogAccepted": true },
                    "/home/dev/broken": null
                }
            }"#,
        );

        let registry = load(&registry_path, &dir.path().join("projects"));
        assert_eq!(registry.num_startups, 42);
        assert_eq!(registry.projects.len(), 2);
        assert_eq!(registry.projects[0].name, "pricey");
        assert_eq!(registry.projects[0].config.allowed_tools, vec!["Bash"]);
        assert!(registry.projects[0].config.has_trust_dialog_accepted);
        assert_eq!(registry.projects[1].config.last_api_duration, 1000.0);
        assert!(registry.projects[1].last_used.is_none());
    }

    #[test]
    fn stats_average_over_projects() {
        let dir = TempDir::new().unwrap();
        let registry_path = write_registry(
            &dir,
            r#"{"projects": {
                "/a": { "lastCost": 1.0, "lastAPIDuration": 10 },
                "/b": { "lastCost": 3.0, "lastAPIDuration": 30 }
            }}"#,
        );

        let stats = load(&registry_path, dir.path()).project_stats();
        assert_eq!(stats.total_projects, 2);
        assert_eq!(stats.total_cost, 4.0);
        assert_eq!(stats.total_duration, 40.0);
        assert_eq!(stats.avg_cost_per_project, 2.0);

        assert_eq!(ProjectRegistry::default().project_stats(), ProjectStats::default());
    }

    #[test]
    fn last_used_reads_transcript_directory() {
        let dir = TempDir::new().unwrap();
        let projects_dir = dir.path().join("projects");
        let transcripts = transcript_dir(&projects_dir, "/home/dev/app");
        fs::create_dir_all(&transcripts).unwrap();
        fs::write(transcripts.join("session.jsonl"), "{}\n").unwrap();
        assert!(transcripts.ends_with("-home-dev-app"));

        let registry_path = write_registry(&dir, r#"{"projects": {"/home/dev/app": {}}}"#);
        let registry = load(&registry_path, &projects_dir);

        let project = registry.project_by_path("/home/dev/app").unwrap();
        assert!(project.last_used.is_some());
        assert!(registry.project_by_path("/elsewhere").is_none());
    }

    #[test]
    fn unrelated_mistyped_field_keeps_cost_and_order() {
        let dir = TempDir::new().unwrap();
        let registry_path = write_registry(
            &dir,
            r#"{"projects": {
                "/a": {"lastCost": 5.0, "projectOnboardingSeenCount": 1.5, "allowedTools": "Bash"},
                "/b": {"lastCost": 1.0, "lastAPIDuration": "slow"}
            }}"#,
        );

        let registry = load(&registry_path, dir.path());
        let order: Vec<(&str, f64)> = registry
            .projects
            .iter()
            .map(|p| (p.path.as_str(), p.config.last_cost))
            .collect();
        assert_eq!(order, vec![("/a", 5.0), ("/b", 1.0)]);
        assert_eq!(registry.projects[0].config.project_onboarding_seen_count, 1);
        assert!(registry.projects[0].config.allowed_tools.is_empty());
        assert_eq!(registry.projects[1].config.last_api_duration, 0.0);

        let stats = registry.project_stats();
        assert_eq!(stats.total_cost, 6.0);
        assert_eq!(stats.avg_cost_per_project, 3.0);
    }

    #[test]
    fn absent_or_corrupt_registry_is_empty() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            load(&dir.path().join("missing.json"), dir.path()),
            ProjectRegistry::default()
        );

        let corrupt = write_registry(&dir, "not json");
        assert_eq!(load(&corrupt, dir.path()), ProjectRegistry::default());
    }
}
