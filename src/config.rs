use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

impl AppConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            Self::from_file(path)?
        } else {
            let default_path = PathBuf::from("claude-dash.toml");
            if default_path.exists() {
                Self::from_file(&default_path)?
            } else {
                Self::default()
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self =
            toml::from_str(&contents).with_context(|| "failed to parse configuration TOML")?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = env::var("CLAUDE_DASH_LISTEN_ADDR") {
            self.server.listen_addr = addr;
        }
        if let Ok(dir) = env::var("CLAUDE_DASH_CLAUDE_DIR") {
            self.paths.claude_dir = Some(PathBuf::from(dir));
        }
        if let Ok(stats_path) = env::var("CLAUDE_DASH_STATS_PATH") {
            self.paths.stats_path = Some(PathBuf::from(stats_path));
        }
        if let Ok(db_path) = env::var("CLAUDE_DASH_DB_PATH") {
            self.paths.db_path = Some(PathBuf::from(db_path));
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

/// Locations of the assistant's on-disk records. Anything left unset is
/// derived from `claude_dir`, which itself defaults to `~/.claude`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    #[serde(default)]
    pub claude_dir: Option<PathBuf>,
    #[serde(default)]
    pub stats_path: Option<PathBuf>,
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    /// The projects registry lives next to the data directory, not inside it.
    #[serde(default)]
    pub claude_json: Option<PathBuf>,
    #[serde(default)]
    pub projects_dir: Option<PathBuf>,
    #[serde(default)]
    pub todos_dir: Option<PathBuf>,
    #[serde(default)]
    pub settings_path: Option<PathBuf>,
}

/// Fully resolved record locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    pub stats_path: PathBuf,
    pub db_path: PathBuf,
    pub claude_json: PathBuf,
    pub projects_dir: PathBuf,
    pub todos_dir: PathBuf,
    pub settings_path: PathBuf,
}

impl PathsConfig {
    pub fn resolve(&self) -> Result<DataPaths> {
        let claude_dir = match &self.claude_dir {
            Some(dir) => dir.clone(),
            None => dirs::home_dir()
                .map(|home| home.join(".claude"))
                .context("could not determine home directory; set paths.claude_dir")?,
        };
        let default_claude_json = match claude_dir.parent() {
            Some(parent) => parent.join(".claude.json"),
            None => claude_dir.join(".claude.json"),
        };

        Ok(DataPaths {
            stats_path: self
                .stats_path
                .clone()
                .unwrap_or_else(|| claude_dir.join("stats-cache.json")),
            db_path: self
                .db_path
                .clone()
                .unwrap_or_else(|| claude_dir.join("__store.db")),
            claude_json: self.claude_json.clone().unwrap_or(default_claude_json),
            projects_dir: self
                .projects_dir
                .clone()
                .unwrap_or_else(|| claude_dir.join("projects")),
            todos_dir: self
                .todos_dir
                .clone()
                .unwrap_or_else(|| claude_dir.join("todos")),
            settings_path: self
                .settings_path
                .clone()
                .unwrap_or_else(|| claude_dir.join("settings.json")),
        })
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_recent_sessions")]
    pub recent_sessions_limit: usize,
    #[serde(default = "default_overview_days")]
    pub overview_days: usize,
    #[serde(default = "default_analytics_days")]
    pub analytics_days: usize,
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            recent_sessions_limit: default_recent_sessions(),
            overview_days: default_overview_days(),
            analytics_days: default_analytics_days(),
            search_limit: default_search_limit(),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:8787".to_string()
}

fn default_recent_sessions() -> usize {
    10
}

fn default_overview_days() -> usize {
    30
}

fn default_analytics_days() -> usize {
    90
}

fn default_search_limit() -> usize {
    100
}
