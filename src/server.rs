use crate::{
    dashboard::Dashboard,
    inventory::projects::{Project, ProjectRegistry, ProjectStats},
    inventory::todos::{self, TodoFile, TodoStats},
    storage::FullMessage,
};
use anyhow::{Context, Result, anyhow};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};

/// Envelope wrapped around every API payload.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

fn ok<T: Serialize>(data: T) -> Response {
    Json(ApiResponse::success(data)).into_response()
}

fn missing_param(name: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiResponse::<()>::error(format!(
            "missing required query parameter `{name}`"
        ))),
    )
        .into_response()
}

pub type AppState = Arc<Dashboard>;

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/overview", get(overview))
        .route("/analytics", get(analytics))
        .route("/stats", get(stats))
        .route("/models", get(models))
        .route("/activity", get(activity))
        .route("/hourly", get(hourly))
        .route("/cost-distribution", get(cost_distribution))
        .route("/sessions", get(sessions))
        .route("/sessions/:id/messages", get(session_messages))
        .route("/search", get(search))
        .route("/projects", get(projects))
        .route("/projects/messages", get(project_messages))
        .route("/todos", get(todo_lists))
        .route("/settings/permissions", get(permissions))
        .route("/summaries", get(summaries));

    Router::new().nest("/api", api).with_state(state)
}

pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    join: JoinHandle<Result<()>>,
}

pub async fn spawn(listen_addr: &str, state: AppState) -> Result<ServerHandle> {
    let addr: SocketAddr = listen_addr
        .parse()
        .with_context(|| format!("failed to parse listen_addr {listen_addr}"))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind dashboard listener on {addr}"))?;
    let local_addr = listener
        .local_addr()
        .with_context(|| "failed to read bound address")?;

    let app = router(state);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let join = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .map_err(|err| anyhow!(err))
    });

    tracing::info!(listen = %local_addr, "dashboard API listening");

    Ok(ServerHandle {
        local_addr,
        shutdown: Some(shutdown_tx),
        join,
    })
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.join.await {
            Ok(result) => result,
            Err(err) => Err(anyhow!(err)),
        }
    }
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TodoPage {
    stats: TodoStats,
    /// Most recently modified first.
    files: Vec<TodoFile>,
}

#[derive(Debug, Serialize)]
struct ProjectsPage {
    #[serde(flatten)]
    registry: ProjectRegistry,
    stats: ProjectStats,
}

#[derive(Debug, Serialize)]
struct ProjectDetail {
    /// `None` when the path is not in the projects registry.
    project: Option<Project>,
    messages: Vec<FullMessage>,
}

#[derive(Debug, Deserialize)]
struct DaysParams {
    days: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct LimitParams {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ProjectParams {
    path: Option<String>,
}

async fn health() -> Response {
    ok(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn overview(State(state): State<AppState>) -> Response {
    ok(state.overview().await)
}

async fn analytics(State(state): State<AppState>) -> Response {
    ok(state.analytics().await)
}

async fn stats(State(state): State<AppState>) -> Response {
    ok(state.usage().total_stats())
}

async fn models(State(state): State<AppState>) -> Response {
    ok(state.usage().model_usage())
}

async fn activity(State(state): State<AppState>, Query(params): Query<DaysParams>) -> Response {
    let days = params.days.unwrap_or(state.display().overview_days);
    ok(state.usage().daily_activity(days))
}

async fn hourly(State(state): State<AppState>) -> Response {
    ok(state.usage().hourly_distribution())
}

async fn cost_distribution(State(state): State<AppState>) -> Response {
    ok(state.usage().cost_distribution())
}

async fn sessions(State(state): State<AppState>, Query(params): Query<LimitParams>) -> Response {
    let sessions = match params.limit {
        Some(limit) => state.store().recent_sessions(limit).await,
        None => state.store().all_sessions().await,
    };
    ok(sessions)
}

async fn session_messages(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    ok(state.store().session_messages(&id).await)
}

async fn search(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Response {
    let Some(query) = params.q.filter(|q| !q.trim().is_empty()) else {
        return missing_param("q");
    };
    let limit = params.limit.unwrap_or(state.display().search_limit);
    let hits: Vec<FullMessage> = state.store().search_messages(&query, limit).await;
    ok(hits)
}

async fn projects(State(state): State<AppState>) -> Response {
    let registry = state.projects();
    ok(ProjectsPage {
        stats: registry.project_stats(),
        registry,
    })
}

async fn project_messages(
    State(state): State<AppState>,
    Query(params): Query<ProjectParams>,
) -> Response {
    let Some(path) = params.path.filter(|p| !p.is_empty()) else {
        return missing_param("path");
    };
    let project = state.projects().project_by_path(&path).cloned();
    ok(ProjectDetail {
        messages: state.store().messages_by_project(&path).await,
        project,
    })
}

async fn todo_lists(State(state): State<AppState>) -> Response {
    let files = state.todos();
    ok(TodoPage {
        stats: todos::todo_stats(&files),
        files: todos::recent_todos(files, usize::MAX),
    })
}

async fn permissions(State(state): State<AppState>) -> Response {
    ok(state.permissions())
}

async fn summaries(State(state): State<AppState>) -> Response {
    ok(state.store().conversation_summaries().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::test_support::populated;
    use axum::{body::Body, http::Request};
    use serde_json::Value;
    use tower::ServiceExt;

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn app() -> (tempfile::TempDir, Router) {
        let (home, dashboard) = populated(true).await;
        (home, router(Arc::new(dashboard)))
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (_home, app) = app().await;
        let (status, body) = get_json(app, "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["status"], "ok");
        assert!(body.get("error").is_none());
    }

    #[tokio::test]
    async fn overview_payload_uses_camel_case() {
        let (_home, app) = app().await;
        let (status, body) = get_json(app, "/api/overview").await;
        assert_eq!(status, StatusCode::OK);
        let data = &body["data"];
        assert_eq!(data["totalConversations"], 2);
        assert_eq!(data["costByModel"][0]["model"], "opus-4.5");
        assert_eq!(data["todoStats"]["pending"], 1);
        assert_eq!(data["recentSessions"][0]["session_id"], "session-b");
    }

    #[tokio::test]
    async fn models_carry_calculated_cost_alongside_tokens() {
        let (_home, app) = app().await;
        let (_, body) = get_json(app, "/api/models").await;
        let opus = &body["data"]["claude-opus-4-5-20251101"];
        assert_eq!(opus["inputTokens"], 1_000_000);
        assert_eq!(opus["calculatedCost"], 90.0);
    }

    #[tokio::test]
    async fn activity_honours_days_parameter() {
        let (_home, app) = app().await;
        let (_, body) = get_json(app.clone(), "/api/activity?days=1").await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
        assert_eq!(body["data"][0]["date"], "2025-01-03");

        let (_, body) = get_json(app, "/api/activity").await;
        assert_eq!(body["data"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn hourly_lists_observed_hours_and_analytics_pads_them() {
        let (_home, app) = app().await;
        let (_, body) = get_json(app.clone(), "/api/hourly").await;
        let hours = body["data"].as_array().unwrap();
        assert_eq!(hours.len(), 2);
        assert_eq!(hours[0]["hour"], 9);
        assert_eq!(hours[0]["count"], 4);

        let (_, body) = get_json(app, "/api/analytics").await;
        let hours = body["data"]["hourly"].as_array().unwrap();
        assert_eq!(hours.len(), 24);
        assert_eq!(hours[14]["count"], 7);
    }

    #[tokio::test]
    async fn cost_distribution_splits_by_token_type() {
        let (_home, app) = app().await;
        let (_, body) = get_json(app, "/api/cost-distribution").await;
        assert_eq!(body["data"]["input"], 18.0);
        assert_eq!(body["data"]["output"], 75.0);
        assert_eq!(body["data"]["cacheRead"], 0.0);
    }

    #[tokio::test]
    async fn sessions_and_transcripts() {
        let (_home, app) = app().await;
        let (_, body) = get_json(app.clone(), "/api/sessions?limit=1").await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let (_, body) = get_json(app.clone(), "/api/sessions").await;
        assert_eq!(body["data"].as_array().unwrap().len(), 2);
        assert_eq!(body["data"][0]["project_name"], "beta");
        assert_eq!(body["data"][1]["project_name"], "alpha");
        assert_eq!(body["data"][0]["duration_ms"], 60_000);

        let (_, body) = get_json(app, "/api/sessions/session-a/messages").await;
        let messages = body["data"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[1]["role"], "assistant");
    }

    #[tokio::test]
    async fn search_requires_a_query() {
        let (_home, app) = app().await;
        let (status, body) = get_json(app.clone(), "/api/search").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body.get("data").is_none());

        let (status, body) = get_json(app, "/api/search?q=parser&limit=5").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn project_messages_require_a_path() {
        let (_home, app) = app().await;
        let (status, _) = get_json(app.clone(), "/api/projects/messages").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = get_json(app.clone(), "/api/projects/messages?path=/home/dev/alpha").await;
        assert_eq!(body["data"]["project"]["name"], "alpha");
        assert_eq!(body["data"]["messages"].as_array().unwrap().len(), 2);

        let (_, body) = get_json(app, "/api/projects/messages?path=beta").await;
        assert!(body["data"]["project"].is_null());
        assert_eq!(body["data"]["messages"][0]["uuid"], "b2");
    }

    #[tokio::test]
    async fn inspection_views() {
        let (_home, app) = app().await;

        let (_, body) = get_json(app.clone(), "/api/projects").await;
        assert_eq!(body["data"]["numStartups"], 12);
        assert_eq!(body["data"]["projects"][0]["name"], "alpha");
        assert_eq!(body["data"]["stats"]["totalProjects"], 2);
        assert_eq!(body["data"]["stats"]["totalCost"], 3.0);
        assert_eq!(body["data"]["stats"]["avgCostPerProject"], 1.5);

        let (_, body) = get_json(app.clone(), "/api/todos").await;
        assert_eq!(body["data"]["stats"]["total"], 2);
        assert_eq!(body["data"]["files"][0]["id"], "s1");

        let (_, body) = get_json(app.clone(), "/api/settings/permissions").await;
        assert_eq!(body["data"]["deny"][0], "WebFetch");

        let (_, body) = get_json(app, "/api/summaries").await;
        assert_eq!(body["data"][0]["summary"], "Newer summary");
    }

    #[tokio::test]
    async fn absent_data_is_still_a_success() {
        let home = tempfile::TempDir::new().unwrap();
        let paths = crate::config::PathsConfig {
            claude_dir: Some(home.path().join("nowhere")),
            ..Default::default()
        }
        .resolve()
        .unwrap();
        let app = router(Arc::new(Dashboard::new(
            paths,
            crate::config::DisplayConfig::default(),
        )));

        for uri in ["/api/stats", "/api/models", "/api/sessions", "/api/summaries"] {
            let (status, body) = get_json(app.clone(), uri).await;
            assert_eq!(status, StatusCode::OK, "{uri}");
            assert_eq!(body["success"], true, "{uri}");
        }
        let (_, body) = get_json(app, "/api/stats").await;
        assert_eq!(body["data"]["totalCost"], 0.0);
    }

    #[tokio::test]
    async fn spawn_binds_and_shuts_down() {
        let (_home, dashboard) = populated(false).await;
        let handle = spawn("127.0.0.1:0", Arc::new(dashboard)).await.unwrap();
        assert_ne!(handle.local_addr().port(), 0);
        handle.shutdown().await.unwrap();

        let (_home, dashboard) = populated(false).await;
        assert!(spawn("not an address", Arc::new(dashboard)).await.is_err());
    }
}
