use analysis::ChapterIdentity;
use axum::{
    Json, Router,
    extract::{FromRequest, Path, Request, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use source::{CacheStats, Origin, Resolution, SourceAdapter, SourceError};
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};
use uuid::Uuid;
use view::{
    ChapterView, CharacterView, ChatTurn, PromptContext, PromptLimits, SessionViewState, Speaker,
    ViewError, build_chapter_view, build_character_view, build_companion_prompt,
};

use crate::metrics::{MetricsSnapshot, ResolveMetrics, TimedOperation};
use crate::sessions::SessionRegistry;

pub struct AppState {
    pub adapter: SourceAdapter,
    pub sessions: SessionRegistry,
    pub metrics: Arc<ResolveMetrics>,
    pub prompt_limits: PromptLimits,
}

impl AppState {
    async fn resolve(&self, chapter_id: &str) -> Result<Resolution, SourceError> {
        let timer = TimedOperation::start();
        let outcome = self.adapter.resolve(chapter_id).await;
        self.metrics.record(&outcome, timer.elapsed());
        outcome
    }

    async fn reload(&self, chapter_id: &str) -> Result<Resolution, SourceError> {
        let timer = TimedOperation::start();
        let outcome = self.adapter.reload(chapter_id).await;
        self.metrics.record(&outcome, timer.elapsed());
        outcome
    }

    fn session(&self, id: &Uuid) -> Result<SessionViewState, ApiError> {
        self.sessions.snapshot(id).ok_or(ApiError::UnknownSession(*id))
    }

    fn selected_chapter(&self, id: &Uuid) -> Result<String, ApiError> {
        self.session(id)?
            .selected_chapter_id
            .ok_or(ApiError::NoChapterSelected)
    }

    fn sync_connectivity(&self, id: &Uuid) {
        let connected = self.adapter.is_remote_reachable();
        self.sessions
            .with_session(id, |s| s.record_connectivity(connected));
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    View(#[from] ViewError),
    #[error("session `{0}` does not exist")]
    UnknownSession(Uuid),
    #[error("no chapter is selected in this session")]
    NoChapterSelected,
    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Source(SourceError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Source(SourceError::MalformedDocument(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Source(SourceError::RemoteTimeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Source(_) => StatusCode::BAD_GATEWAY,
            ApiError::View(ViewError::CharacterNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::UnknownSession(_) => StatusCode::NOT_FOUND,
            ApiError::NoChapterSelected => StatusCode::CONFLICT,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::Source(e) => e.kind(),
            ApiError::View(ViewError::CharacterNotFound(_)) => "character_not_found",
            ApiError::UnknownSession(_) => "unknown_session",
            ApiError::NoChapterSelected => "no_chapter_selected",
            ApiError::BadRequest(_) => "bad_request",
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(status = %status, kind = self.kind(), error = %self, "Request failed");
        } else {
            debug!(status = %status, kind = self.kind(), error = %self, "Request rejected");
        }
        let body = json!({"error": self.to_string(), "kind": self.kind()});
        (status, Json(body)).into_response()
    }
}

/// `Json` whose rejections use the same error body as every other failure
struct JsonBody<T>(T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    remote_configured: bool,
    remote_reachable: bool,
    documents_cached: usize,
    active_sessions: usize,
}

#[derive(Serialize)]
struct StatsResponse {
    resolution: MetricsSnapshot,
    cache: CacheStats,
}

#[derive(Serialize)]
struct SessionCreated {
    session_id: Uuid,
}

#[derive(Serialize)]
struct ChapterListResponse {
    novel_id: String,
    connected: bool,
    chapters: Vec<ChapterIdentity>,
}

#[derive(Serialize)]
struct ReloadResponse {
    chapter_id: String,
    revision: String,
    origin: Origin,
}

#[derive(Serialize)]
struct ChatHistoryResponse {
    turns: Vec<ChatTurn>,
}

#[derive(Deserialize)]
struct SelectNovelRequest {
    novel_id: String,
}

#[derive(Deserialize)]
struct ChatRequest {
    question: String,
}

#[derive(Deserialize)]
struct ReplyRequest {
    text: String,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(get_stats))
        .route("/sessions", post(create_session))
        .route("/sessions/:id", delete(end_session))
        .route("/sessions/:id/novel", put(select_novel))
        .route("/sessions/:id/chapters/:chapter_id", get(view_chapter))
        .route("/sessions/:id/characters/:name", get(view_character))
        .route("/sessions/:id/chat", post(ask_companion).delete(clear_chat))
        .route("/sessions/:id/chat/reply", post(record_reply))
        .route("/novels/:novel_id/chapters", get(list_chapters))
        .route("/chapters/:chapter_id/reload", post(reload_chapter))
        .route("/cache", delete(clear_cache))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        remote_configured: state.adapter.has_remote(),
        remote_reachable: state.adapter.is_remote_reachable(),
        documents_cached: state.adapter.cache().stats().documents_cached,
        active_sessions: state.sessions.len(),
    })
}

async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        resolution: state.metrics.snapshot(),
        cache: state.adapter.cache().stats(),
    })
}

async fn create_session(State(state): State<Arc<AppState>>) -> (StatusCode, Json<SessionCreated>) {
    let session_id = state.sessions.create();
    (StatusCode::CREATED, Json(SessionCreated { session_id }))
}

async fn end_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.sessions.remove(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::UnknownSession(id))
    }
}

async fn list_chapters(
    State(state): State<Arc<AppState>>,
    Path(novel_id): Path<String>,
) -> Json<ChapterListResponse> {
    let chapters = state.adapter.list_available(&novel_id).await;
    Json(ChapterListResponse {
        connected: state.adapter.is_remote_reachable(),
        novel_id,
        chapters,
    })
}

async fn select_novel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    JsonBody(req): JsonBody<SelectNovelRequest>,
) -> Result<Json<SessionViewState>, ApiError> {
    state
        .sessions
        .with_session(&id, |s| {
            s.select_novel(req.novel_id);
            s.clone()
        })
        .map(Json)
        .ok_or(ApiError::UnknownSession(id))
}

async fn view_chapter(
    State(state): State<Arc<AppState>>,
    Path((id, chapter_id)): Path<(Uuid, String)>,
) -> Result<Json<ChapterView>, ApiError> {
    state.session(&id)?;

    let outcome = state.resolve(&chapter_id).await;
    state.sync_connectivity(&id);
    let resolution = outcome?;
    let doc = &resolution.document;

    state
        .sessions
        .with_session(&id, |s| {
            s.select_novel(doc.identity.novel_id.clone());
            s.select_chapter(chapter_id.clone());
            build_chapter_view(doc, s).with_revision(resolution.revision.clone())
        })
        .map(Json)
        .ok_or(ApiError::UnknownSession(id))
}

async fn reload_chapter(
    State(state): State<Arc<AppState>>,
    Path(chapter_id): Path<String>,
) -> Result<Json<ReloadResponse>, ApiError> {
    let resolution = state.reload(&chapter_id).await?;

    Ok(Json(ReloadResponse {
        chapter_id,
        revision: resolution.revision,
        origin: resolution.origin,
    }))
}

async fn clear_cache(State(state): State<Arc<AppState>>) -> StatusCode {
    state.adapter.clear();
    StatusCode::NO_CONTENT
}

async fn view_character(
    State(state): State<Arc<AppState>>,
    Path((id, name)): Path<(Uuid, String)>,
) -> Result<Json<CharacterView>, ApiError> {
    let chapter_id = state.selected_chapter(&id)?;

    let outcome = state.resolve(&chapter_id).await;
    state.sync_connectivity(&id);
    let view = build_character_view(&outcome?.document, &name)?;

    state
        .sessions
        .with_session(&id, |s| s.select_character(Some(view.profile.name.clone())))
        .ok_or(ApiError::UnknownSession(id))?;
    Ok(Json(view))
}

async fn ask_companion(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    JsonBody(req): JsonBody<ChatRequest>,
) -> Result<Json<PromptContext>, ApiError> {
    let question = req.question.trim();
    if question.is_empty() {
        return Err(ApiError::BadRequest("question must not be empty".to_string()));
    }
    let chapter_id = state.selected_chapter(&id)?;

    let outcome = state.resolve(&chapter_id).await;
    state.sync_connectivity(&id);
    let resolution = outcome?;
    let limits = state.prompt_limits;

    // The prompt carries the history before this question
    state
        .sessions
        .with_session(&id, |s| {
            let prompt = build_companion_prompt(&resolution.document, question, s.chat_history(), limits);
            s.append_chat_turn(Speaker::User, question);
            prompt
        })
        .map(Json)
        .ok_or(ApiError::UnknownSession(id))
}

async fn record_reply(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    JsonBody(req): JsonBody<ReplyRequest>,
) -> Result<Json<ChatHistoryResponse>, ApiError> {
    let text = req.text.trim();
    if text.is_empty() {
        return Err(ApiError::BadRequest("reply must not be empty".to_string()));
    }

    state
        .sessions
        .with_session(&id, |s| {
            s.append_chat_turn(Speaker::Assistant, text);
            ChatHistoryResponse {
                turns: s.chat_history().iter().cloned().collect(),
            }
        })
        .map(Json)
        .ok_or(ApiError::UnknownSession(id))
}

async fn clear_chat(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .sessions
        .with_session(&id, |s| s.clear_chat())
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or(ApiError::UnknownSession(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use source::{DocumentCache, LocalStore};
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn chapter_payload(chapter_id: &str, number: u32) -> Value {
        json!({
            "chapter_analysis": {
                "metadata": {
                    "novel_id": "n1",
                    "chapter_id": chapter_id,
                    "chapter_number": number,
                    "chapter_title": format!("Chapter {}", number)
                },
                "summary": {"concise": "The scenario begins.", "detailed": "", "key_events": []},
                "themes": [{"theme": "Survival", "relevance": 0.8, "evidence": "Subway"}]
            },
            "character_mapping": {
                "characters": [{"name": "Kim Dokja"}, {"name": "Yoo Sangah"}],
                "relationships": [{"characters": ["Kim Dokja", "Yoo Sangah"], "relationship_type": "Colleague"}]
            },
            "interactive_companion": {
                "vocabulary_notes": [
                    {"term": "Coins", "definition": "Scenario currency"},
                    {"term": "Constellation", "definition": "A sponsor"}
                ]
            }
        })
    }

    fn setup() -> (Router, TempDir) {
        let dir = TempDir::new().unwrap();
        for (file, content) in [
            ("ch1_analysis.json", chapter_payload("ch1", 1).to_string()),
            ("ch2_analysis.json", chapter_payload("ch2", 2).to_string()),
            ("ch5_analysis.json", json!({"summary": {"concise": "no identity"}}).to_string()),
            ("ch6_analysis.json", "{ broken".to_string()),
        ] {
            std::fs::write(dir.path().join(file), content).unwrap();
        }

        let adapter = SourceAdapter::new(
            LocalStore::new(dir.path()),
            DocumentCache::new(),
            Duration::from_secs(1),
        );
        let state = Arc::new(AppState {
            adapter,
            sessions: SessionRegistry::new(3),
            metrics: ResolveMetrics::new(),
            prompt_limits: PromptLimits::default(),
        });
        (router(state), dir)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn new_session(app: &Router) -> String {
        let (status, body) = send(app, "POST", "/sessions", None).await;
        assert_eq!(status, StatusCode::CREATED);
        body["session_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _dir) = setup();
        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["remote_configured"], false);
        assert_eq!(body["documents_cached"], 0);
    }

    #[tokio::test]
    async fn test_chapter_view_and_stats() {
        let (app, _dir) = setup();
        let session = new_session(&app).await;

        let (status, body) = send(&app, "GET", &format!("/sessions/{}/chapters/ch1", session), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["identity"]["chapter_id"], "ch1");
        assert_eq!(body["availability"]["summary"], true);
        assert_eq!(body["availability"]["analytics"], false);
        assert_eq!(body["summary"]["concise"], "The scenario begins.");
        assert_eq!(body["connected"], false);
        assert!(!body["revision"].as_str().unwrap().is_empty());

        send(&app, "GET", &format!("/sessions/{}/chapters/ch1", session), None).await;
        let (_, stats) = send(&app, "GET", "/stats", None).await;
        assert_eq!(stats["resolution"]["requests"], 2);
        assert_eq!(stats["resolution"]["local_loads"], 1);
        assert_eq!(stats["resolution"]["cache_hits"], 1);
        assert_eq!(stats["cache"]["documents_cached"], 1);
    }

    #[tokio::test]
    async fn test_error_bodies() {
        let (app, _dir) = setup();
        let session = new_session(&app).await;

        let (status, body) = send(&app, "GET", &format!("/sessions/{}/chapters/ch9", session), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "not_found");
        assert!(body["error"].as_str().unwrap().contains("ch9"));

        for chapter in ["ch5", "ch6"] {
            let uri = format!("/sessions/{}/chapters/{}", session, chapter);
            let (status, body) = send(&app, "GET", &uri, None).await;
            assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{}", chapter);
            assert_eq!(body["kind"], "malformed_document");
        }

        let stranger = Uuid::new_v4();
        let (status, body) = send(&app, "GET", &format!("/sessions/{}/chapters/ch1", stranger), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "unknown_session");
    }

    #[tokio::test]
    async fn test_character_view_needs_chapter() {
        let (app, _dir) = setup();
        let session = new_session(&app).await;
        let uri = format!("/sessions/{}/characters/Kim%20Dokja", session);

        let (status, body) = send(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], "no_chapter_selected");

        send(&app, "GET", &format!("/sessions/{}/chapters/ch1", session), None).await;
        let (status, body) = send(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["profile"]["name"], "Kim Dokja");
        assert_eq!(body["relationships"][0]["counterpart"], "Yoo Sangah");

        let (status, body) = send(&app, "GET", &format!("/sessions/{}/characters/Nobody", session), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "character_not_found");

        let (_, view) = send(&app, "GET", &format!("/sessions/{}/chapters/ch1", session), None).await;
        assert_eq!(view["selected_character"], "Kim Dokja");
    }

    #[tokio::test]
    async fn test_chat_round_trip() {
        let (app, _dir) = setup();
        let session = new_session(&app).await;
        let chat = format!("/sessions/{}/chat", session);
        let reply = format!("/sessions/{}/chat/reply", session);

        let (status, _) = send(&app, "POST", &chat, Some(json!({"question": "Hi?"}))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        send(&app, "GET", &format!("/sessions/{}/chapters/ch1", session), None).await;

        let (status, prompt) = send(&app, "POST", &chat, Some(json!({"question": "What is a constellation?"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(prompt["question"], "What is a constellation?");
        assert_eq!(prompt["vocabulary"][0]["term"], "Constellation");
        assert_eq!(prompt["history"], json!([]));

        send(&app, "POST", &reply, Some(json!({"text": "A sponsor."}))).await;
        let (_, prompt) = send(&app, "POST", &chat, Some(json!({"question": "And coins?"}))).await;
        assert_eq!(prompt["history"].as_array().unwrap().len(), 2);
        assert_eq!(prompt["history"][1]["speaker"], "assistant");

        // Bound of three: the first question is evicted
        let (_, history) = send(&app, "POST", &reply, Some(json!({"text": "Currency."}))).await;
        let turns = history["turns"].as_array().unwrap();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0]["text"], "A sponsor.");

        let (status, _) = send(&app, "POST", &chat, Some(json!({"question": "   "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, "DELETE", &chat, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, prompt) = send(&app, "POST", &chat, Some(json!({"question": "Again?"}))).await;
        assert_eq!(prompt["history"], json!([]));
    }

    #[tokio::test]
    async fn test_listing_novel_selection_and_reload() {
        let (app, _dir) = setup();
        let session = new_session(&app).await;

        let (status, body) = send(&app, "GET", "/novels/n1/chapters", None).await;
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<_> = body["chapters"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["chapter_id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["ch1", "ch2"]);
        assert_eq!(body["connected"], false);

        send(&app, "GET", &format!("/sessions/{}/chapters/ch2", session), None).await;
        let (status, state) = send(
            &app,
            "PUT",
            &format!("/sessions/{}/novel", session),
            Some(json!({"novel_id": "n2"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(state["selected_novel_id"], "n2");
        assert_eq!(state["selected_chapter_id"], Value::Null);

        let (status, body) = send(&app, "POST", "/chapters/ch1/reload", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["origin"], "local");

        let (status, _) = send(&app, "POST", "/chapters/ch9/reload", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bad_bodies_use_error_shape() {
        let (app, _dir) = setup();
        let session = new_session(&app).await;
        let novel = format!("/sessions/{}/novel", session);

        let request = Request::builder()
            .method("PUT")
            .uri(&novel)
            .header("content-type", "application/json")
            .body(Body::from("{ not json"))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["kind"], "bad_request");
        assert!(!body["error"].as_str().unwrap().is_empty());

        let (status, body) = send(&app, "PUT", &novel, Some(json!({"novel": "n1"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "bad_request");

        let chat = format!("/sessions/{}/chat/reply", session);
        let (status, body) = send(&app, "POST", &chat, Some(json!({"text": 7}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "bad_request");
    }

    #[tokio::test]
    async fn test_reload_counts_and_cache_clear() {
        let (app, _dir) = setup();
        let session = new_session(&app).await;

        send(&app, "GET", &format!("/sessions/{}/chapters/ch1", session), None).await;
        let (status, _) = send(&app, "POST", "/chapters/ch1/reload", None).await;
        assert_eq!(status, StatusCode::OK);

        let (_, stats) = send(&app, "GET", "/stats", None).await;
        assert_eq!(stats["resolution"]["requests"], 2);
        assert_eq!(stats["resolution"]["local_loads"], 2);
        assert_eq!(stats["cache"]["documents_cached"], 1);

        let (status, _) = send(&app, "DELETE", "/cache", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, health) = send(&app, "GET", "/health", None).await;
        assert_eq!(health["documents_cached"], 0);
    }

    #[tokio::test]
    async fn test_end_session() {
        let (app, _dir) = setup();
        let session = new_session(&app).await;
        let uri = format!("/sessions/{}", session);

        let (status, _) = send(&app, "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, body) = send(&app, "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "unknown_session");
    }
}
