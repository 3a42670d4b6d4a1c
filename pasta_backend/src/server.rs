use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

use crate::agent::{DispatchError, Purpose};
use crate::identity::{user_cookie, InvalidUserId, RequestUser};
use crate::pipeline::{Pipeline, PipelineError};
use crate::profile::list_personality_scores;
use crate::runtime::BackendRuntime;
use crate::store::{CollectionPath, CollectionQuery, StoreError};

pub const USER_NOT_SET: &str = "USER_ID not set. Call /get_userid/<user_id> first.";
pub const USER_NOT_SET_SHORT: &str = "USER_ID not set.";
pub const TASK_PARSE_FAILED: &str = "Failed to parse JSON response";

const USAGE: &str = "PASTA backend. Endpoints: \
    /hello, \
    /get_userid/<user_id>, \
    /get_collection/<collection_name>, \
    /get_personality_scores, \
    /get_stock_content/<query>, \
    /get_search_content/<query>, \
    /get_multi_agent_content/<query>, \
    /get_fitness_content/<query>, \
    /task_agent/<query>. \
    Identify the user with the X-User-Id header, a user_id query parameter, \
    or the cookie set by /get_userid/<user_id>.";

#[derive(Clone)]
pub struct ServerState {
    pub pipeline: Pipeline,
    pub cross_site_cookie: bool,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

type ApiResult = Result<Response, ApiError>;

/// Failure reply. Precondition and parse failures keep status 200, the way
/// clients already expect; upstream failures become 502.
#[derive(Debug)]
enum ApiError {
    Refused(String),
    TaskParse(Vec<String>),
    Upstream(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Refused(message) => {
                (StatusCode::OK, Json(json!({ "error": message }))).into_response()
            }
            ApiError::TaskParse(details) => (
                StatusCode::OK,
                Json(json!({ "error": TASK_PARSE_FAILED, "details": details })),
            )
                .into_response(),
            ApiError::Upstream(message) => {
                (StatusCode::BAD_GATEWAY, Json(json!({ "error": message }))).into_response()
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::InvalidPath(path) => {
                ApiError::Refused(format!("Invalid collection path '{}'", path))
            }
            other => {
                tracing::error!("Document store failure: {}", other);
                ApiError::Upstream(other.to_string())
            }
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(error: DispatchError) -> Self {
        match error {
            DispatchError::EmptyQuery => ApiError::Refused("Query is empty.".to_string()),
            other => ApiError::Upstream(other.to_string()),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(error: PipelineError) -> Self {
        match error {
            PipelineError::Store(e) => e.into(),
            PipelineError::Dispatch(e) => e.into(),
            PipelineError::Parse(e) => ApiError::TaskParse(e.details()),
        }
    }
}

impl From<InvalidUserId> for ApiError {
    fn from(error: InvalidUserId) -> Self {
        ApiError::Refused(error.to_string())
    }
}

fn require_user<'a>(user: &'a RequestUser, message: &str) -> Result<&'a str, ApiError> {
    user.id().ok_or_else(|| ApiError::Refused(message.to_string()))
}

/// Browser clients send the identity cookie on cross-origin calls, so origins
/// are mirrored rather than wildcarded and credentials are allowed.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

fn respond(value: impl Serialize) -> Response {
    Json(json!({ "response": value })).into_response()
}

pub fn build_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/hello", get(hello))
        .route("/health", get(health))
        .route("/get_userid/:user_id", get(set_user_id))
        .route("/get_collection/:collection_name", get(get_collection))
        .route("/get_personality_scores", get(get_personality_scores))
        .route("/get_stock_content/:query", get(get_stock_content))
        .route("/get_search_content/:query", get(get_search_content))
        .route("/get_multi_agent_content/:query", get(get_multi_agent_content))
        .route("/get_fitness_content/:query", get(get_fitness_content))
        .route("/task_agent/:query", get(task_agent))
        .with_state(state)
        .layer(cors_layer())
}

pub async fn serve_backend(runtime: BackendRuntime) -> Result<()> {
    let bind_addr = runtime
        .config
        .bind
        .parse::<SocketAddr>()
        .context("Invalid bind address (expected host:port)")?;

    let state = Arc::new(ServerState {
        pipeline: runtime.pipeline,
        cross_site_cookie: runtime.config.cross_site_cookie,
    });
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind backend server to {}", bind_addr))?;
    tracing::info!("PASTA backend listening on http://{}", bind_addr);
    axum::serve(listener, app)
        .await
        .context("Backend server failed")?;
    Ok(())
}

async fn hello() -> &'static str {
    "hello world"
}

async fn index() -> Response {
    respond(USAGE)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn set_user_id(
    State(state): State<Arc<ServerState>>,
    Path(user_id): Path<String>,
) -> ApiResult {
    let user_id = user_id.trim().to_string();
    let cookie = user_cookie(&user_id, state.cross_site_cookie)
        .ok_or_else(|| InvalidUserId(user_id.clone()))?;
    tracing::info!(user_id = %user_id, "Client identity set");
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "response": format!("USER_ID set to {}", user_id) })),
    )
        .into_response())
}

async fn get_collection(
    State(state): State<Arc<ServerState>>,
    user: RequestUser,
    Path(collection_name): Path<String>,
) -> ApiResult {
    let user_id = require_user(&user, USER_NOT_SET)?;
    let path = CollectionPath::user_collection(user_id, &collection_name)?;
    let docs = state
        .pipeline
        .store()
        .list_documents(&path, &CollectionQuery::all())
        .await?;
    let docs: Vec<Value> = docs.iter().map(|doc| doc.to_json_with_id()).collect();
    Ok(respond(docs))
}

async fn get_personality_scores(
    State(state): State<Arc<ServerState>>,
    user: RequestUser,
) -> ApiResult {
    let user_id = require_user(&user, USER_NOT_SET)?;
    let scores = list_personality_scores(
        state.pipeline.store(),
        user_id,
        &state.pipeline.settings().personality_collection,
    )
    .await?;
    Ok(respond(scores))
}

async fn agent_reply(state: &ServerState, purpose: Purpose, query: &str) -> ApiResult {
    let text = state
        .pipeline
        .dispatcher()
        .dispatch(purpose, query, None)
        .await?;
    Ok(respond(text))
}

async fn get_stock_content(
    State(state): State<Arc<ServerState>>,
    Path(query): Path<String>,
) -> ApiResult {
    agent_reply(&state, Purpose::Finance, &query).await
}

async fn get_search_content(
    State(state): State<Arc<ServerState>>,
    Path(query): Path<String>,
) -> ApiResult {
    agent_reply(&state, Purpose::WebSearch, &query).await
}

async fn get_multi_agent_content(
    State(state): State<Arc<ServerState>>,
    Path(query): Path<String>,
) -> ApiResult {
    agent_reply(&state, Purpose::MultiAgent, &query).await
}

async fn get_fitness_content(
    State(state): State<Arc<ServerState>>,
    user: RequestUser,
    Path(query): Path<String>,
) -> ApiResult {
    let user_id = require_user(&user, USER_NOT_SET_SHORT)?;
    let text = state.pipeline.fitness_reply(user_id, &query).await?;
    Ok(respond(text))
}

async fn task_agent(
    State(state): State<Arc<ServerState>>,
    user: RequestUser,
    Path(query): Path<String>,
) -> ApiResult {
    let user_id = require_user(&user, USER_NOT_SET_SHORT)?;
    let record = state.pipeline.fill_task(user_id, &query).await?;
    Ok(Json(record).into_response())
}
