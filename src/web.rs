use crate::{
    app::{App, AppError},
    board::{Board, BoardError, Bookmark, ExportPayload},
    metadata::ResolutionResult,
};
use axum::{
    extract::{DefaultBodyLimit, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::signal;

#[derive(Clone)]
struct SharedState {
    app: Arc<App>,
}

pub fn build_router(app: Arc<App>) -> Router {
    let shared_state = Arc::new(SharedState { app });

    Router::new()
        .route("/api/board", get(get_board))
        .route("/api/board/clear", post(clear))
        .route("/api/board/import", post(import))
        .route("/api/board/export", get(export))
        .route("/api/bookmarks/create", post(create_bookmark))
        .route("/api/bookmarks/update", post(update_bookmark))
        .route("/api/bookmarks/delete", post(delete_bookmark))
        .route("/api/bookmarks/move", post(move_bookmark))
        .route("/api/groups/create", post(create_group))
        .route("/api/groups/rename", post(rename_group))
        .route("/api/groups/delete", post(delete_group))
        .route("/api/groups/move", post(move_group))
        .route("/api/groups/collapse", post(collapse_group))
        .route("/api/metadata/resolve", post(resolve_metadata))
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(shared_state)
}

async fn start_app(app: Arc<App>) {
    async fn shutdown_signal() {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("failed to install Ctrl+C handler");
        };

        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("failed to install signal handler")
                .recv()
                .await;
        };

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }

    let listen_addr = app.config().listen_addr.clone();
    let router = build_router(app);

    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .expect("failed to bind listen address");
    log::info!("listening on {listen_addr}");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

pub fn start_daemon(app: Arc<App>) {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(async { start_app(app).await });
}

// Wrapper so `?` converts any `Into<AppError>` into an HTTP response.
#[derive(Debug)]
struct HttpError(AppError);

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            AppError::Board(BoardError::GroupNotFound(_))
            | AppError::Board(BoardError::IndexOutOfRange { .. }) => {
                axum::http::StatusCode::NOT_FOUND
            }
            AppError::Board(BoardError::GroupExists(_)) => axum::http::StatusCode::CONFLICT,
            AppError::Board(BoardError::InvalidPayload(_)) => axum::http::StatusCode::BAD_REQUEST,
            AppError::IO(_) | AppError::Json(_) | AppError::Other(_) => {
                log::error!("{self:?}");
                axum::http::StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, json!({"error": self.0.to_string()}).to_string()).into_response()
    }
}

impl<E> From<E> for HttpError
where
    E: Into<AppError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

async fn get_board(State(state): State<Arc<SharedState>>) -> axum::Json<Board> {
    state.app.board().into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BookmarkCreateRequest {
    pub group: String,
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default, rename = "whiteBg")]
    pub white_bg: bool,
}

async fn create_bookmark(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<BookmarkCreateRequest>,
) -> Result<axum::Json<Bookmark>, HttpError> {
    log::debug!("payload: {payload:?}");

    let bookmark = Bookmark {
        url: payload.url,
        title: payload.title,
        icon: payload.icon,
        white_bg: payload.white_bg,
    };
    let stored = state.app.add_bookmark(&payload.group, bookmark).await?;
    Ok(stored.into())
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BookmarkUpdateRequest {
    pub group: String,
    pub index: usize,
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default, rename = "whiteBg")]
    pub white_bg: bool,
}

async fn update_bookmark(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<BookmarkUpdateRequest>,
) -> Result<axum::Json<Bookmark>, HttpError> {
    log::debug!("payload: {payload:?}");

    let bookmark = Bookmark {
        url: payload.url,
        title: payload.title,
        icon: payload.icon,
        white_bg: payload.white_bg,
    };
    let stored = state
        .app
        .update_bookmark(&payload.group, payload.index, bookmark)
        .await?;
    Ok(stored.into())
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BookmarkDeleteRequest {
    pub group: String,
    pub index: usize,
}

async fn delete_bookmark(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<BookmarkDeleteRequest>,
) -> Result<axum::Json<Bookmark>, HttpError> {
    log::debug!("payload: {payload:?}");
    let removed = state.app.delete_bookmark(&payload.group, payload.index)?;
    Ok(removed.into())
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BookmarkMoveRequest {
    pub from_group: String,
    pub from_index: usize,
    pub to_group: String,
    pub to_index: usize,
}

async fn move_bookmark(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<BookmarkMoveRequest>,
) -> Result<axum::Json<Board>, HttpError> {
    log::debug!("payload: {payload:?}");
    state.app.move_bookmark(
        &payload.from_group,
        payload.from_index,
        &payload.to_group,
        payload.to_index,
    )?;
    Ok(state.app.board().into())
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GroupCreateRequest {
    pub name: String,
}

async fn create_group(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<GroupCreateRequest>,
) -> Result<axum::Json<Board>, HttpError> {
    log::debug!("payload: {payload:?}");
    state.app.add_group(&payload.name)?;
    Ok(state.app.board().into())
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GroupRenameRequest {
    pub old: String,
    pub new: String,
}

async fn rename_group(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<GroupRenameRequest>,
) -> Result<axum::Json<Board>, HttpError> {
    log::debug!("payload: {payload:?}");
    state.app.rename_group(&payload.old, &payload.new)?;
    Ok(state.app.board().into())
}

async fn delete_group(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<GroupCreateRequest>,
) -> Result<axum::Json<Board>, HttpError> {
    log::debug!("payload: {payload:?}");
    state.app.delete_group(&payload.name)?;
    Ok(state.app.board().into())
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GroupMoveRequest {
    pub from: usize,
    pub to: usize,
}

async fn move_group(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<GroupMoveRequest>,
) -> Result<axum::Json<Board>, HttpError> {
    log::debug!("payload: {payload:?}");
    state.app.move_group(payload.from, payload.to)?;
    Ok(state.app.board().into())
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GroupCollapseRequest {
    pub name: String,
    pub collapsed: bool,
}

async fn collapse_group(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<GroupCollapseRequest>,
) -> Result<axum::Json<Board>, HttpError> {
    log::debug!("payload: {payload:?}");
    state.app.set_collapsed(&payload.name, payload.collapsed)?;
    Ok(state.app.board().into())
}

async fn import(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<serde_json::Value>,
) -> Result<axum::Json<Board>, HttpError> {
    state.app.import(payload)?;
    Ok(state.app.board().into())
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExportResponse {
    pub filename: String,
    pub payload: ExportPayload,
}

async fn export(State(state): State<Arc<SharedState>>) -> axum::Json<ExportResponse> {
    let (filename, payload) = state.app.export();
    ExportResponse { filename, payload }.into()
}

async fn clear(State(state): State<Arc<SharedState>>) -> Result<axum::Json<Board>, HttpError> {
    state.app.clear()?;
    Ok(state.app.board().into())
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResolveRequest {
    pub url: String,
}

async fn resolve_metadata(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<ResolveRequest>,
) -> axum::Json<ResolutionResult> {
    log::debug!("payload: {payload:?}");
    state.app.resolve_metadata(&payload.url).await.into()
}
