use axum::{
    Router,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, Request, StatusCode, header},
    middleware::{Next, from_fn},
    response::{Json, Response},
    routing::{get, post},
};
use mediclear::{
    AnalysisSession, AnalysisStore, AuthError, DocumentPayload, ErrorCategory, Identity,
    IdentityProvider, InMemoryAnalysisStore, InMemoryIdentityProvider, InMemorySessionStorage,
    MediClearConfig, MediClearError, PostgresAnalysisStore, ReportPipeline, SessionStorage,
    SessionView, StoreError, UpstreamErrorKind, plan_speech,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, error, info, warn};
use uuid::Uuid;

use crate::models::{
    AnalyzeRequest, AuthResponse, ChatRequest, CountResponse, HistoryQuery, HistoryResponse,
    LanguageRequest, LanguageResponse, LoginRequest, ProfileResponse, RegisterRequest,
    SpeechRequest, SpeechResponse, TranslateRequest, UpdateProfileRequest,
};

pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

type ApiResult<T> = Result<Json<T>, ApiError>;
type ApiError = (StatusCode, Json<Value>);

fn unauthorized_error(message: &str) -> ApiError {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": message })))
}

fn status_for(err: &MediClearError) -> StatusCode {
    match err {
        MediClearError::Upstream(e) if e.kind == UpstreamErrorKind::RateLimited => {
            StatusCode::TOO_MANY_REQUESTS
        }
        MediClearError::Store(StoreError::NotFound(_))
        | MediClearError::Auth(AuthError::UserNotFound(_)) => StatusCode::NOT_FOUND,
        MediClearError::Auth(AuthError::EmailInUse) | MediClearError::AnalysisSuperseded => {
            StatusCode::CONFLICT
        }
        MediClearError::Auth(AuthError::InvalidEmail | AuthError::WeakPassword(_)) => {
            StatusCode::BAD_REQUEST
        }
        _ => match err.category() {
            ErrorCategory::Configuration => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCategory::Input => StatusCode::BAD_REQUEST,
            ErrorCategory::Upstream | ErrorCategory::ResponseShape => StatusCode::BAD_GATEWAY,
            ErrorCategory::Storage => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCategory::Auth => StatusCode::UNAUTHORIZED,
        },
    }
}

fn api_error(err: impl Into<MediClearError>) -> ApiError {
    let err = err.into();
    let status = status_for(&err);
    if status.is_server_error() {
        error!("Request failed ({}): {}", status, err);
    } else {
        warn!("Request rejected ({}): {}", status, err);
    }

    let body = match &err {
        MediClearError::Store(StoreError::Database(_) | StoreError::Serialization(_)) => json!({
            "error": "Failed to access saved analyses",
            "details": err.to_string()
        }),
        _ => json!({ "error": err.to_string() }),
    };
    (status, Json(body))
}

#[derive(Clone)]
pub struct AppState {
    pub pipeline: ReportPipeline,
    pub sessions: Arc<dyn SessionStorage>,
    pub identity: Arc<dyn IdentityProvider>,
    pub config: Arc<MediClearConfig>,
}

impl AppState {
    /// In-memory sessions and accounts around `pipeline`.
    pub fn new(pipeline: ReportPipeline, config: MediClearConfig) -> Self {
        Self {
            pipeline,
            sessions: Arc::new(InMemorySessionStorage::new()),
            identity: Arc::new(InMemoryIdentityProvider::new()),
            config: Arc::new(config),
        }
    }
}

pub async fn create_app(config: MediClearConfig) -> mediclear::Result<Router> {
    let store = create_analysis_store(&config).await;
    let pipeline = ReportPipeline::from_config(&config, store)?;
    if !pipeline.is_ready() {
        warn!("GEMINI_API_KEY not set; analysis and translation requests will fail");
    }
    Ok(build_router(AppState::new(pipeline, config)))
}

async fn create_analysis_store(config: &MediClearConfig) -> Arc<dyn AnalysisStore> {
    match &config.database_url {
        Some(database_url) => {
            info!("Using PostgreSQL analysis store");
            match PostgresAnalysisStore::connect(database_url).await {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    error!(
                        "Failed to connect to PostgreSQL: {}. Falling back to in-memory storage.",
                        e
                    );
                    Arc::new(InMemoryAnalysisStore::new())
                }
            }
        }
        None => {
            info!("Using in-memory analysis store (set DATABASE_URL to use PostgreSQL)");
            Arc::new(InMemoryAnalysisStore::new())
        }
    }
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/api/health", get(health_check))
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/profile", get(get_profile).patch(update_profile))
        .route("/api/analyze", post(analyze_document))
        .route("/api/session", get(get_session).delete(clear_session))
        .route("/api/language", post(select_language))
        .route("/api/translate", post(translate))
        .route("/api/chat", post(chat))
        .route("/api/analyses", get(list_analyses))
        .route("/api/analyses/count", get(count_analyses))
        .route(
            "/api/analyses/{id}",
            get(get_analysis).delete(delete_analysis),
        )
        .route("/api/analyses/{id}/open", post(open_analysis))
        .route("/api/speech/plan", post(speech_plan))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(correlation_id_middleware))
        .with_state(app_state)
}

/// Tags every request with a correlation id (the caller's, or a fresh one) and
/// runs it inside a span carrying that id.
async fn correlation_id_middleware(
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let correlation_id = request
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let header_value = HeaderValue::from_str(&correlation_id).ok();
    if let Some(value) = &header_value {
        request
            .headers_mut()
            .insert(CORRELATION_ID_HEADER, value.clone());
    }

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    let mut response = next.run(request).instrument(span).await;
    if let Some(value) = header_value {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }
    response
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

async fn current_user(state: &AppState, headers: &HeaderMap) -> Result<Identity, ApiError> {
    let token =
        bearer_token(headers).ok_or_else(|| unauthorized_error("Missing bearer token"))?;
    state.identity.resolve(token).await.map_err(api_error)
}

async fn user_session(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<(Identity, Arc<AnalysisSession>), ApiError> {
    let user = current_user(state, headers).await?;
    let session = state
        .sessions
        .get_or_create(&user.user_id)
        .await
        .map_err(api_error)?;
    Ok((user, session))
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "MediClear API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Plain-language explanations of medical reports, with translation and follow-up chat",
        "endpoints": {
            "GET /health": "Health check",
            "GET /api/health": "Health check",
            "POST /api/auth/register": "Create an account",
            "POST /api/auth/login": "Sign in",
            "POST /api/auth/logout": "Sign out and drop the session",
            "GET /api/profile": "Current user and number of saved analyses",
            "PATCH /api/profile": "Change the display name",
            "POST /api/analyze": "Analyze a Base64 encoded document",
            "GET /api/session": "Current analysis, language and chat",
            "DELETE /api/session": "Clear the current analysis",
            "POST /api/language": "Switch the display language",
            "POST /api/translate": "Translate the current analysis without switching language",
            "POST /api/chat": "Ask a follow-up question",
            "GET /api/analyses": "Recent analyses",
            "GET /api/analyses/count": "Number of saved analyses",
            "GET /api/analyses/{id}": "One saved analysis",
            "DELETE /api/analyses/{id}": "Delete a saved analysis",
            "POST /api/analyses/{id}/open": "Make a saved analysis the current one",
            "POST /api/speech/plan": "Voice settings for reading text aloud"
        }
    }))
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "apiKeyConfigured": state.pipeline.is_ready(),
        "model": state.config.model,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let session = state
        .identity
        .register(&request.email, &request.password, &request.display_name)
        .await
        .map_err(api_error)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token: session.token,
            user: session.identity,
        }),
    ))
}

async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<AuthResponse> {
    let session = state
        .identity
        .login(&request.email, &request.password)
        .await
        .map_err(api_error)?;

    Ok(Json(AuthResponse {
        token: session.token,
        user: session.identity,
    }))
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<StatusCode, ApiError> {
    let user = current_user(&state, &headers).await?;
    if let Some(token) = bearer_token(&headers) {
        state.identity.sign_out(token).await.map_err(api_error)?;
    }
    state
        .sessions
        .delete(&user.user_id)
        .await
        .map_err(api_error)?;
    info!(user_id = %user.user_id, "Signed out");
    Ok(StatusCode::NO_CONTENT)
}

async fn get_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<ProfileResponse> {
    let user = current_user(&state, &headers).await?;
    let analysis_count = state
        .pipeline
        .history()
        .count(&user.user_id)
        .await
        .map_err(api_error)?;

    Ok(Json(ProfileResponse {
        user,
        analysis_count,
    }))
}

async fn update_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<UpdateProfileRequest>,
) -> ApiResult<Identity> {
    let user = current_user(&state, &headers).await?;
    let updated = state
        .identity
        .update_profile(&user.user_id, &request.display_name)
        .await
        .map_err(api_error)?;
    Ok(Json(updated))
}

async fn analyze_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<AnalyzeRequest>,
) -> ApiResult<Value> {
    let (user, session) = user_session(&state, &headers).await?;
    info!(
        user_id = %user.user_id,
        mime_type = %request.mime_type,
        "Starting document analysis"
    );

    let document =
        DocumentPayload::from_base64(request.base64_data, &request.mime_type).map_err(api_error)?;
    let outcome = state
        .pipeline
        .analyze(&session, Some(&user), &document)
        .await
        .map_err(api_error)?;

    // persistence and pre-fetch keep running after the response is sent
    Ok(Json(json!(outcome.result.as_ref())))
}

async fn get_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<SessionView> {
    let (_, session) = user_session(&state, &headers).await?;
    Ok(Json(session.view().await))
}

async fn clear_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let (_, session) = user_session(&state, &headers).await?;
    session.clear().await;
    Ok(StatusCode::NO_CONTENT)
}

async fn select_language(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<LanguageRequest>,
) -> ApiResult<LanguageResponse> {
    let (_, session) = user_session(&state, &headers).await?;
    let result = state
        .pipeline
        .select_language(&session, &request.language)
        .await
        .map_err(api_error)?;

    Ok(Json(LanguageResponse {
        language: session.language().await,
        result: result.as_ref().clone(),
    }))
}

async fn translate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<TranslateRequest>,
) -> ApiResult<Value> {
    let (_, session) = user_session(&state, &headers).await?;
    let translated = state
        .pipeline
        .translate(&session, &request.target_language)
        .await
        .map_err(api_error)?;
    Ok(Json(json!(translated.as_ref())))
}

async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Value> {
    let (_, session) = user_session(&state, &headers).await?;
    let reply = state
        .pipeline
        .ask(&session, &request.question)
        .await
        .map_err(api_error)?;
    Ok(Json(json!(reply)))
}

async fn list_analyses(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<HistoryResponse> {
    let user = current_user(&state, &headers).await?;
    let limit = query.limit.unwrap_or(state.config.history_limit);
    let items = state
        .pipeline
        .history()
        .recent(&user.user_id, limit)
        .await
        .map_err(api_error)?;
    Ok(Json(HistoryResponse { items }))
}

async fn count_analyses(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<CountResponse> {
    let user = current_user(&state, &headers).await?;
    let count = state
        .pipeline
        .history()
        .count(&user.user_id)
        .await
        .map_err(api_error)?;
    Ok(Json(CountResponse { count }))
}

async fn get_analysis(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    let user = current_user(&state, &headers).await?;
    let record = state
        .pipeline
        .history()
        .get(&user.user_id, &id)
        .await
        .map_err(api_error)?;
    Ok(Json(json!(record)))
}

async fn delete_analysis(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let user = current_user(&state, &headers).await?;
    state
        .pipeline
        .history()
        .delete(&user.user_id, &id)
        .await
        .map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn open_analysis(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    let (user, session) = user_session(&state, &headers).await?;
    let result = state
        .pipeline
        .open_saved(&session, &user, &id)
        .await
        .map_err(api_error)?;
    Ok(Json(json!(result.as_ref())))
}

async fn speech_plan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SpeechRequest>,
) -> ApiResult<SpeechResponse> {
    current_user(&state, &headers).await?;
    let language = request.language.as_deref().unwrap_or("en");
    let plan = plan_speech(&request.text, language, request.available_voices.as_deref());
    let fallback = plan.fallback();
    Ok(Json(SpeechResponse { plan, fallback }))
}
