use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context;
use axum::{
    Extension, Json, Router,
    extract::{Path, Query, Request, State},
    http::{HeaderValue, Method, StatusCode, header, request::Parts},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use chrono::{NaiveDate, Utc};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;

use crate::api::{
    CalendarQuery, ChangePasswordRequest, CheckResponse, CompletionRequest, CreateRoutineRequest,
    ErrorResponse, LoginRequest, LoginResponse, MessageResponse, SignupRequest, SignupResponse,
    StatusRequest, UpdateRoutineRequest,
};
use crate::auth;
use routinest_core::calendar::load_calendar;
use routinest_core::db::Database;
use routinest_core::local_store::{LocalRoutineStore, MemoryStore};
use routinest_core::models::{
    CalendarEntry, CalendarRoutine, CalendarWindow, MAX_WINDOW_DAYS, NewRoutine, RoutineStatus, RoutineSummary,
    UpdateRoutine, User, normalize_url, parse_day, validate_email, validate_name,
    validate_password, validate_title,
};
use routinest_core::reconcile::Reconciler;
use routinest_core::service::{UserRoutines, today_utc};

const BODY_LIMIT: usize = 1024 * 1024; // 1 MB
const EXTENSION_ORIGIN_PREFIX: &[u8] = b"chrome-extension://";

#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Database>>,
}

impl AppState {
    fn db(&self) -> MutexGuard<'_, Database> {
        self.db
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// The caller resolved from a bearer session.
#[derive(Clone)]
struct AuthUser {
    user: User,
    token: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            Self::Internal(err) => {
                tracing::error!("Internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

fn bad_request(err: &anyhow::Error) -> ApiError {
    ApiError::BadRequest(format!("{err}"))
}

// --- Middleware ---

async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(ToString::to_string)
        .ok_or_else(|| ApiError::Unauthorized("Unauthorized".to_string()))?;

    let user = state
        .db()
        .get_session_user(&token, Utc::now())
        .context("session lookup failed")?
        .ok_or_else(|| ApiError::Unauthorized("Unauthorized".to_string()))?;

    request.extensions_mut().insert(AuthUser { user, token });
    Ok(next.run(request).await)
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

fn extension_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            |origin: &HeaderValue, _parts: &Parts| {
                origin.as_bytes().starts_with(EXTENSION_ORIGIN_PREFIX)
            },
        ))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

// --- Account handlers ---

async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<(StatusCode, Json<SignupResponse>), ApiError> {
    let email = validate_email(&req.email).map_err(|e| bad_request(&e))?;
    validate_password(&req.password).map_err(|e| bad_request(&e))?;
    let name = validate_name(&req.name).map_err(|e| bad_request(&e))?;

    if state.db().get_user_by_email(&email)?.is_some() {
        return Err(ApiError::BadRequest("Email already exists".to_string()));
    }

    let password_hash = auth::hash_password(&req.password);
    let user = state
        .db()
        .create_user(&email, &name, &password_hash)
        .context("failed to create user")?;
    tracing::info!(user_id = %user.id, "created account");

    let mut imported = 0;
    if !req.local_routines.is_empty() {
        let store = MemoryStore::with_routines(&req.local_routines)?;
        let reconciler = Reconciler::new(
            Box::new(UserRoutines::new(state.db.clone(), &user.id, today_utc())),
            LocalRoutineStore::new(Box::new(store)),
        );
        let report = reconciler.reconcile(None).await?;
        imported = report.created;
    }

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            message: "User created successfully".to_string(),
            user_id: user.id,
            imported,
        }),
    ))
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let invalid = || ApiError::Unauthorized("Invalid credentials".to_string());
    let email = req.email.trim().to_lowercase();

    let (user, hash) = state.db().get_credentials(&email)?.ok_or_else(invalid)?;
    if !auth::verify_password(&req.password, &hash) {
        return Err(invalid());
    }

    let now = Utc::now();
    let token = auth::generate_token();
    let session = {
        let db = state.db();
        db.purge_expired_sessions(now)?;
        db.create_session(&user.id, &token, auth::session_expiry(now))?
    };

    Ok(Json(LoginResponse {
        token: session.token,
        user_id: user.id,
        email: user.email,
        name: user.name,
        expires_at: session.expires_at,
    }))
}

async fn logout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.db().delete_session(&auth.token)?;
    Ok(Json(MessageResponse {
        message: "Logged out".to_string(),
    }))
}

async fn check(Extension(auth): Extension<AuthUser>) -> Json<CheckResponse> {
    Json(CheckResponse {
        authenticated: true,
        user_id: auth.user.id,
        email: auth.user.email,
        name: auth.user.name,
    })
}

async fn change_password(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    validate_password(&req.new_password).map_err(|e| bad_request(&e))?;

    let current = state.db().get_password_hash(&auth.user.id)?;
    if !auth::verify_password(&req.current_password, &current) {
        return Err(ApiError::BadRequest(
            "Current password is incorrect".to_string(),
        ));
    }

    let new_hash = auth::hash_password(&req.new_password);
    {
        let db = state.db();
        db.update_password(&auth.user.id, &new_hash)?;
        db.delete_user_sessions(&auth.user.id, Some(&auth.token))?;
    }

    Ok(Json(MessageResponse {
        message: "Password updated successfully".to_string(),
    }))
}

// --- Routine handlers ---

/// 404 for unknown routines, 403 for routines owned by someone else.
fn authorize_routine(db: &Database, routine_id: &str, user: &User) -> Result<(), ApiError> {
    match db.get_routine_owner(routine_id)? {
        None => Err(ApiError::NotFound("Routine not found".to_string())),
        Some(owner) if owner != user.id => Err(ApiError::Forbidden("Not authorized".to_string())),
        Some(_) => Ok(()),
    }
}

async fn list_routines(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<RoutineSummary>>, ApiError> {
    let routines = state.db().list_routines(&auth.user.id, today_utc())?;
    Ok(Json(routines))
}

async fn create_routine(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<CreateRoutineRequest>,
) -> Result<(StatusCode, Json<RoutineSummary>), ApiError> {
    let title = validate_title(&req.title).map_err(|e| bad_request(&e))?;
    let routine = NewRoutine {
        title,
        url: normalize_url(req.url.as_deref()),
        completed: req.completed,
    };
    let created = state
        .db()
        .insert_routine(&auth.user.id, &routine, today_utc())
        .context("failed to insert routine")?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_routine(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(req): Json<UpdateRoutineRequest>,
) -> Result<Json<RoutineSummary>, ApiError> {
    let title = validate_title(&req.title).map_err(|e| bad_request(&e))?;
    let db = state.db();
    authorize_routine(&db, &id, &auth.user)?;
    let updated = db.update_routine(
        &id,
        &UpdateRoutine {
            title,
            url: normalize_url(req.url.as_deref()),
        },
        today_utc(),
    )?;
    Ok(Json(updated))
}

async fn set_routine_completion(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(req): Json<CompletionRequest>,
) -> Result<Json<RoutineSummary>, ApiError> {
    let today = today_utc();
    let db = state.db();
    authorize_routine(&db, &id, &auth.user)?;
    db.set_status(&id, today, req.completed)?;
    Ok(Json(db.get_routine_summary(&id, today)?))
}

async fn delete_routine(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let db = state.db();
    authorize_routine(&db, &id, &auth.user)?;
    db.delete_routine(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<RoutineStatus>, ApiError> {
    let db = state.db();
    authorize_routine(&db, &req.routine_id, &auth.user)?;
    let status = db.set_status(&req.routine_id, today_utc(), req.completed)?;
    Ok(Json(status))
}

fn parse_window(query: &CalendarQuery, today: NaiveDate) -> Result<CalendarWindow, ApiError> {
    let start = parse_day(&query.start).map_err(|e| bad_request(&e))?;
    let end = parse_day(&query.end).map_err(|e| bad_request(&e))?;
    if start > end {
        return Err(ApiError::BadRequest(
            "start must not be after end".to_string(),
        ));
    }
    let span = (end.max(today) - start).num_days();
    if span > MAX_WINDOW_DAYS {
        return Err(ApiError::BadRequest(format!(
            "Calendar window must not span more than {MAX_WINDOW_DAYS} days"
        )));
    }
    Ok(CalendarWindow::new(start, end))
}

async fn calendar_routines(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<CalendarQuery>,
) -> Result<Json<Vec<CalendarRoutine>>, ApiError> {
    let window = parse_window(&query, today_utc())?;
    let routines = state.db().list_calendar_routines(&auth.user.id, window)?;
    Ok(Json(routines))
}

async fn calendar_events(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<CalendarQuery>,
) -> Result<Json<Vec<CalendarEntry>>, ApiError> {
    let today = today_utc();
    let window = parse_window(&query, today)?;
    let gateway = UserRoutines::new(state.db.clone(), &auth.user.id, today);
    let entries = load_calendar(&gateway, window, today).await?;
    Ok(Json(entries))
}

fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/check", get(check))
        .route("/api/auth/change-password", post(change_password))
        .route("/api/routines", get(list_routines).post(create_routine))
        .route(
            "/api/routines/{id}",
            put(update_routine)
                .patch(set_routine_completion)
                .delete(delete_routine),
        )
        .route("/api/routines/status", post(set_status))
        .route("/api/routines/calendar", get(calendar_routines))
        .route("/api/routines/calendar/events", get(calendar_events))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/api/auth/signup", post(signup))
        .route("/api/auth/login", post(login))
        .merge(protected)
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(extension_cors())
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

/// Router over an owned database.
pub(crate) fn router(db: Database) -> Router {
    build_router(AppState {
        db: Arc::new(Mutex::new(db)),
    })
}

// --- Server startup ---

pub async fn start_server(db: Database, port: u16, bind: &str) -> anyhow::Result<()> {
    let purged = db.purge_expired_sessions(Utc::now())?;
    if purged > 0 {
        tracing::info!(purged, "removed expired sessions");
    }

    let app = router(db);

    if bind != "127.0.0.1" && bind != "localhost" {
        tracing::warn!("Listening on {bind}. Any device on your network can reach this API.");
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("failed to bind {bind}:{port}"))?;
    tracing::info!("Listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}
