//! services/api/src/web/sessions.rs
//!
//! Study-session endpoints: start a session on a readable deck, follow its
//! counters while reviews are recorded into it, then pause, resume, complete or
//! abandon it.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use flashcard_lms_core::access::owns_or_admin;
use flashcard_lms_core::domain::{NewStudySession, SessionStatus, StudyMode, StudySession, User};
use flashcard_lms_core::permissions::Permission;
use flashcard_lms_core::sessions;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{not_found, ApiError, ErrorResponse};
use crate::web::decks::load_readable_deck;
use crate::web::middleware::{ensure_permission, CurrentUser};
use crate::web::state::AppState;

//=========================================================================================
// DTOs
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct StartSessionRequest {
    pub deck_id: Uuid,
    /// One of `review`, `practice`, `cram`, `test`, `learn`.
    #[schema(value_type = String, example = "review")]
    pub study_mode: StudyMode,
    pub lesson_id: Option<Uuid>,
    pub target_cards: Option<i32>,
    /// Minutes.
    pub target_time: Option<i32>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateSessionRequest {
    /// `active` resumes a paused session; `paused`, `completed` and `abandoned` as named.
    #[schema(value_type = String, example = "paused")]
    pub status: SessionStatus,
}

#[derive(Serialize, ToSchema)]
pub struct StudySessionResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub deck_id: Uuid,
    pub lesson_id: Option<Uuid>,
    #[schema(value_type = String)]
    pub study_mode: StudyMode,
    pub target_cards: Option<i32>,
    pub target_time: Option<i32>,
    pub cards_studied: i32,
    pub correct_answers: i32,
    pub incorrect_answers: i32,
    /// Seconds from start to finish; zero while the session is open.
    pub total_time: i64,
    #[schema(value_type = String)]
    pub status: SessionStatus,
    pub accuracy_rate: Option<f64>,
    pub cards_per_minute: Option<f64>,
    pub target_reached: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl From<StudySession> for StudySessionResponse {
    fn from(session: StudySession) -> Self {
        Self {
            accuracy_rate: session.accuracy_rate(),
            cards_per_minute: session.cards_per_minute(),
            target_reached: session.target_reached(),
            id: session.id,
            user_id: session.user_id,
            deck_id: session.deck_id,
            lesson_id: session.lesson_id,
            study_mode: session.study_mode,
            target_cards: session.target_cards,
            target_time: session.target_time,
            cards_studied: session.cards_studied,
            correct_answers: session.correct_answers,
            incorrect_answers: session.incorrect_answers,
            total_time: session.total_time,
            status: session.status,
            started_at: session.started_at,
            completed_at: session.completed_at,
            updated_at: session.updated_at,
        }
    }
}

//=========================================================================================
// Helpers
//=========================================================================================

/// Loads a session its owner (or an admin) may see.
async fn load_visible_session(
    state: &AppState,
    user: &User,
    session_id: Uuid,
) -> Result<StudySession, ApiError> {
    let session = state
        .db
        .get_study_session_by_id(session_id)
        .await
        .map_err(not_found("Study session not found"))?;
    if !owns_or_admin(user, session.user_id) {
        return Err(ApiError::Forbidden("Access denied to this session".to_string()));
    }
    Ok(session)
}

/// Loads a session only its owner may record into or move.
pub(crate) async fn load_own_session(
    state: &AppState,
    user: &User,
    session_id: Uuid,
) -> Result<StudySession, ApiError> {
    let session = load_visible_session(state, user, session_id).await?;
    if session.user_id != user.id {
        return Err(ApiError::Forbidden("Access denied to this session".to_string()));
    }
    Ok(session)
}

fn positive_target(value: Option<i32>, field: &str) -> Result<Option<i32>, ApiError> {
    match value {
        Some(v) if v <= 0 => Err(ApiError::Validation(format!("{} must be positive", field))),
        other => Ok(other),
    }
}

async fn move_session(
    state: &AppState,
    user: &User,
    session_id: Uuid,
    to: SessionStatus,
) -> Result<StudySession, ApiError> {
    let session = load_own_session(state, user, session_id).await?;
    sessions::check_transition(session.status, to)?;

    let moved = state
        .db
        .update_study_session_status(session.id, session.status, to, Utc::now())
        .await?;
    info!(
        session_id = %moved.id,
        user_id = %user.id,
        from = %session.status,
        to = %moved.status,
        cards_studied = moved.cards_studied,
        "study session status changed"
    );
    Ok(moved)
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /study/sessions - Start a study session on a deck the caller can read
#[utoipa::path(
    post,
    path = "/study/sessions",
    tag = "study",
    request_body = StartSessionRequest,
    responses(
        (status = 201, description = "Session started", body = StudySessionResponse),
        (status = 403, description = "Role lacks study:all or no access to the deck", body = ErrorResponse),
        (status = 404, description = "Deck or lesson not found", body = ErrorResponse),
        (status = 422, description = "Non-positive target", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn start_session_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<StartSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_permission(&user, Permission::StudyAll)?;
    let target_cards = positive_target(req.target_cards, "target_cards")?;
    let target_time = positive_target(req.target_time, "target_time")?;

    let (deck, _) = load_readable_deck(&state, &user, req.deck_id).await?;
    if let Some(lesson_id) = req.lesson_id {
        state
            .db
            .get_lesson_by_id(lesson_id)
            .await
            .map_err(not_found("Lesson not found"))?;
    }

    let session = state
        .db
        .create_study_session(NewStudySession {
            user_id: user.id,
            deck_id: deck.id,
            lesson_id: req.lesson_id,
            study_mode: req.study_mode,
            target_cards,
            target_time,
        })
        .await?;

    info!(
        session_id = %session.id,
        user_id = %user.id,
        deck_id = %deck.id,
        study_mode = %session.study_mode,
        "study session started"
    );
    Ok((StatusCode::CREATED, Json(StudySessionResponse::from(session))))
}

/// GET /study/sessions - The caller's sessions, newest first
#[utoipa::path(
    get,
    path = "/study/sessions",
    tag = "study",
    responses((status = 200, description = "The caller's sessions", body = [StudySessionResponse])),
    security(("bearer_auth" = []))
)]
pub async fn list_sessions_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<Vec<StudySessionResponse>>, ApiError> {
    let sessions = state.db.list_study_sessions(user.id).await?;
    Ok(Json(sessions.into_iter().map(Into::into).collect()))
}

/// GET /study/sessions/{session_id} - One session with its analytics
#[utoipa::path(
    get,
    path = "/study/sessions/{session_id}",
    tag = "study",
    params(("session_id" = Uuid, Path, description = "The session")),
    responses(
        (status = 200, description = "Session", body = StudySessionResponse),
        (status = 403, description = "Session belongs to someone else", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_session_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<StudySessionResponse>, ApiError> {
    let session = load_visible_session(&state, &user, session_id).await?;
    Ok(Json(session.into()))
}

/// PATCH /study/sessions/{session_id} - Pause, resume, complete or abandon a session
#[utoipa::path(
    patch,
    path = "/study/sessions/{session_id}",
    tag = "study",
    params(("session_id" = Uuid, Path, description = "The session")),
    request_body = UpdateSessionRequest,
    responses(
        (status = 200, description = "Status changed", body = StudySessionResponse),
        (status = 403, description = "Session belongs to someone else", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 409, description = "Transition not allowed from the current status", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_session_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<UpdateSessionRequest>,
) -> Result<Json<StudySessionResponse>, ApiError> {
    let session = move_session(&state, &user, session_id, req.status).await?;
    Ok(Json(session.into()))
}

/// POST /study/sessions/{session_id}/complete - Finish a session
#[utoipa::path(
    post,
    path = "/study/sessions/{session_id}/complete",
    tag = "study",
    params(("session_id" = Uuid, Path, description = "The session")),
    responses(
        (status = 200, description = "Session completed", body = StudySessionResponse),
        (status = 403, description = "Session belongs to someone else", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 409, description = "Session already finished", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn complete_session_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<StudySessionResponse>, ApiError> {
    let session = move_session(&state, &user, session_id, SessionStatus::Completed).await?;
    Ok(Json(session.into()))
}
