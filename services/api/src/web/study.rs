//! services/api/src/web/study.rs
//!
//! The review endpoint: grades one flashcard, reschedules it with SM-2 and, when a
//! session is named, counts the review into that study session.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use flashcard_lms_core::permissions::Permission;
use flashcard_lms_core::scheduling;
use flashcard_lms_core::sessions;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{not_found, ApiError, ErrorResponse};
use crate::web::decks::load_readable_deck;
use crate::web::middleware::{ensure_permission, CurrentUser};
use crate::web::sessions::{load_own_session, StudySessionResponse};
use crate::web::state::AppState;

#[derive(Deserialize, ToSchema)]
pub struct ReviewRequest {
    /// Recall quality from 0 (blackout) to 5 (perfect).
    pub quality: u8,
    /// An active session of the caller's on the card's deck.
    #[serde(default)]
    pub session_id: Option<Uuid>,
}

#[derive(Serialize, ToSchema)]
pub struct ReviewResponse {
    pub card_id: Uuid,
    pub quality: u8,
    pub was_correct: bool,
    pub repetitions: i32,
    pub ease_factor: f64,
    pub interval_days: i32,
    pub next_review: Option<DateTime<Utc>>,
    pub review_count: i32,
    /// Share of correct reviews, between 0 and 1.
    pub accuracy: f64,
    /// The session the review was counted into, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<StudySessionResponse>,
}

/// POST /cards/{card_id}/review - Record a review and schedule the next one
#[utoipa::path(
    post,
    path = "/cards/{card_id}/review",
    tag = "study",
    params(("card_id" = Uuid, Path, description = "The reviewed card")),
    request_body = ReviewRequest,
    responses(
        (status = 200, description = "Review recorded", body = ReviewResponse),
        (status = 400, description = "Card is not on the session's deck", body = ErrorResponse),
        (status = 403, description = "No access to the card's deck or the session", body = ErrorResponse),
        (status = 404, description = "Card or session not found", body = ErrorResponse),
        (status = 409, description = "Session is not active", body = ErrorResponse),
        (status = 422, description = "Quality outside 0-5", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn review_card_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(card_id): Path<Uuid>,
    Json(req): Json<ReviewRequest>,
) -> Result<Json<ReviewResponse>, ApiError> {
    ensure_permission(&user, Permission::StudyAll)?;

    let card = state
        .db
        .get_flashcard_by_id(card_id)
        .await
        .map_err(not_found("Flashcard not found"))?;
    if !card.is_active {
        return Err(ApiError::NotFound("Flashcard not found".to_string()));
    }
    load_readable_deck(&state, &user, card.deck_id).await?;

    let session = match req.session_id {
        Some(session_id) => {
            let session = load_own_session(&state, &user, session_id).await?;
            sessions::check_recordable(&session, card.deck_id)?;
            Some(session)
        }
        None => None,
    };

    let now = Utc::now();
    let sm2 = scheduling::review(&card.sm2, req.quality, now)?;
    let was_correct = scheduling::is_correct(req.quality);
    let mut stats = card.stats.clone();
    stats.record(was_correct);

    let saved = state.db.save_flashcard_review(card.id, &sm2, &stats).await?;
    debug!(
        card_id = %saved.id,
        user_id = %user.id,
        quality = req.quality,
        interval = saved.sm2.interval,
        "card reviewed"
    );

    let session = match session {
        Some(session) => Some(state.db.record_session_review(session.id, was_correct, now).await?),
        None => None,
    };

    Ok(Json(ReviewResponse {
        card_id: saved.id,
        quality: req.quality,
        was_correct,
        repetitions: saved.sm2.repetitions,
        ease_factor: saved.sm2.ease_factor,
        interval_days: saved.sm2.interval,
        next_review: saved.sm2.next_review,
        review_count: saved.stats.review_count,
        accuracy: saved.stats.accuracy(),
        session: session.map(Into::into),
    }))
}
