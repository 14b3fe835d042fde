//! services/api/src/web/decks.rs
//!
//! Deck, flashcard and deck-assignment endpoints. Every read goes through the
//! access resolver; every write is limited to the deck owner or an admin.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use flashcard_lms_core::access::{owns_or_admin, AccessDecision, AssignmentGrant};
use flashcard_lms_core::domain::{
    AssignmentStatus, AssignmentTarget, AssignmentType, CompletionCriteria, Deck, DeckAssignment,
    Flashcard, NewDeck, NewDeckAssignment, NewFlashcard, PrivacyLevel, Role, User,
};
use flashcard_lms_core::permissions::Permission;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{not_found, ApiError, ErrorResponse};
use crate::web::middleware::{ensure_permission, CurrentUser};
use crate::web::state::AppState;

const DECK_TITLE_MAX_LEN: usize = 200;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CreateDeckRequest {
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    #[schema(value_type = String, example = "private")]
    pub privacy_level: PrivacyLevel,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdatePrivacyRequest {
    #[schema(value_type = String, example = "class-assigned")]
    pub privacy_level: PrivacyLevel,
}

#[derive(Deserialize)]
pub struct AccessibleDecksQuery {
    pub privacy_level: Option<PrivacyLevel>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateFlashcardRequest {
    pub question: String,
    pub answer: String,
    pub hint: Option<String>,
    pub explanation: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateAssignmentRequest {
    /// `class`, `course`, `lesson` or `individual`.
    #[schema(value_type = String, example = "class")]
    pub target_type: AssignmentType,
    pub target_id: Uuid,
    /// Defaults to the deck title.
    pub title: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    #[schema(value_type = Option<Object>)]
    pub completion_criteria: Option<CompletionCriteria>,
}

#[derive(Serialize, ToSchema)]
pub struct DeckResponse {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    #[schema(value_type = String, example = "public")]
    pub privacy_level: PrivacyLevel,
    pub card_count: i32,
    pub tags: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Deck> for DeckResponse {
    fn from(deck: Deck) -> Self {
        Self {
            id: deck.id,
            owner_id: deck.owner_id,
            title: deck.title,
            description: deck.description,
            privacy_level: deck.privacy_level,
            card_count: deck.card_count,
            tags: deck.tags,
            is_active: deck.is_active,
            created_at: deck.created_at,
            updated_at: deck.updated_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct AssignmentGrantResponse {
    pub assignment_id: Uuid,
    #[schema(value_type = String, example = "class")]
    pub assignment_type: AssignmentType,
    pub target_id: Uuid,
    pub assigned_at: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
}

impl From<AssignmentGrant> for AssignmentGrantResponse {
    fn from(grant: AssignmentGrant) -> Self {
        Self {
            assignment_id: grant.assignment_id,
            assignment_type: grant.assignment_type,
            target_id: grant.target_id,
            assigned_at: grant.assigned_at,
            due_date: grant.due_date,
        }
    }
}

/// A deck together with the reason the caller may read it.
#[derive(Serialize, ToSchema)]
pub struct DeckDetailResponse {
    pub deck: DeckResponse,
    /// `admin`, `owner`, `public` or `assigned`.
    pub access_via: String,
    pub assignment: Option<AssignmentGrantResponse>,
}

#[derive(Serialize, ToSchema)]
pub struct DeckAccessResponse {
    pub deck_id: Uuid,
    /// Whether the caller may read the deck by any rule.
    pub can_read: bool,
    /// Whether any class, course or lesson assignment currently opens the deck.
    pub has_assignment_access: bool,
    #[schema(value_type = Option<String>)]
    pub access_type: Option<AssignmentType>,
    pub assignments: Vec<AssignmentGrantResponse>,
}

#[derive(Serialize, ToSchema)]
pub struct FlashcardResponse {
    pub id: Uuid,
    pub deck_id: Uuid,
    pub question: String,
    pub answer: String,
    pub hint: Option<String>,
    pub explanation: Option<String>,
    pub repetitions: i32,
    pub ease_factor: f64,
    pub interval_days: i32,
    pub next_review: Option<DateTime<Utc>>,
    pub review_count: i32,
    pub correct_count: i32,
    pub incorrect_count: i32,
    pub created_at: DateTime<Utc>,
}

impl From<Flashcard> for FlashcardResponse {
    fn from(card: Flashcard) -> Self {
        Self {
            id: card.id,
            deck_id: card.deck_id,
            question: card.question,
            answer: card.answer,
            hint: card.hint,
            explanation: card.explanation,
            repetitions: card.sm2.repetitions,
            ease_factor: card.sm2.ease_factor,
            interval_days: card.sm2.interval,
            next_review: card.sm2.next_review,
            review_count: card.stats.review_count,
            correct_count: card.stats.correct_count,
            incorrect_count: card.stats.incorrect_count,
            created_at: card.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct AssignmentResponse {
    pub id: Uuid,
    pub deck_id: Uuid,
    pub assigned_by: Uuid,
    #[schema(value_type = String, example = "course")]
    pub target_type: AssignmentType,
    pub target_id: Uuid,
    pub title: String,
    #[schema(value_type = String, example = "assigned")]
    pub status: AssignmentStatus,
    pub assigned_at: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    #[schema(value_type = Option<Object>)]
    pub completion_criteria: Option<CompletionCriteria>,
}

impl From<DeckAssignment> for AssignmentResponse {
    fn from(assignment: DeckAssignment) -> Self {
        Self {
            id: assignment.id,
            deck_id: assignment.deck_id,
            assigned_by: assignment.assigned_by,
            target_type: assignment.target.assignment_type(),
            target_id: assignment.target.target_id(),
            title: assignment.title,
            status: assignment.status,
            assigned_at: assignment.assigned_at,
            due_date: assignment.due_date,
            completion_criteria: assignment.completion_criteria,
        }
    }
}

//=========================================================================================
// Shared Lookups
//=========================================================================================

async fn load_deck(state: &AppState, deck_id: Uuid) -> Result<Deck, ApiError> {
    state
        .db
        .get_deck_by_id(deck_id)
        .await
        .map_err(not_found("Deck not found"))
}

/// Soft-deleted decks are hidden from everyone but admins.
async fn load_visible_deck(state: &AppState, user: &User, deck_id: Uuid) -> Result<Deck, ApiError> {
    let deck = load_deck(state, deck_id).await?;
    if !deck.is_active && !user.is_admin() {
        return Err(ApiError::NotFound("Deck not found".to_string()));
    }
    Ok(deck)
}

/// Loads a deck the user may read.
pub(crate) async fn load_readable_deck(
    state: &AppState,
    user: &User,
    deck_id: Uuid,
) -> Result<(Deck, AccessDecision), ApiError> {
    let deck = load_visible_deck(state, user, deck_id).await?;
    let decision = state.access().check_deck_access(user, &deck).await?;
    if !decision.is_granted() {
        return Err(ApiError::Forbidden("Access denied to this deck".to_string()));
    }
    Ok((deck, decision))
}

/// Loads a live deck the user may modify.
async fn load_owned_deck(state: &AppState, user: &User, deck_id: Uuid) -> Result<Deck, ApiError> {
    let deck = load_visible_deck(state, user, deck_id).await?;
    if !owns_or_admin(user, deck.owner_id) {
        return Err(ApiError::Forbidden(
            "Access denied. You don't own this deck".to_string(),
        ));
    }
    Ok(deck)
}

/// Checks the assignment target exists and belongs to the assigning teacher.
async fn resolve_assignment_target(
    state: &AppState,
    user: &User,
    target_type: AssignmentType,
    target_id: Uuid,
) -> Result<AssignmentTarget, ApiError> {
    let (target, owner_id) = match target_type {
        AssignmentType::Class => {
            let class = state
                .db
                .get_class_by_id(target_id)
                .await
                .map_err(not_found("Class not found"))?;
            (AssignmentTarget::Class(class.id), Some(class.teacher_id))
        }
        AssignmentType::Course => {
            let course = state
                .db
                .get_course_by_id(target_id)
                .await
                .map_err(not_found("Course not found"))?;
            (AssignmentTarget::Course(course.id), Some(course.creator_id))
        }
        AssignmentType::Lesson => {
            let lesson = state
                .db
                .get_lesson_by_id(target_id)
                .await
                .map_err(not_found("Lesson not found"))?;
            let course = state
                .db
                .get_course_by_id(lesson.course_id)
                .await
                .map_err(not_found("Course not found"))?;
            (AssignmentTarget::Lesson(lesson.id), Some(course.creator_id))
        }
        AssignmentType::Individual => {
            let student = state
                .db
                .get_user_by_id(target_id)
                .await
                .map_err(not_found("Student not found"))?;
            if student.role != Role::Student {
                return Err(ApiError::BadRequest("Target user is not a student".to_string()));
            }
            (AssignmentTarget::Student(student.id), None)
        }
    };

    if let Some(owner_id) = owner_id {
        if !owns_or_admin(user, owner_id) {
            return Err(ApiError::Forbidden(format!(
                "Access denied. You don't own this {}",
                target_type
            )));
        }
    }
    Ok(target)
}

fn access_via(decision: &AccessDecision) -> (&'static str, Option<AssignmentGrantResponse>) {
    match decision {
        AccessDecision::Admin => ("admin", None),
        AccessDecision::Owner => ("owner", None),
        AccessDecision::Public => ("public", None),
        AccessDecision::Assigned(grant) => ("assigned", Some(grant.clone().into())),
        AccessDecision::Denied => ("denied", None),
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /decks - Create a deck owned by the caller
#[utoipa::path(
    post,
    path = "/decks",
    tag = "decks",
    request_body = CreateDeckRequest,
    responses(
        (status = 201, description = "Deck created", body = DeckResponse),
        (status = 403, description = "Role lacks deck:create", body = ErrorResponse),
        (status = 422, description = "Invalid title", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_deck_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<CreateDeckRequest>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_permission(&user, Permission::DeckCreate)?;

    let title = req.title.trim();
    if title.is_empty() || title.chars().count() > DECK_TITLE_MAX_LEN {
        return Err(ApiError::Validation(format!(
            "Title must be between 1 and {} characters",
            DECK_TITLE_MAX_LEN
        )));
    }

    let deck = state
        .db
        .create_deck(NewDeck {
            owner_id: user.id,
            title: title.to_string(),
            description: req.description,
            privacy_level: req.privacy_level,
            tags: req.tags,
        })
        .await?;

    info!(deck_id = %deck.id, owner_id = %user.id, privacy_level = %deck.privacy_level, "deck created");
    Ok((StatusCode::CREATED, Json(DeckResponse::from(deck))))
}

/// GET /decks/mine - Decks owned by the caller
#[utoipa::path(
    get,
    path = "/decks/mine",
    tag = "decks",
    responses((status = 200, description = "Owned decks, newest first", body = [DeckResponse])),
    security(("bearer_auth" = []))
)]
pub async fn my_decks_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<Vec<DeckResponse>>, ApiError> {
    let decks = state.db.list_decks_by_owner(user.id).await?;
    Ok(Json(decks.into_iter().map(DeckResponse::from).collect()))
}

/// GET /decks/accessible - Every live deck the caller can read
#[utoipa::path(
    get,
    path = "/decks/accessible",
    tag = "decks",
    params(("privacy_level" = Option<String>, Query, description = "Restrict to one privacy level")),
    responses((status = 200, description = "Readable decks, newest first", body = [DeckResponse])),
    security(("bearer_auth" = []))
)]
pub async fn accessible_decks_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(query): Query<AccessibleDecksQuery>,
) -> Result<Json<Vec<DeckResponse>>, ApiError> {
    let decks = state.access().accessible_decks(&user, query.privacy_level).await?;
    Ok(Json(decks.into_iter().map(DeckResponse::from).collect()))
}

/// GET /decks/{deck_id} - Read a deck the caller has access to
#[utoipa::path(
    get,
    path = "/decks/{deck_id}",
    tag = "decks",
    params(("deck_id" = Uuid, Path, description = "The deck")),
    responses(
        (status = 200, description = "The deck and how the caller reaches it", body = DeckDetailResponse),
        (status = 403, description = "No access", body = ErrorResponse),
        (status = 404, description = "Deck not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_deck_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(deck_id): Path<Uuid>,
) -> Result<Json<DeckDetailResponse>, ApiError> {
    let (deck, decision) = load_readable_deck(&state, &user, deck_id).await?;
    let (via, assignment) = access_via(&decision);

    Ok(Json(DeckDetailResponse {
        deck: deck.into(),
        access_via: via.to_string(),
        assignment,
    }))
}

/// DELETE /decks/{deck_id} - Soft-delete a deck
#[utoipa::path(
    delete,
    path = "/decks/{deck_id}",
    tag = "decks",
    params(("deck_id" = Uuid, Path, description = "The deck")),
    responses(
        (status = 204, description = "Deck deleted"),
        (status = 403, description = "Caller does not own the deck", body = ErrorResponse),
        (status = 404, description = "Deck not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_deck_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(deck_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let deck = load_owned_deck(&state, &user, deck_id).await?;
    state.db.soft_delete_deck(deck.id).await?;

    info!(deck_id = %deck.id, user_id = %user.id, "deck deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// PATCH /decks/{deck_id}/privacy - Change a deck's privacy level
#[utoipa::path(
    patch,
    path = "/decks/{deck_id}/privacy",
    tag = "decks",
    params(("deck_id" = Uuid, Path, description = "The deck")),
    request_body = UpdatePrivacyRequest,
    responses(
        (status = 200, description = "Privacy updated", body = DeckResponse),
        (status = 400, description = "Deck still has active assignments", body = ErrorResponse),
        (status = 403, description = "Caller does not own the deck", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_privacy_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(deck_id): Path<Uuid>,
    Json(req): Json<UpdatePrivacyRequest>,
) -> Result<Json<DeckResponse>, ApiError> {
    let deck = load_owned_deck(&state, &user, deck_id).await?;

    if !state
        .access()
        .validate_privacy_change(&user, &deck, req.privacy_level)
        .await?
    {
        return Err(ApiError::BadRequest(
            "Cannot make a deck private while it has active assignments".to_string(),
        ));
    }

    let updated = state.db.update_deck_privacy(deck.id, req.privacy_level).await?;
    info!(
        deck_id = %deck.id,
        from = %deck.privacy_level,
        to = %updated.privacy_level,
        "deck privacy changed"
    );
    Ok(Json(updated.into()))
}

/// GET /decks/{deck_id}/access - Which assignments open the deck to the caller
#[utoipa::path(
    get,
    path = "/decks/{deck_id}/access",
    tag = "decks",
    params(("deck_id" = Uuid, Path, description = "The deck")),
    responses(
        (status = 200, description = "Access report", body = DeckAccessResponse),
        (status = 404, description = "Deck not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn deck_access_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(deck_id): Path<Uuid>,
) -> Result<Json<DeckAccessResponse>, ApiError> {
    let deck = load_visible_deck(&state, &user, deck_id).await?;
    let access = state.access();
    let decision = access.check_deck_access(&user, &deck).await?;
    let report = access.assignment_report(&user, &deck).await?;

    Ok(Json(DeckAccessResponse {
        deck_id: deck.id,
        can_read: decision.is_granted(),
        has_assignment_access: report.has_access,
        access_type: report.access_type,
        assignments: report.assignments.into_iter().map(Into::into).collect(),
    }))
}

/// POST /decks/{deck_id}/assignments - Assign a deck to a class, course, lesson or student
#[utoipa::path(
    post,
    path = "/decks/{deck_id}/assignments",
    tag = "decks",
    params(("deck_id" = Uuid, Path, description = "The deck")),
    request_body = CreateAssignmentRequest,
    responses(
        (status = 201, description = "Deck assigned", body = AssignmentResponse),
        (status = 403, description = "Caller lacks assignment:create or does not own the deck or target", body = ErrorResponse),
        (status = 404, description = "Deck or target not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_assignment_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(deck_id): Path<Uuid>,
    Json(req): Json<CreateAssignmentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_permission(&user, Permission::AssignmentCreate)?;
    let deck = load_owned_deck(&state, &user, deck_id).await?;
    let target = resolve_assignment_target(&state, &user, req.target_type, req.target_id).await?;

    let title = req
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| deck.title.clone());

    let assignment = state
        .db
        .create_deck_assignment(NewDeckAssignment {
            deck_id: deck.id,
            assigned_by: user.id,
            target,
            title,
            due_date: req.due_date,
            completion_criteria: req.completion_criteria,
        })
        .await?;

    info!(
        deck_id = %deck.id,
        assignment_id = %assignment.id,
        target_type = %req.target_type,
        target_id = %req.target_id,
        "deck assigned"
    );
    Ok((StatusCode::CREATED, Json(AssignmentResponse::from(assignment))))
}

/// GET /decks/{deck_id}/cards - Cards in a readable deck
#[utoipa::path(
    get,
    path = "/decks/{deck_id}/cards",
    tag = "decks",
    params(("deck_id" = Uuid, Path, description = "The deck")),
    responses(
        (status = 200, description = "Cards in creation order", body = [FlashcardResponse]),
        (status = 403, description = "No access", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_cards_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(deck_id): Path<Uuid>,
) -> Result<Json<Vec<FlashcardResponse>>, ApiError> {
    let (deck, _) = load_readable_deck(&state, &user, deck_id).await?;
    let cards = state.db.list_flashcards(deck.id).await?;
    Ok(Json(cards.into_iter().map(FlashcardResponse::from).collect()))
}

/// POST /decks/{deck_id}/cards - Add a card to an owned deck
#[utoipa::path(
    post,
    path = "/decks/{deck_id}/cards",
    tag = "decks",
    params(("deck_id" = Uuid, Path, description = "The deck")),
    request_body = CreateFlashcardRequest,
    responses(
        (status = 201, description = "Card created", body = FlashcardResponse),
        (status = 403, description = "Caller does not own the deck", body = ErrorResponse),
        (status = 422, description = "Empty question or answer", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_card_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(deck_id): Path<Uuid>,
    Json(req): Json<CreateFlashcardRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let deck = load_owned_deck(&state, &user, deck_id).await?;

    let question = req.question.trim();
    let answer = req.answer.trim();
    if question.is_empty() || answer.is_empty() {
        return Err(ApiError::Validation(
            "Question and answer must not be empty".to_string(),
        ));
    }

    let card = state
        .db
        .create_flashcard(NewFlashcard {
            deck_id: deck.id,
            question: question.to_string(),
            answer: answer.to_string(),
            hint: req.hint,
            explanation: req.explanation,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(FlashcardResponse::from(card))))
}
