//! services/api/src/web/rest.rs
//!
//! The master definition for the OpenAPI specification and the liveness endpoint.

use axum::Json;
use serde::Serialize;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi, ToSchema,
};

use crate::error::ErrorResponse;
use crate::web::{auth, classroom, decks, sessions, study};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        auth::register_handler,
        auth::login_handler,
        auth::login_form_handler,
        auth::refresh_handler,
        auth::logout_handler,
        auth::me_handler,
        auth::change_password_handler,
        auth::admin_reset_password_handler,
        auth::teacher_reset_password_handler,
        decks::create_deck_handler,
        decks::my_decks_handler,
        decks::accessible_decks_handler,
        decks::get_deck_handler,
        decks::delete_deck_handler,
        decks::update_privacy_handler,
        decks::deck_access_handler,
        decks::create_assignment_handler,
        decks::list_cards_handler,
        decks::create_card_handler,
        study::review_card_handler,
        sessions::start_session_handler,
        sessions::list_sessions_handler,
        sessions::get_session_handler,
        sessions::update_session_handler,
        sessions::complete_session_handler,
        classroom::create_class_handler,
        classroom::create_course_handler,
        classroom::create_lesson_handler,
        classroom::create_enrollment_handler,
        classroom::update_enrollment_handler,
    ),
    components(
        schemas(
            ErrorResponse,
            HealthResponse,
            auth::RegisterRequest,
            auth::LoginRequest,
            auth::LoginForm,
            auth::RefreshRequest,
            auth::LogoutRequest,
            auth::ChangePasswordRequest,
            auth::PasswordResetRequest,
            auth::TeacherPasswordResetRequest,
            auth::UserResponse,
            auth::TokenResponse,
            auth::MessageResponse,
            auth::ChangePasswordResponse,
            auth::PasswordResetResponse,
            decks::CreateDeckRequest,
            decks::UpdatePrivacyRequest,
            decks::CreateFlashcardRequest,
            decks::CreateAssignmentRequest,
            decks::DeckResponse,
            decks::DeckDetailResponse,
            decks::DeckAccessResponse,
            decks::AssignmentGrantResponse,
            decks::AssignmentResponse,
            decks::FlashcardResponse,
            study::ReviewRequest,
            study::ReviewResponse,
            sessions::StartSessionRequest,
            sessions::UpdateSessionRequest,
            sessions::StudySessionResponse,
            classroom::CreateClassRequest,
            classroom::CreateCourseRequest,
            classroom::CreateLessonRequest,
            classroom::CreateEnrollmentRequest,
            classroom::UpdateEnrollmentRequest,
            classroom::ScopeType,
            classroom::ClassResponse,
            classroom::CourseResponse,
            classroom::LessonResponse,
            classroom::EnrollmentResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Registration, login, token rotation and password management."),
        (name = "decks", description = "Decks, flashcards, privacy and deck assignments."),
        (name = "study", description = "SM-2 spaced-repetition reviews and study sessions."),
        (name = "classroom", description = "Classes, courses, lessons and enrollments."),
        (name = "health", description = "Liveness.")
    )
)]
pub struct ApiDoc;

/// Registers the `bearer_auth` scheme the protected paths refer to.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

//=========================================================================================
// Health
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

/// GET /health - Liveness check
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}
