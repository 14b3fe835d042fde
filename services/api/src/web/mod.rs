pub mod auth;
pub mod classroom;
pub mod decks;
pub mod middleware;
pub mod rest;
pub mod sessions;
pub mod state;
pub mod study;

pub use middleware::require_auth;
pub use state::AppState;

use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, patch, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use rest::ApiDoc;

/// Builds the complete application: public and bearer-protected API routes, CORS,
/// request tracing and the Swagger UI.
pub fn router(state: Arc<AppState>) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(rest::health_handler))
        .route("/auth/register", post(auth::register_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/login/form", post(auth::login_form_handler))
        .route("/auth/refresh", post(auth::refresh_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/auth/logout", post(auth::logout_handler))
        .route("/auth/me", get(auth::me_handler))
        .route("/auth/change-password", post(auth::change_password_handler))
        .route(
            "/auth/admin/users/{user_id}/reset-password",
            put(auth::admin_reset_password_handler),
        )
        .route(
            "/auth/teacher/students/{student_id}/reset-password",
            put(auth::teacher_reset_password_handler),
        )
        .route("/decks", post(decks::create_deck_handler))
        .route("/decks/mine", get(decks::my_decks_handler))
        .route("/decks/accessible", get(decks::accessible_decks_handler))
        .route(
            "/decks/{deck_id}",
            get(decks::get_deck_handler).delete(decks::delete_deck_handler),
        )
        .route("/decks/{deck_id}/privacy", patch(decks::update_privacy_handler))
        .route("/decks/{deck_id}/access", get(decks::deck_access_handler))
        .route("/decks/{deck_id}/assignments", post(decks::create_assignment_handler))
        .route(
            "/decks/{deck_id}/cards",
            get(decks::list_cards_handler).post(decks::create_card_handler),
        )
        .route("/cards/{card_id}/review", post(study::review_card_handler))
        .route(
            "/study/sessions",
            get(sessions::list_sessions_handler).post(sessions::start_session_handler),
        )
        .route(
            "/study/sessions/{session_id}",
            get(sessions::get_session_handler).patch(sessions::update_session_handler),
        )
        .route(
            "/study/sessions/{session_id}/complete",
            post(sessions::complete_session_handler),
        )
        .route("/classes", post(classroom::create_class_handler))
        .route("/courses", post(classroom::create_course_handler))
        .route("/courses/{course_id}/lessons", post(classroom::create_lesson_handler))
        .route("/enrollments", post(classroom::create_enrollment_handler))
        .route(
            "/enrollments/{enrollment_id}",
            patch(classroom::update_enrollment_handler),
        )
        .layer(axum_middleware::from_fn_with_state(state.clone(), require_auth));

    let cors = cors_layer(&state.config.cors_origins);

    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // Credentials cannot be combined with a wildcard origin.
    if origins.iter().any(|o| o == "*") {
        return base.allow_origin(AllowOrigin::any());
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    base.allow_origin(AllowOrigin::list(allowed))
        .allow_credentials(true)
}
