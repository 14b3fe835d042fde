//! services/api/src/web/auth.rs
//!
//! Authentication endpoints: registration, login, token refresh, logout and the
//! password change and reset flows.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Form, Json,
};
use chrono::{DateTime, Utc};
use flashcard_lms_core::domain::{Role, User};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::service::{PasswordResetOutcome, Registration, Session};
use crate::error::{ApiError, ErrorResponse};
use crate::web::middleware::{ensure_min_role, BearerToken, CurrentUser};
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    pub full_name: String,
    /// `student` (default) or `teacher`.
    #[serde(default)]
    #[schema(value_type = String, example = "student")]
    pub role: Role,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// OAuth2 password-grant form; `username` carries the email address.
#[derive(Deserialize, ToSchema)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Extra tokens to revoke alongside the bearer token.
#[derive(Deserialize, Default, ToSchema)]
pub struct LogoutRequest {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct PasswordResetRequest {
    pub new_password: String,
    pub reset_reason: Option<String>,
    #[serde(default = "default_force_change")]
    pub force_change_on_login: bool,
}

fn default_force_change() -> bool {
    true
}

#[derive(Deserialize, ToSchema)]
pub struct TeacherPasswordResetRequest {
    pub new_password: String,
    pub reset_reason: Option<String>,
}

/// A user as returned by the API. Never carries the password hash.
#[derive(Serialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub full_name: String,
    #[schema(value_type = String, example = "teacher")]
    pub role: Role,
    pub is_active: bool,
    pub email_verified: bool,
    pub force_password_change: bool,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            username: user.username,
            full_name: user.full_name,
            role: user.role,
            is_active: user.is_active,
            email_verified: user.email_verified,
            force_password_change: user.force_password_change,
            created_at: user.created_at,
            last_login_at: user.last_login_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    pub user: UserResponse,
}

impl From<Session> for TokenResponse {
    fn from(session: Session) -> Self {
        Self {
            access_token: session.tokens.access_token,
            refresh_token: session.tokens.refresh_token,
            token_type: "bearer".to_string(),
            expires_in: session.tokens.expires_in,
            user: session.user.into(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct ChangePasswordResponse {
    pub user_id: Uuid,
    pub message: String,
    pub changed_at: DateTime<Utc>,
}

#[derive(Serialize, ToSchema)]
pub struct PasswordResetResponse {
    pub user_id: Uuid,
    pub message: String,
    pub reset_by: Uuid,
    pub reset_at: DateTime<Utc>,
    pub force_change_required: bool,
}

impl From<PasswordResetOutcome> for PasswordResetResponse {
    fn from(outcome: PasswordResetOutcome) -> Self {
        Self {
            user_id: outcome.user_id,
            message: "Password reset successfully".to_string(),
            reset_by: outcome.reset_by,
            reset_at: outcome.reset_at,
            force_change_required: outcome.force_change_required,
        }
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/register - Create a new student or teacher account
#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created successfully", body = UserResponse),
        (status = 400, description = "Duplicate email or username, or admin role requested", body = ErrorResponse),
        (status = 422, description = "A field failed validation", body = ErrorResponse)
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .auth
        .register(Registration {
            email: req.email,
            username: req.username,
            password: req.password,
            full_name: req.full_name,
            role: req.role,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// POST /auth/login - Exchange credentials for an access/refresh token pair
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = TokenResponse),
        (status = 400, description = "Account disabled", body = ErrorResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse)
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let session = state.auth.login(&req.email, &req.password).await?;
    Ok(Json(session.into()))
}

/// POST /auth/login/form - Form-encoded login for OAuth2 password-flow clients
#[utoipa::path(
    post,
    path = "/auth/login/form",
    tag = "auth",
    request_body(content = LoginForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Login successful", body = TokenResponse),
        (status = 400, description = "Account disabled", body = ErrorResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse)
    )
)]
pub async fn login_form_handler(
    State(state): State<Arc<AppState>>,
    Form(form): Form<LoginForm>,
) -> Result<Json<TokenResponse>, ApiError> {
    let session = state.auth.login(&form.username, &form.password).await?;
    Ok(Json(session.into()))
}

/// POST /auth/refresh - Rotate a refresh token into a new pair
#[utoipa::path(
    post,
    path = "/auth/refresh",
    tag = "auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair issued; the presented refresh token is revoked", body = TokenResponse),
        (status = 401, description = "Refresh token invalid, expired or already used", body = ErrorResponse)
    )
)]
pub async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let session = state.auth.refresh(&req.refresh_token).await?;
    Ok(Json(session.into()))
}

/// POST /auth/logout - Revoke the bearer token and any tokens in the body
#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "auth",
    request_body(content = LogoutRequest, description = "Optional extra tokens to revoke"),
    responses(
        (status = 200, description = "Logout successful", body = MessageResponse),
        (status = 401, description = "No valid bearer token", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(BearerToken(bearer)): Extension<BearerToken>,
    body: Option<Json<LogoutRequest>>,
) -> Result<Json<MessageResponse>, ApiError> {
    let extra = body.map(|Json(req)| req).unwrap_or_default();

    let tokens = [
        Some(bearer.as_str()),
        extra.access_token.as_deref(),
        extra.refresh_token.as_deref(),
    ];
    state.auth.logout(&user, tokens.into_iter().flatten());

    Ok(Json(MessageResponse {
        message: "Successfully logged out".to_string(),
    }))
}

/// GET /auth/me - The authenticated user
#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn me_handler(Extension(CurrentUser(user)): Extension<CurrentUser>) -> Json<UserResponse> {
    Json(user.into())
}

/// POST /auth/change-password - Change one's own password
#[utoipa::path(
    post,
    path = "/auth/change-password",
    tag = "auth",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = ChangePasswordResponse),
        (status = 400, description = "Current password is incorrect", body = ErrorResponse),
        (status = 422, description = "New password too weak", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn change_password_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<ChangePasswordResponse>, ApiError> {
    let changed_at = state
        .auth
        .change_password(&user, &req.current_password, &req.new_password)
        .await?;

    Ok(Json(ChangePasswordResponse {
        user_id: user.id,
        message: "Password changed successfully".to_string(),
        changed_at,
    }))
}

/// PUT /auth/admin/users/{user_id}/reset-password - Admin resets any user's password
#[utoipa::path(
    put,
    path = "/auth/admin/users/{user_id}/reset-password",
    tag = "auth",
    params(("user_id" = Uuid, Path, description = "The user whose password is reset")),
    request_body = PasswordResetRequest,
    responses(
        (status = 200, description = "Password reset", body = PasswordResetResponse),
        (status = 403, description = "Caller is not an admin", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn admin_reset_password_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<PasswordResetRequest>,
) -> Result<Json<PasswordResetResponse>, ApiError> {
    ensure_min_role(&admin, Role::Admin)?;

    let outcome = state
        .auth
        .admin_reset_password(
            &admin,
            user_id,
            &req.new_password,
            req.force_change_on_login,
            req.reset_reason.as_deref(),
        )
        .await?;
    Ok(Json(outcome.into()))
}

/// PUT /auth/teacher/students/{student_id}/reset-password - Teacher resets a student's password
#[utoipa::path(
    put,
    path = "/auth/teacher/students/{student_id}/reset-password",
    tag = "auth",
    params(("student_id" = Uuid, Path, description = "The student whose password is reset")),
    request_body = TeacherPasswordResetRequest,
    responses(
        (status = 200, description = "Password reset; the student must change it at next login", body = PasswordResetResponse),
        (status = 400, description = "Target user is not a student", body = ErrorResponse),
        (status = 403, description = "Student is not in one of the teacher's classes or courses", body = ErrorResponse),
        (status = 404, description = "Student not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn teacher_reset_password_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(teacher)): Extension<CurrentUser>,
    Path(student_id): Path<Uuid>,
    Json(req): Json<TeacherPasswordResetRequest>,
) -> Result<Json<PasswordResetResponse>, ApiError> {
    ensure_min_role(&teacher, Role::Teacher)?;

    let outcome = state
        .auth
        .teacher_reset_password(&teacher, student_id, &req.new_password, req.reset_reason.as_deref())
        .await?;
    Ok(Json(outcome.into()))
}
