//! services/api/src/web/middleware.rs
//!
//! Bearer authentication middleware and the role/permission guards handlers call.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use flashcard_lms_core::domain::{Role, User};
use flashcard_lms_core::permissions::Permission;
use std::sync::Arc;

use crate::error::ApiError;
use crate::web::state::AppState;

/// The authenticated, active user behind the request.
#[derive(Clone, Debug)]
pub struct CurrentUser(pub User);

/// The raw bearer token the request was authenticated with, kept so logout can revoke it.
#[derive(Clone, Debug)]
pub struct BearerToken(pub String);

/// Middleware that validates the `Authorization: Bearer` access token.
///
/// If valid, inserts `CurrentUser` and `BearerToken` into request extensions.
/// If missing, malformed, expired or revoked, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let not_authenticated = || ApiError::Unauthorized("Not authenticated".to_string());

    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            v.strip_prefix("Bearer ")
                .or_else(|| v.strip_prefix("bearer "))
        })
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(not_authenticated)?
        .to_string();

    let user = state.auth.authenticate(&token).await?;

    req.extensions_mut().insert(CurrentUser(user));
    req.extensions_mut().insert(BearerToken(token));

    Ok(next.run(req).await)
}

pub fn ensure_permission(user: &User, permission: Permission) -> Result<(), ApiError> {
    if user.role.has_permission(permission) {
        return Ok(());
    }
    Err(ApiError::Forbidden(format!(
        "Access denied. Required permission: {}",
        permission
    )))
}

/// Passes users whose role ranks at or above `minimum` (student < teacher < admin).
pub fn ensure_min_role(user: &User, minimum: Role) -> Result<(), ApiError> {
    if user.role.at_least(minimum) {
        return Ok(());
    }
    let names: Vec<&str> = [Role::Student, Role::Teacher, Role::Admin]
        .iter()
        .filter(|role| role.at_least(minimum))
        .map(Role::as_str)
        .collect();
    Err(ApiError::Forbidden(format!(
        "Access denied. Required roles: {}",
        names.join(", ")
    )))
}
