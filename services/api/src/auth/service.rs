//! services/api/src/auth/service.rs
//!
//! Account workflows: registration, login, token refresh and logout, bearer
//! authentication, and the three password change paths.

use chrono::{DateTime, Utc};
use flashcard_lms_core::domain::{NewUser, Role, User};
use flashcard_lms_core::ports::{DatabaseService, PortError};
use regex::Regex;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::password::{validate_password_strength, PasswordHasher};
use crate::auth::tokens::{TokenError, TokenPair, TokenService, TokenType};
use crate::error::{not_found, ApiError};

const USERNAME_MIN_LEN: usize = 3;
const USERNAME_MAX_LEN: usize = 50;
const FULL_NAME_MAX_LEN: usize = 100;

const EMAIL_PATTERN: &str = r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$";

/// A self-registration request after it has been deserialized.
#[derive(Debug, Clone)]
pub struct Registration {
    pub email: String,
    pub username: String,
    pub password: String,
    pub full_name: String,
    pub role: Role,
}

/// A user together with a freshly issued token pair.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    pub tokens: TokenPair,
}

#[derive(Debug, Clone)]
pub struct PasswordResetOutcome {
    pub user_id: Uuid,
    pub reset_by: Uuid,
    pub reset_at: DateTime<Utc>,
    pub force_change_required: bool,
}

pub struct AuthService {
    db: Arc<dyn DatabaseService>,
    tokens: Arc<TokenService>,
    passwords: PasswordHasher,
    email_pattern: Regex,
}

impl AuthService {
    pub fn new(
        db: Arc<dyn DatabaseService>,
        tokens: Arc<TokenService>,
        passwords: PasswordHasher,
    ) -> Result<Self, ApiError> {
        let email_pattern = Regex::new(EMAIL_PATTERN)
            .map_err(|e| ApiError::Internal(format!("invalid email pattern: {}", e)))?;
        Ok(Self {
            db,
            tokens,
            passwords,
            email_pattern,
        })
    }

    pub fn tokens(&self) -> &Arc<TokenService> {
        &self.tokens
    }

    /// Creates a student or teacher account. Admin accounts are never self-registered.
    pub async fn register(&self, registration: Registration) -> Result<User, ApiError> {
        let email = normalize_email(&self.email_pattern, &registration.email)?;
        let username = normalize_username(&registration.username)?;
        let full_name = normalize_full_name(&registration.full_name)?;
        validate_password_strength(&registration.password).map_err(ApiError::Validation)?;

        if registration.role == Role::Admin {
            return Err(ApiError::BadRequest(
                "Admin accounts cannot be self-registered".to_string(),
            ));
        }
        if self.db.email_taken(&email).await? {
            return Err(ApiError::BadRequest("Email already registered".to_string()));
        }
        if self.db.username_taken(&username).await? {
            return Err(ApiError::BadRequest("Username already taken".to_string()));
        }

        let hashed_password = self.passwords.hash(&registration.password)?;
        let user = self
            .db
            .create_user(NewUser {
                email,
                username,
                full_name,
                hashed_password,
                role: registration.role,
            })
            .await?;

        info!(user_id = %user.id, role = %user.role, "registered new user");
        Ok(user)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session, ApiError> {
        let invalid = || ApiError::Unauthorized("Invalid email or password".to_string());

        let email = email.trim().to_lowercase();
        let credentials = match self.db.get_credentials_by_email(&email).await {
            Ok(credentials) => credentials,
            Err(PortError::NotFound(_)) => return Err(invalid()),
            Err(e) => return Err(e.into()),
        };
        if !self.passwords.verify(password, &credentials.hashed_password)? {
            warn!(user_id = %credentials.user.id, "failed login attempt");
            return Err(invalid());
        }

        let mut user = credentials.user;
        if !user.is_active {
            return Err(ApiError::BadRequest("User account is disabled".to_string()));
        }

        let now = Utc::now();
        self.db.record_login(user.id, now).await?;
        user.last_login_at = Some(now);

        let tokens = self.issue(&user)?;
        info!(user_id = %user.id, "user logged in");
        Ok(Session { user, tokens })
    }

    /// Exchanges a refresh token for a new pair. The presented token is revoked, so
    /// each refresh token can be exchanged at most once.
    pub async fn refresh(&self, refresh_token: &str) -> Result<Session, ApiError> {
        let claims = self.tokens.verify(refresh_token, TokenType::Refresh)?;

        let user = match self.db.get_user_by_id(claims.sub).await {
            Ok(user) if user.is_active => user,
            Ok(_) | Err(PortError::NotFound(_)) => {
                return Err(ApiError::Unauthorized("User not found or inactive".to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        if !self.tokens.revoke_verified(refresh_token, &claims) {
            warn!(user_id = %user.id, "refresh token reused concurrently");
            return Err(TokenError::Revoked.into());
        }

        let tokens = self.issue(&user)?;
        Ok(Session { user, tokens })
    }

    /// Revokes the bearer token and any extra tokens the client hands back.
    pub fn logout<'t>(&self, user: &User, tokens: impl IntoIterator<Item = &'t str>) {
        let revoked = tokens
            .into_iter()
            .filter(|token| !token.is_empty())
            .filter(|token| self.tokens.revoke(token))
            .count();
        info!(user_id = %user.id, revoked, "user logged out");
    }

    /// Resolves a bearer access token to its live user.
    pub async fn authenticate(&self, access_token: &str) -> Result<User, ApiError> {
        let claims = self.tokens.verify(access_token, TokenType::Access)?;

        let user = match self.db.get_user_by_id(claims.sub).await {
            Ok(user) => user,
            Err(PortError::NotFound(_)) => return Err(TokenError::Malformed.into()),
            Err(e) => return Err(e.into()),
        };
        if !user.is_active {
            return Err(ApiError::BadRequest("Inactive user".to_string()));
        }
        Ok(user)
    }

    pub async fn change_password(
        &self,
        user: &User,
        current_password: &str,
        new_password: &str,
    ) -> Result<DateTime<Utc>, ApiError> {
        validate_password_strength(new_password).map_err(ApiError::Validation)?;

        let credentials = self
            .db
            .get_credentials_by_id(user.id)
            .await
            .map_err(not_found("User not found"))?;
        if !self.passwords.verify(current_password, &credentials.hashed_password)? {
            return Err(ApiError::BadRequest("Current password is incorrect".to_string()));
        }

        let hashed = self.passwords.hash(new_password)?;
        self.db.update_user_password(user.id, &hashed, false).await?;
        info!(user_id = %user.id, "password changed");
        Ok(Utc::now())
    }

    pub async fn admin_reset_password(
        &self,
        admin: &User,
        user_id: Uuid,
        new_password: &str,
        force_change_on_login: bool,
        reason: Option<&str>,
    ) -> Result<PasswordResetOutcome, ApiError> {
        if !admin.is_admin() {
            return Err(ApiError::Forbidden("Admin role required".to_string()));
        }
        validate_password_strength(new_password).map_err(ApiError::Validation)?;

        let target = self
            .db
            .get_user_by_id(user_id)
            .await
            .map_err(not_found("User not found"))?;

        let hashed = self.passwords.hash(new_password)?;
        self.db
            .update_user_password(target.id, &hashed, force_change_on_login)
            .await?;

        info!(
            admin_id = %admin.id,
            user_id = %target.id,
            reason = reason.unwrap_or("-"),
            "admin reset user password"
        );
        Ok(PasswordResetOutcome {
            user_id: target.id,
            reset_by: admin.id,
            reset_at: Utc::now(),
            force_change_required: force_change_on_login,
        })
    }

    /// A teacher may reset the password of a student enrolled in one of their classes
    /// or courses. Admins may reset any student. The student must always pick a new
    /// password at next login.
    pub async fn teacher_reset_password(
        &self,
        teacher: &User,
        student_id: Uuid,
        new_password: &str,
        reason: Option<&str>,
    ) -> Result<PasswordResetOutcome, ApiError> {
        if !matches!(teacher.role, Role::Teacher | Role::Admin) {
            return Err(ApiError::Forbidden("Teacher role required".to_string()));
        }
        validate_password_strength(new_password).map_err(ApiError::Validation)?;

        let student = self
            .db
            .get_user_by_id(student_id)
            .await
            .map_err(not_found("Student not found"))?;
        if student.role != Role::Student {
            return Err(ApiError::BadRequest("Target user is not a student".to_string()));
        }
        if !teacher.is_admin() && !self.db.teacher_has_student(teacher.id, student.id).await? {
            return Err(ApiError::Forbidden(
                "You can only reset passwords for your own students".to_string(),
            ));
        }

        let hashed = self.passwords.hash(new_password)?;
        self.db.update_user_password(student.id, &hashed, true).await?;

        info!(
            teacher_id = %teacher.id,
            student_id = %student.id,
            reason = reason.unwrap_or("-"),
            "teacher reset student password"
        );
        Ok(PasswordResetOutcome {
            user_id: student.id,
            reset_by: teacher.id,
            reset_at: Utc::now(),
            force_change_required: true,
        })
    }

    fn issue(&self, user: &User) -> Result<TokenPair, ApiError> {
        self.tokens.issue_pair(user).map_err(|e| {
            error!("Failed to sign tokens: {:?}", e);
            ApiError::Internal("Failed to issue tokens".to_string())
        })
    }
}

fn normalize_email(pattern: &Regex, raw: &str) -> Result<String, ApiError> {
    let email = raw.trim().to_lowercase();
    if !pattern.is_match(&email) {
        return Err(ApiError::Validation("Invalid email address".to_string()));
    }
    Ok(email)
}

fn normalize_username(raw: &str) -> Result<String, ApiError> {
    let username = raw.trim();
    let len = username.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Err(ApiError::Validation(format!(
            "Username must be between {} and {} characters",
            USERNAME_MIN_LEN, USERNAME_MAX_LEN
        )));
    }
    if !username.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ApiError::Validation(
            "Username must contain only letters and numbers".to_string(),
        ));
    }
    Ok(username.to_lowercase())
}

fn normalize_full_name(raw: &str) -> Result<String, ApiError> {
    let full_name = raw.trim();
    if full_name.is_empty() || full_name.chars().count() > FULL_NAME_MAX_LEN {
        return Err(ApiError::Validation(format!(
            "Full name must be between 1 and {} characters",
            FULL_NAME_MAX_LEN
        )));
    }
    Ok(full_name.to_string())
}
