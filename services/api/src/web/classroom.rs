//! services/api/src/web/classroom.rs
//!
//! Class, course, lesson and enrollment endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use flashcard_lms_core::access::owns_or_admin;
use flashcard_lms_core::domain::{
    Class, Course, Enrollment, EnrollmentScope, EnrollmentStatus, Lesson, NewClass, NewCourse,
    NewEnrollment, NewLesson, User,
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

const CLASS_CODE_LEN: usize = 8;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CreateClassRequest {
    pub name: String,
    pub description: Option<String>,
    /// Generated when omitted.
    pub class_code: Option<String>,
    pub max_students: Option<i32>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateCourseRequest {
    pub title: String,
    pub description: Option<String>,
    /// Appends the course to this class.
    pub class_id: Option<Uuid>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateLessonRequest {
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScopeType {
    Class,
    Course,
    Lesson,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateEnrollmentRequest {
    pub user_id: Uuid,
    pub scope_type: ScopeType,
    pub target_id: Uuid,
    /// Defaults to `enrolled`.
    #[schema(value_type = Option<String>, example = "pending_approval")]
    pub status: Option<EnrollmentStatus>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateEnrollmentRequest {
    #[schema(value_type = String, example = "enrolled")]
    pub status: EnrollmentStatus,
}

#[derive(Serialize, ToSchema)]
pub struct ClassResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub teacher_id: Uuid,
    pub class_code: String,
    pub course_ids: Vec<Uuid>,
    pub max_students: Option<i32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Class> for ClassResponse {
    fn from(class: Class) -> Self {
        Self {
            id: class.id,
            name: class.name,
            description: class.description,
            teacher_id: class.teacher_id,
            class_code: class.class_code,
            course_ids: class.course_ids,
            max_students: class.max_students,
            is_active: class.is_active,
            created_at: class.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct CourseResponse {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub creator_id: Uuid,
    pub lesson_ids: Vec<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Course> for CourseResponse {
    fn from(course: Course) -> Self {
        Self {
            id: course.id,
            title: course.title,
            description: course.description,
            creator_id: course.creator_id,
            lesson_ids: course.lesson_ids,
            is_active: course.is_active,
            created_at: course.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct LessonResponse {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub order_index: i32,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Lesson> for LessonResponse {
    fn from(lesson: Lesson) -> Self {
        Self {
            id: lesson.id,
            course_id: lesson.course_id,
            title: lesson.title,
            description: lesson.description,
            order_index: lesson.order_index,
            is_published: lesson.is_published,
            created_at: lesson.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct EnrollmentResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub scope_type: String,
    pub target_id: Uuid,
    #[schema(value_type = String, example = "enrolled")]
    pub status: EnrollmentStatus,
    pub enrolled_by: Option<Uuid>,
    pub enrolled_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Enrollment> for EnrollmentResponse {
    fn from(enrollment: Enrollment) -> Self {
        Self {
            id: enrollment.id,
            user_id: enrollment.user_id,
            scope_type: enrollment.scope.kind().to_string(),
            target_id: enrollment.scope.target_id(),
            status: enrollment.status,
            enrolled_by: enrollment.enrolled_by,
            enrolled_at: enrollment.enrolled_at,
            updated_at: enrollment.updated_at,
        }
    }
}

//=========================================================================================
// Helpers
//=========================================================================================

fn required_text(value: &str, field: &str, max_len: usize) -> Result<String, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.chars().count() > max_len {
        return Err(ApiError::Validation(format!(
            "{} must be between 1 and {} characters",
            field, max_len
        )));
    }
    Ok(trimmed.to_string())
}

fn generate_class_code() -> String {
    Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(CLASS_CODE_LEN)
        .collect::<String>()
        .to_uppercase()
}

/// The teacher of a class, or the creator of a course. A lesson belongs to its
/// course's creator.
async fn container_owner(state: &AppState, scope: EnrollmentScope) -> Result<Uuid, ApiError> {
    match scope {
        EnrollmentScope::Class(class_id) => {
            let class = state
                .db
                .get_class_by_id(class_id)
                .await
                .map_err(not_found("Class not found"))?;
            Ok(class.teacher_id)
        }
        EnrollmentScope::Course(course_id) => {
            let course = state
                .db
                .get_course_by_id(course_id)
                .await
                .map_err(not_found("Course not found"))?;
            Ok(course.creator_id)
        }
        EnrollmentScope::Lesson(lesson_id) => {
            let lesson = state
                .db
                .get_lesson_by_id(lesson_id)
                .await
                .map_err(not_found("Lesson not found"))?;
            let course = state
                .db
                .get_course_by_id(lesson.course_id)
                .await
                .map_err(not_found("Course not found"))?;
            Ok(course.creator_id)
        }
    }
}

async fn ensure_manages(state: &AppState, user: &User, scope: EnrollmentScope) -> Result<(), ApiError> {
    let owner_id = container_owner(state, scope).await?;
    if user.is_admin() {
        return Ok(());
    }
    ensure_permission(user, Permission::StudentManage)?;
    if !owns_or_admin(user, owner_id) {
        return Err(ApiError::Forbidden(format!(
            "Access denied. You don't manage this {}",
            scope.kind()
        )));
    }
    Ok(())
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /classes - Create a class taught by the caller
#[utoipa::path(
    post,
    path = "/classes",
    tag = "classroom",
    request_body = CreateClassRequest,
    responses(
        (status = 201, description = "Class created", body = ClassResponse),
        (status = 403, description = "Role lacks class:create", body = ErrorResponse),
        (status = 409, description = "Class code already in use", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_class_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<CreateClassRequest>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_permission(&user, Permission::ClassCreate)?;

    let name = required_text(&req.name, "Name", 200)?;
    let class_code = match req.class_code {
        Some(code) => required_text(&code, "Class code", 20)?.to_uppercase(),
        None => generate_class_code(),
    };
    if req.max_students.is_some_and(|max| max < 1) {
        return Err(ApiError::Validation("max_students must be positive".to_string()));
    }

    let class = state
        .db
        .create_class(NewClass {
            name,
            description: req.description,
            teacher_id: user.id,
            class_code,
            max_students: req.max_students,
        })
        .await?;

    info!(class_id = %class.id, teacher_id = %user.id, class_code = %class.class_code, "class created");
    Ok((StatusCode::CREATED, Json(ClassResponse::from(class))))
}

/// POST /courses - Create a course, optionally appended to one of the caller's classes
#[utoipa::path(
    post,
    path = "/courses",
    tag = "classroom",
    request_body = CreateCourseRequest,
    responses(
        (status = 201, description = "Course created", body = CourseResponse),
        (status = 403, description = "Role lacks course:create or caller does not teach the class", body = ErrorResponse),
        (status = 404, description = "Class not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_course_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<CreateCourseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_permission(&user, Permission::CourseCreate)?;
    let title = required_text(&req.title, "Title", 200)?;

    if let Some(class_id) = req.class_id {
        let class = state
            .db
            .get_class_by_id(class_id)
            .await
            .map_err(not_found("Class not found"))?;
        if !owns_or_admin(&user, class.teacher_id) {
            return Err(ApiError::Forbidden(
                "Access denied. You don't teach this class".to_string(),
            ));
        }
    }

    let course = state
        .db
        .create_course(NewCourse {
            title,
            description: req.description,
            creator_id: user.id,
            class_id: req.class_id,
        })
        .await?;

    info!(course_id = %course.id, creator_id = %user.id, "course created");
    Ok((StatusCode::CREATED, Json(CourseResponse::from(course))))
}

/// POST /courses/{course_id}/lessons - Append a lesson to a course
#[utoipa::path(
    post,
    path = "/courses/{course_id}/lessons",
    tag = "classroom",
    params(("course_id" = Uuid, Path, description = "The parent course")),
    request_body = CreateLessonRequest,
    responses(
        (status = 201, description = "Lesson created", body = LessonResponse),
        (status = 403, description = "Caller did not create the course", body = ErrorResponse),
        (status = 404, description = "Course not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_lesson_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(course_id): Path<Uuid>,
    Json(req): Json<CreateLessonRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let course = state
        .db
        .get_course_by_id(course_id)
        .await
        .map_err(not_found("Course not found"))?;
    if !owns_or_admin(&user, course.creator_id) {
        return Err(ApiError::Forbidden(
            "Access denied. You don't own this course".to_string(),
        ));
    }
    let title = required_text(&req.title, "Title", 200)?;

    let lesson = state
        .db
        .create_lesson(NewLesson {
            course_id: course.id,
            title,
            description: req.description,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(LessonResponse::from(lesson))))
}

/// POST /enrollments - Enroll a user in a class, course or lesson
#[utoipa::path(
    post,
    path = "/enrollments",
    tag = "classroom",
    request_body = CreateEnrollmentRequest,
    responses(
        (status = 201, description = "Enrollment created", body = EnrollmentResponse),
        (status = 403, description = "Caller does not manage the container", body = ErrorResponse),
        (status = 404, description = "User or container not found", body = ErrorResponse),
        (status = 409, description = "User already enrolled", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_enrollment_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<CreateEnrollmentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = match req.scope_type {
        ScopeType::Class => EnrollmentScope::Class(req.target_id),
        ScopeType::Course => EnrollmentScope::Course(req.target_id),
        ScopeType::Lesson => EnrollmentScope::Lesson(req.target_id),
    };
    ensure_manages(&state, &user, scope).await?;

    state
        .db
        .get_user_by_id(req.user_id)
        .await
        .map_err(not_found("User not found"))?;

    let enrollment = state
        .db
        .create_enrollment(NewEnrollment {
            user_id: req.user_id,
            scope,
            status: req.status.unwrap_or(EnrollmentStatus::Enrolled),
            enrolled_by: Some(user.id),
        })
        .await?;

    info!(
        enrollment_id = %enrollment.id,
        user_id = %enrollment.user_id,
        scope = scope.kind(),
        target_id = %scope.target_id(),
        status = %enrollment.status,
        "user enrolled"
    );
    Ok((StatusCode::CREATED, Json(EnrollmentResponse::from(enrollment))))
}

/// PATCH /enrollments/{enrollment_id} - Change an enrollment's status
#[utoipa::path(
    patch,
    path = "/enrollments/{enrollment_id}",
    tag = "classroom",
    params(("enrollment_id" = Uuid, Path, description = "The enrollment")),
    request_body = UpdateEnrollmentRequest,
    responses(
        (status = 200, description = "Status updated", body = EnrollmentResponse),
        (status = 403, description = "Caller does not manage the container", body = ErrorResponse),
        (status = 404, description = "Enrollment not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_enrollment_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(enrollment_id): Path<Uuid>,
    Json(req): Json<UpdateEnrollmentRequest>,
) -> Result<Json<EnrollmentResponse>, ApiError> {
    let enrollment = state
        .db
        .get_enrollment_by_id(enrollment_id)
        .await
        .map_err(not_found("Enrollment not found"))?;
    ensure_manages(&state, &user, enrollment.scope).await?;

    let updated = state
        .db
        .update_enrollment_status(enrollment.id, req.status)
        .await?;

    info!(
        enrollment_id = %updated.id,
        from = %enrollment.status,
        to = %updated.status,
        "enrollment status changed"
    );
    Ok(Json(updated.into()))
}
