//! crates/flashcard_lms_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete store behind it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    AssignmentType, CardStats, Class, Course, Deck, DeckAssignment, Enrollment, EnrollmentStatus,
    Flashcard, Lesson, NewClass, NewCourse, NewDeck, NewDeckAssignment, NewEnrollment, NewFlashcard,
    NewLesson, NewStudySession, NewUser, PrivacyLevel, SessionStatus, Sm2State, StudySession, User,
    UserCredentials,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// A uniqueness constraint (email, username, class code, enrollment) was violated.
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Users ---
    async fn create_user(&self, new_user: NewUser) -> PortResult<User>;

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User>;

    async fn get_credentials_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn get_credentials_by_id(&self, user_id: Uuid) -> PortResult<UserCredentials>;

    async fn email_taken(&self, email: &str) -> PortResult<bool>;

    async fn username_taken(&self, username: &str) -> PortResult<bool>;

    async fn update_user_password(
        &self,
        user_id: Uuid,
        hashed_password: &str,
        force_change: bool,
    ) -> PortResult<()>;

    async fn record_login(&self, user_id: Uuid, at: DateTime<Utc>) -> PortResult<()>;

    // --- Decks ---
    async fn create_deck(&self, new_deck: NewDeck) -> PortResult<Deck>;

    async fn get_deck_by_id(&self, deck_id: Uuid) -> PortResult<Deck>;

    async fn list_decks_by_owner(&self, owner_id: Uuid) -> PortResult<Vec<Deck>>;

    /// All active decks, optionally restricted to one privacy level.
    async fn list_decks(&self, privacy_level: Option<PrivacyLevel>) -> PortResult<Vec<Deck>>;

    async fn update_deck_privacy(&self, deck_id: Uuid, privacy_level: PrivacyLevel) -> PortResult<Deck>;

    async fn soft_delete_deck(&self, deck_id: Uuid) -> PortResult<()>;

    // --- Flashcards ---
    /// Creates the card and bumps the parent deck's card count.
    async fn create_flashcard(&self, new_card: NewFlashcard) -> PortResult<Flashcard>;

    async fn get_flashcard_by_id(&self, card_id: Uuid) -> PortResult<Flashcard>;

    async fn list_flashcards(&self, deck_id: Uuid) -> PortResult<Vec<Flashcard>>;

    async fn save_flashcard_review(
        &self,
        card_id: Uuid,
        sm2: &Sm2State,
        stats: &CardStats,
    ) -> PortResult<Flashcard>;

    // --- Class -> Course -> Lesson ---
    async fn create_class(&self, new_class: NewClass) -> PortResult<Class>;

    async fn get_class_by_id(&self, class_id: Uuid) -> PortResult<Class>;

    async fn create_course(&self, new_course: NewCourse) -> PortResult<Course>;

    async fn get_course_by_id(&self, course_id: Uuid) -> PortResult<Course>;

    /// Creates the lesson at the end of its course's ordered lesson list.
    async fn create_lesson(&self, new_lesson: NewLesson) -> PortResult<Lesson>;

    async fn get_lesson_by_id(&self, lesson_id: Uuid) -> PortResult<Lesson>;

    // --- Enrollments ---
    async fn create_enrollment(&self, new_enrollment: NewEnrollment) -> PortResult<Enrollment>;

    async fn get_enrollment_by_id(&self, enrollment_id: Uuid) -> PortResult<Enrollment>;

    async fn update_enrollment_status(
        &self,
        enrollment_id: Uuid,
        status: EnrollmentStatus,
    ) -> PortResult<Enrollment>;

    async fn find_class_enrollment(&self, user_id: Uuid, class_id: Uuid) -> PortResult<Option<Enrollment>>;

    async fn find_course_enrollment(&self, user_id: Uuid, course_id: Uuid) -> PortResult<Option<Enrollment>>;

    /// Whether the student holds a live enrollment in a class taught by, or a course
    /// created by, the teacher.
    async fn teacher_has_student(&self, teacher_id: Uuid, student_id: Uuid) -> PortResult<bool>;

    // --- Deck Assignments ---
    async fn create_deck_assignment(&self, new_assignment: NewDeckAssignment) -> PortResult<DeckAssignment>;

    async fn list_deck_assignments(
        &self,
        deck_id: Uuid,
        assignment_type: Option<AssignmentType>,
    ) -> PortResult<Vec<DeckAssignment>>;

    async fn deck_has_active_assignments(&self, deck_id: Uuid) -> PortResult<bool>;

    // --- Study Sessions ---
    async fn create_study_session(&self, new_session: NewStudySession) -> PortResult<StudySession>;

    async fn get_study_session_by_id(&self, session_id: Uuid) -> PortResult<StudySession>;

    /// The user's sessions, newest first.
    async fn list_study_sessions(&self, user_id: Uuid) -> PortResult<Vec<StudySession>>;

    /// Counts one review into the session. Fails with `Conflict` unless the session is active.
    async fn record_session_review(
        &self,
        session_id: Uuid,
        correct: bool,
        at: DateTime<Utc>,
    ) -> PortResult<StudySession>;

    /// Moves the session from `from` to `to`, failing with `Conflict` if its status has
    /// changed in the meantime. Entering a finished status stamps `completed_at` and
    /// `total_time`.
    async fn update_study_session_status(
        &self,
        session_id: Uuid,
        from: SessionStatus,
        to: SessionStatus,
        at: DateTime<Utc>,
    ) -> PortResult<StudySession>;
}
