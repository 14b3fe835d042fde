//! crates/flashcard_lms_core/src/domain.rs
//!
//! Defines the core data structures for the application.
//! The records are independent of any database; the enums carry serde derives
//! so the web layer can expose them under the same wire names they are stored with.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

//=========================================================================================
// Enum Parsing
//=========================================================================================

/// Returned when a stored or submitted string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// Implements `as_str`, `Display` and `FromStr` from a single variant/name table.
macro_rules! string_enum {
    ($ty:ident, $kind:literal, { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }
        }

        impl ::std::fmt::Display for $ty {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::std::str::FromStr for $ty {
            type Err = $crate::domain::ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Self::$variant),)+
                    other => Err($crate::domain::ParseEnumError {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

//=========================================================================================
// Users
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

string_enum!(Role, "role", {
    Student => "student",
    Teacher => "teacher",
    Admin => "admin",
});

impl Default for Role {
    fn default() -> Self {
        Role::Student
    }
}

/// Represents a user account. Never leaves the service with its password hash;
/// see `UserCredentials`.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub full_name: String,
    pub role: Role,
    pub is_active: bool,
    pub email_verified: bool,
    pub force_password_change: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

// Only used internally for login and password changes - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub hashed_password: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub full_name: String,
    pub hashed_password: String,
    pub role: Role,
}

//=========================================================================================
// Decks & Flashcards
//=========================================================================================

/// The five deck visibility scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrivacyLevel {
    #[serde(rename = "private")]
    Private,
    #[serde(rename = "class-assigned")]
    ClassAssigned,
    #[serde(rename = "course-assigned")]
    CourseAssigned,
    #[serde(rename = "lesson-assigned")]
    LessonAssigned,
    #[serde(rename = "public")]
    Public,
}

string_enum!(PrivacyLevel, "privacy level", {
    Private => "private",
    ClassAssigned => "class-assigned",
    CourseAssigned => "course-assigned",
    LessonAssigned => "lesson-assigned",
    Public => "public",
});

impl Default for PrivacyLevel {
    fn default() -> Self {
        PrivacyLevel::Private
    }
}

impl PrivacyLevel {
    /// The assignment type a deck at this level is shared through, if any.
    pub fn assignment_type(&self) -> Option<AssignmentType> {
        match self {
            PrivacyLevel::ClassAssigned => Some(AssignmentType::Class),
            PrivacyLevel::CourseAssigned => Some(AssignmentType::Course),
            PrivacyLevel::LessonAssigned => Some(AssignmentType::Lesson),
            PrivacyLevel::Private | PrivacyLevel::Public => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Deck {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub privacy_level: PrivacyLevel,
    pub card_count: i32,
    pub tags: Vec<String>,
    /// `false` once the deck has been soft-deleted.
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDeck {
    pub owner_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub privacy_level: PrivacyLevel,
    pub tags: Vec<String>,
}

/// Per-card SM-2 scheduling data.
#[derive(Debug, Clone, PartialEq)]
pub struct Sm2State {
    pub repetitions: i32,
    pub ease_factor: f64,
    /// Current interval in days.
    pub interval: i32,
    pub next_review: Option<DateTime<Utc>>,
    pub last_quality: Option<u8>,
}

impl Default for Sm2State {
    fn default() -> Self {
        Self {
            repetitions: 0,
            ease_factor: 2.5,
            interval: 0,
            next_review: None,
            last_quality: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardStats {
    pub review_count: i32,
    pub correct_count: i32,
    pub incorrect_count: i32,
}

impl CardStats {
    pub fn record(&mut self, was_correct: bool) {
        self.review_count += 1;
        if was_correct {
            self.correct_count += 1;
        } else {
            self.incorrect_count += 1;
        }
    }

    pub fn accuracy(&self) -> f64 {
        if self.review_count == 0 {
            return 0.0;
        }
        f64::from(self.correct_count) / f64::from(self.review_count)
    }
}

#[derive(Debug, Clone)]
pub struct Flashcard {
    pub id: Uuid,
    pub deck_id: Uuid,
    pub question: String,
    pub answer: String,
    pub hint: Option<String>,
    pub explanation: Option<String>,
    pub sm2: Sm2State,
    pub stats: CardStats,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewFlashcard {
    pub deck_id: Uuid,
    pub question: String,
    pub answer: String,
    pub hint: Option<String>,
    pub explanation: Option<String>,
}

//=========================================================================================
// Class -> Course -> Lesson
//=========================================================================================

#[derive(Debug, Clone)]
pub struct Class {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub teacher_id: Uuid,
    pub class_code: String,
    /// Ordered.
    pub course_ids: Vec<Uuid>,
    pub max_students: Option<i32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewClass {
    pub name: String,
    pub description: Option<String>,
    pub teacher_id: Uuid,
    pub class_code: String,
    pub max_students: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct Course {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub creator_id: Uuid,
    /// Ordered.
    pub lesson_ids: Vec<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCourse {
    pub title: String,
    pub description: Option<String>,
    pub creator_id: Uuid,
    /// Appends the new course to this class's ordered course list.
    pub class_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct Lesson {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub order_index: i32,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewLesson {
    pub course_id: Uuid,
    pub title: String,
    pub description: Option<String>,
}

//=========================================================================================
// Enrollments
//=========================================================================================

/// What an enrollment links a user to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnrollmentScope {
    Class(Uuid),
    Course(Uuid),
    Lesson(Uuid),
}

impl EnrollmentScope {
    pub fn kind(&self) -> &'static str {
        match self {
            EnrollmentScope::Class(_) => "class",
            EnrollmentScope::Course(_) => "course",
            EnrollmentScope::Lesson(_) => "lesson",
        }
    }

    pub fn target_id(&self) -> Uuid {
        match self {
            EnrollmentScope::Class(id) | EnrollmentScope::Course(id) | EnrollmentScope::Lesson(id) => *id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Enrolled,
    InProgress,
    Completed,
    Dropped,
    Suspended,
    PendingApproval,
}

string_enum!(EnrollmentStatus, "enrollment status", {
    Enrolled => "enrolled",
    InProgress => "in_progress",
    Completed => "completed",
    Dropped => "dropped",
    Suspended => "suspended",
    PendingApproval => "pending_approval",
});

impl EnrollmentStatus {
    /// Whether an enrollment in this status opens assigned decks to the student.
    pub fn grants_access(&self) -> bool {
        matches!(
            self,
            EnrollmentStatus::Enrolled | EnrollmentStatus::InProgress | EnrollmentStatus::Completed
        )
    }
}

#[derive(Debug, Clone)]
pub struct Enrollment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub scope: EnrollmentScope,
    pub status: EnrollmentStatus,
    pub enrolled_by: Option<Uuid>,
    pub enrolled_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewEnrollment {
    pub user_id: Uuid,
    pub scope: EnrollmentScope,
    pub status: EnrollmentStatus,
    pub enrolled_by: Option<Uuid>,
}

//=========================================================================================
// Deck Assignments
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentType {
    Class,
    Course,
    Lesson,
    Individual,
}

string_enum!(AssignmentType, "assignment type", {
    Class => "class",
    Course => "course",
    Lesson => "lesson",
    Individual => "individual",
});

/// Who a deck is assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssignmentTarget {
    Class(Uuid),
    Course(Uuid),
    Lesson(Uuid),
    Student(Uuid),
}

impl AssignmentTarget {
    pub fn assignment_type(&self) -> AssignmentType {
        match self {
            AssignmentTarget::Class(_) => AssignmentType::Class,
            AssignmentTarget::Course(_) => AssignmentType::Course,
            AssignmentTarget::Lesson(_) => AssignmentType::Lesson,
            AssignmentTarget::Student(_) => AssignmentType::Individual,
        }
    }

    pub fn target_id(&self) -> Uuid {
        match self {
            AssignmentTarget::Class(id)
            | AssignmentTarget::Course(id)
            | AssignmentTarget::Lesson(id)
            | AssignmentTarget::Student(id) => *id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Assigned,
    InProgress,
    Completed,
    Overdue,
    Cancelled,
}

string_enum!(AssignmentStatus, "assignment status", {
    Assigned => "assigned",
    InProgress => "in_progress",
    Completed => "completed",
    Overdue => "overdue",
    Cancelled => "cancelled",
});

impl AssignmentStatus {
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            AssignmentStatus::Assigned | AssignmentStatus::InProgress | AssignmentStatus::Overdue
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionCriteria {
    pub min_accuracy: Option<f64>,
    pub min_reviews: Option<i32>,
    pub min_cards: Option<i32>,
    /// Seconds.
    pub min_time: Option<i32>,
    pub target_mastery: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct DeckAssignment {
    pub id: Uuid,
    pub deck_id: Uuid,
    pub assigned_by: Uuid,
    pub target: AssignmentTarget,
    pub title: String,
    pub status: AssignmentStatus,
    pub assigned_at: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    pub completion_criteria: Option<CompletionCriteria>,
}

#[derive(Debug, Clone)]
pub struct NewDeckAssignment {
    pub deck_id: Uuid,
    pub assigned_by: Uuid,
    pub target: AssignmentTarget,
    pub title: String,
    pub due_date: Option<DateTime<Utc>>,
    pub completion_criteria: Option<CompletionCriteria>,
}

//=========================================================================================
// Study Sessions
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudyMode {
    Review,
    Practice,
    Cram,
    Test,
    Learn,
}

string_enum!(StudyMode, "study mode", {
    Review => "review",
    Practice => "practice",
    Cram => "cram",
    Test => "test",
    Learn => "learn",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Paused,
    Completed,
    Abandoned,
}

string_enum!(SessionStatus, "session status", {
    Active => "active",
    Paused => "paused",
    Completed => "completed",
    Abandoned => "abandoned",
});

impl SessionStatus {
    /// Completed and abandoned sessions never change again.
    pub fn is_finished(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Abandoned)
    }
}

/// One sitting of a user working through a deck.
#[derive(Debug, Clone)]
pub struct StudySession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub deck_id: Uuid,
    pub lesson_id: Option<Uuid>,
    pub study_mode: StudyMode,
    pub target_cards: Option<i32>,
    /// Minutes.
    pub target_time: Option<i32>,
    pub cards_studied: i32,
    pub correct_answers: i32,
    pub incorrect_answers: i32,
    /// Wall-clock seconds from start to finish; zero until the session finishes.
    pub total_time: i64,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl StudySession {
    pub fn accuracy_rate(&self) -> Option<f64> {
        (self.cards_studied > 0).then(|| f64::from(self.correct_answers) / f64::from(self.cards_studied))
    }

    pub fn cards_per_minute(&self) -> Option<f64> {
        (self.total_time > 0).then(|| f64::from(self.cards_studied) * 60.0 / self.total_time as f64)
    }

    pub fn target_reached(&self) -> bool {
        self.target_cards.is_some_and(|target| self.cards_studied >= target)
    }

    /// Seconds elapsed between the start and `at`, never negative.
    pub fn elapsed_secs(&self, at: DateTime<Utc>) -> i64 {
        (at - self.started_at).num_seconds().max(0)
    }
}

#[derive(Debug, Clone)]
pub struct NewStudySession {
    pub user_id: Uuid,
    pub deck_id: Uuid,
    pub lesson_id: Option<Uuid>,
    pub study_mode: StudyMode,
    pub target_cards: Option<i32>,
    pub target_time: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn privacy_levels_use_hyphenated_wire_names() {
        assert_eq!(PrivacyLevel::ClassAssigned.as_str(), "class-assigned");
        assert_eq!("lesson-assigned".parse::<PrivacyLevel>(), Ok(PrivacyLevel::LessonAssigned));
        assert!("class_assigned".parse::<PrivacyLevel>().is_err());
    }

    #[test]
    fn only_live_enrollment_statuses_grant_access() {
        let granting: Vec<_> = [
            EnrollmentStatus::Enrolled,
            EnrollmentStatus::InProgress,
            EnrollmentStatus::Completed,
            EnrollmentStatus::Dropped,
            EnrollmentStatus::Suspended,
            EnrollmentStatus::PendingApproval,
        ]
        .into_iter()
        .filter(EnrollmentStatus::grants_access)
        .collect();

        assert_eq!(
            granting,
            vec![
                EnrollmentStatus::Enrolled,
                EnrollmentStatus::InProgress,
                EnrollmentStatus::Completed
            ]
        );
    }

    #[test]
    fn card_stats_accuracy() {
        let mut stats = CardStats::default();
        assert_eq!(stats.accuracy(), 0.0);
        stats.record(true);
        stats.record(true);
        stats.record(false);
        stats.record(true);
        assert_eq!(stats.review_count, 4);
        assert_eq!(stats.accuracy(), 0.75);
    }

    #[test]
    fn session_analytics_follow_the_counters() {
        let now = Utc::now();
        let mut session = StudySession {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            deck_id: Uuid::new_v4(),
            lesson_id: None,
            study_mode: StudyMode::Review,
            target_cards: Some(4),
            target_time: None,
            cards_studied: 0,
            correct_answers: 0,
            incorrect_answers: 0,
            total_time: 0,
            status: SessionStatus::Active,
            started_at: now,
            completed_at: None,
            updated_at: now,
        };
        assert_eq!(session.accuracy_rate(), None);
        assert_eq!(session.cards_per_minute(), None);
        assert!(!session.target_reached());

        session.cards_studied = 4;
        session.correct_answers = 3;
        session.incorrect_answers = 1;
        session.total_time = 120;
        assert_eq!(session.accuracy_rate(), Some(0.75));
        assert_eq!(session.cards_per_minute(), Some(2.0));
        assert!(session.target_reached());
        assert_eq!(session.elapsed_secs(now - chrono::Duration::seconds(5)), 0);
        assert_eq!(session.elapsed_secs(now + chrono::Duration::seconds(90)), 90);
    }

    #[test]
    fn finished_sessions_are_completed_or_abandoned() {
        assert!(!SessionStatus::Active.is_finished());
        assert!(!SessionStatus::Paused.is_finished());
        assert!(SessionStatus::Completed.is_finished());
        assert!(SessionStatus::Abandoned.is_finished());
        assert_eq!("cram".parse::<StudyMode>(), Ok(StudyMode::Cram));
    }
}
