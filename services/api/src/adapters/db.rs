//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flashcard_lms_core::domain::{
    AssignmentStatus, AssignmentTarget, AssignmentType, CardStats, Class, CompletionCriteria, Course, Deck,
    DeckAssignment, Enrollment, EnrollmentScope, EnrollmentStatus, Flashcard, Lesson, NewClass, NewCourse,
    NewDeck, NewDeckAssignment, NewEnrollment, NewFlashcard, NewLesson, NewStudySession, NewUser,
    ParseEnumError, PrivacyLevel, Role, SessionStatus, Sm2State, StudyMode, StudySession, User,
    UserCredentials,
};
use flashcard_lms_core::ports::{DatabaseService, PortError, PortResult};
use sqlx::{types::Json, FromRow, PgPool};
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    /// Creates a new `PgDatabase`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

//=========================================================================================
// Error Mapping
//=========================================================================================

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

/// `RowNotFound` becomes `NotFound`, anything else is unexpected.
fn fetch_error(e: sqlx::Error, what: &str, id: impl std::fmt::Display) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound(format!("{} {} not found", what, id)),
        _ => unexpected(e),
    }
}

/// Unique-constraint violations become `Conflict`, anything else is unexpected.
fn write_error(e: sqlx::Error, what: &str) -> PortError {
    match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            PortError::Conflict(format!("{} already exists", what))
        }
        _ => unexpected(e),
    }
}

fn parse<T>(raw: &str) -> PortResult<T>
where
    T: FromStr<Err = ParseEnumError>,
{
    raw.parse::<T>()
        .map_err(|e| PortError::Unexpected(format!("corrupt row: {}", e)))
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const USER_COLUMNS: &str = "id, email, username, full_name, role, is_active, email_verified, \
     force_password_change, created_at, updated_at, last_login_at";

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    email: String,
    username: String,
    full_name: String,
    role: String,
    is_active: bool,
    email_verified: bool,
    force_password_change: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_login_at: Option<DateTime<Utc>>,
}
impl UserRecord {
    fn to_domain(self) -> PortResult<User> {
        Ok(User {
            id: self.id,
            email: self.email,
            username: self.username,
            full_name: self.full_name,
            role: parse::<Role>(&self.role)?,
            is_active: self.is_active,
            email_verified: self.email_verified,
            force_password_change: self.force_password_change,
            created_at: self.created_at,
            updated_at: self.updated_at,
            last_login_at: self.last_login_at,
        })
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    #[sqlx(flatten)]
    user: UserRecord,
    hashed_password: String,
}
impl CredentialsRecord {
    fn to_domain(self) -> PortResult<UserCredentials> {
        Ok(UserCredentials {
            user: self.user.to_domain()?,
            hashed_password: self.hashed_password,
        })
    }
}

const DECK_COLUMNS: &str =
    "id, owner_id, title, description, privacy_level, card_count, tags, is_active, created_at, updated_at";

#[derive(FromRow)]
struct DeckRecord {
    id: Uuid,
    owner_id: Uuid,
    title: String,
    description: Option<String>,
    privacy_level: String,
    card_count: i32,
    tags: Vec<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl DeckRecord {
    fn to_domain(self) -> PortResult<Deck> {
        Ok(Deck {
            id: self.id,
            owner_id: self.owner_id,
            title: self.title,
            description: self.description,
            privacy_level: parse::<PrivacyLevel>(&self.privacy_level)?,
            card_count: self.card_count,
            tags: self.tags,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const FLASHCARD_COLUMNS: &str = "id, deck_id, question, answer, hint, explanation, repetitions, \
     ease_factor, interval_days, next_review, last_quality, review_count, correct_count, \
     incorrect_count, is_active, created_at, updated_at";

#[derive(FromRow)]
struct FlashcardRecord {
    id: Uuid,
    deck_id: Uuid,
    question: String,
    answer: String,
    hint: Option<String>,
    explanation: Option<String>,
    repetitions: i32,
    ease_factor: f64,
    interval_days: i32,
    next_review: Option<DateTime<Utc>>,
    last_quality: Option<i16>,
    review_count: i32,
    correct_count: i32,
    incorrect_count: i32,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl FlashcardRecord {
    fn to_domain(self) -> Flashcard {
        Flashcard {
            id: self.id,
            deck_id: self.deck_id,
            question: self.question,
            answer: self.answer,
            hint: self.hint,
            explanation: self.explanation,
            sm2: Sm2State {
                repetitions: self.repetitions,
                ease_factor: self.ease_factor,
                interval: self.interval_days,
                next_review: self.next_review,
                last_quality: self.last_quality.and_then(|q| u8::try_from(q).ok()),
            },
            stats: CardStats {
                review_count: self.review_count,
                correct_count: self.correct_count,
                incorrect_count: self.incorrect_count,
            },
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

const CLASS_COLUMNS: &str =
    "id, name, description, teacher_id, class_code, course_ids, max_students, is_active, created_at";

#[derive(FromRow)]
struct ClassRecord {
    id: Uuid,
    name: String,
    description: Option<String>,
    teacher_id: Uuid,
    class_code: String,
    course_ids: Vec<Uuid>,
    max_students: Option<i32>,
    is_active: bool,
    created_at: DateTime<Utc>,
}
impl ClassRecord {
    fn to_domain(self) -> Class {
        Class {
            id: self.id,
            name: self.name,
            description: self.description,
            teacher_id: self.teacher_id,
            class_code: self.class_code,
            course_ids: self.course_ids,
            max_students: self.max_students,
            is_active: self.is_active,
            created_at: self.created_at,
        }
    }
}

const COURSE_COLUMNS: &str = "id, title, description, creator_id, lesson_ids, is_active, created_at";

#[derive(FromRow)]
struct CourseRecord {
    id: Uuid,
    title: String,
    description: Option<String>,
    creator_id: Uuid,
    lesson_ids: Vec<Uuid>,
    is_active: bool,
    created_at: DateTime<Utc>,
}
impl CourseRecord {
    fn to_domain(self) -> Course {
        Course {
            id: self.id,
            title: self.title,
            description: self.description,
            creator_id: self.creator_id,
            lesson_ids: self.lesson_ids,
            is_active: self.is_active,
            created_at: self.created_at,
        }
    }
}

const LESSON_COLUMNS: &str = "id, course_id, title, description, order_index, is_published, created_at";

#[derive(FromRow)]
struct LessonRecord {
    id: Uuid,
    course_id: Uuid,
    title: String,
    description: Option<String>,
    order_index: i32,
    is_published: bool,
    created_at: DateTime<Utc>,
}
impl LessonRecord {
    fn to_domain(self) -> Lesson {
        Lesson {
            id: self.id,
            course_id: self.course_id,
            title: self.title,
            description: self.description,
            order_index: self.order_index,
            is_published: self.is_published,
            created_at: self.created_at,
        }
    }
}

const ENROLLMENT_COLUMNS: &str = "id, user_id, scope_type, target_id, status, enrolled_by, enrolled_at, updated_at";

#[derive(FromRow)]
struct EnrollmentRecord {
    id: Uuid,
    user_id: Uuid,
    scope_type: String,
    target_id: Uuid,
    status: String,
    enrolled_by: Option<Uuid>,
    enrolled_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl EnrollmentRecord {
    fn to_domain(self) -> PortResult<Enrollment> {
        let scope = match self.scope_type.as_str() {
            "class" => EnrollmentScope::Class(self.target_id),
            "course" => EnrollmentScope::Course(self.target_id),
            "lesson" => EnrollmentScope::Lesson(self.target_id),
            other => {
                return Err(PortError::Unexpected(format!(
                    "corrupt row: unknown enrollment scope '{}'",
                    other
                )))
            }
        };
        Ok(Enrollment {
            id: self.id,
            user_id: self.user_id,
            scope,
            status: parse::<EnrollmentStatus>(&self.status)?,
            enrolled_by: self.enrolled_by,
            enrolled_at: self.enrolled_at,
            updated_at: self.updated_at,
        })
    }
}

const ASSIGNMENT_COLUMNS: &str =
    "id, deck_id, assigned_by, target_type, target_id, title, status, assigned_at, due_date, completion_criteria";

#[derive(FromRow)]
struct DeckAssignmentRecord {
    id: Uuid,
    deck_id: Uuid,
    assigned_by: Uuid,
    target_type: String,
    target_id: Uuid,
    title: String,
    status: String,
    assigned_at: DateTime<Utc>,
    due_date: Option<DateTime<Utc>>,
    completion_criteria: Option<Json<CompletionCriteria>>,
}
impl DeckAssignmentRecord {
    fn to_domain(self) -> PortResult<DeckAssignment> {
        let target = match parse::<AssignmentType>(&self.target_type)? {
            AssignmentType::Class => AssignmentTarget::Class(self.target_id),
            AssignmentType::Course => AssignmentTarget::Course(self.target_id),
            AssignmentType::Lesson => AssignmentTarget::Lesson(self.target_id),
            AssignmentType::Individual => AssignmentTarget::Student(self.target_id),
        };
        Ok(DeckAssignment {
            id: self.id,
            deck_id: self.deck_id,
            assigned_by: self.assigned_by,
            target,
            title: self.title,
            status: parse::<AssignmentStatus>(&self.status)?,
            assigned_at: self.assigned_at,
            due_date: self.due_date,
            completion_criteria: self.completion_criteria.map(|Json(criteria)| criteria),
        })
    }
}

const SESSION_COLUMNS: &str = "id, user_id, deck_id, lesson_id, study_mode, target_cards, target_time, \
     cards_studied, correct_answers, incorrect_answers, total_time, status, started_at, completed_at, updated_at";

#[derive(FromRow)]
struct StudySessionRecord {
    id: Uuid,
    user_id: Uuid,
    deck_id: Uuid,
    lesson_id: Option<Uuid>,
    study_mode: String,
    target_cards: Option<i32>,
    target_time: Option<i32>,
    cards_studied: i32,
    correct_answers: i32,
    incorrect_answers: i32,
    total_time: i64,
    status: String,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}
impl StudySessionRecord {
    fn to_domain(self) -> PortResult<StudySession> {
        Ok(StudySession {
            id: self.id,
            user_id: self.user_id,
            deck_id: self.deck_id,
            lesson_id: self.lesson_id,
            study_mode: parse::<StudyMode>(&self.study_mode)?,
            target_cards: self.target_cards,
            target_time: self.target_time,
            cards_studied: self.cards_studied,
            correct_answers: self.correct_answers,
            incorrect_answers: self.incorrect_answers,
            total_time: self.total_time,
            status: parse::<SessionStatus>(&self.status)?,
            started_at: self.started_at,
            completed_at: self.completed_at,
            updated_at: self.updated_at,
        })
    }
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for PgDatabase {
    // --- Users ---

    async fn create_user(&self, new_user: NewUser) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "INSERT INTO users (id, email, username, full_name, hashed_password, role) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            USER_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&new_user.email)
        .bind(&new_user.username)
        .bind(&new_user.full_name)
        .bind(&new_user.hashed_password)
        .bind(new_user.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| write_error(e, "User"))?;
        record.to_domain()
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| fetch_error(e, "User", user_id))?;
        record.to_domain()
    }

    async fn get_credentials_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(&format!(
            "SELECT {}, hashed_password FROM users WHERE email = $1",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| fetch_error(e, "User with email", email))?;
        record.to_domain()
    }

    async fn get_credentials_by_id(&self, user_id: Uuid) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(&format!(
            "SELECT {}, hashed_password FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| fetch_error(e, "User", user_id))?;
        record.to_domain()
    }

    async fn email_taken(&self, email: &str) -> PortResult<bool> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM users WHERE email = $1)")
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)
    }

    async fn username_taken(&self, username: &str) -> PortResult<bool> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM users WHERE username = $1)")
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)
    }

    async fn update_user_password(
        &self,
        user_id: Uuid,
        hashed_password: &str,
        force_change: bool,
    ) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE users SET hashed_password = $1, force_password_change = $2, updated_at = NOW() WHERE id = $3",
        )
        .bind(hashed_password)
        .bind(force_change)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("User {} not found", user_id)));
        }
        Ok(())
    }

    async fn record_login(&self, user_id: Uuid, at: DateTime<Utc>) -> PortResult<()> {
        sqlx::query("UPDATE users SET last_login_at = $1 WHERE id = $2")
            .bind(at)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    // --- Decks ---

    async fn create_deck(&self, new_deck: NewDeck) -> PortResult<Deck> {
        let record = sqlx::query_as::<_, DeckRecord>(&format!(
            "INSERT INTO decks (id, owner_id, title, description, privacy_level, tags) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            DECK_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(new_deck.owner_id)
        .bind(&new_deck.title)
        .bind(&new_deck.description)
        .bind(new_deck.privacy_level.as_str())
        .bind(&new_deck.tags)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| write_error(e, "Deck"))?;
        record.to_domain()
    }

    async fn get_deck_by_id(&self, deck_id: Uuid) -> PortResult<Deck> {
        let record = sqlx::query_as::<_, DeckRecord>(&format!("SELECT {} FROM decks WHERE id = $1", DECK_COLUMNS))
            .bind(deck_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| fetch_error(e, "Deck", deck_id))?;
        record.to_domain()
    }

    async fn list_decks_by_owner(&self, owner_id: Uuid) -> PortResult<Vec<Deck>> {
        let records = sqlx::query_as::<_, DeckRecord>(&format!(
            "SELECT {} FROM decks WHERE owner_id = $1 AND is_active ORDER BY created_at DESC",
            DECK_COLUMNS
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        records.into_iter().map(DeckRecord::to_domain).collect()
    }

    async fn list_decks(&self, privacy_level: Option<PrivacyLevel>) -> PortResult<Vec<Deck>> {
        let records = sqlx::query_as::<_, DeckRecord>(&format!(
            "SELECT {} FROM decks WHERE is_active AND ($1::TEXT IS NULL OR privacy_level = $1) \
             ORDER BY created_at DESC",
            DECK_COLUMNS
        ))
        .bind(privacy_level.map(|level| level.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        records.into_iter().map(DeckRecord::to_domain).collect()
    }

    async fn update_deck_privacy(&self, deck_id: Uuid, privacy_level: PrivacyLevel) -> PortResult<Deck> {
        let record = sqlx::query_as::<_, DeckRecord>(&format!(
            "UPDATE decks SET privacy_level = $1, updated_at = NOW() WHERE id = $2 RETURNING {}",
            DECK_COLUMNS
        ))
        .bind(privacy_level.as_str())
        .bind(deck_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| fetch_error(e, "Deck", deck_id))?;
        record.to_domain()
    }

    async fn soft_delete_deck(&self, deck_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("UPDATE decks SET is_active = FALSE, updated_at = NOW() WHERE id = $1")
            .bind(deck_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Deck {} not found", deck_id)));
        }
        Ok(())
    }

    // --- Flashcards ---

    async fn create_flashcard(&self, new_card: NewFlashcard) -> PortResult<Flashcard> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        let bumped = sqlx::query("UPDATE decks SET card_count = card_count + 1, updated_at = NOW() WHERE id = $1")
            .bind(new_card.deck_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        if bumped.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Deck {} not found", new_card.deck_id)));
        }

        let record = sqlx::query_as::<_, FlashcardRecord>(&format!(
            "INSERT INTO flashcards (id, deck_id, question, answer, hint, explanation) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            FLASHCARD_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(new_card.deck_id)
        .bind(&new_card.question)
        .bind(&new_card.answer)
        .bind(&new_card.hint)
        .bind(&new_card.explanation)
        .fetch_one(&mut *tx)
        .await
        .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn get_flashcard_by_id(&self, card_id: Uuid) -> PortResult<Flashcard> {
        let record = sqlx::query_as::<_, FlashcardRecord>(&format!(
            "SELECT {} FROM flashcards WHERE id = $1",
            FLASHCARD_COLUMNS
        ))
        .bind(card_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| fetch_error(e, "Flashcard", card_id))?;
        Ok(record.to_domain())
    }

    async fn list_flashcards(&self, deck_id: Uuid) -> PortResult<Vec<Flashcard>> {
        let records = sqlx::query_as::<_, FlashcardRecord>(&format!(
            "SELECT {} FROM flashcards WHERE deck_id = $1 AND is_active ORDER BY created_at ASC",
            FLASHCARD_COLUMNS
        ))
        .bind(deck_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(FlashcardRecord::to_domain).collect())
    }

    async fn save_flashcard_review(
        &self,
        card_id: Uuid,
        sm2: &Sm2State,
        stats: &CardStats,
    ) -> PortResult<Flashcard> {
        let record = sqlx::query_as::<_, FlashcardRecord>(&format!(
            "UPDATE flashcards SET repetitions = $1, ease_factor = $2, interval_days = $3, \
             next_review = $4, last_quality = $5, review_count = $6, correct_count = $7, \
             incorrect_count = $8, updated_at = NOW() WHERE id = $9 RETURNING {}",
            FLASHCARD_COLUMNS
        ))
        .bind(sm2.repetitions)
        .bind(sm2.ease_factor)
        .bind(sm2.interval)
        .bind(sm2.next_review)
        .bind(sm2.last_quality.map(i16::from))
        .bind(stats.review_count)
        .bind(stats.correct_count)
        .bind(stats.incorrect_count)
        .bind(card_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| fetch_error(e, "Flashcard", card_id))?;
        Ok(record.to_domain())
    }

    // --- Class -> Course -> Lesson ---

    async fn create_class(&self, new_class: NewClass) -> PortResult<Class> {
        let record = sqlx::query_as::<_, ClassRecord>(&format!(
            "INSERT INTO classes (id, name, description, teacher_id, class_code, max_students) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            CLASS_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&new_class.name)
        .bind(&new_class.description)
        .bind(new_class.teacher_id)
        .bind(&new_class.class_code)
        .bind(new_class.max_students)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| write_error(e, "Class code"))?;
        Ok(record.to_domain())
    }

    async fn get_class_by_id(&self, class_id: Uuid) -> PortResult<Class> {
        let record = sqlx::query_as::<_, ClassRecord>(&format!("SELECT {} FROM classes WHERE id = $1", CLASS_COLUMNS))
            .bind(class_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| fetch_error(e, "Class", class_id))?;
        Ok(record.to_domain())
    }

    async fn create_course(&self, new_course: NewCourse) -> PortResult<Course> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        let record = sqlx::query_as::<_, CourseRecord>(&format!(
            "INSERT INTO courses (id, title, description, creator_id) VALUES ($1, $2, $3, $4) RETURNING {}",
            COURSE_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&new_course.title)
        .bind(&new_course.description)
        .bind(new_course.creator_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(unexpected)?;

        if let Some(class_id) = new_course.class_id {
            let linked = sqlx::query("UPDATE classes SET course_ids = array_append(course_ids, $1) WHERE id = $2")
                .bind(record.id)
                .bind(class_id)
                .execute(&mut *tx)
                .await
                .map_err(unexpected)?;
            if linked.rows_affected() == 0 {
                return Err(PortError::NotFound(format!("Class {} not found", class_id)));
            }
        }

        tx.commit().await.map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn get_course_by_id(&self, course_id: Uuid) -> PortResult<Course> {
        let record = sqlx::query_as::<_, CourseRecord>(&format!("SELECT {} FROM courses WHERE id = $1", COURSE_COLUMNS))
            .bind(course_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| fetch_error(e, "Course", course_id))?;
        Ok(record.to_domain())
    }

    async fn create_lesson(&self, new_lesson: NewLesson) -> PortResult<Lesson> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        let lesson_count = sqlx::query_scalar::<_, i32>(
            "SELECT cardinality(lesson_ids) FROM courses WHERE id = $1 FOR UPDATE",
        )
        .bind(new_lesson.course_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| fetch_error(e, "Course", new_lesson.course_id))?;

        let record = sqlx::query_as::<_, LessonRecord>(&format!(
            "INSERT INTO lessons (id, course_id, title, description, order_index) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            LESSON_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(new_lesson.course_id)
        .bind(&new_lesson.title)
        .bind(&new_lesson.description)
        .bind(lesson_count)
        .fetch_one(&mut *tx)
        .await
        .map_err(unexpected)?;

        sqlx::query("UPDATE courses SET lesson_ids = array_append(lesson_ids, $1) WHERE id = $2")
            .bind(record.id)
            .bind(new_lesson.course_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn get_lesson_by_id(&self, lesson_id: Uuid) -> PortResult<Lesson> {
        let record = sqlx::query_as::<_, LessonRecord>(&format!("SELECT {} FROM lessons WHERE id = $1", LESSON_COLUMNS))
            .bind(lesson_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| fetch_error(e, "Lesson", lesson_id))?;
        Ok(record.to_domain())
    }

    // --- Enrollments ---

    async fn create_enrollment(&self, new_enrollment: NewEnrollment) -> PortResult<Enrollment> {
        let record = sqlx::query_as::<_, EnrollmentRecord>(&format!(
            "INSERT INTO enrollments (id, user_id, scope_type, target_id, status, enrolled_by) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            ENROLLMENT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(new_enrollment.user_id)
        .bind(new_enrollment.scope.kind())
        .bind(new_enrollment.scope.target_id())
        .bind(new_enrollment.status.as_str())
        .bind(new_enrollment.enrolled_by)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| write_error(e, "Enrollment"))?;
        record.to_domain()
    }

    async fn get_enrollment_by_id(&self, enrollment_id: Uuid) -> PortResult<Enrollment> {
        let record = sqlx::query_as::<_, EnrollmentRecord>(&format!(
            "SELECT {} FROM enrollments WHERE id = $1",
            ENROLLMENT_COLUMNS
        ))
        .bind(enrollment_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| fetch_error(e, "Enrollment", enrollment_id))?;
        record.to_domain()
    }

    async fn update_enrollment_status(
        &self,
        enrollment_id: Uuid,
        status: EnrollmentStatus,
    ) -> PortResult<Enrollment> {
        let record = sqlx::query_as::<_, EnrollmentRecord>(&format!(
            "UPDATE enrollments SET status = $1, updated_at = NOW() WHERE id = $2 RETURNING {}",
            ENROLLMENT_COLUMNS
        ))
        .bind(status.as_str())
        .bind(enrollment_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| fetch_error(e, "Enrollment", enrollment_id))?;
        record.to_domain()
    }

    async fn find_class_enrollment(&self, user_id: Uuid, class_id: Uuid) -> PortResult<Option<Enrollment>> {
        self.find_enrollment(user_id, EnrollmentScope::Class(class_id)).await
    }

    async fn find_course_enrollment(&self, user_id: Uuid, course_id: Uuid) -> PortResult<Option<Enrollment>> {
        self.find_enrollment(user_id, EnrollmentScope::Course(course_id)).await
    }

    async fn teacher_has_student(&self, teacher_id: Uuid, student_id: Uuid) -> PortResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (
                SELECT 1 FROM enrollments e
                LEFT JOIN classes c ON e.scope_type = 'class' AND c.id = e.target_id
                LEFT JOIN courses co ON e.scope_type = 'course' AND co.id = e.target_id
                WHERE e.user_id = $2
                  AND e.status IN ('enrolled', 'in_progress', 'completed')
                  AND (c.teacher_id = $1 OR co.creator_id = $1)
            )",
        )
        .bind(teacher_id)
        .bind(student_id)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)
    }

    // --- Deck Assignments ---

    async fn create_deck_assignment(&self, new_assignment: NewDeckAssignment) -> PortResult<DeckAssignment> {
        let record = sqlx::query_as::<_, DeckAssignmentRecord>(&format!(
            "INSERT INTO deck_assignments \
             (id, deck_id, assigned_by, target_type, target_id, title, status, due_date, completion_criteria) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {}",
            ASSIGNMENT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(new_assignment.deck_id)
        .bind(new_assignment.assigned_by)
        .bind(new_assignment.target.assignment_type().as_str())
        .bind(new_assignment.target.target_id())
        .bind(&new_assignment.title)
        .bind(AssignmentStatus::Assigned.as_str())
        .bind(new_assignment.due_date)
        .bind(new_assignment.completion_criteria.map(Json))
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        record.to_domain()
    }

    async fn list_deck_assignments(
        &self,
        deck_id: Uuid,
        assignment_type: Option<AssignmentType>,
    ) -> PortResult<Vec<DeckAssignment>> {
        let records = sqlx::query_as::<_, DeckAssignmentRecord>(&format!(
            "SELECT {} FROM deck_assignments WHERE deck_id = $1 AND ($2::TEXT IS NULL OR target_type = $2) \
             ORDER BY assigned_at ASC",
            ASSIGNMENT_COLUMNS
        ))
        .bind(deck_id)
        .bind(assignment_type.map(|t| t.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        records.into_iter().map(DeckAssignmentRecord::to_domain).collect()
    }

    async fn deck_has_active_assignments(&self, deck_id: Uuid) -> PortResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM deck_assignments \
             WHERE deck_id = $1 AND status IN ('assigned', 'in_progress', 'overdue'))",
        )
        .bind(deck_id)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)
    }
    // --- Study Sessions ---

    async fn create_study_session(&self, new_session: NewStudySession) -> PortResult<StudySession> {
        let record = sqlx::query_as::<_, StudySessionRecord>(&format!(
            "INSERT INTO study_sessions (id, user_id, deck_id, lesson_id, study_mode, target_cards, target_time) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            SESSION_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(new_session.user_id)
        .bind(new_session.deck_id)
        .bind(new_session.lesson_id)
        .bind(new_session.study_mode.as_str())
        .bind(new_session.target_cards)
        .bind(new_session.target_time)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| write_error(e, "Study session"))?;
        record.to_domain()
    }

    async fn get_study_session_by_id(&self, session_id: Uuid) -> PortResult<StudySession> {
        let record = sqlx::query_as::<_, StudySessionRecord>(&format!(
            "SELECT {} FROM study_sessions WHERE id = $1",
            SESSION_COLUMNS
        ))
        .bind(session_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| fetch_error(e, "Study session", session_id))?;
        record.to_domain()
    }

    async fn list_study_sessions(&self, user_id: Uuid) -> PortResult<Vec<StudySession>> {
        let records = sqlx::query_as::<_, StudySessionRecord>(&format!(
            "SELECT {} FROM study_sessions WHERE user_id = $1 ORDER BY started_at DESC",
            SESSION_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        records.into_iter().map(StudySessionRecord::to_domain).collect()
    }

    async fn record_session_review(
        &self,
        session_id: Uuid,
        correct: bool,
        at: DateTime<Utc>,
    ) -> PortResult<StudySession> {
        let record = sqlx::query_as::<_, StudySessionRecord>(&format!(
            "UPDATE study_sessions SET cards_studied = cards_studied + 1, \
             correct_answers = correct_answers + CASE WHEN $2 THEN 1 ELSE 0 END, \
             incorrect_answers = incorrect_answers + CASE WHEN $2 THEN 0 ELSE 1 END, \
             updated_at = $3 WHERE id = $1 AND status = 'active' RETURNING {}",
            SESSION_COLUMNS
        ))
        .bind(session_id)
        .bind(correct)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        match record {
            Some(record) => record.to_domain(),
            None => {
                let current = self.get_study_session_by_id(session_id).await?;
                Err(PortError::Conflict(format!("Study session is {}", current.status)))
            }
        }
    }

    async fn update_study_session_status(
        &self,
        session_id: Uuid,
        from: SessionStatus,
        to: SessionStatus,
        at: DateTime<Utc>,
    ) -> PortResult<StudySession> {
        let record = sqlx::query_as::<_, StudySessionRecord>(&format!(
            "UPDATE study_sessions SET status = $3, updated_at = $4, \
             completed_at = CASE WHEN $5 THEN $4 ELSE NULL END, \
             total_time = CASE WHEN $5 \
                 THEN GREATEST(0, FLOOR(EXTRACT(EPOCH FROM ($4 - started_at))))::BIGINT \
                 ELSE total_time END \
             WHERE id = $1 AND status = $2 RETURNING {}",
            SESSION_COLUMNS
        ))
        .bind(session_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(at)
        .bind(to.is_finished())
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        match record {
            Some(record) => record.to_domain(),
            None => {
                let current = self.get_study_session_by_id(session_id).await?;
                Err(PortError::Conflict(format!("Study session is already {}", current.status)))
            }
        }
    }
}

impl PgDatabase {
    async fn find_enrollment(&self, user_id: Uuid, scope: EnrollmentScope) -> PortResult<Option<Enrollment>> {
        let record = sqlx::query_as::<_, EnrollmentRecord>(&format!(
            "SELECT {} FROM enrollments WHERE user_id = $1 AND scope_type = $2 AND target_id = $3",
            ENROLLMENT_COLUMNS
        ))
        .bind(user_id)
        .bind(scope.kind())
        .bind(scope.target_id())
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        record.map(EnrollmentRecord::to_domain).transpose()
    }
}
