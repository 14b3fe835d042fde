//! services/api/src/adapters/memory.rs
//!
//! An in-process implementation of the `DatabaseService` port, selected with
//! `DATABASE_URL=memory://` and used by the integration tests. It enforces the same
//! uniqueness rules as the Postgres schema.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flashcard_lms_core::domain::{
    AssignmentStatus, AssignmentType, CardStats, Class, Course, Deck, DeckAssignment, Enrollment,
    EnrollmentScope, EnrollmentStatus, Flashcard, Lesson, NewClass, NewCourse, NewDeck, NewDeckAssignment,
    NewEnrollment, NewFlashcard, NewLesson, NewStudySession, NewUser, PrivacyLevel, SessionStatus, Sm2State,
    StudySession, User, UserCredentials,
};
use flashcard_lms_core::ports::{DatabaseService, PortError, PortResult};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, UserCredentials>,
    decks: HashMap<Uuid, Deck>,
    flashcards: HashMap<Uuid, Flashcard>,
    classes: HashMap<Uuid, Class>,
    courses: HashMap<Uuid, Course>,
    lessons: HashMap<Uuid, Lesson>,
    enrollments: HashMap<Uuid, Enrollment>,
    assignments: HashMap<Uuid, DeckAssignment>,
    sessions: HashMap<Uuid, StudySession>,
}

impl Tables {
    fn user(&self, user_id: Uuid) -> PortResult<&UserCredentials> {
        self.users
            .get(&user_id)
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))
    }

    fn user_mut(&mut self, user_id: Uuid) -> PortResult<&mut UserCredentials> {
        self.users
            .get_mut(&user_id)
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))
    }

    fn deck_mut(&mut self, deck_id: Uuid) -> PortResult<&mut Deck> {
        self.decks
            .get_mut(&deck_id)
            .ok_or_else(|| PortError::NotFound(format!("Deck {} not found", deck_id)))
    }

    fn flashcard_mut(&mut self, card_id: Uuid) -> PortResult<&mut Flashcard> {
        self.flashcards
            .get_mut(&card_id)
            .ok_or_else(|| PortError::NotFound(format!("Flashcard {} not found", card_id)))
    }

    fn enrollment_mut(&mut self, enrollment_id: Uuid) -> PortResult<&mut Enrollment> {
        self.enrollments
            .get_mut(&enrollment_id)
            .ok_or_else(|| PortError::NotFound(format!("Enrollment {} not found", enrollment_id)))
    }

    fn session_mut(&mut self, session_id: Uuid) -> PortResult<&mut StudySession> {
        self.sessions
            .get_mut(&session_id)
            .ok_or_else(|| PortError::NotFound(format!("Study session {} not found", session_id)))
    }

    fn find_enrollment(&self, user_id: Uuid, scope: EnrollmentScope) -> Option<Enrollment> {
        self.enrollments
            .values()
            .find(|e| e.user_id == user_id && e.scope == scope)
            .cloned()
    }
}

/// Newest first, with the id as a tiebreaker so listings are stable.
fn newest_first(decks: &mut [Deck]) {
    decks.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
}

#[derive(Default)]
pub struct InMemoryDatabase {
    tables: RwLock<Tables>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flips a user's active flag. There is no HTTP route for deactivation, so this
    /// exists for seeding and tests.
    pub async fn set_user_active(&self, user_id: Uuid, is_active: bool) -> PortResult<()> {
        let mut tables = self.tables.write().await;
        let credentials = tables.user_mut(user_id)?;
        credentials.user.is_active = is_active;
        credentials.user.updated_at = Utc::now();
        Ok(())
    }

    /// Creates an account with an arbitrary role, bypassing the registration rules.
    pub async fn seed_user(&self, new_user: NewUser) -> PortResult<User> {
        self.create_user(new_user).await
    }
}

#[async_trait]
impl DatabaseService for InMemoryDatabase {
    // --- Users ---

    async fn create_user(&self, new_user: NewUser) -> PortResult<User> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|c| c.user.email == new_user.email) {
            return Err(PortError::Conflict("User already exists".to_string()));
        }
        if tables.users.values().any(|c| c.user.username == new_user.username) {
            return Err(PortError::Conflict("User already exists".to_string()));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: new_user.email,
            username: new_user.username,
            full_name: new_user.full_name,
            role: new_user.role,
            is_active: true,
            email_verified: false,
            force_password_change: false,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        };
        tables.users.insert(
            user.id,
            UserCredentials {
                user: user.clone(),
                hashed_password: new_user.hashed_password,
            },
        );
        Ok(user)
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        let tables = self.tables.read().await;
        Ok(tables.user(user_id)?.user.clone())
    }

    async fn get_credentials_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let tables = self.tables.read().await;
        tables
            .users
            .values()
            .find(|c| c.user.email == email)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("User with email {} not found", email)))
    }

    async fn get_credentials_by_id(&self, user_id: Uuid) -> PortResult<UserCredentials> {
        let tables = self.tables.read().await;
        tables.user(user_id).cloned()
    }

    async fn email_taken(&self, email: &str) -> PortResult<bool> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().any(|c| c.user.email == email))
    }

    async fn username_taken(&self, username: &str) -> PortResult<bool> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().any(|c| c.user.username == username))
    }

    async fn update_user_password(
        &self,
        user_id: Uuid,
        hashed_password: &str,
        force_change: bool,
    ) -> PortResult<()> {
        let mut tables = self.tables.write().await;
        let credentials = tables.user_mut(user_id)?;
        credentials.hashed_password = hashed_password.to_string();
        credentials.user.force_password_change = force_change;
        credentials.user.updated_at = Utc::now();
        Ok(())
    }

    async fn record_login(&self, user_id: Uuid, at: DateTime<Utc>) -> PortResult<()> {
        let mut tables = self.tables.write().await;
        tables.user_mut(user_id)?.user.last_login_at = Some(at);
        Ok(())
    }

    // --- Decks ---

    async fn create_deck(&self, new_deck: NewDeck) -> PortResult<Deck> {
        let mut tables = self.tables.write().await;
        tables.user(new_deck.owner_id)?;

        let now = Utc::now();
        let deck = Deck {
            id: Uuid::new_v4(),
            owner_id: new_deck.owner_id,
            title: new_deck.title,
            description: new_deck.description,
            privacy_level: new_deck.privacy_level,
            card_count: 0,
            tags: new_deck.tags,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        tables.decks.insert(deck.id, deck.clone());
        Ok(deck)
    }

    async fn get_deck_by_id(&self, deck_id: Uuid) -> PortResult<Deck> {
        let tables = self.tables.read().await;
        tables
            .decks
            .get(&deck_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Deck {} not found", deck_id)))
    }

    async fn list_decks_by_owner(&self, owner_id: Uuid) -> PortResult<Vec<Deck>> {
        let tables = self.tables.read().await;
        let mut decks: Vec<Deck> = tables
            .decks
            .values()
            .filter(|d| d.owner_id == owner_id && d.is_active)
            .cloned()
            .collect();
        newest_first(&mut decks);
        Ok(decks)
    }

    async fn list_decks(&self, privacy_level: Option<PrivacyLevel>) -> PortResult<Vec<Deck>> {
        let tables = self.tables.read().await;
        let mut decks: Vec<Deck> = tables
            .decks
            .values()
            .filter(|d| d.is_active && privacy_level.map_or(true, |level| d.privacy_level == level))
            .cloned()
            .collect();
        newest_first(&mut decks);
        Ok(decks)
    }

    async fn update_deck_privacy(&self, deck_id: Uuid, privacy_level: PrivacyLevel) -> PortResult<Deck> {
        let mut tables = self.tables.write().await;
        let deck = tables.deck_mut(deck_id)?;
        deck.privacy_level = privacy_level;
        deck.updated_at = Utc::now();
        Ok(deck.clone())
    }

    async fn soft_delete_deck(&self, deck_id: Uuid) -> PortResult<()> {
        let mut tables = self.tables.write().await;
        let deck = tables.deck_mut(deck_id)?;
        deck.is_active = false;
        deck.updated_at = Utc::now();
        Ok(())
    }

    // --- Flashcards ---

    async fn create_flashcard(&self, new_card: NewFlashcard) -> PortResult<Flashcard> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let deck = tables.deck_mut(new_card.deck_id)?;
        deck.card_count += 1;
        deck.updated_at = now;

        let card = Flashcard {
            id: Uuid::new_v4(),
            deck_id: new_card.deck_id,
            question: new_card.question,
            answer: new_card.answer,
            hint: new_card.hint,
            explanation: new_card.explanation,
            sm2: Sm2State::default(),
            stats: CardStats::default(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        tables.flashcards.insert(card.id, card.clone());
        Ok(card)
    }

    async fn get_flashcard_by_id(&self, card_id: Uuid) -> PortResult<Flashcard> {
        let tables = self.tables.read().await;
        tables
            .flashcards
            .get(&card_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Flashcard {} not found", card_id)))
    }

    async fn list_flashcards(&self, deck_id: Uuid) -> PortResult<Vec<Flashcard>> {
        let tables = self.tables.read().await;
        let mut cards: Vec<Flashcard> = tables
            .flashcards
            .values()
            .filter(|c| c.deck_id == deck_id && c.is_active)
            .cloned()
            .collect();
        cards.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(cards)
    }

    async fn save_flashcard_review(
        &self,
        card_id: Uuid,
        sm2: &Sm2State,
        stats: &CardStats,
    ) -> PortResult<Flashcard> {
        let mut tables = self.tables.write().await;
        let card = tables.flashcard_mut(card_id)?;
        card.sm2 = sm2.clone();
        card.stats = stats.clone();
        card.updated_at = Utc::now();
        Ok(card.clone())
    }

    // --- Class -> Course -> Lesson ---

    async fn create_class(&self, new_class: NewClass) -> PortResult<Class> {
        let mut tables = self.tables.write().await;
        if tables.classes.values().any(|c| c.class_code == new_class.class_code) {
            return Err(PortError::Conflict("Class code already exists".to_string()));
        }

        let class = Class {
            id: Uuid::new_v4(),
            name: new_class.name,
            description: new_class.description,
            teacher_id: new_class.teacher_id,
            class_code: new_class.class_code,
            course_ids: Vec::new(),
            max_students: new_class.max_students,
            is_active: true,
            created_at: Utc::now(),
        };
        tables.classes.insert(class.id, class.clone());
        Ok(class)
    }

    async fn get_class_by_id(&self, class_id: Uuid) -> PortResult<Class> {
        let tables = self.tables.read().await;
        tables
            .classes
            .get(&class_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Class {} not found", class_id)))
    }

    async fn create_course(&self, new_course: NewCourse) -> PortResult<Course> {
        let mut tables = self.tables.write().await;
        let course = Course {
            id: Uuid::new_v4(),
            title: new_course.title,
            description: new_course.description,
            creator_id: new_course.creator_id,
            lesson_ids: Vec::new(),
            is_active: true,
            created_at: Utc::now(),
        };

        if let Some(class_id) = new_course.class_id {
            let class = tables
                .classes
                .get_mut(&class_id)
                .ok_or_else(|| PortError::NotFound(format!("Class {} not found", class_id)))?;
            class.course_ids.push(course.id);
        }
        tables.courses.insert(course.id, course.clone());
        Ok(course)
    }

    async fn get_course_by_id(&self, course_id: Uuid) -> PortResult<Course> {
        let tables = self.tables.read().await;
        tables
            .courses
            .get(&course_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Course {} not found", course_id)))
    }

    async fn create_lesson(&self, new_lesson: NewLesson) -> PortResult<Lesson> {
        let mut tables = self.tables.write().await;
        let course = tables
            .courses
            .get_mut(&new_lesson.course_id)
            .ok_or_else(|| PortError::NotFound(format!("Course {} not found", new_lesson.course_id)))?;

        let lesson = Lesson {
            id: Uuid::new_v4(),
            course_id: new_lesson.course_id,
            title: new_lesson.title,
            description: new_lesson.description,
            order_index: i32::try_from(course.lesson_ids.len()).unwrap_or(i32::MAX),
            is_published: false,
            created_at: Utc::now(),
        };
        course.lesson_ids.push(lesson.id);
        tables.lessons.insert(lesson.id, lesson.clone());
        Ok(lesson)
    }

    async fn get_lesson_by_id(&self, lesson_id: Uuid) -> PortResult<Lesson> {
        let tables = self.tables.read().await;
        tables
            .lessons
            .get(&lesson_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Lesson {} not found", lesson_id)))
    }

    // --- Enrollments ---

    async fn create_enrollment(&self, new_enrollment: NewEnrollment) -> PortResult<Enrollment> {
        let mut tables = self.tables.write().await;
        tables.user(new_enrollment.user_id)?;
        if tables
            .find_enrollment(new_enrollment.user_id, new_enrollment.scope)
            .is_some()
        {
            return Err(PortError::Conflict("Enrollment already exists".to_string()));
        }

        let now = Utc::now();
        let enrollment = Enrollment {
            id: Uuid::new_v4(),
            user_id: new_enrollment.user_id,
            scope: new_enrollment.scope,
            status: new_enrollment.status,
            enrolled_by: new_enrollment.enrolled_by,
            enrolled_at: now,
            updated_at: now,
        };
        tables.enrollments.insert(enrollment.id, enrollment.clone());
        Ok(enrollment)
    }

    async fn get_enrollment_by_id(&self, enrollment_id: Uuid) -> PortResult<Enrollment> {
        let tables = self.tables.read().await;
        tables
            .enrollments
            .get(&enrollment_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Enrollment {} not found", enrollment_id)))
    }

    async fn update_enrollment_status(
        &self,
        enrollment_id: Uuid,
        status: EnrollmentStatus,
    ) -> PortResult<Enrollment> {
        let mut tables = self.tables.write().await;
        let enrollment = tables.enrollment_mut(enrollment_id)?;
        enrollment.status = status;
        enrollment.updated_at = Utc::now();
        Ok(enrollment.clone())
    }

    async fn find_class_enrollment(&self, user_id: Uuid, class_id: Uuid) -> PortResult<Option<Enrollment>> {
        let tables = self.tables.read().await;
        Ok(tables.find_enrollment(user_id, EnrollmentScope::Class(class_id)))
    }

    async fn find_course_enrollment(&self, user_id: Uuid, course_id: Uuid) -> PortResult<Option<Enrollment>> {
        let tables = self.tables.read().await;
        Ok(tables.find_enrollment(user_id, EnrollmentScope::Course(course_id)))
    }

    async fn teacher_has_student(&self, teacher_id: Uuid, student_id: Uuid) -> PortResult<bool> {
        let tables = self.tables.read().await;
        Ok(tables
            .enrollments
            .values()
            .filter(|e| e.user_id == student_id && e.status.grants_access())
            .any(|e| match e.scope {
                EnrollmentScope::Class(id) => tables.classes.get(&id).is_some_and(|c| c.teacher_id == teacher_id),
                EnrollmentScope::Course(id) => tables.courses.get(&id).is_some_and(|c| c.creator_id == teacher_id),
                EnrollmentScope::Lesson(_) => false,
            }))
    }

    // --- Deck Assignments ---

    async fn create_deck_assignment(&self, new_assignment: NewDeckAssignment) -> PortResult<DeckAssignment> {
        let mut tables = self.tables.write().await;
        tables.deck_mut(new_assignment.deck_id)?;

        let assignment = DeckAssignment {
            id: Uuid::new_v4(),
            deck_id: new_assignment.deck_id,
            assigned_by: new_assignment.assigned_by,
            target: new_assignment.target,
            title: new_assignment.title,
            status: AssignmentStatus::Assigned,
            assigned_at: Utc::now(),
            due_date: new_assignment.due_date,
            completion_criteria: new_assignment.completion_criteria,
        };
        tables.assignments.insert(assignment.id, assignment.clone());
        Ok(assignment)
    }

    async fn list_deck_assignments(
        &self,
        deck_id: Uuid,
        assignment_type: Option<AssignmentType>,
    ) -> PortResult<Vec<DeckAssignment>> {
        let tables = self.tables.read().await;
        let mut assignments: Vec<DeckAssignment> = tables
            .assignments
            .values()
            .filter(|a| a.deck_id == deck_id)
            .filter(|a| assignment_type.map_or(true, |t| a.target.assignment_type() == t))
            .cloned()
            .collect();
        assignments.sort_by(|a, b| a.assigned_at.cmp(&b.assigned_at).then(a.id.cmp(&b.id)));
        Ok(assignments)
    }

    async fn deck_has_active_assignments(&self, deck_id: Uuid) -> PortResult<bool> {
        let tables = self.tables.read().await;
        Ok(tables
            .assignments
            .values()
            .any(|a| a.deck_id == deck_id && a.status.is_active()))
    }
    // --- Study Sessions ---

    async fn create_study_session(&self, new_session: NewStudySession) -> PortResult<StudySession> {
        let mut tables = self.tables.write().await;
        tables.user(new_session.user_id)?;
        if !tables.decks.contains_key(&new_session.deck_id) {
            return Err(PortError::NotFound(format!("Deck {} not found", new_session.deck_id)));
        }
        if let Some(lesson_id) = new_session.lesson_id {
            if !tables.lessons.contains_key(&lesson_id) {
                return Err(PortError::NotFound(format!("Lesson {} not found", lesson_id)));
            }
        }

        let now = Utc::now();
        let session = StudySession {
            id: Uuid::new_v4(),
            user_id: new_session.user_id,
            deck_id: new_session.deck_id,
            lesson_id: new_session.lesson_id,
            study_mode: new_session.study_mode,
            target_cards: new_session.target_cards,
            target_time: new_session.target_time,
            cards_studied: 0,
            correct_answers: 0,
            incorrect_answers: 0,
            total_time: 0,
            status: SessionStatus::Active,
            started_at: now,
            completed_at: None,
            updated_at: now,
        };
        tables.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn get_study_session_by_id(&self, session_id: Uuid) -> PortResult<StudySession> {
        let tables = self.tables.read().await;
        tables
            .sessions
            .get(&session_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Study session {} not found", session_id)))
    }

    async fn list_study_sessions(&self, user_id: Uuid) -> PortResult<Vec<StudySession>> {
        let tables = self.tables.read().await;
        let mut sessions: Vec<StudySession> = tables
            .sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(a.id.cmp(&b.id)));
        Ok(sessions)
    }

    async fn record_session_review(
        &self,
        session_id: Uuid,
        correct: bool,
        at: DateTime<Utc>,
    ) -> PortResult<StudySession> {
        let mut tables = self.tables.write().await;
        let session = tables.session_mut(session_id)?;
        if session.status != SessionStatus::Active {
            return Err(PortError::Conflict(format!("Study session is {}", session.status)));
        }

        session.cards_studied += 1;
        if correct {
            session.correct_answers += 1;
        } else {
            session.incorrect_answers += 1;
        }
        session.updated_at = at;
        Ok(session.clone())
    }

    async fn update_study_session_status(
        &self,
        session_id: Uuid,
        from: SessionStatus,
        to: SessionStatus,
        at: DateTime<Utc>,
    ) -> PortResult<StudySession> {
        let mut tables = self.tables.write().await;
        let session = tables.session_mut(session_id)?;
        if session.status != from {
            return Err(PortError::Conflict(format!(
                "Study session is already {}",
                session.status
            )));
        }

        session.status = to;
        session.updated_at = at;
        if to.is_finished() {
            session.completed_at = Some(at);
            session.total_time = session.elapsed_secs(at);
        } else {
            session.completed_at = None;
        }
        Ok(session.clone())
    }
}
