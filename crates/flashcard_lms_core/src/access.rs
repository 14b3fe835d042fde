//! crates/flashcard_lms_core/src/access.rs
//!
//! Deck access resolution.
//!
//! The decision is split in two halves: `decide_deck_access` is a pure predicate
//! over already-fetched records, and `AccessResolver` fetches exactly the records
//! that predicate needs through the `DatabaseService` port.

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::domain::{
    AssignmentStatus, AssignmentTarget, AssignmentType, Deck, DeckAssignment, EnrollmentStatus,
    PrivacyLevel, Role, User,
};
use crate::ports::{DatabaseService, PortError, PortResult};

//=========================================================================================
// Decision Types
//=========================================================================================

/// The assignment through which an assigned deck was opened to a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentGrant {
    pub assignment_id: Uuid,
    pub assignment_type: AssignmentType,
    /// The class, course or lesson the deck is assigned to.
    pub target_id: Uuid,
    pub assigned_at: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
}

impl AssignmentGrant {
    fn from_assignment(assignment: &DeckAssignment) -> Self {
        Self {
            assignment_id: assignment.id,
            assignment_type: assignment.target.assignment_type(),
            target_id: assignment.target.target_id(),
            assigned_at: assignment.assigned_at,
            due_date: assignment.due_date,
        }
    }
}

/// Why access was granted, or that it was not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    Admin,
    Owner,
    Public,
    Assigned(AssignmentGrant),
    Denied,
}

impl AccessDecision {
    pub fn is_granted(&self) -> bool {
        !matches!(self, AccessDecision::Denied)
    }
}

/// A deck assignment paired with the user's enrollment status in the container it
/// resolves to. For lesson assignments that container is the lesson's parent course.
#[derive(Debug, Clone)]
pub struct AssignmentLink {
    pub assignment: DeckAssignment,
    pub enrollment_status: Option<EnrollmentStatus>,
}

impl AssignmentLink {
    fn opens_deck(&self) -> bool {
        self.assignment.status != AssignmentStatus::Cancelled
            && self
                .enrollment_status
                .as_ref()
                .is_some_and(EnrollmentStatus::grants_access)
    }
}

//=========================================================================================
// The Pure Predicate
//=========================================================================================

/// Decides whether `user` may read `deck`.
///
/// Admins see everything, including soft-deleted decks. Owners and public decks
/// pass for everyone else as long as the deck is live. Private decks are closed to
/// all non-owners. Assigned decks open only through a link of the matching
/// assignment type whose enrollment status is enrolled, in progress or completed.
pub fn decide_deck_access(user: &User, deck: &Deck, links: &[AssignmentLink]) -> AccessDecision {
    if user.role == Role::Admin {
        return AccessDecision::Admin;
    }
    if !deck.is_active {
        return AccessDecision::Denied;
    }
    if deck.owner_id == user.id {
        return AccessDecision::Owner;
    }

    let required = match deck.privacy_level {
        PrivacyLevel::Public => return AccessDecision::Public,
        PrivacyLevel::Private => return AccessDecision::Denied,
        level => level.assignment_type(),
    };

    links
        .iter()
        .filter(|link| Some(link.assignment.target.assignment_type()) == required)
        .find(|link| link.opens_deck())
        .map(|link| AccessDecision::Assigned(AssignmentGrant::from_assignment(&link.assignment)))
        .unwrap_or(AccessDecision::Denied)
}

/// Write paths (privacy changes, cards, assignments) are limited to the owner and admins.
pub fn owns_or_admin(user: &User, owner_id: Uuid) -> bool {
    user.role == Role::Admin || user.id == owner_id
}

//=========================================================================================
// The Resolver
//=========================================================================================

/// Every assignment through which a user currently reaches a deck.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessReport {
    pub has_access: bool,
    pub access_type: Option<AssignmentType>,
    pub assignments: Vec<AssignmentGrant>,
}

/// Fetches assignment and enrollment records for access decisions.
pub struct AccessResolver<'a> {
    db: &'a dyn DatabaseService,
}

impl<'a> AccessResolver<'a> {
    pub fn new(db: &'a dyn DatabaseService) -> Self {
        Self { db }
    }

    /// Resolves access for a fetched user and deck, querying enrollments only when the
    /// deck's privacy level depends on them.
    pub async fn check_deck_access(&self, user: &User, deck: &Deck) -> PortResult<AccessDecision> {
        let links = match deck.privacy_level.assignment_type() {
            Some(assignment_type)
                if user.role != Role::Admin && deck.is_active && deck.owner_id != user.id =>
            {
                self.links_for(user.id, deck.id, assignment_type).await?
            }
            _ => Vec::new(),
        };

        let decision = decide_deck_access(user, deck, &links);
        if !decision.is_granted() {
            debug!(
                user_id = %user.id,
                deck_id = %deck.id,
                privacy_level = %deck.privacy_level,
                "deck access denied"
            );
        }
        Ok(decision)
    }

    /// Collects the class, course and lesson assignments that currently open the deck
    /// to the user, independent of the deck's own privacy level. A deleted deck is
    /// opened by nothing.
    pub async fn assignment_report(&self, user: &User, deck: &Deck) -> PortResult<AccessReport> {
        let mut report = AccessReport::default();
        if !deck.is_active {
            return Ok(report);
        }

        for assignment_type in [AssignmentType::Class, AssignmentType::Course, AssignmentType::Lesson] {
            let links = self.links_for(user.id, deck.id, assignment_type).await?;
            for link in links.iter().filter(|link| link.opens_deck()) {
                report.has_access = true;
                report.access_type = Some(assignment_type);
                report
                    .assignments
                    .push(AssignmentGrant::from_assignment(&link.assignment));
            }
        }

        Ok(report)
    }

    /// All live decks (optionally at one privacy level) the user can read.
    pub async fn accessible_decks(
        &self,
        user: &User,
        privacy_level: Option<PrivacyLevel>,
    ) -> PortResult<Vec<Deck>> {
        let decks = self.db.list_decks(privacy_level).await?;
        let mut accessible = Vec::with_capacity(decks.len());
        for deck in decks {
            if self.check_deck_access(user, &deck).await?.is_granted() {
                accessible.push(deck);
            }
        }
        Ok(accessible)
    }

    /// Only the owner or an admin may change a deck's privacy, and a teacher may not
    /// make a deck private while it still has active assignments.
    pub async fn validate_privacy_change(
        &self,
        user: &User,
        deck: &Deck,
        new_level: PrivacyLevel,
    ) -> PortResult<bool> {
        if !owns_or_admin(user, deck.owner_id) {
            return Ok(false);
        }
        if user.role == Role::Teacher
            && new_level == PrivacyLevel::Private
            && self.db.deck_has_active_assignments(deck.id).await?
        {
            return Ok(false);
        }
        Ok(true)
    }

    async fn links_for(
        &self,
        user_id: Uuid,
        deck_id: Uuid,
        assignment_type: AssignmentType,
    ) -> PortResult<Vec<AssignmentLink>> {
        let assignments = self
            .db
            .list_deck_assignments(deck_id, Some(assignment_type))
            .await?;

        let mut links = Vec::with_capacity(assignments.len());
        for assignment in assignments {
            let enrollment_status = self.enrollment_status_for(user_id, &assignment.target).await?;
            links.push(AssignmentLink {
                assignment,
                enrollment_status,
            });
        }
        Ok(links)
    }

    async fn enrollment_status_for(
        &self,
        user_id: Uuid,
        target: &AssignmentTarget,
    ) -> PortResult<Option<EnrollmentStatus>> {
        let enrollment = match *target {
            AssignmentTarget::Class(class_id) => self.db.find_class_enrollment(user_id, class_id).await?,
            AssignmentTarget::Course(course_id) => {
                self.db.find_course_enrollment(user_id, course_id).await?
            }
            AssignmentTarget::Lesson(lesson_id) => match self.db.get_lesson_by_id(lesson_id).await {
                Ok(lesson) => self.db.find_course_enrollment(user_id, lesson.course_id).await?,
                // A lesson deleted after the assignment was made opens nothing.
                Err(PortError::NotFound(_)) => None,
                Err(e) => return Err(e),
            },
            AssignmentTarget::Student(_) => None,
        };
        Ok(enrollment.map(|e| e.status))
    }
}
