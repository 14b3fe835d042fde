#[macro_use]
pub mod domain;
pub mod access;
pub mod permissions;
pub mod ports;
pub mod scheduling;
pub mod sessions;

pub use access::{decide_deck_access, owns_or_admin, AccessDecision, AccessReport, AccessResolver, AssignmentGrant};
pub use domain::{
    AssignmentStatus, AssignmentTarget, AssignmentType, CardStats, Class, CompletionCriteria, Course, Deck,
    DeckAssignment, Enrollment, EnrollmentScope, EnrollmentStatus, Flashcard, Lesson, PrivacyLevel, Role,
    SessionStatus, Sm2State, StudyMode, StudySession, User, UserCredentials,
};
pub use permissions::Permission;
pub use ports::{DatabaseService, PortError, PortResult};
