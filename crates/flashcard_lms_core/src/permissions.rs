//! crates/flashcard_lms_core/src/permissions.rs
//!
//! Role hierarchy and the role -> permission matrix used by the web guards.

use crate::domain::Role;
use serde::Serialize;

/// Granular permissions over the application's resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Permission {
    #[serde(rename = "user:create")]
    UserCreate,
    #[serde(rename = "user:read")]
    UserRead,
    #[serde(rename = "user:update")]
    UserUpdate,
    #[serde(rename = "user:delete")]
    UserDelete,
    #[serde(rename = "class:create")]
    ClassCreate,
    #[serde(rename = "class:read")]
    ClassRead,
    #[serde(rename = "class:update")]
    ClassUpdate,
    #[serde(rename = "class:delete")]
    ClassDelete,
    #[serde(rename = "course:create")]
    CourseCreate,
    #[serde(rename = "course:read")]
    CourseRead,
    #[serde(rename = "course:update")]
    CourseUpdate,
    #[serde(rename = "course:delete")]
    CourseDelete,
    #[serde(rename = "deck:create")]
    DeckCreate,
    #[serde(rename = "deck:read")]
    DeckRead,
    #[serde(rename = "deck:update")]
    DeckUpdate,
    #[serde(rename = "deck:delete")]
    DeckDelete,
    #[serde(rename = "study:all")]
    StudyAll,
    #[serde(rename = "study:read")]
    StudyRead,
    #[serde(rename = "progress:read")]
    ProgressRead,
    #[serde(rename = "progress:update")]
    ProgressUpdate,
    #[serde(rename = "profile:update")]
    ProfileUpdate,
    #[serde(rename = "student:manage")]
    StudentManage,
    #[serde(rename = "assignment:create")]
    AssignmentCreate,
    #[serde(rename = "assignment:read")]
    AssignmentRead,
    #[serde(rename = "assignment:update")]
    AssignmentUpdate,
    #[serde(rename = "assignment:delete")]
    AssignmentDelete,
    #[serde(rename = "system:manage")]
    SystemManage,
}

string_enum!(Permission, "permission", {
    UserCreate => "user:create",
    UserRead => "user:read",
    UserUpdate => "user:update",
    UserDelete => "user:delete",
    ClassCreate => "class:create",
    ClassRead => "class:read",
    ClassUpdate => "class:update",
    ClassDelete => "class:delete",
    CourseCreate => "course:create",
    CourseRead => "course:read",
    CourseUpdate => "course:update",
    CourseDelete => "course:delete",
    DeckCreate => "deck:create",
    DeckRead => "deck:read",
    DeckUpdate => "deck:update",
    DeckDelete => "deck:delete",
    StudyAll => "study:all",
    StudyRead => "study:read",
    ProgressRead => "progress:read",
    ProgressUpdate => "progress:update",
    ProfileUpdate => "profile:update",
    StudentManage => "student:manage",
    AssignmentCreate => "assignment:create",
    AssignmentRead => "assignment:read",
    AssignmentUpdate => "assignment:update",
    AssignmentDelete => "assignment:delete",
    SystemManage => "system:manage",
});

use Permission::*;

const ADMIN_PERMISSIONS: &[Permission] = &[
    UserCreate,
    UserRead,
    UserUpdate,
    UserDelete,
    ClassCreate,
    ClassRead,
    ClassUpdate,
    ClassDelete,
    CourseCreate,
    CourseRead,
    CourseUpdate,
    CourseDelete,
    DeckCreate,
    DeckRead,
    DeckUpdate,
    DeckDelete,
    StudyAll,
    ProgressRead,
    ProgressUpdate,
    AssignmentCreate,
    AssignmentRead,
    AssignmentUpdate,
    AssignmentDelete,
    SystemManage,
];

const TEACHER_PERMISSIONS: &[Permission] = &[
    UserRead,
    ClassCreate,
    ClassRead,
    ClassUpdate,
    CourseCreate,
    CourseRead,
    CourseUpdate,
    DeckCreate,
    DeckRead,
    DeckUpdate,
    StudyRead,
    ProgressRead,
    StudentManage,
    AssignmentCreate,
    AssignmentRead,
    AssignmentUpdate,
    ProfileUpdate,
];

const STUDENT_PERMISSIONS: &[Permission] = &[
    DeckRead,
    StudyAll,
    ProgressRead,
    AssignmentRead,
    ProfileUpdate,
];

impl Role {
    pub fn permissions(&self) -> &'static [Permission] {
        match self {
            Role::Admin => ADMIN_PERMISSIONS,
            Role::Teacher => TEACHER_PERMISSIONS,
            Role::Student => STUDENT_PERMISSIONS,
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }

    /// Position in the hierarchy: admin > teacher > student.
    pub fn level(&self) -> u8 {
        match self {
            Role::Student => 1,
            Role::Teacher => 2,
            Role::Admin => 3,
        }
    }

    pub fn at_least(&self, required: Role) -> bool {
        self.level() >= required.level()
    }
}
