//! services/api/src/auth/mod.rs
//!
//! Password hashing, JWT issuance and revocation, and the account workflows built on them.

pub mod blacklist;
pub mod password;
pub mod service;
pub mod tokens;

pub use blacklist::{BlacklistPurger, TokenBlacklist};
pub use password::PasswordHasher;
pub use service::AuthService;
pub use tokens::{Claims, TokenError, TokenPair, TokenService, TokenType};
