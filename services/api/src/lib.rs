//! services/api/src/lib.rs
//!
//! The HTTP service: configuration, authentication, storage adapters and the axum router.

pub mod adapters;
pub mod auth;
pub mod config;
pub mod error;
pub mod web;
