//! # MPBI Common Library
//!
//! Shared code for the MPBI invoice generation service and its clients:
//! - Configuration loading and folder resolution
//! - Database bootstrap and settings access
//! - API authentication (timestamp + hash) and shared request/response types
//! - Generation event types and the broadcast EventBus

pub mod api;
pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod events;
pub mod human_size;

pub use error::{Error, Result};
pub use events::{EventBus, GenerationEvent};
