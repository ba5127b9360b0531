//! # Station Announcement Common Library
//!
//! Shared code for the announcement services including:
//! - Announcement records exchanged with the generators
//! - Error types
//! - Bootstrap configuration loading
//! - Clock and timestamp helpers

pub mod announcement;
pub mod config;
pub mod error;
pub mod time;

pub use announcement::{AnnonType, Announcement, AudioInfo, Priority};
pub use error::{Error, Result};
