//! # citewire-core
//!
//! Core types, traits, and abstractions for the citewire pipeline.
//!
//! This crate provides the foundational data structures and trait seams
//! that the other citewire crates depend on.

pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod search;
pub mod text;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use search::*;
pub use traits::*;
