//! Request aggregate - domain model and state transitions.
//!
//! This module contains the core domain logic for requests:
//! - The request record, its status enum and value objects
//! - Next/reject status rules and read-only checks

pub mod state;
pub mod transitions;

// Re-export commonly used types
pub use state::*;
