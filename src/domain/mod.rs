//! Core domain types for the requirements request pipeline.
//!
//! This module contains pure domain types with no persistence dependencies:
//! - People referenced by requests
//! - The request record and its status state machine
//! - Notes attached to requests

pub mod note;
pub mod person;
pub mod request;

pub use note::{NewNote, Note, NoteId};
pub use person::{Person, PersonId};
