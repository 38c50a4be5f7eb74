//! Diarist - authoring core for multi-post diary entries
//!
//! This library models an entry as an ordered list of posts, each carrying
//! ordered images that upload straight to storage while the author keeps
//! editing. A pure reducer owns every state change; upload coordination and
//! status reconciliation run asynchronously around it.

pub mod authoring;
pub mod backend;
pub mod config;
pub mod error;
pub mod gestures;
pub mod logging;
pub mod service;
pub mod types;

// Re-export commonly used types
pub use authoring::{reduce, Action, AuthoringState};
pub use config::Config;
pub use error::{DiaristError, Result};
pub use service::{AuthoringService, AuthoringSession, Event};
pub use types::{EntryId, Image, ImageId, ImageState, Post, PostId};
