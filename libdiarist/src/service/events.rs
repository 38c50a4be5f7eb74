//! Event system for user-visible notices
//!
//! This module provides an in-process event bus for distributing upload and
//! reconciliation notices to subscribers without blocking operations.
//!
//! # Architecture
//!
//! The event bus uses `tokio::sync::broadcast` for multi-subscriber support.
//! Events are emitted by the upload coordinator and the reconciliation poller
//! and can be consumed by any number of subscribers (CLI output, a view layer,
//! logs).
//!
//! # Non-Blocking Behavior
//!
//! If no subscribers exist, events are dropped immediately. Subscribers can
//! lag without blocking emitters.
//!
//! # Example
//!
//! ```no_run
//! use libdiarist::service::events::{Event, EventBus};
//!
//! # async fn example() {
//! let event_bus = EventBus::new(100);
//!
//! // Subscribe to events
//! let mut receiver = event_bus.subscribe();
//!
//! // Emit events (non-blocking)
//! event_bus.emit(Event::UnsupportedFile {
//!     name: "notes.txt".to_string(),
//!     declared_type: Some("text/plain".to_string()),
//! });
//!
//! // Receive events
//! if let Ok(event) = receiver.recv().await {
//!     println!("Received: {:?}", event);
//! }
//! # }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{ImageId, PostId};

/// Event receiver type alias
pub type EventReceiver = broadcast::Receiver<Event>;

/// Event bus for distributing notices
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl EventBus {
    /// Create a new event bus with the specified capacity
    ///
    /// The capacity determines how many events can be buffered per subscriber
    /// before older events are dropped (if the subscriber is lagging).
    ///
    /// ```
    /// use libdiarist::service::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events emitted after this call
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// If no subscribers exist, the event is dropped. Lagging subscribers
    /// lose the oldest events first.
    pub fn emit(&self, event: Event) {
        // send() only fails when nobody is listening
        let _ = self.sender.send(event);
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Notices emitted while adding files and reconciling uploads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// More files were offered than the selected post can hold
    CapacityExceeded {
        post_id: PostId,
        /// Files offered after filtering
        requested: usize,
        /// Files that fit
        accepted: usize,
        max_images_per_post: usize,
    },

    /// A file was rejected because it is not a supported image type
    UnsupportedFile {
        name: String,
        declared_type: Option<String>,
    },

    /// No upload destination could be obtained; the file was not added
    DestinationFailed { name: String, error: String },

    /// The bytes never reached storage; the image stays uploading
    TransferFailed {
        name: String,
        image_id: ImageId,
        key: String,
        error: String,
    },

    /// A poll settled some uploading images
    ImagesResolved {
        loaded: Vec<ImageId>,
        failed: Vec<ImageId>,
    },
}

impl Event {
    /// One-line description for terminal output
    pub fn describe(&self) -> String {
        match self {
            Event::CapacityExceeded {
                requested,
                accepted,
                max_images_per_post,
                ..
            } => format!(
                "Only {} of {} images added: a post holds at most {} images",
                accepted, requested, max_images_per_post
            ),
            Event::UnsupportedFile { name, .. } => {
                format!("Skipped {}: not a JPEG, PNG, GIF or WebP image", name)
            }
            Event::DestinationFailed { name, error } => {
                format!("Could not start upload of {}: {}", name, error)
            }
            Event::TransferFailed { name, error, .. } => {
                format!("Upload of {} failed: {}", name, error)
            }
            Event::ImagesResolved { loaded, failed } => {
                format!("{} images ready, {} failed processing", loaded.len(), failed.len())
            }
        }
    }
}
