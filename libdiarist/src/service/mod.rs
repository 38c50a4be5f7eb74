//! Service layer for Diarist
//!
//! This module provides the API a view layer or a command-line driver uses to
//! author one entry, without having to wire the pieces together itself.
//!
//! # Architecture
//!
//! The service layer follows a facade pattern with `AuthoringService` as the
//! main entry point, coordinating:
//!
//! - `AuthoringSession`: the state of the entry and the only way to change it
//! - `UploadCoordinator`: adding local files as uploading images
//! - `ReconciliationPoller`: merging backend upload outcomes into the state
//! - `EventBus`: user-visible notices
//!
//! # Example
//!
//! ```no_run
//! use libdiarist::service::AuthoringService;
//! use libdiarist::types::{EntryId, UploadFile};
//! use libdiarist::Config;
//!
//! # async fn example() -> libdiarist::Result<()> {
//! let config = Config::load()?;
//! let entry: EntryId = "67e55044-10b1-426f-9247-bb680e5fe0c8".parse().unwrap();
//! let service = AuthoringService::from_config(&config, entry)?;
//!
//! let poller = service.start_polling();
//! let report = service
//!     .uploads()
//!     .add_files(vec![UploadFile::new("beach.jpg", None, std::fs::read("beach.jpg")?)])
//!     .await;
//! println!("Added {} images", report.added.len());
//!
//! let state = service.session().wait_until_settled().await;
//! println!("{} posts", state.posts.len());
//! poller.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod events;
pub mod poller;
pub mod session;
pub mod upload;

pub use events::{Event, EventBus, EventReceiver};
pub use poller::{PollOutcome, PollerHandle, ReconciliationPoller};
pub use session::AuthoringSession;
pub use upload::{AddedImage, FileFailure, UploadCoordinator, UploadReport};

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::authoring::{Action, AuthoringState};
use crate::backend::{Backend, HttpBackend};
use crate::config::Config;
use crate::error::Result;
use crate::gestures::Gesture;
use crate::types::EntryId;

/// Main service facade for authoring one entry
///
/// All parts share the same `Arc<AuthoringSession>`, backend and event bus.
pub struct AuthoringService {
    session: Arc<AuthoringSession>,
    backend: Arc<dyn Backend>,
    uploads: UploadCoordinator,
    event_bus: EventBus,
    poll_interval: Duration,
}

impl AuthoringService {
    /// Create a service talking to the configured HTTP backend
    ///
    /// # Errors
    ///
    /// Returns an error if a configured duration is invalid or the HTTP
    /// client cannot be built.
    pub fn from_config(config: &Config, entry_id: EntryId) -> Result<Self> {
        let backend = HttpBackend::new(&config.backend)?;
        Self::with_backend(config, entry_id, Arc::new(backend))
    }

    /// Create a service with a custom backend, useful for testing
    pub fn with_backend(config: &Config, entry_id: EntryId, backend: Arc<dyn Backend>) -> Result<Self> {
        config.validate()?;

        let session = Arc::new(AuthoringSession::new(
            entry_id,
            config.authoring.max_images_per_post,
        ));
        let event_bus = EventBus::default();
        let uploads = UploadCoordinator::new(Arc::clone(&session), Arc::clone(&backend), event_bus.clone())
            .with_retry(config.uploads.max_attempts, config.uploads.retry_delay()?);

        Ok(Self {
            session,
            backend,
            uploads,
            event_bus,
            poll_interval: config.polling.interval()?,
        })
    }

    pub fn entry_id(&self) -> EntryId {
        self.session.entry_id()
    }

    pub fn session(&self) -> &Arc<AuthoringSession> {
        &self.session
    }

    pub fn uploads(&self) -> &UploadCoordinator {
        &self.uploads
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Subscribe to user-visible notices
    pub fn subscribe(&self) -> EventReceiver {
        self.event_bus.subscribe()
    }

    /// Apply an action to the session
    pub fn submit(&self, action: Action) {
        self.session.submit(action);
    }

    /// Apply the action a gesture maps to; returns false for no-op gestures
    pub fn dispatch(&self, gesture: Gesture) -> bool {
        match gesture.to_action() {
            Some(action) => {
                self.session.submit(action);
                true
            }
            None => false,
        }
    }

    pub fn snapshot(&self) -> AuthoringState {
        self.session.snapshot()
    }

    /// Poller bound to this service's session, not yet running
    pub fn poller(&self) -> ReconciliationPoller {
        ReconciliationPoller::new(
            Arc::clone(&self.session),
            Arc::clone(&self.backend),
            self.event_bus.clone(),
            self.poll_interval,
        )
    }

    /// Start background reconciliation
    pub fn start_polling(&self) -> PollerHandle {
        self.poller().spawn()
    }

    /// Replace the session's posts with the ones stored for the entry
    ///
    /// Returns the number of posts loaded.
    pub async fn resume(&self) -> Result<usize> {
        let posts = self.backend.load_posts_for_editing(self.entry_id()).await?;
        let count = posts.len();
        info!(entry_id = %self.entry_id(), posts = count, "Resuming entry");

        self.session.submit(Action::load_posts(posts));
        Ok(count)
    }

    /// Store the current posts for the entry
    pub async fn save(&self) -> Result<()> {
        let posts = self.session.with_state_ref(|state| state.posts.clone());
        self.backend.save_posts(self.entry_id(), &posts).await?;

        info!(entry_id = %self.entry_id(), posts = posts.len(), "Saved entry");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::types::{Image, ImageId, ImageState, Post, PostId, PostPatch};

    fn service(backend: &MockBackend) -> AuthoringService {
        let config = Config::for_backend("http://localhost");
        AuthoringService::with_backend(&config, EntryId::new_v4(), Arc::new(backend.clone())).unwrap()
    }

    #[test]
    fn test_new_service_has_one_empty_post() {
        let service = service(&MockBackend::success());

        let state = service.snapshot();
        assert_eq!(state.posts.len(), 1);
        assert!(state.check_invariants().is_empty());
    }

    #[test]
    fn test_with_backend_rejects_invalid_config() {
        let mut config = Config::for_backend("http://localhost");
        config.polling.interval = "never".to_string();

        let result = AuthoringService::with_backend(&config, EntryId::new_v4(), Arc::new(MockBackend::success()));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_save_then_resume() {
        let backend = MockBackend::success();
        let service = service(&backend);
        service.submit(Action::UpdatePost(PostPatch::default().title("Day one")));

        service.save().await.unwrap();
        let stored = backend.stored_posts(service.entry_id()).unwrap();
        assert_eq!(stored[0].title, "Day one");

        let mut second = Post::new(PostId::new_v4(), 1);
        second.title = "Day two".to_string();
        second.images.push(Image {
            id: ImageId::new_v4(),
            key: Some("entries/1/harbour.jpg".to_string()),
            order: 0,
            is_selected: false,
            state: ImageState::Loaded {
                url: "https://cdn.example.com/harbour.jpg".to_string(),
            },
        });
        backend.store_posts(service.entry_id(), vec![stored[0].clone(), second]);

        let loaded = service.resume().await.unwrap();
        assert_eq!(loaded, 2);
        let state = service.snapshot();
        assert_eq!(state.posts[1].title, "Day two");
        assert!(state.check_invariants().is_empty());
    }

    #[test]
    fn test_dispatch_skips_noop_gestures() {
        let service = service(&MockBackend::success());
        let post = service.snapshot().posts[0].id;

        let applied = service.dispatch(Gesture::DragEnd {
            active: crate::gestures::DragTarget::Post(post),
            over: None,
        });

        assert!(!applied);
        assert!(service.dispatch(Gesture::ClickPost { id: post }));
    }
}
