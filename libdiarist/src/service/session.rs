//! Authoring session
//!
//! Owns the authoring state of one entry. All writes go through
//! [`AuthoringSession::submit`], which applies the reducer atomically inside a
//! `tokio::sync::watch` channel; readers take snapshots or subscribe to
//! changes.

use std::collections::HashMap;

use tokio::sync::watch;
use tracing::debug;

use crate::authoring::{reduce, Action, AuthoringState};
use crate::types::{EntryId, ImageId, ImageResult};

pub struct AuthoringSession {
    entry_id: EntryId,
    state: watch::Sender<AuthoringState>,
}

impl std::fmt::Debug for AuthoringSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthoringSession")
            .field("entry_id", &self.entry_id)
            .field("posts", &self.state.borrow().posts.len())
            .finish()
    }
}

impl AuthoringSession {
    /// Session starting with one empty, selected post
    pub fn new(entry_id: EntryId, max_images_per_post: usize) -> Self {
        Self::with_state(entry_id, AuthoringState::new(max_images_per_post))
    }

    pub fn with_state(entry_id: EntryId, state: AuthoringState) -> Self {
        let (sender, _) = watch::channel(state);
        Self {
            entry_id,
            state: sender,
        }
    }

    pub fn entry_id(&self) -> EntryId {
        self.entry_id
    }

    /// Apply one action
    ///
    /// Actions are applied in call order and observers never see a partially
    /// applied transition.
    pub fn submit(&self, action: Action) {
        debug!(action = action.name(), entry_id = %self.entry_id, "Applying action");
        self.state.send_modify(|state| {
            let current = std::mem::take(state);
            *state = reduce(current, action);
        });
    }

    /// Apply poll results, translating storage keys to image ids against the
    /// state they are applied to
    ///
    /// Keys without an open upload (deleted or already resolved images) are
    /// dropped. Returns the results that were applied.
    pub fn reconcile(&self, results: Vec<ImageResult>) -> HashMap<ImageId, ImageResult> {
        let mut applied = HashMap::new();

        self.state.send_modify(|state| {
            applied = results
                .into_iter()
                .filter_map(|result| {
                    state
                        .image_id_for_key(result.key())
                        .map(|image_id| (image_id, result))
                })
                .collect();

            if !applied.is_empty() {
                let current = std::mem::take(state);
                *state = reduce(current, Action::UpdateImagesStatus(applied.clone()));
            }
        });

        if !applied.is_empty() {
            debug!(resolved = applied.len(), entry_id = %self.entry_id, "Reconciled uploads");
        }
        applied
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> AuthoringState {
        self.state.borrow().clone()
    }

    /// Read the current state without copying it
    pub fn with_state_ref<R>(&self, f: impl FnOnce(&AuthoringState) -> R) -> R {
        f(&self.state.borrow())
    }

    /// Receiver notified after every applied action
    pub fn subscribe(&self) -> watch::Receiver<AuthoringState> {
        self.state.subscribe()
    }

    /// Wait until no image is uploading and return that state
    pub async fn wait_until_settled(&self) -> AuthoringState {
        let mut changes = self.subscribe();
        let settled = match changes.wait_for(|state| !state.has_pending_uploads()).await {
            Ok(state) => state.clone(),
            // The sender lives as long as `self`
            Err(_) => self.snapshot(),
        };
        settled
    }
}
