//! Reconciliation poller
//!
//! Asks the backend about every storage key that still has an open upload and
//! merges the answers into the session. While nothing is uploading the
//! background task sits on the state channel and makes no backend calls.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::events::{Event, EventBus};
use super::session::AuthoringSession;
use crate::authoring::AuthoringState;
use crate::backend::Backend;
use crate::error::Result;
use crate::types::{ImageId, UploadStatusReport};

/// Result of a single poll
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollOutcome {
    /// Keys sent to the backend
    pub polled: usize,
    /// Images now loaded
    pub loaded: Vec<ImageId>,
    /// Images whose post-processing failed
    pub failed: Vec<ImageId>,
}

impl PollOutcome {
    pub fn resolved(&self) -> usize {
        self.loaded.len() + self.failed.len()
    }
}

pub struct ReconciliationPoller {
    session: Arc<AuthoringSession>,
    backend: Arc<dyn Backend>,
    event_bus: EventBus,
    interval: Duration,
}

impl ReconciliationPoller {
    pub fn new(
        session: Arc<AuthoringSession>,
        backend: Arc<dyn Backend>,
        event_bus: EventBus,
        interval: Duration,
    ) -> Self {
        Self {
            session,
            backend,
            event_bus,
            interval,
        }
    }

    /// Poll once for every open upload
    ///
    /// Does nothing (and makes no backend call) when no upload is open.
    /// A failed poll leaves the state untouched.
    pub async fn poll_once(&self) -> Result<PollOutcome> {
        poll_session(&self.session, self.backend.as_ref(), &self.event_bus).await
    }

    /// Run the poller as a background task
    ///
    /// The task stops when [`PollerHandle::shutdown`] is called or once the
    /// session has been dropped. Dropping the handle detaches the task.
    pub fn spawn(self) -> PollerHandle {
        let shutdown = Arc::new(Notify::new());
        let signal = Arc::clone(&shutdown);

        let changes = self.session.subscribe();
        let session = Arc::downgrade(&self.session);
        let task = tokio::spawn(run_poll_loop(
            session,
            changes,
            self.backend,
            self.event_bus,
            self.interval,
            signal,
        ));

        PollerHandle { shutdown, task }
    }
}

/// Handle to a running poller task
pub struct PollerHandle {
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Stop the poller and wait for it to finish its current poll
    pub async fn shutdown(self) {
        self.shutdown.notify_one();
        if let Err(e) = self.task.await {
            warn!("Poller task ended abnormally: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

async fn poll_session(
    session: &AuthoringSession,
    backend: &dyn Backend,
    event_bus: &EventBus,
) -> Result<PollOutcome> {
    let keys = session.with_state_ref(AuthoringState::pending_upload_keys);
    if keys.is_empty() {
        return Ok(PollOutcome::default());
    }

    debug!(keys = keys.len(), "Polling upload status");
    let reports = backend.poll_upload_status(session.entry_id(), &keys).await?;

    let results = reports
        .into_iter()
        .filter_map(UploadStatusReport::into_result)
        .collect::<Vec<_>>();

    let applied = session.reconcile(results);

    let mut outcome = PollOutcome {
        polled: keys.len(),
        ..Default::default()
    };
    for (image_id, result) in applied {
        if result.is_success() {
            outcome.loaded.push(image_id);
        } else {
            outcome.failed.push(image_id);
        }
    }

    if outcome.resolved() > 0 {
        info!(
            loaded = outcome.loaded.len(),
            failed = outcome.failed.len(),
            "Uploads resolved"
        );
        event_bus.emit(Event::ImagesResolved {
            loaded: outcome.loaded.clone(),
            failed: outcome.failed.clone(),
        });
    }

    Ok(outcome)
}

/// Wait until something is uploading; false once the session is gone
async fn wait_for_pending(changes: &mut watch::Receiver<AuthoringState>) -> bool {
    changes
        .wait_for(AuthoringState::has_pending_uploads)
        .await
        .is_ok()
}

async fn run_poll_loop(
    session: Weak<AuthoringSession>,
    mut changes: watch::Receiver<AuthoringState>,
    backend: Arc<dyn Backend>,
    event_bus: EventBus,
    interval: Duration,
    shutdown: Arc<Notify>,
) {
    debug!(?interval, "Poller started");

    loop {
        tokio::select! {
            _ = shutdown.notified() => break,
            pending = wait_for_pending(&mut changes) => {
                if !pending {
                    debug!("Session closed, stopping poller");
                    break;
                }
            }
        }

        tokio::select! {
            _ = shutdown.notified() => break,
            _ = sleep(interval) => {}
        }

        let Some(live_session) = session.upgrade() else {
            debug!("Session closed, stopping poller");
            break;
        };

        match poll_session(&live_session, backend.as_ref(), &event_bus).await {
            Ok(outcome) => debug!(
                polled = outcome.polled,
                resolved = outcome.resolved(),
                "Poll complete"
            ),
            Err(e) => warn!("Upload status poll failed, retrying in {:?}: {}", interval, e),
        }
    }

    debug!("Poller stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authoring::Action;
    use crate::backend::MockBackend;
    use crate::types::{EntryId, ImageMimeType, NewImage};

    fn add_uploading(session: &AuthoringSession, key: &str) -> ImageId {
        let image = NewImage {
            id: ImageId::new_v4(),
            key: key.to_string(),
            name: format!("{}.jpg", key),
            size: 1,
            mimetype: ImageMimeType::Jpeg,
        };
        let id = image.id;
        session.submit(Action::AddImages(vec![image]));
        id
    }

    fn poller(session: &Arc<AuthoringSession>, backend: &MockBackend) -> ReconciliationPoller {
        ReconciliationPoller::new(
            Arc::clone(session),
            Arc::new(backend.clone()),
            EventBus::default(),
            Duration::from_millis(10),
        )
    }

    #[tokio::test]
    async fn test_poll_once_without_uploads_skips_backend() {
        let session = Arc::new(AuthoringSession::new(EntryId::new_v4(), 10));
        let backend = MockBackend::success();

        let outcome = poller(&session, &backend).poll_once().await.unwrap();

        assert_eq!(outcome, PollOutcome::default());
        assert_eq!(backend.poll_call_count(), 0);
    }

    #[tokio::test]
    async fn test_poll_once_resolves_known_keys() {
        let session = Arc::new(AuthoringSession::new(EntryId::new_v4(), 10));
        let backend = MockBackend::success();
        let loaded = add_uploading(&session, "k1");
        let failed = add_uploading(&session, "k2");
        let pending = add_uploading(&session, "k3");
        backend.complete("k1", "https://cdn/k1");
        backend.fail("k2");

        let outcome = poller(&session, &backend).poll_once().await.unwrap();

        assert_eq!(outcome.polled, 3);
        assert_eq!(outcome.loaded, vec![loaded]);
        assert_eq!(outcome.failed, vec![failed]);
        let state = session.snapshot();
        assert!(state.image(pending).unwrap().is_uploading());
        assert_eq!(state.pending_upload_keys(), vec!["k3".to_string()]);
    }

    #[tokio::test]
    async fn test_poll_error_leaves_state_untouched() {
        let session = Arc::new(AuthoringSession::new(EntryId::new_v4(), 10));
        let backend = MockBackend::success();
        add_uploading(&session, "k1");
        backend.complete("k1", "https://cdn/k1");
        backend.set_poll_failure(true);
        let before = session.snapshot();

        let result = poller(&session, &backend).poll_once().await;

        assert!(result.is_err());
        assert_eq!(session.snapshot(), before);
    }

    #[tokio::test]
    async fn test_spawned_poller_stops_on_shutdown() {
        let session = Arc::new(AuthoringSession::new(EntryId::new_v4(), 10));
        let backend = MockBackend::success();

        let handle = poller(&session, &backend).spawn();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!handle.is_finished());

        tokio::time::timeout(Duration::from_secs(1), handle.shutdown())
            .await
            .unwrap();
        assert_eq!(backend.poll_call_count(), 0);
    }

    #[tokio::test]
    async fn test_spawned_poller_stops_when_session_dropped() {
        let session = Arc::new(AuthoringSession::new(EntryId::new_v4(), 10));
        let backend = MockBackend::success();
        let handle = poller(&session, &backend).spawn();

        drop(session);

        tokio::time::timeout(Duration::from_secs(1), async {
            while !handle.is_finished() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }
}
