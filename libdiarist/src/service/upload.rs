//! Upload coordination
//!
//! Turns a batch of local files into uploading images of the selected post:
//! filters unsupported and duplicate files, enforces the per-post capacity,
//! obtains upload destinations concurrently (with retry), registers every
//! image in one `AddImages` action and then transfers the bytes concurrently.
//!
//! Final image state is never decided here; the reconciliation poller does
//! that from backend confirmations.

use futures::future::join_all;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::events::{Event, EventBus};
use super::session::AuthoringSession;
use crate::authoring::Action;
use crate::backend::Backend;
use crate::error::{is_transient_error, BackendError, Result};
use crate::types::{
    EntryId, FileMetadata, ImageId, NewImage, UploadDestination, UploadFile,
};

/// An image added to the selected post
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedImage {
    pub image_id: ImageId,
    pub name: String,
    pub key: String,
}

/// A file that could not be processed, with the reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub name: String,
    pub error: String,
}

/// What happened to each file of a batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    /// Added as uploading images (including those whose transfer failed)
    pub added: Vec<AddedImage>,
    /// Not a supported image type
    pub unsupported: Vec<String>,
    /// Same content already being uploaded
    pub duplicates: Vec<String>,
    /// Dropped because the selected post is full
    pub over_capacity: Vec<String>,
    /// No upload destination could be obtained; not added
    pub destination_failures: Vec<FileFailure>,
    /// Added, but the bytes never reached storage
    pub transfer_failures: Vec<FileFailure>,
}

impl UploadReport {
    /// Whether every offered file ended up transferred
    pub fn is_clean(&self) -> bool {
        self.unsupported.is_empty()
            && self.duplicates.is_empty()
            && self.over_capacity.is_empty()
            && self.destination_failures.is_empty()
            && self.transfer_failures.is_empty()
    }
}

/// Upper bound for one backoff wait between destination attempts
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Holds one fingerprint in the in-flight set until dropped
///
/// Dropping releases the claim, also when `add_files` is cancelled midway.
struct InFlightClaim<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    fingerprint: String,
}

impl Drop for InFlightClaim<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.fingerprint);
    }
}

/// A file that passed filtering
struct Candidate<'a> {
    file: UploadFile,
    metadata: FileMetadata,
    _claim: InFlightClaim<'a>,
}

/// Adds files to the selected post of a session
///
/// The only state kept here is the set of content fingerprints currently in
/// flight, so the same file offered twice is uploaded once.
pub struct UploadCoordinator {
    session: Arc<AuthoringSession>,
    backend: Arc<dyn Backend>,
    event_bus: EventBus,
    max_attempts: u32,
    retry_delay: Duration,
    in_flight: Mutex<HashSet<String>>,
}

impl UploadCoordinator {
    pub fn new(session: Arc<AuthoringSession>, backend: Arc<dyn Backend>, event_bus: EventBus) -> Self {
        Self {
            session,
            backend,
            event_bus,
            max_attempts: 3,
            retry_delay: Duration::from_secs(1),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Retry policy for destination requests
    ///
    /// `max_attempts` is clamped to at least one attempt.
    pub fn with_retry(mut self, max_attempts: u32, retry_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    /// Number of files currently being uploaded by this coordinator
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Add files to the selected post
    ///
    /// Never fails as a whole: every file's fate is recorded in the returned
    /// report and user-relevant problems are also emitted on the event bus.
    pub async fn add_files(&self, files: Vec<UploadFile>) -> UploadReport {
        let mut report = UploadReport::default();

        let mut candidates = self.filter_files(files, &mut report);
        if candidates.is_empty() {
            return report;
        }

        // Capacity of the selected post, as seen before any network round trip
        let (post_id, available) = self.session.with_state_ref(|state| {
            (
                state.selected_post().map(|post| post.id),
                state.available_slots(),
            )
        });

        if candidates.len() > available {
            let requested = candidates.len();
            let dropped = candidates.split_off(available);
            warn!(
                requested,
                accepted = available,
                "Selected post cannot hold every image, dropping {} files",
                dropped.len()
            );
            report
                .over_capacity
                .extend(dropped.into_iter().map(|c| c.file.name));

            if let Some(post_id) = post_id {
                self.event_bus.emit(Event::CapacityExceeded {
                    post_id,
                    requested,
                    accepted: available,
                    max_images_per_post: self.session.with_state_ref(|s| s.max_images_per_post),
                });
            }
        }

        if candidates.is_empty() {
            return report;
        }

        let destinations = self.request_destinations(&candidates).await;

        let mut pending = Vec::new();
        let mut new_images = Vec::new();
        for (candidate, destination) in candidates.into_iter().zip(destinations) {
            match destination {
                Ok(destination) => {
                    let image_id = ImageId::new_v4();
                    new_images.push(NewImage {
                        id: image_id,
                        key: destination.key.clone(),
                        name: candidate.metadata.name.clone(),
                        size: candidate.metadata.size,
                        mimetype: candidate.metadata.mimetype,
                    });
                    pending.push((image_id, candidate, destination));
                }
                Err(e) => {
                    warn!("Could not obtain upload destination for {}: {}", candidate.file.name, e);
                    self.event_bus.emit(Event::DestinationFailed {
                        name: candidate.file.name.clone(),
                        error: e.to_string(),
                    });
                    report.destination_failures.push(FileFailure {
                        name: candidate.file.name,
                        error: e.to_string(),
                    });
                }
            }
        }

        if new_images.is_empty() {
            return report;
        }

        // One action registers every key before any byte is sent
        let requested = new_images.len();
        self.session.submit(Action::AddImages(new_images));

        // The post may have filled up (or been deleted) while destinations were requested
        let (accepted, rejected): (Vec<_>, Vec<_>) = self.session.with_state_ref(|state| {
            pending
                .into_iter()
                .partition(|(image_id, _, _)| state.image(*image_id).is_some())
        });
        if !rejected.is_empty() {
            warn!(
                requested,
                accepted = accepted.len(),
                "Selected post filled up during upload, dropping {} files",
                rejected.len()
            );
            if let Some(post_id) = post_id {
                self.event_bus.emit(Event::CapacityExceeded {
                    post_id,
                    requested,
                    accepted: accepted.len(),
                    max_images_per_post: self.session.with_state_ref(|s| s.max_images_per_post),
                });
            }
        }
        for (_, candidate, _) in rejected {
            debug!("{} was not added to the selected post", candidate.file.name);
            report.over_capacity.push(candidate.file.name);
        }

        for (image_id, candidate, destination) in &accepted {
            report.added.push(AddedImage {
                image_id: *image_id,
                name: candidate.file.name.clone(),
                key: destination.key.clone(),
            });
        }

        let transfers = accepted.iter().map(|(image_id, candidate, destination)| {
            let backend = Arc::clone(&self.backend);
            async move {
                let result = backend.transfer_file(destination, &candidate.file).await;
                (*image_id, candidate, destination, result)
            }
        });

        for (image_id, candidate, destination, result) in join_all(transfers).await {
            match result {
                Ok(()) => info!(key = %destination.key, "Transferred {}", candidate.file.name),
                Err(e) => {
                    warn!(key = %destination.key, "Transfer of {} failed: {}", candidate.file.name, e);
                    self.event_bus.emit(Event::TransferFailed {
                        name: candidate.file.name.clone(),
                        image_id,
                        key: destination.key.clone(),
                        error: e.to_string(),
                    });
                    report.transfer_failures.push(FileFailure {
                        name: candidate.file.name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        report
    }

    /// Drop unsupported files and files already in flight, claiming the rest
    fn filter_files(&self, files: Vec<UploadFile>, report: &mut UploadReport) -> Vec<Candidate<'_>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        let mut candidates = Vec::new();

        for file in files {
            let Some(metadata) = file.metadata() else {
                debug!("Rejecting {}: unsupported type", file.name);
                self.event_bus.emit(Event::UnsupportedFile {
                    name: file.name.clone(),
                    declared_type: file.declared_type.clone(),
                });
                report.unsupported.push(file.name);
                continue;
            };

            let fingerprint = file.fingerprint();
            if !in_flight.insert(fingerprint.clone()) {
                debug!("Skipping {}: already uploading", file.name);
                report.duplicates.push(file.name);
                continue;
            }

            candidates.push(Candidate {
                file,
                metadata,
                _claim: InFlightClaim {
                    in_flight: &self.in_flight,
                    fingerprint,
                },
            });
        }

        candidates
    }

    async fn request_destinations(&self, candidates: &[Candidate<'_>]) -> Vec<Result<UploadDestination>> {
        let entry_id = self.session.entry_id();
        let requests = candidates.iter().map(|candidate| {
            request_destination_with_retry(
                self.backend.as_ref(),
                entry_id,
                &candidate.metadata,
                self.max_attempts,
                self.retry_delay,
            )
        });

        join_all(requests).await
    }
}

/// Request an upload destination with retry logic and exponential backoff
async fn request_destination_with_retry(
    backend: &dyn Backend,
    entry_id: EntryId,
    metadata: &FileMetadata,
    max_attempts: u32,
    retry_delay: Duration,
) -> Result<UploadDestination> {
    for attempt in 1..=max_attempts {
        match backend.request_upload_destination(entry_id, metadata).await {
            Ok(destination) => {
                if attempt > 1 {
                    info!(
                        "Obtained upload destination for {} on attempt {}",
                        metadata.name, attempt
                    );
                }
                return Ok(destination);
            }
            Err(e) => {
                if is_transient_error(&e) && attempt < max_attempts {
                    let delay = backoff_delay(retry_delay, attempt);
                    warn!(
                        "Transient error requesting destination for {} (attempt {}/{}): {}. Retrying in {:?}...",
                        metadata.name, attempt, max_attempts, e, delay
                    );
                    sleep(delay).await;
                } else {
                    return Err(e);
                }
            }
        }
    }

    Err(BackendError::Network(format!(
        "No upload destination for {} after {} attempts",
        metadata.name, max_attempts
    ))
    .into())
}

/// Wait before the retry following `attempt`: doubles each time, capped
fn backoff_delay(retry_delay: Duration, attempt: u32) -> Duration {
    let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
    retry_delay.saturating_mul(factor).min(MAX_RETRY_DELAY)
}
