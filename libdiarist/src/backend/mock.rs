//! Mock backend implementation for testing
//!
//! This module provides a configurable in-memory backend that can simulate
//! destination failures, transfer failures, slow responses, poll outages and
//! per-key post-processing outcomes. It's designed for use in integration
//! tests to verify the upload and reconciliation flows without a server.
//!
//! `MockBackend` is `Clone` and every clone shares the same counters and
//! outcomes, so a test can hand one clone to the service and inspect another.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::sleep;

use super::Backend;
use crate::error::{BackendError, Result};
use crate::types::{
    EntryId, FileMetadata, ImageResult, Post, UploadDestination, UploadFile, UploadOutcome,
    UploadStatusReport,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Configuration for mock backend behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Backend name (e.g., "mock", "mock-slow")
    pub name: String,

    /// Delay before completing operations (simulates network latency)
    pub delay: Duration,

    /// File names whose destination request always fails
    pub failing_destinations: HashSet<String>,

    /// Error returned for a failing destination request
    pub destination_error: BackendError,

    /// Number of destination requests that fail with a network error before
    /// requests start succeeding again
    pub transient_destination_failures: Arc<Mutex<usize>>,

    /// File names whose transfer always fails
    pub failing_transfers: HashSet<String>,

    /// Whether a successful transfer immediately resolves the key as loaded
    pub auto_complete: bool,

    /// Whether polling currently fails
    pub poll_fails: Arc<Mutex<bool>>,

    /// Post-processing outcome per storage key, reported by polls
    pub outcomes: Arc<Mutex<HashMap<String, ImageResult>>>,

    /// Posts stored per entry
    pub stored_posts: Arc<Mutex<HashMap<EntryId, Vec<Post>>>>,

    /// Number of times request_upload_destination has been called
    pub destination_call_count: Arc<Mutex<usize>>,

    /// Number of times transfer_file has been called
    pub transfer_call_count: Arc<Mutex<usize>>,

    /// Keys requested by each poll (for verification)
    pub polled_keys: Arc<Mutex<Vec<Vec<String>>>>,

    /// Key counter so issued keys stay unique
    pub issued: Arc<Mutex<usize>>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            delay: Duration::from_millis(0),
            failing_destinations: HashSet::new(),
            destination_error: BackendError::Api {
                status: 422,
                message: "Mock destination refused".to_string(),
            },
            transient_destination_failures: Arc::new(Mutex::new(0)),
            failing_transfers: HashSet::new(),
            auto_complete: false,
            poll_fails: Arc::new(Mutex::new(false)),
            outcomes: Arc::new(Mutex::new(HashMap::new())),
            stored_posts: Arc::new(Mutex::new(HashMap::new())),
            destination_call_count: Arc::new(Mutex::new(0)),
            transfer_call_count: Arc::new(Mutex::new(0)),
            polled_keys: Arc::new(Mutex::new(Vec::new())),
            issued: Arc::new(Mutex::new(0)),
        }
    }
}

/// Mock backend for testing
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    config: MockConfig,
}

impl MockBackend {
    /// Create a new mock backend with the given configuration
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    /// Create a mock backend whose calls all succeed; keys stay pending until
    /// an outcome is set
    pub fn success() -> Self {
        Self::default()
    }

    /// Create a mock backend that resolves every transferred file as loaded
    pub fn auto_complete() -> Self {
        Self::new(MockConfig {
            auto_complete: true,
            ..Default::default()
        })
    }

    /// Create a mock backend with a delay on every call
    pub fn with_delay(delay: Duration) -> Self {
        Self::new(MockConfig {
            name: "mock-slow".to_string(),
            delay,
            ..Default::default()
        })
    }

    /// Create a mock backend refusing destinations for the named files
    pub fn failing_destinations(names: &[&str]) -> Self {
        Self::new(MockConfig {
            failing_destinations: names.iter().map(|name| name.to_string()).collect(),
            ..Default::default()
        })
    }

    /// Create a mock backend failing transfers for the named files
    pub fn failing_transfers(names: &[&str]) -> Self {
        Self::new(MockConfig {
            failing_transfers: names.iter().map(|name| name.to_string()).collect(),
            ..Default::default()
        })
    }

    pub fn config(&self) -> &MockConfig {
        &self.config
    }

    /// Fail the next `count` destination requests with a network error
    pub fn fail_next_destinations(&self, count: usize) {
        *lock(&self.config.transient_destination_failures) = count;
    }

    /// Make every following poll fail (or succeed again)
    pub fn set_poll_failure(&self, fails: bool) {
        *lock(&self.config.poll_fails) = fails;
    }

    /// Report `key` as processed and available at `url`
    pub fn complete(&self, key: &str, url: &str) {
        lock(&self.config.outcomes).insert(
            key.to_string(),
            ImageResult::Success {
                key: key.to_string(),
                url: url.to_string(),
            },
        );
    }

    /// Report `key` as failed post-processing
    pub fn fail(&self, key: &str) {
        lock(&self.config.outcomes).insert(
            key.to_string(),
            ImageResult::Failure {
                key: key.to_string(),
            },
        );
    }

    /// Seed the posts returned by `load_posts_for_editing`
    pub fn store_posts(&self, entry_id: EntryId, posts: Vec<Post>) {
        lock(&self.config.stored_posts).insert(entry_id, posts);
    }

    /// Posts saved for an entry, if any
    pub fn stored_posts(&self, entry_id: EntryId) -> Option<Vec<Post>> {
        lock(&self.config.stored_posts).get(&entry_id).cloned()
    }

    /// Get the number of times request_upload_destination was called
    pub fn destination_call_count(&self) -> usize {
        *lock(&self.config.destination_call_count)
    }

    /// Get the number of times transfer_file was called
    pub fn transfer_call_count(&self) -> usize {
        *lock(&self.config.transfer_call_count)
    }

    /// Get the number of polls made
    pub fn poll_call_count(&self) -> usize {
        lock(&self.config.polled_keys).len()
    }

    /// Get the keys requested by every poll so far
    pub fn polled_keys(&self) -> Vec<Vec<String>> {
        lock(&self.config.polled_keys).clone()
    }

    async fn simulate_latency(&self) {
        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn request_upload_destination(
        &self,
        entry_id: EntryId,
        metadata: &FileMetadata,
    ) -> Result<UploadDestination> {
        *lock(&self.config.destination_call_count) += 1;
        self.simulate_latency().await;

        {
            let mut remaining = lock(&self.config.transient_destination_failures);
            if *remaining > 0 {
                *remaining -= 1;
                return Err(BackendError::Network("Mock connection reset".to_string()).into());
            }
        }

        if self.config.failing_destinations.contains(&metadata.name) {
            return Err(self.config.destination_error.clone().into());
        }

        let sequence = {
            let mut issued = lock(&self.config.issued);
            *issued += 1;
            *issued
        };
        let key = format!("entries/{}/{}-{}", entry_id, sequence, metadata.name);

        Ok(UploadDestination {
            upload_url: format!("mock://storage/{}", key),
            upload_fields: [("key".to_string(), key.clone())].into_iter().collect(),
            key,
        })
    }

    async fn transfer_file(&self, destination: &UploadDestination, file: &UploadFile) -> Result<()> {
        *lock(&self.config.transfer_call_count) += 1;
        self.simulate_latency().await;

        if self.config.failing_transfers.contains(&file.name) {
            return Err(BackendError::Transfer(format!("Mock storage rejected {}", file.name)).into());
        }

        if self.config.auto_complete {
            self.complete(&destination.key, &destination.upload_url);
        }

        Ok(())
    }

    async fn poll_upload_status(
        &self,
        _entry_id: EntryId,
        keys: &[String],
    ) -> Result<Vec<UploadStatusReport>> {
        lock(&self.config.polled_keys).push(keys.to_vec());
        self.simulate_latency().await;

        if *lock(&self.config.poll_fails) {
            return Err(BackendError::Api {
                status: 503,
                message: "Mock status service unavailable".to_string(),
            }
            .into());
        }

        let outcomes = lock(&self.config.outcomes);
        let reports = keys
            .iter()
            .filter_map(|key| outcomes.get(key))
            .map(|outcome| match outcome {
                ImageResult::Success { key, url } => UploadStatusReport {
                    key: key.clone(),
                    status: UploadOutcome::Success,
                    url: Some(url.clone()),
                },
                ImageResult::Failure { key } => UploadStatusReport {
                    key: key.clone(),
                    status: UploadOutcome::Failure,
                    url: None,
                },
            })
            .collect();

        Ok(reports)
    }

    async fn load_posts_for_editing(&self, entry_id: EntryId) -> Result<Vec<Post>> {
        self.simulate_latency().await;
        Ok(self.stored_posts(entry_id).unwrap_or_default())
    }

    async fn save_posts(&self, entry_id: EntryId, posts: &[Post]) -> Result<()> {
        self.simulate_latency().await;
        self.store_posts(entry_id, posts.to_vec());
        Ok(())
    }

    fn name(&self) -> &str {
        &self.config.name
    }
}
