//! Backend abstraction and implementations
//!
//! The backend issues upload destinations, receives the file bytes, reports
//! post-processing outcomes and stores the posts of an entry. The authoring
//! core only talks to it through the [`Backend`] trait.
//!
//! # Examples
//!
//! ```no_run
//! use libdiarist::backend::{Backend, HttpBackend};
//! use libdiarist::config::BackendConfig;
//! use libdiarist::types::EntryId;
//!
//! # async fn example() -> libdiarist::error::Result<()> {
//! let config = BackendConfig {
//!     base_url: "https://diary.example.com/api".to_string(),
//!     api_key: None,
//!     timeout: "30s".to_string(),
//! };
//!
//! let backend = HttpBackend::new(&config)?;
//! let entry: EntryId = "67e55044-10b1-426f-9247-bb680e5fe0c8".parse().unwrap();
//!
//! let posts = backend.load_posts_for_editing(entry).await?;
//! println!("Entry has {} posts", posts.len());
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{EntryId, FileMetadata, Post, UploadDestination, UploadFile, UploadStatusReport};

pub mod http;

// Mock backend is available for all builds (not just tests) to support integration tests
pub mod mock;

pub use http::HttpBackend;
pub use mock::{MockBackend, MockConfig};

/// Backend trait for everything the authoring core needs from the server
///
/// Implementations must be shareable across tasks: the upload coordinator
/// and the reconciliation poller call into the same instance concurrently.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Ask for a storage key and a presigned destination for one file
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Network`/`RateLimit` for transient failures,
    /// `BackendError::Api` when the backend refuses the file.
    async fn request_upload_destination(
        &self,
        entry_id: EntryId,
        metadata: &FileMetadata,
    ) -> Result<UploadDestination>;

    /// Send the file bytes to the destination returned above
    async fn transfer_file(&self, destination: &UploadDestination, file: &UploadFile) -> Result<()>;

    /// Report the post-processing outcome of each key the backend knows about
    ///
    /// Keys still being processed are simply absent from the result.
    async fn poll_upload_status(
        &self,
        entry_id: EntryId,
        keys: &[String],
    ) -> Result<Vec<UploadStatusReport>>;

    /// Posts previously saved for an entry
    async fn load_posts_for_editing(&self, entry_id: EntryId) -> Result<Vec<Post>>;

    /// Replace the posts stored for an entry
    async fn save_posts(&self, entry_id: EntryId, posts: &[Post]) -> Result<()>;

    /// Backend name for logs (e.g., "http", "mock")
    fn name(&self) -> &str;
}
