//! Core types for Diarist
//!
//! Posts and images as the authoring state holds them, plus the small wire
//! types exchanged with the backend. Everything serializes in camelCase.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::marker::PhantomData;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct ImageMarker;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct EntryMarker;

/// Client-generated identifier, typed by what it identifies
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<Marker>(Uuid, #[serde(skip)] PhantomData<Marker>);

pub type PostId = Id<PostMarker>;
pub type ImageId = Id<ImageMarker>;
pub type EntryId = Id<EntryMarker>;

impl<Marker> Id<Marker> {
    /// Fresh random (v4) identifier
    #[must_use]
    pub fn new_v4() -> Self {
        Self::from_uuid(Uuid::new_v4())
    }

    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid, PhantomData)
    }

    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl<Marker> Display for Id<Marker> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<Marker> FromStr for Id<Marker> {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self::from_uuid)
    }
}

impl<Marker> From<Uuid> for Id<Marker> {
    fn from(value: Uuid) -> Self {
        Self::from_uuid(value)
    }
}

// ============================================================================
// Posts and images
// ============================================================================

/// Supported image MIME types for uploads
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ImageMimeType {
    #[serde(rename = "image/jpeg")]
    Jpeg,
    #[serde(rename = "image/png")]
    Png,
    #[serde(rename = "image/gif")]
    Gif,
    #[serde(rename = "image/webp")]
    WebP,
}

impl ImageMimeType {
    /// Parse MIME type from a MIME string (e.g., "image/jpeg")
    pub fn from_mime_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/gif" => Some(Self::Gif),
            "image/webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Detect MIME type from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Detect MIME type from the extension of a file name or path
    pub fn from_file_name(name: &str) -> Option<Self> {
        Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::WebP => "image/webp",
        }
    }
}

impl Display for ImageMimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Upload lifecycle of an image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ImageState {
    /// Transfer in progress or awaiting backend confirmation
    Uploading {
        name: String,
        size: u64,
        mimetype: ImageMimeType,
    },
    /// Backend confirmed the object is usable
    Loaded { url: String },
    /// Backend confirmed post-processing failed
    CompressionError { key: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub id: ImageId,
    pub key: Option<String>,
    pub order: usize,
    pub is_selected: bool,
    pub state: ImageState,
}

impl Image {
    pub fn is_uploading(&self) -> bool {
        matches!(self.state, ImageState::Uploading { .. })
    }
}

/// Geographic location of a post; every field is mandatory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub address: String,
    pub longitude: f64,
    pub latitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: PostId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub order: usize,
    #[serde(default)]
    pub is_selected: bool,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub location: Option<Location>,
}

impl Post {
    /// Empty, unselected post
    pub fn new(id: PostId, order: usize) -> Self {
        Self {
            id,
            title: String::new(),
            description: String::new(),
            order,
            is_selected: false,
            images: Vec::new(),
            location: None,
        }
    }

    pub fn has_images(&self) -> bool {
        !self.images.is_empty()
    }

    pub fn selected_image(&self) -> Option<&Image> {
        self.images.iter().find(|image| image.is_selected)
    }

    pub fn image(&self, id: ImageId) -> Option<&Image> {
        self.images.iter().find(|image| image.id == id)
    }
}

/// Fields of a post that `UpdatePost` may overwrite
///
/// `None` leaves a field untouched; `location: Some(None)` clears the location.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<Option<Location>>,
}

impl PostPatch {
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn location(mut self, location: Option<Location>) -> Self {
        self.location = Some(location);
        self
    }
}

/// An image whose upload destination is known and which enters the state as `Uploading`
#[derive(Debug, Clone, PartialEq)]
pub struct NewImage {
    pub id: ImageId,
    pub key: String,
    pub name: String,
    pub size: u64,
    pub mimetype: ImageMimeType,
}

/// Backend-confirmed fate of one uploading image
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageResult {
    Success { key: String, url: String },
    Failure { key: String },
}

impl ImageResult {
    /// Storage key the result refers to
    pub fn key(&self) -> &str {
        match self {
            ImageResult::Success { key, .. } | ImageResult::Failure { key } => key,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ImageResult::Success { .. })
    }
}

// ============================================================================
// Upload wire types
// ============================================================================

/// Metadata sent when asking for an upload destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub name: String,
    pub size: u64,
    pub mimetype: ImageMimeType,
}

/// Where and how to transfer one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadDestination {
    pub key: String,
    pub upload_url: String,
    #[serde(default)]
    pub upload_fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadOutcome {
    Success,
    Failure,
}

/// One entry of an upload-status poll response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadStatusReport {
    pub key: String,
    pub status: UploadOutcome,
    #[serde(default)]
    pub url: Option<String>,
}

impl UploadStatusReport {
    /// Convert into an image result; a success without a URL is not usable yet
    pub fn into_result(self) -> Option<ImageResult> {
        match (self.status, self.url) {
            (UploadOutcome::Success, Some(url)) => Some(ImageResult::Success { key: self.key, url }),
            (UploadOutcome::Success, None) => None,
            (UploadOutcome::Failure, _) => Some(ImageResult::Failure { key: self.key }),
        }
    }
}

/// A local file the user wants to attach
#[derive(Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    /// MIME type declared by the source of the file, if any
    pub declared_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for UploadFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadFile")
            .field("name", &self.name)
            .field("declared_type", &self.declared_type)
            .field("size", &self.bytes.len())
            .finish()
    }
}

impl UploadFile {
    pub fn new(name: impl Into<String>, declared_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            declared_type,
            bytes,
        }
    }

    /// Read a file from disk; the type is later inferred from its extension
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, None, bytes))
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Declared MIME type if supported, otherwise the one implied by the name
    pub fn mime_type(&self) -> Option<ImageMimeType> {
        match &self.declared_type {
            Some(declared) => ImageMimeType::from_mime_str(declared),
            None => ImageMimeType::from_file_name(&self.name),
        }
    }

    /// Metadata for the destination request, if the file is a supported image
    pub fn metadata(&self) -> Option<FileMetadata> {
        self.mime_type().map(|mimetype| FileMetadata {
            name: self.name.clone(),
            size: self.size(),
            mimetype,
        })
    }

    /// SHA-256 of the content (hex encoded)
    pub fn fingerprint(&self) -> String {
        format!("{:x}", Sha256::digest(&self.bytes))
    }
}
