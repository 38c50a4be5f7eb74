//! Authoring state
//!
//! The in-memory model of one entry's posts. It is only ever changed by
//! [`reduce`](super::reduce); everything else reads snapshots of it.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::config::DEFAULT_MAX_IMAGES_PER_POST;
use crate::types::{Image, ImageId, ImageState, Post, PostId};

/// Root authoring state
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthoringState {
    /// Posts in display order (`posts[i].order == i`)
    pub posts: Vec<Post>,

    /// Storage key of each still-uploading image, used to match poll results
    pub image_key_to_image_id: HashMap<String, ImageId>,

    /// Capacity enforced by `AddImages`
    #[serde(skip)]
    pub max_images_per_post: usize,
}

impl Default for AuthoringState {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IMAGES_PER_POST)
    }
}

impl AuthoringState {
    /// One empty, selected post and an empty side index
    pub fn new(max_images_per_post: usize) -> Self {
        Self::with_initial_post(PostId::new_v4(), max_images_per_post)
    }

    /// Same as [`new`](Self::new) with a caller-chosen id for the first post
    pub fn with_initial_post(id: PostId, max_images_per_post: usize) -> Self {
        let mut post = Post::new(id, 0);
        post.is_selected = true;

        Self {
            posts: vec![post],
            image_key_to_image_id: HashMap::new(),
            max_images_per_post,
        }
    }

    /// Build a state from a backend-provided post list
    ///
    /// Posts and images are sorted by their `order`, selection is repaired,
    /// duplicate image ids are dropped and the side index is rebuilt from the
    /// uploading images that carry a key. `fallback_id` names the empty post
    /// created when `posts` is empty.
    pub fn from_posts(posts: Vec<Post>, fallback_id: PostId, max_images_per_post: usize) -> Self {
        if posts.is_empty() {
            return Self::with_initial_post(fallback_id, max_images_per_post);
        }

        let mut posts = posts;
        posts.sort_by_key(|post| post.order);

        let mut seen = HashSet::new();
        for post in &mut posts {
            post.images.sort_by_key(|image| image.order);
            post.images.retain(|image| seen.insert(image.id));
        }

        // A key can only be reconciled for one image; later claimants fail
        let mut image_key_to_image_id = HashMap::new();
        for image in posts.iter_mut().flat_map(|post| post.images.iter_mut()) {
            if !image.is_uploading() {
                continue;
            }
            let Some(key) = image.key.clone() else {
                continue;
            };
            if image_key_to_image_id.contains_key(&key) {
                image.state = ImageState::CompressionError { key };
            } else {
                image_key_to_image_id.insert(key, image.id);
            }
        }

        let mut state = Self {
            posts,
            image_key_to_image_id,
            max_images_per_post,
        };
        state.normalize();
        state
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn selected_post_index(&self) -> Option<usize> {
        self.posts.iter().position(|post| post.is_selected)
    }

    pub fn selected_post(&self) -> Option<&Post> {
        self.posts.iter().find(|post| post.is_selected)
    }

    pub fn post(&self, id: PostId) -> Option<&Post> {
        self.posts.iter().find(|post| post.id == id)
    }

    /// Find an image in any post
    pub fn image(&self, id: ImageId) -> Option<&Image> {
        self.posts
            .iter()
            .flat_map(|post| post.images.iter())
            .find(|image| image.id == id)
    }

    /// Remaining image slots in the selected post
    pub fn available_slots(&self) -> usize {
        self.selected_post()
            .map(|post| self.max_images_per_post.saturating_sub(post.images.len()))
            .unwrap_or(0)
    }

    /// Storage keys the poller still has to ask about
    pub fn pending_upload_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.image_key_to_image_id.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Whether the poller still has a key to ask about
    ///
    /// An uploading image without a key can never be reconciled and does
    /// not count.
    pub fn has_pending_uploads(&self) -> bool {
        !self.image_key_to_image_id.is_empty()
    }

    /// Image id currently registered for a storage key
    pub fn image_id_for_key(&self, key: &str) -> Option<ImageId> {
        self.image_key_to_image_id.get(key).copied()
    }

    // ========================================================================
    // Invariants
    // ========================================================================

    /// Describe every violated invariant; empty when the state is healthy
    pub fn check_invariants(&self) -> Vec<String> {
        let mut violations = Vec::new();

        if self.posts.is_empty() {
            violations.push("state has no posts".to_string());
        }

        let selected_posts = self.posts.iter().filter(|p| p.is_selected).count();
        if selected_posts != 1 {
            violations.push(format!("{} posts selected, expected 1", selected_posts));
        }

        let empty_posts = self.posts.iter().filter(|p| !p.has_images()).count();
        if empty_posts > 1 {
            violations.push(format!("{} posts without images, expected at most 1", empty_posts));
        }

        let mut post_ids = HashSet::new();
        for (index, post) in self.posts.iter().enumerate() {
            if !post_ids.insert(post.id) {
                violations.push(format!("post {} appears twice", post.id));
            }
            if post.order != index {
                violations.push(format!(
                    "post {} has order {} at position {}",
                    post.id, post.order, index
                ));
            }

            let selected_images = post.images.iter().filter(|i| i.is_selected).count();
            if post.has_images() && selected_images != 1 {
                violations.push(format!(
                    "post {} has {} selected images, expected 1",
                    post.id, selected_images
                ));
            }

            let mut image_ids = HashSet::new();
            for (image_index, image) in post.images.iter().enumerate() {
                if !image_ids.insert(image.id) {
                    violations.push(format!("image {} appears twice in post {}", image.id, post.id));
                }
                if let (true, Some(key)) = (image.is_uploading(), &image.key) {
                    if self.image_id_for_key(key) != Some(image.id) {
                        violations.push(format!("uploading image {} is not tracked by key {}", image.id, key));
                    }
                }
                if image.order != image_index {
                    violations.push(format!(
                        "image {} has order {} at position {}",
                        image.id, image.order, image_index
                    ));
                }
            }
        }

        for (key, id) in &self.image_key_to_image_id {
            match self.image(*id) {
                Some(image) if image.is_uploading() => {}
                Some(_) => violations.push(format!("key {} maps to settled image {}", key, id)),
                None => violations.push(format!("key {} maps to missing image {}", key, id)),
            }
        }

        violations
    }

    /// Repair derived fields after a transition
    ///
    /// Collapses surplus image-less posts, renumbers `order`, makes exactly
    /// one post and one image per non-empty post selected, and drops side
    /// index entries that no longer point at an uploading image.
    pub(crate) fn normalize(&mut self) {
        self.collapse_empty_posts();

        let selected = self.selected_post_index().unwrap_or(0);
        for (index, post) in self.posts.iter_mut().enumerate() {
            post.order = index;
            post.is_selected = index == selected;
            normalize_images(&mut post.images);
        }

        let uploading: HashSet<ImageId> = self
            .posts
            .iter()
            .flat_map(|post| post.images.iter())
            .filter(|image| image.is_uploading())
            .map(|image| image.id)
            .collect();
        self.image_key_to_image_id
            .retain(|_, id| uploading.contains(id));
    }

    /// Keep at most one post without images: the selected one if it is
    /// empty, otherwise the last empty post
    fn collapse_empty_posts(&mut self) {
        let empty: Vec<usize> = self
            .posts
            .iter()
            .enumerate()
            .filter(|(_, post)| !post.has_images())
            .map(|(index, _)| index)
            .collect();

        if empty.len() <= 1 {
            return;
        }

        let keep = self
            .selected_post_index()
            .filter(|index| empty.contains(index))
            .or_else(|| empty.last().copied());

        let mut index = 0;
        self.posts.retain(|post| {
            let retain = post.has_images() || Some(index) == keep;
            index += 1;
            retain
        });
    }

    /// Remove every side-index entry pointing at `id`
    pub(crate) fn forget_image(&mut self, id: ImageId) {
        self.image_key_to_image_id.retain(|_, mapped| *mapped != id);
    }
}

fn normalize_images(images: &mut [Image]) {
    let selected = images.iter().position(|image| image.is_selected).unwrap_or(0);
    for (index, image) in images.iter_mut().enumerate() {
        image.order = index;
        image.is_selected = index == selected;
    }
}

/// Short label of an image state, for logs
pub fn state_label(state: &ImageState) -> &'static str {
    match state {
        ImageState::Uploading { .. } => "uploading",
        ImageState::Loaded { .. } => "loaded",
        ImageState::CompressionError { .. } => "compression_error",
    }
}
