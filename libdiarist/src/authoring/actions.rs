//! Actions for the authoring reducer
//!
//! Every change to the authoring state is described by one of these values
//! and applied by [`reduce`](super::reduce). Actions that introduce a new
//! post carry its id, so the reducer itself never generates randomness.

use std::collections::HashMap;

use crate::types::{ImageId, ImageResult, NewImage, Post, PostId, PostPatch};

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    // === Posts ===
    /// Open a fresh, empty post (replacing the current one if it has no images)
    StartNewPost { id: PostId },

    /// Open an existing post for editing
    StartEditing(PostId),

    /// Merge title/description/location into the selected post
    UpdatePost(PostPatch),

    /// Move post selection one position forward
    SelectNextPost,

    /// Move post selection one position back
    SelectPreviousPost,

    /// Move `active` to the position currently held by `over`
    ReorderPosts { active: PostId, over: PostId },

    /// Remove the selected post; `replacement_id` names the fresh post
    /// created when no other post remains
    DeleteCurrentPost { replacement_id: PostId },

    /// Replace every post with a backend-provided list
    LoadPosts { posts: Vec<Post>, fallback_id: PostId },

    // === Images of the selected post ===
    /// Append uploading images, up to the per-post capacity
    AddImages(Vec<NewImage>),

    SelectImage(ImageId),

    SelectNextImage,

    SelectPreviousImage,

    ReorderImages { active: ImageId, over: ImageId },

    DeleteCurrentImage(ImageId),

    // === Reconciliation ===
    /// Backend-confirmed outcomes for uploading images, keyed by image id
    UpdateImagesStatus(HashMap<ImageId, ImageResult>),
}

impl Action {
    pub fn start_new_post() -> Self {
        Action::StartNewPost {
            id: PostId::new_v4(),
        }
    }

    pub fn delete_current_post() -> Self {
        Action::DeleteCurrentPost {
            replacement_id: PostId::new_v4(),
        }
    }

    pub fn load_posts(posts: Vec<Post>) -> Self {
        Action::LoadPosts {
            posts,
            fallback_id: PostId::new_v4(),
        }
    }

    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Action::StartNewPost { .. } => "start_new_post",
            Action::StartEditing(_) => "start_editing",
            Action::UpdatePost(_) => "update_post",
            Action::SelectNextPost => "select_next_post",
            Action::SelectPreviousPost => "select_previous_post",
            Action::ReorderPosts { .. } => "reorder_posts",
            Action::DeleteCurrentPost { .. } => "delete_current_post",
            Action::LoadPosts { .. } => "load_posts",
            Action::AddImages(_) => "add_images",
            Action::SelectImage(_) => "select_image",
            Action::SelectNextImage => "select_next_image",
            Action::SelectPreviousImage => "select_previous_image",
            Action::ReorderImages { .. } => "reorder_images",
            Action::DeleteCurrentImage(_) => "delete_current_image",
            Action::UpdateImagesStatus(_) => "update_images_status",
        }
    }
}
