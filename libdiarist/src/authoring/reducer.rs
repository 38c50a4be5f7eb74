//! Pure reducer function for authoring state transitions
//!
//! `(AuthoringState, Action) -> AuthoringState`
//!
//! The reducer has NO side effects: no network, no clock, no randomness.
//! Actions that reference posts or images that no longer exist are treated
//! as no-ops, so a stale action can never corrupt the rest of the state.

use std::collections::HashMap;

use super::actions::Action;
use super::state::AuthoringState;
use crate::types::{Image, ImageId, ImageResult, ImageState, NewImage, Post, PostId, PostPatch};

/// Apply one action and return the resulting state
///
/// Every transition ends with a normalization pass, so `order` stays dense,
/// exactly one post is selected, every post with images has exactly one
/// selected image, and the side index only references uploading images.
pub fn reduce(state: AuthoringState, action: Action) -> AuthoringState {
    let mut state = state;

    match action {
        // === Posts ===
        Action::StartNewPost { id } => start_new_post(&mut state, id),
        Action::StartEditing(id) => {
            if let Some(index) = state.posts.iter().position(|post| post.id == id) {
                select_post_at(&mut state, index);
            }
        }
        Action::UpdatePost(patch) => update_post(&mut state, patch),
        Action::SelectNextPost => {
            if let Some(index) = state.selected_post_index() {
                if index + 1 < state.posts.len() {
                    select_post_at(&mut state, index + 1);
                }
            }
        }
        Action::SelectPreviousPost => {
            if let Some(index) = state.selected_post_index() {
                if index > 0 {
                    select_post_at(&mut state, index - 1);
                }
            }
        }
        Action::ReorderPosts { active, over } => {
            let from = state.posts.iter().position(|post| post.id == active);
            let to = state.posts.iter().position(|post| post.id == over);
            if let (Some(from), Some(to)) = (from, to) {
                move_item(&mut state.posts, from, to);
            }
        }
        Action::DeleteCurrentPost { replacement_id } => delete_current_post(&mut state, replacement_id),
        Action::LoadPosts { posts, fallback_id } => {
            state = AuthoringState::from_posts(posts, fallback_id, state.max_images_per_post);
        }

        // === Images of the selected post ===
        Action::AddImages(images) => add_images(&mut state, images),
        Action::SelectImage(id) => {
            if let Some(post) = selected_post_mut(&mut state) {
                if post.image(id).is_some() {
                    for image in &mut post.images {
                        image.is_selected = image.id == id;
                    }
                }
            }
        }
        Action::SelectNextImage => step_image_selection(&mut state, Step::Next),
        Action::SelectPreviousImage => step_image_selection(&mut state, Step::Previous),
        Action::ReorderImages { active, over } => {
            if let Some(post) = selected_post_mut(&mut state) {
                let from = post.images.iter().position(|image| image.id == active);
                let to = post.images.iter().position(|image| image.id == over);
                if let (Some(from), Some(to)) = (from, to) {
                    move_item(&mut post.images, from, to);
                }
            }
        }
        Action::DeleteCurrentImage(id) => delete_current_image(&mut state, id),

        // === Reconciliation ===
        Action::UpdateImagesStatus(results) => update_images_status(&mut state, results),
    }

    state.normalize();
    state
}

fn selected_post_mut(state: &mut AuthoringState) -> Option<&mut Post> {
    state.posts.iter_mut().find(|post| post.is_selected)
}

/// Select the post at `index` and its first image
fn select_post_at(state: &mut AuthoringState, index: usize) {
    for (position, post) in state.posts.iter_mut().enumerate() {
        post.is_selected = position == index;
    }

    if let Some(post) = state.posts.get_mut(index) {
        for (position, image) in post.images.iter_mut().enumerate() {
            image.is_selected = position == 0;
        }
    }
}

/// Move the element at `from` to `to`, shifting the ones in between
fn move_item<T>(items: &mut Vec<T>, from: usize, to: usize) {
    if from == to {
        return;
    }
    let item = items.remove(from);
    items.insert(to, item);
}

fn start_new_post(state: &mut AuthoringState, id: PostId) {
    if state.post(id).is_some() {
        return;
    }

    // A post without images is a scratch slot: the new post takes its place
    state.posts.retain(Post::has_images);

    for post in &mut state.posts {
        post.is_selected = false;
    }

    let mut post = Post::new(id, state.posts.len());
    post.is_selected = true;
    state.posts.push(post);
}

fn update_post(state: &mut AuthoringState, patch: PostPatch) {
    let Some(post) = selected_post_mut(state) else {
        return;
    };

    if let Some(title) = patch.title {
        post.title = title;
    }
    if let Some(description) = patch.description {
        post.description = description;
    }
    if let Some(location) = patch.location {
        post.location = location;
    }
}

fn add_images(state: &mut AuthoringState, images: Vec<NewImage>) {
    let Some(index) = state.selected_post_index() else {
        return;
    };

    let available = state
        .max_images_per_post
        .saturating_sub(state.posts[index].images.len());
    let was_empty = state.posts[index].images.is_empty();

    let mut accepted = Vec::new();
    for new_image in images {
        if accepted.len() == available {
            break;
        }
        let known = state.image(new_image.id).is_some()
            || accepted.iter().any(|image: &Image| image.id == new_image.id);
        if known {
            continue;
        }
        // A key already mapped would strand the image it belongs to
        if state.image_key_to_image_id.contains_key(&new_image.key) {
            continue;
        }

        state
            .image_key_to_image_id
            .insert(new_image.key.clone(), new_image.id);
        accepted.push(Image {
            id: new_image.id,
            key: Some(new_image.key),
            order: 0,
            is_selected: false,
            state: ImageState::Uploading {
                name: new_image.name,
                size: new_image.size,
                mimetype: new_image.mimetype,
            },
        });
    }

    if was_empty {
        if let Some(first) = accepted.first_mut() {
            first.is_selected = true;
        }
    }

    state.posts[index].images.extend(accepted);
}

enum Step {
    Next,
    Previous,
}

fn step_image_selection(state: &mut AuthoringState, step: Step) {
    let Some(post) = selected_post_mut(state) else {
        return;
    };
    let Some(current) = post.images.iter().position(|image| image.is_selected) else {
        return;
    };

    let target = match step {
        Step::Next if current + 1 < post.images.len() => current + 1,
        Step::Previous if current > 0 => current - 1,
        _ => return,
    };

    for (position, image) in post.images.iter_mut().enumerate() {
        image.is_selected = position == target;
    }
}

fn delete_current_post(state: &mut AuthoringState, replacement_id: PostId) {
    let Some(index) = state.selected_post_index() else {
        return;
    };

    let removed = state.posts.remove(index);
    for image in &removed.images {
        state.forget_image(image.id);
    }

    if state.posts.is_empty() {
        let mut post = Post::new(replacement_id, 0);
        post.is_selected = true;
        state.posts.push(post);
    } else {
        select_post_at(state, 0);
    }
}

fn delete_current_image(state: &mut AuthoringState, id: ImageId) {
    let Some(post) = selected_post_mut(state) else {
        return;
    };
    let Some(position) = post.images.iter().position(|image| image.id == id) else {
        return;
    };

    let removed = post.images.remove(position);
    if removed.is_selected {
        if let Some(first) = post.images.first_mut() {
            first.is_selected = true;
        }
    }

    state.forget_image(id);
}

fn update_images_status(state: &mut AuthoringState, results: HashMap<ImageId, ImageResult>) {
    for (id, result) in results {
        let open = state.image_key_to_image_id.values().any(|mapped| *mapped == id);
        if !open {
            continue;
        }

        let image = state
            .posts
            .iter_mut()
            .flat_map(|post| post.images.iter_mut())
            .find(|image| image.id == id && image.is_uploading());
        let Some(image) = image else {
            continue;
        };

        match result {
            ImageResult::Success { key, url } => {
                image.key = Some(key);
                image.state = ImageState::Loaded { url };
            }
            ImageResult::Failure { key } => {
                image.key = Some(key.clone());
                image.state = ImageState::CompressionError { key };
            }
        }

        state.forget_image(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ImageMimeType, Location};

    fn new_image(key: &str) -> NewImage {
        NewImage {
            id: ImageId::new_v4(),
            key: key.to_string(),
            name: format!("{}.jpg", key),
            size: 1024,
            mimetype: ImageMimeType::Jpeg,
        }
    }

    fn state_with_images(keys: &[&str]) -> (AuthoringState, Vec<ImageId>) {
        let images: Vec<NewImage> = keys.iter().map(|key| new_image(key)).collect();
        let ids = images.iter().map(|image| image.id).collect();
        let state = reduce(AuthoringState::new(10), Action::AddImages(images));
        (state, ids)
    }

    fn selected_image_id(state: &AuthoringState) -> Option<ImageId> {
        state.selected_post()?.selected_image().map(|image| image.id)
    }

    #[test]
    fn test_reducer_is_pure() {
        let state = AuthoringState::new(10);
        let original = state.clone();

        let new_state = reduce(
            state.clone(),
            Action::UpdatePost(PostPatch::default().title("Lisbon")),
        );

        assert_eq!(state, original);
        assert_eq!(new_state.posts[0].title, "Lisbon");
    }

    #[test]
    fn test_start_new_post_replaces_empty_post() {
        let state = AuthoringState::new(10);
        let old_id = state.posts[0].id;

        let new_id = PostId::new_v4();
        let state = reduce(state, Action::StartNewPost { id: new_id });

        assert_eq!(state.posts.len(), 1);
        assert_eq!(state.posts[0].id, new_id);
        assert_ne!(state.posts[0].id, old_id);
        assert!(state.posts[0].is_selected);
        assert!(state.posts[0].images.is_empty());
    }

    #[test]
    fn test_start_new_post_keeps_posts_with_images() {
        let (state, _) = state_with_images(&["k1"]);
        let first = state.posts[0].id;

        let state = reduce(state, Action::start_new_post());

        assert_eq!(state.posts.len(), 2);
        assert_eq!(state.posts[0].id, first);
        assert!(!state.posts[0].is_selected);
        assert!(state.posts[1].is_selected);
        assert_eq!(state.posts[1].order, 1);
    }

    #[test]
    fn test_start_new_post_with_existing_id_is_noop() {
        let state = AuthoringState::new(10);
        let existing = state.posts[0].id;

        let next = reduce(state.clone(), Action::StartNewPost { id: existing });
        assert_eq!(next, state);
    }

    #[test]
    fn test_start_editing_selects_first_image() {
        let (state, ids) = state_with_images(&["a", "b"]);
        let first_post = state.posts[0].id;
        let state = reduce(state, Action::SelectImage(ids[1]));
        let state = reduce(state, Action::start_new_post());

        let state = reduce(state, Action::StartEditing(first_post));

        assert_eq!(state.selected_post().unwrap().id, first_post);
        assert_eq!(selected_image_id(&state), Some(ids[0]));
    }

    #[test]
    fn test_start_editing_unknown_post_is_noop() {
        let (state, _) = state_with_images(&["a"]);
        let next = reduce(state.clone(), Action::StartEditing(PostId::new_v4()));
        assert_eq!(next, state);
    }

    #[test]
    fn test_update_post_merges_fields() {
        let state = AuthoringState::new(10);
        let location = Location {
            address: "Praça do Comércio".to_string(),
            longitude: -9.1366,
            latitude: 38.7075,
        };

        let state = reduce(
            state,
            Action::UpdatePost(PostPatch::default().title("Day 1").location(Some(location.clone()))),
        );
        let state = reduce(
            state,
            Action::UpdatePost(PostPatch::default().description("Trams and tiles")),
        );

        let post = state.selected_post().unwrap();
        assert_eq!(post.title, "Day 1");
        assert_eq!(post.description, "Trams and tiles");
        assert_eq!(post.location, Some(location));

        let state = reduce(state, Action::UpdatePost(PostPatch::default().location(None)));
        assert_eq!(state.selected_post().unwrap().location, None);
        assert_eq!(state.selected_post().unwrap().title, "Day 1");
    }

    #[test]
    fn test_add_images_to_empty_post_selects_first() {
        let (state, ids) = state_with_images(&["k1", "k2"]);
        let post = state.selected_post().unwrap();

        assert_eq!(post.images.len(), 2);
        assert_eq!(post.images[0].order, 0);
        assert_eq!(post.images[1].order, 1);
        assert!(post.images.iter().all(Image::is_uploading));
        assert_eq!(selected_image_id(&state), Some(ids[0]));
        assert_eq!(state.image_id_for_key("k1"), Some(ids[0]));
        assert_eq!(state.image_id_for_key("k2"), Some(ids[1]));
    }

    #[test]
    fn test_add_images_keeps_existing_selection() {
        let (state, ids) = state_with_images(&["k1", "k2"]);
        let state = reduce(state, Action::SelectImage(ids[1]));

        let state = reduce(state, Action::AddImages(vec![new_image("k3")]));

        assert_eq!(state.selected_post().unwrap().images.len(), 3);
        assert_eq!(selected_image_id(&state), Some(ids[1]));
    }

    #[test]
    fn test_add_images_truncates_to_capacity() {
        let state = AuthoringState::new(3);
        let images: Vec<NewImage> = (0..5).map(|i| new_image(&format!("k{}", i))).collect();

        let state = reduce(state, Action::AddImages(images));

        let post = state.selected_post().unwrap();
        assert_eq!(post.images.len(), 3);
        assert_eq!(state.image_key_to_image_id.len(), 3);
        assert!(state.image_id_for_key("k3").is_none());
        assert!(state.image_id_for_key("k4").is_none());
    }

    #[test]
    fn test_add_images_to_full_post_is_noop() {
        let state = AuthoringState::new(1);
        let state = reduce(state, Action::AddImages(vec![new_image("k1")]));

        let next = reduce(state.clone(), Action::AddImages(vec![new_image("k2")]));
        assert_eq!(next, state);
    }

    #[test]
    fn test_add_images_skips_known_ids() {
        let (state, ids) = state_with_images(&["k1"]);
        let mut duplicate = new_image("k-dup");
        duplicate.id = ids[0];

        let state = reduce(state, Action::AddImages(vec![duplicate]));

        assert_eq!(state.selected_post().unwrap().images.len(), 1);
        assert!(state.image_id_for_key("k-dup").is_none());
    }

    #[test]
    fn test_add_images_skips_keys_already_tracked() {
        let (state, ids) = state_with_images(&["same-key"]);
        let collision = new_image("same-key");
        let collision_id = collision.id;

        let state = reduce(state, Action::AddImages(vec![collision]));

        assert!(state.image(collision_id).is_none());
        assert_eq!(state.image_id_for_key("same-key"), Some(ids[0]));
        assert!(state.check_invariants().is_empty());

        // Within one batch the first image keeps the key
        let first = new_image("k-batch");
        let second = new_image("k-batch");
        let (first_id, second_id) = (first.id, second.id);
        let state = reduce(state, Action::AddImages(vec![first, second]));

        assert_eq!(state.image_id_for_key("k-batch"), Some(first_id));
        assert!(state.image(second_id).is_none());

        let results = HashMap::from([(
            first_id,
            ImageResult::Success {
                key: "k-batch".to_string(),
                url: "u".to_string(),
            },
        )]);
        let state = reduce(state, Action::UpdateImagesStatus(results));
        assert!(state.image(ids[0]).unwrap().is_uploading());
        assert_eq!(state.pending_upload_keys(), vec!["same-key".to_string()]);
    }

    #[test]
    fn test_select_image_unknown_is_noop() {
        let (state, _) = state_with_images(&["a", "b"]);
        let next = reduce(state.clone(), Action::SelectImage(ImageId::new_v4()));
        assert_eq!(next, state);
    }

    #[test]
    fn test_select_next_and_previous_image_saturate() {
        let (state, ids) = state_with_images(&["a", "b", "c"]);

        let state = reduce(state, Action::SelectPreviousImage);
        assert_eq!(selected_image_id(&state), Some(ids[0]));

        let state = reduce(state, Action::SelectNextImage);
        let state = reduce(state, Action::SelectNextImage);
        assert_eq!(selected_image_id(&state), Some(ids[2]));

        let state = reduce(state, Action::SelectNextImage);
        assert_eq!(selected_image_id(&state), Some(ids[2]));

        let state = reduce(state, Action::SelectPreviousImage);
        assert_eq!(selected_image_id(&state), Some(ids[1]));
    }

    #[test]
    fn test_select_next_image_without_images_is_noop() {
        let state = AuthoringState::new(10);
        let next = reduce(state.clone(), Action::SelectNextImage);
        assert_eq!(next, state);
    }

    #[test]
    fn test_select_next_and_previous_post() {
        let (state, first_ids) = state_with_images(&["a", "b"]);
        let state = reduce(state, Action::SelectImage(first_ids[1]));
        let state = reduce(state, Action::start_new_post());
        let state = reduce(state, Action::AddImages(vec![new_image("c")]));

        let state = reduce(state, Action::SelectPreviousPost);
        assert_eq!(state.selected_post_index(), Some(0));
        assert_eq!(selected_image_id(&state), Some(first_ids[0]));

        let state = reduce(state, Action::SelectPreviousPost);
        assert_eq!(state.selected_post_index(), Some(0));

        let state = reduce(state, Action::SelectNextPost);
        let state = reduce(state, Action::SelectNextPost);
        assert_eq!(state.selected_post_index(), Some(1));
    }

    #[test]
    fn test_reorder_images() {
        let (state, ids) = state_with_images(&["a", "b", "c"]);

        let state = reduce(
            state,
            Action::ReorderImages {
                active: ids[0],
                over: ids[2],
            },
        );

        let order: Vec<ImageId> = state.selected_post().unwrap().images.iter().map(|i| i.id).collect();
        assert_eq!(order, vec![ids[1], ids[2], ids[0]]);
        assert_eq!(state.selected_post().unwrap().images[2].order, 2);
        // selection follows the image, not the position
        assert_eq!(selected_image_id(&state), Some(ids[0]));
    }

    #[test]
    fn test_reorder_same_post_is_noop() {
        let (state, _) = state_with_images(&["a"]);
        let id = state.posts[0].id;
        let next = reduce(state.clone(), Action::ReorderPosts { active: id, over: id });
        assert_eq!(next, state);
    }

    #[test]
    fn test_delete_only_post_creates_replacement() {
        let (state, _) = state_with_images(&["a", "b"]);
        let replacement_id = PostId::new_v4();

        let state = reduce(state, Action::DeleteCurrentPost { replacement_id });

        assert_eq!(state.posts.len(), 1);
        assert_eq!(state.posts[0].id, replacement_id);
        assert!(state.posts[0].is_selected);
        assert!(state.image_key_to_image_id.is_empty());
    }

    #[test]
    fn test_delete_post_selects_first_remaining() {
        let (state, first_ids) = state_with_images(&["a", "b"]);
        let state = reduce(state, Action::SelectImage(first_ids[1]));
        let state = reduce(state, Action::start_new_post());
        let state = reduce(state, Action::AddImages(vec![new_image("c")]));

        let state = reduce(state, Action::delete_current_post());

        assert_eq!(state.posts.len(), 1);
        assert_eq!(selected_image_id(&state), Some(first_ids[0]));
        assert!(state.image_id_for_key("c").is_none());
        assert!(state.image_id_for_key("a").is_some());
    }

    #[test]
    fn test_delete_unselected_image_keeps_selection() {
        let (state, ids) = state_with_images(&["a", "b", "c"]);

        let state = reduce(state, Action::DeleteCurrentImage(ids[2]));

        assert_eq!(selected_image_id(&state), Some(ids[0]));
        assert!(state.image_id_for_key("c").is_none());
    }

    #[test]
    fn test_delete_all_images_leaves_empty_post() {
        let (state, ids) = state_with_images(&["a"]);

        let state = reduce(state, Action::DeleteCurrentImage(ids[0]));

        assert_eq!(state.posts.len(), 1);
        assert!(state.posts[0].images.is_empty());
        assert!(state.image_key_to_image_id.is_empty());
    }

    #[test]
    fn test_update_images_status_failure() {
        let (state, ids) = state_with_images(&["k1"]);

        let results = HashMap::from([(ids[0], ImageResult::Failure { key: "k1".to_string() })]);
        let state = reduce(state, Action::UpdateImagesStatus(results));

        let image = state.image(ids[0]).unwrap();
        assert_eq!(
            image.state,
            ImageState::CompressionError {
                key: "k1".to_string()
            }
        );
        assert!(state.image_key_to_image_id.is_empty());
    }

    #[test]
    fn test_update_images_status_for_unknown_id_is_noop() {
        let (state, _) = state_with_images(&["k1"]);

        let results = HashMap::from([(
            ImageId::new_v4(),
            ImageResult::Success {
                key: "k1".to_string(),
                url: "u".to_string(),
            },
        )]);
        let next = reduce(state.clone(), Action::UpdateImagesStatus(results));

        assert_eq!(next, state);
    }

    #[test]
    fn test_update_images_status_applies_in_any_post() {
        let (state, ids) = state_with_images(&["k1"]);
        let state = reduce(state, Action::start_new_post());

        let results = HashMap::from([(
            ids[0],
            ImageResult::Success {
                key: "k1".to_string(),
                url: "https://cdn/k1".to_string(),
            },
        )]);
        let state = reduce(state, Action::UpdateImagesStatus(results));

        assert_eq!(
            state.image(ids[0]).unwrap().state,
            ImageState::Loaded {
                url: "https://cdn/k1".to_string()
            }
        );
        // selection is untouched by reconciliation
        assert_eq!(state.selected_post_index(), Some(1));
    }

    #[test]
    fn test_load_posts_replaces_state() {
        let (state, _) = state_with_images(&["k1"]);
        let mut incoming = Post::new(PostId::new_v4(), 0);
        incoming.title = "From backend".to_string();

        let state = reduce(state, Action::load_posts(vec![incoming.clone()]));

        assert_eq!(state.posts.len(), 1);
        assert_eq!(state.posts[0].id, incoming.id);
        assert_eq!(state.posts[0].title, "From backend");
        assert!(state.image_key_to_image_id.is_empty());
        assert_eq!(state.max_images_per_post, 10);
    }

    #[test]
    fn test_move_item() {
        let mut items = vec!['a', 'b', 'c', 'd'];
        move_item(&mut items, 3, 1);
        assert_eq!(items, vec!['a', 'd', 'b', 'c']);

        move_item(&mut items, 0, 3);
        assert_eq!(items, vec!['d', 'b', 'c', 'a']);
    }
}
