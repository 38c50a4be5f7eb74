//! Interaction adapters
//!
//! Maps raw pointer and keyboard gestures onto authoring actions. Every drag
//! reduces to `reorder(active, over)`; gestures that would not change anything
//! map to `None` so callers can skip the session entirely.

use serde::{Deserialize, Serialize};

use crate::authoring::Action;
use crate::types::{ImageId, PostId};

/// Something that can be dragged or clicked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum DragTarget {
    Post(PostId),
    Image(ImageId),
}

/// Arrow-key navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Previous image
    Left,
    /// Next image
    Right,
    /// Previous post
    Up,
    /// Next post
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "gesture", rename_all = "snake_case")]
pub enum Gesture {
    /// A drag finished; `over` is the element under the pointer, if any
    DragEnd {
        active: DragTarget,
        over: Option<DragTarget>,
    },
    ClickPost { id: PostId },
    ClickImage { id: ImageId },
    Navigate { direction: Direction },
}

impl Gesture {
    pub fn to_action(self) -> Option<Action> {
        to_action(self)
    }
}

pub fn to_action(gesture: Gesture) -> Option<Action> {
    match gesture {
        Gesture::DragEnd { active, over } => match (active, over?) {
            (DragTarget::Post(active), DragTarget::Post(over)) if active != over => {
                Some(Action::ReorderPosts { active, over })
            }
            (DragTarget::Image(active), DragTarget::Image(over)) if active != over => {
                Some(Action::ReorderImages { active, over })
            }
            // Dropped on itself, or a post dropped on an image (and vice versa)
            _ => None,
        },
        Gesture::ClickPost { id } => Some(Action::StartEditing(id)),
        Gesture::ClickImage { id } => Some(Action::SelectImage(id)),
        Gesture::Navigate { direction } => Some(match direction {
            Direction::Left => Action::SelectPreviousImage,
            Direction::Right => Action::SelectNextImage,
            Direction::Up => Action::SelectPreviousPost,
            Direction::Down => Action::SelectNextPost,
        }),
    }
}
