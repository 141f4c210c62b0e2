use std::any::Any;

use cgmath::Vector2;

use crate::{
    components::{Component, FromOwner},
    data_structures::{game_object::ObjectId, sprite::Sprite},
};

/// Draws a sprite as a unit quad at its owner's world transform, scaled by `stretch`.
/// 9-slice sprites keep their borders unscaled and stretch only the middle row and column.
#[derive(Debug, Clone)]
pub struct SpriteRenderer {
    owner: ObjectId,
    pub sprite: Option<Sprite>,
    pub stretch: Vector2<f32>,
}

impl FromOwner for SpriteRenderer {
    fn from_owner(owner: ObjectId) -> Self {
        Self {
            owner,
            sprite: None,
            stretch: Vector2::new(1.0, 1.0),
        }
    }
}

impl Component for SpriteRenderer {
    fn type_name(&self) -> &'static str {
        "SpriteRenderer"
    }

    fn owner(&self) -> ObjectId {
        self.owner
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn copy_for(&self, owner: ObjectId) -> Box<dyn Component> {
        Box::new(Self {
            owner,
            ..self.clone()
        })
    }

    fn is_serializable(&self) -> bool {
        false
    }
}
