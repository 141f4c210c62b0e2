use std::{any::Any, rc::Rc};

use crate::{
    components::{Component, FromOwner},
    data_structures::game_object::ObjectId,
};

/// Offers a debug UI window to the render backend every frame. The callback draws the
/// window's contents.
#[derive(Clone)]
pub struct ImguiRenderer {
    owner: ObjectId,
    pub window_name: String,
    pub render_callback: Rc<dyn Fn()>,
}

impl ImguiRenderer {
    pub fn new(owner: ObjectId, window_name: impl Into<String>, render_callback: impl Fn() + 'static) -> Self {
        Self {
            owner,
            window_name: window_name.into(),
            render_callback: Rc::new(render_callback),
        }
    }
}

impl FromOwner for ImguiRenderer {
    fn from_owner(owner: ObjectId) -> Self {
        Self::new(owner, "ImGui Window", || {})
    }
}

impl std::fmt::Debug for ImguiRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImguiRenderer")
            .field("owner", &self.owner)
            .field("window_name", &self.window_name)
            .finish_non_exhaustive()
    }
}

impl Component for ImguiRenderer {
    fn type_name(&self) -> &'static str {
        "ImguiRenderer"
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
