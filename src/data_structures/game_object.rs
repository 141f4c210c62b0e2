//! Named scene entities.
//!
//! A [`GameObject`] owns exactly one [`Transform`] and a [`ComponentTable`]. Objects live
//! in the arena of a [`Scene`](super::scene_graph::Scene) and are referred to by
//! [`ObjectId`], which never keeps an object alive.

use crate::components::{Capability, Component, ComponentTable, light::Light};

use super::transform::Transform;

slotmap::new_key_type! {
    /// Non-owning handle to a [`GameObject`] inside a scene arena.
    pub struct ObjectId;
}

pub struct GameObject {
    pub name: String,
    pub transform: Transform,
    pub(crate) components: ComponentTable,
}

impl GameObject {
    pub(crate) fn new(id: ObjectId, name: String) -> Self {
        Self {
            name,
            transform: Transform::new(id),
            components: ComponentTable::default(),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.transform.owner
    }

    pub fn component<T: Component + 'static>(&self) -> Option<&T> {
        self.components.get::<T>()
    }

    pub fn component_mut<T: Component + 'static>(&mut self) -> Option<&mut T> {
        self.components.get_mut::<T>()
    }

    pub fn has_component<T: Component + 'static>(&self) -> bool {
        self.has_capability(Capability::of::<T>())
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.components.contains(capability)
    }

    /// The component registered under the abstract `Light` capability, if any.
    pub fn light(&self) -> Option<&dyn Light> {
        self.components.light()
    }

    /// Attached components in attach order, each listed once.
    pub fn components(&self) -> impl Iterator<Item = &dyn Component> {
        self.components.iter()
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }
}

impl std::fmt::Debug for GameObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameObject")
            .field("name", &self.name)
            .field("transform", &self.transform)
            .field("components", &self.components)
            .finish()
    }
}
