//! Scene graph and hierarchical scene organization.
//!
//! A [`Scene`] owns every [`GameObject`] in a slot-map arena and keeps an ordered list of
//! root objects. Hierarchy links are stored in each object's [`Transform`] as
//! [`ObjectId`]s, so all operations that span several objects live here:
//!
//! - building the tree (`spawn`, `add_child`, `remove_child`, `destroy`)
//! - world-space transform queries and setters
//! - attaching, retrieving and removing components
//! - cloning objects including their children and components
//! - the three-phase update cascade

use cgmath::{ElementWise, Matrix4, One, Quaternion, SquareMatrix, Vector3};
use slotmap::SlotMap;

use crate::{
    components::{Component, ComponentContext, FromOwner, SlotId, light::Light},
    error::SceneError,
    input::Input,
};

use super::game_object::{GameObject, ObjectId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Pre,
    On,
    Post,
}

#[derive(Debug, Default)]
pub struct Scene {
    objects: SlotMap<ObjectId, GameObject>,
    roots: Vec<ObjectId>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a detached object. It is neither updated nor rendered until it is added as
    /// a root or attached to a parent.
    pub fn create(&mut self, name: impl Into<String>) -> ObjectId {
        let name = name.into();
        self.objects
            .insert_with_key(|id| GameObject::new(id, name))
    }

    /// Creates an object and appends it to the root list.
    pub fn spawn(&mut self, name: impl Into<String>) -> ObjectId {
        let id = self.create(name);
        self.roots.push(id);
        id
    }

    /// Makes `id` a root object, detaching it from its parent first.
    pub fn add_object(&mut self, id: ObjectId) -> Result<(), SceneError> {
        if !self.objects.contains_key(id) {
            return Err(SceneError::MissingObject(id));
        }
        self.detach(id);
        self.roots.push(id);
        Ok(())
    }

    /// Root objects in insertion order.
    pub fn objects(&self) -> &[ObjectId] {
        &self.roots
    }

    /// Every attached object in preorder: each root followed by its descendants.
    pub fn all_objects(&self) -> Vec<ObjectId> {
        let mut out = Vec::with_capacity(self.objects.len());
        for &root in &self.roots {
            self.collect_preorder(root, &mut out);
        }
        out
    }

    fn collect_preorder(&self, id: ObjectId, out: &mut Vec<ObjectId>) {
        if let Some(object) = self.objects.get(id) {
            out.push(id);
            for &child in &object.transform.children {
                self.collect_preorder(child, out);
            }
        }
    }

    pub fn get(&self, id: ObjectId) -> Option<&GameObject> {
        self.objects.get(id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut GameObject> {
        self.objects.get_mut(id)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(id)
    }

    /// Number of objects in the arena, detached ones included.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// First attached object in preorder with the given name.
    pub fn find_by_name(&self, name: &str) -> Option<ObjectId> {
        self.all_objects()
            .into_iter()
            .find(|id| self.objects[*id].name == name)
    }

    /// `true` if `ancestor` appears on the parent chain of `id`.
    pub fn is_ancestor(&self, ancestor: ObjectId, id: ObjectId) -> bool {
        let mut current = self.objects.get(id).and_then(|o| o.transform.parent);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.objects.get(parent).and_then(|o| o.transform.parent);
        }
        false
    }

    fn name_of(&self, id: ObjectId) -> String {
        self.objects
            .get(id)
            .map(|o| o.name.clone())
            .unwrap_or_else(|| format!("{id:?}"))
    }

    /// Removes `id` from its parent's child list or from the root list.
    fn detach(&mut self, id: ObjectId) {
        let parent = self.objects.get_mut(id).and_then(|o| o.transform.parent.take());
        match parent {
            Some(parent) => {
                if let Some(parent) = self.objects.get_mut(parent) {
                    parent.transform.children.retain(|c| *c != id);
                }
            }
            None => self.roots.retain(|r| *r != id),
        }
    }

    /// Attaches `child` to `parent`, evicting it from its previous parent or the root list.
    pub fn add_child(&mut self, parent: ObjectId, child: ObjectId) -> Result<(), SceneError> {
        for id in [parent, child] {
            if !self.objects.contains_key(id) {
                return Err(SceneError::MissingObject(id));
            }
        }
        if parent == child || self.is_ancestor(child, parent) {
            return Err(SceneError::CyclicParent {
                child: self.name_of(child),
                parent: self.name_of(parent),
            });
        }
        self.detach(child);
        self.objects[child].transform.parent = Some(parent);
        self.objects[parent].transform.children.push(child);
        Ok(())
    }

    /// Detaches `child` if it is currently a child of `parent`. The child stays in the
    /// arena as a free-standing object with live components: callers that are done with
    /// it must [`destroy`](Self::destroy) it, or use
    /// [`remove_child_and_destroy`](Self::remove_child_and_destroy).
    pub fn remove_child(&mut self, parent: ObjectId, child: ObjectId) -> bool {
        let is_child = self
            .objects
            .get(child)
            .is_some_and(|c| c.transform.parent == Some(parent));
        if is_child {
            self.detach(child);
        }
        is_child
    }

    /// Detaches `child` from `parent` and destroys its subtree.
    pub fn remove_child_and_destroy(&mut self, parent: ObjectId, child: ObjectId) -> bool {
        let removed = self.remove_child(parent, child);
        if removed {
            self.destroy(child);
        }
        removed
    }

    /// Removes `id` and its whole subtree from the scene, running `cleanup` on every
    /// component.
    pub fn destroy(&mut self, id: ObjectId) {
        if !self.objects.contains_key(id) {
            return;
        }
        self.detach(id);
        self.destroy_subtree(id);
    }

    fn destroy_subtree(&mut self, id: ObjectId) {
        if let Some(mut object) = self.objects.remove(id) {
            log::debug!("Destroying '{}'", object.name);
            object.components.clear();
            for child in object.transform.children.drain(..) {
                self.destroy_subtree(child);
            }
        }
    }

    // World transforms

    /// `world(parent) * T * R * S`, computed by walking the parent chain. Unknown ids
    /// yield identity.
    pub fn world_matrix(&self, id: ObjectId) -> Matrix4<f32> {
        match self.objects.get(id) {
            Some(object) => {
                let local = object.transform.local_matrix();
                match object.transform.parent {
                    Some(parent) => self.world_matrix(parent) * local,
                    None => local,
                }
            }
            None => Matrix4::identity(),
        }
    }

    fn parent_world_matrix(&self, id: ObjectId) -> Matrix4<f32> {
        self.objects
            .get(id)
            .and_then(|o| o.transform.parent)
            .map_or_else(Matrix4::identity, |parent| self.world_matrix(parent))
    }

    fn parent_world_rotation(&self, id: ObjectId) -> Quaternion<f32> {
        self.objects
            .get(id)
            .and_then(|o| o.transform.parent)
            .map_or_else(Quaternion::one, |parent| self.world_rotation(parent))
    }

    fn parent_world_scale(&self, id: ObjectId) -> Vector3<f32> {
        self.objects
            .get(id)
            .and_then(|o| o.transform.parent)
            .map_or(Vector3::new(1.0, 1.0, 1.0), |parent| self.world_scale(parent))
    }

    pub fn world_translation(&self, id: ObjectId) -> Vector3<f32> {
        self.world_matrix(id).w.truncate()
    }

    pub fn set_world_translation(&mut self, id: ObjectId, value: Vector3<f32>) {
        let Some(inverse) = self.parent_world_matrix(id).invert() else {
            log::warn!(
                "Cannot set the world translation of '{}': its parent transform is degenerate",
                self.name_of(id)
            );
            return;
        };
        if let Some(object) = self.objects.get_mut(id) {
            object.transform.translation = (inverse * value.extend(1.0)).truncate();
        }
    }

    pub fn world_rotation(&self, id: ObjectId) -> Quaternion<f32> {
        match self.objects.get(id) {
            Some(object) => self.parent_world_rotation(id) * object.transform.rotation,
            None => Quaternion::one(),
        }
    }

    pub fn set_world_rotation(&mut self, id: ObjectId, value: Quaternion<f32>) {
        let parent = self.parent_world_rotation(id);
        if let Some(object) = self.objects.get_mut(id) {
            object.transform.rotation = parent.conjugate() * value;
        }
    }

    pub fn world_scale(&self, id: ObjectId) -> Vector3<f32> {
        match self.objects.get(id) {
            Some(object) => self
                .parent_world_scale(id)
                .mul_element_wise(object.transform.scale),
            None => Vector3::new(1.0, 1.0, 1.0),
        }
    }

    pub fn set_world_scale(&mut self, id: ObjectId, value: Vector3<f32>) {
        let parent = self.parent_world_scale(id);
        if let Some(object) = self.objects.get_mut(id) {
            object.transform.scale = value.div_element_wise(parent);
        }
    }

    // Components

    /// Builds a `T` for `id`, runs its `init` and registers it.
    pub fn add_component<T>(&mut self, id: ObjectId) -> Result<&mut T, SceneError>
    where
        T: Component + FromOwner + 'static,
    {
        self.add_component_with(id, T::from_owner)
    }

    /// Like [`add_component`](Self::add_component) with a custom constructor, so the
    /// component can be configured before `init` runs.
    pub fn add_component_with<T, F>(&mut self, id: ObjectId, constructor: F) -> Result<&mut T, SceneError>
    where
        T: Component + 'static,
        F: FnOnce(ObjectId) -> T,
    {
        let slot = self.insert_component(id, Box::new(constructor(id)))?;
        self.objects[id]
            .components
            .slot_mut(slot)
            .and_then(|component| component.as_any_mut().downcast_mut::<T>())
            .ok_or(SceneError::MissingObject(id))
    }

    /// Registers an already constructed component. Duplicate capabilities are rejected
    /// before `init` runs.
    pub fn insert_component(
        &mut self,
        id: ObjectId,
        mut component: Box<dyn Component>,
    ) -> Result<SlotId, SceneError> {
        let object = self
            .objects
            .get_mut(id)
            .ok_or(SceneError::MissingObject(id))?;
        if let Some(occupied) = object.components.occupied(&component.capabilities()) {
            return Err(SceneError::DuplicateComponent {
                component: component.type_name(),
                occupied: occupied.name(),
                object: object.name.clone(),
            });
        }
        component.init();
        Ok(object.components.insert(component))
    }

    pub fn component<T: Component + 'static>(&self, id: ObjectId) -> Option<&T> {
        self.objects.get(id)?.component::<T>()
    }

    pub fn component_mut<T: Component + 'static>(&mut self, id: ObjectId) -> Option<&mut T> {
        self.objects.get_mut(id)?.component_mut::<T>()
    }

    pub fn has_component<T: Component + 'static>(&self, id: ObjectId) -> bool {
        self.objects.get(id).is_some_and(|o| o.has_component::<T>())
    }

    pub fn light(&self, id: ObjectId) -> Option<&dyn Light> {
        self.objects.get(id)?.light()
    }

    /// Unregisters the `T` of `id` under all its capabilities and runs its `cleanup`.
    pub fn remove_component<T: Component + 'static>(&mut self, id: ObjectId) -> bool {
        let removed = self
            .objects
            .get_mut(id)
            .and_then(|object| object.components.remove::<T>());
        match removed {
            Some(mut component) => {
                component.cleanup();
                true
            }
            None => false,
        }
    }

    // Cloning

    /// Creates a detached deep copy of `id` named `"{name} (clone)"`: local transform,
    /// a copy of every component and a clone of every child.
    ///
    /// Fails with [`SceneError::ComponentInUse`] while a component of the subtree is
    /// running one of its own hooks, since it could not be copied.
    pub fn clone_object(&mut self, id: ObjectId) -> Result<ObjectId, SceneError> {
        if !self.objects.contains_key(id) {
            return Err(SceneError::MissingObject(id));
        }
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            let object = &self.objects[next];
            if object.components.has_checked_out() {
                return Err(SceneError::ComponentInUse(object.name.clone()));
            }
            pending.extend(object.transform.children.iter().copied());
        }
        self.clone_subtree(id)
    }

    fn clone_subtree(&mut self, id: ObjectId) -> Result<ObjectId, SceneError> {
        let source = self.objects.get(id).ok_or(SceneError::MissingObject(id))?;
        let name = format!("{} (clone)", source.name);
        let transform = source.transform.clone();
        let clone = self.create(name);
        self.objects[clone].transform.copy_local_from(&transform);

        let copies: Vec<Box<dyn Component>> = self.objects[id]
            .components
            .iter()
            .map(|component| component.copy_for(clone))
            .collect();
        for copy in copies {
            self.insert_component(clone, copy)?;
        }

        for child in transform.children {
            let child_clone = self.clone_subtree(child)?;
            self.add_child(clone, child_clone)?;
        }
        Ok(clone)
    }

    // Update cascade

    /// Runs `pre_update` over the whole tree, then `on_update`, then `post_update`.
    pub fn update(&mut self, delta: f32, input: &mut Input) -> anyhow::Result<()> {
        for phase in [Phase::Pre, Phase::On, Phase::Post] {
            let roots = self.roots.clone();
            for root in roots {
                self.update_object(root, phase, delta, input)?;
            }
        }
        Ok(())
    }

    fn update_object(
        &mut self,
        id: ObjectId,
        phase: Phase,
        delta: f32,
        input: &mut Input,
    ) -> anyhow::Result<()> {
        let Some(object) = self.objects.get(id) else {
            return Ok(());
        };
        let slots = object.components.slot_ids();
        for slot in slots {
            let Some(mut component) = self
                .objects
                .get_mut(id)
                .and_then(|object| object.components.take(slot))
            else {
                continue;
            };
            let result = {
                let mut ctx = ComponentContext::new(self, input, id);
                match phase {
                    Phase::Pre => component.pre_update(&mut ctx, delta),
                    Phase::On => component.on_update(&mut ctx, delta),
                    Phase::Post => component.post_update(&mut ctx, delta),
                }
            };
            self.check_in(id, slot, component);
            result?;
        }
        let children = match self.objects.get(id) {
            Some(object) => object.transform.children.clone(),
            None => return Ok(()),
        };
        for child in children {
            self.update_object(child, phase, delta, input)?;
        }
        Ok(())
    }

    /// Returns a component to its slot after a hook. If the object or slot vanished while
    /// the hook ran, the component is cleaned up instead.
    fn check_in(&mut self, id: ObjectId, slot: SlotId, component: Box<dyn Component>) {
        let rejected = match self.objects.get_mut(id) {
            Some(object) => object.components.restore(slot, component).err(),
            None => Some(component),
        };
        if let Some(mut component) = rejected {
            component.cleanup();
        }
    }
}
