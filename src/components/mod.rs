//! Behaviour components attached to game objects.
//!
//! A component is a boxed [`Component`] trait object stored in the [`ComponentTable`] of
//! its owning object. The table is keyed by [`Capability`]: every component occupies the
//! slot of its concrete type (the *primary* entry) and the slots of every abstract
//! capability it declares, e.g. [`light::Light`]. One component per capability.
//!
//! Built-in components:
//! - `animation_controller` drives skeletal animation playback
//! - `camera` contains the camera and the keyboard camera controller
//! - `imgui_renderer` hands a debug UI callback to the render backend
//! - `light` holds directional, point and spot lights
//! - `model_renderer` and `sprite_renderer` make an object visible

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    fmt::Debug,
    hash::{Hash, Hasher},
};

use crate::{
    data_structures::{game_object::GameObject, game_object::ObjectId, scene_graph::Scene, transform::Transform},
    error::SerializationError,
    input::{Input, InputEvent},
    resources::AssetCache,
    serialization::{ByteReader, ByteWriter},
};

pub mod animation_controller;
pub mod camera;
pub mod imgui_renderer;
pub mod light;
pub mod model_renderer;
pub mod sprite_renderer;

/// A component kind: either a concrete component type or an abstract one such as
/// `dyn Light`.
#[derive(Clone, Copy)]
pub struct Capability {
    id: TypeId,
    name: &'static str,
}

impl Capability {
    pub fn of<T: ?Sized + 'static>() -> Self {
        let full = std::any::type_name::<T>();
        Self {
            id: TypeId::of::<T>(),
            name: full.rsplit("::").next().unwrap_or(full),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for Capability {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Capability {}

impl Hash for Capability {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

/// Capability occupied by components that consume input events (see
/// [`ComponentContext::take_input_events`]).
pub struct InputHandling;

/**
 * A behaviour unit bound to one game object.
 *
 * The owner is stored as an [`ObjectId`] so a component never keeps its object alive.
 * Lifecycle: `init` runs once after construction and configuration, the three update
 * hooks run every tick (all `pre_update`s of the scene, then all `on_update`s, then all
 * `post_update`s) and `cleanup` runs when the component is removed or its object is
 * destroyed.
 */
pub trait Component {
    /// Stable identifier written by the serializer and looked up in the
    /// [`ComponentRegistry`](crate::serialization::ComponentRegistry).
    fn type_name(&self) -> &'static str;

    fn owner(&self) -> ObjectId;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Abstract capabilities this component satisfies besides its concrete type.
    fn abstract_capabilities(&self) -> Vec<Capability> {
        Vec::new()
    }

    fn concrete_capability(&self) -> Capability {
        Capability {
            id: self.as_any().type_id(),
            name: self.type_name(),
        }
    }

    /// The concrete capability followed by all abstract ones.
    fn capabilities(&self) -> Vec<Capability> {
        let mut capabilities = vec![self.concrete_capability()];
        capabilities.extend(self.abstract_capabilities());
        capabilities
    }

    fn init(&mut self) {}

    fn pre_update(&mut self, _ctx: &mut ComponentContext<'_>, _delta: f32) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_update(&mut self, _ctx: &mut ComponentContext<'_>, _delta: f32) -> anyhow::Result<()> {
        Ok(())
    }

    fn post_update(&mut self, _ctx: &mut ComponentContext<'_>, _delta: f32) -> anyhow::Result<()> {
        Ok(())
    }

    fn cleanup(&mut self) {}

    /// An independent copy of this component bound to `owner`.
    fn copy_for(&self, owner: ObjectId) -> Box<dyn Component>;

    fn is_serializable(&self) -> bool {
        true
    }

    fn serialize(&self, _out: &mut ByteWriter) {}

    fn deserialize(
        &mut self,
        _input: &mut ByteReader<'_>,
        _assets: &mut AssetCache,
    ) -> Result<(), SerializationError> {
        Ok(())
    }

    fn as_light(&self) -> Option<&dyn light::Light> {
        None
    }
}

/// Components that can be built from nothing but their owner handle.
pub trait FromOwner {
    fn from_owner(owner: ObjectId) -> Self;
}

pub type SlotId = u32;

struct Slot {
    id: SlotId,
    capability: Capability,
    // `None` while the component is checked out for one of its own hooks
    component: Option<Box<dyn Component>>,
}

/// Capability-keyed component storage of a single game object.
#[derive(Default)]
pub struct ComponentTable {
    slots: Vec<Slot>,
    kinds: HashMap<Capability, (SlotId, bool)>,
    next_slot: SlotId,
}

impl ComponentTable {
    /// The first of `capabilities` that is already taken.
    pub fn occupied(&self, capabilities: &[Capability]) -> Option<Capability> {
        capabilities
            .iter()
            .copied()
            .find(|capability| self.kinds.contains_key(capability))
    }

    /// Registers `component` under all its capabilities. Callers check
    /// [`occupied`](Self::occupied) first.
    pub(crate) fn insert(&mut self, component: Box<dyn Component>) -> SlotId {
        let id = self.next_slot;
        self.next_slot += 1;
        let concrete = component.concrete_capability();
        for capability in component.abstract_capabilities() {
            self.kinds.insert(capability, (id, false));
        }
        self.kinds.insert(concrete, (id, true));
        self.slots.push(Slot {
            id,
            capability: concrete,
            component: Some(component),
        });
        id
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.kinds.contains_key(&capability)
    }

    /// Whether `capability` is registered as the concrete type of its component.
    pub fn is_primary(&self, capability: Capability) -> Option<bool> {
        self.kinds.get(&capability).map(|(_, primary)| *primary)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn position(&self, slot: SlotId) -> Option<usize> {
        self.slots.iter().position(|s| s.id == slot)
    }

    pub fn slot(&self, slot: SlotId) -> Option<&dyn Component> {
        let index = self.position(slot)?;
        self.slots[index].component.as_deref()
    }

    pub fn slot_mut(&mut self, slot: SlotId) -> Option<&mut (dyn Component + 'static)> {
        let index = self.position(slot)?;
        self.slots[index].component.as_deref_mut()
    }

    pub fn get_dyn(&self, capability: Capability) -> Option<&dyn Component> {
        let (slot, _) = self.kinds.get(&capability)?;
        self.slot(*slot)
    }

    pub fn get<T: Component + 'static>(&self) -> Option<&T> {
        self.get_dyn(Capability::of::<T>())?
            .as_any()
            .downcast_ref::<T>()
    }

    pub fn get_mut<T: Component + 'static>(&mut self) -> Option<&mut T> {
        let (slot, _) = *self.kinds.get(&Capability::of::<T>())?;
        self.slot_mut(slot)?.as_any_mut().downcast_mut::<T>()
    }

    pub fn light(&self) -> Option<&dyn light::Light> {
        self.get_dyn(Capability::of::<dyn light::Light>())?
            .as_light()
    }

    /// Checked-in components in attach order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Component> {
        self.slots.iter().filter_map(|slot| slot.component.as_deref())
    }

    /// Whether one of the components is currently checked out for its own hook.
    pub fn has_checked_out(&self) -> bool {
        self.slots.iter().any(|slot| slot.component.is_none())
    }

    pub(crate) fn slot_ids(&self) -> Vec<SlotId> {
        self.slots.iter().map(|slot| slot.id).collect()
    }

    pub(crate) fn take(&mut self, slot: SlotId) -> Option<Box<dyn Component>> {
        let index = self.position(slot)?;
        self.slots[index].component.take()
    }

    /// Puts a checked-out component back. Hands it back if its slot was removed meanwhile.
    pub(crate) fn restore(
        &mut self,
        slot: SlotId,
        component: Box<dyn Component>,
    ) -> Result<(), Box<dyn Component>> {
        match self.position(slot) {
            Some(index) => {
                self.slots[index].component = Some(component);
                Ok(())
            }
            None => Err(component),
        }
    }

    /// Unregisters every capability of the component of type `T`.
    pub(crate) fn remove<T: Component + 'static>(&mut self) -> Option<Box<dyn Component>> {
        let (slot, _) = *self.kinds.get(&Capability::of::<T>())?;
        self.remove_slot(slot)
    }

    pub(crate) fn remove_slot(&mut self, slot: SlotId) -> Option<Box<dyn Component>> {
        let index = self.position(slot)?;
        self.kinds.retain(|_, (id, _)| *id != slot);
        self.slots.remove(index).component
    }

    /// Removes everything, running `cleanup` on each checked-in component.
    pub(crate) fn clear(&mut self) {
        self.kinds.clear();
        for slot in self.slots.drain(..) {
            if let Some(mut component) = slot.component {
                component.cleanup();
            }
        }
    }
}

impl Debug for ComponentTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.slots.iter().map(|slot| slot.capability))
            .finish()
    }
}

/// What a component can reach while one of its update hooks runs.
///
/// The running component is checked out of its slot for the duration of the hook, so it
/// is not visible through [`component`](Self::component); its siblings are.
pub struct ComponentContext<'a> {
    pub scene: &'a mut Scene,
    pub input: &'a mut Input,
    owner: ObjectId,
}

impl<'a> ComponentContext<'a> {
    pub fn new(scene: &'a mut Scene, input: &'a mut Input, owner: ObjectId) -> Self {
        Self {
            scene,
            input,
            owner,
        }
    }

    pub fn owner(&self) -> ObjectId {
        self.owner
    }

    pub fn object(&self) -> Option<&GameObject> {
        self.scene.get(self.owner)
    }

    pub fn object_mut(&mut self) -> Option<&mut GameObject> {
        self.scene.get_mut(self.owner)
    }

    pub fn transform_mut(&mut self) -> Option<&mut Transform> {
        self.object_mut().map(|object| &mut object.transform)
    }

    pub fn component<T: Component + 'static>(&self) -> Option<&T> {
        self.scene.component::<T>(self.owner)
    }

    pub fn component_mut<T: Component + 'static>(&mut self) -> Option<&mut T> {
        self.scene.component_mut::<T>(self.owner)
    }

    pub fn mark_active_input_handler(&mut self) {
        self.input.set_active_handler(Some(self.owner));
    }

    pub fn is_active_input_handler(&self) -> bool {
        self.input.active_handler() == Some(self.owner)
    }

    /// Drains the queued input events if the owner is the active input handler.
    pub fn take_input_events(&mut self) -> Vec<InputEvent> {
        if self.is_active_input_handler() {
            self.input.take_events()
        } else {
            Vec::new()
        }
    }
}
