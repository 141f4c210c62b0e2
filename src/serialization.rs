//! Binary scene format.
//!
//! Everything is little-endian. Strings are an `i32` byte length followed by UTF-8.
//!
//! ```text
//! scene     = i32 object_count, object*
//! object    = string name, transform, i32 component_count, (string type_name, payload)*
//! transform = vec3 translation, vec3 scale, quat (x, y, z, w), i32 child_count, object*
//! ```
//!
//! Component payloads are written by [`Component::serialize`]. When reading, components
//! are constructed through a [`ComponentRegistry`] keyed by type name and then filled by
//! [`Component::deserialize`].

use std::collections::HashMap;

use cgmath::{Quaternion, Vector3};

use crate::{
    components::{
        Component, FromOwner,
        camera::Camera,
        light::{DirectionalLight, PointLight, SpotLight},
        model_renderer::ModelRenderer,
    },
    data_structures::{color::Color, game_object::ObjectId, scene_graph::Scene},
    error::SerializationError,
    resources::AssetCache,
};

#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buffer: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f32(&mut self, value: f32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_str(&mut self, value: &str) {
        self.write_i32(value.len() as i32);
        self.buffer.extend_from_slice(value.as_bytes());
    }

    pub fn write_vec3(&mut self, value: Vector3<f32>) {
        self.write_f32(value.x);
        self.write_f32(value.y);
        self.write_f32(value.z);
    }

    pub fn write_quat(&mut self, value: Quaternion<f32>) {
        self.write_f32(value.v.x);
        self.write_f32(value.v.y);
        self.write_f32(value.v.z);
        self.write_f32(value.s);
    }

    pub fn write_color(&mut self, value: Color) {
        for channel in value.to_array() {
            self.write_f32(channel);
        }
    }
}

#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], SerializationError> {
        if self.remaining() < needed {
            return Err(SerializationError::UnexpectedEof {
                needed,
                remaining: self.remaining(),
            });
        }
        let bytes = &self.data[self.position..self.position + needed];
        self.position += needed;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], SerializationError> {
        let mut array = [0u8; N];
        array.copy_from_slice(self.take(N)?);
        Ok(array)
    }

    pub fn read_i32(&mut self) -> Result<i32, SerializationError> {
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32, SerializationError> {
        Ok(f32::from_le_bytes(self.take_array()?))
    }

    /// An `i32` count or length prefix.
    pub fn read_len(&mut self) -> Result<usize, SerializationError> {
        let len = self.read_i32()?;
        usize::try_from(len).map_err(|_| SerializationError::NegativeLength(len))
    }

    pub fn read_string(&mut self) -> Result<String, SerializationError> {
        let len = self.read_len()?;
        Ok(String::from_utf8(self.take(len)?.to_vec())?)
    }

    pub fn read_vec3(&mut self) -> Result<Vector3<f32>, SerializationError> {
        Ok(Vector3::new(self.read_f32()?, self.read_f32()?, self.read_f32()?))
    }

    pub fn read_quat(&mut self) -> Result<Quaternion<f32>, SerializationError> {
        let (x, y, z, w) = (self.read_f32()?, self.read_f32()?, self.read_f32()?, self.read_f32()?);
        Ok(Quaternion::new(w, x, y, z))
    }

    pub fn read_color(&mut self) -> Result<Color, SerializationError> {
        Ok(Color::new(
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
        ))
    }
}

pub type ComponentFactory = Box<dyn Fn(ObjectId) -> Box<dyn Component>>;

/// Maps serialized type names to component constructors.
pub struct ComponentRegistry {
    factories: HashMap<String, ComponentFactory>,
}

impl ComponentRegistry {
    /// A registry without any entries.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// A registry knowing every serializable built-in component.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register::<Camera>("Camera");
        registry.register::<ModelRenderer>("ModelRenderer");
        registry.register::<DirectionalLight>("DirectionalLight");
        registry.register::<PointLight>("PointLight");
        registry.register::<SpotLight>("SpotLight");
        registry
    }

    /// Registers `T` under `type_name`, which must match what `T::type_name` returns.
    pub fn register<T: Component + FromOwner + 'static>(&mut self, type_name: &str) {
        self.register_with(type_name, |owner| Box::new(T::from_owner(owner)));
    }

    pub fn register_with(
        &mut self,
        type_name: &str,
        factory: impl Fn(ObjectId) -> Box<dyn Component> + 'static,
    ) {
        self.factories
            .insert(type_name.to_string(), Box::new(factory));
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    pub fn create(&self, type_name: &str, owner: ObjectId) -> Result<Box<dyn Component>, SerializationError> {
        self.factories
            .get(type_name)
            .map(|factory| factory(owner))
            .ok_or_else(|| SerializationError::UnknownComponent(type_name.to_string()))
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

/// Writes `id`, its children and its serializable components.
pub fn serialize_object(scene: &Scene, id: ObjectId, out: &mut ByteWriter) {
    let Some(object) = scene.get(id) else {
        return;
    };
    out.write_str(&object.name);

    let transform = &object.transform;
    out.write_vec3(transform.translation);
    out.write_vec3(transform.scale);
    out.write_quat(transform.rotation);
    let children: Vec<ObjectId> = transform
        .children()
        .iter()
        .copied()
        .filter(|&child| scene.contains(child))
        .collect();
    out.write_i32(children.len() as i32);
    for child in children {
        serialize_object(scene, child, out);
    }

    let components: Vec<&dyn Component> = object
        .components()
        .filter(|component| component.is_serializable())
        .collect();
    out.write_i32(components.len() as i32);
    for component in components {
        out.write_str(component.type_name());
        component.serialize(out);
    }
}

/**
 * Reads one object record into `scene` as a detached object and returns it.
 *
 * Components are created by the registry, filled from their payload and then attached,
 * which runs their `init`. If the record is malformed the partially read object is
 * destroyed.
 */
pub fn deserialize_object(
    scene: &mut Scene,
    input: &mut ByteReader<'_>,
    registry: &ComponentRegistry,
    assets: &mut AssetCache,
) -> Result<ObjectId, SerializationError> {
    let name = input.read_string()?;
    let id = scene.create(name);
    match read_object_body(scene, id, input, registry, assets) {
        Ok(()) => Ok(id),
        Err(e) => {
            scene.destroy(id);
            Err(e)
        }
    }
}

fn read_object_body(
    scene: &mut Scene,
    id: ObjectId,
    input: &mut ByteReader<'_>,
    registry: &ComponentRegistry,
    assets: &mut AssetCache,
) -> Result<(), SerializationError> {
    let translation = input.read_vec3()?;
    let scale = input.read_vec3()?;
    let rotation = input.read_quat()?;
    if let Some(object) = scene.get_mut(id) {
        object.transform.translation = translation;
        object.transform.scale = scale;
        object.transform.rotation = rotation;
    }

    let child_count = input.read_len()?;
    for _ in 0..child_count {
        let child = deserialize_object(scene, input, registry, assets)?;
        scene.add_child(id, child)?;
    }

    let component_count = input.read_len()?;
    for _ in 0..component_count {
        let type_name = input.read_string()?;
        let mut component = registry.create(&type_name, id)?;
        component.deserialize(input, assets)?;
        scene.insert_component(id, component)?;
    }
    Ok(())
}

impl Scene {
    /// Encodes every root object (with its subtree) in root order.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = ByteWriter::new();
        out.write_i32(self.objects().len() as i32);
        for &root in self.objects() {
            serialize_object(self, root, &mut out);
        }
        out.into_bytes()
    }

    pub fn deserialize(
        bytes: &[u8],
        registry: &ComponentRegistry,
        assets: &mut AssetCache,
    ) -> Result<Scene, SerializationError> {
        let mut scene = Scene::new();
        let mut input = ByteReader::new(bytes);
        let count = input.read_len()?;
        for _ in 0..count {
            let id = deserialize_object(&mut scene, &mut input, registry, assets)?;
            scene.add_object(id)?;
        }
        log::debug!("Deserialized scene with {} objects", scene.len());
        Ok(scene)
    }
}
