//! Light sources.
//!
//! All lights share the abstract [`Light`] capability, so an object holds at most one
//! light of any kind. Position and direction come from the owner's world transform.

use std::any::Any;

use crate::{
    components::{Capability, Component, FromOwner},
    data_structures::{color::Color, game_object::ObjectId},
    error::SerializationError,
    resources::AssetCache,
    serialization::{ByteReader, ByteWriter},
};

pub trait Light {
    fn color(&self) -> Color;
    fn intensity(&self) -> f32;
}

/// Light arriving from infinitely far away along the owner's local +Z axis.
#[derive(Debug, Clone)]
pub struct DirectionalLight {
    owner: ObjectId,
    pub color: Color,
    pub intensity: f32,
}

impl FromOwner for DirectionalLight {
    fn from_owner(owner: ObjectId) -> Self {
        Self {
            owner,
            color: Color::WHITE,
            intensity: 1.0,
        }
    }
}

impl Light for DirectionalLight {
    fn color(&self) -> Color {
        self.color
    }

    fn intensity(&self) -> f32 {
        self.intensity
    }
}

impl Component for DirectionalLight {
    fn type_name(&self) -> &'static str {
        "DirectionalLight"
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

    fn abstract_capabilities(&self) -> Vec<Capability> {
        vec![Capability::of::<dyn Light>()]
    }

    fn copy_for(&self, owner: ObjectId) -> Box<dyn Component> {
        Box::new(Self {
            owner,
            ..self.clone()
        })
    }

    fn serialize(&self, out: &mut ByteWriter) {
        out.write_color(self.color);
        out.write_f32(self.intensity);
    }

    fn deserialize(&mut self, input: &mut ByteReader<'_>, _assets: &mut AssetCache) -> Result<(), SerializationError> {
        self.color = input.read_color()?;
        self.intensity = input.read_f32()?;
        Ok(())
    }

    fn as_light(&self) -> Option<&dyn Light> {
        Some(self)
    }
}

/// Light radiating from the owner's world position up to `range`.
#[derive(Debug, Clone)]
pub struct PointLight {
    owner: ObjectId,
    pub color: Color,
    pub intensity: f32,
    pub range: f32,
}

impl FromOwner for PointLight {
    fn from_owner(owner: ObjectId) -> Self {
        Self {
            owner,
            color: Color::WHITE,
            intensity: 1.0,
            range: 10.0,
        }
    }
}

impl Light for PointLight {
    fn color(&self) -> Color {
        self.color
    }

    fn intensity(&self) -> f32 {
        self.intensity
    }
}

impl Component for PointLight {
    fn type_name(&self) -> &'static str {
        "PointLight"
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

    fn abstract_capabilities(&self) -> Vec<Capability> {
        vec![Capability::of::<dyn Light>()]
    }

    fn copy_for(&self, owner: ObjectId) -> Box<dyn Component> {
        Box::new(Self {
            owner,
            ..self.clone()
        })
    }

    fn serialize(&self, out: &mut ByteWriter) {
        out.write_color(self.color);
        out.write_f32(self.intensity);
        out.write_f32(self.range);
    }

    fn deserialize(&mut self, input: &mut ByteReader<'_>, _assets: &mut AssetCache) -> Result<(), SerializationError> {
        self.color = input.read_color()?;
        self.intensity = input.read_f32()?;
        self.range = input.read_f32()?;
        Ok(())
    }

    fn as_light(&self) -> Option<&dyn Light> {
        Some(self)
    }
}

/// A cone of light along the owner's local +Z axis. `angle` is the cone's half angle in
/// degrees.
#[derive(Debug, Clone)]
pub struct SpotLight {
    owner: ObjectId,
    pub color: Color,
    pub intensity: f32,
    pub range: f32,
    pub angle: f32,
}

impl FromOwner for SpotLight {
    fn from_owner(owner: ObjectId) -> Self {
        Self {
            owner,
            color: Color::WHITE,
            intensity: 1.0,
            range: 10.0,
            angle: 45.0,
        }
    }
}

impl Light for SpotLight {
    fn color(&self) -> Color {
        self.color
    }

    fn intensity(&self) -> f32 {
        self.intensity
    }
}

impl Component for SpotLight {
    fn type_name(&self) -> &'static str {
        "SpotLight"
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

    fn abstract_capabilities(&self) -> Vec<Capability> {
        vec![Capability::of::<dyn Light>()]
    }

    fn copy_for(&self, owner: ObjectId) -> Box<dyn Component> {
        Box::new(Self {
            owner,
            ..self.clone()
        })
    }

    fn serialize(&self, out: &mut ByteWriter) {
        out.write_color(self.color);
        out.write_f32(self.intensity);
        out.write_f32(self.range);
        out.write_f32(self.angle);
    }

    fn deserialize(&mut self, input: &mut ByteReader<'_>, _assets: &mut AssetCache) -> Result<(), SerializationError> {
        self.color = input.read_color()?;
        self.intensity = input.read_f32()?;
        self.range = input.read_f32()?;
        self.angle = input.read_f32()?;
        Ok(())
    }

    fn as_light(&self) -> Option<&dyn Light> {
        Some(self)
    }
}
