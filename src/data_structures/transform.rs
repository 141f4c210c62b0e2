//! Local transform data of a [`GameObject`](super::game_object::GameObject).
//!
//! A [`Transform`] holds the local translation/rotation/scale plus the links that make up
//! the hierarchy. The links are arena handles; all operations that touch more than one
//! object (reparenting, world-space queries) live on [`Scene`](super::scene_graph::Scene)
//! because they need access to the other objects.

use cgmath::{Matrix4, One, Quaternion, Vector3};

use super::game_object::ObjectId;

#[derive(Clone, Debug)]
pub struct Transform {
    pub scale: Vector3<f32>,
    pub translation: Vector3<f32>,
    pub rotation: Quaternion<f32>,
    pub(crate) owner: ObjectId,
    pub(crate) parent: Option<ObjectId>,
    pub(crate) children: Vec<ObjectId>,
}

impl Transform {
    pub(crate) fn new(owner: ObjectId) -> Self {
        Self {
            scale: Vector3::new(1.0, 1.0, 1.0),
            translation: Vector3::new(0.0, 0.0, 0.0),
            rotation: Quaternion::one(),
            owner,
            parent: None,
            children: Vec::new(),
        }
    }

    /// The object this transform belongs to.
    pub fn owner(&self) -> ObjectId {
        self.owner
    }

    pub fn parent(&self) -> Option<ObjectId> {
        self.parent
    }

    /// Children in attach order.
    pub fn children(&self) -> &[ObjectId] {
        &self.children
    }

    /// `T * R * S` of this transform alone.
    pub fn local_matrix(&self) -> Matrix4<f32> {
        Matrix4::from_translation(self.translation)
            * Matrix4::from(self.rotation)
            * Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
    }

    /// Copies translation, rotation and scale but none of the hierarchy links.
    pub fn copy_local_from(&mut self, other: &Transform) {
        self.scale = other.scale;
        self.translation = other.translation;
        self.rotation = other.rotation;
    }
}
