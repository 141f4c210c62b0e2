//! Perspective camera and a keyboard fly controller.

use std::any::Any;

use cgmath::{Deg, InnerSpace, Matrix3, Matrix4, Quaternion, Rotation, SquareMatrix, Vector3, Zero};
use winit::keyboard::KeyCode;

use crate::{
    components::{Component, ComponentContext, FromOwner},
    data_structures::{game_object::ObjectId, scene_graph::Scene},
    error::SerializationError,
    resources::AssetCache,
    serialization::{ByteReader, ByteWriter},
};

/// Maps OpenGL clip space depth (-1..1) onto wgpu's (0..1).
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/**
 * Renders the scene from its owner's point of view.
 *
 * The view matrix is refreshed every `on_update` from the owner's world transform. The
 * owner's world rotation is used as the view rotation as-is, so [`Camera::look_at`]
 * stores the rotation that turns the viewing direction onto -Z.
 */
#[derive(Debug, Clone)]
pub struct Camera {
    owner: ObjectId,
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub aspect_ratio: f32,
    pub near: f32,
    pub far: f32,
    view: Matrix4<f32>,
    projection: Matrix4<f32>,
}

impl FromOwner for Camera {
    fn from_owner(owner: ObjectId) -> Self {
        Self {
            owner,
            fov: 70.0,
            aspect_ratio: 16.0 / 9.0,
            near: 0.01,
            far: 1000.0,
            view: Matrix4::identity(),
            projection: Matrix4::identity(),
        }
    }
}

impl Camera {
    pub fn view_matrix(&self) -> Matrix4<f32> {
        self.view
    }

    pub fn projection_matrix(&self) -> Matrix4<f32> {
        self.projection
    }

    /// Recomputes the projection from `fov`, `aspect_ratio`, `near` and `far`.
    pub fn update_projection(&mut self) {
        self.projection = OPENGL_TO_WGPU_MATRIX
            * cgmath::perspective(Deg(self.fov), self.aspect_ratio, self.near, self.far);
    }

    /// The view matrix for the owner's current world transform.
    pub fn compute_view(&self, scene: &Scene) -> Matrix4<f32> {
        let rotation = scene.world_rotation(self.owner);
        let translation = scene.world_translation(self.owner);
        Matrix4::from(rotation) * Matrix4::from_translation(-translation)
    }

    pub fn update_view(&mut self, scene: &Scene) {
        self.view = self.compute_view(scene);
    }

    /// Turns the owner so that it faces `target` with +Y up.
    pub fn look_at(&self, scene: &mut Scene, target: Vector3<f32>) {
        let direction = target - scene.world_translation(self.owner);
        if direction.magnitude2() <= f32::EPSILON {
            return;
        }
        scene.set_world_rotation(self.owner, look_rotation(direction, Vector3::unit_y()));
    }
}

/// The rotation that maps `direction` onto -Z while keeping `up` in the YZ plane.
fn look_rotation(direction: Vector3<f32>, up: Vector3<f32>) -> Quaternion<f32> {
    let f = direction.normalize();
    let up = if f.cross(up).magnitude2() <= f32::EPSILON {
        Vector3::unit_z()
    } else {
        up
    };
    let s = f.cross(up).normalize();
    let u = s.cross(f);
    #[rustfmt::skip]
    let rows = Matrix3::new(
        s.x, u.x, -f.x,
        s.y, u.y, -f.y,
        s.z, u.z, -f.z,
    );
    Quaternion::from(rows)
}

impl Component for Camera {
    fn type_name(&self) -> &'static str {
        "Camera"
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

    fn init(&mut self) {
        self.update_projection();
    }

    fn on_update(&mut self, ctx: &mut ComponentContext<'_>, _delta: f32) -> anyhow::Result<()> {
        self.update_view(ctx.scene);
        Ok(())
    }

    fn copy_for(&self, owner: ObjectId) -> Box<dyn Component> {
        Box::new(Self {
            owner,
            ..self.clone()
        })
    }

    fn serialize(&self, out: &mut ByteWriter) {
        out.write_f32(self.fov);
        out.write_f32(self.aspect_ratio);
        out.write_f32(self.near);
        out.write_f32(self.far);
    }

    fn deserialize(&mut self, input: &mut ByteReader<'_>, _assets: &mut AssetCache) -> Result<(), SerializationError> {
        self.fov = input.read_f32()?;
        self.aspect_ratio = input.read_f32()?;
        self.near = input.read_f32()?;
        self.far = input.read_f32()?;
        self.init();
        Ok(())
    }
}

/// WASD + Space/Shift fly controls moving the owner in the horizontal plane of its view.
#[derive(Debug, Clone)]
pub struct CameraController {
    owner: ObjectId,
    /// Units per second.
    pub speed: f32,
}

impl FromOwner for CameraController {
    fn from_owner(owner: ObjectId) -> Self {
        Self { owner, speed: 5.0 }
    }
}

impl Component for CameraController {
    fn type_name(&self) -> &'static str {
        "CameraController"
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

    fn on_update(&mut self, ctx: &mut ComponentContext<'_>, delta: f32) -> anyhow::Result<()> {
        let axis = |negative: KeyCode, positive: KeyCode| {
            let mut value = 0.0;
            if ctx.input.is_key_held(negative) {
                value -= 1.0;
            }
            if ctx.input.is_key_held(positive) {
                value += 1.0;
            }
            value
        };
        let dx = axis(KeyCode::KeyA, KeyCode::KeyD);
        let dy = axis(KeyCode::ShiftLeft, KeyCode::Space);
        let dz = axis(KeyCode::KeyW, KeyCode::KeyS);
        if dx == 0.0 && dy == 0.0 && dz == 0.0 {
            return Ok(());
        }

        let rotation = ctx.scene.world_rotation(self.owner).conjugate();
        let mut right = rotation.rotate_vector(Vector3::unit_x());
        right.y = 0.0;
        let right = if right.magnitude2() > 0.0 {
            right.normalize()
        } else {
            Vector3::zero()
        };
        let forward = Vector3::unit_y().cross(right);

        let mut horizontal = forward * -dz + right * dx;
        if horizontal.magnitude2() > 0.0 {
            horizontal = horizontal.normalize();
        }
        let direction = horizontal + Vector3::new(0.0, dy, 0.0);
        if let Some(transform) = ctx.transform_mut() {
            transform.translation += direction * self.speed * delta;
        }
        Ok(())
    }

    fn copy_for(&self, owner: ObjectId) -> Box<dyn Component> {
        Box::new(Self {
            owner,
            speed: self.speed,
        })
    }

    fn is_serializable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use cgmath::Vector4;

    use super::*;

    #[test]
    fn look_rotation_faces_negative_z() {
        let direction = Vector3::new(1.0, 0.0, -1.0);
        let rotation = look_rotation(direction, Vector3::unit_y());
        let rotated = rotation.rotate_vector(direction.normalize());
        assert_relative_eq!(rotated, Vector3::new(0.0, 0.0, -1.0), epsilon = 1e-5);
    }

    #[test]
    fn projection_maps_near_plane_to_zero_depth() {
        let mut scene = Scene::new();
        let id = scene.spawn("camera");
        let camera = scene.add_component::<Camera>(id).unwrap();
        let clip = camera.projection_matrix() * Vector4::new(0.0, 0.0, -camera.near, 1.0);
        assert_relative_eq!(clip.z / clip.w, 0.0, epsilon = 1e-4);
    }
}
