//! The seam between render pipelines and the GPU.
//!
//! Pipelines walk the scene and describe a frame as a sequence of calls on a
//! [`RenderBackend`]: bind a shader, set the camera, lights and material, then submit
//! instanced draws. The wgpu implementation lives in [`crate::context`];
//! [`RecordingBackend`] keeps the calls in memory so pipelines can be tested without a GPU.
//!
//! # Key types
//!
//! - [`ShaderKind`] names the built-in shader programs
//! - [`BatchKey`] identifies the draws that can share one instanced submission
//! - [`CameraUniform`], [`LightSet`] and friends are the `Pod` data sent to the shaders
//! - [`SpriteInstance`] and [`LineVertex`] are the per-instance/per-vertex sprite and
//!   line layouts

use std::sync::Arc;

use cgmath::{Matrix4, Vector2, Vector3};

pub use crate::data_structures::instance::InstanceRaw;
use crate::{
    data_structures::{
        color::Color,
        model::{MAX_BONES, Material, MaterialId, Mesh, MeshId, Vertex},
        sprite::AtlasId,
    },
    error::ConfigError,
    resources::texture::ImageData,
};

pub const MAX_DIRECTIONAL_LIGHTS: usize = 4;
pub const MAX_POINT_LIGHTS: usize = 16;
pub const MAX_SPOT_LIGHTS: usize = 8;

/// Column-major matrix as uploaded to the GPU.
pub type RawMatrix = [[f32; 4]; 4];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ShaderKind {
    /// Textured, lit with the scene's lights.
    #[default]
    Lit,
    /// Textured, ignores lights.
    Unlit,
    Sprite,
    Line,
    Wireframe,
}

impl ShaderKind {
    pub fn name(self) -> &'static str {
        match self {
            ShaderKind::Lit => "lit",
            ShaderKind::Unlit => "unlit",
            ShaderKind::Sprite => "sprite",
            ShaderKind::Line => "line",
            ShaderKind::Wireframe => "wireframe",
        }
    }
}

/// Draw entries with equal keys are submitted as one instanced draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchKey {
    pub mesh: MeshId,
    pub material: MaterialId,
    pub shader: ShaderKind,
    pub skinned: bool,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    /// World position of the camera, `w` is always 1.
    pub view_position: [f32; 4],
    pub view: RawMatrix,
    pub projection: RawMatrix,
    pub view_proj: RawMatrix,
}

impl CameraUniform {
    pub fn new(view: Matrix4<f32>, projection: Matrix4<f32>, position: Vector3<f32>) -> Self {
        Self {
            view_position: position.extend(1.0).into(),
            view: view.into(),
            projection: projection.into(),
            view_proj: (projection * view).into(),
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DirectionalLightUniform {
    pub direction: [f32; 3],
    pub intensity: f32,
    pub color: [f32; 4],
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PointLightUniform {
    pub position: [f32; 3],
    pub intensity: f32,
    pub color: [f32; 4],
    pub range: f32,
    // Uniform structs are padded to 16 bytes
    pub _padding: [f32; 3],
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SpotLightUniform {
    pub position: [f32; 3],
    pub intensity: f32,
    pub direction: [f32; 3],
    pub range: f32,
    pub color: [f32; 4],
    /// Cone half angle in degrees.
    pub angle: f32,
    pub _padding: [f32; 3],
}

/// The lights of one frame, capped per kind. Lights past the cap are dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LightSet {
    pub directional: Vec<DirectionalLightUniform>,
    pub point: Vec<PointLightUniform>,
    pub spot: Vec<SpotLightUniform>,
}

impl LightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the light was dropped because the set is full.
    pub fn push_directional(&mut self, light: DirectionalLightUniform) -> bool {
        push_capped(&mut self.directional, light, MAX_DIRECTIONAL_LIGHTS)
    }

    pub fn push_point(&mut self, light: PointLightUniform) -> bool {
        push_capped(&mut self.point, light, MAX_POINT_LIGHTS)
    }

    pub fn push_spot(&mut self, light: SpotLightUniform) -> bool {
        push_capped(&mut self.spot, light, MAX_SPOT_LIGHTS)
    }

    pub fn is_empty(&self) -> bool {
        self.directional.is_empty() && self.point.is_empty() && self.spot.is_empty()
    }
}

fn push_capped<T>(lights: &mut Vec<T>, light: T, cap: usize) -> bool {
    if lights.len() >= cap {
        return false;
    }
    lights.push(light);
    true
}

/// One quad of a sprite batch: its model matrix and the atlas rectangle it samples.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SpriteInstance {
    pub model: RawMatrix,
    pub uv_offset: [f32; 2],
    pub uv_size: [f32; 2],
}

impl SpriteInstance {
    pub fn new(model: Matrix4<f32>, uv_offset: Vector2<f32>, uv_size: Vector2<f32>) -> Self {
        Self {
            model: model.into(),
            uv_offset: uv_offset.into(),
            uv_size: uv_size.into(),
        }
    }
}

impl Vertex for SpriteInstance {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<SpriteInstance>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 5,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 4]>() as wgpu::BufferAddress,
                    shader_location: 6,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 8]>() as wgpu::BufferAddress,
                    shader_location: 7,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 12]>() as wgpu::BufferAddress,
                    shader_location: 8,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 16]>() as wgpu::BufferAddress,
                    shader_location: 9,
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 18]>() as wgpu::BufferAddress,
                    shader_location: 10,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LineVertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

impl LineVertex {
    pub fn new(position: Vector3<f32>, color: Color) -> Self {
        Self {
            position: position.into(),
            color: color.to_array(),
        }
    }
}

impl Vertex for LineVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<LineVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x4,
                },
            ],
        }
    }
}

/// Appends exactly [`MAX_BONES`] matrices for one instance: `bones` truncated, then
/// padded with identities.
pub fn pack_bones(bones: &[Matrix4<f32>], out: &mut Vec<RawMatrix>) {
    let identity: RawMatrix = <Matrix4<f32> as cgmath::SquareMatrix>::identity().into();
    out.extend(bones.iter().take(MAX_BONES).map(|&m| -> RawMatrix { m.into() }));
    out.extend(std::iter::repeat_n(identity, MAX_BONES.saturating_sub(bones.len())));
}

/**
 * Everything a render pipeline needs from the GPU.
 *
 * Calls arrive in frame order: `begin_frame`, any number of state changes and draws,
 * then `end_frame`. State set with `bind_shader`, `set_camera`, `set_lights`,
 * `set_material` and `bind_atlas` stays in effect for the following draws.
 *
 * Skinned draws pass [`MAX_BONES`] matrices per instance (see [`pack_bones`]).
 */
pub trait RenderBackend {
    fn begin_frame(&mut self, clear: Color) -> anyhow::Result<()>;

    /// Fails with [`ConfigError::ShaderCompilation`] if the program cannot be built.
    fn bind_shader(&mut self, shader: ShaderKind) -> Result<(), ConfigError>;

    fn set_camera(&mut self, camera: &CameraUniform);

    fn set_lights(&mut self, lights: &LightSet);

    fn set_material(&mut self, material: &Arc<Material>);

    fn draw_mesh_instanced(
        &mut self,
        mesh: &Arc<Mesh>,
        instances: &[InstanceRaw],
        bones: Option<&[RawMatrix]>,
    );

    /// Copies `image` into the atlas texture with its top-left corner at `offset`.
    fn upload_atlas_region(&mut self, atlas: AtlasId, offset: Vector2<i32>, image: &ImageData);

    fn bind_atlas(&mut self, atlas: AtlasId);

    /// Draws one unit quad per instance, sampling the bound atlas.
    fn draw_sprites(&mut self, sprites: &[SpriteInstance]);

    /// Draws `vertices` as a line list once per instance.
    fn draw_lines(&mut self, vertices: &[LineVertex], instances: &[InstanceRaw]);

    /// Draws the edges of `mesh` once per instance, each in its own color.
    fn draw_wireframe_instanced(
        &mut self,
        mesh: &Arc<Mesh>,
        instances: &[InstanceRaw],
        colors: &[Color],
        bones: Option<&[RawMatrix]>,
    );

    /// Builds one UI window. Backends without UI support just run the callback.
    fn ui_window(&mut self, name: &str, render: &dyn Fn()) {
        log::trace!("UI window '{}' rendered without UI support", name);
        render();
    }

    fn end_frame(&mut self) -> anyhow::Result<()>;
}

/// A call received by a [`RecordingBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCall {
    BeginFrame(Color),
    BindShader(ShaderKind),
    SetCamera(CameraUniform),
    SetLights(LightSet),
    SetMaterial(MaterialId),
    DrawMesh {
        mesh: MeshId,
        instances: Vec<InstanceRaw>,
        /// Number of bone matrices passed, if any.
        bones: Option<usize>,
    },
    UploadAtlasRegion {
        atlas: AtlasId,
        offset: Vector2<i32>,
        size: Vector2<u32>,
    },
    BindAtlas(AtlasId),
    DrawSprites(Vec<SpriteInstance>),
    DrawLines {
        vertices: Vec<LineVertex>,
        instances: Vec<InstanceRaw>,
    },
    DrawWireframe {
        mesh: MeshId,
        instances: Vec<InstanceRaw>,
        colors: Vec<Color>,
    },
    UiWindow(String),
    EndFrame,
}

/// A [`RenderBackend`] that only records what it is asked to do.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    pub calls: Vec<RenderCall>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mesh_draws(&self) -> impl Iterator<Item = &RenderCall> {
        self.calls
            .iter()
            .filter(|call| matches!(call, RenderCall::DrawMesh { .. }))
    }

    pub fn sprite_draws(&self) -> impl Iterator<Item = &[SpriteInstance]> {
        self.calls.iter().filter_map(|call| match call {
            RenderCall::DrawSprites(sprites) => Some(sprites.as_slice()),
            _ => None,
        })
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }
}

impl RenderBackend for RecordingBackend {
    fn begin_frame(&mut self, clear: Color) -> anyhow::Result<()> {
        self.calls.push(RenderCall::BeginFrame(clear));
        Ok(())
    }

    fn bind_shader(&mut self, shader: ShaderKind) -> Result<(), ConfigError> {
        self.calls.push(RenderCall::BindShader(shader));
        Ok(())
    }

    fn set_camera(&mut self, camera: &CameraUniform) {
        self.calls.push(RenderCall::SetCamera(*camera));
    }

    fn set_lights(&mut self, lights: &LightSet) {
        self.calls.push(RenderCall::SetLights(lights.clone()));
    }

    fn set_material(&mut self, material: &Arc<Material>) {
        self.calls.push(RenderCall::SetMaterial(material.id()));
    }

    fn draw_mesh_instanced(
        &mut self,
        mesh: &Arc<Mesh>,
        instances: &[InstanceRaw],
        bones: Option<&[RawMatrix]>,
    ) {
        self.calls.push(RenderCall::DrawMesh {
            mesh: mesh.id(),
            instances: instances.to_vec(),
            bones: bones.map(<[RawMatrix]>::len),
        });
    }

    fn upload_atlas_region(&mut self, atlas: AtlasId, offset: Vector2<i32>, image: &ImageData) {
        self.calls.push(RenderCall::UploadAtlasRegion {
            atlas,
            offset,
            size: Vector2::new(image.width, image.height),
        });
    }

    fn bind_atlas(&mut self, atlas: AtlasId) {
        self.calls.push(RenderCall::BindAtlas(atlas));
    }

    fn draw_sprites(&mut self, sprites: &[SpriteInstance]) {
        self.calls.push(RenderCall::DrawSprites(sprites.to_vec()));
    }

    fn draw_lines(&mut self, vertices: &[LineVertex], instances: &[InstanceRaw]) {
        self.calls.push(RenderCall::DrawLines {
            vertices: vertices.to_vec(),
            instances: instances.to_vec(),
        });
    }

    fn draw_wireframe_instanced(
        &mut self,
        mesh: &Arc<Mesh>,
        instances: &[InstanceRaw],
        colors: &[Color],
        _bones: Option<&[RawMatrix]>,
    ) {
        self.calls.push(RenderCall::DrawWireframe {
            mesh: mesh.id(),
            instances: instances.to_vec(),
            colors: colors.to_vec(),
        });
    }

    fn ui_window(&mut self, name: &str, render: &dyn Fn()) {
        self.calls.push(RenderCall::UiWindow(name.to_string()));
        render();
    }

    fn end_frame(&mut self) -> anyhow::Result<()> {
        self.calls.push(RenderCall::EndFrame);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use cgmath::SquareMatrix;

    use super::*;

    #[test]
    fn light_set_drops_lights_past_the_cap() {
        let mut lights = LightSet::new();
        for _ in 0..MAX_DIRECTIONAL_LIGHTS {
            assert!(lights.push_directional(DirectionalLightUniform::default()));
        }
        assert!(!lights.push_directional(DirectionalLightUniform::default()));
        assert_eq!(lights.directional.len(), MAX_DIRECTIONAL_LIGHTS);
    }

    #[test]
    fn bone_blocks_are_padded_with_identities() {
        let mut out = Vec::new();
        pack_bones(&[Matrix4::from_scale(2.0)], &mut out);
        assert_eq!(out.len(), MAX_BONES);
        assert_eq!(out[0][0][0], 2.0);
        let identity: RawMatrix = Matrix4::<f32>::identity().into();
        assert_eq!(out[1], identity);
    }

    #[test]
    fn uniform_sizes_match_shader_layout() {
        assert_eq!(std::mem::size_of::<DirectionalLightUniform>(), 32);
        assert_eq!(std::mem::size_of::<PointLightUniform>(), 48);
        assert_eq!(std::mem::size_of::<SpotLightUniform>(), 64);
        assert_eq!(std::mem::size_of::<CameraUniform>(), 16 + 3 * 64);
    }
}
