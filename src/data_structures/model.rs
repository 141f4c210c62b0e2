//! Model, mesh and material definitions.
//!
//! A [`Model`] is an immutable asset shared as `Arc<Model>`: a tree of [`ModelPart`]s
//! carrying [`Geometry`] (a [`Mesh`] paired with a [`Material`]), the animations that
//! target those parts and the bind-pose offsets of its bones. Every object that renders a
//! model holds its own [`ModelInstance`], a mutable mirror of the part tree whose
//! transforms animation may override.
//!
//! Meshes and materials keep their data on the CPU. The render backend uploads them
//! lazily and keys its GPU copies by [`MeshId`]/[`MaterialId`].

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use cgmath::{Matrix4, SquareMatrix};

use crate::{
    data_structures::color::Color,
    render::ShaderKind,
    resources::{Resource, animation::Animation, texture::ImageData},
};

/// Highest number of bone matrices a skinned draw uploads per instance.
pub const MAX_BONES: usize = 200;

pub trait Vertex {
    fn desc() -> wgpu::VertexBufferLayout<'static>;
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ModelVertex {
    pub position: [f32; 3],
    pub tex_coords: [f32; 2],
    pub normal: [f32; 3],
    pub tangent: [f32; 3],
    pub bitangent: [f32; 3],
}

impl Vertex for ModelVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<ModelVertex>() as wgpu::BufferAddress,
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
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 5]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 8]>() as wgpu::BufferAddress,
                    shader_location: 3,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 11]>() as wgpu::BufferAddress,
                    shader_location: 4,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

/// Up to four bone influences of one vertex. Unused slots have weight 0.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SkinVertex {
    pub bone_ids: [u32; 4],
    pub weights: [f32; 4],
}

impl Vertex for SkinVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<SkinVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 13,
                    format: wgpu::VertexFormat::Uint32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[u32; 4]>() as wgpu::BufferAddress,
                    shader_location: 14,
                    format: wgpu::VertexFormat::Float32x4,
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(u64);

static NEXT_MESH_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_MATERIAL_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
pub struct Mesh {
    pub name: String,
    pub vertices: Vec<ModelVertex>,
    pub indices: Vec<u32>,
    pub skin: Option<Vec<SkinVertex>>,
    id: MeshId,
}

impl Mesh {
    pub fn new(name: impl Into<String>, vertices: Vec<ModelVertex>, indices: Vec<u32>) -> Self {
        Self {
            name: name.into(),
            vertices,
            indices,
            skin: None,
            id: MeshId(NEXT_MESH_ID.fetch_add(1, Ordering::Relaxed)),
        }
    }

    /// Attaches per-vertex bone influences. A skin whose length does not match the vertex
    /// count is dropped.
    pub fn with_skin(mut self, skin: Vec<SkinVertex>) -> Self {
        if skin.len() == self.vertices.len() {
            self.skin = Some(skin);
        } else {
            log::warn!(
                "Ignoring skin of mesh '{}': {} influences for {} vertices",
                self.name,
                skin.len(),
                self.vertices.len()
            );
        }
        self
    }

    pub fn id(&self) -> MeshId {
        self.id
    }

    pub fn is_skinned(&self) -> bool {
        self.skin.is_some()
    }

    pub fn num_elements(&self) -> u32 {
        self.indices.len() as u32
    }
}

#[derive(Debug)]
pub struct Material {
    pub name: String,
    pub ambient_color: Color,
    pub diffuse_color: Color,
    pub emissive_color: Color,
    pub specular_color: Color,
    pub ambient_texture: Option<Arc<ImageData>>,
    pub diffuse_texture: Option<Arc<ImageData>>,
    pub emissive_texture: Option<Arc<ImageData>>,
    pub specular_texture: Option<Arc<ImageData>>,
    pub normal_texture: Option<Arc<ImageData>>,
    pub displacement_texture: Option<Arc<ImageData>>,
    pub ambient_uv_index: u32,
    pub diffuse_uv_index: u32,
    pub emissive_uv_index: u32,
    pub specular_uv_index: u32,
    pub normal_uv_index: u32,
    pub opacity: f32,
    pub reflectivity: f32,
    pub shininess: f32,
    id: MaterialId,
}

impl Material {
    /// A plain white material without textures.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ambient_color: Color::BLACK,
            diffuse_color: Color::WHITE,
            emissive_color: Color::BLACK,
            specular_color: Color::BLACK,
            ambient_texture: None,
            diffuse_texture: None,
            emissive_texture: None,
            specular_texture: None,
            normal_texture: None,
            displacement_texture: None,
            ambient_uv_index: 0,
            diffuse_uv_index: 0,
            emissive_uv_index: 0,
            specular_uv_index: 0,
            normal_uv_index: 0,
            opacity: 1.0,
            reflectivity: 0.0,
            shininess: 32.0,
            id: MaterialId(NEXT_MATERIAL_ID.fetch_add(1, Ordering::Relaxed)),
        }
    }

    pub fn id(&self) -> MaterialId {
        self.id
    }
}

#[derive(Debug, Clone)]
pub struct Geometry {
    pub mesh: Arc<Mesh>,
    pub material: Arc<Material>,
}

/// Index of a part inside [`Model::parts`].
pub type PartIndex = usize;

#[derive(Debug, Clone)]
pub struct ModelPart {
    pub name: String,
    /// Reference transform relative to the parent part.
    pub transform: Matrix4<f32>,
    pub geometries: Vec<Geometry>,
    pub children: Vec<PartIndex>,
}

impl ModelPart {
    pub fn new(name: impl Into<String>, transform: Matrix4<f32>) -> Self {
        Self {
            name: name.into(),
            transform,
            geometries: Vec::new(),
            children: Vec::new(),
        }
    }
}

/**
 * An immutable, shareable model asset.
 *
 * Parts are stored in an arena with the root at index 0. `bone_offsets` keeps the bones
 * in the order the skinning shader indexes them.
 */
#[derive(Debug)]
pub struct Model {
    pub resource: Resource,
    pub parts: Vec<ModelPart>,
    pub animations: Vec<Arc<Animation>>,
    pub bone_offsets: Vec<(String, Matrix4<f32>)>,
    pub shader: ShaderKind,
}

impl Model {
    /// Builds a model. An empty part list gets an empty root part.
    pub fn new(
        resource: Resource,
        mut parts: Vec<ModelPart>,
        animations: Vec<Arc<Animation>>,
        bone_offsets: Vec<(String, Matrix4<f32>)>,
    ) -> Self {
        if parts.is_empty() {
            parts.push(ModelPart::new("root", Matrix4::identity()));
        }
        Self {
            resource,
            parts,
            animations,
            bone_offsets,
            shader: ShaderKind::Lit,
        }
    }

    pub fn root(&self) -> &ModelPart {
        &self.parts[0]
    }

    pub fn part(&self, index: PartIndex) -> Option<&ModelPart> {
        self.parts.get(index)
    }

    pub fn has_bones(&self) -> bool {
        !self.bone_offsets.is_empty()
    }

    pub fn animation(&self, name: &str) -> Option<&Arc<Animation>> {
        self.animations.iter().find(|a| a.name == name)
    }

    /// A fresh instance with every part at its reference transform.
    pub fn instantiate(self: &Arc<Self>) -> ModelInstance {
        ModelInstance {
            model: Arc::clone(self),
            root: self.instantiate_part(0),
        }
    }

    fn instantiate_part(&self, index: PartIndex) -> ModelPartInstance {
        let part = &self.parts[index];
        ModelPartInstance {
            part: index,
            transform: part.transform,
            children: part
                .children
                .iter()
                .filter(|&&child| child < self.parts.len() && child != index)
                .map(|&child| self.instantiate_part(child))
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelPartInstance {
    pub part: PartIndex,
    pub transform: Matrix4<f32>,
    pub children: Vec<ModelPartInstance>,
}

impl ModelPartInstance {
    fn find_mut(&mut self, matches: &dyn Fn(PartIndex) -> bool) -> Option<&mut ModelPartInstance> {
        if matches(self.part) {
            return Some(self);
        }
        self.children
            .iter_mut()
            .find_map(|child| child.find_mut(matches))
    }

    fn for_each_mut(&mut self, action: &mut dyn FnMut(&mut ModelPartInstance)) {
        action(self);
        for child in &mut self.children {
            child.for_each_mut(action);
        }
    }

    /// Preorder walk passing each part instance with its accumulated transform
    /// `parent * transform`.
    pub fn visit(&self, parent: Matrix4<f32>, visitor: &mut dyn FnMut(&ModelPartInstance, Matrix4<f32>)) {
        let world = parent * self.transform;
        visitor(self, world);
        for child in &self.children {
            child.visit(world, visitor);
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelInstance {
    pub model: Arc<Model>,
    pub root: ModelPartInstance,
}

impl ModelInstance {
    pub fn part_name(&self, instance: &ModelPartInstance) -> &str {
        self.model
            .part(instance.part)
            .map(|p| p.name.as_str())
            .unwrap_or_default()
    }

    pub fn get_part_by_name(&mut self, name: &str) -> Option<&mut ModelPartInstance> {
        let model = Arc::clone(&self.model);
        self.root
            .find_mut(&|index| model.part(index).is_some_and(|p| p.name == name))
    }

    pub fn for_each_recursively(&mut self, mut action: impl FnMut(&mut ModelPartInstance)) {
        self.root.for_each_mut(&mut action);
    }

    /// Puts every part back at its reference transform.
    pub fn reset_to_reference(&mut self) {
        let model = Arc::clone(&self.model);
        self.for_each_recursively(|instance| {
            if let Some(part) = model.part(instance.part) {
                instance.transform = part.transform;
            }
        });
    }

    /**
     * Resolves the skinning matrices for the current pose.
     *
     * Walks the part tree from `root` and returns `node_world(bone) * offset(bone)` for
     * every bone in the model's bone order. A bone without a matching part uses the
     * identity as its node transform.
     */
    pub fn calculate_bone_matrices(&self, root: Matrix4<f32>) -> Vec<Matrix4<f32>> {
        let mut node_transforms: HashMap<&str, Matrix4<f32>> = HashMap::new();
        self.root.visit(root, &mut |instance, world| {
            if let Some(part) = self.model.part(instance.part) {
                node_transforms.insert(part.name.as_str(), world);
            }
        });
        self.model
            .bone_offsets
            .iter()
            .map(|(name, offset)| {
                let node = node_transforms
                    .get(name.as_str())
                    .copied()
                    .unwrap_or_else(Matrix4::identity);
                node * *offset
            })
            .collect()
    }
}
