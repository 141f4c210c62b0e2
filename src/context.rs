//! The wgpu implementation of [`RenderBackend`].
//!
//! [`Context`] owns the surface, device and queue of one window. Meshes, materials and
//! sprite atlases are uploaded the first time they are drawn and cached by id; entries
//! whose CPU asset has been dropped are released through the deletion queues at the start
//! of the next frame.
//!
//! Every draw records its own render pass into the frame's encoder. The first pass of a
//! frame clears color and depth, later ones load them.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Weak},
};

use anyhow::Context as _;
use cgmath::{Matrix4, SquareMatrix, Vector2};
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::{
    data_structures::{
        color::Color,
        model::{Material, MaterialId, Mesh, MeshId},
        sprite::AtlasId,
        texture::{Texture, create_default_sampler},
    },
    error::ConfigError,
    pipelines::{
        basic::{self, Layouts, QUAD_INDICES, QUAD_VERTICES},
        light::{self, LightsUniform},
    },
    render::{
        CameraUniform, InstanceRaw, LightSet, LineVertex, RawMatrix, RenderBackend, ShaderKind,
        SpriteInstance,
    },
    resources::{
        deletion::{ContextId, Deferred, DeletionQueue},
        texture::ImageData,
    },
};

/// Material constants bound next to the material textures.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct MaterialUniform {
    ambient: [f32; 4],
    diffuse: [f32; 4],
    emissive: [f32; 4],
    specular: [f32; 4],
    // opacity, reflectivity, shininess, unused
    params: [f32; 4],
}

impl From<&Material> for MaterialUniform {
    fn from(material: &Material) -> Self {
        Self {
            ambient: material.ambient_color.to_array(),
            diffuse: material.diffuse_color.to_array(),
            emissive: material.emissive_color.to_array(),
            specular: material.specular_color.to_array(),
            params: [material.opacity, material.reflectivity, material.shininess, 0.0],
        }
    }
}

#[derive(Debug)]
struct GpuMesh {
    source: Weak<Mesh>,
    vertices: Deferred<wgpu::Buffer>,
    indices: Deferred<wgpu::Buffer>,
    num_indices: u32,
    skin: Option<Deferred<wgpu::Buffer>>,
    /// Line-list indices of the unique triangle edges, built on first wireframe draw.
    edges: Option<(Deferred<wgpu::Buffer>, u32)>,
}

#[derive(Debug)]
struct GpuMaterial {
    source: Weak<Material>,
    bind_group: wgpu::BindGroup,
    _textures: Vec<Deferred<wgpu::Texture>>,
    _uniform: Deferred<wgpu::Buffer>,
}

#[derive(Debug)]
struct GpuAtlas {
    texture: Texture,
    bind_group: wgpu::BindGroup,
}

#[derive(Debug)]
struct Frame {
    output: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
    encoder: wgpu::CommandEncoder,
    /// Set until the first pass of the frame has cleared the targets.
    clear: Option<wgpu::Color>,
    camera: wgpu::BindGroup,
    lights: wgpu::BindGroup,
}

#[derive(Debug)]
pub struct Context {
    pub(crate) window: Arc<Window>,
    pub(crate) depth_texture: Texture,
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    id: ContextId,
    buffers: DeletionQueue<wgpu::Buffer>,
    textures: DeletionQueue<wgpu::Texture>,
    layouts: Layouts,
    programs: HashMap<(ShaderKind, bool), wgpu::RenderPipeline>,
    meshes: HashMap<MeshId, GpuMesh>,
    materials: HashMap<MaterialId, GpuMaterial>,
    atlases: HashMap<AtlasId, GpuAtlas>,
    quad_vertices: wgpu::Buffer,
    quad_indices: wgpu::Buffer,
    sampler: wgpu::Sampler,
    white: Texture,
    flat_normal: Texture,
    frame: Option<Frame>,
    shader: Option<ShaderKind>,
    material: Option<MaterialId>,
    atlas: Option<AtlasId>,
}

impl Context {
    pub async fn new(window: Arc<Window>) -> anyhow::Result<Self> {
        let size = window.inner_size();

        log::info!("Setting up wgpu");
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let surface = instance.create_surface(window.clone())?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("no suitable graphics adapter")?;
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to open the graphics device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        // Shaders assume an sRGB target
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .context("surface supports no texture formats")?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: surface_caps
                .present_modes
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::Fifo),
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let depth_texture =
            Texture::create_depth_texture(&device, [config.width, config.height], "depth_texture");
        let layouts = Layouts::new(&device);

        let quad_vertices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Quad Vertex Buffer"),
            contents: bytemuck::cast_slice(&QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let quad_indices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Quad Index Buffer"),
            contents: bytemuck::cast_slice(&QUAD_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });

        let white = Texture::from_image_data(
            &device,
            &queue,
            &ImageData::solid(1, 1, [255, 255, 255, 255]),
            "white",
        );
        // Tangent space "up", i.e. no deformation
        let flat_normal = Texture::from_image_data(
            &device,
            &queue,
            &ImageData::solid(1, 1, [127, 127, 255, 255]).linear(),
            "flat normal map",
        );

        let sampler = create_default_sampler(&device);

        Ok(Self {
            window,
            depth_texture,
            surface,
            device,
            queue,
            config,
            id: ContextId::next(),
            buffers: DeletionQueue::new(),
            textures: DeletionQueue::new(),
            layouts,
            programs: HashMap::new(),
            meshes: HashMap::new(),
            materials: HashMap::new(),
            atlases: HashMap::new(),
            quad_vertices,
            quad_indices,
            sampler,
            white,
            flat_normal,
            frame: None,
            shader: None,
            material: None,
            atlas: None,
        })
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }

    pub fn size(&self) -> Vector2<u32> {
        Vector2::new(self.config.width, self.config.height)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&self.device, &self.config);
            self.depth_texture = Texture::create_depth_texture(
                &self.device,
                [self.config.width, self.config.height],
                "depth_texture",
            );
        }
    }

    /// Destroys every GPU handle whose owner was dropped since the last call.
    pub fn flush_deletions(&mut self) -> usize {
        self.buffers.flush(self.id, |buffer| buffer.destroy())
            + self.textures.flush(self.id, |texture| texture.destroy())
    }

    /// Drops the GPU copies of meshes and materials nobody holds anymore.
    fn sweep(&mut self) {
        let meshes = self.meshes.len();
        let materials = self.materials.len();
        self.meshes.retain(|_, mesh| mesh.source.strong_count() > 0);
        self.materials
            .retain(|_, material| material.source.strong_count() > 0);
        let released = meshes - self.meshes.len() + materials - self.materials.len();
        if released > 0 {
            log::debug!("Releasing {} unused meshes and materials", released);
        }
    }

    fn defer_buffer(&self, buffer: wgpu::Buffer) -> Deferred<wgpu::Buffer> {
        self.buffers.defer(self.id, buffer)
    }

    fn uniform_bind_group(
        &self,
        layout: &wgpu::BindGroupLayout,
        label: &str,
        contents: &[u8],
    ) -> wgpu::BindGroup {
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage: wgpu::BufferUsages::UNIFORM,
            });
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
            label: Some(label),
        })
    }

    fn bones_bind_group(&self, bones: &[RawMatrix]) -> wgpu::BindGroup {
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Bones Buffer"),
                contents: bytemuck::cast_slice(bones),
                usage: wgpu::BufferUsages::STORAGE,
            });
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &self.layouts.bones,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
            label: Some("bones_bind_group"),
        })
    }

    fn vertex_buffer(&self, label: &str, contents: &[u8]) -> wgpu::Buffer {
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage: wgpu::BufferUsages::VERTEX,
            })
    }

    fn upload_mesh(&mut self, mesh: &Arc<Mesh>) {
        if self.meshes.contains_key(&mesh.id()) {
            return;
        }
        log::debug!("Uploading mesh '{}'", mesh.name);
        let vertices = self.vertex_buffer(
            &format!("{:?} Vertex Buffer", mesh.name),
            bytemuck::cast_slice(&mesh.vertices),
        );
        let indices = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{:?} Index Buffer", mesh.name)),
                contents: bytemuck::cast_slice(&mesh.indices),
                usage: wgpu::BufferUsages::INDEX,
            });
        let skin = mesh.skin.as_ref().map(|skin| {
            let buffer = self.vertex_buffer(
                &format!("{:?} Skin Buffer", mesh.name),
                bytemuck::cast_slice(skin),
            );
            self.defer_buffer(buffer)
        });
        let gpu = GpuMesh {
            source: Arc::downgrade(mesh),
            vertices: self.defer_buffer(vertices),
            indices: self.defer_buffer(indices),
            num_indices: mesh.num_elements(),
            skin,
            edges: None,
        };
        self.meshes.insert(mesh.id(), gpu);
    }

    fn upload_edges(&mut self, mesh: &Mesh) {
        let needs_edges = self
            .meshes
            .get(&mesh.id())
            .is_some_and(|gpu| gpu.edges.is_none());
        if !needs_edges {
            return;
        }
        let edges = triangle_edges(&mesh.indices);
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{:?} Edge Buffer", mesh.name)),
                contents: bytemuck::cast_slice(&edges),
                usage: wgpu::BufferUsages::INDEX,
            });
        let buffer = self.defer_buffer(buffer);
        if let Some(gpu) = self.meshes.get_mut(&mesh.id()) {
            gpu.edges = Some((buffer, edges.len() as u32));
        }
    }

    fn upload_material(&mut self, material: &Arc<Material>) {
        if self.materials.contains_key(&material.id()) {
            return;
        }
        log::debug!("Uploading material '{}'", material.name);
        let diffuse = material.diffuse_texture.as_ref().map(|image| {
            Texture::from_image_data(&self.device, &self.queue, image, &material.name)
        });
        let normal = material.normal_texture.as_ref().map(|image| {
            Texture::from_image_data(&self.device, &self.queue, image, &material.name)
        });
        let uniform = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{:?} Material Buffer", material.name)),
                contents: bytemuck::cast_slice(&[MaterialUniform::from(material.as_ref())]),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let diffuse_tex = diffuse.as_ref().unwrap_or(&self.white);
        let normal_tex = normal.as_ref().unwrap_or(&self.flat_normal);
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &self.layouts.material,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&diffuse_tex.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(
                        diffuse_tex.sampler.as_ref().unwrap_or(&self.sampler),
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&normal_tex.view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(
                        normal_tex.sampler.as_ref().unwrap_or(&self.sampler),
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: uniform.as_entire_binding(),
                },
            ],
            label: Some(&format!("{:?} Material Bind Group", material.name)),
        });
        let textures = diffuse
            .into_iter()
            .chain(normal)
            .map(|texture| self.textures.defer(self.id, texture.texture))
            .collect();
        let gpu = GpuMaterial {
            source: Arc::downgrade(material),
            bind_group,
            _textures: textures,
            _uniform: self.defer_buffer(uniform),
        };
        self.materials.insert(material.id(), gpu);
    }

    fn ensure_atlas(&mut self, atlas: AtlasId) {
        if self.atlases.contains_key(&atlas) {
            return;
        }
        log::debug!("Creating sprite atlas {:?}", atlas);
        let texture = Texture::create_atlas(&self.device, &format!("Sprite Atlas {}", atlas.0));
        let sampler = texture.sampler.as_ref().unwrap_or(&self.sampler);
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &self.layouts.atlas,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
            label: Some("atlas_bind_group"),
        });
        self.atlases.insert(atlas, GpuAtlas { texture, bind_group });
    }

    fn ensure_program(&mut self, kind: ShaderKind, skinned: bool) -> Result<(), ConfigError> {
        if self.programs.contains_key(&(kind, skinned)) {
            return Ok(());
        }
        let program = basic::mk_program(
            &self.device,
            &self.layouts,
            self.config.format,
            kind,
            skinned,
        )?;
        self.programs.insert((kind, skinned), program);
        Ok(())
    }
}

/// The program of the bound shader, in its skinned variant if requested.
fn bound_program(
    programs: &HashMap<(ShaderKind, bool), wgpu::RenderPipeline>,
    shader: Option<ShaderKind>,
    skinned: bool,
) -> Option<&wgpu::RenderPipeline> {
    let Some(kind) = shader else {
        log::warn!("Draw issued without a bound shader");
        return None;
    };
    programs.get(&(kind, skinned))
}

/// Each undirected edge of the triangle list once, as line-list indices.
pub fn triangle_edges(indices: &[u32]) -> Vec<u32> {
    let mut seen = HashSet::new();
    let mut edges = Vec::new();
    for triangle in indices.chunks_exact(3) {
        for (a, b) in [
            (triangle[0], triangle[1]),
            (triangle[1], triangle[2]),
            (triangle[2], triangle[0]),
        ] {
            if seen.insert((a.min(b), a.max(b))) {
                edges.extend([a, b]);
            }
        }
    }
    edges
}

fn begin_pass<'e>(
    encoder: &'e mut wgpu::CommandEncoder,
    view: &wgpu::TextureView,
    depth: &wgpu::TextureView,
    clear: Option<wgpu::Color>,
) -> wgpu::RenderPass<'e> {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("Render Pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: clear.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        })],
        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
            view: depth,
            depth_ops: Some(wgpu::Operations {
                load: if clear.is_some() {
                    wgpu::LoadOp::Clear(1.0)
                } else {
                    wgpu::LoadOp::Load
                },
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        }),
        occlusion_query_set: None,
        timestamp_writes: None,
    })
}

impl RenderBackend for Context {
    fn begin_frame(&mut self, clear: Color) -> anyhow::Result<()> {
        self.sweep();
        self.frame = None;
        self.shader = None;
        self.material = None;
        self.atlas = None;

        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            // Reconfigure the surface if it's lost or outdated and skip this frame
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                let size = self.window.inner_size();
                self.resize(size.width, size.height);
                return Ok(());
            }
            Err(e) => return Err(e).context("failed to acquire the next frame"),
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });
        let identity = Matrix4::identity();
        let camera = self.uniform_bind_group(
            &self.layouts.camera,
            "camera_bind_group",
            bytemuck::cast_slice(&[CameraUniform::new(identity, identity, cgmath::Vector3::new(0.0, 0.0, 0.0))]),
        );
        let lights = self.uniform_bind_group(
            &self.layouts.lights,
            "lights_bind_group",
            bytemuck::cast_slice(&[LightsUniform::pack(&LightSet::new())]),
        );
        self.frame = Some(Frame {
            output,
            view,
            encoder,
            clear: Some(clear.into()),
            camera,
            lights,
        });
        Ok(())
    }

    fn bind_shader(&mut self, shader: ShaderKind) -> Result<(), ConfigError> {
        self.ensure_program(shader, false)?;
        if matches!(
            shader,
            ShaderKind::Lit | ShaderKind::Unlit | ShaderKind::Wireframe
        ) {
            self.ensure_program(shader, true)?;
        }
        self.shader = Some(shader);
        Ok(())
    }

    fn set_camera(&mut self, camera: &CameraUniform) {
        let bind_group = self.uniform_bind_group(
            &self.layouts.camera,
            "camera_bind_group",
            bytemuck::cast_slice(&[*camera]),
        );
        if let Some(frame) = &mut self.frame {
            frame.camera = bind_group;
        }
    }

    fn set_lights(&mut self, lights: &LightSet) {
        let uniform = LightsUniform::pack(lights);
        let buffer = light::mk_buffer(&self.device, &uniform);
        let bind_group = light::mk_bind_group(&self.device, &self.layouts.lights, &buffer);
        if let Some(frame) = &mut self.frame {
            frame.lights = bind_group;
        }
    }

    fn set_material(&mut self, material: &Arc<Material>) {
        self.upload_material(material);
        self.material = Some(material.id());
    }

    fn draw_mesh_instanced(
        &mut self,
        mesh: &Arc<Mesh>,
        instances: &[InstanceRaw],
        bones: Option<&[RawMatrix]>,
    ) {
        if self.frame.is_none() || instances.is_empty() {
            return;
        }
        let bones = bones.filter(|_| mesh.is_skinned());
        self.upload_mesh(mesh);
        let instance_buffer = self.vertex_buffer("Instance Buffer", bytemuck::cast_slice(instances));
        let bones_bind_group = bones.map(|bones| self.bones_bind_group(bones));

        let Some(program) = bound_program(&self.programs, self.shader, bones.is_some()) else {
            return;
        };
        let Some(material) = self.material.and_then(|id| self.materials.get(&id)) else {
            log::warn!("Skipping mesh '{}': no material bound", mesh.name);
            return;
        };
        let (Some(gpu), Some(frame)) = (self.meshes.get(&mesh.id()), self.frame.as_mut()) else {
            return;
        };

        let clear = frame.clear.take();
        let mut pass = begin_pass(&mut frame.encoder, &frame.view, &self.depth_texture.view, clear);
        pass.set_pipeline(program);
        pass.set_bind_group(0, &frame.camera, &[]);
        pass.set_bind_group(1, &frame.lights, &[]);
        pass.set_bind_group(2, &material.bind_group, &[]);
        pass.set_vertex_buffer(0, gpu.vertices.slice(..));
        pass.set_vertex_buffer(1, instance_buffer.slice(..));
        if let (Some(bones), Some(skin)) = (&bones_bind_group, &gpu.skin) {
            pass.set_bind_group(3, bones, &[]);
            pass.set_vertex_buffer(2, skin.slice(..));
        }
        pass.set_index_buffer(gpu.indices.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..gpu.num_indices, 0, 0..instances.len() as u32);
    }

    fn upload_atlas_region(&mut self, atlas: AtlasId, offset: Vector2<i32>, image: &ImageData) {
        self.ensure_atlas(atlas);
        let (Ok(x), Ok(y)) = (u32::try_from(offset.x), u32::try_from(offset.y)) else {
            log::warn!("Skipping atlas upload at negative offset {:?}", offset);
            return;
        };
        if let Some(gpu) = self.atlases.get(&atlas) {
            gpu.texture.write(&self.queue, [x, y], image);
        }
    }

    fn bind_atlas(&mut self, atlas: AtlasId) {
        self.ensure_atlas(atlas);
        self.atlas = Some(atlas);
    }

    fn draw_sprites(&mut self, sprites: &[SpriteInstance]) {
        if self.frame.is_none() || sprites.is_empty() {
            return;
        }
        let instance_buffer = self.vertex_buffer("Sprite Instance Buffer", bytemuck::cast_slice(sprites));
        let Some(program) = bound_program(&self.programs, self.shader, false) else {
            return;
        };
        let Some(atlas) = self.atlas.and_then(|id| self.atlases.get(&id)) else {
            log::warn!("Skipping {} sprites: no atlas bound", sprites.len());
            return;
        };
        let Some(frame) = self.frame.as_mut() else {
            return;
        };

        let clear = frame.clear.take();
        let mut pass = begin_pass(&mut frame.encoder, &frame.view, &self.depth_texture.view, clear);
        pass.set_pipeline(program);
        pass.set_bind_group(0, &frame.camera, &[]);
        pass.set_bind_group(1, &atlas.bind_group, &[]);
        pass.set_vertex_buffer(0, self.quad_vertices.slice(..));
        pass.set_vertex_buffer(1, instance_buffer.slice(..));
        pass.set_index_buffer(self.quad_indices.slice(..), wgpu::IndexFormat::Uint16);
        pass.draw_indexed(0..QUAD_INDICES.len() as u32, 0, 0..sprites.len() as u32);
    }

    fn draw_lines(&mut self, vertices: &[LineVertex], instances: &[InstanceRaw]) {
        if self.frame.is_none() || vertices.is_empty() || instances.is_empty() {
            return;
        }
        let vertex_buffer = self.vertex_buffer("Line Vertex Buffer", bytemuck::cast_slice(vertices));
        let instance_buffer = self.vertex_buffer("Instance Buffer", bytemuck::cast_slice(instances));
        let Some(program) = bound_program(&self.programs, self.shader, false) else {
            return;
        };
        let Some(frame) = self.frame.as_mut() else {
            return;
        };

        let clear = frame.clear.take();
        let mut pass = begin_pass(&mut frame.encoder, &frame.view, &self.depth_texture.view, clear);
        pass.set_pipeline(program);
        pass.set_bind_group(0, &frame.camera, &[]);
        pass.set_vertex_buffer(0, vertex_buffer.slice(..));
        pass.set_vertex_buffer(1, instance_buffer.slice(..));
        pass.draw(0..vertices.len() as u32, 0..instances.len() as u32);
    }

    fn draw_wireframe_instanced(
        &mut self,
        mesh: &Arc<Mesh>,
        instances: &[InstanceRaw],
        colors: &[Color],
        bones: Option<&[RawMatrix]>,
    ) {
        if self.frame.is_none() || instances.is_empty() {
            return;
        }
        if colors.len() != instances.len() {
            log::warn!(
                "Skipping wireframe of '{}': {} colors for {} instances",
                mesh.name,
                colors.len(),
                instances.len()
            );
            return;
        }
        let bones = bones.filter(|_| mesh.is_skinned());
        self.upload_mesh(mesh);
        self.upload_edges(mesh);
        let instance_buffer = self.vertex_buffer("Instance Buffer", bytemuck::cast_slice(instances));
        let color_buffer = self.vertex_buffer("Wire Color Buffer", bytemuck::cast_slice(colors));
        let bones_bind_group = bones.map(|bones| self.bones_bind_group(bones));

        let Some(program) = bound_program(&self.programs, self.shader, bones.is_some()) else {
            return;
        };
        let (Some(gpu), Some(frame)) = (self.meshes.get(&mesh.id()), self.frame.as_mut()) else {
            return;
        };
        let Some((edges, num_edges)) = &gpu.edges else {
            return;
        };

        let clear = frame.clear.take();
        let mut pass = begin_pass(&mut frame.encoder, &frame.view, &self.depth_texture.view, clear);
        pass.set_pipeline(program);
        pass.set_bind_group(0, &frame.camera, &[]);
        pass.set_vertex_buffer(0, gpu.vertices.slice(..));
        pass.set_vertex_buffer(1, instance_buffer.slice(..));
        pass.set_vertex_buffer(2, color_buffer.slice(..));
        if let (Some(bones), Some(skin)) = (&bones_bind_group, &gpu.skin) {
            pass.set_bind_group(1, bones, &[]);
            pass.set_vertex_buffer(3, skin.slice(..));
        }
        pass.set_index_buffer(edges.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..*num_edges, 0, 0..instances.len() as u32);
    }

    fn end_frame(&mut self) -> anyhow::Result<()> {
        let Some(mut frame) = self.frame.take() else {
            return Ok(());
        };
        if let Some(clear) = frame.clear.take() {
            // Nothing was drawn, the pass still clears the targets
            drop(begin_pass(
                &mut frame.encoder,
                &frame.view,
                &self.depth_texture.view,
                Some(clear),
            ));
        }
        self.queue.submit(std::iter::once(frame.encoder.finish()));
        frame.output.present();
        Ok(())
    }
}
