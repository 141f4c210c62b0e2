//! wgpu program construction for every [`ShaderKind`].
//!
//! Bind group layout per program:
//!
//! - lit/unlit: camera (0), lights (1), material (2), bones (3, skinned only)
//! - sprite: camera (0), atlas (1)
//! - line: camera (0)
//! - wireframe: camera (0), bones (1, skinned only)

use crate::{
    data_structures::{
        instance::InstanceRaw,
        model::{ModelVertex, SkinVertex, Vertex},
        texture::Texture,
    },
    error::ConfigError,
    pipelines::light,
    render::{LineVertex, ShaderKind, SpriteInstance},
    resources::texture::{atlas_layout, material_layout},
};

/// Corner of the unit sprite quad.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
}

pub const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex { position: [0.0, 0.0] },
    QuadVertex { position: [0.0, 1.0] },
    QuadVertex { position: [1.0, 0.0] },
    QuadVertex { position: [1.0, 1.0] },
];

pub const QUAD_INDICES: [u16; 6] = [0, 2, 1, 1, 2, 3];

impl Vertex for QuadVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x2,
            }],
        }
    }
}

/// Per-instance color of a wireframe draw.
pub fn wire_color_desc() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<[f32; 4]>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Instance,
        attributes: &[wgpu::VertexAttribute {
            offset: 0,
            shader_location: 15,
            format: wgpu::VertexFormat::Float32x4,
        }],
    }
}

/// The bind group layouts shared by all programs.
#[derive(Debug)]
pub struct Layouts {
    pub camera: wgpu::BindGroupLayout,
    pub lights: wgpu::BindGroupLayout,
    pub material: wgpu::BindGroupLayout,
    pub atlas: wgpu::BindGroupLayout,
    pub bones: wgpu::BindGroupLayout,
}

impl Layouts {
    pub fn new(device: &wgpu::Device) -> Self {
        Self {
            camera: uniform_layout(device, "camera_bind_group_layout"),
            lights: light::mk_bind_group_layout(device),
            material: material_layout(device),
            atlas: atlas_layout(device),
            bones: device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
                label: Some("bones_bind_group_layout"),
            }),
        }
    }
}

pub fn uniform_layout(device: &wgpu::Device, label: &str) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
        label: Some(label),
    })
}

/// Fixed-function state of one program.
pub struct Program<'a> {
    pub label: &'a str,
    pub vertex_entry: &'a str,
    pub fragment_entry: &'a str,
    pub topology: wgpu::PrimitiveTopology,
    pub cull_mode: Option<wgpu::Face>,
    pub blend: Option<wgpu::BlendState>,
}

/// Compiles WGSL and turns compiler errors into [`ConfigError::ShaderCompilation`].
pub fn compile_shader(
    device: &wgpu::Device,
    label: &str,
    source: &'static str,
) -> Result<wgpu::ShaderModule, ConfigError> {
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    let info = futures::executor::block_on(module.get_compilation_info());
    let errors: Vec<String> = info
        .messages
        .iter()
        .filter(|m| matches!(m.message_type, wgpu::CompilationMessageType::Error))
        .map(|m| m.message.clone())
        .collect();
    if !errors.is_empty() {
        return Err(ConfigError::ShaderCompilation {
            shader: label.to_string(),
            message: errors.join("\n"),
        });
    }
    Ok(module)
}

/// Builds the program drawing `kind`, in its skinned variant if `skinned` is set.
pub fn mk_program(
    device: &wgpu::Device,
    layouts: &Layouts,
    color_format: wgpu::TextureFormat,
    kind: ShaderKind,
    skinned: bool,
) -> Result<wgpu::RenderPipeline, ConfigError> {
    let alpha = Some(wgpu::BlendState::ALPHA_BLENDING);
    let vertex_entry = if skinned { "vs_skinned" } else { "vs_main" };

    let (source, groups, buffers, program) = match kind {
        ShaderKind::Lit | ShaderKind::Unlit => {
            let mut groups = vec![&layouts.camera, &layouts.lights, &layouts.material];
            let mut buffers = vec![ModelVertex::desc(), InstanceRaw::desc()];
            if skinned {
                groups.push(&layouts.bones);
                buffers.push(SkinVertex::desc());
            }
            let fragment_entry = if kind == ShaderKind::Lit { "fs_lit" } else { "fs_unlit" };
            let program = Program {
                label: kind.name(),
                vertex_entry,
                fragment_entry,
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: Some(wgpu::Face::Back),
                blend: alpha,
            };
            (include_str!("mesh.wgsl"), groups, buffers, program)
        }
        ShaderKind::Sprite => (
            include_str!("sprite.wgsl"),
            vec![&layouts.camera, &layouts.atlas],
            vec![QuadVertex::desc(), SpriteInstance::desc()],
            Program {
                label: kind.name(),
                vertex_entry: "vs_main",
                fragment_entry: "fs_main",
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                blend: alpha,
            },
        ),
        ShaderKind::Line => (
            include_str!("line.wgsl"),
            vec![&layouts.camera],
            vec![LineVertex::desc(), InstanceRaw::desc()],
            Program {
                label: kind.name(),
                vertex_entry: "vs_main",
                fragment_entry: "fs_main",
                topology: wgpu::PrimitiveTopology::LineList,
                cull_mode: None,
                blend: Some(wgpu::BlendState::REPLACE),
            },
        ),
        ShaderKind::Wireframe => {
            let mut groups = vec![&layouts.camera];
            let mut buffers = vec![ModelVertex::desc(), InstanceRaw::desc(), wire_color_desc()];
            if skinned {
                groups.push(&layouts.bones);
                buffers.push(SkinVertex::desc());
            }
            let program = Program {
                label: kind.name(),
                vertex_entry,
                fragment_entry: "fs_main",
                topology: wgpu::PrimitiveTopology::LineList,
                cull_mode: None,
                blend: Some(wgpu::BlendState::REPLACE),
            };
            (include_str!("wireframe.wgsl"), groups, buffers, program)
        }
    };

    let shader = compile_shader(device, kind.name(), source)?;
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(program.label),
        bind_group_layouts: &groups,
        push_constant_ranges: &[],
    });
    log::debug!("Built {} program (skinned: {})", kind.name(), skinned);
    Ok(mk_render_pipeline(
        device,
        &layout,
        color_format,
        Some(Texture::DEPTH_FORMAT),
        &buffers,
        &shader,
        &program,
    ))
}

pub fn mk_render_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    color_format: wgpu::TextureFormat,
    depth_format: Option<wgpu::TextureFormat>,
    vertex_layouts: &[wgpu::VertexBufferLayout],
    shader: &wgpu::ShaderModule,
    program: &Program<'_>,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        cache: None,
        label: Some(program.label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some(program.vertex_entry),
            buffers: vertex_layouts,
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some(program.fragment_entry),
            targets: &[Some(wgpu::ColorTargetState {
                format: color_format,
                blend: program.blend,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: program.topology,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: program.cull_mode,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: depth_format.map(|format| wgpu::DepthStencilState {
            format,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::LessEqual,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
    })
}
