//! glTF 2.0 import.
//!
//! The scene's nodes become [`ModelPart`]s below a synthetic `root` part. Skins are
//! flattened into the model's bone list, animation channels are grouped per target node.

use std::{collections::HashMap, sync::Arc};

use anyhow::Context as _;
use cgmath::{Matrix4, Quaternion, SquareMatrix, Vector3};
use gltf::animation::util::ReadOutputs;

use crate::{
    data_structures::{
        color::Color,
        model::{Geometry, Material, Mesh, Model, ModelPart, ModelVertex, PartIndex, SkinVertex},
    },
    resources::{
        AssetCache, Resource,
        animation::{Animation, AnimationChannel, Interpolation, Keyframe},
        mesh::compute_tangents,
        texture::ImageData,
    },
};

fn node_name(node: &gltf::Node) -> String {
    node.name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("node{}", node.index()))
}

struct Importer {
    base: Resource,
    buffers: Vec<Vec<u8>>,
    materials: Vec<Arc<Material>>,
    fallback_material: Arc<Material>,
    images: HashMap<usize, Option<Arc<ImageData>>>,
    parts: Vec<ModelPart>,
    bones: Vec<(String, Matrix4<f32>)>,
    bone_lookup: HashMap<String, u32>,
    skins: HashMap<usize, Vec<u32>>,
}

impl Importer {
    fn buffer(&self, buffer: gltf::Buffer) -> Option<&[u8]> {
        self.buffers.get(buffer.index()).map(Vec::as_slice)
    }

    fn image(&mut self, texture: gltf::Texture, assets: &mut AssetCache) -> Option<Arc<ImageData>> {
        let source = texture.source();
        if let Some(image) = self.images.get(&source.index()) {
            return image.clone();
        }
        let image = match source.source() {
            gltf::image::Source::View { view, mime_type } => {
                let bytes = self
                    .buffer(view.buffer())
                    .and_then(|buffer| buffer.get(view.offset()..view.offset() + view.length()));
                match bytes.map(|bytes| ImageData::from_bytes(bytes, mime_type.split('/').last())) {
                    Some(Ok(image)) => Some(Arc::new(image)),
                    Some(Err(e)) => {
                        log::warn!("Embedded image {} of {} could not be decoded: {:#}", source.index(), self.base, e);
                        None
                    }
                    None => {
                        log::warn!("Embedded image {} of {} points outside its buffer", source.index(), self.base);
                        None
                    }
                }
            }
            gltf::image::Source::Uri { uri, mime_type: _ } => match self.base.resolve(uri) {
                Ok(resource) => assets.load_image(&resource),
                Err(e) => {
                    log::warn!("Image {} could not be resolved: {}", uri, e);
                    None
                }
            },
        };
        self.images.insert(source.index(), image.clone());
        image
    }

    fn convert_material(&mut self, material: gltf::Material, assets: &mut AssetCache) -> Material {
        let name = material
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("material{}", material.index().unwrap_or_default()));
        let mut result = Material::new(name);

        let pbr = material.pbr_metallic_roughness();
        result.diffuse_color = Color::from(pbr.base_color_factor());
        result.opacity = pbr.base_color_factor()[3];
        if let Some(info) = pbr.base_color_texture() {
            result.diffuse_uv_index = info.tex_coord();
            result.diffuse_texture = self.image(info.texture(), assets);
        }

        if let Some(normal) = material.normal_texture() {
            result.normal_uv_index = normal.tex_coord();
            result.normal_texture = self
                .image(normal.texture(), assets)
                .map(|image| Arc::new((*image).clone().linear()));
        }

        let [r, g, b] = material.emissive_factor();
        result.emissive_color = Color::new(r, g, b, 1.0);
        if let Some(info) = material.emissive_texture() {
            result.emissive_uv_index = info.tex_coord();
            result.emissive_texture = self.image(info.texture(), assets);
        }

        if let Some(occlusion) = material.occlusion_texture() {
            result.ambient_uv_index = occlusion.tex_coord();
            result.ambient_texture = self.image(occlusion.texture(), assets);
        }
        result
    }

    fn bone_index(&mut self, name: String, offset: Matrix4<f32>) -> u32 {
        if let Some(&index) = self.bone_lookup.get(&name) {
            return index;
        }
        let index = self.bones.len() as u32;
        self.bone_lookup.insert(name.clone(), index);
        self.bones.push((name, offset));
        index
    }

    /// Maps the joint indices of `skin` to indices into the model-wide bone list.
    fn skin_bones(&mut self, skin: &gltf::Skin) -> Vec<u32> {
        if let Some(bones) = self.skins.get(&skin.index()) {
            return bones.clone();
        }
        let inverse_bind: Vec<Matrix4<f32>> = skin
            .reader(|buffer| self.buffer(buffer))
            .read_inverse_bind_matrices()
            .map(|matrices| matrices.map(Matrix4::from).collect())
            .unwrap_or_default();
        let bones: Vec<u32> = skin
            .joints()
            .enumerate()
            .map(|(i, joint)| {
                let offset = inverse_bind.get(i).copied().unwrap_or_else(Matrix4::identity);
                self.bone_index(node_name(&joint), offset)
            })
            .collect();
        self.skins.insert(skin.index(), bones.clone());
        bones
    }

    fn convert_primitive(
        &self,
        name: String,
        primitive: &gltf::Primitive,
        skin: Option<&[u32]>,
    ) -> Option<Mesh> {
        if primitive.mode() != gltf::mesh::Mode::Triangles {
            log::warn!("Skipping primitive of {} in {}: {:?} is not supported", name, self.base, primitive.mode());
            return None;
        }
        let reader = primitive.reader(|buffer| self.buffer(buffer));
        let Some(positions) = reader.read_positions() else {
            log::warn!("Skipping primitive of {} in {}: no positions", name, self.base);
            return None;
        };
        let positions: Vec<[f32; 3]> = positions.collect();
        let normals: Vec<[f32; 3]> = reader.read_normals().map(Iterator::collect).unwrap_or_default();
        let tex_coords: Vec<[f32; 2]> = reader
            .read_tex_coords(0)
            .map(|coords| coords.into_f32().collect())
            .unwrap_or_default();
        let tangents: Vec<[f32; 4]> = reader.read_tangents().map(Iterator::collect).unwrap_or_default();
        let indices: Vec<u32> = reader
            .read_indices()
            .map(|indices| indices.into_u32().collect())
            .unwrap_or_else(|| (0..positions.len() as u32).collect());

        let mut vertices: Vec<ModelVertex> = positions
            .iter()
            .enumerate()
            .map(|(i, &position)| {
                let normal = normals.get(i).copied().unwrap_or([0.0; 3]);
                let (tangent, bitangent) = match tangents.get(i) {
                    Some(&[x, y, z, w]) => {
                        let tangent = Vector3::new(x, y, z);
                        (tangent.into(), (Vector3::from(normal).cross(tangent) * w).into())
                    }
                    None => ([0.0; 3], [0.0; 3]),
                };
                ModelVertex {
                    position,
                    tex_coords: tex_coords.get(i).copied().unwrap_or([0.0; 2]),
                    normal,
                    tangent,
                    bitangent,
                }
            })
            .collect();
        if tangents.len() != vertices.len() {
            compute_tangents(&mut vertices, &indices);
        }

        let mut mesh = Mesh::new(name, vertices, indices);
        if let Some(bones) = skin {
            let joints = reader.read_joints(0).map(|joints| joints.into_u16().collect::<Vec<_>>());
            let weights = reader.read_weights(0).map(|weights| weights.into_f32().collect::<Vec<_>>());
            if let (Some(joints), Some(weights)) = (joints, weights) {
                let influences = joints
                    .iter()
                    .zip(weights)
                    .map(|(joint, weights)| SkinVertex {
                        bone_ids: joint.map(|j| bones.get(j as usize).copied().unwrap_or(0)),
                        weights,
                    })
                    .collect();
                mesh = mesh.with_skin(influences);
            }
        }
        Some(mesh)
    }

    fn convert_node(&mut self, node: gltf::Node) -> PartIndex {
        let name = node_name(&node);
        let mut part = ModelPart::new(name.clone(), Matrix4::from(node.transform().matrix()));

        if let Some(mesh) = node.mesh() {
            let skin = node.skin().map(|skin| self.skin_bones(&skin));
            let mesh_name = mesh.name().map(str::to_string).unwrap_or_else(|| name.clone());
            let primitive_count = mesh.primitives().len();
            for primitive in mesh.primitives() {
                let primitive_name = if primitive_count > 1 {
                    format!("{}.{}", mesh_name, primitive.index())
                } else {
                    mesh_name.clone()
                };
                let Some(converted) = self.convert_primitive(primitive_name, &primitive, skin.as_deref()) else {
                    continue;
                };
                let material = primitive
                    .material()
                    .index()
                    .and_then(|idx| self.materials.get(idx))
                    .unwrap_or(&self.fallback_material);
                part.geometries.push(Geometry {
                    mesh: Arc::new(converted),
                    material: Arc::clone(material),
                });
            }
        }

        let index = self.parts.len();
        self.parts.push(part);
        for child in node.children() {
            let child = self.convert_node(child);
            self.parts[index].children.push(child);
        }
        index
    }

    fn convert_animation(&self, animation: gltf::Animation) -> Animation {
        let mut channels: Vec<AnimationChannel> = Vec::new();
        let mut duration = 0f32;

        for channel in animation.channels() {
            let node_name = node_name(&channel.target().node());
            let interpolation = channel.sampler().interpolation();
            let reader = channel.reader(|buffer| self.buffer(buffer));
            let Some(inputs) = reader.read_inputs() else {
                log::warn!("No keyframe times in channel {} of {}", channel.index(), self.base);
                continue;
            };
            let times: Vec<f32> = inputs.collect();
            duration = times.iter().copied().fold(duration, f32::max);
            let Some(outputs) = reader.read_outputs() else {
                log::warn!("No keyframes found in channel {} of {}", channel.index(), self.base);
                continue;
            };

            let target = match channels.iter().position(|c| c.node_name == node_name) {
                Some(index) => index,
                None => {
                    channels.push(AnimationChannel {
                        node_name,
                        ..Default::default()
                    });
                    channels.len() - 1
                }
            };
            let target = &mut channels[target];
            match outputs {
                ReadOutputs::Translations(values) => {
                    target.translations =
                        keyframes(&times, values.map(Vector3::from).collect(), interpolation, false)
                }
                ReadOutputs::Rotations(values) => {
                    target.rotations = keyframes(
                        &times,
                        values
                            .into_f32()
                            .map(|[x, y, z, w]| Quaternion::new(w, x, y, z))
                            .collect(),
                        interpolation,
                        true,
                    )
                }
                ReadOutputs::Scales(values) => {
                    target.scales =
                        keyframes(&times, values.map(Vector3::from).collect(), interpolation, false)
                }
                ReadOutputs::MorphTargetWeights(_) => {
                    log::debug!("Ignoring morph target channel {} of {}", channel.index(), self.base)
                }
            }
        }

        Animation {
            name: animation
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("animation{}", animation.index())),
            duration,
            ticks_per_second: 1.0,
            channels,
        }
    }
}

/// Pairs sampler times with output values. Cubic spline outputs store
/// `(in tangent, value, out tangent)` per key, of which only the value is kept.
fn keyframes<T: Copy>(
    times: &[f32],
    values: Vec<T>,
    interpolation: gltf::animation::Interpolation,
    rotation: bool,
) -> Vec<Keyframe<T>> {
    let blend = if rotation {
        Interpolation::SphericalLinear
    } else {
        Interpolation::Linear
    };
    let (interpolation, stride, offset) = match interpolation {
        gltf::animation::Interpolation::Linear => (blend, 1, 0),
        gltf::animation::Interpolation::Step => (Interpolation::Step, 1, 0),
        gltf::animation::Interpolation::CubicSpline => (blend, 3, 1),
    };
    times
        .iter()
        .enumerate()
        .filter_map(|(i, &time)| {
            values
                .get(i * stride + offset)
                .map(|&value| Keyframe::new(time, value, interpolation))
        })
        .collect()
}

fn load_buffers(gltf: &gltf::Gltf, base: &Resource, assets_root: &std::path::Path) -> anyhow::Result<Vec<Vec<u8>>> {
    let mut buffer_data = Vec::new();
    for buffer in gltf.buffers() {
        match buffer.source() {
            gltf::buffer::Source::Bin => {
                let blob = gltf
                    .blob
                    .as_deref()
                    .context("glTF references a binary chunk it does not contain")?;
                buffer_data.push(blob.to_vec());
            }
            gltf::buffer::Source::Uri(uri) => {
                anyhow::ensure!(!uri.starts_with("data:"), "embedded data URIs are not supported");
                buffer_data.push(base.resolve(uri)?.read_bytes(assets_root)?);
            }
        }
    }
    Ok(buffer_data)
}

/// Loads a `.gltf` or `.glb` file with its external buffers and images.
pub fn load_model_gltf(resource: &Resource, assets: &mut AssetCache) -> anyhow::Result<Model> {
    let bytes = resource.read_bytes(assets.root())?;
    let gltf = gltf::Gltf::from_slice(&bytes)?;
    let base = resource.parent()?;
    let buffers = load_buffers(&gltf, &base, assets.root())?;

    let mut importer = Importer {
        base,
        buffers,
        materials: Vec::new(),
        fallback_material: Arc::new(Material::new("default")),
        images: HashMap::new(),
        parts: vec![ModelPart::new("root", Matrix4::identity())],
        bones: Vec::new(),
        bone_lookup: HashMap::new(),
        skins: HashMap::new(),
    };

    for material in gltf.materials() {
        let material = importer.convert_material(material, assets);
        importer.materials.push(Arc::new(material));
    }

    if let Some(scene) = gltf.default_scene().or_else(|| gltf.scenes().next()) {
        for node in scene.nodes() {
            let index = importer.convert_node(node);
            importer.parts[0].children.push(index);
        }
    }

    let animations = gltf
        .animations()
        .map(|animation| Arc::new(importer.convert_animation(animation)))
        .collect();

    Ok(Model::new(resource.clone(), importer.parts, animations, importer.bones))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cubic_spline_keeps_middle_values() {
        let keys = keyframes(
            &[0.0, 1.0],
            vec![10, 1, 11, 20, 2, 21],
            gltf::animation::Interpolation::CubicSpline,
            false,
        );
        let values: Vec<i32> = keys.iter().map(|k| k.value).collect();
        assert_eq!(values, vec![1, 2]);
        assert!(keys.iter().all(|k| k.interpolation == Interpolation::Linear));
    }

    #[test]
    fn linear_rotations_use_slerp() {
        let keys = keyframes(&[0.0], vec![0u8], gltf::animation::Interpolation::Linear, true);
        assert_eq!(keys[0].interpolation, Interpolation::SphericalLinear);
    }
}
