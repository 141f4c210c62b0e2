use std::{
    io::{BufReader, Cursor},
    sync::Arc,
};

use cgmath::{Matrix4, SquareMatrix, Vector2, Vector3};

use crate::{
    data_structures::{
        color::Color,
        model::{Geometry, Material, Mesh, Model, ModelPart, ModelVertex},
    },
    resources::{AssetCache, Resource},
};

/**
 * Obj files don't come with tangents and bitangents so they have to be calculated for
 * normal maps to work correctly.
 *
 * Every triangle contributes its tangent frame to its three vertices and the sums are
 * averaged. Vertices outside any triangle keep a zero frame.
 */
pub fn compute_tangents(vertices: &mut [ModelVertex], indices: &[u32]) {
    let mut triangles_included = vec![0u32; vertices.len()];

    for c in indices.chunks_exact(3) {
        let [i0, i1, i2] = [c[0] as usize, c[1] as usize, c[2] as usize];
        if i0 >= vertices.len() || i1 >= vertices.len() || i2 >= vertices.len() {
            continue;
        }
        let (v0, v1, v2) = (vertices[i0], vertices[i1], vertices[i2]);

        let pos0: Vector3<f32> = v0.position.into();
        let pos1: Vector3<f32> = v1.position.into();
        let pos2: Vector3<f32> = v2.position.into();

        let uv0: Vector2<f32> = v0.tex_coords.into();
        let uv1: Vector2<f32> = v1.tex_coords.into();
        let uv2: Vector2<f32> = v2.tex_coords.into();

        let delta_pos1 = pos1 - pos0;
        let delta_pos2 = pos2 - pos0;
        let delta_uv1 = uv1 - uv0;
        let delta_uv2 = uv2 - uv0;

        //     delta_pos1 = delta_uv1.x * T + delta_uv1.y * B
        //     delta_pos2 = delta_uv2.x * T + delta_uv2.y * B
        let det = delta_uv1.x * delta_uv2.y - delta_uv1.y * delta_uv2.x;
        if det.abs() <= f32::EPSILON {
            continue;
        }
        let r = 1.0 / det;
        let tangent = (delta_pos1 * delta_uv2.y - delta_pos2 * delta_uv1.y) * r;
        // Flipped for right-handed normal maps in wgpu's texture coordinate system
        let bitangent = (delta_pos2 * delta_uv1.x - delta_pos1 * delta_uv2.x) * -r;

        for i in [i0, i1, i2] {
            let v = &mut vertices[i];
            v.tangent = (tangent + Vector3::from(v.tangent)).into();
            v.bitangent = (bitangent + Vector3::from(v.bitangent)).into();
            triangles_included[i] += 1;
        }
    }

    for (v, n) in vertices.iter_mut().zip(triangles_included) {
        if n == 0 {
            continue;
        }
        let denom = 1.0 / n as f32;
        v.tangent = (Vector3::from(v.tangent) * denom).into();
        v.bitangent = (Vector3::from(v.bitangent) * denom).into();
    }
}

fn convert_mesh(model: &tobj::Model) -> Mesh {
    let m = &model.mesh;
    let mut vertices = (0..m.positions.len() / 3)
        .map(|i| ModelVertex {
            position: [m.positions[i * 3], m.positions[i * 3 + 1], m.positions[i * 3 + 2]],
            tex_coords: [
                m.texcoords.get(i * 2).copied().unwrap_or(0.0),
                1.0 - m.texcoords.get(i * 2 + 1).copied().unwrap_or(0.0),
            ],
            normal: [
                m.normals.get(i * 3).copied().unwrap_or(0.0),
                m.normals.get(i * 3 + 1).copied().unwrap_or(0.0),
                m.normals.get(i * 3 + 2).copied().unwrap_or(0.0),
            ],
            tangent: [0.0; 3],
            bitangent: [0.0; 3],
        })
        .collect::<Vec<_>>();
    compute_tangents(&mut vertices, &m.indices);
    Mesh::new(model.name.clone(), vertices, m.indices.clone())
}

fn color(rgb: Option<[f32; 3]>, fallback: Color) -> Color {
    rgb.map_or(fallback, |[r, g, b]| Color::new(r, g, b, 1.0))
}

fn convert_material(material: &tobj::Material, base: &Resource, assets: &mut AssetCache) -> Material {
    let mut texture = |name: &Option<String>| {
        let name = name.as_ref()?;
        let resource = base.resolve(name).ok()?;
        assets.load_image(&resource)
    };

    let mut result = Material::new(material.name.clone());
    result.ambient_color = color(material.ambient, Color::BLACK);
    result.diffuse_color = color(material.diffuse, Color::WHITE);
    result.specular_color = color(material.specular, Color::BLACK);
    result.opacity = material.dissolve.unwrap_or(1.0);
    result.shininess = material.shininess.unwrap_or(32.0);
    result.ambient_texture = texture(&material.ambient_texture);
    result.diffuse_texture = texture(&material.diffuse_texture);
    result.specular_texture = texture(&material.specular_texture);
    result.normal_texture = texture(&material.normal_texture)
        .map(|image| Arc::new((*image).clone().linear()));
    result
}

/// Loads a Wavefront OBJ file. Each object becomes a child part of an identity root.
pub fn load_model_obj(resource: &Resource, assets: &mut AssetCache) -> anyhow::Result<Model> {
    let obj_text = resource.read_string(assets.root())?;
    let mut obj_reader = BufReader::new(Cursor::new(obj_text));
    let base = resource.parent()?;
    let root = assets.root().to_path_buf();

    let (models, obj_materials) = tobj::load_obj_buf(
        &mut obj_reader,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
        |p| {
            let mtl = base
                .resolve(&p.to_string_lossy())
                .map_err(|_| tobj::LoadError::OpenFileFailed)?;
            match mtl.read_string(&root) {
                Ok(text) => tobj::load_mtl_buf(&mut BufReader::new(Cursor::new(text))),
                Err(e) => {
                    log::warn!("Material library {} could not be loaded: {:#}", mtl, e);
                    Err(tobj::LoadError::OpenFileFailed)
                }
            }
        },
    )?;

    let materials: Vec<Arc<Material>> = obj_materials
        .unwrap_or_else(|e| {
            log::warn!("{} has no usable materials: {}", resource, e);
            Vec::new()
        })
        .iter()
        .map(|m| Arc::new(convert_material(m, &base, assets)))
        .collect();
    let fallback = Arc::new(Material::new("default"));

    let mut parts = vec![ModelPart::new("root", Matrix4::identity())];
    for model in &models {
        let material = model
            .mesh
            .material_id
            .and_then(|idx| materials.get(idx))
            .unwrap_or(&fallback);
        let mut part = ModelPart::new(model.name.clone(), Matrix4::identity());
        part.geometries.push(Geometry {
            mesh: Arc::new(convert_mesh(model)),
            material: Arc::clone(material),
        });
        let index = parts.len();
        parts.push(part);
        parts[0].children.push(index);
    }

    Ok(Model::new(resource.clone(), parts, Vec::new(), Vec::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex(position: [f32; 3], tex_coords: [f32; 2]) -> ModelVertex {
        ModelVertex {
            position,
            tex_coords,
            ..Default::default()
        }
    }

    #[test]
    fn tangents_follow_uv_axes() {
        let mut vertices = vec![
            vertex([0.0, 0.0, 0.0], [0.0, 0.0]),
            vertex([1.0, 0.0, 0.0], [1.0, 0.0]),
            vertex([0.0, 1.0, 0.0], [0.0, 1.0]),
        ];
        compute_tangents(&mut vertices, &[0, 1, 2]);
        for v in &vertices {
            assert_eq!(v.tangent, [1.0, 0.0, 0.0]);
            assert_eq!(v.bitangent, [0.0, -1.0, 0.0]);
        }
    }

    #[test]
    fn degenerate_uvs_leave_zero_frame() {
        let mut vertices = vec![
            vertex([0.0, 0.0, 0.0], [0.5, 0.5]),
            vertex([1.0, 0.0, 0.0], [0.5, 0.5]),
            vertex([0.0, 1.0, 0.0], [0.5, 0.5]),
            vertex([5.0, 5.0, 5.0], [0.0, 0.0]),
        ];
        compute_tangents(&mut vertices, &[0, 1, 2]);
        assert!(vertices.iter().all(|v| v.tangent == [0.0; 3]));
    }
}
