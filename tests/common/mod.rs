//! Scene and asset builders shared by the integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use cgmath::{Matrix4, SquareMatrix, Vector3};
use scene_ngin::{
    Scene,
    components::{camera::Camera, model_renderer::ModelRenderer},
    data_structures::{
        game_object::ObjectId,
        model::{Geometry, Material, Mesh, Model, ModelPart, ModelVertex, SkinVertex},
    },
    resources::{
        Resource,
        animation::{Animation, AnimationChannel, Interpolation, Keyframe},
    },
};

pub fn vertex(position: [f32; 3]) -> ModelVertex {
    ModelVertex {
        position,
        tex_coords: [0.0, 0.0],
        normal: [0.0, 0.0, 1.0],
        tangent: [1.0, 0.0, 0.0],
        bitangent: [0.0, 1.0, 0.0],
    }
}

pub fn triangle(name: &str) -> Mesh {
    Mesh::new(
        name,
        vec![
            vertex([0.0, 0.0, 0.0]),
            vertex([1.0, 0.0, 0.0]),
            vertex([0.0, 1.0, 0.0]),
        ],
        vec![0, 1, 2],
    )
}

/// A model whose root part carries one triangle.
pub fn triangle_model(path: &str) -> Arc<Model> {
    let mut root = ModelPart::new("root", Matrix4::identity());
    root.geometries.push(Geometry {
        mesh: Arc::new(triangle("triangle")),
        material: Arc::new(Material::new("white")),
    });
    Arc::new(Model::new(Resource::new(path), vec![root], Vec::new(), Vec::new()))
}

/// `root -> hip -> knee`, with bones `knee` then `hip` and a skinned triangle on the root.
pub fn skinned_model() -> Arc<Model> {
    let mut root = ModelPart::new("root", Matrix4::identity());
    root.children.push(1);
    let skin = vec![
        SkinVertex {
            bone_ids: [0, 0, 0, 0],
            weights: [1.0, 0.0, 0.0, 0.0],
        };
        3
    ];
    root.geometries.push(Geometry {
        mesh: Arc::new(triangle("skinned").with_skin(skin)),
        material: Arc::new(Material::new("skin")),
    });
    let mut hip = ModelPart::new("hip", Matrix4::from_translation(Vector3::new(0.0, 1.0, 0.0)));
    hip.children.push(2);
    let knee = ModelPart::new("knee", Matrix4::from_translation(Vector3::new(0.0, 2.0, 0.0)));

    let walk = Animation {
        name: "walk".to_string(),
        duration: 10.0,
        ticks_per_second: 1.0,
        channels: vec![AnimationChannel {
            node_name: "knee".to_string(),
            translations: vec![
                Keyframe::new(0.0, Vector3::new(0.0, 0.0, 0.0), Interpolation::Linear),
                Keyframe::new(10.0, Vector3::new(10.0, 0.0, 0.0), Interpolation::Linear),
            ],
            ..Default::default()
        }],
    };

    Arc::new(Model::new(
        Resource::new("res:skinned.gltf"),
        vec![root, hip, knee],
        vec![Arc::new(walk)],
        vec![
            ("knee".to_string(), Matrix4::identity()),
            ("hip".to_string(), Matrix4::from_scale(2.0)),
        ],
    ))
}

pub fn spawn_model(scene: &mut Scene, name: &str, model: &Arc<Model>) -> ObjectId {
    let id = scene.spawn(name);
    scene
        .add_component::<ModelRenderer>(id)
        .expect("fresh object")
        .set_model(model);
    id
}

pub fn spawn_camera(scene: &mut Scene) -> ObjectId {
    let id = scene.spawn("camera");
    scene.add_component::<Camera>(id).expect("fresh object");
    id
}
