//! Debug pipeline drawing edges instead of surfaces.
//!
//! - world axes as red/green/blue lines
//! - an arrow per directional light, colored by its color times intensity
//! - an outline per sprite
//! - the edges of every model mesh, one hue per object

use std::{
    collections::HashMap,
    hash::{DefaultHasher, Hash, Hasher},
    sync::Arc,
};

use cgmath::{Matrix4, SquareMatrix, Vector3};

use crate::{
    components::{
        light::{DirectionalLight, Light},
        sprite_renderer::SpriteRenderer,
    },
    data_structures::{color::Color, game_object::ObjectId, model::Mesh, scene_graph::Scene},
    pipelines::{RenderPipeline, camera_uniform, render_ui_windows, visit_model_geometries},
    render::{InstanceRaw, LineVertex, RawMatrix, RenderBackend, ShaderKind, pack_bones},
    resources::AssetCache,
};

/// Length of the drawn world axes.
const AXIS_LENGTH: f32 = 10000.0;

#[rustfmt::skip]
const LIGHT_ARROW: [[f32; 3]; 10] = [
    [0.0, 0.0, 0.0], [0.0, 0.0, -1.0],
    [0.0, 0.0, -1.0], [0.1, 0.1, -0.9],
    [0.0, 0.0, -1.0], [-0.1, 0.1, -0.9],
    [0.0, 0.0, -1.0], [0.1, -0.1, -0.9],
    [0.0, 0.0, -1.0], [-0.1, -0.1, -0.9],
];

#[rustfmt::skip]
const QUAD_OUTLINE: [[f32; 3]; 8] = [
    [0.0, 0.0, 0.0], [1.0, 0.0, 0.0],
    [1.0, 0.0, 0.0], [1.0, 1.0, 0.0],
    [1.0, 1.0, 0.0], [0.0, 1.0, 0.0],
    [0.0, 1.0, 0.0], [0.0, 0.0, 0.0],
];

struct WireBatch {
    mesh: Arc<Mesh>,
    skinned: bool,
    instances: Vec<InstanceRaw>,
    colors: Vec<Color>,
    bones: Vec<RawMatrix>,
}

#[derive(Debug, Default)]
pub struct WireframeRenderPipeline;

impl WireframeRenderPipeline {
    pub fn new() -> Self {
        Self
    }
}

impl RenderPipeline for WireframeRenderPipeline {
    fn render(
        &mut self,
        scene: &Scene,
        camera: Option<ObjectId>,
        _assets: &mut AssetCache,
        backend: &mut dyn RenderBackend,
    ) -> anyhow::Result<()> {
        backend.begin_frame(Color::BLACK)?;
        let Some(camera) = camera_uniform(scene, camera) else {
            return backend.end_frame();
        };
        let objects = scene.all_objects();
        let identity = [InstanceRaw::from_matrix(Matrix4::identity())];

        backend.bind_shader(ShaderKind::Line)?;
        backend.set_camera(&camera);
        backend.draw_lines(&axes(), &identity);

        for &id in &objects {
            if let Some(light) = scene.component::<DirectionalLight>(id) {
                let color = light.color().scaled(light.intensity());
                backend.draw_lines(
                    &lines(&LIGHT_ARROW, color),
                    &[InstanceRaw::from_matrix(scene.world_matrix(id))],
                );
            }
        }

        for &id in &objects {
            let Some(renderer) = scene.component::<SpriteRenderer>(id) else {
                continue;
            };
            let Some(sprite) = renderer.sprite.as_ref() else {
                continue;
            };
            let transform = scene.world_matrix(id)
                * Matrix4::from_nonuniform_scale(
                    renderer.stretch.x * sprite.aspect_ratio(),
                    renderer.stretch.y,
                    1.0,
                );
            backend.draw_lines(
                &lines(&QUAD_OUTLINE, object_color(id)),
                &[InstanceRaw::from_matrix(transform)],
            );
        }

        let batches = collect_wire_batches(scene, &objects);
        if !batches.is_empty() {
            backend.bind_shader(ShaderKind::Wireframe)?;
            backend.set_camera(&camera);
            for batch in &batches {
                let bones = batch.skinned.then_some(batch.bones.as_slice());
                backend.draw_wireframe_instanced(&batch.mesh, &batch.instances, &batch.colors, bones);
            }
        }

        render_ui_windows(scene, &objects, backend);
        backend.end_frame()
    }
}

fn collect_wire_batches(scene: &Scene, objects: &[ObjectId]) -> Vec<WireBatch> {
    let mut batches: Vec<WireBatch> = Vec::new();
    let mut lookup = HashMap::new();
    for &id in objects {
        let color = object_color(id);
        visit_model_geometries(scene, id, &mut |_, geometry, transform, bones| {
            let key = (geometry.mesh.id(), bones.is_some());
            let index = *lookup.entry(key).or_insert_with(|| {
                batches.push(WireBatch {
                    mesh: Arc::clone(&geometry.mesh),
                    skinned: bones.is_some(),
                    instances: Vec::new(),
                    colors: Vec::new(),
                    bones: Vec::new(),
                });
                batches.len() - 1
            });
            let batch = &mut batches[index];
            batch.instances.push(InstanceRaw::from_matrix(transform));
            batch.colors.push(color);
            if let Some(bones) = bones {
                pack_bones(bones, &mut batch.bones);
            }
        });
    }
    batches
}

fn axes() -> Vec<LineVertex> {
    [
        (Vector3::unit_x(), Color::new(1.0, 0.0, 0.0, 1.0)),
        (Vector3::unit_y(), Color::new(0.0, 1.0, 0.0, 1.0)),
        (Vector3::unit_z(), Color::new(0.0, 0.0, 1.0, 1.0)),
    ]
    .into_iter()
    .flat_map(|(axis, color)| {
        [
            LineVertex::new(Vector3::new(0.0, 0.0, 0.0), color),
            LineVertex::new(axis * AXIS_LENGTH, color),
        ]
    })
    .collect()
}

fn lines(points: &[[f32; 3]], color: Color) -> Vec<LineVertex> {
    points
        .iter()
        .map(|&p| LineVertex::new(p.into(), color))
        .collect()
}

/// A fully saturated color that stays the same for an object across frames.
pub fn object_color(id: ObjectId) -> Color {
    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    let hue = (hasher.finish() % 3600) as f32 / 10.0;
    Color::from_hsv(hue, 1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        components::camera::Camera,
        render::{RecordingBackend, RenderCall},
    };

    #[test]
    fn nothing_is_drawn_without_a_camera() {
        let scene = Scene::new();
        let mut backend = RecordingBackend::new();
        WireframeRenderPipeline::new()
            .render(&scene, None, &mut AssetCache::default(), &mut backend)
            .unwrap();
        assert_eq!(
            backend.calls,
            vec![RenderCall::BeginFrame(Color::BLACK), RenderCall::EndFrame]
        );
    }

    #[test]
    fn axes_and_light_gizmos_are_drawn() {
        let mut scene = Scene::new();
        let camera = scene.spawn("camera");
        scene.add_component::<Camera>(camera).unwrap();
        let sun = scene.spawn("sun");
        scene.add_component::<DirectionalLight>(sun).unwrap().intensity = 0.5;

        let mut backend = RecordingBackend::new();
        WireframeRenderPipeline::new()
            .render(&scene, Some(camera), &mut AssetCache::default(), &mut backend)
            .unwrap();

        let lines: Vec<&Vec<LineVertex>> = backend
            .calls
            .iter()
            .filter_map(|call| match call {
                RenderCall::DrawLines { vertices, .. } => Some(vertices),
                _ => None,
            })
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), 6);
        assert_eq!(lines[1].len(), LIGHT_ARROW.len());
        assert_eq!(lines[1][0].color, [0.5, 0.5, 0.5, 1.0]);
    }

    #[test]
    fn object_colors_are_stable() {
        let mut scene = Scene::new();
        let id = scene.spawn("a");
        assert_eq!(object_color(id), object_color(id));
    }
}
