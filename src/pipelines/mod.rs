//! Render pipelines.
//!
//! A [`RenderPipeline`] turns a [`Scene`] seen through a camera into calls on a
//! [`RenderBackend`]. Two are built in:
//!
//! - [`default::DefaultRenderPipeline`] draws lit models, sprites and UI windows
//! - [`wireframe::WireframeRenderPipeline`] draws axes, light gizmos and mesh edges for
//!   debugging
//!
//! `basic` and `light` hold the wgpu pipeline and uniform plumbing the GPU backend
//! builds its programs from.

pub mod basic;
pub mod default;
pub mod light;
pub mod wireframe;

use cgmath::{Matrix4, Rotation};

use crate::{
    components::{
        camera::Camera,
        imgui_renderer::ImguiRenderer,
        light::{DirectionalLight, Light, PointLight, SpotLight},
        model_renderer::ModelRenderer,
    },
    config::{PipelineKind, RenderConfig},
    data_structures::{
        color::Color,
        game_object::ObjectId,
        model::{Geometry, Model},
        scene_graph::Scene,
    },
    render::{
        CameraUniform, DirectionalLightUniform, LightSet, PointLightUniform, RenderBackend,
        SpotLightUniform,
    },
    resources::AssetCache,
};

pub trait RenderPipeline {
    /// Draws one frame. `camera` is the object to view from; without one (or when it has
    /// no [`Camera`]) the scene geometry is skipped.
    fn render(
        &mut self,
        scene: &Scene,
        camera: Option<ObjectId>,
        assets: &mut AssetCache,
        backend: &mut dyn RenderBackend,
    ) -> anyhow::Result<()>;
}

/// The pipeline selected by the `[render]` configuration section.
pub fn from_config(config: &RenderConfig) -> Box<dyn RenderPipeline> {
    match config.pipeline {
        PipelineKind::Default => Box::new(default::DefaultRenderPipeline::new(Color::from(
            config.clear_color,
        ))),
        PipelineKind::Wireframe => Box::new(wireframe::WireframeRenderPipeline::new()),
    }
}

pub(crate) fn camera_uniform(scene: &Scene, camera: Option<ObjectId>) -> Option<CameraUniform> {
    let id = camera?;
    let Some(component) = scene.component::<Camera>(id) else {
        log::debug!("Object {:?} has no Camera, nothing to view from", id);
        return None;
    };
    Some(CameraUniform::new(
        component.compute_view(scene),
        component.projection_matrix(),
        scene.world_translation(id),
    ))
}

/// Gathers the lights among `objects`, in order, up to the per-kind caps.
pub(crate) fn collect_lights(scene: &Scene, objects: &[ObjectId]) -> LightSet {
    let mut lights = LightSet::new();
    let mut dropped = 0;
    for &id in objects {
        let pushed = if let Some(light) = scene.component::<DirectionalLight>(id) {
            lights.push_directional(DirectionalLightUniform {
                direction: light_direction(scene, id),
                intensity: light.intensity(),
                color: light.color().to_array(),
            })
        } else if let Some(light) = scene.component::<PointLight>(id) {
            lights.push_point(PointLightUniform {
                position: scene.world_translation(id).into(),
                intensity: light.intensity(),
                color: light.color().to_array(),
                range: light.range,
                _padding: [0.0; 3],
            })
        } else if let Some(light) = scene.component::<SpotLight>(id) {
            lights.push_spot(SpotLightUniform {
                position: scene.world_translation(id).into(),
                intensity: light.intensity(),
                direction: light_direction(scene, id),
                range: light.range,
                color: light.color().to_array(),
                angle: light.angle,
                _padding: [0.0; 3],
            })
        } else {
            true
        };
        if !pushed {
            dropped += 1;
        }
    }
    if dropped > 0 {
        log::debug!("Dropped {} lights over the per-kind limit", dropped);
    }
    lights
}

fn light_direction(scene: &Scene, id: ObjectId) -> [f32; 3] {
    scene
        .world_rotation(id)
        .rotate_vector(cgmath::Vector3::unit_z())
        .into()
}

/**
 * Walks the model rendered by `id` and calls `visit` for every geometry.
 *
 * Geometry of a skinned mesh in a model with bones is passed the object's world matrix
 * and the bone matrices resolved from it; everything else gets the accumulated part
 * transform `world * parent parts * part`.
 */
pub(crate) fn visit_model_geometries(
    scene: &Scene,
    id: ObjectId,
    visit: &mut dyn FnMut(&Model, &Geometry, Matrix4<f32>, Option<&[Matrix4<f32>]>),
) {
    let Some(instance) = scene
        .component::<ModelRenderer>(id)
        .and_then(|renderer| renderer.model.as_ref())
    else {
        return;
    };
    let model = instance.model.as_ref();
    let root = scene.world_matrix(id);
    let bones = model
        .has_bones()
        .then(|| instance.calculate_bone_matrices(root));

    instance.root.visit(root, &mut |part, transform| {
        let Some(model_part) = model.part(part.part) else {
            return;
        };
        for geometry in &model_part.geometries {
            match bones.as_deref().filter(|_| geometry.mesh.is_skinned()) {
                Some(bones) => visit(model, geometry, root, Some(bones)),
                None => visit(model, geometry, transform, None),
            }
        }
    });
}

/// Offers every [`ImguiRenderer`] among `objects` to the backend.
pub(crate) fn render_ui_windows(
    scene: &Scene,
    objects: &[ObjectId],
    backend: &mut dyn RenderBackend,
) {
    for &id in objects {
        if let Some(window) = scene.component::<ImguiRenderer>(id) {
            backend.ui_window(&window.window_name, window.render_callback.as_ref());
        }
    }
}
