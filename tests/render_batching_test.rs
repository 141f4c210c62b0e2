use std::sync::Arc;

use approx::assert_relative_eq;
use cgmath::{Matrix4, Vector2, Vector3};
use scene_ngin::{
    Scene, Viewport,
    components::{
        imgui_renderer::ImguiRenderer,
        light::{DirectionalLight, PointLight},
        sprite_renderer::SpriteRenderer,
    },
    data_structures::{model::MAX_BONES, sprite::ATLAS_SIZE},
    pipelines::{default::DefaultRenderPipeline, wireframe::WireframeRenderPipeline},
    render::{RecordingBackend, RenderCall, ShaderKind},
    resources::{AssetCache, Resource, texture::ImageData},
};

mod common;

fn render(viewport: &mut Viewport, assets: &mut AssetCache) -> RecordingBackend {
    let mut backend = RecordingBackend::new();
    viewport.render(assets, &mut backend).unwrap();
    backend
}

#[test]
fn shared_geometry_becomes_one_instanced_draw() {
    let mut viewport = Viewport::default();
    let model = common::triangle_model("res:tree.obj");
    let first = common::spawn_model(&mut viewport.scene, "first", &model);
    let second = common::spawn_model(&mut viewport.scene, "second", &model);
    viewport.scene.get_mut(second).unwrap().transform.translation = Vector3::new(3.0, 0.0, 0.0);
    common::spawn_camera(&mut viewport.scene);

    let backend = render(&mut viewport, &mut AssetCache::default());

    let draws: Vec<_> = backend.mesh_draws().collect();
    assert_eq!(draws.len(), 1);
    let RenderCall::DrawMesh {
        mesh,
        instances,
        bones,
    } = draws[0]
    else {
        unreachable!()
    };
    assert_eq!(*mesh, model.root().geometries[0].mesh.id());
    assert_eq!(bones, &None);
    assert_eq!(instances.len(), 2);
    assert_relative_eq!(instances[0].model(), viewport.scene.world_matrix(first));
    assert_relative_eq!(
        instances[1].model(),
        Matrix4::from_translation(Vector3::new(3.0, 0.0, 0.0))
    );

    assert!(matches!(backend.calls.first(), Some(RenderCall::BeginFrame(_))));
    assert_eq!(backend.calls.last(), Some(&RenderCall::EndFrame));
    let shader = backend
        .calls
        .iter()
        .position(|call| *call == RenderCall::BindShader(ShaderKind::Lit))
        .unwrap();
    let draw = backend
        .calls
        .iter()
        .position(|call| matches!(call, RenderCall::DrawMesh { .. }))
        .unwrap();
    assert!(shader < draw);
}

#[test]
fn distinct_models_get_their_own_draws() {
    let mut viewport = Viewport::default();
    let a = common::triangle_model("res:a.obj");
    let b = common::triangle_model("res:b.obj");
    common::spawn_model(&mut viewport.scene, "a", &a);
    common::spawn_model(&mut viewport.scene, "b", &b);
    common::spawn_model(&mut viewport.scene, "a again", &a);
    common::spawn_camera(&mut viewport.scene);

    let backend = render(&mut viewport, &mut AssetCache::default());

    let counts: Vec<usize> = backend
        .mesh_draws()
        .map(|call| match call {
            RenderCall::DrawMesh { instances, .. } => instances.len(),
            _ => 0,
        })
        .collect();
    assert_eq!(counts, vec![2, 1]);
}

#[test]
fn skinned_meshes_carry_a_full_bone_block_per_instance() {
    let mut viewport = Viewport::default();
    let model = common::skinned_model();
    common::spawn_model(&mut viewport.scene, "left", &model);
    let right = common::spawn_model(&mut viewport.scene, "right", &model);
    viewport.scene.get_mut(right).unwrap().transform.translation = Vector3::new(4.0, 0.0, 0.0);
    common::spawn_camera(&mut viewport.scene);

    let backend = render(&mut viewport, &mut AssetCache::default());

    let draws: Vec<_> = backend.mesh_draws().collect();
    assert_eq!(draws.len(), 1);
    let RenderCall::DrawMesh {
        instances, bones, ..
    } = draws[0]
    else {
        unreachable!()
    };
    assert_eq!(instances.len(), 2);
    assert_eq!(*bones, Some(2 * MAX_BONES));
    // Skinned geometry is placed at the object itself, the bones carry the part offsets
    assert_relative_eq!(
        instances[1].model(),
        Matrix4::from_translation(Vector3::new(4.0, 0.0, 0.0))
    );
}

#[test]
fn lights_are_collected_in_scene_order() {
    let mut viewport = Viewport::default();
    common::spawn_model(&mut viewport.scene, "tree", &common::triangle_model("res:tree.obj"));
    let sun = viewport.scene.spawn("sun");
    viewport.scene.add_component::<DirectionalLight>(sun).unwrap();
    let lamp = viewport.scene.spawn("lamp");
    viewport.scene.get_mut(lamp).unwrap().transform.translation = Vector3::new(0.0, 5.0, 0.0);
    viewport.scene.add_component::<PointLight>(lamp).unwrap().range = 12.0;
    common::spawn_camera(&mut viewport.scene);

    let backend = render(&mut viewport, &mut AssetCache::default());

    let lights = backend
        .calls
        .iter()
        .find_map(|call| match call {
            RenderCall::SetLights(lights) => Some(lights.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(lights.directional.len(), 1);
    assert_relative_eq!(
        Vector3::from(lights.directional[0].direction),
        Vector3::new(0.0, 0.0, 1.0),
        epsilon = 1e-6
    );
    assert_eq!(lights.point.len(), 1);
    assert_eq!(lights.point[0].position, [0.0, 5.0, 0.0]);
    assert_eq!(lights.point[0].range, 12.0);
    assert!(lights.spot.is_empty());
}

#[test]
fn sprites_are_drawn_per_atlas() {
    let mut viewport = Viewport::default();
    let mut assets = AssetCache::default();
    let sheet_path = Resource::new("res:ui/icons.png");
    assets.insert_image(&sheet_path, Arc::new(ImageData::solid(64, 32, [255, 0, 0, 255])));
    let sheet = assets.spritesheet(&sheet_path, Vector2::new(64, 32));

    let icon = viewport.scene.spawn("icon");
    {
        let renderer = viewport.scene.add_component::<SpriteRenderer>(icon).unwrap();
        renderer.sprite = Some(scene_ngin::data_structures::sprite::Sprite::new(
            Arc::clone(&sheet),
            Vector2::new(16, 16),
            Vector2::new(16, 0),
        ));
        renderer.stretch = Vector2::new(2.0, 1.0);
    }
    let banner = viewport.scene.spawn("banner");
    viewport
        .scene
        .add_component::<SpriteRenderer>(banner)
        .unwrap()
        .sprite = Some(sheet.full());
    common::spawn_camera(&mut viewport.scene);

    let backend = render(&mut viewport, &mut assets);

    let uploads: Vec<_> = backend
        .calls
        .iter()
        .filter(|call| matches!(call, RenderCall::UploadAtlasRegion { .. }))
        .collect();
    assert_eq!(uploads.len(), 1);
    assert!(backend.calls.contains(&RenderCall::BindShader(ShaderKind::Sprite)));

    let batches: Vec<_> = backend.sprite_draws().collect();
    assert_eq!(batches.len(), 1);
    let sprites = batches[0];
    assert_eq!(sprites.len(), 2);

    let texel = 1.0 / ATLAS_SIZE as f32;
    assert_relative_eq!(sprites[0].uv_offset[0], 16.0 * texel);
    assert_relative_eq!(sprites[0].uv_size[0], 16.0 * texel);
    assert_relative_eq!(
        Matrix4::from(sprites[0].model),
        Matrix4::from_nonuniform_scale(2.0, 1.0, 1.0)
    );
    assert_relative_eq!(sprites[1].uv_size[0], 64.0 * texel);
    assert_relative_eq!(sprites[1].uv_size[1], 32.0 * texel);

    // Already placed sheets are not uploaded again
    let backend = render(&mut viewport, &mut assets);
    assert!(
        !backend
            .calls
            .iter()
            .any(|call| matches!(call, RenderCall::UploadAtlasRegion { .. }))
    );
}

#[test]
fn ui_windows_render_without_a_camera() {
    let mut viewport = Viewport::default();
    let hud = viewport.scene.spawn("hud");
    viewport
        .scene
        .insert_component(hud, Box::new(ImguiRenderer::new(hud, "stats", || {})))
        .unwrap();
    common::spawn_model(&mut viewport.scene, "tree", &common::triangle_model("res:tree.obj"));

    let backend = render(&mut viewport, &mut AssetCache::default());

    assert_eq!(backend.mesh_draws().count(), 0);
    assert!(backend.calls.contains(&RenderCall::UiWindow("stats".to_string())));
}

#[test]
fn wireframe_pipeline_outlines_shared_meshes_once() {
    let mut scene = Scene::new();
    let model = common::triangle_model("res:tree.obj");
    let a = common::spawn_model(&mut scene, "a", &model);
    let b = common::spawn_model(&mut scene, "b", &model);
    common::spawn_camera(&mut scene);
    let mut viewport = Viewport::new(scene, Box::new(WireframeRenderPipeline::new()));

    let backend = render(&mut viewport, &mut AssetCache::default());

    let wires: Vec<_> = backend
        .calls
        .iter()
        .filter_map(|call| match call {
            RenderCall::DrawWireframe {
                instances, colors, ..
            } => Some((instances.len(), colors.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(wires.len(), 1);
    assert_eq!(wires[0].0, 2);
    assert_eq!(
        wires[0].1,
        vec![
            scene_ngin::pipelines::wireframe::object_color(a),
            scene_ngin::pipelines::wireframe::object_color(b)
        ]
    );
}

#[test]
fn default_pipeline_clears_with_its_color() {
    let pipeline = DefaultRenderPipeline::new(scene_ngin::Color::new(0.2, 0.3, 0.4, 1.0));
    let mut viewport = Viewport::new(Scene::new(), Box::new(pipeline));
    let backend = render(&mut viewport, &mut AssetCache::default());
    assert_eq!(
        backend.calls,
        vec![
            RenderCall::BeginFrame(scene_ngin::Color::new(0.2, 0.3, 0.4, 1.0)),
            RenderCall::EndFrame
        ]
    );
}
