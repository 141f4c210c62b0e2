use std::sync::Arc;

use cgmath::{Deg, Quaternion, Rotation3, Vector3};
use scene_ngin::{
    Color, Scene,
    components::{
        camera::Camera,
        light::{DirectionalLight, SpotLight},
        model_renderer::ModelRenderer,
        sprite_renderer::SpriteRenderer,
    },
    error::SerializationError,
    resources::AssetCache,
    serialization::ComponentRegistry,
};

mod common;

fn sample_scene(assets: &mut AssetCache) -> Scene {
    let mut scene = Scene::new();

    let model = common::triangle_model("res:props/crate.obj");
    assets.insert_model(Arc::clone(&model));
    let prop = common::spawn_model(&mut scene, "crate", &model);
    {
        let t = &mut scene.get_mut(prop).unwrap().transform;
        t.translation = Vector3::new(1.0, 2.0, 3.0);
        t.scale = Vector3::new(2.0, 2.0, 2.0);
        t.rotation = Quaternion::from_angle_y(Deg(30.0));
    }

    let lamp = scene.create("lamp");
    scene.add_child(prop, lamp).unwrap();
    {
        let light = scene.add_component::<SpotLight>(lamp).unwrap();
        light.color = Color::new(1.0, 0.5, 0.25, 1.0);
        light.intensity = 3.0;
        light.range = 20.0;
        light.angle = 35.0;
    }

    let sun = scene.spawn("sun");
    scene.add_component::<DirectionalLight>(sun).unwrap().intensity = 0.5;

    let eye = common::spawn_camera(&mut scene);
    {
        let camera = scene.component_mut::<Camera>(eye).unwrap();
        camera.fov = 75.0;
        camera.near = 0.5;
        camera.far = 250.0;
    }
    scene
}

#[test]
fn scenes_survive_a_round_trip() {
    let mut assets = AssetCache::default();
    let scene = sample_scene(&mut assets);
    let bytes = scene.serialize();

    let restored = Scene::deserialize(&bytes, &ComponentRegistry::with_builtins(), &mut assets).unwrap();

    let names: Vec<&str> = restored
        .all_objects()
        .into_iter()
        .map(|id| restored.get(id).unwrap().name.as_str())
        .collect();
    assert_eq!(names, vec!["crate", "lamp", "sun", "camera"]);

    let prop = restored.find_by_name("crate").unwrap();
    let transform = &restored.get(prop).unwrap().transform;
    assert_eq!(transform.translation, Vector3::new(1.0, 2.0, 3.0));
    assert_eq!(transform.scale, Vector3::new(2.0, 2.0, 2.0));
    assert_eq!(transform.rotation, Quaternion::from_angle_y(Deg(30.0)));
    let instance = restored
        .component::<ModelRenderer>(prop)
        .unwrap()
        .model
        .as_ref()
        .unwrap();
    assert_eq!(instance.model.resource.path(), "res:props/crate.obj");

    let lamp = restored.find_by_name("lamp").unwrap();
    assert_eq!(restored.get(lamp).unwrap().transform.parent(), Some(prop));
    let spot = restored.component::<SpotLight>(lamp).unwrap();
    assert_eq!(spot.color, Color::new(1.0, 0.5, 0.25, 1.0));
    assert_eq!((spot.intensity, spot.range, spot.angle), (3.0, 20.0, 35.0));

    let sun = restored.find_by_name("sun").unwrap();
    assert_eq!(restored.component::<DirectionalLight>(sun).unwrap().intensity, 0.5);

    let eye = restored.find_by_name("camera").unwrap();
    let camera = restored.component::<Camera>(eye).unwrap();
    assert_eq!((camera.fov, camera.near, camera.far), (75.0, 0.5, 250.0));
}

#[test]
fn reserializing_is_stable() {
    let mut assets = AssetCache::default();
    let bytes = sample_scene(&mut assets).serialize();
    let restored = Scene::deserialize(&bytes, &ComponentRegistry::with_builtins(), &mut assets).unwrap();
    assert_eq!(restored.serialize(), bytes);
}

#[test]
fn runtime_only_components_are_skipped() {
    let mut scene = Scene::new();
    let icon = scene.spawn("icon");
    scene.add_component::<SpriteRenderer>(icon).unwrap();

    let restored = Scene::deserialize(
        &scene.serialize(),
        &ComponentRegistry::with_builtins(),
        &mut AssetCache::default(),
    )
    .unwrap();
    let icon = restored.find_by_name("icon").unwrap();
    assert_eq!(restored.get(icon).unwrap().component_count(), 0);
}

#[test]
fn unknown_component_types_fail() {
    let mut assets = AssetCache::default();
    let bytes = sample_scene(&mut assets).serialize();

    let mut registry = ComponentRegistry::empty();
    registry.register::<ModelRenderer>("ModelRenderer");
    let result = Scene::deserialize(&bytes, &registry, &mut assets);
    assert!(matches!(
        result,
        Err(SerializationError::UnknownComponent(name)) if name == "SpotLight"
    ));
}

#[test]
fn truncated_scenes_fail() {
    let mut assets = AssetCache::default();
    let bytes = sample_scene(&mut assets).serialize();
    let result = Scene::deserialize(
        &bytes[..bytes.len() - 2],
        &ComponentRegistry::with_builtins(),
        &mut assets,
    );
    assert!(matches!(result, Err(SerializationError::UnexpectedEof { .. })));
}
