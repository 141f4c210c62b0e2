#[cfg(feature = "integration-tests")]
mod common;

/// Opens a real window and drives a few frames of a lit, animated scene through the wgpu
/// backend. Needs a display and a GPU adapter.
#[test]
#[cfg(feature = "integration-tests")]
fn renders_frames_through_the_gpu_backend() {
    use cgmath::Vector3;
    use scene_ngin::{
        EngineConfig,
        components::{
            animation_controller::AnimationController,
            light::{DirectionalLight, PointLight},
        },
        flow::run_frames,
    };

    let config = EngineConfig::from_toml_str(
        r#"
        [window]
        title = "frames"
        width = 320
        height = 240
        "#,
    )
    .unwrap();

    run_frames(config, 5, |viewport, assets| {
        let scene = &mut viewport.scene;
        let tree = common::triangle_model("res:tree.obj");
        assets.insert_model(tree.clone());
        common::spawn_model(scene, "left", &tree);
        let right = common::spawn_model(scene, "right", &tree);
        scene.get_mut(right).unwrap().transform.translation = Vector3::new(2.0, 0.0, 0.0);

        let walker = common::spawn_model(scene, "walker", &common::skinned_model());
        scene.add_component::<AnimationController>(walker)?;
        AnimationController::play_animation(scene, walker, "walk", true);

        let sun = scene.spawn("sun");
        scene.add_component::<DirectionalLight>(sun)?;
        let lamp = scene.spawn("lamp");
        scene.add_component::<PointLight>(lamp)?;

        let eye = common::spawn_camera(scene);
        scene.get_mut(eye).unwrap().transform.translation = Vector3::new(0.0, 1.0, 5.0);
        viewport.set_camera(Some(eye));
        Ok(())
    })
    .unwrap();
}
