use approx::assert_relative_eq;
use cgmath::{Matrix4, Vector3};
use scene_ngin::{
    Input, Scene,
    components::{animation_controller::AnimationController, model_renderer::ModelRenderer},
    error::ConfigError,
    resources::animation::{Easing, Interpolation, Keyframe, sample_keyframes},
};

mod common;

fn track(interpolation: Interpolation) -> Vec<Keyframe<Vector3<f32>>> {
    vec![
        Keyframe::new(0.0, Vector3::new(0.0, 0.0, 0.0), interpolation),
        Keyframe::new(4.0, Vector3::new(4.0, 8.0, 0.0), interpolation),
    ]
}

#[test]
fn single_key_is_constant() {
    let keys = [Keyframe::new(
        3.0,
        Vector3::new(1.0, 2.0, 3.0),
        Interpolation::Step,
    )];
    for time in [0.0, 3.0, 100.0] {
        let value = sample_keyframes(&keys, time, 10.0, true, Vector3::new(0.0, 0.0, 0.0)).unwrap();
        assert_eq!(value, Vector3::new(1.0, 2.0, 3.0));
    }
}

#[test]
fn empty_track_yields_default() {
    let value = sample_keyframes::<Vector3<f32>>(&[], 1.0, 10.0, false, Vector3::new(1.0, 1.0, 1.0)).unwrap();
    assert_eq!(value, Vector3::new(1.0, 1.0, 1.0));
}

#[test]
fn linear_keys_blend_between_neighbours() {
    let keys = track(Interpolation::Linear);
    let value = sample_keyframes(&keys, 1.0, 8.0, false, Vector3::new(0.0, 0.0, 0.0)).unwrap();
    assert_relative_eq!(value, Vector3::new(1.0, 2.0, 0.0), epsilon = 1e-6);
}

#[test]
fn tail_without_repeat_holds_the_last_key() {
    let keys = track(Interpolation::Linear);
    let value = sample_keyframes(&keys, 6.0, 8.0, false, Vector3::new(0.0, 0.0, 0.0)).unwrap();
    assert_eq!(value, Vector3::new(4.0, 8.0, 0.0));
}

#[test]
fn last_key_time_yields_the_last_key() {
    let keys = track(Interpolation::Linear);
    for repeat in [false, true] {
        let value = sample_keyframes(&keys, 4.0, 8.0, repeat, Vector3::new(0.0, 0.0, 0.0)).unwrap();
        assert_relative_eq!(value, Vector3::new(4.0, 8.0, 0.0), epsilon = 1e-6);
    }
}

#[test]
fn tail_with_repeat_wraps_to_the_first_key() {
    let keys = track(Interpolation::Linear);
    // Halfway through the 4 tick gap between the last key and the end of the clip
    let value = sample_keyframes(&keys, 6.0, 8.0, true, Vector3::new(0.0, 0.0, 0.0)).unwrap();
    assert_relative_eq!(value, Vector3::new(2.0, 4.0, 0.0), epsilon = 1e-6);
}

#[test]
fn step_keys_are_rejected() {
    let keys = track(Interpolation::Step);
    let result = sample_keyframes(&keys, 1.0, 8.0, false, Vector3::new(0.0, 0.0, 0.0));
    assert!(matches!(
        result,
        Err(ConfigError::UnsupportedInterpolation {
            interpolation: Interpolation::Step,
            ..
        })
    ));
}

#[test]
fn easing_curves_keep_their_endpoints() {
    let curves = [
        Easing::Linear,
        Easing::InSine,
        Easing::OutSine,
        Easing::InOutSine,
        Easing::InQuad,
        Easing::OutQuad,
        Easing::InOutQuad,
        Easing::InCubic,
        Easing::OutCubic,
        Easing::InOutCubic,
        Easing::InExpo,
        Easing::OutExpo,
        Easing::InOutExpo,
        Easing::InCirc,
        Easing::OutCirc,
        Easing::InOutCirc,
        Easing::InBack,
        Easing::OutBack,
        Easing::InOutBack,
        Easing::InElastic,
        Easing::OutElastic,
        Easing::InOutElastic,
        Easing::InBounce,
        Easing::OutBounce,
        Easing::InOutBounce,
    ];
    for curve in curves {
        assert_relative_eq!(curve.ease(0.0), 0.0, epsilon = 1e-4);
        assert_relative_eq!(curve.ease(1.0), 1.0, epsilon = 1e-4);
    }
    assert_relative_eq!(Easing::InOutQuad.ease(0.5), 0.5, epsilon = 1e-6);
    assert_relative_eq!(Easing::InBounce.ease(0.3), 1.0 - Easing::OutBounce.ease(0.7), epsilon = 1e-6);
}

#[test]
fn bone_matrices_follow_bone_order() {
    let model = common::skinned_model();
    let instance = model.instantiate();
    let bones = instance.calculate_bone_matrices(Matrix4::from_translation(Vector3::new(5.0, 0.0, 0.0)));

    assert_eq!(bones.len(), 2);
    assert_relative_eq!(
        bones[0],
        Matrix4::from_translation(Vector3::new(5.0, 3.0, 0.0)),
        epsilon = 1e-6
    );
    assert_relative_eq!(
        bones[1],
        Matrix4::from_translation(Vector3::new(5.0, 1.0, 0.0)) * Matrix4::from_scale(2.0),
        epsilon = 1e-6
    );
}

fn animated_scene() -> (Scene, scene_ngin::ObjectId) {
    let mut scene = Scene::new();
    let model = common::skinned_model();
    let id = common::spawn_model(&mut scene, "walker", &model);
    scene.add_component::<AnimationController>(id).unwrap();
    (scene, id)
}

#[test]
fn repeating_playback_wraps_progress() {
    let (mut scene, id) = animated_scene();
    let mut input = Input::new();
    assert!(AnimationController::play_animation(&mut scene, id, "walk", true));

    for _ in 0..12 {
        scene.update(1.0, &mut input).unwrap();
    }

    let controller = scene.component::<AnimationController>(id).unwrap();
    assert!(controller.is_playing());
    assert_relative_eq!(controller.progress().unwrap(), 2.0, epsilon = 1e-5);

    let renderer = scene.component::<ModelRenderer>(id).unwrap();
    let bones = renderer
        .model
        .as_ref()
        .unwrap()
        .calculate_bone_matrices(Matrix4::from_scale(1.0));
    assert_relative_eq!(
        bones[0],
        Matrix4::from_translation(Vector3::new(2.0, 1.0, 0.0)),
        epsilon = 1e-5
    );
}

#[test]
fn finished_playback_restores_the_reference_pose() {
    let (mut scene, id) = animated_scene();
    let mut input = Input::new();
    assert!(AnimationController::play_animation(&mut scene, id, "walk", false));

    scene.update(3.0, &mut input).unwrap();
    scene.update(8.0, &mut input).unwrap();

    assert!(!scene.component::<AnimationController>(id).unwrap().is_playing());
    let instance = scene
        .component_mut::<ModelRenderer>(id)
        .unwrap()
        .model
        .as_mut()
        .unwrap();
    let knee = instance.get_part_by_name("knee").unwrap();
    assert_eq!(
        knee.transform,
        Matrix4::from_translation(Vector3::new(0.0, 2.0, 0.0))
    );
}

#[test]
fn unknown_animation_is_not_played() {
    let (mut scene, id) = animated_scene();
    assert!(!AnimationController::play_animation(&mut scene, id, "run", true));
    assert!(!scene.component::<AnimationController>(id).unwrap().is_playing());
}
