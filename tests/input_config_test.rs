use std::any::Any;
use std::path::Path;

use approx::assert_relative_eq;
use cgmath::{Vector2, Vector3};
use scene_ngin::{
    Component, ComponentContext, EngineConfig, Input, ObjectId, Resource, Scene,
    components::{FromOwner, camera::CameraController},
    config::PipelineKind,
    error::ConfigError,
    input::InputEvent,
    winit::{event::MouseButton, keyboard::KeyCode},
};

#[test]
fn key_edges_last_one_frame() {
    let mut input = Input::new();
    input.press_key(KeyCode::KeyW);
    assert!(input.is_key_pressed(KeyCode::KeyW));
    assert!(input.is_key_held(KeyCode::KeyW));

    input.step_frame();
    assert!(!input.is_key_pressed(KeyCode::KeyW));
    assert!(input.is_key_held(KeyCode::KeyW));

    input.release_key(KeyCode::KeyW);
    assert!(input.is_key_released(KeyCode::KeyW));
    input.step_frame();
    assert!(!input.is_key_released(KeyCode::KeyW));
    assert!(!input.is_key_held(KeyCode::KeyW));
}

#[test]
fn buttons_and_cursor_are_tracked() {
    let mut input = Input::new();
    input.press_button(MouseButton::Left);
    input.move_cursor(Vector2::new(10.0, 5.0));
    input.move_cursor(Vector2::new(12.0, 4.0));

    assert!(input.is_button_pressed(MouseButton::Left));
    assert_eq!(input.cursor_position(), Vector2::new(12.0, 4.0));
    assert_eq!(
        input.queued_events().last(),
        Some(&InputEvent::CursorMoved {
            relative: Vector2::new(2.0, -1.0),
            absolute: Vector2::new(12.0, 4.0),
        })
    );
    input.step_frame();
    assert!(input.queued_events().is_empty());
}

/// Claims the input queue and counts what it drains.
struct Console {
    owner: ObjectId,
    received: usize,
}

impl FromOwner for Console {
    fn from_owner(owner: ObjectId) -> Self {
        Self { owner, received: 0 }
    }
}

impl Component for Console {
    fn type_name(&self) -> &'static str {
        "Console"
    }

    fn owner(&self) -> ObjectId {
        self.owner
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn pre_update(&mut self, ctx: &mut ComponentContext<'_>, _delta: f32) -> anyhow::Result<()> {
        ctx.mark_active_input_handler();
        Ok(())
    }

    fn on_update(&mut self, ctx: &mut ComponentContext<'_>, _delta: f32) -> anyhow::Result<()> {
        self.received += ctx.take_input_events().len();
        Ok(())
    }

    fn copy_for(&self, owner: ObjectId) -> Box<dyn Component> {
        Box::new(Self { owner, received: 0 })
    }
}

/// Tries to drain the queue without ever claiming it.
struct Eavesdropper {
    owner: ObjectId,
    received: usize,
}

impl FromOwner for Eavesdropper {
    fn from_owner(owner: ObjectId) -> Self {
        Self { owner, received: 0 }
    }
}

impl Component for Eavesdropper {
    fn type_name(&self) -> &'static str {
        "Eavesdropper"
    }

    fn owner(&self) -> ObjectId {
        self.owner
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn pre_update(&mut self, ctx: &mut ComponentContext<'_>, _delta: f32) -> anyhow::Result<()> {
        self.received += ctx.take_input_events().len();
        Ok(())
    }

    fn copy_for(&self, owner: ObjectId) -> Box<dyn Component> {
        Box::new(Self { owner, received: 0 })
    }
}

#[test]
fn only_the_active_handler_drains_events() {
    let mut scene = Scene::new();
    let spy = scene.spawn("spy");
    scene.add_component::<Eavesdropper>(spy).unwrap();
    let console = scene.spawn("console");
    scene.add_component::<Console>(console).unwrap();

    let mut input = Input::new();
    input.press_key(KeyCode::KeyA);
    input.release_key(KeyCode::KeyA);
    scene.update(0.016, &mut input).unwrap();

    assert_eq!(scene.component::<Eavesdropper>(spy).unwrap().received, 0);
    assert_eq!(scene.component::<Console>(console).unwrap().received, 2);
    assert_eq!(input.active_handler(), Some(console));
    assert!(input.queued_events().is_empty());
}

#[test]
fn camera_controller_flies_forward() {
    let mut scene = Scene::new();
    let eye = scene.spawn("eye");
    scene.add_component::<CameraController>(eye).unwrap().speed = 2.0;

    let mut input = Input::new();
    input.press_key(KeyCode::KeyW);
    scene.update(0.5, &mut input).unwrap();

    assert_relative_eq!(
        scene.world_translation(eye),
        Vector3::new(0.0, 0.0, -1.0),
        epsilon = 1e-6
    );
}

#[test]
fn partial_config_files_use_defaults() {
    let config = EngineConfig::from_toml_str(
        r#"
        [window]
        title = "demo"

        [render]
        pipeline = "wireframe"
        "#,
    )
    .unwrap();
    assert_eq!(config.window.title, "demo");
    assert_eq!(config.window.width, 1280);
    assert_eq!(config.render.pipeline, PipelineKind::Wireframe);
    assert_eq!(config.render.clear_color, [0.1, 0.1, 0.1, 1.0]);
    assert_eq!(config.assets.root, "assets");

    assert_eq!(EngineConfig::from_toml_str("").unwrap(), EngineConfig::default());
}

#[test]
fn malformed_config_is_rejected() {
    let result = EngineConfig::from_toml_str("[render]\npipeline = \"raytraced\"");
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}

#[test]
fn resources_resolve_against_the_assets_root() {
    let texture = Resource::new("res:models/tree/tree.gltf")
        .parent()
        .unwrap()
        .resolve("../textures/./bark.png")
        .unwrap();
    assert_eq!(texture.path(), "res:models/textures/bark.png");
    assert_eq!(texture.extension().as_deref(), Some("png"));
    assert_eq!(
        texture.to_path(Path::new("assets")).unwrap(),
        Path::new("assets").join("models/textures/bark.png")
    );

    let top = Resource::new("res:tree.obj").parent().unwrap();
    assert_eq!(top.resolve("bark.png").unwrap().path(), "res:bark.png");
}

#[test]
fn unknown_schemes_are_rejected() {
    let resource = Resource::new("http://example.com/tree.obj");
    assert!(matches!(
        resource.to_path(Path::new("assets")),
        Err(ConfigError::UnknownResourceScheme { .. })
    ));
    assert!(resource.parent().is_err());
}
