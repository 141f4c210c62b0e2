use std::{any::Any, cell::RefCell, rc::Rc};

use approx::assert_relative_eq;
use cgmath::{Deg, Matrix4, Quaternion, Rotation3, Vector3};
use scene_ngin::{
    Component, ComponentContext, Input, ObjectId, Scene,
    components::{
        FromOwner,
        camera::Camera,
        light::{DirectionalLight, PointLight},
        model_renderer::ModelRenderer,
    },
    error::SceneError,
};

mod common;

#[test]
fn reparenting_keeps_links_consistent() {
    let mut scene = Scene::new();
    let a = scene.spawn("a");
    let b = scene.spawn("b");
    let child = scene.spawn("child");

    scene.add_child(a, child).unwrap();
    assert_eq!(scene.objects(), &[a, b]);
    assert_eq!(scene.get(a).unwrap().transform.children(), &[child]);
    assert_eq!(scene.get(child).unwrap().transform.parent(), Some(a));

    scene.add_child(b, child).unwrap();
    assert!(scene.get(a).unwrap().transform.children().is_empty());
    assert_eq!(scene.get(b).unwrap().transform.children(), &[child]);
    assert_eq!(scene.get(child).unwrap().transform.parent(), Some(b));

    assert!(scene.remove_child(b, child));
    assert!(!scene.remove_child(b, child));
    assert_eq!(scene.get(child).unwrap().transform.parent(), None);
    assert!(scene.contains(child));
    assert_eq!(scene.all_objects(), vec![a, b]);
}

#[test]
fn cycles_are_rejected() {
    let mut scene = Scene::new();
    let root = scene.spawn("root");
    let leaf = scene.create("leaf");
    scene.add_child(root, leaf).unwrap();

    assert!(matches!(
        scene.add_child(leaf, root),
        Err(SceneError::CyclicParent { .. })
    ));
    assert!(matches!(
        scene.add_child(root, root),
        Err(SceneError::CyclicParent { .. })
    ));
    assert_eq!(scene.get(leaf).unwrap().transform.parent(), Some(root));
}

#[test]
fn world_matrix_composes_parent_and_local() {
    let mut scene = Scene::new();
    let parent = scene.spawn("parent");
    let child = scene.create("child");
    scene.add_child(parent, child).unwrap();

    {
        let t = &mut scene.get_mut(parent).unwrap().transform;
        t.translation = Vector3::new(1.0, 2.0, 3.0);
        t.rotation = Quaternion::from_angle_y(Deg(90.0));
        t.scale = Vector3::new(2.0, 2.0, 2.0);
    }
    scene.get_mut(child).unwrap().transform.translation = Vector3::new(1.0, 0.0, 0.0);

    let expected = scene.world_matrix(parent) * scene.get(child).unwrap().transform.local_matrix();
    assert_relative_eq!(scene.world_matrix(child), expected, epsilon = 1e-5);
    // +X rotated a quarter turn around Y is -Z, scaled by two
    assert_relative_eq!(
        scene.world_translation(child),
        Vector3::new(1.0, 2.0, 1.0),
        epsilon = 1e-5
    );
}

#[test]
fn world_setters_invert_the_parent() {
    let mut scene = Scene::new();
    let parent = scene.spawn("parent");
    let child = scene.create("child");
    scene.add_child(parent, child).unwrap();
    {
        let t = &mut scene.get_mut(parent).unwrap().transform;
        t.translation = Vector3::new(5.0, 0.0, 0.0);
        t.rotation = Quaternion::from_angle_z(Deg(45.0));
        t.scale = Vector3::new(2.0, 4.0, 1.0);
    }

    scene.set_world_translation(child, Vector3::new(-1.0, 3.0, 2.0));
    scene.set_world_rotation(child, Quaternion::from_angle_x(Deg(30.0)));
    scene.set_world_scale(child, Vector3::new(1.0, 1.0, 1.0));

    assert_relative_eq!(
        scene.world_translation(child),
        Vector3::new(-1.0, 3.0, 2.0),
        epsilon = 1e-4
    );
    assert_relative_eq!(
        scene.world_rotation(child),
        Quaternion::from_angle_x(Deg(30.0)),
        epsilon = 1e-5
    );
    assert_relative_eq!(
        scene.world_scale(child),
        Vector3::new(1.0, 1.0, 1.0),
        epsilon = 1e-5
    );
    assert_relative_eq!(
        scene.get(child).unwrap().transform.scale,
        Vector3::new(0.5, 0.25, 1.0),
        epsilon = 1e-6
    );
}

#[test]
fn one_component_per_capability() {
    let mut scene = Scene::new();
    let id = scene.spawn("lamp");
    scene.add_component::<DirectionalLight>(id).unwrap();

    let duplicate = scene.add_component::<DirectionalLight>(id);
    assert!(matches!(duplicate, Err(SceneError::DuplicateComponent { .. })));
    // A different light still occupies the shared light capability
    let other_light = scene.add_component::<PointLight>(id);
    assert!(matches!(other_light, Err(SceneError::DuplicateComponent { .. })));

    scene.add_component::<Camera>(id).unwrap();
    assert!(scene.component::<DirectionalLight>(id).is_some());
    assert!(scene.component::<Camera>(id).is_some());
    assert!(scene.light(id).is_some());
    assert_eq!(scene.get(id).unwrap().component_count(), 2);

    assert!(scene.remove_component::<DirectionalLight>(id));
    assert!(scene.light(id).is_none());
    scene.add_component::<PointLight>(id).unwrap();
    assert!(scene.light(id).is_some());
}

#[test]
fn clones_are_independent() {
    let mut scene = Scene::new();
    let model = common::triangle_model("res:tri.obj");
    let original = common::spawn_model(&mut scene, "tree", &model);
    let branch = scene.create("branch");
    scene.add_child(original, branch).unwrap();
    scene.get_mut(original).unwrap().transform.translation = Vector3::new(1.0, 0.0, 0.0);

    let clone = scene.clone_object(original).unwrap();
    assert_eq!(scene.get(clone).unwrap().name, "tree (clone)");
    assert_eq!(scene.get(clone).unwrap().transform.parent(), None);
    assert!(!scene.objects().contains(&clone));
    assert_eq!(scene.get(clone).unwrap().transform.children().len(), 1);
    assert_ne!(scene.get(clone).unwrap().transform.children()[0], branch);

    scene.get_mut(clone).unwrap().transform.translation = Vector3::new(9.0, 0.0, 0.0);
    scene
        .component_mut::<ModelRenderer>(clone)
        .unwrap()
        .model
        .as_mut()
        .unwrap()
        .root
        .transform = Matrix4::from_scale(3.0);

    assert_eq!(
        scene.get(original).unwrap().transform.translation,
        Vector3::new(1.0, 0.0, 0.0)
    );
    let original_instance = scene
        .component::<ModelRenderer>(original)
        .unwrap()
        .model
        .as_ref()
        .unwrap();
    assert_eq!(original_instance.root.transform, Matrix4::from_scale(1.0));
}

#[test]
fn destroy_removes_the_subtree() {
    let mut scene = Scene::new();
    let root = scene.spawn("root");
    let child = scene.create("child");
    let grandchild = scene.create("grandchild");
    scene.add_child(root, child).unwrap();
    scene.add_child(child, grandchild).unwrap();
    let other = scene.spawn("other");

    scene.destroy(child);
    assert!(!scene.contains(child));
    assert!(!scene.contains(grandchild));
    assert!(scene.get(root).unwrap().transform.children().is_empty());
    assert_eq!(scene.all_objects(), vec![root, other]);
    assert_eq!(scene.find_by_name("other"), Some(other));
}

#[test]
fn removed_children_can_be_destroyed_in_one_step() {
    let mut scene = Scene::new();
    let root = scene.spawn("root");
    let child = scene.create("child");
    let grandchild = scene.create("grandchild");
    scene.add_child(root, child).unwrap();
    scene.add_child(child, grandchild).unwrap();

    assert!(!scene.remove_child_and_destroy(child, root));
    assert!(scene.remove_child_and_destroy(root, child));
    assert!(!scene.contains(child));
    assert!(!scene.contains(grandchild));
    assert_eq!(scene.all_objects(), vec![root]);
}

/// Appends `"{phase} {name}"` to a shared log from every update hook.
struct HookLog {
    owner: ObjectId,
    name: &'static str,
    log: Rc<RefCell<Vec<String>>>,
}

impl HookLog {
    fn record(&self, phase: &str) {
        self.log.borrow_mut().push(format!("{phase} {}", self.name));
    }
}

impl Component for HookLog {
    fn type_name(&self) -> &'static str {
        "HookLog"
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

    fn pre_update(&mut self, _ctx: &mut ComponentContext<'_>, _delta: f32) -> anyhow::Result<()> {
        self.record("pre");
        Ok(())
    }

    fn on_update(&mut self, _ctx: &mut ComponentContext<'_>, _delta: f32) -> anyhow::Result<()> {
        self.record("on");
        Ok(())
    }

    fn post_update(&mut self, _ctx: &mut ComponentContext<'_>, _delta: f32) -> anyhow::Result<()> {
        self.record("post");
        Ok(())
    }

    fn copy_for(&self, owner: ObjectId) -> Box<dyn Component> {
        Box::new(Self {
            owner,
            name: self.name,
            log: Rc::clone(&self.log),
        })
    }
}

#[test]
fn each_update_phase_finishes_before_the_next() {
    let mut scene = Scene::new();
    let root = scene.spawn("root");
    let child = scene.create("child");
    scene.add_child(root, child).unwrap();

    let log = Rc::new(RefCell::new(Vec::new()));
    for (id, name) in [(root, "root"), (child, "child")] {
        let log = Rc::clone(&log);
        scene
            .add_component_with(id, move |owner| HookLog { owner, name, log })
            .unwrap();
    }

    scene.update(0.016, &mut Input::new()).unwrap();

    assert_eq!(
        *log.borrow(),
        vec![
            "pre root",
            "pre child",
            "on root",
            "on child",
            "post root",
            "post child"
        ]
    );
}

/// Clones its own object on every update and keeps the outcome.
struct Spawner {
    owner: ObjectId,
    spawned: Option<Result<ObjectId, SceneError>>,
}

impl FromOwner for Spawner {
    fn from_owner(owner: ObjectId) -> Self {
        Self {
            owner,
            spawned: None,
        }
    }
}

impl Component for Spawner {
    fn type_name(&self) -> &'static str {
        "Spawner"
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

    fn on_update(&mut self, ctx: &mut ComponentContext<'_>, _delta: f32) -> anyhow::Result<()> {
        self.spawned = Some(ctx.scene.clone_object(ctx.owner()));
        Ok(())
    }

    fn copy_for(&self, owner: ObjectId) -> Box<dyn Component> {
        Box::new(Self::from_owner(owner))
    }
}

#[test]
fn objects_cannot_be_cloned_from_their_own_hooks() {
    let mut scene = Scene::new();
    let source = scene.spawn("source");
    scene.add_component::<PointLight>(source).unwrap();
    scene.add_component::<Spawner>(source).unwrap();

    scene.update(0.016, &mut Input::new()).unwrap();

    let spawner = scene.component::<Spawner>(source).unwrap();
    assert!(matches!(
        spawner.spawned,
        Some(Err(SceneError::ComponentInUse(ref name))) if name == "source"
    ));
    // Nothing partial was left behind in the arena
    assert_eq!(scene.len(), 1);

    // Outside the update every component is copied
    let clone = scene.clone_object(source).unwrap();
    assert_eq!(scene.get(clone).unwrap().component_count(), 2);
    assert!(scene.component::<Spawner>(clone).is_some());
    assert!(scene.light(clone).is_some());
}
