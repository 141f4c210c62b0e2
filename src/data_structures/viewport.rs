use cgmath::Vector2;

use crate::{
    components::camera::Camera,
    data_structures::{game_object::ObjectId, scene_graph::Scene},
    input::Input,
    pipelines::{RenderPipeline, default::DefaultRenderPipeline},
    render::RenderBackend,
    resources::AssetCache,
};

/// A scene together with the pipeline that draws it and the camera it is seen through.
///
/// The active camera is stored as an index into [`Viewport::cameras`], which is recomputed
/// on every access, so adding or removing cameras may shift which one is active.
pub struct Viewport {
    pub scene: Scene,
    pub pipeline: Box<dyn RenderPipeline>,
    pub size: Vector2<u32>,
    active_camera_index: i32,
}

impl Viewport {
    pub fn new(scene: Scene, pipeline: Box<dyn RenderPipeline>) -> Self {
        Self {
            scene,
            pipeline,
            size: Vector2::new(1280, 720),
            active_camera_index: 0,
        }
    }

    /// Every object carrying a [`Camera`], in preorder.
    pub fn cameras(&self) -> Vec<ObjectId> {
        self.scene
            .all_objects()
            .into_iter()
            .filter(|&id| self.scene.has_component::<Camera>(id))
            .collect()
    }

    pub fn camera(&self) -> Option<ObjectId> {
        let cameras = self.cameras();
        let camera = usize::try_from(self.active_camera_index)
            .ok()
            .and_then(|index| cameras.get(index).copied());
        if camera.is_none() {
            log::debug!(
                "Camera index {} out of range ({} cameras)",
                self.active_camera_index,
                cameras.len()
            );
        }
        camera
    }

    /// Makes `camera` the active one. An object without a [`Camera`] or `None` leaves the
    /// viewport without a camera.
    pub fn set_camera(&mut self, camera: Option<ObjectId>) {
        self.active_camera_index = camera
            .and_then(|id| self.cameras().iter().position(|&c| c == id))
            .and_then(|index| i32::try_from(index).ok())
            .unwrap_or(-1);
    }

    pub fn active_camera_index(&self) -> i32 {
        self.active_camera_index
    }

    /// Resizes the viewport and refits every camera's aspect ratio.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.size = Vector2::new(width, height);
        let aspect = width as f32 / height as f32;
        for id in self.cameras() {
            if let Some(camera) = self.scene.component_mut::<Camera>(id) {
                camera.aspect_ratio = aspect;
                camera.update_projection();
            }
        }
    }

    pub fn update(&mut self, delta: f32, input: &mut Input) -> anyhow::Result<()> {
        self.scene.update(delta, input)
    }

    pub fn render(
        &mut self,
        assets: &mut AssetCache,
        backend: &mut dyn RenderBackend,
    ) -> anyhow::Result<()> {
        let camera = self.camera();
        self.pipeline.render(&self.scene, camera, assets, backend)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(Scene::new(), Box::new(DefaultRenderPipeline::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{RecordingBackend, RenderCall};

    #[test]
    fn camera_index_follows_preorder() {
        let mut viewport = Viewport::default();
        let first = viewport.scene.spawn("first");
        let child = viewport.scene.create("child");
        viewport.scene.add_child(first, child).unwrap();
        let second = viewport.scene.spawn("second");
        viewport.scene.add_component::<Camera>(second).unwrap();
        viewport.scene.add_component::<Camera>(child).unwrap();

        assert_eq!(viewport.cameras(), vec![child, second]);
        assert_eq!(viewport.camera(), Some(child));

        viewport.set_camera(Some(second));
        assert_eq!(viewport.active_camera_index(), 1);
        assert_eq!(viewport.camera(), Some(second));
    }

    #[test]
    fn unknown_camera_leaves_the_viewport_blind() {
        let mut viewport = Viewport::default();
        let plain = viewport.scene.spawn("plain");
        viewport.set_camera(Some(plain));
        assert_eq!(viewport.active_camera_index(), -1);
        assert_eq!(viewport.camera(), None);

        let mut backend = RecordingBackend::new();
        let mut assets = AssetCache::default();
        viewport.render(&mut assets, &mut backend).unwrap();
        assert!(matches!(backend.calls.first(), Some(RenderCall::BeginFrame(_))));
        assert_eq!(backend.calls.last(), Some(&RenderCall::EndFrame));
        assert_eq!(backend.mesh_draws().count(), 0);
    }

    #[test]
    fn resize_refits_camera_aspect() {
        let mut viewport = Viewport::default();
        let eye = viewport.scene.spawn("eye");
        viewport.scene.add_component::<Camera>(eye).unwrap();
        viewport.resize(800, 400);
        let camera = viewport.scene.component::<Camera>(eye).unwrap();
        assert_eq!(camera.aspect_ratio, 2.0);
        assert_eq!(viewport.size, Vector2::new(800, 400));
    }
}
