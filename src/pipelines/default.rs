//! The standard pipeline: batched models, atlas sprites and UI windows.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use cgmath::{Matrix4, Vector2, Vector3};

use crate::{
    components::sprite_renderer::SpriteRenderer,
    data_structures::{
        color::Color,
        game_object::ObjectId,
        model::{Material, Mesh},
        scene_graph::Scene,
        sprite::{AtlasEntry, AtlasId, Sprite, SpriteAtlasManager},
    },
    pipelines::{
        RenderPipeline, camera_uniform, collect_lights, render_ui_windows, visit_model_geometries,
    },
    render::{
        BatchKey, CameraUniform, InstanceRaw, LightSet, RawMatrix, RenderBackend, ShaderKind,
        SpriteInstance, pack_bones,
    },
    resources::AssetCache,
};

struct Batch {
    key: BatchKey,
    mesh: Arc<Mesh>,
    material: Arc<Material>,
    instances: Vec<InstanceRaw>,
    /// [`crate::data_structures::model::MAX_BONES`] matrices per instance when skinned.
    bones: Vec<RawMatrix>,
}

/**
 * Draws every model, sprite and UI window of a scene.
 *
 * Models are bucketed by [`BatchKey`] and each bucket is one instanced draw, submitted
 * in the order its first entry was seen. Sprites are packed into atlases owned by the
 * pipeline and drawn with one call per atlas.
 */
#[derive(Debug)]
pub struct DefaultRenderPipeline {
    pub clear_color: Color,
    atlases: SpriteAtlasManager,
}

impl DefaultRenderPipeline {
    pub fn new(clear_color: Color) -> Self {
        Self {
            clear_color,
            atlases: SpriteAtlasManager::new(),
        }
    }

    pub fn atlases(&self) -> &SpriteAtlasManager {
        &self.atlases
    }

    fn render_models(
        &self,
        scene: &Scene,
        objects: &[ObjectId],
        camera: &CameraUniform,
        lights: &LightSet,
        backend: &mut dyn RenderBackend,
    ) -> anyhow::Result<()> {
        for batch in collect_batches(scene, objects) {
            backend.bind_shader(batch.key.shader)?;
            backend.set_camera(camera);
            backend.set_lights(lights);
            backend.set_material(&batch.material);
            let bones = batch.key.skinned.then_some(batch.bones.as_slice());
            backend.draw_mesh_instanced(&batch.mesh, &batch.instances, bones);
        }
        Ok(())
    }

    fn render_sprites(
        &mut self,
        scene: &Scene,
        objects: &[ObjectId],
        camera: &CameraUniform,
        assets: &mut AssetCache,
        backend: &mut dyn RenderBackend,
    ) -> anyhow::Result<()> {
        let mut batches: BTreeMap<AtlasId, Vec<SpriteInstance>> = BTreeMap::new();
        for &id in objects {
            let Some(renderer) = scene.component::<SpriteRenderer>(id) else {
                continue;
            };
            let Some(sprite) = renderer.sprite.as_ref() else {
                continue;
            };
            let entry = match self.atlases.register_sprite(sprite) {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Skipping sprite of {:?}: {}", id, e);
                    continue;
                }
            };
            let world = scene.world_matrix(id);
            let items = batches.entry(entry.atlas).or_default();
            match sprite.nine_slice {
                Some(corners) => {
                    nine_slice_instances(world, sprite, renderer.stretch, entry, corners, items)
                }
                None => items.push(SpriteInstance::new(
                    world * Matrix4::from_nonuniform_scale(renderer.stretch.x, renderer.stretch.y, 1.0),
                    entry.uv_offset(),
                    entry.uv_size(),
                )),
            }
        }

        for upload in self.atlases.take_pending_uploads() {
            match assets.load_image(&upload.resource) {
                Some(image) => backend.upload_atlas_region(upload.atlas, upload.offset, &image),
                None => log::warn!("Spritesheet {} has no image, its sprites stay blank", upload.resource),
            }
        }

        if batches.is_empty() {
            return Ok(());
        }
        backend.bind_shader(ShaderKind::Sprite)?;
        backend.set_camera(camera);
        for (atlas, sprites) in &batches {
            backend.bind_atlas(*atlas);
            backend.draw_sprites(sprites);
        }
        Ok(())
    }
}

impl Default for DefaultRenderPipeline {
    fn default() -> Self {
        Self::new(Color::new(0.1, 0.1, 0.1, 1.0))
    }
}

impl RenderPipeline for DefaultRenderPipeline {
    fn render(
        &mut self,
        scene: &Scene,
        camera: Option<ObjectId>,
        assets: &mut AssetCache,
        backend: &mut dyn RenderBackend,
    ) -> anyhow::Result<()> {
        backend.begin_frame(self.clear_color)?;
        let objects = scene.all_objects();

        match camera_uniform(scene, camera) {
            Some(camera) => {
                let lights = collect_lights(scene, &objects);
                self.render_models(scene, &objects, &camera, &lights, backend)?;
                self.render_sprites(scene, &objects, &camera, assets, backend)?;
            }
            None => log::trace!("No active camera, skipping models and sprites"),
        }

        render_ui_windows(scene, &objects, backend);
        backend.end_frame()
    }
}

fn collect_batches(scene: &Scene, objects: &[ObjectId]) -> Vec<Batch> {
    let mut batches: Vec<Batch> = Vec::new();
    let mut lookup: HashMap<BatchKey, usize> = HashMap::new();

    for &id in objects {
        visit_model_geometries(scene, id, &mut |model, geometry, transform, bones| {
            let key = BatchKey {
                mesh: geometry.mesh.id(),
                material: geometry.material.id(),
                shader: model.shader,
                skinned: bones.is_some(),
            };
            let index = *lookup.entry(key).or_insert_with(|| {
                batches.push(Batch {
                    key,
                    mesh: Arc::clone(&geometry.mesh),
                    material: Arc::clone(&geometry.material),
                    instances: Vec::new(),
                    bones: Vec::new(),
                });
                batches.len() - 1
            });
            let batch = &mut batches[index];
            batch.instances.push(InstanceRaw::from_matrix(transform));
            if let Some(bones) = bones {
                pack_bones(bones, &mut batch.bones);
            }
        });
    }
    log::trace!("Collected {} model batches", batches.len());
    batches
}

/**
 * Expands a 9-slice sprite into up to nine quads.
 *
 * Corners keep their pixel size relative to the sprite while the middle row and column
 * stretch to fill `size * stretch`. Cells with an empty pixel range are skipped. Cells
 * are emitted row by row, starting at the top.
 */
fn nine_slice_instances(
    world: Matrix4<f32>,
    sprite: &Sprite,
    stretch: Vector2<f32>,
    entry: AtlasEntry,
    (min, max): (Vector2<i32>, Vector2<i32>),
    out: &mut Vec<SpriteInstance>,
) {
    let size = Vector2::new(sprite.size.x as f32, sprite.size.y as f32);
    let aspect = sprite.aspect_ratio();
    let (x_mul, y_mul) = if aspect >= 1.0 {
        (aspect, 1.0)
    } else {
        (1.0, 1.0 / aspect)
    };

    let left = min.x as f32;
    let right = size.x - max.x as f32;
    let middle_x = (max.x - min.x) as f32;
    let stretched_x = size.x * stretch.x - left - right;
    let top = min.y as f32;
    let bottom = size.y - max.y as f32;
    let middle_y = (max.y - min.y) as f32;
    let stretched_y = size.y * stretch.y - top - bottom;

    let x_ranges = [(0, min.x), (min.x, max.x), (max.x, sprite.size.x)];
    let y_ranges = [(0, min.y), (min.y, max.y), (max.y, sprite.size.y)];
    let widths = [left, middle_x, right];
    let heights = [top, middle_y, bottom];
    let x_deltas = [0.0, left, left + stretched_x];
    let y_deltas = [bottom + stretched_y, bottom, 0.0];

    for row in 0..3 {
        for col in 0..3 {
            let (x_range, y_range) = (x_ranges[col], y_ranges[row]);
            if x_range.0 == x_range.1 || y_range.0 == y_range.1 {
                continue;
            }

            let part_aspect = widths[col] / heights[row];
            let (part_x_mul, part_y_mul) = if part_aspect >= 1.0 {
                (part_aspect, 1.0)
            } else {
                (1.0, 1.0 / part_aspect)
            };

            let mut transform = world
                * Matrix4::from_translation(Vector3::new(
                    x_deltas[col] * x_mul / size.x,
                    y_deltas[row] * y_mul / size.y,
                    0.0,
                ));
            if col == 1 {
                transform = transform
                    * Matrix4::from_nonuniform_scale(stretched_x / middle_x * part_x_mul, 1.0, 1.0);
            }
            if row == 1 {
                transform = transform
                    * Matrix4::from_nonuniform_scale(1.0, stretched_y / middle_y * part_y_mul, 1.0);
            }

            let cell = entry.slice(x_range, y_range);
            out.push(SpriteInstance::new(transform, cell.uv_offset(), cell.uv_size()));
        }
    }
}

#[cfg(test)]
mod tests {
    use cgmath::SquareMatrix;

    use super::*;
    use crate::{data_structures::sprite::Spritesheet, resources::Resource};

    fn nine_slice(corners: (Vector2<i32>, Vector2<i32>)) -> Vec<SpriteInstance> {
        let sheet = Arc::new(Spritesheet::new(Resource::new("res:ui.png"), Vector2::new(30, 30)));
        let sprite = sheet.full().with_nine_slice(corners.0, corners.1);
        let entry = AtlasEntry {
            atlas: AtlasId(0),
            size: sprite.size,
            offset: Vector2::new(0, 0),
        };
        let mut out = Vec::new();
        nine_slice_instances(
            Matrix4::identity(),
            &sprite,
            Vector2::new(1.0, 1.0),
            entry,
            sprite.nine_slice.unwrap_or(corners),
            &mut out,
        );
        out
    }

    #[test]
    fn nine_slice_emits_every_cell() {
        let cells = nine_slice((Vector2::new(10, 10), Vector2::new(20, 20)));
        assert_eq!(cells.len(), 9);
        // top-left cell samples the first 10x10 pixels
        assert_eq!(cells[0].uv_offset, [0.0, 0.0]);
        assert_eq!(cells[0].uv_size, [10.0 / 2048.0, 10.0 / 2048.0]);
        // and sits above the middle and bottom rows
        assert_eq!(cells[0].model[3][1], 20.0 / 30.0);
        assert_eq!(cells[8].model[3][1], 0.0);
    }

    #[test]
    fn empty_borders_are_skipped() {
        let cells = nine_slice((Vector2::new(0, 10), Vector2::new(30, 20)));
        // only the middle column has width
        assert_eq!(cells.len(), 3);
    }
}
