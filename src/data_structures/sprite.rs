//! Sprites and the atlases they are packed into.
//!
//! - [`Spritesheet`] is an image resource with a known pixel size
//! - [`Sprite`] is a rectangle of a sheet, optionally with 9-slice corners
//! - [`SpriteAtlas`] packs whole sheets into one 2048x2048 texture
//! - [`SpriteAtlasManager`] spreads sheets over as many atlases as needed

use std::{collections::HashMap, sync::Arc};

use cgmath::Vector2;

use crate::{error::SpriteError, resources::Resource};

/// Side length of every atlas texture in pixels.
pub const ATLAS_SIZE: i32 = 2048;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spritesheet {
    pub resource: Resource,
    pub size: Vector2<i32>,
}

impl Spritesheet {
    pub fn new(resource: Resource, size: Vector2<i32>) -> Self {
        Self { resource, size }
    }

    /// A sprite covering the whole sheet.
    pub fn full(self: &Arc<Self>) -> Sprite {
        Sprite::new(Arc::clone(self), self.size, Vector2::new(0, 0))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sprite {
    pub sheet: Arc<Spritesheet>,
    pub size: Vector2<i32>,
    /// Top-left corner inside the sheet.
    pub offset: Vector2<i32>,
    /// Inner corners `(min, max)` of a 9-slice sprite, relative to the sprite.
    pub nine_slice: Option<(Vector2<i32>, Vector2<i32>)>,
}

impl Sprite {
    pub fn new(sheet: Arc<Spritesheet>, size: Vector2<i32>, offset: Vector2<i32>) -> Self {
        Self {
            sheet,
            size,
            offset,
            nine_slice: None,
        }
    }

    pub fn with_nine_slice(mut self, corner_min: Vector2<i32>, corner_max: Vector2<i32>) -> Self {
        self.nine_slice = Some((corner_min, corner_max));
        self
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.size.x as f32 / self.size.y as f32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtlasId(pub usize);

/// Where a sprite (or a part of one) lives inside an atlas, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtlasEntry {
    pub atlas: AtlasId,
    pub size: Vector2<i32>,
    pub offset: Vector2<i32>,
}

impl AtlasEntry {
    pub fn uv_offset(&self) -> Vector2<f32> {
        Vector2::new(
            self.offset.x as f32 / ATLAS_SIZE as f32,
            self.offset.y as f32 / ATLAS_SIZE as f32,
        )
    }

    pub fn uv_size(&self) -> Vector2<f32> {
        Vector2::new(
            self.size.x as f32 / ATLAS_SIZE as f32,
            self.size.y as f32 / ATLAS_SIZE as f32,
        )
    }

    /// The sub-rectangle `x_range` x `y_range`, given in pixels relative to this entry.
    pub fn slice(&self, x_range: (i32, i32), y_range: (i32, i32)) -> AtlasEntry {
        AtlasEntry {
            atlas: self.atlas,
            size: Vector2::new(x_range.1 - x_range.0, y_range.1 - y_range.0),
            offset: self.offset + Vector2::new(x_range.0, y_range.0),
        }
    }
}

/// A sheet placed into an atlas whose pixels still have to be copied to the GPU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpload {
    pub atlas: AtlasId,
    pub resource: Resource,
    pub offset: Vector2<i32>,
    pub size: Vector2<i32>,
}

fn next_pow2(value: i32) -> i32 {
    (value.max(1) as u32).next_power_of_two() as i32
}

#[derive(Debug)]
pub struct SpriteAtlas {
    id: AtlasId,
    /// Placed sheets and their top-left corner.
    sheets: HashMap<Resource, (Vector2<i32>, Vector2<i32>)>,
    pending: Vec<PendingUpload>,
}

impl SpriteAtlas {
    pub fn new(id: AtlasId) -> Self {
        Self {
            id,
            sheets: HashMap::new(),
            pending: Vec::new(),
        }
    }

    pub fn id(&self) -> AtlasId {
        self.id
    }

    pub fn contains(&self, sheet: &Spritesheet) -> bool {
        self.sheets.contains_key(&sheet.resource)
    }

    fn overlaps(&self, position: Vector2<i32>, size: Vector2<i32>) -> bool {
        self.sheets.values().any(|(other_pos, other_size)| {
            position.x < other_pos.x + other_size.x
                && other_pos.x < position.x + size.x
                && position.y < other_pos.y + other_size.y
                && other_pos.y < position.y + size.y
        })
    }

    /// The first free cell on a grid aligned to the next power of two of `size`.
    fn find_free(&self, size: Vector2<i32>) -> Option<Vector2<i32>> {
        let step = Vector2::new(next_pow2(size.x), next_pow2(size.y));
        (0..=ATLAS_SIZE - size.y)
            .step_by(step.y as usize)
            .flat_map(|y| {
                (0..=ATLAS_SIZE - size.x)
                    .step_by(step.x as usize)
                    .map(move |x| Vector2::new(x, y))
            })
            .find(|&position| !self.overlaps(position, size))
    }

    /// Places the sprite's sheet if needed. Returns `None` if the sheet does not fit.
    pub fn add_sprite(&mut self, sprite: &Sprite) -> Option<AtlasEntry> {
        let sheet = &sprite.sheet;
        let position = match self.sheets.get(&sheet.resource) {
            Some((position, _)) => *position,
            None => {
                if sheet.size.x > ATLAS_SIZE || sheet.size.y > ATLAS_SIZE {
                    return None;
                }
                let position = self.find_free(sheet.size)?;
                self.sheets
                    .insert(sheet.resource.clone(), (position, sheet.size));
                self.pending.push(PendingUpload {
                    atlas: self.id,
                    resource: sheet.resource.clone(),
                    offset: position,
                    size: sheet.size,
                });
                log::debug!("Placed spritesheet {} at {:?} in atlas {:?}", sheet.resource, position, self.id);
                position
            }
        };
        Some(AtlasEntry {
            atlas: self.id,
            size: sprite.size,
            offset: position + sprite.offset,
        })
    }

    pub fn take_pending_uploads(&mut self) -> Vec<PendingUpload> {
        std::mem::take(&mut self.pending)
    }
}

#[derive(Debug, Default)]
pub struct SpriteAtlasManager {
    atlases: Vec<SpriteAtlas>,
}

impl SpriteAtlasManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn atlases(&self) -> &[SpriteAtlas] {
        &self.atlases
    }

    /**
     * Finds the sprite in an atlas, placing its sheet into the first atlas with room or
     * into a new one.
     */
    pub fn register_sprite(&mut self, sprite: &Sprite) -> Result<AtlasEntry, SpriteError> {
        let too_large = || SpriteError::TooLarge {
            width: sprite.sheet.size.x,
            height: sprite.sheet.size.y,
            limit: ATLAS_SIZE,
        };
        if sprite.size.x >= ATLAS_SIZE || sprite.size.y >= ATLAS_SIZE {
            return Err(SpriteError::TooLarge {
                width: sprite.size.x,
                height: sprite.size.y,
                limit: ATLAS_SIZE,
            });
        }

        if let Some(atlas) = self.atlases.iter_mut().find(|a| a.contains(&sprite.sheet)) {
            return atlas.add_sprite(sprite).ok_or_else(too_large);
        }
        for atlas in &mut self.atlases {
            if let Some(entry) = atlas.add_sprite(sprite) {
                return Ok(entry);
            }
        }

        let mut atlas = SpriteAtlas::new(AtlasId(self.atlases.len()));
        let entry = atlas.add_sprite(sprite).ok_or_else(too_large)?;
        log::info!("Opened sprite atlas {:?}", atlas.id());
        self.atlases.push(atlas);
        Ok(entry)
    }

    /// Sheets placed since the last call, across all atlases.
    pub fn take_pending_uploads(&mut self) -> Vec<PendingUpload> {
        self.atlases
            .iter_mut()
            .flat_map(SpriteAtlas::take_pending_uploads)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet(name: &str, w: i32, h: i32) -> Arc<Spritesheet> {
        Arc::new(Spritesheet::new(Resource::new(name), Vector2::new(w, h)))
    }

    #[test]
    fn sheets_are_placed_on_a_pow2_grid() {
        let mut atlas = SpriteAtlas::new(AtlasId(0));
        let a = atlas.add_sprite(&sheet("res:a.png", 100, 50).full()).unwrap();
        let b = atlas.add_sprite(&sheet("res:b.png", 100, 50).full()).unwrap();
        assert_eq!(a.offset, Vector2::new(0, 0));
        assert_eq!(b.offset, Vector2::new(128, 0));
        assert_eq!(atlas.take_pending_uploads().len(), 2);
        assert!(atlas.take_pending_uploads().is_empty());
    }

    #[test]
    fn sprites_of_one_sheet_share_its_placement() {
        let mut atlas = SpriteAtlas::new(AtlasId(0));
        let tiles = sheet("res:tiles.png", 64, 64);
        atlas.add_sprite(&sheet("res:other.png", 32, 32).full()).unwrap();
        let tile = Sprite::new(Arc::clone(&tiles), Vector2::new(16, 16), Vector2::new(16, 32));
        let entry = atlas.add_sprite(&tile).unwrap();
        assert_eq!(entry.offset, Vector2::new(64 + 16, 32));
        assert_eq!(entry.size, Vector2::new(16, 16));
        assert_eq!(atlas.take_pending_uploads().len(), 2);
    }

    #[test]
    fn slices_are_relative_to_the_entry() {
        let entry = AtlasEntry {
            atlas: AtlasId(0),
            size: Vector2::new(30, 30),
            offset: Vector2::new(100, 200),
        };
        let slice = entry.slice((10, 20), (0, 5));
        assert_eq!(slice.offset, Vector2::new(110, 200));
        assert_eq!(slice.size, Vector2::new(10, 5));
    }

    #[test]
    fn full_atlas_opens_a_new_one() {
        let mut manager = SpriteAtlasManager::new();
        let big = manager.register_sprite(&sheet("res:big.png", 2000, 2000).full()).unwrap();
        let small = manager.register_sprite(&sheet("res:small.png", 100, 100).full()).unwrap();
        assert_eq!(big.atlas, AtlasId(0));
        assert_eq!(small.atlas, AtlasId(1));
        assert_eq!(manager.atlases().len(), 2);
    }

    #[test]
    fn oversized_sprites_are_rejected() {
        let mut manager = SpriteAtlasManager::new();
        let result = manager.register_sprite(&sheet("res:huge.png", 2048, 16).full());
        assert!(matches!(result, Err(SpriteError::TooLarge { width: 2048, .. })));
    }
}
