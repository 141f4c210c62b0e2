//! Loading of models, images and spritesheets from external files.
//!
//! - [`Resource`] is a path with an optional scheme (`res:` for the assets directory)
//! - [`AssetCache`] loads and caches assets by resource path
//! - `gltf` and `mesh` import glTF and Wavefront OBJ files into [`Model`]s
//! - `texture` decodes images into CPU-side [`ImageData`](texture::ImageData)
//! - `deletion` defers GPU resource teardown to the render thread
//! - `animation` holds keyframe data and sampling

use std::{
    collections::HashMap,
    path::{Component as PathComponent, Path, PathBuf},
    sync::Arc,
};

use anyhow::Context as _;
use cgmath::Vector2;

use crate::{
    config::AssetConfig,
    data_structures::{model::Model, sprite::Spritesheet},
    error::ConfigError,
    resources::texture::ImageData,
};

pub mod animation;
pub mod deletion;
pub mod gltf;
pub mod mesh;
pub mod texture;

/// A reference to an asset: `res:<path>` for files under the assets root, or a plain
/// filesystem path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Resource {
    path: String,
}

impl Resource {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The part before the first `:`, or `""` for plain paths.
    pub fn scheme(&self) -> &str {
        self.path.split_once(':').map_or("", |(scheme, _)| scheme)
    }

    /// The path without its scheme.
    pub fn path_component(&self) -> &str {
        self.path.split_once(':').map_or(self.path.as_str(), |(_, rest)| rest)
    }

    pub fn extension(&self) -> Option<String> {
        Path::new(self.path_component())
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
    }

    fn unknown_scheme(&self) -> ConfigError {
        ConfigError::UnknownResourceScheme {
            scheme: self.scheme().to_string(),
            path: self.path.clone(),
        }
    }

    /// The filesystem location of this resource.
    pub fn to_path(&self, assets_root: &Path) -> Result<PathBuf, ConfigError> {
        match self.scheme() {
            "res" => Ok(assets_root.join(self.path_component().trim_start_matches('/'))),
            "" => Ok(PathBuf::from(&self.path)),
            _ => Err(self.unknown_scheme()),
        }
    }

    pub fn exists(&self, assets_root: &Path) -> bool {
        self.to_path(assets_root).is_ok_and(|path| path.exists())
    }

    pub fn read_bytes(&self, assets_root: &Path) -> anyhow::Result<Vec<u8>> {
        let path = self.to_path(assets_root)?;
        std::fs::read(&path).with_context(|| format!("Resource does not exist: '{}'", self.path))
    }

    pub fn read_string(&self, assets_root: &Path) -> anyhow::Result<String> {
        let path = self.to_path(assets_root)?;
        std::fs::read_to_string(&path)
            .with_context(|| format!("Resource does not exist: '{}'", self.path))
    }

    /// The directory containing this resource.
    pub fn parent(&self) -> Result<Resource, ConfigError> {
        match self.scheme() {
            "res" => Ok(Resource::new(
                self.path
                    .rsplit_once('/')
                    .map_or("res:", |(parent, _)| parent),
            )),
            "" => Ok(Resource::new(
                Path::new(&self.path)
                    .parent()
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            )),
            _ => Err(self.unknown_scheme()),
        }
    }

    /// Appends the `/`-separated `child` path, collapsing `.` and `..` segments.
    pub fn resolve(&self, child: &str) -> Result<Resource, ConfigError> {
        match self.scheme() {
            "res" => {
                let mut path = self.path.trim_end_matches('/').to_string();
                for chunk in child.split('/') {
                    match chunk {
                        "" | "." => (),
                        ".." => {
                            if let Some((parent, _)) = path.rsplit_once('/') {
                                path.truncate(parent.len());
                            } else {
                                path = "res:".to_string();
                            }
                        }
                        segment => {
                            if !path.ends_with(':') {
                                path.push('/');
                            }
                            path.push_str(segment);
                        }
                    }
                }
                Ok(Resource::new(path))
            }
            "" => {
                let child = Path::new(child);
                if child.is_absolute() {
                    return Ok(Resource::new(child.to_string_lossy()));
                }
                let mut path = PathBuf::from(&self.path);
                for component in child.components() {
                    match component {
                        PathComponent::CurDir => (),
                        PathComponent::ParentDir => {
                            path.pop();
                        }
                        other => path.push(other),
                    }
                }
                Ok(Resource::new(path.to_string_lossy()))
            }
            _ => Err(self.unknown_scheme()),
        }
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.path)
    }
}

impl From<&str> for Resource {
    fn from(path: &str) -> Self {
        Resource::new(path)
    }
}

/**
 * Loads assets and caches them by resource path.
 *
 * Models are loaded once and shared as `Arc<Model>`. Images that fail to load are cached
 * as missing, so the warning is logged only once.
 */
#[derive(Debug)]
pub struct AssetCache {
    root: PathBuf,
    models: HashMap<String, Arc<Model>>,
    images: HashMap<String, Option<Arc<ImageData>>>,
    spritesheets: HashMap<String, Arc<Spritesheet>>,
}

impl AssetCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            models: HashMap::new(),
            images: HashMap::new(),
            spritesheets: HashMap::new(),
        }
    }

    pub fn from_config(config: &AssetConfig) -> Self {
        Self::new(&config.root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Loads a `.gltf`/`.glb` or `.obj` model, or returns the cached one.
    pub fn load_model(&mut self, resource: &Resource) -> anyhow::Result<Arc<Model>> {
        if let Some(model) = self.models.get(resource.path()) {
            return Ok(Arc::clone(model));
        }
        let model = match resource.extension().as_deref() {
            Some("gltf") | Some("glb") => self::gltf::load_model_gltf(resource, self)?,
            Some("obj") => mesh::load_model_obj(resource, self)?,
            other => anyhow::bail!(
                "Unsupported model format {:?} for '{}'",
                other.unwrap_or(""),
                resource
            ),
        };
        log::info!(
            "Loaded model '{}' ({} parts, {} animations, {} bones)",
            resource,
            model.parts.len(),
            model.animations.len(),
            model.bone_offsets.len()
        );
        let model = Arc::new(model);
        self.models
            .insert(resource.path().to_string(), Arc::clone(&model));
        Ok(model)
    }

    /// Registers a model built in code under its resource path so later loads of that
    /// path return it.
    pub fn insert_model(&mut self, model: Arc<Model>) {
        self.models
            .insert(model.resource.path().to_string(), model);
    }

    /// Decodes an image, or returns the cached one. Missing or undecodable images are
    /// logged and yield `None`.
    pub fn load_image(&mut self, resource: &Resource) -> Option<Arc<ImageData>> {
        if let Some(image) = self.images.get(resource.path()) {
            return image.clone();
        }
        let image = resource
            .read_bytes(&self.root)
            .and_then(|bytes| ImageData::from_bytes(&bytes, resource.extension().as_deref()))
            .map(Arc::new);
        let image = match image {
            Ok(image) => Some(image),
            Err(e) => {
                log::warn!("Texture {} could not be loaded: {:#}", resource, e);
                None
            }
        };
        self.images
            .insert(resource.path().to_string(), image.clone());
        image
    }

    pub fn insert_image(&mut self, resource: &Resource, image: Arc<ImageData>) {
        self.images
            .insert(resource.path().to_string(), Some(image));
    }

    /// The spritesheet at `resource`. The first call fixes its size.
    pub fn spritesheet(&mut self, resource: &Resource, size: Vector2<i32>) -> Arc<Spritesheet> {
        Arc::clone(
            self.spritesheets
                .entry(resource.path().to_string())
                .or_insert_with(|| {
                    Arc::new(Spritesheet {
                        resource: resource.clone(),
                        size,
                    })
                }),
        )
    }
}

impl Default for AssetCache {
    fn default() -> Self {
        Self::from_config(&AssetConfig::default())
    }
}
