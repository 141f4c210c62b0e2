//! Engine data structures: the scene graph and everything it is built from.
//!
//! - `game_object` and `transform` are the nodes of the hierarchy
//! - `scene_graph` owns the object arena, the root list and the update cascade
//! - `model` contains the model asset tree, meshes, materials and per-object instances
//! - `sprite` holds spritesheets, sprites and the atlas packer
//! - `instance` packs world matrices into per-instance GPU data
//! - `texture` is the GPU texture wrapper
//! - `viewport` ties a scene to a render pipeline and an active camera

pub mod color;
pub mod game_object;
pub mod instance;
pub mod model;
pub mod scene_graph;
pub mod sprite;
pub mod texture;
pub mod transform;
pub mod viewport;
