//! scene-ngin
//!
//! A small scene-graph engine on top of wgpu. Game objects form a transform hierarchy and
//! carry behaviour components; models are imported from glTF or OBJ and animated with
//! skeletal keyframes; a render pipeline batches everything that shares a mesh, material
//! and shader into one instanced draw.
//!
//! High-level modules
//! - `components`: the component trait, capability table and built-in components
//! - `config`: engine configuration loaded from TOML
//! - `context`: the wgpu render backend owning the device, queue and GPU caches
//! - `data_structures`: scene graph, models, sprites, instances and the viewport
//! - `error`: the error types returned across the crate
//! - `flow`: the winit event loop that ticks a viewport every frame
//! - `input`: keyboard and mouse state with queued input events
//! - `pipelines`: the default and wireframe render pipelines and their wgpu programs
//! - `render`: the backend trait pipelines draw through, plus GPU data layouts
//! - `resources`: resource paths, asset loading and deferred GPU deletion
//! - `serialization`: the binary object and scene codec
//!

pub mod components;
pub mod config;
pub mod context;
pub mod data_structures;
pub mod error;
pub mod flow;
pub mod input;
pub mod pipelines;
pub mod render;
pub mod resources;
pub mod serialization;

// Re-exports commonly used types for convenience in downstream code.
pub use cgmath;
pub use wgpu;
pub use winit;

pub use components::{Component, ComponentContext};
pub use config::EngineConfig;
pub use data_structures::{
    color::Color, game_object::ObjectId, scene_graph::Scene, viewport::Viewport,
};
pub use flow::run;
pub use input::Input;
pub use resources::{AssetCache, Resource};
