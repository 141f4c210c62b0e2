//! Error taxonomy.
//!
//! - [`ConfigError`] is fatal: the operation that triggered it is halted
//! - [`SceneError`] reports misuse while building a scene (duplicate components, cycles)
//! - [`SerializationError`] is returned by the binary codec
//! - [`SpriteError`] is returned when a sprite cannot be placed in an atlas
//!
//! Soft-missing data (absent textures, unset models, unknown animations) is not an error.
//! It is logged with `log::warn!` and the affected unit is skipped.

use crate::data_structures::game_object::ObjectId;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("interpolation {interpolation:?} is not supported for {value_kind} keyframes")]
    UnsupportedInterpolation {
        interpolation: crate::resources::animation::Interpolation,
        value_kind: &'static str,
    },

    #[error("unknown resource scheme '{scheme}' in '{path}'")]
    UnknownResourceScheme { scheme: String, path: String },

    #[error("shader '{shader}' failed to compile: {message}")]
    ShaderCompilation { shader: String, message: String },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("cannot add {component} to '{object}' because {occupied} is already attached")]
    DuplicateComponent {
        component: &'static str,
        occupied: &'static str,
        object: String,
    },

    #[error("cannot parent '{child}' under '{parent}': '{parent}' is the object itself or one of its descendants")]
    CyclicParent { child: String, parent: String },

    #[error("object {0:?} does not exist in this scene")]
    MissingObject(ObjectId),

    #[error("'{0}' has a component that is running one of its hooks")]
    ComponentInUse(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("unexpected end of input: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },

    #[error("string is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("negative length prefix {0}")]
    NegativeLength(i32),

    #[error("no component factory registered for type '{0}'")]
    UnknownComponent(String),

    #[error(transparent)]
    Scene(#[from] SceneError),

    #[error(transparent)]
    Asset(#[from] anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SpriteError {
    #[error("sprite of size {width}x{height} does not fit into a {limit}x{limit} atlas")]
    TooLarge { width: i32, height: i32, limit: i32 },
}
