use std::{any::Any, sync::Arc};

use crate::{
    components::{Component, FromOwner},
    data_structures::{
        game_object::ObjectId,
        model::{Model, ModelInstance},
    },
    error::SerializationError,
    resources::{AssetCache, Resource},
    serialization::{ByteReader, ByteWriter},
};

/// Draws a model at its owner's world transform. Each renderer holds its own
/// [`ModelInstance`] so animation never touches the shared asset.
#[derive(Debug, Clone)]
pub struct ModelRenderer {
    owner: ObjectId,
    pub model: Option<ModelInstance>,
}

impl FromOwner for ModelRenderer {
    fn from_owner(owner: ObjectId) -> Self {
        Self { owner, model: None }
    }
}

impl ModelRenderer {
    pub fn set_model(&mut self, model: &Arc<Model>) {
        self.model = Some(model.instantiate());
    }
}

impl Component for ModelRenderer {
    fn type_name(&self) -> &'static str {
        "ModelRenderer"
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

    fn copy_for(&self, owner: ObjectId) -> Box<dyn Component> {
        Box::new(Self {
            owner,
            model: self.model.as_ref().map(|instance| instance.model.instantiate()),
        })
    }

    fn serialize(&self, out: &mut ByteWriter) {
        match &self.model {
            Some(instance) => out.write_str(instance.model.resource.path()),
            None => out.write_i32(0),
        }
    }

    fn deserialize(&mut self, input: &mut ByteReader<'_>, assets: &mut AssetCache) -> Result<(), SerializationError> {
        let path = input.read_string()?;
        self.model = if path.is_empty() {
            None
        } else {
            Some(assets.load_model(&Resource::new(path))?.instantiate())
        };
        Ok(())
    }
}
