use std::{any::Any, sync::Arc};

use cgmath::{Matrix4, Quaternion, Vector3};

use crate::{
    components::{Component, ComponentContext, FromOwner, model_renderer::ModelRenderer},
    data_structures::{game_object::ObjectId, scene_graph::Scene},
    resources::animation::{Animation, sample_keyframes},
};

#[derive(Debug, Clone)]
struct AnimationState {
    animation: Arc<Animation>,
    /// Ticks since the start of the clip.
    progress: f32,
    repeat: bool,
}

/**
 * Plays the animations of the owner's [`ModelRenderer`] model.
 *
 * While playing, every update advances the clip by `delta * ticks_per_second` ticks and
 * overwrites the transforms of the part instances its channels target. A clip that runs
 * out without `repeat` puts every part back at its reference transform and stops.
 */
#[derive(Debug, Clone)]
pub struct AnimationController {
    owner: ObjectId,
    state: Option<AnimationState>,
}

impl FromOwner for AnimationController {
    fn from_owner(owner: ObjectId) -> Self {
        Self { owner, state: None }
    }
}

impl AnimationController {
    /// Names of the animations of the model rendered by `owner`.
    pub fn available_animations(scene: &Scene, owner: ObjectId) -> Vec<String> {
        scene
            .component::<ModelRenderer>(owner)
            .and_then(|renderer| renderer.model.as_ref())
            .map(|instance| {
                instance
                    .model
                    .animations
                    .iter()
                    .map(|a| a.name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Starts the named animation of the model rendered by `owner` from the beginning.
    /// Returns `false` if the object has no controller, no model or no such animation.
    pub fn play_animation(scene: &mut Scene, owner: ObjectId, name: &str, repeat: bool) -> bool {
        let animation = scene
            .component::<ModelRenderer>(owner)
            .and_then(|renderer| renderer.model.as_ref())
            .and_then(|instance| instance.model.animation(name).cloned());
        let Some(animation) = animation else {
            log::warn!("No animation named '{}' on {:?}", name, owner);
            return false;
        };
        match scene.component_mut::<AnimationController>(owner) {
            Some(controller) => {
                controller.play(animation, repeat);
                true
            }
            None => false,
        }
    }

    pub fn play(&mut self, animation: Arc<Animation>, repeat: bool) {
        self.state = Some(AnimationState {
            animation,
            progress: 0.0,
            repeat,
        });
    }

    pub fn stop(&mut self) {
        self.state = None;
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_some()
    }

    pub fn current_animation(&self) -> Option<&Arc<Animation>> {
        self.state.as_ref().map(|state| &state.animation)
    }

    /// Ticks into the current clip.
    pub fn progress(&self) -> Option<f32> {
        self.state.as_ref().map(|state| state.progress)
    }
}

impl Component for AnimationController {
    fn type_name(&self) -> &'static str {
        "AnimationController"
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

    fn on_update(&mut self, ctx: &mut ComponentContext<'_>, delta: f32) -> anyhow::Result<()> {
        let Some(state) = self.state.as_mut() else {
            return Ok(());
        };
        let Some(instance) = ctx
            .component_mut::<ModelRenderer>()
            .and_then(|renderer| renderer.model.as_mut())
        else {
            return Ok(());
        };

        let animation = Arc::clone(&state.animation);
        state.progress += delta * animation.ticks_per_second;
        if state.progress >= animation.duration {
            if !state.repeat {
                instance.reset_to_reference();
                self.state = None;
                return Ok(());
            }
            state.progress = if animation.duration > 0.0 {
                state.progress % animation.duration
            } else {
                0.0
            };
        }

        let (time, repeat) = (state.progress, state.repeat);
        for channel in &animation.channels {
            let Some(part) = instance.get_part_by_name(&channel.node_name) else {
                continue;
            };
            let translation = sample_keyframes(
                &channel.translations,
                time,
                animation.duration,
                repeat,
                Vector3::new(0.0, 0.0, 0.0),
            )?;
            let rotation = sample_keyframes(
                &channel.rotations,
                time,
                animation.duration,
                repeat,
                Quaternion::new(1.0, 0.0, 0.0, 0.0),
            )?;
            let scale = sample_keyframes(
                &channel.scales,
                time,
                animation.duration,
                repeat,
                Vector3::new(1.0, 1.0, 1.0),
            )?;
            part.transform = Matrix4::from_translation(translation)
                * Matrix4::from(rotation)
                * Matrix4::from_nonuniform_scale(scale.x, scale.y, scale.z);
        }
        Ok(())
    }

    fn copy_for(&self, owner: ObjectId) -> Box<dyn Component> {
        Box::new(Self {
            owner,
            state: self.state.clone(),
        })
    }

    fn is_serializable(&self) -> bool {
        false
    }
}
