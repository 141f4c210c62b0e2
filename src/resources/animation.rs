//! Keyframe animation data and sampling.
//!
//! - [`Animation`] is a named clip made of [`AnimationChannel`]s, timed in ticks
//! - [`Keyframe`] is a single timed value with its [`Interpolation`] towards the next key
//! - [`sample_keyframes`] evaluates a track at a point in time
//! - [`Easing`] provides the usual easing curves for application-side tweening

use std::f32::consts::PI;

use cgmath::{Quaternion, Vector3, VectorSpace};

use crate::error::ConfigError;

/// How a keyframe blends into the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Step,
    Linear,
    SphericalLinear,
    CubicSpline,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keyframe<T> {
    /// Tick at which this keyframe starts.
    pub time: f32,
    pub value: T,
    pub interpolation: Interpolation,
}

impl<T> Keyframe<T> {
    pub fn new(time: f32, value: T, interpolation: Interpolation) -> Self {
        Self {
            time,
            value,
            interpolation,
        }
    }
}

/// Three independently timed tracks targeting the model part called `node_name`.
/// Every track is sorted by time.
#[derive(Debug, Clone, Default)]
pub struct AnimationChannel {
    pub node_name: String,
    pub translations: Vec<Keyframe<Vector3<f32>>>,
    pub rotations: Vec<Keyframe<Quaternion<f32>>>,
    pub scales: Vec<Keyframe<Vector3<f32>>>,
}

#[derive(Debug, Clone)]
pub struct Animation {
    pub name: String,
    /// Length in ticks.
    pub duration: f32,
    pub ticks_per_second: f32,
    pub channels: Vec<AnimationChannel>,
}

/// A value type keyframes can be blended for.
pub trait Keyable: Copy {
    const KIND: &'static str;

    fn interpolate(
        start: Self,
        end: Self,
        factor: f32,
        interpolation: Interpolation,
    ) -> Result<Self, ConfigError>;
}

impl Keyable for Vector3<f32> {
    const KIND: &'static str = "vector";

    fn interpolate(
        start: Self,
        end: Self,
        factor: f32,
        interpolation: Interpolation,
    ) -> Result<Self, ConfigError> {
        match interpolation {
            Interpolation::Linear => Ok(start.lerp(end, factor)),
            other => Err(ConfigError::UnsupportedInterpolation {
                interpolation: other,
                value_kind: Self::KIND,
            }),
        }
    }
}

impl Keyable for Quaternion<f32> {
    const KIND: &'static str = "rotation";

    fn interpolate(
        start: Self,
        end: Self,
        factor: f32,
        interpolation: Interpolation,
    ) -> Result<Self, ConfigError> {
        match interpolation {
            Interpolation::Linear => Ok(start.nlerp(end, factor)),
            Interpolation::SphericalLinear => Ok(start.slerp(end, factor)),
            other => Err(ConfigError::UnsupportedInterpolation {
                interpolation: other,
                value_kind: Self::KIND,
            }),
        }
    }
}

/**
 * Evaluates a sorted keyframe track at tick `time`.
 *
 * An empty track yields `default` and a single key yields its value. Otherwise the last
 * key at or before `time` is blended towards the first key after it; when `repeat` is
 * set and `time` is past the last key, the blend wraps around to the first key using
 * `duration` to measure the gap.
 */
pub fn sample_keyframes<T: Keyable>(
    keys: &[Keyframe<T>],
    time: f32,
    duration: f32,
    repeat: bool,
    default: T,
) -> Result<T, ConfigError> {
    match keys {
        [] => return Ok(default),
        [only] => return Ok(only.value),
        _ => (),
    }

    let current = keys.iter().rposition(|key| key.time <= time);
    let next = keys
        .iter()
        .position(|key| key.time > time)
        .or(if repeat { Some(0) } else { None });

    let Some(current) = current else {
        return Ok(keys[next.unwrap_or(0)].value);
    };
    let next = match next {
        Some(next) if next != current => next,
        _ => return Ok(keys[current].value),
    };
    let (current, next) = (&keys[current], &keys[next]);

    let frame_time = if next.time < current.time {
        (duration - current.time) + next.time
    } else {
        next.time - current.time
    };
    let elapsed = if time < current.time {
        (duration - current.time) + time
    } else {
        time - current.time
    };
    let factor = (elapsed / frame_time).clamp(0.0, 1.0);

    T::interpolate(current.value, next.value, factor, current.interpolation)
}

/// Easing curves from <https://easings.net>, mapping `0..=1` onto `0..=1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Easing {
    Linear,
    InSine,
    OutSine,
    InOutSine,
    InQuad,
    OutQuad,
    InOutQuad,
    InCubic,
    OutCubic,
    InOutCubic,
    InExpo,
    OutExpo,
    InOutExpo,
    InCirc,
    OutCirc,
    InOutCirc,
    InBack,
    OutBack,
    InOutBack,
    InElastic,
    OutElastic,
    InOutElastic,
    InBounce,
    OutBounce,
    InOutBounce,
}

impl Easing {
    pub fn ease(self, x: f32) -> f32 {
        const C1: f32 = 1.70158;
        const C2: f32 = C1 * 1.525;
        const C3: f32 = C1 + 1.0;
        const C4: f32 = (2.0 * PI) / 3.0;
        const C5: f32 = (2.0 * PI) / 4.5;

        match self {
            Easing::Linear => x,
            Easing::InSine => 1.0 - (PI * x / 2.0).cos(),
            Easing::OutSine => (PI * x / 2.0).sin(),
            Easing::InOutSine => -((PI * x).cos() - 1.0) / 2.0,
            Easing::InQuad => x * x,
            Easing::OutQuad => 1.0 - (1.0 - x) * (1.0 - x),
            Easing::InOutQuad => {
                if x < 0.5 {
                    2.0 * x * x
                } else {
                    1.0 - (-2.0 * x + 2.0).powi(2) / 2.0
                }
            }
            Easing::InCubic => x * x * x,
            Easing::OutCubic => 1.0 - (1.0 - x).powi(3),
            Easing::InOutCubic => {
                if x < 0.5 {
                    4.0 * x * x * x
                } else {
                    1.0 - (-2.0 * x + 2.0).powi(3) / 2.0
                }
            }
            Easing::InExpo => {
                if x == 0.0 {
                    0.0
                } else {
                    2f32.powf(10.0 * x - 10.0)
                }
            }
            Easing::OutExpo => {
                if x == 1.0 {
                    1.0
                } else {
                    1.0 - 2f32.powf(-10.0 * x)
                }
            }
            Easing::InOutExpo => {
                if x == 0.0 {
                    0.0
                } else if x == 1.0 {
                    1.0
                } else if x < 0.5 {
                    2f32.powf(20.0 * x - 10.0) / 2.0
                } else {
                    (2.0 - 2f32.powf(-20.0 * x + 10.0)) / 2.0
                }
            }
            Easing::InCirc => 1.0 - (1.0 - x * x).sqrt(),
            Easing::OutCirc => (1.0 - (x - 1.0).powi(2)).sqrt(),
            Easing::InOutCirc => {
                if x < 0.5 {
                    (1.0 - (1.0 - (2.0 * x).powi(2)).sqrt()) / 2.0
                } else {
                    ((1.0 - (-2.0 * x + 2.0).powi(2)).sqrt() + 1.0) / 2.0
                }
            }
            Easing::InBack => C3 * x.powi(3) - C1 * x.powi(2),
            Easing::OutBack => 1.0 + C3 * (x - 1.0).powi(3) + C1 * (x - 1.0).powi(2),
            Easing::InOutBack => {
                if x < 0.5 {
                    ((2.0 * x).powi(2) * ((C2 + 1.0) * 2.0 * x - C2)) / 2.0
                } else {
                    ((2.0 * x - 2.0).powi(2) * ((C2 + 1.0) * (x * 2.0 - 2.0) + C2) + 2.0) / 2.0
                }
            }
            Easing::InElastic => {
                if x == 0.0 || x == 1.0 {
                    x
                } else {
                    -(2f32.powf(10.0 * x - 10.0)) * ((x * 10.0 - 10.75) * C4).sin()
                }
            }
            Easing::OutElastic => {
                if x == 0.0 || x == 1.0 {
                    x
                } else {
                    2f32.powf(-10.0 * x) * ((x * 10.0 - 0.75) * C4).sin() + 1.0
                }
            }
            Easing::InOutElastic => {
                if x == 0.0 || x == 1.0 {
                    x
                } else if x < 0.5 {
                    -(2f32.powf(20.0 * x - 10.0) * ((20.0 * x - 11.125) * C5).sin()) / 2.0
                } else {
                    (2f32.powf(-20.0 * x + 10.0) * ((20.0 * x - 11.125) * C5).sin()) / 2.0 + 1.0
                }
            }
            Easing::InBounce => 1.0 - out_bounce(1.0 - x),
            Easing::OutBounce => out_bounce(x),
            Easing::InOutBounce => {
                if x < 0.5 {
                    (1.0 - out_bounce(1.0 - 2.0 * x)) / 2.0
                } else {
                    (1.0 + out_bounce(2.0 * x - 1.0)) / 2.0
                }
            }
        }
    }
}

fn out_bounce(x: f32) -> f32 {
    const N1: f32 = 7.5625;
    const D1: f32 = 2.75;
    if x < 1.0 / D1 {
        N1 * x * x
    } else if x < 2.0 / D1 {
        N1 * (x - 1.5 / D1).powi(2) + 0.75
    } else if x < 2.5 / D1 {
        N1 * (x - 2.25 / D1).powi(2) + 0.9375
    } else {
        N1 * (x - 2.625 / D1).powi(2) + 0.984375
    }
}
