use crate::{
    core::FrameNumber,
    error::{PlayfieldError, PlayfieldResult},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Ease {
    Linear,
    InQuad,
    OutQuad,
    InOutQuad,
    InOutCubic,
}

impl Ease {
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::InQuad => t * t,
            Self::OutQuad => 1.0 - (1.0 - t) * (1.0 - t),
            Self::InOutQuad => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - ((-2.0 * t + 2.0).powi(2) / 2.0)
                }
            }
            Self::InOutCubic => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - ((-2.0 * t + 2.0).powi(3) / 2.0)
                }
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum InterpMode {
    Hold,
    Linear,
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CurveKey {
    pub frame: FrameNumber,
    pub value: f64,
    pub ease: Ease,
}

/// A scalar keyframe curve sampled in a section's local time-space.
///
/// Keys must be sorted by frame. Sampling outside the keyed span clamps to
/// the first/last key, which is what makes forced-time evaluation of a
/// section beyond its authored range well defined.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Curve {
    pub keys: Vec<CurveKey>,
    pub mode: InterpMode,
    pub default: Option<f64>,
}

impl Curve {
    pub fn constant(value: f64) -> Self {
        Self {
            keys: vec![CurveKey {
                frame: FrameNumber(0),
                value,
                ease: Ease::Linear,
            }],
            mode: InterpMode::Hold,
            default: None,
        }
    }

    pub fn linear(keys: impl IntoIterator<Item = (i64, f64)>) -> Self {
        Self {
            keys: keys
                .into_iter()
                .map(|(frame, value)| CurveKey {
                    frame: FrameNumber(frame),
                    value,
                    ease: Ease::Linear,
                })
                .collect(),
            mode: InterpMode::Linear,
            default: None,
        }
    }

    pub fn validate(&self) -> PlayfieldResult<()> {
        if self.keys.is_empty() && self.default.is_none() {
            return Err(PlayfieldError::validation(
                "Curve must have at least one key or a default value",
            ));
        }
        if !self.keys.windows(2).all(|w| w[0].frame.0 <= w[1].frame.0) {
            return Err(PlayfieldError::validation(
                "Curve keys must be sorted by frame",
            ));
        }
        Ok(())
    }

    pub fn sample(&self, at: FrameNumber) -> PlayfieldResult<f64> {
        if self.keys.is_empty() {
            return self
                .default
                .ok_or_else(|| PlayfieldError::evaluation("Curve has no keys and no default"));
        }

        let idx = self.keys.partition_point(|k| k.frame.0 <= at.0);
        if idx == 0 {
            return Ok(self.keys[0].value);
        }
        if idx == self.keys.len() {
            return Ok(self.keys[idx - 1].value);
        }

        let a = &self.keys[idx - 1];
        let b = &self.keys[idx];
        match self.mode {
            InterpMode::Hold => Ok(a.value),
            InterpMode::Linear => {
                let span = (b.frame.0 - a.frame.0) as f64;
                let t = if span == 0.0 {
                    1.0
                } else {
                    (at.0 - a.frame.0) as f64 / span
                };
                let t = a.ease.apply(t);
                Ok(a.value + (b.value - a.value) * t)
            }
        }
    }
}
