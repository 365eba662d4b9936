//! Timing overrides and their resolution through the node tree.
//!
//! A node only stores what the caller set. The effective value of each
//! field is the node's runtime override, else its own value, else the
//! parent's effective value, else the engine default.

use serde::{Deserialize, Serialize};

use crate::error::{AnimationError, Result};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FillMode {
    None,
    Forwards,
    Backwards,
    #[default]
    Both,
    Auto,
}

impl FillMode {
    pub fn as_css(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Forwards => "forwards",
            Self::Backwards => "backwards",
            Self::Both => "both",
            Self::Auto => "auto",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlaybackDirection {
    #[default]
    Normal,
    Reverse,
    Alternate,
    AlternateReverse,
}

impl PlaybackDirection {
    pub fn as_css(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Reverse => "reverse",
            Self::Alternate => "alternate",
            Self::AlternateReverse => "alternate-reverse",
        }
    }

    /// Direction used to play the same animation backwards.
    pub fn reversed(&self) -> Self {
        match self {
            Self::Normal => Self::Reverse,
            Self::Reverse => Self::Normal,
            Self::Alternate => Self::AlternateReverse,
            Self::AlternateReverse => Self::Alternate,
        }
    }

    #[inline]
    pub fn is_reverse(&self) -> bool {
        matches!(self, Self::Reverse | Self::AlternateReverse)
    }
}

/// Values set on a node through the builder. `None` inherits.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingOverrides {
    pub duration: Option<f64>,
    pub delay: Option<f64>,
    pub easing: Option<String>,
    pub iterations: Option<f64>,
    pub fill: Option<FillMode>,
    pub direction: Option<PlaybackDirection>,
}

impl TimingOverrides {
    pub fn validate(&self) -> Result<()> {
        if let Some(d) = self.duration {
            if d.is_nan() || d < 0.0 {
                return Err(AnimationError::configuration(format!(
                    "duration must be >= 0 ms, got {d}"
                )));
            }
        }
        if let Some(d) = self.delay {
            if d.is_nan() || d < 0.0 {
                return Err(AnimationError::configuration(format!(
                    "delay must be >= 0 ms, got {d}"
                )));
            }
        }
        if let Some(i) = self.iterations {
            if i.is_nan() || i <= 0.0 {
                return Err(AnimationError::configuration(format!(
                    "iterations must be > 0, got {i}"
                )));
            }
        }
        Ok(())
    }
}

/// Runtime overrides installed by the progress API. Cleared on every new run.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct ForcedTiming {
    pub duration: Option<f64>,
    pub direction: Option<PlaybackDirection>,
    pub linear: bool,
}

/// Fully resolved timing handed to a backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EffectTiming {
    pub duration: f64,
    pub delay: f64,
    pub easing: String,
    pub iterations: f64,
    pub fill: FillMode,
    pub direction: PlaybackDirection,
}

pub const DEFAULT_EASING: &str = "linear";

impl Default for EffectTiming {
    fn default() -> Self {
        Self {
            duration: 0.0,
            delay: 0.0,
            easing: DEFAULT_EASING.to_string(),
            iterations: 1.0,
            fill: FillMode::Both,
            direction: PlaybackDirection::Normal,
        }
    }
}

impl EffectTiming {
    pub(crate) fn resolve(
        own: &TimingOverrides,
        forced: &ForcedTiming,
        parent: Option<&EffectTiming>,
    ) -> Self {
        let base = parent.cloned().unwrap_or_default();
        let easing = if forced.linear {
            DEFAULT_EASING.to_string()
        } else {
            own.easing.clone().unwrap_or(base.easing)
        };
        Self {
            duration: forced.duration.or(own.duration).unwrap_or(base.duration),
            delay: own.delay.unwrap_or(base.delay),
            easing,
            iterations: own.iterations.unwrap_or(base.iterations),
            fill: own.fill.unwrap_or(base.fill),
            direction: forced
                .direction
                .or(own.direction)
                .unwrap_or(base.direction),
        }
    }

    /// A zero-length effect completes as soon as it starts.
    #[inline]
    pub fn is_instant(&self) -> bool {
        self.duration <= 0.0
    }

    /// `animation-iteration-count` value.
    pub fn css_iteration_count(&self) -> String {
        if self.iterations.is_infinite() {
            "infinite".to_string()
        } else {
            format!("{}", self.iterations)
        }
    }

    /// Local time for a fractional position of one iteration.
    pub fn time_at_step(&self, step: f64) -> f64 {
        self.delay + self.duration * step
    }
}
