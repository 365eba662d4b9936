//! Core configuration for ion-animation-core.

use serde::{Deserialize, Serialize};

/// Per-node playback configuration. Children created by callers carry their
/// own copy; nothing is inherited through the tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Emit a `{name}-alt` duplicate `@keyframes` block next to every
    /// generated one. Re-triggering a CSS animation on an element that
    /// already carries the same `animation-name` needs a different name.
    pub emit_alt_keyframes: bool,

    /// Use the CSS keyframe backend even when the host supports native
    /// Web Animations.
    pub force_css_fallback: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            emit_alt_keyframes: true,
            force_css_fallback: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: Config = serde_json::from_str(r#"{ "force_css_fallback": true }"#).unwrap();
        assert!(cfg.force_css_fallback);
        assert!(cfg.emit_alt_keyframes);
    }
}
