//! Ion Animation Core (host-agnostic)
//!
//! Builds trees of keyframe animations and plays them through whatever the
//! host offers: native Web Animations when available, generated CSS
//! `@keyframes` otherwise. The page is reached only through the [`Host`]
//! trait, so the same engine runs against a browser DOM (see the wasm
//! adapter) or an in-memory document in tests.

pub mod animation;
pub mod backend;
pub mod bridge;
pub mod config;
pub mod deferred;
pub mod error;
pub mod host;
pub mod ids;
pub mod keyframes;
pub mod state;
pub mod styles;
pub mod stylesheet;
pub mod timing;

// Re-exports for consumers (adapters)
pub use animation::{Animation, ClassList, FinishCallback, ProgressTarget};
pub use backend::{BackendKind, PlaybackBackend, RunningEffect};
pub use bridge::{on_animation_end, Unregister, ANIMATION_END_EVENTS};
pub use config::Config;
pub use deferred::Deferred;
pub use error::{AnimationError, Result};
pub use host::{AnimationEvent, Callback, EventListener, Host, ListenerOptions, NativeAnimation};
pub use ids::{AnimationId, ContainerId, ElementId, IdAllocator, ListenerId, StyleId};
pub use keyframes::{
    computed_offsets, convert_hyphen_to_camel_case, css_property_name, generate_keyframe_rules,
    keyframes_from_json, process_keyframes, validate_keyframes, CssValue, Keyframe,
};
pub use state::PlaybackState;
pub use styles::{remove_style_property, set_style_property, StyleSnapshot};
pub use stylesheet::{
    create_keyframe_stylesheet, keyframe_stylesheet_text, KeyframeRegistry, SharedRegistry,
    Stylesheet, DEFAULT_KEYFRAME_PREFIX,
};
pub use timing::{EffectTiming, FillMode, PlaybackDirection, TimingOverrides};
