//! Playback strategies. A node picks one when it is built, based on what
//! the host supports, and drives every effect through it.

use std::rc::Rc;

use log::{trace, warn};

use crate::bridge::{on_animation_end, Unregister};
use crate::config::Config;
use crate::error::Result;
use crate::host::{Callback, Host, NativeAnimation};
use crate::ids::ElementId;
use crate::keyframes::{generate_keyframe_rules, process_keyframes, Keyframe};
use crate::styles::{remove_style_property, set_style_property};
use crate::stylesheet::{create_keyframe_stylesheet, SharedRegistry, Stylesheet};
use crate::timing::EffectTiming;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BackendKind {
    WebAnimations,
    CssKeyframes,
}

/// What one effect animates: a single element through a keyframe list.
pub struct EffectRequest<'a> {
    pub element: ElementId,
    pub keyframes: &'a [Keyframe],
    pub timing: &'a EffectTiming,
    /// Explicit `@keyframes` name instead of a generated one.
    pub keyframe_name: Option<&'a str>,
}

pub trait PlaybackBackend {
    fn kind(&self) -> BackendKind;

    /// Prepare a paused effect. `on_complete` fires when it finishes.
    fn create(
        &self,
        request: EffectRequest<'_>,
        on_complete: Callback,
    ) -> Result<Box<dyn RunningEffect>>;
}

pub trait RunningEffect {
    fn element(&self) -> ElementId;
    fn play(&mut self) -> Result<()>;
    fn pause(&mut self);
    /// Jump to a fractional position of the first iteration.
    fn seek(&mut self, step: f64);
    fn update_timing(&mut self, timing: &EffectTiming);
    /// Cancel and remove every trace from the element.
    fn stop(&mut self);
    /// Tear down ahead of a replay on the same element.
    fn detach(&mut self);
    fn stylesheet(&self) -> Option<&Stylesheet> {
        None
    }
}

/// Native when available and not disabled by config, CSS keyframes otherwise.
pub fn select_backend(
    host: &Rc<dyn Host>,
    config: &Config,
    registry: &SharedRegistry,
) -> Rc<dyn PlaybackBackend> {
    if host.supports_web_animations() && !config.force_css_fallback {
        Rc::new(WebAnimationsBackend { host: host.clone() })
    } else {
        Rc::new(CssKeyframesBackend {
            host: host.clone(),
            registry: registry.clone(),
            emit_alt: config.emit_alt_keyframes,
        })
    }
}

pub struct WebAnimationsBackend {
    host: Rc<dyn Host>,
}

impl PlaybackBackend for WebAnimationsBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::WebAnimations
    }

    fn create(
        &self,
        request: EffectRequest<'_>,
        on_complete: Callback,
    ) -> Result<Box<dyn RunningEffect>> {
        let mut frames = request.keyframes.to_vec();
        process_keyframes(&mut frames);
        let animation = self
            .host
            .animate(request.element, &frames, request.timing)?;
        animation.pause();
        animation.set_on_finish(Some(on_complete));
        Ok(Box::new(NativeEffect {
            element: request.element,
            animation,
            timing: request.timing.clone(),
        }))
    }
}

struct NativeEffect {
    element: ElementId,
    animation: Box<dyn NativeAnimation>,
    timing: EffectTiming,
}

impl RunningEffect for NativeEffect {
    fn element(&self) -> ElementId {
        self.element
    }

    fn play(&mut self) -> Result<()> {
        self.animation.play()
    }

    fn pause(&mut self) {
        self.animation.pause();
    }

    fn seek(&mut self, step: f64) {
        self.animation
            .set_current_time(self.timing.time_at_step(step));
    }

    fn update_timing(&mut self, timing: &EffectTiming) {
        self.timing = timing.clone();
        self.animation.update_timing(timing);
    }

    fn stop(&mut self) {
        self.animation.set_on_finish(None);
        self.animation.cancel();
    }

    fn detach(&mut self) {
        self.stop();
    }
}

pub const CSS_ANIMATION_PROPERTIES: [&str; 8] = [
    "animation-name",
    "animation-duration",
    "animation-timing-function",
    "animation-delay",
    "animation-fill-mode",
    "animation-direction",
    "animation-iteration-count",
    "animation-play-state",
];

pub struct CssKeyframesBackend {
    host: Rc<dyn Host>,
    registry: SharedRegistry,
    emit_alt: bool,
}

impl PlaybackBackend for CssKeyframesBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::CssKeyframes
    }

    fn create(
        &self,
        request: EffectRequest<'_>,
        on_complete: Callback,
    ) -> Result<Box<dyn RunningEffect>> {
        let rules = generate_keyframe_rules(request.keyframes);
        let name = match request.keyframe_name {
            Some(name) => name.to_string(),
            None => self.registry.borrow_mut().register(&rules, self.emit_alt),
        };
        let sheet = create_keyframe_stylesheet(
            &*self.host,
            &name,
            &rules,
            request.element,
            self.emit_alt,
        )?;

        // Only toggle when the element actually defines the alt rule; a sheet
        // found under this name may have been written without it.
        let toggles = self.emit_alt && sheet.has_alt;
        let effect = CssEffect {
            host: self.host.clone(),
            element: request.element,
            sheet,
            timing: request.timing.clone(),
            toggles,
            on_complete,
            listener: Unregister::noop(),
        };
        effect.write_timing()?;
        effect.set("animation-play-state", "paused")?;

        // Same name already applied means the browser will not restart it.
        let current = self.host.inline_style(request.element, "animation-name");
        let applied = if toggles && current.as_deref() == Some(name.as_str()) {
            format!("{name}-alt")
        } else {
            name
        };
        effect.set("animation-name", &applied)?;
        trace!("css effect {applied} on {:?}", request.element);
        Ok(Box::new(effect))
    }
}

struct CssEffect {
    host: Rc<dyn Host>,
    element: ElementId,
    sheet: Stylesheet,
    timing: EffectTiming,
    /// Replays alternate between `name` and `name-alt`.
    toggles: bool,
    on_complete: Callback,
    listener: Unregister,
}

impl CssEffect {
    fn set(&self, property: &str, value: &str) -> Result<()> {
        set_style_property(&*self.host, self.element, property, Some(value))
    }

    fn write_timing(&self) -> Result<()> {
        let t = &self.timing;
        self.set("animation-duration", &format!("{}ms", t.duration))?;
        self.set("animation-timing-function", &t.easing)?;
        self.set("animation-delay", &format!("{}ms", t.delay))?;
        self.set("animation-fill-mode", t.fill.as_css())?;
        self.set("animation-direction", t.direction.as_css())?;
        self.set("animation-iteration-count", &t.css_iteration_count())
    }

    fn set_or_warn(&self, property: &str, value: &str) {
        if let Err(e) = self.set(property, value) {
            warn!("css effect on {:?}: {property}: {e}", self.element);
        }
    }

    fn remove_properties(&self, keep_name: bool) {
        for property in CSS_ANIMATION_PROPERTIES {
            if keep_name && property == "animation-name" {
                continue;
            }
            if let Err(e) = remove_style_property(&*self.host, self.element, property) {
                warn!("css effect on {:?}: remove {property}: {e}", self.element);
            }
        }
    }
}

impl RunningEffect for CssEffect {
    fn element(&self) -> ElementId {
        self.element
    }

    fn play(&mut self) -> Result<()> {
        if !self.listener.is_active() {
            let done = self.on_complete.clone();
            self.listener = on_animation_end(&self.host, Some(self.element), move |_| done())?;
        }
        self.set("animation-play-state", "running")
    }

    fn pause(&mut self) {
        self.set_or_warn("animation-play-state", "paused");
    }

    fn seek(&mut self, step: f64) {
        let offset = -(step * self.timing.duration);
        self.set_or_warn("animation-delay", &format!("{offset}ms"));
    }

    fn update_timing(&mut self, timing: &EffectTiming) {
        self.timing = timing.clone();
        if let Err(e) = self.write_timing() {
            warn!("css effect on {:?}: timing update: {e}", self.element);
        }
    }

    fn stop(&mut self) {
        self.listener.call();
        self.remove_properties(false);
    }

    fn detach(&mut self) {
        self.listener.call();
        self.remove_properties(self.toggles);
    }

    fn stylesheet(&self) -> Option<&Stylesheet> {
        Some(&self.sheet)
    }
}
