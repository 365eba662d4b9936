//! Host contract: the only way the core reaches the page.
//!
//! Adapters implement [`Host`] over their element model (the wasm crate
//! wraps `web-sys`, the test fixtures keep an in-memory DOM). All methods
//! take `&self`; hosts use interior mutability because callbacks may
//! re-enter them while an event is being dispatched.

use std::rc::Rc;

use crate::error::Result;
use crate::ids::{ContainerId, ElementId, ListenerId, StyleId};
use crate::keyframes::Keyframe;
use crate::timing::EffectTiming;

/// Callback shape shared by listeners, finish notifications and hooks.
pub type Callback = Rc<dyn Fn()>;

/// Listener invoked with the dispatched event.
pub type EventListener = Rc<dyn Fn(&AnimationEvent)>;

/// The subset of an animation event the engine looks at.
#[derive(Clone, Debug, PartialEq)]
pub struct AnimationEvent {
    /// Element the event originated on; `None` when the host cannot map
    /// the target to a known handle.
    pub target: Option<ElementId>,
    pub animation_name: String,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ListenerOptions {
    pub passive: bool,
}

/// A running native (Web Animations) animation.
pub trait NativeAnimation {
    fn play(&self) -> Result<()>;
    fn pause(&self);
    fn cancel(&self);
    /// Local time in milliseconds, delay included.
    fn set_current_time(&self, ms: f64);
    fn update_timing(&self, timing: &EffectTiming);
    /// Replace the finish callback; `None` detaches it.
    fn set_on_finish(&self, callback: Option<Callback>);
}

pub trait Host {
    /// Current inline value of `property`, `None` when not set inline.
    fn inline_style(&self, element: ElementId, property: &str) -> Option<String>;

    /// `None` clears the value, like `style.setProperty(name, null)`.
    fn set_style_property(
        &self,
        element: ElementId,
        property: &str,
        value: Option<&str>,
    ) -> Result<()>;

    fn remove_style_property(&self, element: ElementId, property: &str) -> Result<()>;

    fn add_class(&self, element: ElementId, class: &str) -> Result<()>;

    fn remove_class(&self, element: ElementId, class: &str) -> Result<()>;

    /// Container owning generated styles for `element`: the document head,
    /// or the isolated root (shadow root) the element lives in.
    fn style_container(&self, element: ElementId) -> Result<ContainerId>;

    /// Style element with the given `id` attribute inside `container`.
    fn find_style(&self, container: ContainerId, id: &str) -> Option<StyleId>;

    /// Create a `<style id=..>` owned by `owner`'s document and append it to `container`.
    fn create_style(
        &self,
        owner: ElementId,
        container: ContainerId,
        id: &str,
        text: &str,
    ) -> Result<StyleId>;

    fn remove_style(&self, style: StyleId);

    /// Text content of a style element, `None` when it is unknown.
    fn style_text(&self, style: StyleId) -> Option<String>;

    fn add_event_listener(
        &self,
        element: ElementId,
        event: &str,
        options: ListenerOptions,
        listener: EventListener,
    ) -> Result<ListenerId>;

    /// Removing an unknown listener is a no-op.
    fn remove_event_listener(&self, element: ElementId, event: &str, listener: ListenerId);

    /// Whether `Element.animate` is available.
    fn supports_web_animations(&self) -> bool;

    /// Create a paused native animation.
    fn animate(
        &self,
        element: ElementId,
        keyframes: &[Keyframe],
        timing: &EffectTiming,
    ) -> Result<Box<dyn NativeAnimation>>;

    /// A destroyed node no longer targets `element`. Called once per
    /// (node, element) pair; hosts holding strong handles drop theirs here.
    fn release_element(&self, _element: ElementId) {}
}
