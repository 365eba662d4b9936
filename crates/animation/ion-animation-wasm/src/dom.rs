//! `Host` over the browser DOM via web-sys.
//!
//! Elements, style containers and style elements are registered on first
//! use and addressed by id from then on. Element handles are counted per
//! node that targets them and dropped once every such node is destroyed;
//! containers are kept only while a tracked style element lives in them.
//! Listener and finish closures are
//! handed to the JS garbage collector (`into_js_value`) so removing one
//! from inside its own invocation is safe.

use std::cell::RefCell;
use std::mem;
use std::rc::{Rc, Weak};

use js_sys::{Array, Function, Object, Reflect};
use log::warn;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    AddEventListenerOptions, DocumentFragment, Element, Event, HtmlElement, Node, ShadowRoot,
};

use ion_animation_core::{
    AnimationError, AnimationEvent, Callback, ContainerId, EffectTiming, ElementId,
    EventListener, Host, IdAllocator, Keyframe, ListenerId, ListenerOptions, NativeAnimation,
    Result, StyleId,
};

thread_local! {
    static SHARED: Rc<DomHost> = DomHost::new();
}

fn js_err(context: &str, err: JsValue) -> AnimationError {
    AnimationError::dom(format!("{context}: {err:?}"))
}

struct ListenerSlot {
    id: ListenerId,
    element: ElementId,
    event: String,
    function: Function,
}

struct ElementSlot {
    id: ElementId,
    element: HtmlElement,
    /// Nodes targeting this element.
    refs: usize,
}

struct StyleSlot {
    id: StyleId,
    element: Element,
    container: ContainerId,
}

#[derive(Default)]
struct Registry {
    ids: IdAllocator,
    elements: Vec<ElementSlot>,
    containers: Vec<(ContainerId, Node)>,
    styles: Vec<StyleSlot>,
    listeners: Vec<ListenerSlot>,
}

impl Registry {
    fn element(&self, id: ElementId) -> Result<HtmlElement> {
        self.elements
            .iter()
            .find(|slot| slot.id == id)
            .map(|slot| slot.element.clone())
            .ok_or_else(|| AnimationError::dom(format!("unknown element {id:?}")))
    }

    fn element_id_of(&self, target: &JsValue) -> Option<ElementId> {
        self.elements
            .iter()
            .find(|slot| Object::is(slot.element.as_ref(), target))
            .map(|slot| slot.id)
    }

    fn prune_containers(&mut self) {
        let styles = &self.styles;
        self.containers
            .retain(|(id, _)| styles.iter().any(|s| s.container == *id));
    }

    fn container(&self, id: ContainerId) -> Option<Node> {
        self.containers
            .iter()
            .find(|(c, _)| *c == id)
            .map(|(_, node)| node.clone())
    }

    fn container_id_of(&mut self, node: &Node) -> ContainerId {
        if let Some((id, _)) = self
            .containers
            .iter()
            .find(|(_, n)| Object::is(n.as_ref(), node.as_ref()))
        {
            return *id;
        }
        let id = self.ids.alloc_container();
        self.containers.push((id, node.clone()));
        id
    }

    fn style_id_of(&mut self, element: &Element, container: ContainerId) -> StyleId {
        if let Some(slot) = self
            .styles
            .iter()
            .find(|s| Object::is(s.element.as_ref(), element.as_ref()))
        {
            return slot.id;
        }
        let id = self.ids.alloc_style();
        self.styles.push(StyleSlot {
            id,
            element: element.clone(),
            container,
        });
        id
    }
}

pub struct DomHost {
    this: Weak<DomHost>,
    registry: RefCell<Registry>,
    web_animations: bool,
}

impl DomHost {
    fn new() -> Rc<Self> {
        Rc::new_cyclic(|this| DomHost {
            this: this.clone(),
            registry: RefCell::new(Registry::default()),
            web_animations: detect_web_animations(),
        })
    }

    /// The per-thread host every wasm-facing animation uses.
    pub fn shared() -> Rc<DomHost> {
        SHARED.with(Rc::clone)
    }

    /// Handle for `element`, registering it on first sight. Each call takes
    /// a reference that [`Host::release_element`] gives back.
    pub fn register(&self, element: &HtmlElement) -> ElementId {
        let mut reg = self.registry.borrow_mut();
        if let Some(slot) = reg
            .elements
            .iter_mut()
            .find(|slot| Object::is(slot.element.as_ref(), element.as_ref()))
        {
            slot.refs += 1;
            return slot.id;
        }
        let id = reg.ids.alloc_element();
        reg.elements.push(ElementSlot {
            id,
            element: element.clone(),
            refs: 1,
        });
        id
    }

    /// Elements currently held.
    pub fn element_count(&self) -> usize {
        self.registry.borrow().elements.len()
    }

    /// Style containers currently held.
    pub fn container_count(&self) -> usize {
        self.registry.borrow().containers.len()
    }

    fn element(&self, id: ElementId) -> Result<HtmlElement> {
        self.registry.borrow().element(id)
    }
}

fn detect_web_animations() -> bool {
    let Some(root) = web_sys::window()
        .and_then(|w| w.document())
        .and_then(|d| d.document_element())
    else {
        return false;
    };
    Reflect::get(root.as_ref(), &JsValue::from_str("animate"))
        .map(|f| f.is_function())
        .unwrap_or(false)
}

fn timing_object(timing: &EffectTiming) -> Result<Object> {
    let obj = Object::new();
    let set = |key: &str, value: JsValue| {
        Reflect::set(&obj, &JsValue::from_str(key), &value)
            .map(|_| ())
            .map_err(|e| js_err("timing", e))
    };
    set("duration", JsValue::from_f64(timing.duration))?;
    set("delay", JsValue::from_f64(timing.delay))?;
    set("easing", JsValue::from_str(&timing.easing))?;
    set("iterations", JsValue::from_f64(timing.iterations))?;
    set("fill", JsValue::from_str(timing.fill.as_css()))?;
    set("direction", JsValue::from_str(timing.direction.as_css()))?;
    Ok(obj)
}

fn keyframe_array(keyframes: &[Keyframe]) -> Result<Array> {
    let frames = Array::new();
    for frame in keyframes {
        let obj = Object::new();
        if let Some(offset) = frame.offset {
            Reflect::set(&obj, &JsValue::from_str("offset"), &JsValue::from_f64(offset))
                .map_err(|e| js_err("keyframe offset", e))?;
        }
        for (property, value) in frame.properties() {
            Reflect::set(
                &obj,
                &JsValue::from_str(property),
                &JsValue::from_str(value.as_str()),
            )
            .map_err(|e| js_err("keyframe property", e))?;
        }
        frames.push(&obj);
    }
    Ok(frames)
}

struct WebAnimation {
    animation: web_sys::Animation,
}

impl NativeAnimation for WebAnimation {
    fn play(&self) -> Result<()> {
        self.animation.play().map_err(|e| js_err("play", e))
    }

    fn pause(&self) {
        if let Err(e) = self.animation.pause() {
            warn!("animation pause failed: {e:?}");
        }
    }

    fn cancel(&self) {
        self.animation.cancel();
    }

    fn set_current_time(&self, ms: f64) {
        self.animation.set_current_time(Some(ms));
    }

    fn update_timing(&self, timing: &EffectTiming) {
        let update = || -> Result<()> {
            let effect = Reflect::get(self.animation.as_ref(), &JsValue::from_str("effect"))
                .map_err(|e| js_err("effect", e))?;
            if effect.is_null() || effect.is_undefined() {
                return Ok(());
            }
            let method: Function = Reflect::get(&effect, &JsValue::from_str("updateTiming"))
                .map_err(|e| js_err("updateTiming", e))?
                .dyn_into()
                .map_err(|e| js_err("updateTiming", e))?;
            method
                .call1(&effect, &timing_object(timing)?.into())
                .map(|_| ())
                .map_err(|e| js_err("updateTiming", e))
        };
        if let Err(e) = update() {
            warn!("{e}");
        }
    }

    fn set_on_finish(&self, callback: Option<Callback>) {
        match callback {
            Some(cb) => {
                let function: Function = Closure::<dyn FnMut()>::new(move || cb())
                    .into_js_value()
                    .unchecked_into();
                self.animation.set_onfinish(Some(&function));
            }
            None => self.animation.set_onfinish(None),
        }
    }
}

impl Host for DomHost {
    fn inline_style(&self, element: ElementId, property: &str) -> Option<String> {
        let el = self.element(element).ok()?;
        el.style()
            .get_property_value(property)
            .ok()
            .filter(|v| !v.is_empty())
    }

    fn set_style_property(&self, element: ElementId, property: &str, value: Option<&str>) -> Result<()> {
        let style = self.element(element)?.style();
        match value {
            Some(v) => style
                .set_property(property, v)
                .map_err(|e| js_err(property, e)),
            None => style
                .remove_property(property)
                .map(|_| ())
                .map_err(|e| js_err(property, e)),
        }
    }

    fn remove_style_property(&self, element: ElementId, property: &str) -> Result<()> {
        self.set_style_property(element, property, None)
    }

    fn add_class(&self, element: ElementId, class: &str) -> Result<()> {
        self.element(element)?
            .class_list()
            .add_1(class)
            .map_err(|e| js_err("classList.add", e))
    }

    fn remove_class(&self, element: ElementId, class: &str) -> Result<()> {
        self.element(element)?
            .class_list()
            .remove_1(class)
            .map_err(|e| js_err("classList.remove", e))
    }

    fn style_container(&self, element: ElementId) -> Result<ContainerId> {
        let el = self.element(element)?;
        let root = el.get_root_node();
        let container: Node = if root.dyn_ref::<ShadowRoot>().is_some() {
            root
        } else {
            el.owner_document()
                .and_then(|d| d.head())
                .map(Node::from)
                .ok_or_else(|| AnimationError::dom("element has no document head"))?
        };
        Ok(self.registry.borrow_mut().container_id_of(&container))
    }

    fn find_style(&self, container: ContainerId, id: &str) -> Option<StyleId> {
        let node = self.registry.borrow().container(container)?;
        let selector = format!("#{id}");
        let found = if let Some(el) = node.dyn_ref::<Element>() {
            el.query_selector(&selector)
        } else if let Some(fragment) = node.dyn_ref::<DocumentFragment>() {
            fragment.query_selector(&selector)
        } else {
            Ok(None)
        };
        let style = found.ok().flatten()?;
        Some(self.registry.borrow_mut().style_id_of(&style, container))
    }

    fn create_style(&self, owner: ElementId, container: ContainerId, id: &str, text: &str) -> Result<StyleId> {
        let el = self.element(owner)?;
        let node = self
            .registry
            .borrow()
            .container(container)
            .ok_or_else(|| AnimationError::dom(format!("unknown container {container:?}")))?;
        let document = el
            .owner_document()
            .ok_or_else(|| AnimationError::dom("element has no owner document"))?;
        let style = document
            .create_element("style")
            .map_err(|e| js_err("createElement", e))?;
        style.set_id(id);
        style.set_text_content(Some(text));
        node.append_child(&style)
            .map_err(|e| js_err("appendChild", e))?;
        Ok(self.registry.borrow_mut().style_id_of(&style, container))
    }

    fn remove_style(&self, style: StyleId) {
        let removed = {
            let mut reg = self.registry.borrow_mut();
            let index = reg.styles.iter().position(|s| s.id == style);
            let removed = index.map(|i| reg.styles.swap_remove(i).element);
            reg.prune_containers();
            removed
        };
        if let Some(element) = removed {
            element.remove();
        }
    }

    fn style_text(&self, style: StyleId) -> Option<String> {
        self.registry
            .borrow()
            .styles
            .iter()
            .find(|s| s.id == style)
            .and_then(|s| s.element.text_content())
    }

    fn release_element(&self, element: ElementId) {
        let (el, listeners) = {
            let mut reg = self.registry.borrow_mut();
            let Some(index) = reg.elements.iter().position(|slot| slot.id == element) else {
                return;
            };
            reg.elements[index].refs = reg.elements[index].refs.saturating_sub(1);
            if reg.elements[index].refs > 0 {
                return;
            }
            let slot = reg.elements.swap_remove(index);
            let (gone, kept): (Vec<_>, Vec<_>) = mem::take(&mut reg.listeners)
                .into_iter()
                .partition(|l| l.element == element);
            reg.listeners = kept;
            reg.prune_containers();
            (slot.element, gone)
        };
        for listener in listeners {
            if let Err(e) = el.remove_event_listener_with_callback(&listener.event, &listener.function) {
                warn!("removeEventListener({}) failed: {e:?}", listener.event);
            }
        }
    }

    fn add_event_listener(
        &self,
        element: ElementId,
        event: &str,
        options: ListenerOptions,
        listener: EventListener,
    ) -> Result<ListenerId> {
        let el = self.element(element)?;
        let host = self.this.clone();
        let function: Function = Closure::<dyn FnMut(Event)>::new(move |ev: Event| {
            let target = match (host.upgrade(), ev.target()) {
                (Some(host), Some(t)) => host.registry.borrow().element_id_of(t.as_ref()),
                _ => None,
            };
            let animation_name = ev
                .dyn_ref::<web_sys::AnimationEvent>()
                .map(|a| a.animation_name())
                .unwrap_or_default();
            listener(&AnimationEvent {
                target,
                animation_name,
            });
        })
        .into_js_value()
        .unchecked_into();

        let opts = AddEventListenerOptions::new();
        opts.set_passive(options.passive);
        el.add_event_listener_with_callback_and_add_event_listener_options(event, &function, &opts)
            .map_err(|e| js_err("addEventListener", e))?;

        let mut reg = self.registry.borrow_mut();
        let id = reg.ids.alloc_listener();
        reg.listeners.push(ListenerSlot {
            id,
            element,
            event: event.to_string(),
            function,
        });
        Ok(id)
    }

    fn remove_event_listener(&self, element: ElementId, event: &str, listener: ListenerId) {
        let slot = {
            let mut reg = self.registry.borrow_mut();
            let index = reg
                .listeners
                .iter()
                .position(|l| l.id == listener && l.element == element && l.event == event);
            index.map(|i| reg.listeners.swap_remove(i))
        };
        let (Some(slot), Ok(el)) = (slot, self.element(element)) else {
            return;
        };
        if let Err(e) = el.remove_event_listener_with_callback(&slot.event, &slot.function) {
            warn!("removeEventListener({event}) failed: {e:?}");
        }
    }

    fn supports_web_animations(&self) -> bool {
        self.web_animations
    }

    fn animate(
        &self,
        element: ElementId,
        keyframes: &[Keyframe],
        timing: &EffectTiming,
    ) -> Result<Box<dyn NativeAnimation>> {
        let el = self.element(element)?;
        let animate: Function = Reflect::get(el.as_ref(), &JsValue::from_str("animate"))
            .map_err(|e| js_err("animate", e))?
            .dyn_into()
            .map_err(|_| AnimationError::dom("Element.animate is not available"))?;
        let animation: web_sys::Animation = animate
            .call2(el.as_ref(), &keyframe_array(keyframes)?.into(), &timing_object(timing)?.into())
            .map_err(|e| js_err("animate", e))?
            .dyn_into()
            .map_err(|e| js_err("animate result", e))?;
        Ok(Box::new(WebAnimation { animation }))
    }
}
