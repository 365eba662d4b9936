use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use ion_animation_core::{
    AnimationError, AnimationEvent, Callback, ContainerId, EffectTiming, ElementId,
    EventListener, Host, IdAllocator, Keyframe, ListenerId, ListenerOptions, NativeAnimation,
    StyleId,
};

static MANIFEST: Lazy<Manifest> = Lazy::new(|| {
    let raw = include_str!("../../../../fixtures/manifest.json");
    serde_json::from_str(raw).expect("fixtures manifest should parse")
});

#[derive(Debug, Deserialize)]
struct Manifest {
    keyframes: HashMap<String, String>,
}

fn fixtures_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../../fixtures")
}

fn resolve_path(rel: &str) -> PathBuf {
    fixtures_root().join(rel)
}

fn read_to_string(rel: &str) -> Result<String> {
    let path = resolve_path(rel);
    fs::read_to_string(&path)
        .with_context(|| format!("failed to read fixture at {}", path.display()))
}

fn load_json<T: DeserializeOwned>(rel: &str) -> Result<T> {
    let text = read_to_string(rel)?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse JSON fixture {rel}"))
}

fn lookup<'a, T>(map: &'a HashMap<String, T>, kind: &str, name: &str) -> Result<&'a T> {
    map.get(name)
        .ok_or_else(|| anyhow!("unknown {kind} fixture '{name}'"))
}

pub mod keyframes {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.keyframes.keys().cloned().collect()
    }

    pub fn json(name: &str) -> Result<String> {
        let rel = lookup(&MANIFEST.keyframes, "keyframes", name)?;
        read_to_string(rel)
    }

    pub fn load<T: DeserializeOwned>(name: &str) -> Result<T> {
        let rel = lookup(&MANIFEST.keyframes, "keyframes", name)?;
        super::load_json(rel)
    }

    /// Parsed keyframe list.
    pub fn frames(name: &str) -> Result<Vec<Keyframe>> {
        let value: serde_json::Value = load(name)?;
        ion_animation_core::keyframes_from_json(&value)
            .map_err(|e| anyhow!("fixture '{name}' is not a keyframe list: {e}"))
    }

    pub fn path(name: &str) -> Result<PathBuf> {
        let rel = lookup(&MANIFEST.keyframes, "keyframes", name)?;
        Ok(resolve_path(rel))
    }
}

// ---------------------------------------------------------------------------
// In-memory document
// ---------------------------------------------------------------------------

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NativeState {
    Paused,
    Running,
    Finished,
    Cancelled,
}

/// Observable state of one native animation created through `animate`.
#[derive(Clone, Debug, PartialEq)]
pub struct NativeRecord {
    pub element: ElementId,
    pub keyframes: Vec<Keyframe>,
    pub timing: EffectTiming,
    pub state: NativeState,
    pub current_time: f64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StyleRecord {
    pub style: StyleId,
    pub container: ContainerId,
    pub id: String,
    pub text: String,
}

struct ElementNode {
    container: ContainerId,
    detached: bool,
    styles: Vec<(String, String)>,
    classes: Vec<String>,
}

struct ListenerEntry {
    id: ListenerId,
    element: ElementId,
    event: String,
    passive: bool,
    listener: EventListener,
}

struct NativeSlot {
    record: NativeRecord,
    on_finish: Option<Callback>,
}

struct Dom {
    ids: IdAllocator,
    head: ContainerId,
    containers: Vec<ContainerId>,
    elements: HashMap<ElementId, ElementNode>,
    styles: Vec<StyleRecord>,
    listeners: Vec<ListenerEntry>,
    natives: Vec<NativeSlot>,
    /// Every `release_element` call, in order.
    released: Vec<ElementId>,
}

impl Dom {
    fn live(&self, element: ElementId) -> ion_animation_core::Result<&ElementNode> {
        match self.elements.get(&element) {
            Some(node) if !node.detached => Ok(node),
            Some(_) => Err(AnimationError::dom(format!("{element:?} is detached"))),
            None => Err(AnimationError::dom(format!("unknown element {element:?}"))),
        }
    }

    fn live_mut(&mut self, element: ElementId) -> ion_animation_core::Result<&mut ElementNode> {
        match self.elements.get_mut(&element) {
            Some(node) if !node.detached => Ok(node),
            Some(_) => Err(AnimationError::dom(format!("{element:?} is detached"))),
            None => Err(AnimationError::dom(format!("unknown element {element:?}"))),
        }
    }
}

/// Document stand-in for driving the engine without a browser. Events and
/// native animation completions only happen when a test triggers them.
pub struct MemoryHost {
    dom: Rc<RefCell<Dom>>,
    web_animations: Cell<bool>,
}

impl MemoryHost {
    /// Host without `Element.animate`, so nodes use CSS keyframes.
    pub fn new() -> Rc<Self> {
        let mut ids = IdAllocator::new();
        let head = ids.alloc_container();
        let dom = Dom {
            ids,
            head,
            containers: vec![head],
            elements: HashMap::new(),
            styles: Vec::new(),
            listeners: Vec::new(),
            natives: Vec::new(),
            released: Vec::new(),
        };
        Rc::new(Self {
            dom: Rc::new(RefCell::new(dom)),
            web_animations: Cell::new(false),
        })
    }

    pub fn with_web_animations() -> Rc<Self> {
        let host = Self::new();
        host.web_animations.set(true);
        host
    }

    pub fn as_host(self: &Rc<Self>) -> Rc<dyn Host> {
        self.clone()
    }

    pub fn head(&self) -> ContainerId {
        self.dom.borrow().head
    }

    pub fn create_shadow_root(&self) -> ContainerId {
        let mut dom = self.dom.borrow_mut();
        let root = dom.ids.alloc_container();
        dom.containers.push(root);
        root
    }

    pub fn create_element(&self) -> ElementId {
        let head = self.head();
        self.create_element_in(head)
    }

    pub fn create_element_in(&self, container: ContainerId) -> ElementId {
        let mut dom = self.dom.borrow_mut();
        let id = dom.ids.alloc_element();
        dom.elements.insert(
            id,
            ElementNode {
                container,
                detached: false,
                styles: Vec::new(),
                classes: Vec::new(),
            },
        );
        id
    }

    /// Every later DOM write on `element` fails.
    pub fn detach(&self, element: ElementId) {
        if let Some(node) = self.dom.borrow_mut().elements.get_mut(&element) {
            node.detached = true;
        }
    }

    pub fn inline_styles(&self, element: ElementId) -> Vec<(String, String)> {
        self.dom
            .borrow()
            .elements
            .get(&element)
            .map(|n| n.styles.clone())
            .unwrap_or_default()
    }

    pub fn style(&self, element: ElementId, property: &str) -> Option<String> {
        Host::inline_style(self, element, property)
    }

    pub fn classes(&self, element: ElementId) -> Vec<String> {
        self.dom
            .borrow()
            .elements
            .get(&element)
            .map(|n| n.classes.clone())
            .unwrap_or_default()
    }

    pub fn stylesheets(&self) -> Vec<StyleRecord> {
        self.dom.borrow().styles.clone()
    }

    pub fn stylesheets_in(&self, container: ContainerId) -> Vec<StyleRecord> {
        self.dom
            .borrow()
            .styles
            .iter()
            .filter(|s| s.container == container)
            .cloned()
            .collect()
    }

    pub fn style_count(&self) -> usize {
        self.dom.borrow().styles.len()
    }

    /// How many times the engine released `element`.
    pub fn released(&self, element: ElementId) -> usize {
        self.dom
            .borrow()
            .released
            .iter()
            .filter(|e| **e == element)
            .count()
    }

    pub fn listener_count(&self, element: ElementId) -> usize {
        self.dom
            .borrow()
            .listeners
            .iter()
            .filter(|l| l.element == element)
            .count()
    }

    /// `(event, passive)` for each listener on `element`.
    pub fn listeners(&self, element: ElementId) -> Vec<(String, bool)> {
        self.dom
            .borrow()
            .listeners
            .iter()
            .filter(|l| l.element == element)
            .map(|l| (l.event.clone(), l.passive))
            .collect()
    }

    /// Deliver `event` to listeners on `element`, as if it originated on `target`.
    pub fn dispatch(&self, element: ElementId, event: &str, target: Option<ElementId>) {
        let animation_name = target
            .and_then(|t| Host::inline_style(self, t, "animation-name"))
            .unwrap_or_default();
        let listeners: Vec<EventListener> = self
            .dom
            .borrow()
            .listeners
            .iter()
            .filter(|l| l.element == element && l.event == event)
            .map(|l| l.listener.clone())
            .collect();
        let ev = AnimationEvent {
            target,
            animation_name,
        };
        for listener in listeners {
            listener(&ev);
        }
    }

    /// Browser-style `animationend` plus its prefixed twin on `element`.
    pub fn fire_animation_end(&self, element: ElementId) {
        self.dispatch(element, "webkitAnimationEnd", Some(element));
        self.dispatch(element, "animationend", Some(element));
    }

    pub fn native_animations(&self) -> Vec<NativeRecord> {
        self.dom
            .borrow()
            .natives
            .iter()
            .map(|n| n.record.clone())
            .collect()
    }

    pub fn native_animations_on(&self, element: ElementId) -> Vec<NativeRecord> {
        self.native_animations()
            .into_iter()
            .filter(|r| r.element == element)
            .collect()
    }

    /// Finish every running native animation on `element`. Returns how many finished.
    pub fn finish_native(&self, element: ElementId) -> usize {
        self.finish_where(|r| r.element == element)
    }

    pub fn finish_all_native(&self) -> usize {
        self.finish_where(|_| true)
    }

    fn finish_where(&self, pred: impl Fn(&NativeRecord) -> bool) -> usize {
        let callbacks: Vec<Option<Callback>> = {
            let mut dom = self.dom.borrow_mut();
            dom.natives
                .iter_mut()
                .filter(|n| n.record.state == NativeState::Running && pred(&n.record))
                .map(|n| {
                    n.record.state = NativeState::Finished;
                    n.on_finish.clone()
                })
                .collect()
        };
        let count = callbacks.len();
        for callback in callbacks.into_iter().flatten() {
            callback();
        }
        count
    }
}

struct MemoryAnimation {
    dom: Rc<RefCell<Dom>>,
    index: usize,
}

impl MemoryAnimation {
    fn edit(&self, f: impl FnOnce(&mut NativeSlot)) {
        if let Some(slot) = self.dom.borrow_mut().natives.get_mut(self.index) {
            f(slot);
        }
    }
}

impl NativeAnimation for MemoryAnimation {
    fn play(&self) -> ion_animation_core::Result<()> {
        let mut dom = self.dom.borrow_mut();
        let element = match dom.natives.get(self.index) {
            Some(slot) => slot.record.element,
            None => return Err(AnimationError::dom("animation was discarded")),
        };
        dom.live(element)?;
        if let Some(slot) = dom.natives.get_mut(self.index) {
            slot.record.state = NativeState::Running;
        }
        Ok(())
    }

    fn pause(&self) {
        self.edit(|slot| {
            if slot.record.state != NativeState::Cancelled {
                slot.record.state = NativeState::Paused;
            }
        });
    }

    fn cancel(&self) {
        self.edit(|slot| slot.record.state = NativeState::Cancelled);
    }

    fn set_current_time(&self, ms: f64) {
        self.edit(|slot| slot.record.current_time = ms);
    }

    fn update_timing(&self, timing: &EffectTiming) {
        self.edit(|slot| slot.record.timing = timing.clone());
    }

    fn set_on_finish(&self, callback: Option<Callback>) {
        self.edit(|slot| slot.on_finish = callback);
    }
}

impl Host for MemoryHost {
    fn inline_style(&self, element: ElementId, property: &str) -> Option<String> {
        let dom = self.dom.borrow();
        let node = dom.elements.get(&element)?;
        node.styles
            .iter()
            .find(|(k, _)| k == property)
            .map(|(_, v)| v.clone())
    }

    fn set_style_property(
        &self,
        element: ElementId,
        property: &str,
        value: Option<&str>,
    ) -> ion_animation_core::Result<()> {
        let mut dom = self.dom.borrow_mut();
        let node = dom.live_mut(element)?;
        match value {
            None | Some("") => node.styles.retain(|(k, _)| k != property),
            Some(v) => match node.styles.iter_mut().find(|(k, _)| k == property) {
                Some(slot) => slot.1 = v.to_string(),
                None => node.styles.push((property.to_string(), v.to_string())),
            },
        }
        Ok(())
    }

    fn remove_style_property(
        &self,
        element: ElementId,
        property: &str,
    ) -> ion_animation_core::Result<()> {
        self.set_style_property(element, property, None)
    }

    fn add_class(&self, element: ElementId, class: &str) -> ion_animation_core::Result<()> {
        let mut dom = self.dom.borrow_mut();
        let node = dom.live_mut(element)?;
        if !node.classes.iter().any(|c| c == class) {
            node.classes.push(class.to_string());
        }
        Ok(())
    }

    fn remove_class(&self, element: ElementId, class: &str) -> ion_animation_core::Result<()> {
        let mut dom = self.dom.borrow_mut();
        dom.live_mut(element)?.classes.retain(|c| c != class);
        Ok(())
    }

    fn style_container(&self, element: ElementId) -> ion_animation_core::Result<ContainerId> {
        Ok(self.dom.borrow().live(element)?.container)
    }

    fn find_style(&self, container: ContainerId, id: &str) -> Option<StyleId> {
        self.dom
            .borrow()
            .styles
            .iter()
            .find(|s| s.container == container && s.id == id)
            .map(|s| s.style)
    }

    fn create_style(
        &self,
        owner: ElementId,
        container: ContainerId,
        id: &str,
        text: &str,
    ) -> ion_animation_core::Result<StyleId> {
        let mut dom = self.dom.borrow_mut();
        dom.live(owner)?;
        if !dom.containers.contains(&container) {
            return Err(AnimationError::dom(format!("unknown container {container:?}")));
        }
        let style = dom.ids.alloc_style();
        dom.styles.push(StyleRecord {
            style,
            container,
            id: id.to_string(),
            text: text.to_string(),
        });
        Ok(style)
    }

    fn remove_style(&self, style: StyleId) {
        self.dom.borrow_mut().styles.retain(|s| s.style != style);
    }

    fn style_text(&self, style: StyleId) -> Option<String> {
        self.dom
            .borrow()
            .styles
            .iter()
            .find(|s| s.style == style)
            .map(|s| s.text.clone())
    }

    fn release_element(&self, element: ElementId) {
        self.dom.borrow_mut().released.push(element);
    }

    fn add_event_listener(
        &self,
        element: ElementId,
        event: &str,
        options: ListenerOptions,
        listener: EventListener,
    ) -> ion_animation_core::Result<ListenerId> {
        let mut dom = self.dom.borrow_mut();
        dom.live(element)?;
        let id = dom.ids.alloc_listener();
        dom.listeners.push(ListenerEntry {
            id,
            element,
            event: event.to_string(),
            passive: options.passive,
            listener,
        });
        Ok(id)
    }

    fn remove_event_listener(&self, element: ElementId, event: &str, listener: ListenerId) {
        self.dom
            .borrow_mut()
            .listeners
            .retain(|l| !(l.id == listener && l.element == element && l.event == event));
    }

    fn supports_web_animations(&self) -> bool {
        self.web_animations.get()
    }

    fn animate(
        &self,
        element: ElementId,
        keyframes: &[Keyframe],
        timing: &EffectTiming,
    ) -> ion_animation_core::Result<Box<dyn NativeAnimation>> {
        let mut dom = self.dom.borrow_mut();
        dom.live(element)?;
        let index = dom.natives.len();
        dom.natives.push(NativeSlot {
            record: NativeRecord {
                element,
                keyframes: keyframes.to_vec(),
                timing: timing.clone(),
                state: NativeState::Running,
                current_time: 0.0,
            },
            on_finish: None,
        });
        Ok(Box::new(MemoryAnimation {
            dom: self.dom.clone(),
            index,
        }))
    }
}
