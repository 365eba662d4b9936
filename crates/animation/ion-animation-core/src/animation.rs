//! Animation node: fluent configuration plus the playback controller that
//! walks the node tree.
//!
//! Builder calls only record configuration. `play()` applies before-effects
//! depth first, starts one backend effect per target element, waits for
//! every effect and every child, then applies after-effects, runs finish
//! callbacks and resolves the returned [`Deferred`].
//!
//! Nodes are `Rc<RefCell<..>>` handles driven from a single event loop.
//! No borrow is held while user callbacks run, so hooks may call `stop()`
//! or `play()` on any node. Each run carries a generation number; work
//! belonging to an older generation (a stopped or restarted run) is
//! ignored.

use std::cell::{Cell, RefCell};
use std::mem;
use std::rc::{Rc, Weak};

use log::{debug, trace, warn};

use crate::backend::{select_backend, BackendKind, EffectRequest, PlaybackBackend, RunningEffect};
use crate::config::Config;
use crate::deferred::{Deferred, Resolver};
use crate::error::{AnimationError, Result};
use crate::host::{Callback, Host};
use crate::ids::{alloc_animation, AnimationId, ElementId, StyleId};
use crate::keyframes::{validate_keyframes, CssValue, Keyframe};
use crate::state::PlaybackState;
use crate::styles::StyleSnapshot;
use crate::stylesheet::{KeyframeRegistry, SharedRegistry};
use crate::timing::{
    EffectTiming, FillMode, ForcedTiming, PlaybackDirection, TimingOverrides,
};

/// Finish callback: `(step, reversed)` where `step` is `1` for a forward
/// completion and `0` when the run was sent back to its start.
pub type FinishCallback = Rc<dyn Fn(u8, bool)>;

/// Where `progress_end` sends the animation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProgressTarget {
    /// Back to step 0, playing in the opposite direction.
    Start,
    /// On to step 1.
    End,
}

/// Anything accepted where a class name or a list of them is expected.
pub trait ClassList {
    fn into_class_list(self) -> Vec<String>;
}

impl ClassList for &str {
    fn into_class_list(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl ClassList for String {
    fn into_class_list(self) -> Vec<String> {
        vec![self]
    }
}

impl ClassList for Vec<String> {
    fn into_class_list(self) -> Vec<String> {
        self
    }
}

impl ClassList for Vec<&str> {
    fn into_class_list(self) -> Vec<String> {
        self.into_iter().map(str::to_string).collect()
    }
}

impl ClassList for &[&str] {
    fn into_class_list(self) -> Vec<String> {
        self.iter().map(|s| s.to_string()).collect()
    }
}

impl<const N: usize> ClassList for [&str; N] {
    fn into_class_list(self) -> Vec<String> {
        self.iter().map(|s| s.to_string()).collect()
    }
}

/// Effects applied at one lifecycle boundary.
#[derive(Clone, Default)]
struct Boundary {
    add_class: Vec<String>,
    remove_class: Vec<String>,
    clear_styles: Vec<String>,
    styles: Vec<(String, CssValue)>,
    reads: Vec<Callback>,
    writes: Vec<Callback>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Before,
    After,
}

#[derive(Default)]
struct Hooks {
    before: Boundary,
    after: Boundary,
}

impl Hooks {
    fn boundary_mut(&mut self, phase: Phase) -> &mut Boundary {
        match phase {
            Phase::Before => &mut self.before,
            Phase::After => &mut self.after,
        }
    }
}

struct FinishEntry {
    callback: FinishCallback,
    one_time: bool,
}

/// State of the current (or last) run.
#[derive(Default)]
struct Run {
    generation: u64,
    initialized: bool,
    effects: Vec<Box<dyn RunningEffect>>,
    /// Outstanding completions: counted own effects plus children.
    pending: usize,
    will_complete: bool,
    resolvers: Vec<Resolver>,
    snapshot: StyleSnapshot,
    /// Parent generation that started this run, if the parent did.
    parent_generation: Option<u64>,
}

struct Inner {
    id: AnimationId,
    host: Rc<dyn Host>,
    registry: SharedRegistry,
    backend: Rc<dyn PlaybackBackend>,
    keyframe_name: Option<String>,
    parent: Weak<RefCell<Inner>>,
    elements: Vec<ElementId>,
    children: Vec<Animation>,
    keyframes: Vec<Keyframe>,
    timing: TimingOverrides,
    forced: ForcedTiming,
    hooks: Hooks,
    on_finish: Vec<FinishEntry>,
    state: PlaybackState,
    run: Run,
    /// Style elements this node holds a registry reference to.
    owned_styles: Vec<StyleId>,
}

type Node = Rc<RefCell<Inner>>;

/// Handle to an animation node. Clones share the node.
#[derive(Clone)]
pub struct Animation {
    inner: Node,
}

impl std::fmt::Debug for Animation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let me = self.inner.borrow();
        f.debug_struct("Animation")
            .field("id", &me.id)
            .field("state", &me.state)
            .field("elements", &me.elements)
            .field("children", &me.children.len())
            .finish()
    }
}

fn resolved_timing(node: &Inner) -> EffectTiming {
    let parent = node.parent.upgrade().map(|p| resolved_timing(&p.borrow()));
    EffectTiming::resolve(&node.timing, &node.forced, parent.as_ref())
}

fn merge_styles<K, V>(target: &mut Vec<(String, CssValue)>, styles: impl IntoIterator<Item = (K, V)>)
where
    K: Into<String>,
    V: Into<CssValue>,
{
    for (k, v) in styles {
        let (k, v) = (k.into(), v.into());
        match target.iter_mut().find(|(e, _)| *e == k) {
            Some(slot) => slot.1 = v,
            None => target.push((k, v)),
        }
    }
}

// ---------------------------------------------------------------------------
// Builder surface
// ---------------------------------------------------------------------------

impl Animation {
    /// Node using the default config and the thread-wide keyframe registry.
    pub fn new(host: Rc<dyn Host>) -> Self {
        Self::with_config(host, Config::default())
    }

    pub fn with_config(host: Rc<dyn Host>, config: Config) -> Self {
        Self::with_registry(host, config, KeyframeRegistry::shared())
    }

    /// Node bound to an explicit registry (test isolation, separate documents).
    pub fn with_registry(host: Rc<dyn Host>, config: Config, registry: SharedRegistry) -> Self {
        let backend = select_backend(&host, &config, &registry);
        let inner = Inner {
            id: alloc_animation(),
            host,
            registry,
            backend,
            keyframe_name: None,
            parent: Weak::new(),
            elements: Vec::new(),
            children: Vec::new(),
            keyframes: Vec::new(),
            timing: TimingOverrides::default(),
            forced: ForcedTiming::default(),
            hooks: Hooks::default(),
            on_finish: Vec::new(),
            state: PlaybackState::Idle,
            run: Run {
                will_complete: true,
                ..Run::default()
            },
            owned_styles: Vec::new(),
        };
        Self {
            inner: Rc::new(RefCell::new(inner)),
        }
    }

    fn edit(self, f: impl FnOnce(&mut Inner)) -> Self {
        f(&mut self.inner.borrow_mut());
        self
    }

    fn edit_boundary(self, phase: Phase, f: impl FnOnce(&mut Boundary)) -> Self {
        self.edit(|me| f(me.hooks.boundary_mut(phase)))
    }

    /// Use `name` for the generated `@keyframes` instead of a content-addressed one.
    pub fn keyframe_name(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.edit(|me| me.keyframe_name = Some(name))
    }

    pub fn add_element(self, element: ElementId) -> Self {
        self.edit(|me| {
            if !me.elements.contains(&element) {
                me.elements.push(element);
            }
        })
    }

    pub fn add_elements(self, elements: impl IntoIterator<Item = ElementId>) -> Self {
        elements.into_iter().fold(self, Animation::add_element)
    }

    /// Milliseconds.
    pub fn duration(self, ms: f64) -> Self {
        self.edit(|me| me.timing.duration = Some(ms))
    }

    /// Milliseconds.
    pub fn delay(self, ms: f64) -> Self {
        self.edit(|me| me.timing.delay = Some(ms))
    }

    pub fn easing(self, easing: impl Into<String>) -> Self {
        let easing = easing.into();
        self.edit(|me| me.timing.easing = Some(easing))
    }

    /// `f64::INFINITY` loops forever.
    pub fn iterations(self, iterations: f64) -> Self {
        self.edit(|me| me.timing.iterations = Some(iterations))
    }

    pub fn fill(self, fill: FillMode) -> Self {
        self.edit(|me| me.timing.fill = Some(fill))
    }

    pub fn direction(self, direction: PlaybackDirection) -> Self {
        self.edit(|me| me.timing.direction = Some(direction))
    }

    /// Replace the keyframe list.
    pub fn keyframes(self, keyframes: impl IntoIterator<Item = Keyframe>) -> Self {
        let keyframes: Vec<Keyframe> = keyframes.into_iter().collect();
        self.edit(|me| me.keyframes = keyframes)
    }

    /// Set `property` on the first keyframe when it sits at offset 0 (or
    /// has none), else prepend a keyframe at offset 0.
    pub fn from(self, property: impl Into<String>, value: impl Into<CssValue>) -> Self {
        let (property, value) = (property.into(), value.into());
        self.edit(|me| {
            let reuse = me
                .keyframes
                .first()
                .is_some_and(|f| f.offset.map_or(true, |o| o == 0.0));
            if reuse {
                me.keyframes[0].set(property, value);
            } else {
                me.keyframes.insert(0, Keyframe::at(0.0).with(property, value));
            }
        })
    }

    /// Set `property` on the last keyframe when it sits at offset 1 (or has
    /// none), else append a keyframe at offset 1.
    pub fn to(self, property: impl Into<String>, value: impl Into<CssValue>) -> Self {
        let (property, value) = (property.into(), value.into());
        self.edit(|me| {
            let reuse = me
                .keyframes
                .last()
                .is_some_and(|f| f.offset.map_or(true, |o| o == 1.0));
            if reuse {
                if let Some(last) = me.keyframes.last_mut() {
                    last.set(property, value);
                }
            } else {
                me.keyframes.push(Keyframe::at(1.0).with(property, value));
            }
        })
    }

    pub fn from_to(
        self,
        property: impl Into<String>,
        from: impl Into<CssValue>,
        to: impl Into<CssValue>,
    ) -> Self {
        let property = property.into();
        self.from(property.clone(), from).to(property, to)
    }

    pub fn before_styles<K, V>(self, styles: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<CssValue>,
    {
        self.edit_boundary(Phase::Before, |b| merge_styles(&mut b.styles, styles))
    }

    pub fn after_styles<K, V>(self, styles: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<CssValue>,
    {
        self.edit_boundary(Phase::After, |b| merge_styles(&mut b.styles, styles))
    }

    /// Remove inline properties before playing.
    pub fn before_clear_styles<S: Into<String>>(self, properties: impl IntoIterator<Item = S>) -> Self {
        let properties: Vec<String> = properties.into_iter().map(Into::into).collect();
        self.edit_boundary(Phase::Before, |b| b.clear_styles.extend(properties))
    }

    /// Remove inline properties after completion.
    pub fn after_clear_styles<S: Into<String>>(self, properties: impl IntoIterator<Item = S>) -> Self {
        let properties: Vec<String> = properties.into_iter().map(Into::into).collect();
        self.edit_boundary(Phase::After, |b| b.clear_styles.extend(properties))
    }

    pub fn before_add_class(self, classes: impl ClassList) -> Self {
        let classes = classes.into_class_list();
        self.edit_boundary(Phase::Before, |b| b.add_class.extend(classes))
    }

    pub fn before_remove_class(self, classes: impl ClassList) -> Self {
        let classes = classes.into_class_list();
        self.edit_boundary(Phase::Before, |b| b.remove_class.extend(classes))
    }

    pub fn after_add_class(self, classes: impl ClassList) -> Self {
        let classes = classes.into_class_list();
        self.edit_boundary(Phase::After, |b| b.add_class.extend(classes))
    }

    pub fn after_remove_class(self, classes: impl ClassList) -> Self {
        let classes = classes.into_class_list();
        self.edit_boundary(Phase::After, |b| b.remove_class.extend(classes))
    }

    pub fn before_add_read(self, callback: impl Fn() + 'static) -> Self {
        let callback: Callback = Rc::new(callback);
        self.edit_boundary(Phase::Before, |b| b.reads.push(callback))
    }

    pub fn before_add_write(self, callback: impl Fn() + 'static) -> Self {
        let callback: Callback = Rc::new(callback);
        self.edit_boundary(Phase::Before, |b| b.writes.push(callback))
    }

    pub fn after_add_read(self, callback: impl Fn() + 'static) -> Self {
        let callback: Callback = Rc::new(callback);
        self.edit_boundary(Phase::After, |b| b.reads.push(callback))
    }

    pub fn after_add_write(self, callback: impl Fn() + 'static) -> Self {
        let callback: Callback = Rc::new(callback);
        self.edit_boundary(Phase::After, |b| b.writes.push(callback))
    }

    /// Attach a child. Adding the node itself or one of its ancestors is ignored.
    pub fn add_animation(self, child: Animation) -> Self {
        if is_self_or_ancestor(&child.inner, &self.inner) {
            warn!(
                "ignoring add_animation: {:?} would create a cycle",
                child.inner.borrow().id
            );
            return self;
        }
        child.inner.borrow_mut().parent = Rc::downgrade(&self.inner);
        self.edit(|me| {
            if !me.children.iter().any(|c| Rc::ptr_eq(&c.inner, &child.inner)) {
                me.children.push(child);
            }
        })
    }

    pub fn add_animations(self, children: impl IntoIterator<Item = Animation>) -> Self {
        children.into_iter().fold(self, Animation::add_animation)
    }

    pub fn on_finish(self, callback: impl Fn(u8, bool) + 'static) -> Self {
        let callback: FinishCallback = Rc::new(callback);
        self.edit(|me| {
            me.on_finish.push(FinishEntry {
                callback,
                one_time: false,
            })
        })
    }

    /// Like [`Animation::on_finish`] but dropped after its first call.
    pub fn on_finish_once(self, callback: impl Fn(u8, bool) + 'static) -> Self {
        let callback: FinishCallback = Rc::new(callback);
        self.edit(|me| {
            me.on_finish.push(FinishEntry {
                callback,
                one_time: true,
            })
        })
    }
}

fn is_self_or_ancestor(candidate: &Node, node: &Node) -> bool {
    let mut cursor = Some(node.clone());
    while let Some(current) = cursor {
        if Rc::ptr_eq(&current, candidate) {
            return true;
        }
        cursor = current.borrow().parent.upgrade();
    }
    false
}

// ---------------------------------------------------------------------------
// Inspection
// ---------------------------------------------------------------------------

impl Animation {
    pub fn id(&self) -> AnimationId {
        self.inner.borrow().id
    }

    pub fn state(&self) -> PlaybackState {
        self.inner.borrow().state
    }

    /// Effective timing after inheritance and runtime overrides.
    pub fn timing(&self) -> EffectTiming {
        resolved_timing(&self.inner.borrow())
    }

    pub fn elements(&self) -> Vec<ElementId> {
        self.inner.borrow().elements.clone()
    }

    pub fn children(&self) -> Vec<Animation> {
        self.inner.borrow().children.clone()
    }

    pub fn current_keyframes(&self) -> Vec<Keyframe> {
        self.inner.borrow().keyframes.clone()
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.inner.borrow().backend.kind()
    }

    /// Generated `@keyframes` names used by this node's current CSS effects.
    pub fn keyframe_names(&self) -> Vec<String> {
        let me = self.inner.borrow();
        let mut names: Vec<String> = Vec::new();
        for sheet in me.run.effects.iter().filter_map(|e| e.stylesheet()) {
            if !names.contains(&sheet.name) {
                names.push(sheet.name.clone());
            }
        }
        names
    }

    pub fn ptr_eq(&self, other: &Animation) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Check keyframes, timing and targets across the whole tree.
    pub fn validate(&self) -> Result<()> {
        validate_tree(&self.inner)
    }
}

fn validate_tree(node: &Node) -> Result<()> {
    let children = {
        let me = node.borrow();
        me.timing.validate()?;
        validate_keyframes(&me.keyframes)?;
        if !me.keyframes.is_empty() && me.elements.is_empty() {
            return Err(AnimationError::configuration(format!(
                "animation {:?} has keyframes but no target elements",
                me.id
            )));
        }
        me.children.clone()
    };
    children.iter().try_for_each(|c| validate_tree(&c.inner))
}

// ---------------------------------------------------------------------------
// Playback surface
// ---------------------------------------------------------------------------

impl Animation {
    /// Start (or resume) playback. The returned future settles once, when
    /// the run completes, fails or is stopped.
    pub fn play(&self) -> Deferred {
        let state = self.state();
        if state == PlaybackState::Playing {
            return Deferred::ready(Err(AnimationError::PlaybackState {
                current: state.name().to_string(),
                requested: PlaybackState::Playing.name().to_string(),
            }));
        }
        if !state.can_start() {
            let (resolver, deferred) = Deferred::channel();
            self.inner.borrow_mut().run.resolvers.push(resolver);
            debug!("animation {:?} resumed", self.id());
            if let Err(e) = run_tree(&self.inner) {
                fail(&self.inner, e);
            }
            return deferred;
        }

        if let Err(e) = self.validate() {
            return Deferred::ready(Err(e));
        }
        debug!("animation {:?} play", self.id());
        if let Err(e) = begin(&self.inner) {
            return Deferred::ready(Err(e));
        }
        let (resolver, deferred) = Deferred::channel();
        self.inner.borrow_mut().run.resolvers.push(resolver);
        if let Err(e) = run_tree(&self.inner) {
            fail(&self.inner, e);
        }
        deferred
    }

    /// Hold every running effect in place.
    pub fn pause(&self) {
        pause_tree(&self.inner);
    }

    /// Cancel effects, restore inline styles and return to idle without
    /// running finish callbacks. Pending deferreds reject with `Cancelled`.
    pub fn stop(&self) {
        debug!("animation {:?} stop", self.id());
        stop_tree(&self.inner);
    }

    /// Stop, release generated stylesheets no other node uses, and drop
    /// children, callbacks and targets.
    pub fn destroy(&self) {
        stop_tree(&self.inner);
        destroy_tree(&self.inner);
    }

    /// Enter scrubbing mode at `step` (default 0). Initializes the tree if
    /// it is not already.
    pub fn progress_start(&self, force_linear: bool, step: Option<f64>) -> Result<()> {
        let state = self.state();
        if state.can_start() {
            self.validate()?;
            begin(&self.inner)?;
        } else if state.is_playing() {
            pause_tree(&self.inner);
        }
        set_linear_tree(&self.inner, force_linear);
        seek_tree(&self.inner, step.unwrap_or(0.0));
        Ok(())
    }

    /// Scrub to `step`, clamped to `[0, 0.9999]` so effects never finish while scrubbing.
    pub fn progress_step(&self, step: f64) {
        if !self.inner.borrow().run.initialized {
            trace!("progress_step on uninitialized animation {:?}", self.id());
            return;
        }
        seek_tree(&self.inner, step.clamp(0.0, 0.9999));
    }

    /// Leave scrubbing mode. With a target, playback resumes from `step`
    /// towards it (optionally with a new duration) and the deferred of that
    /// run is returned; without one the tree stays paused.
    pub fn progress_end(
        &self,
        play_to: Option<ProgressTarget>,
        step: f64,
        duration: Option<f64>,
    ) -> Option<Deferred> {
        if !self.inner.borrow().run.initialized {
            trace!("progress_end on uninitialized animation {:?}", self.id());
            return None;
        }
        progress_end_tree(&self.inner, play_to, step, duration);
        play_to.map(|_| self.play())
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

fn is_current(node: &Node, generation: u64) -> bool {
    node.borrow().run.generation == generation
}

fn ensure_current(node: &Node, generation: u64) -> Result<()> {
    if is_current(node, generation) {
        Ok(())
    } else {
        Err(AnimationError::Cancelled)
    }
}

/// Initialize a root run. Any failure that leaves this run current resets
/// the tree, including a child cancelled by its own hooks; a run replaced
/// or stopped from a hook is left to whoever did that.
fn begin(node: &Node) -> Result<()> {
    let started = node.borrow().run.generation + 1;
    initialize(node, None).map_err(|e| {
        if !e.is_cancelled() {
            warn!("animation {:?} failed to start: {e}", node.borrow().id);
            stop_tree(node);
        } else if is_current(node, started) {
            debug!("animation {:?} cancelled during start", node.borrow().id);
            stop_tree(node);
        }
        e
    })
}

/// Set up a fresh run: tear down the previous one, apply before-effects,
/// create paused effects and recurse into children.
fn initialize(node: &Node, parent_generation: Option<u64>) -> Result<()> {
    let (generation, stale, old_effects, abandoned) = {
        let mut me = node.borrow_mut();
        let abandoned = match me.state {
            PlaybackState::Playing | PlaybackState::Paused => me.run.parent_generation,
            _ => None,
        };
        me.run.generation += 1;
        me.run.initialized = false;
        me.run.pending = 0;
        me.run.will_complete = true;
        me.run.parent_generation = parent_generation;
        me.forced = ForcedTiming::default();
        me.state = PlaybackState::Playing;
        (
            me.run.generation,
            mem::take(&mut me.run.resolvers),
            mem::take(&mut me.run.effects),
            abandoned,
        )
    };
    for mut effect in old_effects {
        effect.detach();
    }
    for resolver in stale {
        resolver.settle(Err(AnimationError::Cancelled));
    }
    if let Some(g) = abandoned {
        settle_parent(node, g);
    }

    apply_boundary(node, generation, Phase::Before)?;
    create_effects(node, generation)?;

    let children = node.borrow().children.clone();
    for child in &children {
        initialize(&child.inner, Some(generation))?;
        ensure_current(node, generation)?;
    }

    let mut me = node.borrow_mut();
    if me.run.generation != generation {
        return Err(AnimationError::Cancelled);
    }
    me.run.initialized = true;
    me.state = PlaybackState::Paused;
    Ok(())
}

/// Classes, cleared styles, styles, then read and write hooks.
fn apply_boundary(node: &Node, generation: u64, phase: Phase) -> Result<()> {
    let (host, elements, boundary) = {
        let me = node.borrow();
        let boundary = match phase {
            Phase::Before => me.hooks.before.clone(),
            Phase::After => me.hooks.after.clone(),
        };
        (me.host.clone(), me.elements.clone(), boundary)
    };

    for el in &elements {
        for class in &boundary.add_class {
            host.add_class(*el, class)?;
        }
        for class in &boundary.remove_class {
            host.remove_class(*el, class)?;
        }
    }

    {
        let mut me = node.borrow_mut();
        if me.run.generation != generation {
            return Err(AnimationError::Cancelled);
        }
        let snapshot = &mut me.run.snapshot;
        if phase == Phase::Before {
            // Undo the previous run's writes before re-applying.
            snapshot.restore(&*host)?;
        }
        for el in &elements {
            snapshot.clear(&*host, *el, &boundary.clear_styles)?;
            snapshot.apply(&*host, *el, &boundary.styles)?;
        }
    }

    for callback in boundary.reads.iter().chain(boundary.writes.iter()) {
        callback();
        ensure_current(node, generation)?;
    }
    Ok(())
}

fn completion(node: Weak<RefCell<Inner>>, generation: u64, counted: bool) -> Callback {
    let fired = Cell::new(false);
    Rc::new(move || {
        if !counted || fired.replace(true) {
            return;
        }
        if let Some(node) = node.upgrade() {
            settle(&node, generation);
        }
    })
}

fn create_effects(node: &Node, generation: u64) -> Result<()> {
    let (backend, elements, keyframes, timing, name, children) = {
        let me = node.borrow();
        (
            me.backend.clone(),
            me.elements.clone(),
            me.keyframes.clone(),
            resolved_timing(&me),
            me.keyframe_name.clone(),
            me.children.len(),
        )
    };
    // Zero-length effects still run (fill shows the end state) but are not waited on.
    let counted = !timing.is_instant();
    let mut effects: Vec<Box<dyn RunningEffect>> = Vec::new();
    if !keyframes.is_empty() {
        for element in elements {
            let request = EffectRequest {
                element,
                keyframes: &keyframes,
                timing: &timing,
                keyframe_name: name.as_deref(),
            };
            let on_complete = completion(Rc::downgrade(node), generation, counted);
            match backend.create(request, on_complete) {
                Ok(effect) => effects.push(effect),
                Err(e) => {
                    for mut effect in effects {
                        effect.stop();
                    }
                    return Err(e);
                }
            }
        }
    }

    let mut guard = node.borrow_mut();
    if guard.run.generation != generation {
        drop(guard);
        for mut effect in effects {
            effect.stop();
        }
        return Err(AnimationError::Cancelled);
    }
    let me = &mut *guard;
    for sheet in effects.iter().filter_map(|e| e.stylesheet()) {
        if !me.owned_styles.contains(&sheet.style)
            && me.registry.borrow_mut().acquire(sheet.style, sheet.created)
        {
            me.owned_styles.push(sheet.style);
        }
    }
    me.run.pending = if counted { effects.len() } else { 0 } + children;
    trace!(
        "animation {:?} initialized: {} effects, {} pending",
        me.id,
        effects.len(),
        me.run.pending
    );
    me.run.effects = effects;
    Ok(())
}

/// Put effects taken out for a host call back, unless the run changed meanwhile.
fn restore_effects(node: &Node, generation: u64, effects: Vec<Box<dyn RunningEffect>>) {
    let mut me = node.borrow_mut();
    if me.run.generation == generation && me.run.effects.is_empty() {
        me.run.effects = effects;
    } else {
        drop(me);
        for mut effect in effects {
            effect.stop();
        }
    }
}

fn with_effects(node: &Node, f: impl FnOnce(&mut [Box<dyn RunningEffect>])) {
    let (generation, mut effects) = {
        let mut me = node.borrow_mut();
        (me.run.generation, mem::take(&mut me.run.effects))
    };
    f(effects.as_mut_slice());
    restore_effects(node, generation, effects);
}

/// Play every paused node in the tree, parent first.
fn run_tree(node: &Node) -> Result<()> {
    let (generation, children, mut effects) = {
        let mut me = node.borrow_mut();
        if me.state != PlaybackState::Paused {
            return Ok(());
        }
        me.state = PlaybackState::Playing;
        (
            me.run.generation,
            me.children.clone(),
            mem::take(&mut me.run.effects),
        )
    };
    let played = effects.iter_mut().try_for_each(|e| e.play());
    restore_effects(node, generation, effects);
    played?;

    for child in &children {
        run_tree(&child.inner)?;
        if !is_current(node, generation) {
            return Ok(());
        }
    }

    let ready = {
        let me = node.borrow();
        me.run.generation == generation
            && me.state == PlaybackState::Playing
            && me.run.pending == 0
    };
    if ready {
        complete(node);
    }
    Ok(())
}

/// One effect or child of the run `generation` completed.
fn settle(node: &Node, generation: u64) {
    let ready = {
        let mut me = node.borrow_mut();
        if me.run.generation != generation || !me.run.initialized {
            return;
        }
        me.run.pending = me.run.pending.saturating_sub(1);
        me.run.pending == 0 && me.state == PlaybackState::Playing
    };
    if ready {
        complete(node);
    }
}

fn settle_parent(node: &Node, parent_generation: u64) {
    let parent = node.borrow().parent.upgrade();
    if let Some(parent) = parent {
        settle(&parent, parent_generation);
    }
}

fn complete(node: &Node) {
    let generation = node.borrow().run.generation;
    if let Err(e) = apply_boundary(node, generation, Phase::After) {
        if !e.is_cancelled() {
            fail(node, e);
        }
        return;
    }

    let (id, callbacks, step, reversed, resolvers, parent_generation) = {
        let mut me = node.borrow_mut();
        if me.run.generation != generation {
            return;
        }
        me.state = PlaybackState::Finished;
        let step = u8::from(me.run.will_complete);
        let reversed = resolved_timing(&me).direction.is_reverse();
        let callbacks: Vec<FinishCallback> =
            me.on_finish.iter().map(|f| f.callback.clone()).collect();
        me.on_finish.retain(|f| !f.one_time);
        (
            me.id,
            callbacks,
            step,
            reversed,
            mem::take(&mut me.run.resolvers),
            me.run.parent_generation,
        )
    };
    debug!("animation {id:?} finished at step {step}");
    for callback in callbacks {
        callback(step, reversed);
    }
    for resolver in resolvers {
        resolver.settle(Ok(()));
    }
    if let Some(g) = parent_generation {
        settle_parent(node, g);
    }
}

/// Reject the run at its root and reset the tree.
fn fail(node: &Node, error: AnimationError) {
    let parent = {
        let me = node.borrow();
        me.run.parent_generation.and_then(|g| {
            me.parent
                .upgrade()
                .filter(|p| p.borrow().run.generation == g)
        })
    };
    if let Some(parent) = parent {
        return fail(&parent, error);
    }
    warn!("animation {:?} failed: {error}", node.borrow().id);
    let resolvers = mem::take(&mut node.borrow_mut().run.resolvers);
    stop_tree(node);
    for resolver in resolvers {
        resolver.settle(Err(error.clone()));
    }
}

fn stop_tree(node: &Node) {
    let (host, effects, resolvers, children, mut snapshot) = {
        let mut me = node.borrow_mut();
        me.run.generation += 1;
        me.run.initialized = false;
        me.run.pending = 0;
        me.run.parent_generation = None;
        me.forced = ForcedTiming::default();
        me.state = PlaybackState::Idle;
        (
            me.host.clone(),
            mem::take(&mut me.run.effects),
            mem::take(&mut me.run.resolvers),
            me.children.clone(),
            mem::take(&mut me.run.snapshot),
        )
    };
    for mut effect in effects {
        effect.stop();
    }
    if let Err(e) = snapshot.restore(&*host) {
        warn!("inline style restore incomplete: {e}");
    }
    for child in &children {
        stop_tree(&child.inner);
    }
    for resolver in resolvers {
        resolver.settle(Err(AnimationError::Cancelled));
    }
}

fn pause_tree(node: &Node) {
    let children = {
        let mut me = node.borrow_mut();
        if me.state != PlaybackState::Playing {
            return;
        }
        me.state = PlaybackState::Paused;
        me.children.clone()
    };
    with_effects(node, |effects| effects.iter_mut().for_each(|e| e.pause()));
    for child in &children {
        pause_tree(&child.inner);
    }
}

fn seek_tree(node: &Node, step: f64) {
    with_effects(node, |effects| effects.iter_mut().for_each(|e| e.seek(step)));
    let children = node.borrow().children.clone();
    for child in &children {
        seek_tree(&child.inner, step);
    }
}

/// Push the node's current effective timing into its effects.
fn refresh_effects(node: &Node) {
    let timing = resolved_timing(&node.borrow());
    with_effects(node, |effects| {
        effects.iter_mut().for_each(|e| e.update_timing(&timing))
    });
}

fn set_linear_tree(node: &Node, linear: bool) {
    let children = {
        let mut me = node.borrow_mut();
        me.forced.linear = linear;
        me.children.clone()
    };
    refresh_effects(node);
    for child in &children {
        set_linear_tree(&child.inner, linear);
    }
}

/// Children first, so each one reverses against its parent's unforced direction.
fn progress_end_tree(
    node: &Node,
    play_to: Option<ProgressTarget>,
    step: f64,
    duration: Option<f64>,
) {
    let children = node.borrow().children.clone();
    for child in &children {
        progress_end_tree(&child.inner, play_to, step, duration);
    }

    let seek_to = {
        let mut me = node.borrow_mut();
        me.forced.linear = false;
        if let Some(d) = duration {
            me.forced.duration = Some(d);
        }
        match play_to {
            Some(ProgressTarget::End) => {
                me.run.will_complete = true;
                Some(step)
            }
            Some(ProgressTarget::Start) => {
                let direction = resolved_timing(&me).direction;
                me.forced.direction = Some(direction.reversed());
                me.run.will_complete = false;
                Some(1.0 - step)
            }
            None => None,
        }
    };
    refresh_effects(node);
    if let Some(step) = seek_to {
        with_effects(node, |effects| effects.iter_mut().for_each(|e| e.seek(step)));
    }
}

fn destroy_tree(node: &Node) {
    let (elements, host, registry, owned, children) = {
        let mut me = node.borrow_mut();
        me.on_finish.clear();
        me.hooks = Hooks::default();
        (
            mem::take(&mut me.elements),
            me.host.clone(),
            me.registry.clone(),
            mem::take(&mut me.owned_styles),
            mem::take(&mut me.children),
        )
    };
    for style in owned {
        if registry.borrow_mut().release(style) {
            host.remove_style(style);
        }
    }
    for element in elements {
        host.release_element(element);
    }
    for child in &children {
        destroy_tree(&child.inner);
        child.inner.borrow_mut().parent = Weak::new();
    }
}
