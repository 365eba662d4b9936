//! Content-addressed `@keyframes` names and their `<style>` elements.
//!
//! The registry maps rule text to a stable generated name so structurally
//! identical keyframe sets share one stylesheet entry. Whether the entry
//! carries an `-alt` copy is part of its key, so nodes with different
//! alt settings never share a style element. Entries are
//! append-only; clearing them mid-run would orphan in-flight fallback
//! animations that reference an existing name.

use std::cell::RefCell;
use std::rc::Rc;

use hashbrown::HashMap;
use log::debug;

use crate::error::Result;
use crate::host::Host;
use crate::ids::{ElementId, StyleId};

pub const DEFAULT_KEYFRAME_PREFIX: &str = "ion-animation";

/// Shared handle; all mutation happens on the event-loop thread.
pub type SharedRegistry = Rc<RefCell<KeyframeRegistry>>;

thread_local! {
    static SHARED: SharedRegistry = Rc::new(RefCell::new(KeyframeRegistry::new()));
}

#[derive(Debug)]
pub struct KeyframeRegistry {
    prefix: String,
    rules: Vec<(String, bool)>,
    /// Live nodes using each style element the engine created.
    usage: HashMap<StyleId, usize>,
}

impl Default for KeyframeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyframeRegistry {
    /// Isolated registry, mainly for tests.
    pub fn new() -> Self {
        Self::with_prefix(DEFAULT_KEYFRAME_PREFIX)
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            rules: Vec::new(),
            usage: HashMap::new(),
        }
    }

    /// The thread-wide default instance used by `Animation::new`.
    pub fn shared() -> SharedRegistry {
        SHARED.with(Rc::clone)
    }

    pub fn isolated() -> SharedRegistry {
        Rc::new(RefCell::new(Self::new()))
    }

    #[inline]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn name_for(&self, index: usize) -> String {
        format!("{}-{}", self.prefix, index)
    }

    fn position(&self, rule_text: &str, with_alt: bool) -> Option<usize> {
        self.rules
            .iter()
            .position(|(r, alt)| r == rule_text && *alt == with_alt)
    }

    pub fn lookup(&self, rule_text: &str, with_alt: bool) -> Option<String> {
        self.position(rule_text, with_alt).map(|i| self.name_for(i))
    }

    /// Name for `rule_text` rendered with or without the `-alt` copy,
    /// assigning the next index on first sight.
    pub fn register(&mut self, rule_text: &str, with_alt: bool) -> String {
        let index = match self.position(rule_text, with_alt) {
            Some(i) => i,
            None => {
                self.rules.push((rule_text.to_string(), with_alt));
                self.rules.len() - 1
            }
        };
        self.name_for(index)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Record a node's use of `style`. A freshly created style starts a
    /// count; an existing one is only tracked if the engine created it.
    /// Returns whether the node now holds a reference it must release.
    pub fn acquire(&mut self, style: StyleId, created: bool) -> bool {
        if created {
            *self.usage.entry(style).or_insert(0) += 1;
            return true;
        }
        match self.usage.get_mut(&style) {
            Some(count) => {
                *count += 1;
                true
            }
            None => false,
        }
    }

    /// Drop one reference. Returns `true` when the caller released the last
    /// one and should remove the style element.
    pub fn release(&mut self, style: StyleId) -> bool {
        match self.usage.get_mut(&style) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                self.usage.remove(&style);
                true
            }
            None => false,
        }
    }

    pub fn users_of(&self, style: StyleId) -> usize {
        self.usage.get(&style).copied().unwrap_or(0)
    }
}

/// A materialized keyframes stylesheet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stylesheet {
    pub style: StyleId,
    pub name: String,
    /// `false` when an element with this id already existed.
    pub created: bool,
    /// The element also defines `{name}-alt`.
    pub has_alt: bool,
}

/// Text content of a generated style element.
pub fn keyframe_stylesheet_text(name: &str, rule_text: &str, emit_alt: bool) -> String {
    if emit_alt {
        format!("@keyframes {name} {{ {rule_text} }} @keyframes {name}-alt {{ {rule_text} }}")
    } else {
        format!("@keyframes {name} {{ {rule_text} }}")
    }
}

/// Find or create the `<style id={name}>` for `element`'s style container.
/// Existing elements are returned unchanged.
pub fn create_keyframe_stylesheet(
    host: &dyn Host,
    name: &str,
    rule_text: &str,
    element: ElementId,
    emit_alt: bool,
) -> Result<Stylesheet> {
    let container = host.style_container(element)?;
    if let Some(style) = host.find_style(container, name) {
        let alt_rule = format!("@keyframes {name}-alt ");
        let has_alt = host
            .style_text(style)
            .is_some_and(|text| text.contains(&alt_rule));
        return Ok(Stylesheet {
            style,
            name: name.to_string(),
            created: false,
            has_alt,
        });
    }
    let text = keyframe_stylesheet_text(name, rule_text, emit_alt);
    let style = host.create_style(element, container, name, &text)?;
    debug!("created keyframes stylesheet {name} in container {container:?}");
    Ok(Stylesheet {
        style,
        name: name.to_string(),
        created: true,
        has_alt: emit_alt,
    })
}
