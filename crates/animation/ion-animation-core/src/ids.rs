//! Opaque handles for host objects and a simple allocator for them.
//!
//! The core never touches page objects directly. Hosts hand out these
//! handles and map them back to their own element/node types.

use serde::{Deserialize, Serialize};

/// An element that can be animated, styled and listened on.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ElementId(pub u32);

/// A style container: a document head or a shadow-root-like scope.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ContainerId(pub u32);

/// A `<style>` element created or found inside a container.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct StyleId(pub u32);

/// A registered event listener.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ListenerId(pub u32);

/// An animation node, used to tag log lines.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct AnimationId(pub u32);

/// Monotonic allocator for host-side handles.
/// Hosts keep one of these next to their object tables.
#[derive(Default, Debug)]
pub struct IdAllocator {
    next_element: u32,
    next_container: u32,
    next_style: u32,
    next_listener: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn alloc_element(&mut self) -> ElementId {
        let id = ElementId(self.next_element);
        self.next_element = self.next_element.wrapping_add(1);
        id
    }

    #[inline]
    pub fn alloc_container(&mut self) -> ContainerId {
        let id = ContainerId(self.next_container);
        self.next_container = self.next_container.wrapping_add(1);
        id
    }

    #[inline]
    pub fn alloc_style(&mut self) -> StyleId {
        let id = StyleId(self.next_style);
        self.next_style = self.next_style.wrapping_add(1);
        id
    }

    #[inline]
    pub fn alloc_listener(&mut self) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener = self.next_listener.wrapping_add(1);
        id
    }

    #[inline]
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

thread_local! {
    static NEXT_ANIMATION: std::cell::Cell<u32> = const { std::cell::Cell::new(0) };
}

/// Allocate a process-unique (per thread) animation id.
pub(crate) fn alloc_animation() -> AnimationId {
    NEXT_ANIMATION.with(|next| {
        let id = next.get();
        next.set(id.wrapping_add(1));
        AnimationId(id)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_monotonic() {
        let mut alloc = IdAllocator::new();
        assert_eq!(alloc.alloc_element(), ElementId(0));
        assert_eq!(alloc.alloc_element(), ElementId(1));
        assert_eq!(alloc.alloc_container(), ContainerId(0));
        assert_eq!(alloc.alloc_style(), StyleId(0));
        assert_eq!(alloc.alloc_style(), StyleId(1));
        assert_eq!(alloc.alloc_listener(), ListenerId(0));
        alloc.reset();
        assert_eq!(alloc.alloc_element(), ElementId(0));
    }

    #[test]
    fn animation_ids_are_distinct() {
        let a = alloc_animation();
        let b = alloc_animation();
        assert_ne!(a, b);
    }
}
