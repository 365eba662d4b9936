//! Funnels `animationend` / `webkitAnimationEnd` into one completion callback.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use log::trace;

use crate::error::Result;
use crate::host::{AnimationEvent, EventListener, Host, ListenerOptions};
use crate::ids::{ElementId, ListenerId};

pub const ANIMATION_END_EVENTS: [&str; 2] = ["webkitAnimationEnd", "animationend"];

struct Registration {
    host: Weak<dyn Host>,
    element: ElementId,
    listeners: Vec<(&'static str, ListenerId)>,
}

/// Handle returned by [`on_animation_end`]. Calling it more than once, or
/// after the event already fired, does nothing.
#[derive(Clone)]
pub struct Unregister {
    slot: Rc<RefCell<Option<Registration>>>,
}

impl Unregister {
    pub fn noop() -> Self {
        Self {
            slot: Rc::new(RefCell::new(None)),
        }
    }

    pub fn call(&self) {
        let registration = self.slot.borrow_mut().take();
        let Some(reg) = registration else {
            return;
        };
        if let Some(host) = reg.host.upgrade() {
            for (event, id) in reg.listeners {
                host.remove_event_listener(reg.element, event, id);
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.slot.borrow().is_some()
    }
}

impl std::fmt::Debug for Unregister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unregister")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Invoke `callback` once when an animation ends on exactly `element`
/// (events bubbling up from animated descendants are ignored). Both
/// listeners are removed before the callback runs. `None` registers
/// nothing.
pub fn on_animation_end<F>(
    host: &Rc<dyn Host>,
    element: Option<ElementId>,
    callback: F,
) -> Result<Unregister>
where
    F: FnOnce(&AnimationEvent) + 'static,
{
    let Some(element) = element else {
        return Ok(Unregister::noop());
    };

    let unregister = Unregister::noop();
    let handle = unregister.clone();
    let callback = RefCell::new(Some(callback));
    let listener: EventListener = Rc::new(move |ev: &AnimationEvent| {
        if ev.target != Some(element) || !handle.is_active() {
            return;
        }
        handle.call();
        trace!("animation end on {element:?} ({})", ev.animation_name);
        let cb = callback.borrow_mut().take();
        if let Some(cb) = cb {
            cb(ev);
        }
    });

    let options = ListenerOptions { passive: true };
    let mut listeners = Vec::with_capacity(ANIMATION_END_EVENTS.len());
    for event in ANIMATION_END_EVENTS {
        match host.add_event_listener(element, event, options, listener.clone()) {
            Ok(id) => listeners.push((event, id)),
            Err(e) => {
                for (event, id) in listeners {
                    host.remove_event_listener(element, event, id);
                }
                return Err(e);
            }
        }
    }

    *unregister.slot.borrow_mut() = Some(Registration {
        host: Rc::downgrade(host),
        element,
        listeners,
    });
    Ok(unregister)
}
