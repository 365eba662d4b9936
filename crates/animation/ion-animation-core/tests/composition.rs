use std::cell::{Cell, RefCell};
use std::rc::Rc;

use ion_animation_core::{
    Animation, AnimationError, Config, FillMode, Host, KeyframeRegistry, PlaybackDirection,
    PlaybackState,
};
use ion_animation_test_fixtures::{keyframes, MemoryHost};

type Log = Rc<RefCell<Vec<String>>>;

fn log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

fn push(log: &Log, entry: &str) -> impl Fn() + 'static {
    let log = log.clone();
    let entry = entry.to_string();
    move || log.borrow_mut().push(entry.clone())
}

fn node(host: &Rc<MemoryHost>) -> Animation {
    Animation::with_registry(host.as_host(), Config::default(), KeyframeRegistry::isolated())
}

#[test]
fn parent_finishes_after_all_children() {
    let host = MemoryHost::with_web_animations();
    let fast_el = host.create_element();
    let slow_el = host.create_element();
    let events = log();

    let fast = node(&host)
        .add_element(fast_el)
        .duration(100.0)
        .from_to("opacity", 0, 1)
        .on_finish({
            let events = events.clone();
            move |_, _| events.borrow_mut().push("fast".into())
        });
    let slow = node(&host)
        .add_element(slow_el)
        .duration(500.0)
        .from_to("opacity", 0, 1)
        .on_finish({
            let events = events.clone();
            move |_, _| events.borrow_mut().push("slow".into())
        });
    let parent = node(&host)
        .easing("ease-out")
        .add_animations([fast.clone(), slow.clone()])
        .on_finish({
            let events = events.clone();
            move |_, _| events.borrow_mut().push("parent".into())
        });

    let mut done = parent.play();
    assert_eq!(fast.state(), PlaybackState::Playing);
    assert_eq!(slow.state(), PlaybackState::Playing);

    host.finish_native(fast_el);
    assert_eq!(fast.state(), PlaybackState::Finished);
    assert_eq!(parent.state(), PlaybackState::Playing);
    assert!(done.try_result().is_none());

    host.finish_native(slow_el);
    assert_eq!(done.try_result(), Some(Ok(())));
    assert_eq!(parent.state(), PlaybackState::Finished);
    assert_eq!(*events.borrow(), vec!["fast", "slow", "parent"]);

    // Children inherit the easing they did not set.
    assert_eq!(host.native_animations_on(fast_el)[0].timing.easing, "ease-out");
}

#[test]
fn timing_inherits_through_the_tree() {
    let host = MemoryHost::new();
    let child = node(&host).delay(20.0);
    let parent = node(&host)
        .duration(300.0)
        .iterations(2.0)
        .fill(FillMode::Forwards)
        .direction(PlaybackDirection::Alternate)
        .add_animation(child.clone());

    let timing = child.timing();
    assert_eq!(timing.duration, 300.0);
    assert_eq!(timing.delay, 20.0);
    assert_eq!(timing.iterations, 2.0);
    assert_eq!(timing.fill, FillMode::Forwards);
    assert_eq!(timing.direction, PlaybackDirection::Alternate);
    assert_eq!(parent.timing().delay, 0.0);
    assert_eq!(parent.timing().easing, "linear");
}

#[test]
fn empty_tree_completes_immediately() {
    let host = MemoryHost::new();
    let events = log();
    let parent = node(&host)
        .before_add_write(push(&events, "before"))
        .after_add_write(push(&events, "after"))
        .add_animation(node(&host));
    let mut done = parent.play();
    assert_eq!(done.try_result(), Some(Ok(())));
    assert_eq!(parent.children()[0].state(), PlaybackState::Finished);
    assert_eq!(*events.borrow(), vec!["before", "after"]);
}

#[test]
fn boundary_effects_run_in_order() {
    let host = MemoryHost::new();
    let el = host.create_element();
    host.add_class(el, "entering").unwrap();
    let events = log();

    let read_state = {
        let host = host.clone();
        let events = events.clone();
        move || {
            let classes = host.classes(el);
            let opacity = host.style(el, "opacity").unwrap_or_default();
            events
                .borrow_mut()
                .push(format!("read classes={} opacity={opacity}", classes.join(",")));
        }
    };

    let anim = node(&host)
        .add_element(el)
        .duration(100.0)
        .from_to("transform", "scale(0.9)", "scale(1)")
        .before_add_class(["show", "animating"])
        .before_remove_class("entering")
        .before_styles([("opacity", "0")])
        .before_add_read(read_state)
        .before_add_write(push(&events, "before write"))
        .after_remove_class("animating")
        .after_add_class("shown")
        .after_styles([("opacity", "1")])
        .after_clear_styles(["transform"])
        .after_add_read(push(&events, "after read"))
        .after_add_write(push(&events, "after write"));

    let _ = anim.play();
    assert_eq!(
        *events.borrow(),
        vec!["read classes=show,animating opacity=0", "before write"]
    );

    host.fire_animation_end(el);
    assert_eq!(
        *events.borrow(),
        vec![
            "read classes=show,animating opacity=0",
            "before write",
            "after read",
            "after write"
        ]
    );
    assert_eq!(host.classes(el), vec!["show", "shown"]);
    assert_eq!(host.style(el, "opacity").as_deref(), Some("1"));
}

#[test]
fn before_hooks_run_parent_first_after_hooks_child_first() {
    let host = MemoryHost::with_web_animations();
    let el = host.create_element();
    let events = log();

    let child = node(&host)
        .add_element(el)
        .duration(50.0)
        .from_to("opacity", 0, 1)
        .before_add_write(push(&events, "child before"))
        .after_add_write(push(&events, "child after"));
    let parent = node(&host)
        .before_add_write(push(&events, "parent before"))
        .after_add_write(push(&events, "parent after"))
        .add_animation(child);

    let _ = parent.play();
    host.finish_all_native();
    assert_eq!(
        *events.borrow(),
        vec!["parent before", "child before", "child after", "parent after"]
    );
}

#[test]
fn one_time_finish_callbacks_fire_once() {
    let host = MemoryHost::new();
    let events = log();
    let anim = node(&host)
        .on_finish(move |_, _| {})
        .on_finish({
            let events = events.clone();
            move |step, _| events.borrow_mut().push(format!("every {step}"))
        })
        .on_finish_once({
            let events = events.clone();
            move |step, _| events.borrow_mut().push(format!("once {step}"))
        });

    let _ = anim.play();
    let _ = anim.play();
    assert_eq!(*events.borrow(), vec!["every 1", "once 1", "every 1"]);
}

#[test]
fn stop_from_a_write_hook_cancels_the_run() {
    let host = MemoryHost::with_web_animations();
    let el = host.create_element();
    let holder: Rc<RefCell<Option<Animation>>> = Rc::new(RefCell::new(None));
    let stopper = {
        let holder = holder.clone();
        move || {
            if let Some(anim) = holder.borrow().as_ref() {
                anim.stop();
            }
        }
    };
    let anim = node(&host)
        .add_element(el)
        .duration(100.0)
        .from_to("opacity", 0, 1)
        .before_styles([("opacity", "0")])
        .before_add_write(stopper);
    *holder.borrow_mut() = Some(anim.clone());

    let mut done = anim.play();
    assert_eq!(done.try_result(), Some(Err(AnimationError::Cancelled)));
    assert_eq!(anim.state(), PlaybackState::Idle);
    assert!(host.native_animations().is_empty());
    assert_eq!(host.style(el, "opacity"), None);

    holder.borrow_mut().take();
}

#[test]
fn child_stopping_itself_during_start_resets_the_tree() {
    let host = MemoryHost::new();
    let el = host.create_element();
    host.set_style_property(el, "opacity", Some("1")).unwrap();

    let holder: Rc<RefCell<Option<Animation>>> = Rc::new(RefCell::new(None));
    let stopped = Rc::new(Cell::new(false));
    let stopper = {
        let holder = holder.clone();
        let stopped = stopped.clone();
        move || {
            if stopped.replace(true) {
                return;
            }
            if let Some(child) = holder.borrow().as_ref() {
                child.stop();
            }
        }
    };
    let child = node(&host).before_add_write(stopper);
    *holder.borrow_mut() = Some(child.clone());
    let parent = node(&host)
        .add_element(el)
        .before_styles([("opacity", "0.3")])
        .add_animation(child.clone());

    let mut first = parent.play();
    assert_eq!(first.try_result(), Some(Err(AnimationError::Cancelled)));
    assert_eq!(parent.state(), PlaybackState::Idle);
    assert_eq!(child.state(), PlaybackState::Idle);
    assert_eq!(host.style(el, "opacity").as_deref(), Some("1"));

    let mut second = parent.play();
    assert_eq!(second.try_result(), Some(Ok(())));
    assert_eq!(parent.state(), PlaybackState::Finished);

    holder.borrow_mut().take();
}

#[test]
fn child_failure_rejects_the_root() {
    let host = MemoryHost::new();
    let ok_el = host.create_element();
    let bad_el = host.create_element();
    host.detach(bad_el);

    let good = node(&host)
        .add_element(ok_el)
        .duration(100.0)
        .from_to("opacity", 0, 1)
        .before_styles([("opacity", "0")]);
    let bad = node(&host)
        .add_element(bad_el)
        .duration(100.0)
        .from_to("opacity", 0, 1);
    let parent = node(&host).add_animations([good.clone(), bad]);

    let mut done = parent.play();
    assert!(matches!(done.try_result(), Some(Err(AnimationError::Dom { .. }))));
    assert_eq!(parent.state(), PlaybackState::Idle);
    assert_eq!(good.state(), PlaybackState::Idle);
    assert_eq!(host.style(ok_el, "opacity"), None);
    assert_eq!(host.style(ok_el, "animation-name"), None);
    assert_eq!(host.listener_count(ok_el), 0);
}

#[test]
fn configuration_errors_surface_from_play() {
    let host = MemoryHost::new();

    let no_target = node(&host).duration(100.0).from_to("opacity", 0, 1);
    let mut done = no_target.play();
    assert!(matches!(
        done.try_result(),
        Some(Err(AnimationError::Configuration { .. }))
    ));
    assert_eq!(no_target.state(), PlaybackState::Idle);

    let el = host.create_element();
    let negative = node(&host)
        .add_element(el)
        .duration(-5.0)
        .from_to("opacity", 0, 1);
    assert!(matches!(negative.validate(), Err(AnimationError::Configuration { .. })));

    let unordered = node(&host)
        .add_element(el)
        .duration(100.0)
        .keyframes(keyframes::frames("unordered-offsets").unwrap());
    // A bad child fails the whole tree.
    let parent = node(&host).add_animation(unordered);
    let mut done = parent.play();
    assert!(matches!(
        done.try_result(),
        Some(Err(AnimationError::Configuration { .. }))
    ));
    assert!(host.stylesheets().is_empty());
}

#[test]
fn cycles_are_ignored() {
    let host = MemoryHost::new();
    let root = node(&host);
    let child = node(&host);
    let root = root.add_animation(child.clone());
    let root = root.clone().add_animation(root.clone());
    let child = child.add_animation(root.clone());
    assert_eq!(root.children().len(), 1);
    assert!(child.children().is_empty());
}

#[test]
fn from_and_to_reuse_boundary_keyframes() {
    let host = MemoryHost::new();
    let anim = node(&host)
        .keyframes(keyframes::frames("modal-enter").unwrap())
        .from("filter", "blur(4px)")
        .to("filter", "blur(0)");
    let frames = anim.current_keyframes();
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0].get("filter").map(|v| v.as_str()), Some("blur(4px)"));
    assert_eq!(frames[2].get("filter").map(|v| v.as_str()), Some("blur(0)"));

    let partial = node(&host).keyframes(keyframes::frames("unordered-offsets").unwrap());
    let partial = partial.to("opacity", "1");
    let frames = partial.current_keyframes();
    assert_eq!(frames.len(), 4);
    assert_eq!(frames[3].offset, Some(1.0));
}

#[test]
fn destroy_clears_the_tree() {
    let host = MemoryHost::new();
    let el = host.create_element();
    let calls = Rc::new(RefCell::new(0));
    let c = calls.clone();
    let child = node(&host)
        .add_element(el)
        .duration(100.0)
        .from_to("opacity", 0, 1);
    let parent = node(&host)
        .add_animation(child.clone())
        .on_finish(move |_, _| *c.borrow_mut() += 1);

    let mut done = parent.play();
    parent.destroy();
    assert_eq!(done.try_result(), Some(Err(AnimationError::Cancelled)));
    assert!(parent.children().is_empty());
    assert!(child.elements().is_empty());
    assert_eq!(host.style_count(), 0);
    assert_eq!(host.released(el), 1);

    let mut again = parent.play();
    assert_eq!(again.try_result(), Some(Ok(())));
    assert_eq!(*calls.borrow(), 0);
}
