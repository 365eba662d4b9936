use std::cell::Cell;
use std::rc::Rc;

use ion_animation_core::{
    on_animation_end, Animation, Config, KeyframeRegistry, ANIMATION_END_EVENTS,
};
use ion_animation_test_fixtures::{keyframes, MemoryHost};

#[test]
fn identical_keyframes_share_one_style_element() {
    let host = MemoryHost::new();
    let registry = KeyframeRegistry::isolated();
    let a = host.create_element();
    let b = host.create_element();
    let make = |el| {
        Animation::with_registry(host.as_host(), Config::default(), registry.clone())
            .add_element(el)
            .duration(150.0)
            .keyframes(keyframes::frames("slide-up").unwrap())
    };
    let first = make(a);
    let second = make(b);

    let _ = first.play();
    let _ = second.play();
    assert_eq!(host.style_count(), 1);
    assert_eq!(registry.borrow().len(), 1);
    assert_eq!(first.keyframe_names(), second.keyframe_names());

    let style = host.stylesheets()[0].style;
    assert_eq!(registry.borrow().users_of(style), 2);

    first.destroy();
    assert_eq!(host.style_count(), 1);
    second.destroy();
    assert_eq!(host.style_count(), 0);
}

#[test]
fn different_keyframes_get_distinct_names() {
    let host = MemoryHost::new();
    let registry = KeyframeRegistry::isolated();
    let el = host.create_element();
    let fade = Animation::with_registry(host.as_host(), Config::default(), registry.clone())
        .add_element(el)
        .duration(100.0)
        .keyframes(keyframes::frames("fade-in").unwrap());
    let slide = Animation::with_registry(host.as_host(), Config::default(), registry.clone())
        .add_element(el)
        .duration(100.0)
        .keyframes(keyframes::frames("slide-up").unwrap());

    let _ = fade.play();
    let _ = slide.play();
    let ids: Vec<String> = host.stylesheets().into_iter().map(|s| s.id).collect();
    assert_eq!(ids, vec!["ion-animation-0", "ion-animation-1"]);
}

#[test]
fn shadow_roots_get_their_own_style_element() {
    let host = MemoryHost::new();
    let root = host.create_shadow_root();
    let inside = host.create_element_in(root);
    let outside = host.create_element();

    let anim = Animation::with_registry(
        host.as_host(),
        Config::default(),
        KeyframeRegistry::isolated(),
    )
    .add_elements([inside, outside])
    .duration(100.0)
    .from_to("opacity", 0, 1);

    let _ = anim.play();
    let scoped = host.stylesheets_in(root);
    let global = host.stylesheets_in(host.head());
    assert_eq!(scoped.len(), 1);
    assert_eq!(global.len(), 1);
    assert_eq!(scoped[0].id, global[0].id);

    anim.destroy();
    assert_eq!(host.style_count(), 0);
}

#[test]
fn foreign_style_elements_are_reused_but_never_removed() {
    let host = MemoryHost::new();
    let el = host.create_element();
    let existing = ion_animation_core::Host::create_style(
        &*host,
        el,
        host.head(),
        "custom-fade",
        "@keyframes custom-fade { }",
    )
    .unwrap();

    let anim = Animation::with_registry(host.as_host(), Config::default(), KeyframeRegistry::isolated())
        .keyframe_name("custom-fade")
        .add_element(el)
        .duration(100.0)
        .from_to("opacity", 0, 1);
    let _ = anim.play();
    assert_eq!(host.style_count(), 1);
    anim.destroy();
    assert_eq!(host.stylesheets()[0].style, existing);
}

#[test]
fn alt_and_plain_nodes_get_separate_sheets() {
    let host = MemoryHost::new();
    let registry = KeyframeRegistry::isolated();
    let plain_el = host.create_element();
    let el = host.create_element();
    let no_alt = Config {
        emit_alt_keyframes: false,
        ..Config::default()
    };
    let plain = Animation::with_registry(host.as_host(), no_alt, registry.clone())
        .add_element(plain_el)
        .duration(100.0)
        .from_to("opacity", 0, 1);
    let toggling = Animation::with_registry(host.as_host(), Config::default(), registry.clone())
        .add_element(el)
        .duration(100.0)
        .from_to("opacity", 0, 1);

    let _ = plain.play();
    let _ = toggling.play();
    assert_eq!(plain.keyframe_names(), vec!["ion-animation-0".to_string()]);
    assert_eq!(toggling.keyframe_names(), vec!["ion-animation-1".to_string()]);

    host.fire_animation_end(el);
    let mut replay = toggling.play();
    assert_eq!(host.style(el, "animation-name").as_deref(), Some("ion-animation-1-alt"));
    let sheet = host
        .stylesheets()
        .into_iter()
        .find(|s| s.id == "ion-animation-1")
        .unwrap();
    assert!(sheet.text.contains("@keyframes ion-animation-1-alt "));

    host.fire_animation_end(el);
    assert_eq!(replay.try_result(), Some(Ok(())));
}

#[test]
fn replay_keeps_the_name_when_the_sheet_has_no_alt_rule() {
    let host = MemoryHost::new();
    let el = host.create_element();
    ion_animation_core::Host::create_style(
        &*host,
        el,
        host.head(),
        "custom-fade",
        "@keyframes custom-fade { 0% { opacity: 0; } 100% { opacity: 1; } }",
    )
    .unwrap();

    let anim = Animation::with_registry(host.as_host(), Config::default(), KeyframeRegistry::isolated())
        .keyframe_name("custom-fade")
        .add_element(el)
        .duration(100.0)
        .from_to("opacity", 0, 1);
    let _ = anim.play();
    host.fire_animation_end(el);

    let mut replay = anim.play();
    assert_eq!(host.style(el, "animation-name").as_deref(), Some("custom-fade"));
    host.fire_animation_end(el);
    assert_eq!(replay.try_result(), Some(Ok(())));
}

#[test]
fn animation_end_fires_callback_once_and_unregisters() {
    let host = MemoryHost::new();
    let el = host.create_element();
    let hits = Rc::new(Cell::new(0));
    let h = hits.clone();

    let unregister = on_animation_end(&host.as_host(), Some(el), move |ev| {
        assert_eq!(ev.target, Some(el));
        h.set(h.get() + 1);
    })
    .unwrap();

    let mut listeners = host.listeners(el);
    listeners.sort();
    let mut expected: Vec<(String, bool)> =
        ANIMATION_END_EVENTS.iter().map(|e| (e.to_string(), true)).collect();
    expected.sort();
    assert_eq!(listeners, expected);

    host.fire_animation_end(el);
    host.fire_animation_end(el);
    assert_eq!(hits.get(), 1);
    assert_eq!(host.listener_count(el), 0);
    assert!(!unregister.is_active());
    unregister.call();
}

#[test]
fn each_registration_fires_once() {
    let host = MemoryHost::new();
    let el = host.create_element();
    let first = Rc::new(Cell::new(0));
    let second = Rc::new(Cell::new(0));
    let (f, s) = (first.clone(), second.clone());

    let _a = on_animation_end(&host.as_host(), Some(el), move |_| f.set(f.get() + 1)).unwrap();
    let _b = on_animation_end(&host.as_host(), Some(el), move |_| s.set(s.get() + 1)).unwrap();
    assert_eq!(host.listener_count(el), 4);

    host.fire_animation_end(el);
    assert_eq!((first.get(), second.get()), (1, 1));
    assert_eq!(host.listener_count(el), 0);
}

#[test]
fn bubbled_events_are_ignored() {
    let host = MemoryHost::new();
    let parent = host.create_element();
    let child = host.create_element();
    let hits = Rc::new(Cell::new(0));
    let h = hits.clone();

    let _unregister =
        on_animation_end(&host.as_host(), Some(parent), move |_| h.set(h.get() + 1)).unwrap();

    host.dispatch(parent, "animationend", Some(child));
    assert_eq!(hits.get(), 0);
    assert_eq!(host.listener_count(parent), 2);

    host.dispatch(parent, "webkitAnimationEnd", Some(parent));
    assert_eq!(hits.get(), 1);
}

#[test]
fn unregister_before_the_event_prevents_the_callback() {
    let host = MemoryHost::new();
    let el = host.create_element();
    let hits = Rc::new(Cell::new(0));
    let h = hits.clone();

    let unregister =
        on_animation_end(&host.as_host(), Some(el), move |_| h.set(h.get() + 1)).unwrap();
    unregister.call();
    unregister.call();
    assert_eq!(host.listener_count(el), 0);

    host.fire_animation_end(el);
    assert_eq!(hits.get(), 0);
}

#[test]
fn missing_element_registers_nothing() {
    let host = MemoryHost::new();
    let unregister = on_animation_end(&host.as_host(), None, |_| {}).unwrap();
    assert!(!unregister.is_active());
    unregister.call();
}

#[test]
fn listener_on_detached_element_fails() {
    let host = MemoryHost::new();
    let el = host.create_element();
    host.detach(el);
    assert!(on_animation_end(&host.as_host(), Some(el), |_| {}).is_err());
    assert_eq!(host.listener_count(el), 0);
}
