use std::cell::RefCell;
use std::rc::Rc;

use ion_animation_core::{
    Animation, AnimationError, BackendKind, Config, CssValue, KeyframeRegistry, PlaybackDirection,
    PlaybackState, ProgressTarget,
};
use ion_animation_test_fixtures::{keyframes, MemoryHost, NativeState};

fn native_node(host: &Rc<MemoryHost>) -> Animation {
    Animation::with_registry(host.as_host(), Config::default(), KeyframeRegistry::isolated())
}

#[test]
fn native_backend_is_preferred_when_available() {
    let host = MemoryHost::with_web_animations();
    assert_eq!(native_node(&host).backend_kind(), BackendKind::WebAnimations);

    let forced = Animation::with_registry(
        host.as_host(),
        Config {
            force_css_fallback: true,
            ..Config::default()
        },
        KeyframeRegistry::isolated(),
    );
    assert_eq!(forced.backend_kind(), BackendKind::CssKeyframes);
}

#[test]
fn native_keyframes_are_camel_cased() {
    let host = MemoryHost::with_web_animations();
    let el = host.create_element();
    let anim = native_node(&host)
        .add_element(el)
        .duration(250.0)
        .keyframes(keyframes::frames("hyphenated").unwrap());

    let mut done = anim.play();
    let records = host.native_animations_on(el);
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.state, NativeState::Running);
    assert_eq!(record.timing.duration, 250.0);
    assert_eq!(
        record.keyframes[1].get("backgroundColor"),
        Some(&CssValue::from("blue"))
    );
    assert!(record.keyframes[0].get("background-color").is_none());
    // The node keeps what the caller wrote.
    assert!(anim.current_keyframes()[0].get("background-color").is_some());
    assert_eq!(host.style_count(), 0);

    assert_eq!(host.finish_native(el), 1);
    assert_eq!(done.try_result(), Some(Ok(())));
}

#[test]
fn one_effect_per_element() {
    let host = MemoryHost::with_web_animations();
    let a = host.create_element();
    let b = host.create_element();
    let anim = native_node(&host)
        .add_elements([a, b, a])
        .duration(100.0)
        .from_to("opacity", 0, 1);
    assert_eq!(anim.elements(), vec![a, b]);

    let mut done = anim.play();
    assert_eq!(host.native_animations().len(), 2);
    host.finish_native(a);
    assert!(done.try_result().is_none());
    host.finish_native(b);
    assert_eq!(done.try_result(), Some(Ok(())));
}

#[test]
fn second_play_while_playing_is_rejected() {
    let host = MemoryHost::with_web_animations();
    let el = host.create_element();
    let anim = native_node(&host)
        .add_element(el)
        .duration(100.0)
        .from_to("opacity", 0, 1);

    let mut first = anim.play();
    let mut second = anim.play();
    assert_eq!(
        second.try_result(),
        Some(Err(AnimationError::PlaybackState {
            current: "playing".into(),
            requested: "playing".into(),
        }))
    );
    assert!(first.try_result().is_none());
    assert_eq!(host.native_animations().len(), 1);
}

#[test]
fn progress_scrubs_and_plays_back_to_start() {
    let host = MemoryHost::with_web_animations();
    let el = host.create_element();
    let finished = Rc::new(RefCell::new(Vec::new()));
    let log = finished.clone();
    let anim = native_node(&host)
        .add_element(el)
        .duration(200.0)
        .easing("cubic-bezier(0.32,0.72,0,1)")
        .from_to("transform", "translateY(100%)", "translateY(0)")
        .on_finish(move |step, reversed| log.borrow_mut().push((step, reversed)));

    anim.progress_start(true, Some(0.25)).unwrap();
    let record = &host.native_animations_on(el)[0];
    assert_eq!(record.state, NativeState::Paused);
    assert_eq!(record.timing.easing, "linear");
    assert_eq!(record.current_time, 50.0);

    anim.progress_step(0.5);
    assert_eq!(host.native_animations_on(el)[0].current_time, 100.0);
    anim.progress_step(3.0);
    let clamped = host.native_animations_on(el)[0].current_time;
    assert!(clamped < 200.0 && clamped > 199.9);

    let mut done = anim
        .progress_end(Some(ProgressTarget::Start), 0.3, Some(100.0))
        .expect("target given");
    let record = &host.native_animations_on(el)[0];
    assert_eq!(record.state, NativeState::Running);
    assert_eq!(record.timing.direction, PlaybackDirection::Reverse);
    assert_eq!(record.timing.duration, 100.0);
    assert_eq!(record.timing.easing, "cubic-bezier(0.32,0.72,0,1)");
    assert!((record.current_time - 70.0).abs() < 1e-9);

    host.finish_native(el);
    assert_eq!(done.try_result(), Some(Ok(())));
    assert_eq!(*finished.borrow(), vec![(0, true)]);

    // A fresh run drops every runtime override.
    let _ = anim.play();
    let latest = host.native_animations_on(el).pop().unwrap();
    assert_eq!(latest.timing.direction, PlaybackDirection::Normal);
    assert_eq!(latest.timing.duration, 200.0);
}

#[test]
fn progress_end_without_target_stays_paused() {
    let host = MemoryHost::with_web_animations();
    let el = host.create_element();
    let anim = native_node(&host)
        .add_element(el)
        .duration(100.0)
        .from_to("opacity", 0, 1);

    assert!(anim.progress_end(None, 0.5, None).is_none());
    assert_eq!(anim.state(), PlaybackState::Idle);

    anim.progress_start(false, None).unwrap();
    assert!(anim.progress_end(None, 0.5, None).is_none());
    assert_eq!(anim.state(), PlaybackState::Paused);
    assert_eq!(host.native_animations_on(el)[0].state, NativeState::Paused);
}

#[test]
fn progress_start_pauses_a_running_animation() {
    let host = MemoryHost::with_web_animations();
    let el = host.create_element();
    let anim = native_node(&host)
        .add_element(el)
        .duration(100.0)
        .from_to("opacity", 0, 1);

    let mut done = anim.play();
    anim.progress_start(false, Some(0.4)).unwrap();
    assert_eq!(anim.state(), PlaybackState::Paused);
    assert_eq!(host.native_animations().len(), 1);
    assert_eq!(host.native_animations_on(el)[0].current_time, 40.0);

    let _ = anim.progress_end(Some(ProgressTarget::End), 0.4, None);
    host.finish_native(el);
    assert_eq!(done.try_result(), Some(Ok(())));
}

#[test]
fn stop_cancels_native_effects() {
    let host = MemoryHost::with_web_animations();
    let el = host.create_element();
    let anim = native_node(&host)
        .add_element(el)
        .duration(100.0)
        .from_to("opacity", 0, 1);

    let mut done = anim.play();
    anim.stop();
    assert_eq!(host.native_animations_on(el)[0].state, NativeState::Cancelled);
    assert_eq!(done.try_result(), Some(Err(AnimationError::Cancelled)));
    assert_eq!(host.finish_native(el), 0);
}

#[test]
fn detached_element_rejects_with_dom_error() {
    let host = MemoryHost::with_web_animations();
    let el = host.create_element();
    host.detach(el);
    let anim = native_node(&host)
        .add_element(el)
        .duration(100.0)
        .from_to("opacity", 0, 1);

    let mut done = anim.play();
    assert!(matches!(done.try_result(), Some(Err(AnimationError::Dom { .. }))));
    assert_eq!(anim.state(), PlaybackState::Idle);
}

#[test]
fn failure_while_resuming_rejects_pending_run() {
    let host = MemoryHost::with_web_animations();
    let el = host.create_element();
    let anim = native_node(&host)
        .add_element(el)
        .duration(100.0)
        .from_to("opacity", 0, 1);

    anim.progress_start(false, None).unwrap();
    host.detach(el);
    let mut done = anim
        .progress_end(Some(ProgressTarget::End), 0.0, None)
        .expect("target given");
    assert!(matches!(done.try_result(), Some(Err(AnimationError::Dom { .. }))));
    assert_eq!(anim.state(), PlaybackState::Idle);
}
