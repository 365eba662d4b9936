use js_sys::{Function, Promise};
use serde_json::Value as JsonValue;
use serde_wasm_bindgen as swb;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;
use web_sys::HtmlElement;

use ion_animation_core::{
    keyframes_from_json, Animation, Config, CssValue, FillMode, Host, PlaybackDirection,
    ProgressTarget,
};

mod dom;

pub use dom::DomHost;

fn jsvalue_is_undefined_or_null(v: &JsValue) -> bool {
    v.is_undefined() || v.is_null()
}

fn to_js_error(e: impl std::fmt::Display) -> JsError {
    JsError::new(&e.to_string())
}

/// JS number or string as a CSS value.
fn css_value(value: &JsValue) -> Result<CssValue, JsError> {
    if let Some(s) = value.as_string() {
        return Ok(CssValue(s));
    }
    if let Some(n) = value.as_f64() {
        return Ok(CssValue::from(n));
    }
    Err(JsError::new("CSS value must be a string or a number"))
}

/// `{ opacity: 0, transform: "none" }` as ordered pairs.
fn style_map(value: JsValue) -> Result<Vec<(String, CssValue)>, JsError> {
    if jsvalue_is_undefined_or_null(&value) {
        return Ok(Vec::new());
    }
    let json: JsonValue =
        swb::from_value(value).map_err(|e| JsError::new(&format!("styles parse error: {e}")))?;
    let JsonValue::Object(map) = json else {
        return Err(JsError::new("styles must be an object"));
    };
    map.into_iter()
        .map(|(k, v)| match v {
            JsonValue::String(s) => Ok((k, CssValue(s))),
            JsonValue::Number(n) => Ok((k, CssValue(n.to_string()))),
            other => Err(JsError::new(&format!("style '{k}' has unsupported value {other}"))),
        })
        .collect()
}

/// A class name or an array of them.
fn class_list(value: JsValue) -> Result<Vec<String>, JsError> {
    if let Some(s) = value.as_string() {
        return Ok(vec![s]);
    }
    swb::from_value(value).map_err(|e| JsError::new(&format!("class list parse error: {e}")))
}

fn enum_from_str<T: serde::de::DeserializeOwned>(kind: &str, value: &str) -> Result<T, JsError> {
    serde_json::from_value(JsonValue::String(value.to_string()))
        .map_err(|_| JsError::new(&format!("unknown {kind} '{value}'")))
}

fn hook(f: Function) -> impl Fn() + 'static {
    move || {
        if let Err(e) = f.call0(&JsValue::UNDEFINED) {
            log::warn!("animation hook threw: {e:?}");
        }
    }
}

/// JS handle to an animation node. Builder methods return a handle to the
/// same node so calls can be chained.
#[wasm_bindgen]
#[derive(Clone)]
pub struct IonAnimation {
    core: Animation,
}

impl IonAnimation {
    fn chain(&self, f: impl FnOnce(Animation) -> Animation) -> IonAnimation {
        IonAnimation {
            core: f(self.core.clone()),
        }
    }
}

#[wasm_bindgen]
impl IonAnimation {
    /// Create a node. Pass a config object or undefined/null for defaults.
    /// Example:
    ///   new IonAnimation({ emit_alt_keyframes: false })
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<IonAnimation, JsError> {
        console_error_panic_hook::set_once();

        let cfg: Config = if jsvalue_is_undefined_or_null(&config) {
            Config::default()
        } else {
            swb::from_value(config).map_err(|e| JsError::new(&format!("config error: {e}")))?
        };
        let host: std::rc::Rc<dyn Host> = DomHost::shared();
        Ok(IonAnimation {
            core: Animation::with_config(host, cfg),
        })
    }

    /// Use `name` for the generated `@keyframes` rule.
    #[wasm_bindgen]
    pub fn id(&self, name: String) -> IonAnimation {
        self.chain(|a| a.keyframe_name(name))
    }

    #[wasm_bindgen(js_name = addElement)]
    pub fn add_element(&self, element: HtmlElement) -> IonAnimation {
        let host = DomHost::shared();
        let id = host.register(&element);
        if self.core.elements().contains(&id) {
            // One reference per (node, element); destroy releases it once.
            host.release_element(id);
        }
        self.chain(|a| a.add_element(id))
    }

    #[wasm_bindgen(js_name = addAnimation)]
    pub fn add_animation(&self, child: &IonAnimation) -> IonAnimation {
        let child = child.core.clone();
        self.chain(|a| a.add_animation(child))
    }

    #[wasm_bindgen]
    pub fn duration(&self, ms: f64) -> IonAnimation {
        self.chain(|a| a.duration(ms))
    }

    #[wasm_bindgen]
    pub fn delay(&self, ms: f64) -> IonAnimation {
        self.chain(|a| a.delay(ms))
    }

    #[wasm_bindgen]
    pub fn easing(&self, easing: String) -> IonAnimation {
        self.chain(|a| a.easing(easing))
    }

    #[wasm_bindgen]
    pub fn iterations(&self, iterations: f64) -> IonAnimation {
        self.chain(|a| a.iterations(iterations))
    }

    #[wasm_bindgen]
    pub fn fill(&self, fill: String) -> Result<IonAnimation, JsError> {
        let fill: FillMode = enum_from_str("fill mode", &fill)?;
        Ok(self.chain(|a| a.fill(fill)))
    }

    #[wasm_bindgen]
    pub fn direction(&self, direction: String) -> Result<IonAnimation, JsError> {
        let direction: PlaybackDirection = enum_from_str("direction", &direction)?;
        Ok(self.chain(|a| a.direction(direction)))
    }

    /// Array of keyframe objects, e.g. `[{ offset: 0, opacity: 0 }, { offset: 1, opacity: 1 }]`.
    #[wasm_bindgen]
    pub fn keyframes(&self, keyframes: JsValue) -> Result<IonAnimation, JsError> {
        let json: JsonValue = swb::from_value(keyframes)
            .map_err(|e| JsError::new(&format!("keyframes parse error: {e}")))?;
        let frames = keyframes_from_json(&json).map_err(to_js_error)?;
        Ok(self.chain(|a| a.keyframes(frames)))
    }

    #[wasm_bindgen]
    pub fn from(&self, property: String, value: JsValue) -> Result<IonAnimation, JsError> {
        let value = css_value(&value)?;
        Ok(self.chain(|a| a.from(property, value)))
    }

    #[wasm_bindgen]
    pub fn to(&self, property: String, value: JsValue) -> Result<IonAnimation, JsError> {
        let value = css_value(&value)?;
        Ok(self.chain(|a| a.to(property, value)))
    }

    #[wasm_bindgen(js_name = fromTo)]
    pub fn from_to(
        &self,
        property: String,
        from: JsValue,
        to: JsValue,
    ) -> Result<IonAnimation, JsError> {
        let (from, to) = (css_value(&from)?, css_value(&to)?);
        Ok(self.chain(|a| a.from_to(property, from, to)))
    }

    #[wasm_bindgen(js_name = beforeStyles)]
    pub fn before_styles(&self, styles: JsValue) -> Result<IonAnimation, JsError> {
        let styles = style_map(styles)?;
        Ok(self.chain(|a| a.before_styles(styles)))
    }

    #[wasm_bindgen(js_name = afterStyles)]
    pub fn after_styles(&self, styles: JsValue) -> Result<IonAnimation, JsError> {
        let styles = style_map(styles)?;
        Ok(self.chain(|a| a.after_styles(styles)))
    }

    #[wasm_bindgen(js_name = beforeClearStyles)]
    pub fn before_clear_styles(&self, properties: Vec<String>) -> IonAnimation {
        self.chain(|a| a.before_clear_styles(properties))
    }

    #[wasm_bindgen(js_name = afterClearStyles)]
    pub fn after_clear_styles(&self, properties: Vec<String>) -> IonAnimation {
        self.chain(|a| a.after_clear_styles(properties))
    }

    #[wasm_bindgen(js_name = beforeAddClass)]
    pub fn before_add_class(&self, classes: JsValue) -> Result<IonAnimation, JsError> {
        let classes = class_list(classes)?;
        Ok(self.chain(|a| a.before_add_class(classes)))
    }

    #[wasm_bindgen(js_name = beforeRemoveClass)]
    pub fn before_remove_class(&self, classes: JsValue) -> Result<IonAnimation, JsError> {
        let classes = class_list(classes)?;
        Ok(self.chain(|a| a.before_remove_class(classes)))
    }

    #[wasm_bindgen(js_name = afterAddClass)]
    pub fn after_add_class(&self, classes: JsValue) -> Result<IonAnimation, JsError> {
        let classes = class_list(classes)?;
        Ok(self.chain(|a| a.after_add_class(classes)))
    }

    #[wasm_bindgen(js_name = afterRemoveClass)]
    pub fn after_remove_class(&self, classes: JsValue) -> Result<IonAnimation, JsError> {
        let classes = class_list(classes)?;
        Ok(self.chain(|a| a.after_remove_class(classes)))
    }

    #[wasm_bindgen(js_name = beforeAddRead)]
    pub fn before_add_read(&self, callback: Function) -> IonAnimation {
        self.chain(|a| a.before_add_read(hook(callback)))
    }

    #[wasm_bindgen(js_name = beforeAddWrite)]
    pub fn before_add_write(&self, callback: Function) -> IonAnimation {
        self.chain(|a| a.before_add_write(hook(callback)))
    }

    #[wasm_bindgen(js_name = afterAddRead)]
    pub fn after_add_read(&self, callback: Function) -> IonAnimation {
        self.chain(|a| a.after_add_read(hook(callback)))
    }

    #[wasm_bindgen(js_name = afterAddWrite)]
    pub fn after_add_write(&self, callback: Function) -> IonAnimation {
        self.chain(|a| a.after_add_write(hook(callback)))
    }

    /// `callback(step, reversed)`. Pass `{ oneTimeCallback: true }` to drop it after one call.
    #[wasm_bindgen(js_name = onFinish)]
    pub fn on_finish(&self, callback: Function, opts: JsValue) -> IonAnimation {
        let one_time = !jsvalue_is_undefined_or_null(&opts)
            && js_sys::Reflect::get(&opts, &JsValue::from_str("oneTimeCallback"))
                .map(|v| v.is_truthy())
                .unwrap_or(false);
        let finish = move |step: u8, reversed: bool| {
            if let Err(e) = callback.call2(
                &JsValue::UNDEFINED,
                &JsValue::from(step),
                &JsValue::from(reversed),
            ) {
                log::warn!("onFinish callback threw: {e:?}");
            }
        };
        if one_time {
            self.chain(|a| a.on_finish_once(finish))
        } else {
            self.chain(|a| a.on_finish(finish))
        }
    }

    /// Resolves when the run completes; rejects on failure or `stop()`.
    #[wasm_bindgen]
    pub fn play(&self) -> Promise {
        let done = self.core.play();
        future_to_promise(async move {
            done.await
                .map(|_| JsValue::UNDEFINED)
                .map_err(|e| JsValue::from(to_js_error(e)))
        })
    }

    #[wasm_bindgen]
    pub fn pause(&self) {
        self.core.pause();
    }

    #[wasm_bindgen]
    pub fn stop(&self) {
        self.core.stop();
    }

    #[wasm_bindgen]
    pub fn destroy(&self) {
        self.core.destroy();
    }

    #[wasm_bindgen(js_name = progressStart)]
    pub fn progress_start(&self, force_linear: bool, step: Option<f64>) -> Result<(), JsError> {
        self.core.progress_start(force_linear, step).map_err(to_js_error)
    }

    #[wasm_bindgen(js_name = progressStep)]
    pub fn progress_step(&self, step: f64) {
        self.core.progress_step(step);
    }

    /// `play_to` is `1` (end), `0` (start) or undefined to stay paused.
    #[wasm_bindgen(js_name = progressEnd)]
    pub fn progress_end(
        &self,
        play_to: Option<u8>,
        step: f64,
        duration: Option<f64>,
    ) -> Result<Option<Promise>, JsError> {
        let target = match play_to {
            None => None,
            Some(0) => Some(ProgressTarget::Start),
            Some(1) => Some(ProgressTarget::End),
            Some(other) => return Err(JsError::new(&format!("playTo must be 0 or 1, got {other}"))),
        };
        Ok(self.core.progress_end(target, step, duration).map(|done| {
            future_to_promise(async move {
                done.await
                    .map(|_| JsValue::UNDEFINED)
                    .map_err(|e| JsValue::from(to_js_error(e)))
            })
        }))
    }

    /// Effective timing as `{ duration, delay, easing, iterations, fill, direction }`.
    #[wasm_bindgen]
    pub fn timing(&self) -> Result<JsValue, JsError> {
        swb::to_value(&self.core.timing()).map_err(|e| JsError::new(&format!("serialize error: {e}")))
    }

    #[wasm_bindgen]
    pub fn state(&self) -> String {
        self.core.state().to_string()
    }

    #[wasm_bindgen(js_name = keyframeNames)]
    pub fn keyframe_names(&self) -> Vec<String> {
        self.core.keyframe_names()
    }
}

#[wasm_bindgen]
pub fn abi_version() -> u32 {
    1
}
