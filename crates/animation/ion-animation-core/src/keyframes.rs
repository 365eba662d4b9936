//! Keyframe model, property-name normalization and CSS rule rendering.
//!
//! The native Web Animations API reads camel-case property names
//! (`borderRadius`) while the stylesheet fallback needs hyphenated CSS
//! (`border-radius`). Keyframes keep whatever the caller wrote; each backend
//! converts on the way out.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::{AnimationError, Result};

/// A CSS value as written into a keyframe or inline style.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CssValue(pub String);

impl CssValue {
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CssValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CssValue {
    fn from(v: &str) -> Self {
        Self(v.to_string())
    }
}

impl From<String> for CssValue {
    fn from(v: String) -> Self {
        Self(v)
    }
}

impl From<f64> for CssValue {
    fn from(v: f64) -> Self {
        Self(format!("{v}"))
    }
}

impl From<f32> for CssValue {
    fn from(v: f32) -> Self {
        Self(format!("{v}"))
    }
}

impl From<i32> for CssValue {
    fn from(v: i32) -> Self {
        Self(v.to_string())
    }
}

impl From<u32> for CssValue {
    fn from(v: u32) -> Self {
        Self(v.to_string())
    }
}

/// One keyframe: an optional offset in `[0, 1]` plus ordered property/value pairs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Keyframe {
    pub offset: Option<f64>,
    pub properties: Vec<(String, CssValue)>,
}

impl Keyframe {
    /// Keyframe without an explicit offset.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(offset: f64) -> Self {
        Self {
            offset: Some(offset),
            properties: Vec::new(),
        }
    }

    /// Builder form of [`Keyframe::set`].
    pub fn with(mut self, property: impl Into<String>, value: impl Into<CssValue>) -> Self {
        self.set(property, value);
        self
    }

    /// Insert or overwrite a property, keeping first-insertion order.
    pub fn set(&mut self, property: impl Into<String>, value: impl Into<CssValue>) {
        let property = property.into();
        let value = value.into();
        match self.properties.iter_mut().find(|(k, _)| *k == property) {
            Some(slot) => slot.1 = value,
            None => self.properties.push((property, value)),
        }
    }

    pub fn get(&self, property: &str) -> Option<&CssValue> {
        self.properties
            .iter()
            .find_map(|(k, v)| if k == property { Some(v) } else { None })
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, &CssValue)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Parse a plain object such as `{"offset": 0, "opacity": 0, "border-radius": "0px"}`.
    /// Property order follows the object's key order.
    pub fn from_json(value: &JsonValue) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| AnimationError::configuration("keyframe must be an object"))?;
        let mut frame = Keyframe::new();
        for (key, v) in obj {
            if key == "offset" {
                frame.offset = match v {
                    JsonValue::Null => None,
                    JsonValue::Number(n) => n.as_f64(),
                    other => {
                        return Err(AnimationError::configuration(format!(
                            "keyframe offset must be a number, got {other}"
                        )))
                    }
                };
                continue;
            }
            let css = match v {
                JsonValue::String(s) => CssValue(s.clone()),
                JsonValue::Number(n) => match n.as_f64() {
                    Some(f) => CssValue::from(f),
                    None => CssValue(n.to_string()),
                },
                other => {
                    return Err(AnimationError::configuration(format!(
                        "keyframe property '{key}' has unsupported value {other}"
                    )))
                }
            };
            frame.properties.push((key.clone(), css));
        }
        Ok(frame)
    }

    pub fn to_json(&self) -> JsonValue {
        let mut map = Map::new();
        if let Some(offset) = self.offset {
            map.insert("offset".to_string(), JsonValue::from(offset));
        }
        for (k, v) in &self.properties {
            map.insert(k.clone(), JsonValue::String(v.0.clone()));
        }
        JsonValue::Object(map)
    }
}

/// Parse an array of keyframe objects.
pub fn keyframes_from_json(value: &JsonValue) -> Result<Vec<Keyframe>> {
    value
        .as_array()
        .ok_or_else(|| AnimationError::configuration("keyframes must be an array"))?
        .iter()
        .map(Keyframe::from_json)
        .collect()
}

/// `border-radius` -> `borderRadius`. Only a hyphen followed by an ASCII
/// letter is folded; other hyphens are kept.
pub fn convert_hyphen_to_camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut chars = name.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '-' {
            if let Some(&next) = chars.peek() {
                if next.is_ascii_alphabetic() {
                    out.push(next.to_ascii_uppercase());
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

/// Name as it must appear in CSS text. Already-hyphenated names and custom
/// properties pass through; camel case is expanded (`WebkitTransform` ->
/// `-webkit-transform`).
pub fn css_property_name(name: &str) -> String {
    if name.contains('-') || !name.chars().any(|c| c.is_ascii_uppercase()) {
        return name.to_string();
    }
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Rewrite every hyphenated property to camel case in place. The moved key
/// overwrites an existing camel-case entry or is appended. Idempotent.
pub fn process_keyframes(keyframes: &mut [Keyframe]) {
    for frame in keyframes.iter_mut() {
        if !frame.properties.iter().any(|(k, _)| k.contains('-')) {
            continue;
        }
        let original = std::mem::take(&mut frame.properties);
        let mut moved = Vec::new();
        for (key, value) in original {
            if key.contains('-') {
                moved.push((convert_hyphen_to_camel_case(&key), value));
            } else {
                frame.properties.push((key, value));
            }
        }
        for (key, value) in moved {
            frame.set(key, value);
        }
    }
}

/// Offsets with gaps filled the way Web Animations spaces them: a missing
/// last offset is 1, a missing first offset (of several) is 0, interior
/// gaps are spread evenly between their explicit neighbours.
pub fn computed_offsets(keyframes: &[Keyframe]) -> Vec<f64> {
    let n = keyframes.len();
    let mut offsets: Vec<Option<f64>> = keyframes.iter().map(|k| k.offset).collect();
    if n == 0 {
        return Vec::new();
    }
    if offsets[n - 1].is_none() {
        offsets[n - 1] = Some(1.0);
    }
    if n > 1 && offsets[0].is_none() {
        offsets[0] = Some(0.0);
    }
    let mut prev = 0usize;
    for i in 1..n {
        if let Some(end) = offsets[i] {
            let start = offsets[prev].unwrap_or(0.0);
            let span = (i - prev) as f64;
            for (step, slot) in offsets.iter_mut().enumerate().take(i).skip(prev + 1) {
                *slot = Some(start + (end - start) * (step - prev) as f64 / span);
            }
            prev = i;
        }
    }
    offsets.into_iter().map(|o| o.unwrap_or(0.0)).collect()
}

/// Render keyframes as CSS rule text for an `@keyframes` block body:
/// `0% { opacity: 0; } 100% { opacity: 1; }`.
pub fn generate_keyframe_rules(keyframes: &[Keyframe]) -> String {
    let offsets = computed_offsets(keyframes);
    keyframes
        .iter()
        .zip(offsets)
        .map(|(frame, offset)| {
            let decls: Vec<String> = frame
                .properties
                .iter()
                .map(|(k, v)| format!("{}: {};", css_property_name(k), v))
                .collect();
            format!("{}% {{ {} }}", offset * 100.0, decls.join(" "))
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Explicit offsets must be finite, inside `[0, 1]` and strictly increasing.
pub fn validate_keyframes(keyframes: &[Keyframe]) -> Result<()> {
    let mut last: Option<f64> = None;
    for (i, frame) in keyframes.iter().enumerate() {
        let Some(offset) = frame.offset else {
            continue;
        };
        if !offset.is_finite() || !(0.0..=1.0).contains(&offset) {
            return Err(AnimationError::configuration(format!(
                "keyframe {i} offset {offset} is outside [0, 1]"
            )));
        }
        if let Some(prev) = last {
            if offset <= prev {
                return Err(AnimationError::configuration(format!(
                    "keyframe {i} offset {offset} does not follow previous offset {prev}"
                )));
            }
        }
        last = Some(offset);
    }
    Ok(())
}
