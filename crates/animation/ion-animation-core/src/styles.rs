//! Inline style writes and the snapshot that undoes them.

use log::warn;

use crate::error::Result;
use crate::host::Host;
use crate::ids::ElementId;
use crate::keyframes::CssValue;

/// Passthrough to the element's inline style; `None` clears the value.
pub fn set_style_property(
    host: &dyn Host,
    element: ElementId,
    property: &str,
    value: Option<&str>,
) -> Result<()> {
    host.set_style_property(element, property, value)
}

/// Drop the inline override entirely so stylesheet values show through.
pub fn remove_style_property(host: &dyn Host, element: ElementId, property: &str) -> Result<()> {
    host.remove_style_property(element, property)
}

#[derive(Clone, Debug, PartialEq)]
struct Entry {
    element: ElementId,
    property: String,
    prior: Option<String>,
}

/// Pre-play inline values of every (element, property) a node touched.
/// Only the first capture of a pair counts, so repeated writes never lose
/// the original value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StyleSnapshot {
    entries: Vec<Entry>,
}

impl StyleSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capture(&mut self, host: &dyn Host, element: ElementId, property: &str) {
        if self
            .entries
            .iter()
            .any(|e| e.element == element && e.property == property)
        {
            return;
        }
        self.entries.push(Entry {
            element,
            property: property.to_string(),
            prior: host.inline_style(element, property),
        });
    }

    /// Capture then write each property.
    pub fn apply(
        &mut self,
        host: &dyn Host,
        element: ElementId,
        styles: &[(String, CssValue)],
    ) -> Result<()> {
        for (property, value) in styles {
            self.capture(host, element, property);
            set_style_property(host, element, property, Some(value.as_str()))?;
        }
        Ok(())
    }

    /// Capture then remove each property.
    pub fn clear(&mut self, host: &dyn Host, element: ElementId, properties: &[String]) -> Result<()> {
        for property in properties {
            self.capture(host, element, property);
            remove_style_property(host, element, property)?;
        }
        Ok(())
    }

    /// Write back every recorded value (or remove the property when none
    /// existed) and forget the entries. Keeps going past failures and
    /// returns the first one.
    pub fn restore(&mut self, host: &dyn Host) -> Result<()> {
        let mut first_err = None;
        for entry in self.entries.drain(..).rev() {
            let res = match &entry.prior {
                Some(v) => set_style_property(host, entry.element, &entry.property, Some(v)),
                None => remove_style_property(host, entry.element, &entry.property),
            };
            if let Err(e) = res {
                warn!(
                    "failed to restore {} on {:?}: {e}",
                    entry.property, entry.element
                );
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
