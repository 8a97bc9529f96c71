// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Layered control-plane configuration. A `PropertyStack` has three
//! layers in precedence order: per-client local overrides, values
//! inherited from the owning SDR source, and hard-coded defaults. Reading
//! a key returns the highest-precedence layer that has it set; deleting a
//! local override lets a lower layer (or "unset") show through again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;

/// Layer index, lowest number = highest precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Local = 0,
    Inherited = 1,
    Default = 2,
}

type Subscriber = Box<dyn Fn(Option<&Value>) + Send + Sync>;

#[derive(Default)]
struct Layers {
    local: HashMap<String, Value>,
    inherited: HashMap<String, Value>,
    default: HashMap<String, Value>,
}

impl Layers {
    fn layer_mut(&mut self, layer: Layer) -> &mut HashMap<String, Value> {
        match layer {
            Layer::Local => &mut self.local,
            Layer::Inherited => &mut self.inherited,
            Layer::Default => &mut self.default,
        }
    }

    fn resolve(&self, key: &str) -> Option<&Value> {
        self.local
            .get(key)
            .or_else(|| self.inherited.get(key))
            .or_else(|| self.default.get(key))
    }
}

/// A three-layer property store with change notification. Clone is cheap
/// (shares the underlying store); used by `DspManager` to bind recognized
/// property keys to chain mutators.
#[derive(Clone, Default)]
pub struct PropertyStack {
    layers: Arc<Mutex<Layers>>,
    subscribers: Arc<Mutex<HashMap<String, Vec<Subscriber>>>>,
}

impl PropertyStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.layers.lock().unwrap().resolve(key).cloned()
    }

    pub fn set(&self, layer: Layer, key: &str, value: Value) {
        {
            let mut layers = self.layers.lock().unwrap();
            layers.layer_mut(layer).insert(key.to_string(), value);
        }
        self.notify(key);
    }

    /// Remove a local override (the "PropertyDeleted" sentinel in the
    /// original): the resolved value falls through to a lower layer, or
    /// becomes absent entirely, and subscribers are notified either way.
    pub fn delete_local(&self, key: &str) {
        {
            let mut layers = self.layers.lock().unwrap();
            layers.local.remove(key);
        }
        self.notify(key);
    }

    /// Bind `callback` to `key`; it fires immediately with the current
    /// resolved value, then again on every future change to any layer
    /// under that key.
    pub fn wire<F>(&self, key: &str, callback: F)
    where
        F: Fn(Option<&Value>) + Send + Sync + 'static,
    {
        callback(self.get(key).as_ref());
        self.subscribers
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push(Box::new(callback));
    }

    fn notify(&self, key: &str) {
        let value = self.get(key);
        if let Some(callbacks) = self.subscribers.lock().unwrap().get(key) {
            for callback in callbacks {
                callback(value.as_ref());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn local_overrides_inherited_overrides_default() {
        let stack = PropertyStack::new();
        stack.set(Layer::Default, "samp_rate", json!(2_400_000));
        stack.set(Layer::Inherited, "samp_rate", json!(2_048_000));
        assert_eq!(stack.get("samp_rate"), Some(json!(2_048_000)));
        stack.set(Layer::Local, "samp_rate", json!(96_000));
        assert_eq!(stack.get("samp_rate"), Some(json!(96_000)));
    }

    #[test]
    fn deleting_local_falls_through_to_lower_layer() {
        let stack = PropertyStack::new();
        stack.set(Layer::Default, "low_cut", json!(-4000));
        stack.set(Layer::Local, "low_cut", json!(-500));
        stack.delete_local("low_cut");
        assert_eq!(stack.get("low_cut"), Some(json!(-4000)));
    }

    #[test]
    fn wire_fires_immediately_and_on_change() {
        let stack = PropertyStack::new();
        stack.set(Layer::Default, "mod", json!("nfm"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        stack.wire("mod", move |v| {
            seen_clone.lock().unwrap().push(v.cloned());
        });
        stack.set(Layer::Local, "mod", json!("am"));
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], Some(json!("nfm")));
        assert_eq!(seen[1], Some(json!("am")));
    }
}
