//! Resolve - Replace cross-resource references with live values
//!
//! Each applied resource contributes its attributes to a binding map. Any
//! descriptor applied later reads `ResourceRef(binding, attribute)` values
//! out of that map.

use std::collections::HashMap;

use crate::resource::{Resource, State, Value};

/// binding name -> attributes known for that binding
#[derive(Debug, Clone, Default)]
pub struct BindingMap {
    bindings: HashMap<String, HashMap<String, Value>>,
}

impl BindingMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a resource's descriptor attributes merged with its live state.
    ///
    /// Live attributes win over descriptor attributes of the same name.
    pub fn bind(&mut self, resource: &Resource, state: &State) {
        let mut attrs = resource.attributes.clone();
        if state.exists {
            for (k, v) in &state.attributes {
                attrs.insert(k.clone(), v.clone());
            }
            if let Some(identifier) = &state.identifier {
                attrs
                    .entry("identifier".to_string())
                    .or_insert_with(|| Value::String(identifier.clone()));
            }
        }
        self.bindings.insert(resource.binding.clone(), attrs);
    }

    /// Record raw attributes for a binding
    pub fn insert(&mut self, binding: impl Into<String>, attrs: HashMap<String, Value>) {
        self.bindings.insert(binding.into(), attrs);
    }

    /// Forget a binding whose values are about to change
    pub fn remove(&mut self, binding: &str) {
        self.bindings.remove(binding);
    }

    pub fn contains(&self, binding: &str) -> bool {
        self.bindings.contains_key(binding)
    }

    pub fn get(&self, binding: &str, attribute: &str) -> Option<&Value> {
        self.bindings.get(binding).and_then(|attrs| attrs.get(attribute))
    }

    /// Resolve a single value, recursing through lists, maps and chained references
    pub fn resolve_value(&self, value: &Value) -> Value {
        match value {
            Value::ResourceRef(binding_name, attr_name) => {
                if let Some(attr_value) = self.get(binding_name, attr_name) {
                    return self.resolve_value(attr_value);
                }
                // Keep as-is if not found
                value.clone()
            }
            Value::List(items) => Value::List(items.iter().map(|v| self.resolve_value(v)).collect()),
            Value::Map(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.resolve_value(v)))
                    .collect(),
            ),
            _ => value.clone(),
        }
    }

    /// Copy of `resource` with every resolvable reference replaced
    pub fn resolve_resource(&self, resource: &Resource) -> Resource {
        let mut resolved = resource.clone();
        resolved.attributes = resource
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), self.resolve_value(v)))
            .collect();
        resolved
    }
}

/// References left in `resource` after resolution, as "binding.attribute"
pub fn unresolved_references(resource: &Resource) -> Vec<String> {
    let mut refs: Vec<String> = resource
        .references()
        .into_iter()
        .map(|(binding, attr)| format!("{}.{}", binding, attr))
        .collect();
    refs.sort();
    refs.dedup();
    refs
}
