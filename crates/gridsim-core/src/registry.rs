//! Explicit model registry.
//!
//! Construction is keyed by model type name. A registry is an ordinary value
//! owned by whoever assembles a system, so two simulations never share
//! registrations.

use crate::config::ComponentSpec;
use crate::error::{GridError, GridResult};
use crate::model::DynamicModel;
use std::collections::BTreeMap;
use std::fmt;

/// Builds a configured model from its description.
pub type ModelConstructor = fn(&ComponentSpec) -> GridResult<Box<dyn DynamicModel>>;

#[derive(Clone, Default)]
pub struct ModelRegistry {
    constructors: BTreeMap<String, ModelConstructor>,
}

impl fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.constructors.keys()).finish()
    }
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `constructor` under `type_name` (case-insensitive).
    ///
    /// Re-registering a name replaces the previous constructor.
    pub fn register(&mut self, type_name: &str, constructor: ModelConstructor) -> &mut Self {
        self.constructors
            .insert(type_name.to_ascii_lowercase(), constructor);
        self
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.constructors
            .contains_key(&type_name.to_ascii_lowercase())
    }

    /// Registered type names in sorted order.
    pub fn available(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    pub fn build(&self, spec: &ComponentSpec) -> GridResult<Box<dyn DynamicModel>> {
        let constructor = self
            .constructors
            .get(&spec.model.to_ascii_lowercase())
            .ok_or_else(|| {
                GridError::Config(format!(
                    "unknown model type '{}' for '{}'; registered types: {}",
                    spec.model,
                    spec.name,
                    self.available().join(", ")
                ))
            })?;
        let model = constructor(spec)?;
        tracing::debug!(name = %spec.name, model = %spec.model, "built component");
        Ok(model)
    }
}
