//! Serializable component description consumed by the model registry.

use crate::error::{GridError, GridResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One component as written in a system file.
///
/// ```toml
/// name = "G1"
/// model = "genmodel6"
/// params = { h = 4.5, d = 0.03 }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentSpec {
    pub name: String,
    /// Registered model type name
    pub model: String,
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
}

impl ComponentSpec {
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        ComponentSpec {
            name: name.into(),
            model: model.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, name: &str, value: f64) -> Self {
        self.params.insert(name.to_string(), value);
        self
    }

    /// Apply every parameter through `set`, stopping at the first rejection.
    pub fn apply<F>(&self, mut set: F) -> GridResult<()>
    where
        F: FnMut(&str, f64) -> GridResult<()>,
    {
        for (param, value) in &self.params {
            if !value.is_finite() {
                return Err(GridError::Parameter(format!(
                    "{}: parameter '{}' must be finite, got {}",
                    self.name, param, value
                )));
            }
            set(param, *value).map_err(|err| match err {
                GridError::Parameter(msg) => GridError::Parameter(format!("{}: {}", self.name, msg)),
                other => other,
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_default_to_empty() {
        let spec: ComponentSpec = serde_json::from_str(r#"{"name":"G1","model":"genmodel6"}"#).unwrap();
        assert!(spec.params.is_empty());
        assert_eq!(spec.model, "genmodel6");
    }

    #[test]
    fn apply_prefixes_errors_with_component_name() {
        let spec = ComponentSpec::new("G1", "genmodel6").with_param("bogus", 1.0);
        let err = spec
            .apply(|name, _| Err(GridError::Parameter(format!("unknown parameter '{}'", name))))
            .unwrap_err();
        assert!(err.to_string().contains("G1: unknown parameter 'bogus'"));
    }

    #[test]
    fn apply_rejects_non_finite_values() {
        let spec = ComponentSpec::new("G1", "genmodel6").with_param("h", f64::NAN);
        assert!(spec.apply(|_, _| Ok(())).is_err());
    }
}
