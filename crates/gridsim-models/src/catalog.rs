//! Built-in model types, keyed by the names used in system files.

use crate::genmodel::{GenModel3, GenModel4, GenModel5, GenModel6, GenModelClassical};
use crate::motor::MotorLoad;
use gridsim_core::model::{DynamicModel, ModelGroup};
use gridsim_core::{ComponentSpec, GridError, GridResult, ModelRegistry};

fn group(spec: &ComponentSpec) -> GridResult<Box<dyn DynamicModel>> {
    if !spec.params.is_empty() {
        return Err(GridError::Config(format!(
            "{}: groups take no parameters",
            spec.name
        )));
    }
    Ok(Box::new(ModelGroup::new(spec.name.clone())))
}

/// Registry with every model this crate ships.
///
/// | Type name                  | Model                 |
/// |----------------------------|-----------------------|
/// | `genmodel2`, `classical`   | [`GenModelClassical`] |
/// | `genmodel3` .. `genmodel6` | [`GenModel3`] .. [`GenModel6`] |
/// | `motor`                    | [`MotorLoad`]         |
/// | `group`                    | [`ModelGroup`]        |
pub fn default_registry() -> ModelRegistry {
    let mut registry = ModelRegistry::new();
    registry
        .register("genmodel2", GenModelClassical::boxed)
        .register("classical", GenModelClassical::boxed)
        .register("genmodel3", GenModel3::boxed)
        .register("genmodel4", GenModel4::boxed)
        .register("genmodel5", GenModel5::boxed)
        .register("genmodel6", GenModel6::boxed)
        .register("motor", MotorLoad::boxed)
        .register("group", group);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_generator_order_is_registered() {
        let registry = default_registry();
        for name in ["genmodel2", "Classical", "genmodel3", "genmodel4", "genmodel5", "GENMODEL6", "motor"] {
            assert!(registry.contains(name), "{name} missing");
        }
    }

    #[test]
    fn built_models_carry_configured_parameters() {
        let registry = default_registry();
        let spec = ComponentSpec::new("G1", "genmodel6").with_param("H", 4.0);
        let mut model = registry.build(&spec).unwrap();
        model.initialize_sizes(0.0, 0);
        assert_eq!(model.name(), "G1");
        assert_eq!(model.offsets().local_sizes().diff_size, 6);

        let bad = ComponentSpec::new("G2", "genmodel3").with_param("bogus", 1.0);
        assert!(registry.build(&bad).is_err());
    }

    #[test]
    fn groups_reject_parameters() {
        let registry = default_registry();
        let spec = ComponentSpec::new("area", "group").with_param("h", 1.0);
        assert!(matches!(registry.build(&spec), Err(GridError::Config(_))));
    }
}
