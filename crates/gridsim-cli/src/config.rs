//! TOML system descriptions.
//!
//! ```toml
//! [bus]
//! name = "B1"
//! voltage = 1.0
//!
//! [[generators]]
//! name = "G1"
//! model = "genmodel6"
//! p = 0.8
//! q = 0.2
//! params = { h = 4.5 }
//!
//! [[loads]]
//! name = "M1"
//! model = "motor"
//! p = 0.3
//!
//! [simulation]
//! step = 0.01
//! stop = 1.0
//!
//! [[events]]
//! time = 0.1
//! param = "voltage"
//! value = 0.9
//! ```

use anyhow::{anyhow, bail, Context, Result};
use gridsim_core::solver::{IntegratorConfig, JacobianStorage, SolverKind};
use gridsim_core::{ComponentSpec, ModelRegistry, SolveMode};
use gridsim_models::bus::{BusChild, InfiniteBus};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;

fn unit_voltage() -> f64 {
    1.0
}

fn voltage_param() -> String {
    "voltage".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    pub name: String,
    #[serde(default = "unit_voltage")]
    pub voltage: f64,
    #[serde(default)]
    pub angle: f64,
    /// Names of neighbouring buses
    #[serde(default)]
    pub links: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(flatten)]
    pub spec: ComponentSpec,
    /// Active power dispatch at initialization
    #[serde(default)]
    pub p: f64,
    #[serde(default)]
    pub q: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    #[serde(flatten)]
    pub spec: ComponentSpec,
    /// Active power demand at initialization
    pub p: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub mode: String,
    pub step: f64,
    pub stop: f64,
    pub solver: SolverKind,
    pub jacobian: JacobianStorage,
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        let integrator = IntegratorConfig::default();
        SimulationConfig {
            mode: "dae".to_string(),
            step: integrator.step,
            stop: 1.0,
            solver: integrator.solver,
            jacobian: integrator.jacobian,
            tolerance: integrator.tolerance,
            max_iterations: integrator.max_iterations,
        }
    }
}

impl SimulationConfig {
    pub fn solve_mode(&self) -> Result<SolveMode> {
        Ok(SolveMode::from_str(&self.mode)?)
    }

    pub fn integrator(&self) -> IntegratorConfig {
        IntegratorConfig {
            step: self.step,
            tolerance: self.tolerance,
            max_iterations: self.max_iterations,
            solver: self.solver,
            jacobian: self.jacobian,
        }
    }
}

/// Bus set-point change applied once simulated time reaches `time`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    pub time: f64,
    #[serde(default = "voltage_param")]
    pub param: String,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    pub bus: BusConfig,
    #[serde(default)]
    pub generators: Vec<GeneratorConfig>,
    #[serde(default)]
    pub loads: Vec<LoadConfig>,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub events: Vec<EventConfig>,
}

impl SystemConfig {
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading system file {}", path.display()))?;
        let config = Self::from_toml(&text).with_context(|| format!("in {}", path.display()))?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let mut config: SystemConfig = toml::from_str(text).context("parsing system TOML")?;
        config.validate()?;
        config
            .events
            .sort_by(|a, b| a.time.total_cmp(&b.time));
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let sim = &self.simulation;
        if !(sim.step > 0.0) {
            bail!("simulation step must be positive, got {}", sim.step);
        }
        if !(sim.stop >= 0.0) {
            bail!("simulation stop time must be non-negative, got {}", sim.stop);
        }
        if sim.solve_mode()?.is_local() {
            bail!("simulation mode must address the global state vector, got '{}'", sim.mode);
        }
        if let Some(event) = self.events.iter().find(|e| !(e.time >= 0.0)) {
            bail!("event time must be non-negative, got {}", event.time);
        }
        let mut names: Vec<&str> = self
            .generators
            .iter()
            .map(|g| g.spec.name.as_str())
            .chain(self.loads.iter().map(|l| l.spec.name.as_str()))
            .collect();
        names.sort_unstable();
        if let Some(pair) = names.windows(2).find(|w| w[0] == w[1]) {
            bail!("component name '{}' is used more than once", pair[0]);
        }
        Ok(())
    }

    /// Assemble the bus and its children from `registry`.
    pub fn build(&self, registry: &ModelRegistry) -> Result<InfiniteBus> {
        let mut bus = InfiniteBus::new(self.bus.name.clone(), self.bus.voltage, self.bus.angle);
        for generator in &self.generators {
            let model = registry
                .build(&generator.spec)
                .map_err(|err| anyhow!("generator '{}': {}", generator.spec.name, err))?;
            bus.add(BusChild::Generator {
                model,
                dispatch: [generator.p, generator.q],
            });
        }
        for load in &self.loads {
            let model = registry
                .build(&load.spec)
                .map_err(|err| anyhow!("load '{}': {}", load.spec.name, err))?;
            bus.add(BusChild::Load {
                model,
                demand: load.p,
            });
        }
        for link in &self.bus.links {
            bus.add(BusChild::Link(link.clone()));
        }
        Ok(bus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridsim_core::DynamicModel;
    use gridsim_models::default_registry;

    const SYSTEM: &str = r#"
        [bus]
        name = "B1"
        links = ["B2"]

        [[generators]]
        name = "G1"
        model = "genmodel4"
        p = 0.6
        q = 0.1
        params = { h = 4.0, xd = 1.1 }

        [[loads]]
        name = "M1"
        model = "motor"
        p = 0.2

        [[events]]
        time = 0.5
        value = 0.95

        [[events]]
        time = 0.2
        param = "angle"
        value = 0.05
    "#;

    #[test]
    fn parses_defaults_and_sorts_events() {
        let config = SystemConfig::from_toml(SYSTEM).unwrap();
        assert_eq!(config.bus.voltage, 1.0);
        assert_eq!(config.generators[0].spec.params["h"], 4.0);
        assert_eq!(config.simulation.mode, "dae");
        assert_eq!(config.events[0].param, "angle");
        assert_eq!(config.events[1].param, "voltage");
    }

    #[test]
    fn builds_bus_with_children() {
        let config = SystemConfig::from_toml(SYSTEM).unwrap();
        let bus = config.build(&default_registry()).unwrap();
        assert_eq!(bus.len(), 2);
        assert_eq!(bus.sub_models()[0].name(), "G1");
        assert_eq!(bus.links().to_vec(), vec!["B2".to_string()]);
    }

    #[test]
    fn rejects_unknown_model_types() {
        let text = SYSTEM.replace("genmodel4", "genmodel9");
        let config = SystemConfig::from_toml(&text).unwrap();
        let err = config.build(&default_registry()).unwrap_err();
        assert!(err.to_string().contains("unknown model type"));
    }

    #[test]
    fn rejects_duplicate_names_and_bad_steps() {
        let text = SYSTEM.replace("\"M1\"", "\"G1\"");
        assert!(SystemConfig::from_toml(&text).is_err());

        let text = format!("{SYSTEM}\n[simulation]\nstep = 0.0\n");
        assert!(SystemConfig::from_toml(&text).is_err());
    }
}
