//! Infinite bus: a voltage source holding V∠θ at its set point, with the
//! generators and loads connected to it as children.
//!
//! The bus owns two algebraic states `[V, θ]` in every solve mode, power
//! flow included. Its children see those states as their terminal inputs,
//! so the Jacobian couples every child's stator rows to the bus columns.
//! Links are references to neighbouring buses by name; they own no states
//! and are never sized.

use gridsim_core::locations::{destinations, resolve};
use gridsim_core::model::{read_local_state, write_local_state, DynamicModel, InitFlags, FIELD_IN, PMECH_IN, P_OUT, Q_OUT};
use gridsim_core::{GridError, GridResult, MatrixData, OffsetTable, SolveMode, StateData, StateSizes};
use tracing::{debug, info};

/// Something attached to a bus.
#[derive(Debug)]
pub enum BusChild {
    /// Machine injecting `dispatch = [P, Q]` at initialization
    Generator {
        model: Box<dyn DynamicModel>,
        dispatch: [f64; 2],
    },
    /// Load drawing `demand` active power at initialization
    Load {
        model: Box<dyn DynamicModel>,
        demand: f64,
    },
    /// Name of a neighbouring bus
    Link(String),
}

/// Borrowed view of a child found by name.
#[derive(Debug, Clone, Copy)]
pub enum ChildRef<'a> {
    Generator(&'a dyn DynamicModel),
    Load(&'a dyn DynamicModel),
    Link(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Generator,
    Load,
}

#[derive(Debug)]
pub struct InfiniteBus {
    name: String,
    voltage: f64,
    angle: f64,
    offsets: OffsetTable,
    state: Vec<f64>,
    models: Vec<Box<dyn DynamicModel>>,
    roles: Vec<Role>,
    targets: Vec<Vec<f64>>,
    /// `[Ef, Pm]` handed to each child, settled by initialization
    controls: Vec<[f64; 2]>,
    links: Vec<String>,
}

impl InfiniteBus {
    pub fn new(name: impl Into<String>, voltage: f64, angle: f64) -> Self {
        InfiniteBus {
            name: name.into(),
            voltage,
            angle,
            offsets: OffsetTable::new(),
            state: vec![voltage, angle],
            models: Vec::new(),
            roles: Vec::new(),
            targets: Vec::new(),
            controls: Vec::new(),
            links: Vec::new(),
        }
    }

    pub fn voltage(&self) -> f64 {
        self.voltage
    }

    pub fn angle(&self) -> f64 {
        self.angle
    }

    /// Attach a child; the bus's offsets become stale unless it is a link.
    pub fn add(&mut self, child: BusChild) {
        let (model, role, target) = match child {
            BusChild::Generator { model, dispatch } => (model, Role::Generator, dispatch.to_vec()),
            BusChild::Load { model, demand } => (model, Role::Load, vec![demand]),
            BusChild::Link(name) => {
                self.links.push(name);
                return;
            }
        };
        debug!(bus = %self.name, child = model.name(), ?role, "child attached");
        self.models.push(model);
        self.roles.push(role);
        self.targets.push(target);
        self.controls.push([0.0, 0.0]);
        self.offsets.invalidate();
    }

    pub fn remove(&mut self, name: &str) -> Option<BusChild> {
        if let Some(idx) = self.models.iter().position(|m| m.name() == name) {
            self.offsets.invalidate();
            let model = self.models.remove(idx);
            let role = self.roles.remove(idx);
            let target = self.targets.remove(idx);
            self.controls.remove(idx);
            return Some(match role {
                Role::Generator => BusChild::Generator {
                    model,
                    dispatch: [target[0], target[1]],
                },
                Role::Load => BusChild::Load {
                    model,
                    demand: target[0],
                },
            });
        }
        let idx = self.links.iter().position(|l| l == name)?;
        Some(BusChild::Link(self.links.remove(idx)))
    }

    pub fn find(&self, name: &str) -> Option<ChildRef<'_>> {
        if let Some(idx) = self.models.iter().position(|m| m.name() == name) {
            let model = self.models[idx].as_ref();
            return Some(match self.roles[idx] {
                Role::Generator => ChildRef::Generator(model),
                Role::Load => ChildRef::Load(model),
            });
        }
        self.links
            .iter()
            .find(|l| l.as_str() == name)
            .map(|l| ChildRef::Link(l.as_str()))
    }

    pub fn links(&self) -> &[String] {
        &self.links
    }

    /// Count of generator and load children.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Inputs `[V, θ, Ef, Pm]` the `k`-th child sees at bus terminal `(v, theta)`.
    pub fn child_inputs(&self, k: usize, v: f64, theta: f64) -> [f64; 4] {
        let [ef, pm] = self.controls[k];
        [v, theta, ef, pm]
    }

    /// Each generator and load child's own outputs, paired with its name.
    pub fn child_outputs(&self, sd: &StateData<'_>, mode: &SolveMode) -> Vec<(&str, Vec<f64>)> {
        let (v, theta, _) = self.terminal(sd, mode);
        self.models
            .iter()
            .enumerate()
            .map(|(k, child)| (child.name(), child.outputs(&self.child_inputs(k, v, theta), sd, mode)))
            .collect()
    }

    /// Terminal voltage and the global columns of `[V, θ]` under `mode`.
    fn terminal(&self, sd: &StateData<'_>, mode: &SolveMode) -> (f64, f64, Option<usize>) {
        let locs = resolve(&self.offsets, sd, &self.state, mode);
        let column = if mode.has_algebraic() { locs.alg_offset } else { None };
        (locs.alg_state[0], locs.alg_state[1], column)
    }

    fn input_locs(column: Option<usize>) -> [Option<usize>; 4] {
        [column, column.map(|c| c + 1), None, None]
    }

    fn alg_row(&self, mode: &SolveMode) -> Option<usize> {
        let record = self.offsets.get(mode);
        record
            .alg_offset
            .filter(|_| mode.has_algebraic() && record.local.alg_size > 0)
    }
}

impl DynamicModel for InfiniteBus {
    fn name(&self) -> &str {
        &self.name
    }

    fn offsets(&self) -> &OffsetTable {
        &self.offsets
    }

    fn offsets_mut(&mut self) -> &mut OffsetTable {
        &mut self.offsets
    }

    fn sub_models(&self) -> &[Box<dyn DynamicModel>] {
        &self.models
    }

    fn sub_models_mut(&mut self) -> &mut [Box<dyn DynamicModel>] {
        &mut self.models
    }

    fn initialize_sizes(&mut self, time0: f64, flags: InitFlags) {
        for child in &mut self.models {
            child.initialize_sizes(time0, flags);
        }
        self.state = vec![self.voltage, self.angle];
        self.offsets.set_local_sizes(StateSizes::new(2, 0, 2));
    }

    fn local_state(&self) -> &[f64] {
        &self.state
    }

    fn local_state_mut(&mut self) -> &mut [f64] {
        &mut self.state
    }

    fn initialize_values(&mut self, _inputs: &[f64], _desired_outputs: &[f64]) -> GridResult<Vec<f64>> {
        if !(self.voltage > 0.0) {
            return Err(GridError::Initialization(format!(
                "bus '{}' voltage set point must be positive, got {}",
                self.name, self.voltage
            )));
        }
        self.state = vec![self.voltage, self.angle];
        let terminal = [self.voltage, self.angle];
        for (k, child) in self.models.iter_mut().enumerate() {
            let adjusted = child
                .initialize_values(&terminal, &self.targets[k])
                .map_err(|err| GridError::Initialization(format!("{}: {}", child.name(), err)))?;
            self.controls[k] = [
                adjusted.get(FIELD_IN).copied().unwrap_or(0.0),
                adjusted.get(PMECH_IN).copied().unwrap_or(0.0),
            ];
        }
        info!(bus = %self.name, children = self.models.len(), "bus initialized");
        Ok(terminal.to_vec())
    }

    fn guess_state(&self, time: f64, state: &mut [f64], mut dstate_dt: Option<&mut [f64]>, mode: &SolveMode) {
        write_local_state(self, state, dstate_dt.as_deref_mut(), mode);
        for child in &self.models {
            child.guess_state(time, state, dstate_dt.as_deref_mut(), mode);
        }
    }

    fn set_state(&mut self, time: f64, state: &[f64], mode: &SolveMode) {
        read_local_state(self, time, state, mode);
        for child in &mut self.models {
            child.set_state(time, state, mode);
        }
    }

    fn algebraic_update(
        &mut self,
        _inputs: &[f64],
        sd: &StateData<'_>,
        update: &mut [f64],
        mode: &SolveMode,
        alpha: f64,
    ) {
        let (v, theta, _) = self.terminal(sd, mode);
        if self.alg_row(mode).is_some() {
            let dest = destinations(&self.offsets, update, mode);
            dest.alg[0] = alpha * self.voltage + (1.0 - alpha) * v;
            dest.alg[1] = alpha * self.angle + (1.0 - alpha) * theta;
        }
        // children see the set point the bus is driven to
        let (v, theta) = (self.voltage, self.angle);
        for k in 0..self.models.len() {
            let inputs = self.child_inputs(k, v, theta);
            self.models[k].algebraic_update(&inputs, sd, update, mode, alpha);
        }
    }

    fn derivative(&self, _inputs: &[f64], sd: &StateData<'_>, deriv: &mut [f64], mode: &SolveMode) {
        if !mode.has_differential() {
            return;
        }
        let (v, theta, _) = self.terminal(sd, mode);
        for (k, child) in self.models.iter().enumerate() {
            child.derivative(&self.child_inputs(k, v, theta), sd, deriv, mode);
        }
    }

    fn residual(&self, _inputs: &[f64], sd: &StateData<'_>, resid: &mut [f64], mode: &SolveMode) {
        let (v, theta, _) = self.terminal(sd, mode);
        if self.alg_row(mode).is_some() {
            let dest = destinations(&self.offsets, resid, mode);
            dest.alg[0] = v - self.voltage;
            dest.alg[1] = theta - self.angle;
        }
        for (k, child) in self.models.iter().enumerate() {
            child.residual(&self.child_inputs(k, v, theta), sd, resid, mode);
        }
    }

    fn jacobian_elements(
        &self,
        _inputs: &[f64],
        sd: &StateData<'_>,
        md: &mut dyn MatrixData,
        _input_locs: &[Option<usize>],
        mode: &SolveMode,
    ) {
        let (v, theta, column) = self.terminal(sd, mode);
        if let Some(a) = self.alg_row(mode) {
            md.assign(a, a, 1.0);
            md.assign(a + 1, a + 1, 1.0);
        }
        let locs = Self::input_locs(column);
        for (k, child) in self.models.iter().enumerate() {
            child.jacobian_elements(&self.child_inputs(k, v, theta), sd, md, &locs, mode);
        }
    }

    /// Net `[P, Q]` injected into the bus: generation minus load.
    fn outputs(&self, _inputs: &[f64], sd: &StateData<'_>, mode: &SolveMode) -> Vec<f64> {
        let (v, theta, _) = self.terminal(sd, mode);
        let mut net = vec![0.0; 2];
        for (k, child) in self.models.iter().enumerate() {
            let out = child.outputs(&self.child_inputs(k, v, theta), sd, mode);
            let sign = match self.roles[k] {
                Role::Generator => 1.0,
                Role::Load => -1.0,
            };
            net[P_OUT] += sign * out.get(P_OUT).copied().unwrap_or(0.0);
            net[Q_OUT] += sign * out.get(Q_OUT).copied().unwrap_or(0.0);
        }
        net
    }

    fn state_names(&self) -> Vec<String> {
        let mut names = vec!["voltage".to_string(), "angle".to_string()];
        for child in &self.models {
            let prefix = child.name().to_string();
            names.extend(
                child
                    .state_names()
                    .into_iter()
                    .map(|s| format!("{}::{}", prefix, s)),
            );
        }
        names
    }

    /// Set point changes; children keep their own parameters.
    fn set_param(&mut self, name: &str, value: f64) -> GridResult<()> {
        match name.to_ascii_lowercase().as_str() {
            "voltage" | "v" => {
                if !(value > 0.0) {
                    return Err(GridError::Parameter(format!(
                        "bus voltage must be positive, got {}",
                        value
                    )));
                }
                self.voltage = value;
            }
            "angle" | "theta" => self.angle = value,
            other => {
                return Err(GridError::Parameter(format!(
                    "bus '{}' has no parameter '{}'",
                    self.name, other
                )))
            }
        }
        info!(bus = %self.name, parameter = name, value, "set point changed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genmodel::GenModel4;
    use crate::motor::MotorLoad;
    use gridsim_core::offsets::prepare;

    fn bus() -> InfiniteBus {
        let mut bus = InfiniteBus::new("B1", 1.02, 0.0);
        bus.add(BusChild::Generator {
            model: Box::new(GenModel4::new("G1")),
            dispatch: [0.7, 0.1],
        });
        bus.add(BusChild::Load {
            model: Box::new(MotorLoad::new("M1")),
            demand: 0.3,
        });
        bus.add(BusChild::Link("B2".into()));
        bus
    }

    #[test]
    fn links_take_no_state() {
        let mut bus = bus();
        bus.initialize_sizes(0.0, 0);
        // bus 2 + generator (2 alg + 4 diff) + motor 1 diff
        assert_eq!(prepare(&mut bus, &SolveMode::DAE), 9);
        assert_eq!(bus.len(), 2);
        assert_eq!(bus.links().to_vec(), vec!["B2".to_string()]);
        assert!(matches!(bus.find("B2"), Some(ChildRef::Link("B2"))));
        assert!(matches!(bus.find("G1"), Some(ChildRef::Generator(_))));
        assert!(matches!(bus.find("M1"), Some(ChildRef::Load(_))));
    }

    #[test]
    #[should_panic(expected = "initialize_sizes not run")]
    fn generator_added_after_sizing_fails_fast() {
        let mut bus = bus();
        bus.initialize_sizes(0.0, 0);
        bus.add(BusChild::Generator {
            model: Box::new(GenModel4::new("G2")),
            dispatch: [0.2, 0.0],
        });
        prepare(&mut bus, &SolveMode::DAE);
    }

    #[test]
    fn power_flow_sees_only_the_bus() {
        let mut bus = bus();
        bus.initialize_sizes(0.0, 0);
        assert_eq!(prepare(&mut bus, &SolveMode::POWER_FLOW), 2);
    }

    #[test]
    fn remove_invalidates_and_returns_the_child() {
        let mut bus = bus();
        bus.initialize_sizes(0.0, 0);
        prepare(&mut bus, &SolveMode::DAE);
        assert!(bus.offsets().is_assigned(&SolveMode::DAE));

        let removed = bus.remove("M1");
        assert!(matches!(removed, Some(BusChild::Load { demand, .. }) if demand == 0.3));
        assert!(!bus.offsets().is_assigned(&SolveMode::DAE));
        assert_eq!(prepare(&mut bus, &SolveMode::DAE), 8);

        assert!(matches!(bus.remove("B2"), Some(BusChild::Link(_))));
        assert!(bus.remove("nope").is_none());
    }

    #[test]
    fn initialization_stores_child_controls() {
        let mut bus = bus();
        bus.initialize_sizes(0.0, 0);
        bus.initialize_values(&[], &[]).unwrap();
        let [v, theta, ef, pm] = bus.child_inputs(0, 1.02, 0.0);
        assert_eq!((v, theta), (1.02, 0.0));
        assert!(ef > 0.0);
        assert!((pm - 0.7).abs() < 1e-9);
    }

    #[test]
    fn set_points_are_parameters() {
        let mut bus = bus();
        bus.set_param("V", 0.95).unwrap();
        bus.set_param("theta", 0.1).unwrap();
        assert_eq!(bus.voltage(), 0.95);
        assert_eq!(bus.angle(), 0.1);
        assert!(bus.set_param("voltage", 0.0).is_err());
        assert!(bus.set_param("h", 1.0).is_err());
    }
}
