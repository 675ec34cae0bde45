//! Single-cage induction motor load with slip as its only state.
//!
//! ```text
//!   Te  = V²·r·s / (r² + (x·s)²)
//!   s'  = (Tm − Te) / 2H
//!   P   = Te,   Q = V²·x·s² / (r² + (x·s)²)
//! ```

use gridsim_core::locations::{destinations, resolve};
use gridsim_core::model::{DynamicModel, InitFlags, P_OUT, VOLTAGE_IN};
use gridsim_core::{ComponentSpec, GridError, GridResult, MatrixData, OffsetTable, SolveMode, StateData, StateSizes};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorParams {
    /// Rotor resistance
    pub r: f64,
    /// Leakage reactance
    pub x: f64,
    /// Inertia constant (s)
    pub h: f64,
    /// Mechanical load torque
    pub tm: f64,
}

impl Default for MotorParams {
    fn default() -> Self {
        MotorParams {
            r: 0.01,
            x: 0.15,
            h: 3.0,
            tm: 0.0,
        }
    }
}

impl MotorParams {
    pub fn set(&mut self, name: &str, value: f64) -> GridResult<()> {
        let slot = match name.to_ascii_lowercase().as_str() {
            "r" | "rr" => &mut self.r,
            "x" | "xl" => &mut self.x,
            "h" | "inertia" => &mut self.h,
            "tm" | "torque" => &mut self.tm,
            other => {
                return Err(GridError::Parameter(format!(
                    "unknown motor parameter '{}'",
                    other
                )))
            }
        };
        *slot = value;
        Ok(())
    }

    fn validate(&self) -> GridResult<()> {
        if self.h <= 0.0 || self.r <= 0.0 || self.x < 0.0 {
            return Err(GridError::Parameter(format!(
                "motor needs positive inertia and rotor resistance (h={}, r={}, x={})",
                self.h, self.r, self.x
            )));
        }
        Ok(())
    }

    fn denominator(&self, slip: f64) -> f64 {
        self.r * self.r + (self.x * slip).powi(2)
    }

    pub fn electrical_torque(&self, v: f64, slip: f64) -> f64 {
        v * v * self.r * slip / self.denominator(slip)
    }

    pub fn reactive_power(&self, v: f64, slip: f64) -> f64 {
        v * v * self.x * slip * slip / self.denominator(slip)
    }

    /// Stable (small) slip at which the motor draws `p` at voltage `v`.
    pub fn operating_slip(&self, v: f64, p: f64) -> GridResult<f64> {
        if p == 0.0 {
            return Ok(0.0);
        }
        if self.x == 0.0 {
            return Ok(p * self.r / (v * v));
        }
        let v2r = v * v * self.r;
        let disc = v2r * v2r - 4.0 * p * p * self.x * self.x * self.r * self.r;
        if disc < 0.0 {
            return Err(GridError::Initialization(format!(
                "motor demand {} exceeds pull-out power at V={}",
                p, v
            )));
        }
        Ok((v2r - disc.sqrt()) / (2.0 * p * self.x * self.x))
    }
}

#[derive(Debug)]
pub struct MotorLoad {
    name: String,
    params: MotorParams,
    offsets: OffsetTable,
    state: Vec<f64>,
    voltage: f64,
}

impl MotorLoad {
    pub fn new(name: impl Into<String>) -> Self {
        MotorLoad {
            name: name.into(),
            params: MotorParams::default(),
            offsets: OffsetTable::new(),
            state: vec![0.0],
            voltage: 1.0,
        }
    }

    pub fn from_spec(spec: &ComponentSpec) -> GridResult<Self> {
        let mut motor = Self::new(spec.name.clone());
        spec.apply(|name, value| motor.params.set(name, value))?;
        motor.params.validate()?;
        Ok(motor)
    }

    pub fn boxed(spec: &ComponentSpec) -> GridResult<Box<dyn DynamicModel>> {
        Ok(Box::new(Self::from_spec(spec)?))
    }

    pub fn params(&self) -> &MotorParams {
        &self.params
    }

    pub fn slip(&self) -> f64 {
        self.state[0]
    }

    fn voltage(&self, inputs: &[f64]) -> f64 {
        inputs.get(VOLTAGE_IN).copied().unwrap_or(self.voltage)
    }

    fn slip_at(&self, sd: &StateData<'_>, mode: &SolveMode) -> f64 {
        if self.offsets.get(mode).local.diff_size == 0 {
            return self.state[0];
        }
        resolve(&self.offsets, sd, &self.state, mode).diff_state[0]
    }
}

impl DynamicModel for MotorLoad {
    fn name(&self) -> &str {
        &self.name
    }

    fn offsets(&self) -> &OffsetTable {
        &self.offsets
    }

    fn offsets_mut(&mut self) -> &mut OffsetTable {
        &mut self.offsets
    }

    fn initialize_sizes(&mut self, _time0: f64, _flags: InitFlags) {
        self.offsets.set_local_sizes(StateSizes::new(0, 1, 2));
    }

    fn local_state(&self) -> &[f64] {
        &self.state
    }

    fn local_state_mut(&mut self) -> &mut [f64] {
        &mut self.state
    }

    fn initialize_values(&mut self, inputs: &[f64], desired_outputs: &[f64]) -> GridResult<Vec<f64>> {
        self.params.validate()?;
        let v = inputs.get(VOLTAGE_IN).copied().unwrap_or(1.0);
        let p = desired_outputs
            .get(P_OUT)
            .copied()
            .unwrap_or_else(|| self.params.electrical_torque(v, self.state[0]));
        let slip = self.params.operating_slip(v, p)?;
        self.state[0] = slip;
        self.params.tm = self.params.electrical_torque(v, slip);
        self.voltage = v;
        info!(component = %self.name, slip, tm = self.params.tm, "motor initialized");
        Ok(inputs.to_vec())
    }

    fn algebraic_update(
        &mut self,
        _inputs: &[f64],
        _sd: &StateData<'_>,
        _update: &mut [f64],
        _mode: &SolveMode,
        _alpha: f64,
    ) {
    }

    fn derivative(&self, inputs: &[f64], sd: &StateData<'_>, deriv: &mut [f64], mode: &SolveMode) {
        if !mode.has_differential() || self.offsets.get(mode).local.diff_size == 0 {
            return;
        }
        let slip = self.slip_at(sd, mode);
        let te = self.params.electrical_torque(self.voltage(inputs), slip);
        let dest = destinations(&self.offsets, deriv, mode);
        dest.diff[0] = (self.params.tm - te) / (2.0 * self.params.h);
    }

    fn residual(&self, inputs: &[f64], sd: &StateData<'_>, resid: &mut [f64], mode: &SolveMode) {
        if !mode.has_differential() || self.offsets.get(mode).local.diff_size == 0 {
            return;
        }
        let locs = resolve(&self.offsets, sd, &self.state, mode);
        let Some(dstate) = locs.dstate else {
            panic!("residual for '{}' in mode {} needs a state derivative buffer", self.name, mode);
        };
        let slip = locs.diff_state[0];
        let te = self.params.electrical_torque(self.voltage(inputs), slip);
        let dest = destinations(&self.offsets, resid, mode);
        dest.diff[0] = (self.params.tm - te) / (2.0 * self.params.h) - dstate[0];
    }

    fn jacobian_elements(
        &self,
        inputs: &[f64],
        sd: &StateData<'_>,
        md: &mut dyn MatrixData,
        input_locs: &[Option<usize>],
        mode: &SolveMode,
    ) {
        let record = self.offsets.get(mode);
        let Some(d) = record.diff_offset.filter(|_| record.local.diff_size > 0) else {
            return;
        };
        let p = &self.params;
        let v = self.voltage(inputs);
        let slip = self.slip_at(sd, mode);
        let den = p.denominator(slip);
        let dte_ds = v * v * p.r * (p.r * p.r - (p.x * slip).powi(2)) / (den * den);
        let dte_dv = 2.0 * v * p.r * slip / den;
        let k = -0.5 / p.h;

        md.assign(d, d, k * dte_ds - sd.cj);
        md.assign_check_col(d, input_locs.get(VOLTAGE_IN).copied().flatten(), k * dte_dv);
    }

    /// `[P, Q]` drawn by the motor.
    fn outputs(&self, inputs: &[f64], sd: &StateData<'_>, mode: &SolveMode) -> Vec<f64> {
        let v = self.voltage(inputs);
        let slip = self.slip_at(sd, mode);
        vec![
            self.params.electrical_torque(v, slip),
            self.params.reactive_power(v, slip),
        ]
    }

    fn state_names(&self) -> Vec<String> {
        vec!["slip".to_string()]
    }

    fn set_param(&mut self, name: &str, value: f64) -> GridResult<()> {
        self.params.set(name, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridsim_core::offsets::prepare;

    #[test]
    fn operating_slip_draws_requested_power() {
        let params = MotorParams::default();
        let slip = params.operating_slip(1.0, 0.5).unwrap();
        assert!(slip > 0.0 && slip < 1.0);
        assert!((params.electrical_torque(1.0, slip) - 0.5).abs() < 1e-12);
        // stable branch sits below the pull-out slip r/x
        assert!(slip < params.r / params.x);
    }

    #[test]
    fn demand_beyond_pull_out_is_rejected() {
        let params = MotorParams::default();
        let err = params.operating_slip(1.0, 10.0).unwrap_err();
        assert!(matches!(err, GridError::Initialization(_)));
    }

    #[test]
    fn initialized_motor_is_at_equilibrium() {
        let mut motor = MotorLoad::new("M1");
        motor.initialize_sizes(0.0, 0);
        motor.initialize_values(&[1.0, 0.0], &[0.4]).unwrap();
        let n = prepare(&mut motor, &SolveMode::DAE);
        assert_eq!(n, 1);

        let state = motor.local_state().to_vec();
        let dstate = vec![0.0];
        let sd = StateData::new(0.0, &state).with_dstate(&dstate);
        let mut resid = vec![1.0];
        motor.residual(&[1.0, 0.0], &sd, &mut resid, &SolveMode::DAE);
        assert!(resid[0].abs() < 1e-12);

        let out = motor.outputs(&[1.0, 0.0], &sd, &SolveMode::DAE);
        assert!((out[0] - 0.4).abs() < 1e-12);
        assert!(out[1] > 0.0);
    }

    #[test]
    fn motor_has_no_power_flow_states() {
        let mut motor = MotorLoad::new("M1");
        motor.initialize_sizes(0.0, 0);
        assert_eq!(prepare(&mut motor, &SolveMode::POWER_FLOW), 0);
        assert!(motor.set_param("xm", 1.0).is_err());
    }
}
