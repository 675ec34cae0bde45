//! # Synchronous Generator Models
//!
//! A family of electromechanical machine models from the classical
//! (second-order) model up to the sixth-order subtransient model. All share
//! one stator/swing skeleton; what differs is the set of internal flux
//! states behind the stator:
//!
//! ```text
//! ┌──────────────────┬─────┬──────┬─────────────────────────────┬───────────────┐
//! │ MODEL            │ ALG │ DIFF │ FLUX STATES                 │ STATOR X (d/q)│
//! │──────────────────│─────│──────│─────────────────────────────│───────────────│
//! │ GenModelClassical│  2  │  2   │ (Ef acts as E'q)            │ X'd / X'd     │
//! │ GenModel3        │  2  │  3   │ E'q                         │ X'd / Xq      │
//! │ GenModel4        │  2  │  4   │ E'd, E'q                    │ X'd / X'q     │
//! │ GenModel5        │  2  │  5   │ E'q, E''d, E''q             │ X''d / X''q   │
//! │ GenModel6        │  2  │  6   │ E'd, E'q, E''d, E''q        │ X''d / X''q   │
//! └──────────────────┴─────┴──────┴─────────────────────────────┴───────────────┘
//! ```
//!
//! ## Shared equations
//!
//! With rotor angle δ and terminal voltage V∠θ:
//!
//! ```text
//!   Vd = −V sin(δ − θ)        Vq = V cos(δ − θ)
//!   0  = Vd + Rs·Id + Xa·Iq − Ed           (algebraic, Id row)
//!   0  = Vq + Rs·Iq − Xb·Id − Eq           (algebraic, Iq row)
//!   δ' = ωb (ω − 1)
//!   ω' = (Pm − Pe − D (ω − 1)) / 2H,   Pe = Ed·Id + Eq·Iq + (Xb − Xa)·Id·Iq
//! ```
//!
//! where `(Ed, Eq)` are the innermost flux states of the model and
//! `(Xa, Xb)` the matching stator reactances. Each model only supplies its
//! flux dynamics through the [`Machine`] trait; [`GenModel`] implements the
//! [`DynamicModel`] contract once for all of them.
//!
//! ## Initialization
//!
//! From terminal V∠θ and the requested P + jQ, the rotor angle is placed on
//! the internal voltage `E = V + (Rs + jX)·I`, the stator equations give
//! `(Ed, Eq)`, and the flux chain is solved outward to the field voltage.
//! The returned inputs carry the Ef and Pm that hold the machine at
//! equilibrium, so P and Q are matched exactly.

mod classical;
mod fifth;
mod fourth;
mod params;
mod sixth;
mod third;

pub use classical::{Classical, GenModelClassical};
pub use fifth::{Fifth, GenModel5};
pub use fourth::{Fourth, GenModel4};
pub use params::{GenParams, FALLBACK_TIME_CONSTANT};
pub use sixth::{GenModel6, Sixth};
pub use third::{GenModel3, Third};

use gridsim_core::locations::{destinations, resolve};
use gridsim_core::model::{DynamicModel, InitFlags, ANGLE_IN, FIELD_IN, PMECH_IN, P_OUT, Q_OUT, VOLTAGE_IN};
use gridsim_core::{ComponentSpec, GridError, GridResult, MatrixData, OffsetTable, SolveMode, StateData, StateSizes};
use num_complex::Complex64;
use std::fmt;
use std::marker::PhantomData;
use tracing::{info, trace};

/// Smallest stator determinant `rs² + Xa·Xb` the current solve accepts.
const STATOR_DET_TOLERANCE: f64 = 1e-9;

/// Rotor angle and dq-frame terminal quantities at an operating point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperatingPoint {
    pub delta: f64,
    pub vd: f64,
    pub vq: f64,
    pub id: f64,
    pub iq: f64,
}

/// Project terminal voltage `v∠theta` onto the rotor frame at angle `delta`.
#[inline]
pub fn dq_voltage(v: f64, theta: f64, delta: f64) -> (f64, f64) {
    let angle = delta - theta;
    (-v * angle.sin(), v * angle.cos())
}

/// Closed-form solution of a 2×2 linear system.
#[inline]
pub fn solve2x2(a11: f64, a12: f64, a21: f64, a22: f64, b1: f64, b2: f64) -> (f64, f64) {
    let det = a11 * a22 - a12 * a21;
    ((b1 * a22 - a12 * b2) / det, (a11 * b2 - a21 * b1) / det)
}

/// Rotor angle and stator current delivering `p + jq` at `v∠theta`.
///
/// `x` is the reactance the internal voltage is placed behind.
pub fn initial_angle_and_current(v: f64, theta: f64, p: f64, q: f64, rs: f64, x: f64) -> GridResult<OperatingPoint> {
    if !(v > 0.0) || !v.is_finite() {
        return Err(GridError::Initialization(format!(
            "terminal voltage must be positive, got {}",
            v
        )));
    }
    let vt = Complex64::from_polar(v, theta);
    let it = (Complex64::new(p, q) / vt).conj();
    let internal = vt + Complex64::new(rs, x) * it;
    let delta = internal.arg();

    let rotate = Complex64::from_polar(1.0, -delta);
    let v_dq = vt * rotate;
    let i_dq = it * rotate;
    Ok(OperatingPoint {
        delta,
        vd: v_dq.im,
        vq: v_dq.re,
        id: i_dq.im,
        iq: i_dq.re,
    })
}

/// Swing equation right-hand side in per-unit speed.
#[inline]
pub fn swing_derivative(pm: f64, pe: f64, omega: f64, d: f64, h: f64) -> f64 {
    0.5 * (pm - pe - d * (omega - 1.0)) / h
}

/// Where a stator-side internal voltage comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emf {
    Zero,
    /// Differential state at this local index
    State(usize),
    /// The field-voltage input
    Field,
}

/// Column of a flux-row Jacobian entry, in local terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Col {
    Id,
    Iq,
    /// Differential state at this local index
    State(usize),
    Field,
}

/// Flux dynamics of one machine order.
///
/// Differential indices are local: 0 is δ, 1 is ω, flux states start at 2.
pub trait Machine: fmt::Debug + Send + 'static {
    /// Local state names, algebraic first
    const STATE_NAMES: &'static [&'static str];
    const JAC_SIZE: usize;
    const ED: Emf;
    const EQ: Emf;

    fn default_params() -> GenParams {
        GenParams::default()
    }

    /// Reactance the initial internal voltage sits behind.
    fn angle_reactance(p: &GenParams) -> f64 {
        p.xq
    }

    /// `(Xa, Xb)`: the Iq coefficient of the d-axis stator row and the Id
    /// coefficient of the q-axis row.
    fn stator_reactances(p: &GenParams) -> (f64, f64);

    /// Fill flux states (`diff[2..]`) from stator-side `ed`, `eq`; returns Ef.
    fn flux_initialize(p: &GenParams, id: f64, iq: f64, ed: f64, eq: f64, diff: &mut [f64]) -> f64;

    /// Write `out[2..]`.
    fn flux_derivative(p: &GenParams, id: f64, iq: f64, diff: &[f64], ef: f64, out: &mut [f64]);

    /// Emit `(flux row, column, ∂f/∂col)` for every flux-row entry.
    ///
    /// Diagonal entries exclude the `cj` term.
    fn flux_jacobian(p: &GenParams, id: f64, iq: f64, diff: &[f64], emit: &mut dyn FnMut(usize, Col, f64));
}

#[derive(Debug, Clone, Copy)]
struct Signals {
    v: f64,
    theta: f64,
    ef: f64,
    pm: f64,
}

/// Generic synchronous machine over flux dynamics `M`.
#[derive(Debug)]
pub struct GenModel<M: Machine> {
    name: String,
    params: GenParams,
    offsets: OffsetTable,
    state: Vec<f64>,
    terminal: (f64, f64),
    field: f64,
    mech: f64,
    output: [f64; 2],
    machine: PhantomData<M>,
}

impl<M: Machine> GenModel<M> {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_params(name, M::default_params())
    }

    pub fn with_params(name: impl Into<String>, params: GenParams) -> Self {
        GenModel {
            name: name.into(),
            params,
            offsets: OffsetTable::new(),
            state: vec![0.0; M::STATE_NAMES.len()],
            terminal: (1.0, 0.0),
            field: 0.0,
            mech: 0.0,
            output: [0.0; 2],
            machine: PhantomData,
        }
    }

    pub fn from_spec(spec: &ComponentSpec) -> GridResult<Self> {
        let mut model = Self::new(spec.name.clone());
        spec.apply(|name, value| model.params.set(name, value))?;
        model.validate()?;
        Ok(model)
    }

    /// Parameter checks plus a solvable stator: `rs² + Xa·Xb` must not vanish.
    pub fn validate(&self) -> GridResult<()> {
        self.params.validate()?;
        let (xa, xb) = M::stator_reactances(&self.params);
        let det = self.params.rs * self.params.rs + xa * xb;
        if det.abs() < STATOR_DET_TOLERANCE {
            return Err(GridError::Parameter(format!(
                "{}: stator impedance is singular (rs={}, xa={}, xb={})",
                self.name, self.params.rs, xa, xb
            )));
        }
        Ok(())
    }

    /// Boxed constructor for registries.
    pub fn boxed(spec: &ComponentSpec) -> GridResult<Box<dyn DynamicModel>> {
        Ok(Box::new(Self::from_spec(spec)?))
    }

    pub fn params(&self) -> &GenParams {
        &self.params
    }

    /// Field voltage found by the last initialization
    pub fn field_voltage(&self) -> f64 {
        self.field
    }

    /// Mechanical power found by the last initialization
    pub fn mechanical_power(&self) -> f64 {
        self.mech
    }

    /// `[P, Q]` cached by the last `algebraic_update` or initialization.
    pub fn cached_output(&self) -> [f64; 2] {
        self.output
    }

    fn diff_size() -> usize {
        M::STATE_NAMES.len() - 2
    }

    fn signals(&self, inputs: &[f64]) -> Signals {
        Signals {
            v: inputs.get(VOLTAGE_IN).copied().unwrap_or(self.terminal.0),
            theta: inputs.get(ANGLE_IN).copied().unwrap_or(self.terminal.1),
            ef: inputs.get(FIELD_IN).copied().unwrap_or(self.field),
            pm: inputs.get(PMECH_IN).copied().unwrap_or(self.mech),
        }
    }

    fn emf(source: Emf, diff: &[f64], ef: f64) -> f64 {
        match source {
            Emf::Zero => 0.0,
            Emf::State(k) => diff[k],
            Emf::Field => ef,
        }
    }

    fn electrical_power(&self, id: f64, iq: f64, diff: &[f64], ef: f64) -> f64 {
        let (xa, xb) = M::stator_reactances(&self.params);
        let ed = Self::emf(M::ED, diff, ef);
        let eq = Self::emf(M::EQ, diff, ef);
        ed * id + eq * iq + (xb - xa) * id * iq
    }

    fn write_derivative(&self, sig: Signals, id: f64, iq: f64, diff: &[f64], out: &mut [f64]) {
        let p = &self.params;
        out[0] = p.base_freq * (diff[1] - 1.0);
        let pe = self.electrical_power(id, iq, diff, sig.ef);
        out[1] = swing_derivative(sig.pm, pe, diff[1], p.d, p.h);
        M::flux_derivative(p, id, iq, diff, sig.ef, out);
    }

    fn active(&self, mode: &SolveMode) -> (Option<usize>, Option<usize>) {
        let record = self.offsets.get(mode);
        let alg = record.alg_offset.filter(|_| record.local.alg_size > 0);
        let diff = record.diff_offset.filter(|_| record.local.diff_size > 0);
        (alg, diff)
    }
}

impl<M: Machine> DynamicModel for GenModel<M> {
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
        let n = M::STATE_NAMES.len();
        if self.state.len() != n {
            self.state = vec![0.0; n];
        }
        self.offsets
            .set_local_sizes(StateSizes::new(2, Self::diff_size(), M::JAC_SIZE));
    }

    /// Generators only take part in dynamic modes.
    fn mode_sizes(&self, mode: &SolveMode) -> StateSizes {
        if mode.is_dynamic() {
            self.offsets.local_sizes().restrict(mode)
        } else {
            StateSizes::ZERO
        }
    }

    fn local_state(&self) -> &[f64] {
        &self.state
    }

    fn local_state_mut(&mut self) -> &mut [f64] {
        &mut self.state
    }

    fn initialize_values(&mut self, inputs: &[f64], desired_outputs: &[f64]) -> GridResult<Vec<f64>> {
        self.validate()?;
        self.params.apply_fallbacks(&self.name);

        let v = inputs.get(VOLTAGE_IN).copied().unwrap_or(1.0);
        let theta = inputs.get(ANGLE_IN).copied().unwrap_or(0.0);
        let p = desired_outputs.get(P_OUT).copied().unwrap_or(0.0);
        let q = desired_outputs.get(Q_OUT).copied().unwrap_or(0.0);

        let params = &self.params;
        let op = initial_angle_and_current(v, theta, p, q, params.rs, M::angle_reactance(params))?;
        let (xa, xb) = M::stator_reactances(params);
        let ed = op.vd + params.rs * op.id + xa * op.iq;
        let eq = op.vq + params.rs * op.iq - xb * op.id;

        let mut state = vec![0.0; M::STATE_NAMES.len()];
        state[0] = op.id;
        state[1] = op.iq;
        state[2] = op.delta;
        state[3] = 1.0;
        let ef = M::flux_initialize(params, op.id, op.iq, ed, eq, &mut state[2..]);
        let pm = self.electrical_power(op.id, op.iq, &state[2..], ef);

        self.state = state;
        self.terminal = (v, theta);
        self.field = ef;
        self.mech = pm;
        self.output = [op.vd * op.id + op.vq * op.iq, op.vd * op.iq - op.vq * op.id];
        info!(
            component = %self.name,
            delta = op.delta,
            ef,
            pm,
            "generator initialized"
        );
        Ok(vec![v, theta, ef, pm])
    }

    fn algebraic_update(
        &mut self,
        inputs: &[f64],
        sd: &StateData<'_>,
        update: &mut [f64],
        mode: &SolveMode,
        alpha: f64,
    ) {
        let (alg, _) = self.active(mode);
        if alg.is_none() || !mode.has_algebraic() {
            return;
        }
        let sig = self.signals(inputs);
        let locs = resolve(&self.offsets, sd, &self.state, mode);
        let diff = locs.diff_state;
        let (vd, vq) = dq_voltage(sig.v, sig.theta, diff[0]);
        let (xa, xb) = M::stator_reactances(&self.params);
        let ed = Self::emf(M::ED, diff, sig.ef);
        let eq = Self::emf(M::EQ, diff, sig.ef);
        let rs = self.params.rs;
        let (id, iq) = solve2x2(rs, xa, -xb, rs, ed - vd, eq - vq);
        let (id_old, iq_old) = (locs.alg_state[0], locs.alg_state[1]);

        let dest = destinations(&self.offsets, update, mode);
        dest.alg[0] = alpha * id + (1.0 - alpha) * id_old;
        dest.alg[1] = alpha * iq + (1.0 - alpha) * iq_old;
        self.output = [vd * id + vq * iq, vd * iq - vq * id];
    }

    fn derivative(&self, inputs: &[f64], sd: &StateData<'_>, deriv: &mut [f64], mode: &SolveMode) {
        if !mode.has_differential() {
            return;
        }
        let (_, diff_offset) = self.active(mode);
        if diff_offset.is_none() {
            return;
        }
        let sig = self.signals(inputs);
        let locs = resolve(&self.offsets, sd, &self.state, mode);
        let dest = destinations(&self.offsets, deriv, mode);
        self.write_derivative(sig, locs.alg_state[0], locs.alg_state[1], locs.diff_state, dest.diff);
    }

    fn residual(&self, inputs: &[f64], sd: &StateData<'_>, resid: &mut [f64], mode: &SolveMode) {
        let (alg, diff_offset) = self.active(mode);
        if alg.is_none() && diff_offset.is_none() {
            return;
        }
        let sig = self.signals(inputs);
        let locs = resolve(&self.offsets, sd, &self.state, mode);
        let (id, iq) = (locs.alg_state[0], locs.alg_state[1]);
        let diff = locs.diff_state;
        let dest = destinations(&self.offsets, resid, mode);

        if !dest.alg.is_empty() {
            let (vd, vq) = dq_voltage(sig.v, sig.theta, diff[0]);
            let (xa, xb) = M::stator_reactances(&self.params);
            let rs = self.params.rs;
            dest.alg[0] = vd + rs * id + xa * iq - Self::emf(M::ED, diff, sig.ef);
            dest.alg[1] = vq + rs * iq - xb * id - Self::emf(M::EQ, diff, sig.ef);
        }

        if !dest.diff.is_empty() {
            let Some(dstate) = locs.dstate else {
                panic!("residual for '{}' in mode {} needs a state derivative buffer", self.name, mode);
            };
            self.write_derivative(sig, id, iq, diff, dest.diff);
            for (r, dx) in dest.diff.iter_mut().zip(dstate) {
                *r -= dx;
            }
        }
    }

    fn jacobian_elements(
        &self,
        inputs: &[f64],
        sd: &StateData<'_>,
        md: &mut dyn MatrixData,
        input_locs: &[Option<usize>],
        mode: &SolveMode,
    ) {
        let (alg, diff_offset) = self.active(mode);
        if alg.is_none() && diff_offset.is_none() {
            return;
        }
        let sig = self.signals(inputs);
        let locs = resolve(&self.offsets, sd, &self.state, mode);
        let (id, iq) = (locs.alg_state[0], locs.alg_state[1]);
        let diff = locs.diff_state;
        let p = &self.params;
        let (xa, xb) = M::stator_reactances(p);
        let (vd, vq) = dq_voltage(sig.v, sig.theta, diff[0]);
        let cj = sd.cj;

        let loc = |k: usize| input_locs.get(k).copied().flatten();
        let (v_loc, theta_loc) = (loc(VOLTAGE_IN), loc(ANGLE_IN));
        let (field_loc, pm_loc) = (loc(FIELD_IN), loc(PMECH_IN));

        if let Some(a) = alg {
            md.assign_check_col(a, theta_loc, vq);
            md.assign_check_col(a + 1, theta_loc, -vd);
            if sig.v > 0.0 {
                md.assign_check_col(a, v_loc, vd / sig.v);
                md.assign_check_col(a + 1, v_loc, vq / sig.v);
            }
            md.assign(a, a, p.rs);
            md.assign(a, a + 1, xa);
            md.assign(a + 1, a, -xb);
            md.assign(a + 1, a + 1, p.rs);

            if let Some(d) = diff_offset {
                md.assign(a, d, -vq);
                md.assign(a + 1, d, vd);
            }
            for (row, source) in [(a, M::ED), (a + 1, M::EQ)] {
                match source {
                    Emf::Zero => {}
                    Emf::State(k) => {
                        if let Some(d) = diff_offset {
                            md.assign(row, d + k, -1.0);
                        }
                    }
                    Emf::Field => md.assign_check_col(row, field_loc, -1.0),
                }
            }
        }

        let Some(d) = diff_offset else {
            return;
        };

        // delta
        md.assign(d, d, -cj);
        md.assign(d, d + 1, p.base_freq);

        // omega
        let k = -0.5 / p.h;
        let ed = Self::emf(M::ED, diff, sig.ef);
        let eq = Self::emf(M::EQ, diff, sig.ef);
        if let Some(a) = alg {
            md.assign(d + 1, a, k * (ed + (xb - xa) * iq));
            md.assign(d + 1, a + 1, k * (eq + (xb - xa) * id));
        }
        md.assign(d + 1, d + 1, k * p.d - cj);
        for (source, current) in [(M::ED, id), (M::EQ, iq)] {
            match source {
                Emf::Zero => {}
                Emf::State(s) => md.assign(d + 1, d + s, k * current),
                Emf::Field => md.assign_check_col(d + 1, field_loc, k * current),
            }
        }
        md.assign_check_col(d + 1, pm_loc, -k);

        let mut emit = |row: usize, col: Col, value: f64| {
            let r = d + row;
            match col {
                Col::Id => {
                    if let Some(a) = alg {
                        md.assign(r, a, value);
                    }
                }
                Col::Iq => {
                    if let Some(a) = alg {
                        md.assign(r, a + 1, value);
                    }
                }
                Col::State(s) if s == row => md.assign(r, d + s, value - cj),
                Col::State(s) => md.assign(r, d + s, value),
                Col::Field => md.assign_check_col(r, field_loc, value),
            }
        };
        M::flux_jacobian(p, id, iq, diff, &mut emit);
        trace!(component = %self.name, mode = %mode, "jacobian elements written");
    }

    fn outputs(&self, inputs: &[f64], sd: &StateData<'_>, mode: &SolveMode) -> Vec<f64> {
        let sig = self.signals(inputs);
        let (alg, diff) = self.active(mode);
        let (id, iq, delta) = if alg.is_none() && diff.is_none() {
            (self.state[0], self.state[1], self.state[2])
        } else {
            let locs = resolve(&self.offsets, sd, &self.state, mode);
            (locs.alg_state[0], locs.alg_state[1], locs.diff_state[0])
        };
        let (vd, vq) = dq_voltage(sig.v, sig.theta, delta);
        vec![vd * id + vq * iq, vd * iq - vq * id]
    }

    fn state_names(&self) -> Vec<String> {
        M::STATE_NAMES.iter().map(|s| s.to_string()).collect()
    }

    fn set_param(&mut self, name: &str, value: f64) -> GridResult<()> {
        self.params.set(name, value)
    }
}
