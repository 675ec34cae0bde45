//! The component equation contract.
//!
//! Every physical component (generator, load, bus) implements
//! [`DynamicModel`]. Containers expose their children through
//! `sub_models`/`sub_models_mut` so the offset walks in [`crate::offsets`]
//! and the evaluation calls can descend the tree without knowing concrete
//! types.
//!
//! Evaluation calls take an `inputs` slice laid out by the `*_IN` indices
//! below and an `input_locs` slice giving the global column of each input
//! that is itself a solver state (`None` when the signal is not wired).
//!
//! A malformed mode/offset combination panics. Configuration and numerical
//! problems that a caller can act on return [`GridError`].

use crate::error::{GridError, GridResult};
use crate::locations::{destinations, resolve, StateData};
use crate::matrix::MatrixData;
use crate::mode::SolveMode;
use crate::offsets::{OffsetTable, StateSizes};
use std::fmt;

/// Terminal voltage magnitude (pu)
pub const VOLTAGE_IN: usize = 0;
/// Terminal voltage angle (rad)
pub const ANGLE_IN: usize = 1;
/// Field voltage
pub const FIELD_IN: usize = 2;
/// Mechanical power
pub const PMECH_IN: usize = 3;

/// Real power output
pub const P_OUT: usize = 0;
/// Reactive power output
pub const Q_OUT: usize = 1;

/// Bit set passed to `initialize_sizes`; forwarded unchanged to children.
pub type InitFlags = u32;

pub trait DynamicModel: fmt::Debug {
    fn name(&self) -> &str;

    fn offsets(&self) -> &OffsetTable;

    fn offsets_mut(&mut self) -> &mut OffsetTable;

    fn sub_models(&self) -> &[Box<dyn DynamicModel>] {
        &[]
    }

    fn sub_models_mut(&mut self) -> &mut [Box<dyn DynamicModel>] {
        &mut []
    }

    /// Declare local algebraic, differential and Jacobian sizes.
    ///
    /// Must run (on the whole tree) before `load_sizes`.
    fn initialize_sizes(&mut self, time0: f64, flags: InitFlags);

    /// Own slots under `mode`; defaults to the declared sizes restricted to
    /// the mode's equation subset.
    fn mode_sizes(&self, mode: &SolveMode) -> StateSizes {
        self.offsets().local_sizes().restrict(mode)
    }

    /// Own state in local layout (algebraic block first).
    fn local_state(&self) -> &[f64];

    fn local_state_mut(&mut self) -> &mut [f64];

    /// Solve for a consistent initial state given terminal conditions.
    ///
    /// Returns the inputs adjusted so the system starts at equilibrium.
    fn initialize_values(&mut self, inputs: &[f64], desired_outputs: &[f64]) -> GridResult<Vec<f64>>;

    /// Copy own state into the solver's buffers; derivatives start at zero.
    fn guess_state(&self, _time: f64, state: &mut [f64], dstate_dt: Option<&mut [f64]>, mode: &SolveMode) {
        write_local_state(self, state, dstate_dt, mode);
    }

    /// Pull own state back out of the solver's buffers.
    fn set_state(&mut self, time: f64, state: &[f64], mode: &SolveMode) {
        read_local_state(self, time, state, mode);
    }

    /// Solve the purely algebraic unknowns given the differential states.
    ///
    /// Writes into `update` at the algebraic offsets, blended with the
    /// current values by `alpha`, and refreshes cached observables.
    fn algebraic_update(
        &mut self,
        inputs: &[f64],
        sd: &StateData<'_>,
        update: &mut [f64],
        mode: &SolveMode,
        alpha: f64,
    );

    /// Time derivatives of the differential states. No-op when `mode` has none.
    fn derivative(&self, inputs: &[f64], sd: &StateData<'_>, deriv: &mut [f64], mode: &SolveMode);

    /// Residual rows selected by `mode`.
    fn residual(&self, inputs: &[f64], sd: &StateData<'_>, resid: &mut [f64], mode: &SolveMode);

    fn jacobian_elements(
        &self,
        inputs: &[f64],
        sd: &StateData<'_>,
        md: &mut dyn MatrixData,
        input_locs: &[Option<usize>],
        mode: &SolveMode,
    );

    fn outputs(&self, inputs: &[f64], sd: &StateData<'_>, mode: &SolveMode) -> Vec<f64>;

    /// Local state names in local layout order.
    fn state_names(&self) -> Vec<String>;

    fn set_param(&mut self, name: &str, value: f64) -> GridResult<()>;
}

/// Copy `model`'s own local state into the global buffers for `mode`.
pub fn write_local_state<M: DynamicModel + ?Sized>(
    model: &M,
    state: &mut [f64],
    dstate_dt: Option<&mut [f64]>,
    mode: &SolveMode,
) {
    let local = model.local_state();
    let declared = model.offsets().local_sizes();
    let dest = destinations(model.offsets(), state, mode);
    let n_alg = dest.alg.len();
    dest.alg.copy_from_slice(&local[..n_alg]);
    let n_diff = dest.diff.len();
    dest.diff
        .copy_from_slice(&local[declared.alg_size..declared.alg_size + n_diff]);
    if let Some(dstate) = dstate_dt {
        destinations(model.offsets(), dstate, mode).diff.fill(0.0);
    }
}

/// Copy the active blocks of `state` back into `model`'s local storage.
pub fn read_local_state<M: DynamicModel + ?Sized>(model: &mut M, time: f64, state: &[f64], mode: &SolveMode) {
    let record = *model.offsets().get(mode);
    let declared = model.offsets().local_sizes();
    let sd = StateData::new(time, state);
    let (alg, diff) = {
        let locs = resolve(model.offsets(), &sd, model.local_state(), mode);
        let alg = (mode.has_algebraic() && record.local.alg_size > 0).then(|| locs.alg_state.to_vec());
        let diff = (mode.has_differential() && record.local.diff_size > 0).then(|| locs.diff_state.to_vec());
        (alg, diff)
    };
    let local = model.local_state_mut();
    if let Some(alg) = alg {
        local[..alg.len()].copy_from_slice(&alg);
    }
    if let Some(diff) = diff {
        local[declared.alg_size..declared.alg_size + diff.len()].copy_from_slice(&diff);
    }
}

/// Depth-first search of the tree rooted at `root` for a component by name.
pub fn find_model<'a>(root: &'a dyn DynamicModel, name: &str) -> Option<&'a dyn DynamicModel> {
    if root.name() == name {
        return Some(root);
    }
    root.sub_models()
        .iter()
        .find_map(|sub| find_model(sub.as_ref(), name))
}

/// Generic container with no states of its own.
///
/// Forwards every call to its children in insertion order.
#[derive(Debug)]
pub struct ModelGroup {
    name: String,
    offsets: OffsetTable,
    children: Vec<Box<dyn DynamicModel>>,
}

impl ModelGroup {
    pub fn new(name: impl Into<String>) -> Self {
        ModelGroup {
            name: name.into(),
            offsets: OffsetTable::new(),
            children: Vec::new(),
        }
    }

    /// Append a child; the group's offsets become stale.
    pub fn add(&mut self, model: Box<dyn DynamicModel>) {
        self.children.push(model);
        self.offsets.invalidate();
    }

    /// Detach the first child called `name`.
    pub fn remove(&mut self, name: &str) -> Option<Box<dyn DynamicModel>> {
        let idx = self.children.iter().position(|c| c.name() == name)?;
        self.offsets.invalidate();
        Some(self.children.remove(idx))
    }

    pub fn find(&self, name: &str) -> Option<&dyn DynamicModel> {
        self.children
            .iter()
            .find_map(|c| find_model(c.as_ref(), name))
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl DynamicModel for ModelGroup {
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
        &self.children
    }

    fn sub_models_mut(&mut self) -> &mut [Box<dyn DynamicModel>] {
        &mut self.children
    }

    fn initialize_sizes(&mut self, time0: f64, flags: InitFlags) {
        for child in &mut self.children {
            child.initialize_sizes(time0, flags);
        }
        self.offsets.set_local_sizes(StateSizes::ZERO);
    }

    fn local_state(&self) -> &[f64] {
        &[]
    }

    fn local_state_mut(&mut self) -> &mut [f64] {
        &mut []
    }

    fn initialize_values(&mut self, inputs: &[f64], _desired_outputs: &[f64]) -> GridResult<Vec<f64>> {
        for child in &mut self.children {
            child.initialize_values(inputs, &[])?;
        }
        Ok(inputs.to_vec())
    }

    fn guess_state(&self, time: f64, state: &mut [f64], mut dstate_dt: Option<&mut [f64]>, mode: &SolveMode) {
        for child in &self.children {
            child.guess_state(time, state, dstate_dt.as_deref_mut(), mode);
        }
    }

    fn set_state(&mut self, time: f64, state: &[f64], mode: &SolveMode) {
        for child in &mut self.children {
            child.set_state(time, state, mode);
        }
    }

    fn algebraic_update(
        &mut self,
        inputs: &[f64],
        sd: &StateData<'_>,
        update: &mut [f64],
        mode: &SolveMode,
        alpha: f64,
    ) {
        for child in &mut self.children {
            child.algebraic_update(inputs, sd, update, mode, alpha);
        }
    }

    fn derivative(&self, inputs: &[f64], sd: &StateData<'_>, deriv: &mut [f64], mode: &SolveMode) {
        if !mode.has_differential() {
            return;
        }
        for child in &self.children {
            child.derivative(inputs, sd, deriv, mode);
        }
    }

    fn residual(&self, inputs: &[f64], sd: &StateData<'_>, resid: &mut [f64], mode: &SolveMode) {
        for child in &self.children {
            child.residual(inputs, sd, resid, mode);
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
        for child in &self.children {
            child.jacobian_elements(inputs, sd, md, input_locs, mode);
        }
    }

    /// Element-wise sum of the children's outputs.
    fn outputs(&self, inputs: &[f64], sd: &StateData<'_>, mode: &SolveMode) -> Vec<f64> {
        let mut total: Vec<f64> = Vec::new();
        for child in &self.children {
            let out = child.outputs(inputs, sd, mode);
            if total.len() < out.len() {
                total.resize(out.len(), 0.0);
            }
            for (acc, v) in total.iter_mut().zip(out) {
                *acc += v;
            }
        }
        total
    }

    fn state_names(&self) -> Vec<String> {
        self.children
            .iter()
            .flat_map(|c| {
                let prefix = c.name().to_string();
                c.state_names()
                    .into_iter()
                    .map(move |s| format!("{}::{}", prefix, s))
            })
            .collect()
    }

    fn set_param(&mut self, name: &str, _value: f64) -> GridResult<()> {
        Err(GridError::Parameter(format!(
            "group '{}' has no parameter '{}'",
            self.name, name
        )))
    }
}

/// Minimal model with fixed sizes for exercising the tree machinery.
///
/// Algebraic rows solve `y = 1`; differential rows decay as `x' = -x`.
#[cfg(test)]
#[derive(Debug)]
pub(crate) struct SizedStub {
    name: String,
    sizes: StateSizes,
    offsets: OffsetTable,
    state: Vec<f64>,
}

#[cfg(test)]
impl SizedStub {
    pub(crate) fn new(name: &str, sizes: StateSizes) -> Self {
        SizedStub {
            name: name.to_string(),
            sizes,
            offsets: OffsetTable::new(),
            state: Vec::new(),
        }
    }
}

#[cfg(test)]
impl DynamicModel for SizedStub {
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
        self.state = vec![0.0; self.sizes.total()];
        self.offsets.set_local_sizes(self.sizes);
    }

    fn local_state(&self) -> &[f64] {
        &self.state
    }

    fn local_state_mut(&mut self) -> &mut [f64] {
        &mut self.state
    }

    fn initialize_values(&mut self, inputs: &[f64], _desired_outputs: &[f64]) -> GridResult<Vec<f64>> {
        self.state.iter_mut().for_each(|v| *v = 1.0);
        Ok(inputs.to_vec())
    }

    fn algebraic_update(
        &mut self,
        _inputs: &[f64],
        sd: &StateData<'_>,
        update: &mut [f64],
        mode: &SolveMode,
        alpha: f64,
    ) {
        let locs = resolve(&self.offsets, sd, &self.state, mode);
        let current = locs.alg_state.to_vec();
        let dest = destinations(&self.offsets, update, mode);
        for (out, cur) in dest.alg.iter_mut().zip(current) {
            *out = alpha * 1.0 + (1.0 - alpha) * cur;
        }
    }

    fn derivative(&self, _inputs: &[f64], sd: &StateData<'_>, deriv: &mut [f64], mode: &SolveMode) {
        if !mode.has_differential() {
            return;
        }
        let locs = resolve(&self.offsets, sd, &self.state, mode);
        let dest = destinations(&self.offsets, deriv, mode);
        for (out, x) in dest.diff.iter_mut().zip(locs.diff_state) {
            *out = -x;
        }
    }

    fn residual(&self, _inputs: &[f64], sd: &StateData<'_>, resid: &mut [f64], mode: &SolveMode) {
        let locs = resolve(&self.offsets, sd, &self.state, mode);
        let dest = destinations(&self.offsets, resid, mode);
        for (out, y) in dest.alg.iter_mut().zip(locs.alg_state) {
            *out = y - 1.0;
        }
        if let Some(dstate) = locs.dstate {
            for ((out, x), dx) in dest.diff.iter_mut().zip(locs.diff_state).zip(dstate) {
                *out = -x - dx;
            }
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
        let record = self.offsets.get(mode);
        if let Some(ao) = record.alg_offset {
            for k in 0..record.local.alg_size {
                md.assign(ao + k, ao + k, 1.0);
            }
        }
        if let Some(d) = record.diff_offset {
            for k in 0..record.local.diff_size {
                md.assign(d + k, d + k, -1.0 - sd.cj);
            }
        }
    }

    fn outputs(&self, _inputs: &[f64], _sd: &StateData<'_>, _mode: &SolveMode) -> Vec<f64> {
        vec![self.state.iter().sum()]
    }

    fn state_names(&self) -> Vec<String> {
        (0..self.sizes.total()).map(|k| format!("s{}", k)).collect()
    }

    fn set_param(&mut self, name: &str, _value: f64) -> GridResult<()> {
        Err(GridError::Parameter(format!("unknown parameter '{}'", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::DenseMatrixData;
    use crate::offsets::{layout_entries, prepare};

    fn area() -> ModelGroup {
        let mut group = ModelGroup::new("area");
        group.add(Box::new(SizedStub::new("gen", StateSizes::new(1, 6, 10))));
        group.add(Box::new(SizedStub::new("load", StateSizes::new(1, 0, 1))));
        group.initialize_sizes(0.0, 0);
        group
    }

    #[test]
    fn sibling_offsets_follow_insertion_order() {
        let mut parent = area();
        crate::offsets::load_sizes(&mut parent, &SolveMode::DAE);
        crate::offsets::set_offset(&mut parent, 10, 0, &SolveMode::DAE);

        let gen = parent.find("gen").unwrap().offsets().get(&SolveMode::DAE);
        let load = parent.find("load").unwrap().offsets().get(&SolveMode::DAE);
        assert_eq!(gen.alg_offset, Some(10));
        assert_eq!(load.alg_offset, Some(11));
        assert_eq!(parent.offsets().get(&SolveMode::DAE).state_size(), 8);
    }

    #[test]
    fn add_and_remove_invalidate_offsets() {
        let mut group = area();
        prepare(&mut group, &SolveMode::DAE);
        assert!(group.offsets().is_assigned(&SolveMode::DAE));

        let removed = group.remove("load").unwrap();
        assert_eq!(removed.name(), "load");
        assert!(!group.offsets().is_assigned(&SolveMode::DAE));
        assert!(group.remove("missing").is_none());

        let n = prepare(&mut group, &SolveMode::DAE);
        assert_eq!(n, 7);
        assert_eq!(layout_entries(&group, &SolveMode::DAE).len(), 2);
    }

    #[test]
    fn guess_and_set_state_round_trip_through_global_buffers() {
        let mut group = area();
        group.initialize_values(&[], &[]).unwrap();
        let n = prepare(&mut group, &SolveMode::DAE);

        let mut state = vec![0.0; n];
        let mut dstate = vec![9.0; n];
        group.guess_state(0.0, &mut state, Some(&mut dstate), &SolveMode::DAE);
        assert!(state.iter().all(|v| *v == 1.0));
        assert_eq!(dstate.iter().filter(|v| **v == 0.0).count(), 6);

        state.iter_mut().for_each(|v| *v = 0.5);
        group.set_state(0.1, &state, &SolveMode::DAE);
        assert!(group.sub_models()[0].local_state().iter().all(|v| *v == 0.5));
    }

    #[test]
    fn residual_is_idempotent() {
        let mut group = area();
        group.initialize_values(&[], &[]).unwrap();
        let n = prepare(&mut group, &SolveMode::DAE);
        let state: Vec<f64> = (0..n).map(|k| k as f64 * 0.1).collect();
        let dstate = vec![0.2; n];
        let sd = StateData::new(0.0, &state).with_dstate(&dstate);

        let mut first = vec![0.0; n];
        let mut second = vec![0.0; n];
        group.residual(&[], &sd, &mut first, &SolveMode::DAE);
        group.residual(&[], &sd, &mut second, &SolveMode::DAE);
        assert_eq!(first, second);
    }

    #[test]
    fn differential_only_derivative_leaves_algebraic_rows_alone() {
        let mut group = area();
        group.initialize_values(&[], &[]).unwrap();
        let mode = SolveMode::DYN_DIFFERENTIAL;
        let n = prepare(&mut group, &mode);
        assert_eq!(n, 6);
        let state = vec![2.0; n];
        let mut deriv = vec![f64::NAN; n];
        group.derivative(&[], &StateData::new(0.0, &state), &mut deriv, &mode);
        assert!(deriv.iter().all(|v| *v == -2.0));

        let alg_mode = SolveMode::DYN_ALGEBRAIC;
        let m = prepare(&mut group, &alg_mode);
        let mut untouched = vec![7.0; m];
        group.derivative(&[], &StateData::new(0.0, &vec![0.0; m]), &mut untouched, &alg_mode);
        assert!(untouched.iter().all(|v| *v == 7.0));
    }

    #[test]
    fn jacobian_subtracts_cj_on_differential_diagonal() {
        let mut group = area();
        let n = prepare(&mut group, &SolveMode::DAE);
        let state = vec![0.0; n];
        let sd = StateData::new(0.0, &state).with_cj(10.0);
        let mut mat = faer::Mat::<f64>::zeros(n, n);
        let mut md = DenseMatrixData::new(&mut mat);
        group.jacobian_elements(&[], &sd, &mut md, &[], &SolveMode::DAE);
        assert_eq!(md.at(0, 0), 1.0);
        assert_eq!(md.at(2, 2), -11.0);
    }

    #[test]
    fn group_parameters_are_rejected() {
        let mut group = area();
        assert!(matches!(group.set_param("h", 1.0), Err(GridError::Parameter(_))));
        assert_eq!(group.state_names()[0], "gen::s0");
    }
}
