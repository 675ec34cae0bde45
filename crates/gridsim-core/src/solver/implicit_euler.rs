//! Reference implicit-Euler integrator driving a model tree.
//!
//! Each step solves `F(t+h, x, (x - x_prev)/h) = 0` by Newton iteration:
//!
//! ```text
//!   predict    algebraic_update fills algebraic slots from x_prev
//!   loop       r = residual(x, ẋ)           stop when max|r| < tol
//!              J = jacobian_elements(cj = 1/h)
//!              x -= J⁻¹ r
//! ```
//!
//! The Jacobian is assembled through either the dense or the sparse
//! accumulator. The sparse pattern is discovered once per `initialize`.

use super::backend::LinearSystemBackend;
use super::registry::SolverKind;
use crate::error::{GridError, GridResult};
use crate::locations::StateData;
use crate::matrix::{sparsity_pattern, DenseMatrixData, MatrixData, SparseMatrixData};
use crate::mode::SolveMode;
use crate::model::DynamicModel;
use crate::offsets::prepare;
use faer::Mat;
use serde::{Deserialize, Serialize};
use sprs::CsMat;
use std::sync::Arc;
use tracing::{debug, info, trace};

/// How the Newton Jacobian is accumulated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JacobianStorage {
    #[default]
    Dense,
    Sparse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorConfig {
    /// Fixed step size (s)
    pub step: f64,
    /// Max-norm residual tolerance
    pub tolerance: f64,
    pub max_iterations: usize,
    pub solver: SolverKind,
    pub jacobian: JacobianStorage,
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        IntegratorConfig {
            step: 0.01,
            tolerance: 1e-8,
            max_iterations: 20,
            solver: SolverKind::default(),
            jacobian: JacobianStorage::default(),
        }
    }
}

/// Outcome of one accepted step.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StepReport {
    pub time: f64,
    pub iterations: usize,
    pub residual_norm: f64,
}

fn max_norm(values: &[f64]) -> f64 {
    values.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()))
}

pub struct ImplicitEuler {
    config: IntegratorConfig,
    backend: Arc<dyn LinearSystemBackend>,
    mode: SolveMode,
    time: f64,
    state: Vec<f64>,
    pattern: Option<CsMat<f64>>,
    seq_id: u64,
}

impl ImplicitEuler {
    pub fn new(config: IntegratorConfig) -> GridResult<Self> {
        if !(config.step > 0.0) {
            return Err(GridError::Config(format!(
                "integration step must be positive, got {}",
                config.step
            )));
        }
        Ok(ImplicitEuler {
            backend: config.solver.build_solver(),
            config,
            mode: SolveMode::DAE,
            time: 0.0,
            state: Vec::new(),
            pattern: None,
            seq_id: 0,
        })
    }

    pub fn with_mode(mut self, mode: SolveMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn state(&self) -> &[f64] {
        &self.state
    }

    pub fn mode(&self) -> &SolveMode {
        &self.mode
    }

    pub fn config(&self) -> &IntegratorConfig {
        &self.config
    }

    /// Lay out `root`, gather its current state and build the sparse pattern if needed.
    ///
    /// Must be repeated after any topology change.
    pub fn initialize(&mut self, root: &mut dyn DynamicModel, time0: f64) -> usize {
        let n = prepare(root, &self.mode);
        self.state = vec![0.0; n];
        root.guess_state(time0, &mut self.state, None, &self.mode);
        self.time = time0;
        self.pattern = match self.config.jacobian {
            JacobianStorage::Dense => None,
            JacobianStorage::Sparse => {
                let sd = StateData::new(time0, &self.state).with_cj(1.0 / self.config.step);
                Some(sparsity_pattern(root, &sd, &self.mode, n))
            }
        };
        info!(
            states = n,
            mode = %self.mode,
            solver = self.config.solver.as_str(),
            "integrator initialized"
        );
        n
    }

    /// Max-norm of the residual at the current state with zero state derivative.
    pub fn equilibrium_residual(&self, root: &dyn DynamicModel) -> f64 {
        let dstate = vec![0.0; self.state.len()];
        let sd = StateData::new(self.time, &self.state).with_dstate(&dstate);
        let mut resid = vec![0.0; self.state.len()];
        root.residual(&[], &sd, &mut resid, &self.mode);
        max_norm(&resid)
    }

    fn assemble(&mut self, root: &dyn DynamicModel, sd: &StateData<'_>) -> Mat<f64> {
        let n = self.state.len();
        let mut jac = Mat::<f64>::zeros(n, n);
        match self.pattern.as_mut() {
            None => {
                let mut md = DenseMatrixData::new(&mut jac);
                root.jacobian_elements(&[], sd, &mut md, &[], &self.mode);
            }
            Some(csc) => {
                let mut md = SparseMatrixData::new(csc);
                md.clear();
                root.jacobian_elements(&[], sd, &mut md, &[], &self.mode);
                for t in md.triplets() {
                    jac.write(t.row, t.col, t.value);
                }
            }
        }
        jac
    }

    /// Advance one fixed step.
    pub fn step(&mut self, root: &mut dyn DynamicModel) -> GridResult<StepReport> {
        let h = self.config.step;
        let cj = 1.0 / h;
        let t = self.time + h;
        let prev = self.state.clone();

        let mut x = prev.clone();
        {
            let sd = StateData::new(t, &prev).with_cj(cj);
            root.algebraic_update(&[], &sd, &mut x, &self.mode, 1.0);
        }

        let mut resid = vec![0.0; x.len()];
        for iteration in 0..=self.config.max_iterations {
            self.seq_id += 1;
            let dstate: Vec<f64> = x.iter().zip(&prev).map(|(a, b)| (a - b) * cj).collect();
            let sd = StateData::new(t, &x)
                .with_dstate(&dstate)
                .with_cj(cj)
                .with_seq_id(self.seq_id);

            resid.iter_mut().for_each(|r| *r = 0.0);
            root.residual(&[], &sd, &mut resid, &self.mode);
            let norm = max_norm(&resid);
            trace!(time = t, iteration, norm, "newton iteration");

            if norm < self.config.tolerance {
                root.set_state(t, &x, &self.mode);
                self.state = x;
                self.time = t;
                debug!(time = t, iterations = iteration, "step accepted");
                return Ok(StepReport {
                    time: t,
                    iterations: iteration,
                    residual_norm: norm,
                });
            }
            if iteration == self.config.max_iterations {
                break;
            }

            let jac = self.assemble(root, &sd);
            let rhs: Vec<f64> = resid.iter().map(|r| -r).collect();
            let delta = self
                .backend
                .solve(&jac, &rhs)
                .map_err(|err| GridError::Solver(format!("linear solve at t={:.6}: {}", t, err)))?;
            for (xi, di) in x.iter_mut().zip(delta) {
                *xi += di;
            }
        }

        Err(GridError::Solver(format!(
            "newton iteration did not converge at t={:.6} after {} iterations (residual {:.3e})",
            t,
            self.config.max_iterations,
            max_norm(&resid)
        )))
    }

    /// Step until `stop`, calling `observe` after every accepted step.
    pub fn run_until<F>(&mut self, root: &mut dyn DynamicModel, stop: f64, mut observe: F) -> GridResult<usize>
    where
        F: FnMut(&dyn DynamicModel, &StepReport, &[f64]),
    {
        let mut steps = 0;
        while self.time + 0.5 * self.config.step <= stop {
            let report = self.step(root)?;
            observe(root, &report, &self.state);
            steps += 1;
        }
        Ok(steps)
    }
}
