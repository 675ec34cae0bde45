//! Linear backends and the reference integrator.

pub mod backend;
pub mod implicit_euler;
pub mod registry;

pub use backend::{FaerSolver, GaussSolver, LinearSystemBackend};
pub use implicit_euler::{ImplicitEuler, IntegratorConfig, JacobianStorage, StepReport};
pub use registry::SolverKind;
