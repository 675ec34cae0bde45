//! # gridsim-core: State Offsets and Jacobian Assembly
//!
//! The substrate a power-system DAE solver stands on: a tree of heterogeneous
//! component models contributes equations to one flat state vector and one
//! global Jacobian, under several solve modes.
//!
//! ## Design Philosophy
//!
//! No component knows where it lives globally. Instead:
//! - **Sizing**: each component declares its local algebraic/differential
//!   sizes; [`offsets::load_sizes`] composes them up the tree.
//! - **Placement**: [`offsets::set_offset`] walks the tree in insertion order
//!   and stamps each component's base offsets for one [`SolveMode`].
//! - **Evaluation**: [`locations::resolve`] turns offsets plus the solver's
//!   raw buffers into slices of exactly that component's slots.
//! - **Jacobian**: models write partial derivatives through
//!   [`matrix::MatrixData`], so the same code fills dense and sparse storage.
//!
//! ## Quick Start
//!
//! ```rust
//! use gridsim_core::model::{DynamicModel, ModelGroup};
//! use gridsim_core::offsets::prepare;
//! use gridsim_core::SolveMode;
//!
//! let mut root = ModelGroup::new("system");
//! root.initialize_sizes(0.0, 0);
//! let n = prepare(&mut root, &SolveMode::DAE);
//! assert_eq!(n, 0);
//! ```
//!
//! ## Modules
//!
//! - [`mode`] - Solve modes and the named mode catalog
//! - [`offsets`] - Per-mode offset records and the sizing/placement walks
//! - [`locations`] - Solver state snapshots and per-component views
//! - [`matrix`] - Dense, sparse and triplet Jacobian accumulators
//! - [`model`] - The [`DynamicModel`] contract and a generic container
//! - [`registry`] / [`config`] - Building models from type names
//! - [`solver`] - Linear backends and a reference implicit integrator

pub mod config;
pub mod error;
pub mod locations;
pub mod matrix;
pub mod mode;
pub mod model;
pub mod offsets;
pub mod registry;
pub mod solver;

pub use config::ComponentSpec;
pub use error::{GridError, GridResult};
pub use locations::{Destinations, Locations, StateData};
pub use matrix::{DenseMatrixData, MatrixData, SparseMatrixData, Triplet, TripletMatrixData};
pub use mode::{ModeTable, SolveMode};
pub use model::{DynamicModel, ModelGroup};
pub use offsets::{OffsetStatus, OffsetTable, SolverOffsets, StateSizes};
pub use registry::ModelRegistry;
