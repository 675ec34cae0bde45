//! # gridsim-models: Component Models
//!
//! Concrete [`DynamicModel`](gridsim_core::DynamicModel) implementations for
//! the gridsim framework:
//!
//! - [`genmodel`] - Synchronous generators from the classical model to the
//!   sixth-order subtransient model
//! - [`motor`] - Induction motor load with slip dynamics
//! - [`bus`] - Infinite bus hosting generators and loads
//! - [`catalog`] - Registry of the built-in model types
//!
//! ## Example
//!
//! ```rust
//! use gridsim_core::offsets::prepare;
//! use gridsim_core::{DynamicModel, SolveMode};
//! use gridsim_models::bus::{BusChild, InfiniteBus};
//! use gridsim_models::genmodel::GenModel6;
//!
//! let mut bus = InfiniteBus::new("B1", 1.0, 0.0);
//! bus.add(BusChild::Generator {
//!     model: Box::new(GenModel6::new("G1")),
//!     dispatch: [0.8, 0.2],
//! });
//! bus.initialize_sizes(0.0, 0);
//! bus.initialize_values(&[], &[]).unwrap();
//! // [V, θ] + [id, iq] + six differential states
//! assert_eq!(prepare(&mut bus, &SolveMode::DAE), 10);
//! ```

pub mod bus;
pub mod catalog;
pub mod genmodel;
pub mod motor;

pub use bus::{BusChild, ChildRef, InfiniteBus};
pub use catalog::default_registry;
pub use genmodel::{GenModel, GenModel3, GenModel4, GenModel5, GenModel6, GenModelClassical, GenParams};
pub use motor::{MotorLoad, MotorParams};
