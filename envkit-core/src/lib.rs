#![warn(missing_docs)]
//! Building blocks for reinforcement learning environments.
//!
//! Environments are assembled from values owned by a [`Registry`]: bounded
//! stocks changed through a propose/accept protocol, expressions giving
//! dynamic bounds and rates, and callables such as [`ValueTransfer`] that move
//! quantities between values. A [`Stepper`] supplies the time of every tick.
//!
//! ```
//! use envkit_core::{
//!     ConstrConfig, Registry, Stepper, StepperConfig, TransferConfig, ValueTransfer,
//! };
//!
//! let mut registry = Registry::new();
//! let tank = registry.add_constrained(ConstrConfig::new(100.0).name("tank").lowerbound(0.0))?;
//! let bucket = registry.add_constrained(ConstrConfig::new(0.0).name("bucket").upperbound(50.0))?;
//! let mut pour = ValueTransfer::build(TransferConfig::new(30.0, tank, bucket), &registry)?;
//! let mut stepper = Stepper::build(&StepperConfig::default().max_t(2));
//!
//! registry.reset()?;
//! while !stepper.done() {
//!     pour.transfer(&registry)?;
//!     registry.step(&stepper.context())?;
//!     stepper.next();
//! }
//! // The second pour would overflow the bucket and is aborted.
//! assert_eq!(registry.value(tank)?, 70.0);
//! assert_eq!(registry.value(bucket)?, 30.0);
//! # Ok::<(), anyhow::Error>(())
//! ```
pub mod error;
pub mod expr;
pub mod record;

mod scalar;
pub use scalar::{Scalar, ScalarKind};

mod value;
pub use value::BoundedValue;

mod source;
pub use source::NumericSource;

mod constr;
pub use constr::{ConstrConfig, ConstrainedValue, ErrorFlags, OpKind, Proposal, Randomize};

mod registry;
pub use registry::{AnyValueId, ExprId, Registry, Scope, ValueId};

mod callable;
pub use callable::{
    Assign, Callable, Condition, SubSteps, TransferConfig, TransferOutcome, ValueTransfer,
    ValueUpdate,
};

mod stepper;
pub use stepper::{StepContext, Stepper, StepperConfig};

pub use expr::{Binding, Expression, ResultType, Vars};
