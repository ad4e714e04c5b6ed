//! Data-parallel evaluation of an objective function and its gradient.
//!
//! An [`Orchestrator`] splits a collection of weighted class datasets into one
//! contiguous partition per worker, keeps a fixed pool of worker threads alive
//! and drives them through rounds: apply parameters, evaluate the function,
//! evaluate the gradient. The math lives in an [`Objective`]; the partial
//! results are reduced by its join hooks.

pub mod config;
pub mod data;
pub mod objective;
pub mod orchestra;

pub use config::{EvaluatorConfig, available_parallelism};
pub use data::{ClassData, DataSets};
pub use objective::{DifferentiableFunction, Objective};
pub use orchestra::{
    ConfigErr, DimensionErr, EvaluationErr, EvaluatorErr, Orchestrator, Partition, Result, Task,
};
