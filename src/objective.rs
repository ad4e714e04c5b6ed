use crate::{
    data::DataSets,
    orchestra::{DimensionErr, EvaluationErr, Partition, Result},
};

/// The per-partition computations an `Orchestrator` fans out to its workers.
///
/// The orchestrator knows nothing about what the numbers mean; it only calls
/// these hooks. Every worker hook receives its own worker index so the
/// implementation can keep one scratch slot per worker (e.g. a
/// `parking_lot::Mutex` per index). A slot is only ever touched by the worker
/// owning it during a round, and by the join hooks once the round is over.
///
/// The join hooks must be order independent: workers run in no particular order.
pub trait Objective: Send + Sync + 'static {
    /// The element type of the class datasets.
    type Sequence: Send + Sync + 'static;

    /// Called once, before the pool starts, with the final worker count.
    fn allocate_workers(&mut self, workers: usize);

    /// The expected length of the parameter vector.
    fn dimension(&self) -> usize;

    /// Validates `params` and derives any worker independent state.
    ///
    /// Runs on the caller's thread before the workers see the parameters.
    fn set_thread_independent_parameters(
        &self,
        params: &[f64],
    ) -> std::result::Result<(), DimensionErr>;

    /// Applies `params` to the private state of `worker`.
    fn set_parameters_for_worker(
        &self,
        worker: usize,
        params: &[f64],
    ) -> std::result::Result<(), EvaluationErr>;

    /// Computes and stores the partial function value of `partition`.
    fn evaluate_function_for_worker(
        &self,
        worker: usize,
        data: &DataSets<Self::Sequence>,
        partition: &Partition,
    ) -> std::result::Result<(), EvaluationErr>;

    /// Computes and stores the partial gradient of `partition`.
    fn evaluate_gradient_for_worker(
        &self,
        worker: usize,
        data: &DataSets<Self::Sequence>,
        partition: &Partition,
    ) -> std::result::Result<(), EvaluationErr>;

    /// Reduces every worker's partial value into the function value.
    fn join_function(&self) -> std::result::Result<f64, EvaluationErr>;

    /// Reduces every worker's partial gradient into the gradient.
    fn join_gradient(&self) -> std::result::Result<Vec<f64>, EvaluationErr>;
}

/// A function an optimizer can drive: value and gradient at a point.
pub trait DifferentiableFunction {
    /// The amount of parameters the function expects.
    fn dimension(&self) -> usize;

    fn evaluate_function(&mut self, params: &[f64]) -> Result<f64>;

    fn evaluate_gradient(&mut self, params: &[f64]) -> Result<Vec<f64>>;
}
