use std::{error::Error, fmt, io};

/// The orchestra module's result type.
pub type Result<T> = std::result::Result<T, EvaluatorErr>;

/// Invalid pool or dataset setup, caught before any worker runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigErr {
    /// The worker count was zero.
    NoWorkers,
    /// The dataset collection holds no class at all.
    NoClasses,
    /// There are not enough sequences to give every worker a non-empty partition.
    InsufficientSequences { sequences: usize, workers: usize },
    /// A class carries a different number of weights than sequences.
    WeightsLengthMismatch {
        class: usize,
        got: usize,
        expected: usize,
    },
    /// A sequence weight is negative or not finite.
    InvalidWeight { class: usize, sequence: usize },
    /// A configuration source could not be read or parsed.
    Source(String),
}

impl fmt::Display for ConfigErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoWorkers => f.write_str("the number of worker threads has to be positive"),
            Self::NoClasses => f.write_str("the dataset collection contains no class"),
            Self::InsufficientSequences { sequences, workers } => write!(
                f,
                "{sequences} sequences can't be split among {workers} worker threads"
            ),
            Self::WeightsLengthMismatch {
                class,
                got,
                expected,
            } => write!(
                f,
                "weights length mismatch for class {class}: got {got}, expected {expected}"
            ),
            Self::InvalidWeight { class, sequence } => write!(
                f,
                "weight of sequence {sequence} in class {class} is negative or not finite"
            ),
            Self::Source(msg) => write!(f, "invalid configuration: {msg}"),
        }
    }
}

impl Error for ConfigErr {}

/// Returned when a parameter vector has the wrong length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimensionErr {
    pub got: usize,
    pub expected: usize,
}

impl DimensionErr {
    pub fn new(got: usize, expected: usize) -> Self {
        Self { got, expected }
    }
}

impl fmt::Display for DimensionErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "parameter dimension mismatch: got {}, expected {}",
            self.got, self.expected
        )
    }
}

impl Error for DimensionErr {}

/// A failure raised inside one of the objective's hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluationErr {
    /// The hook returned an error.
    Failed(String),
    /// The hook panicked; the payload message is kept when it was a string.
    Panicked(String),
}

impl EvaluationErr {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

impl fmt::Display for EvaluationErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(msg) => write!(f, "evaluation failed: {msg}"),
            Self::Panicked(msg) => write!(f, "evaluation panicked: {msg}"),
        }
    }
}

impl Error for EvaluationErr {}

impl From<DimensionErr> for EvaluationErr {
    fn from(value: DimensionErr) -> Self {
        Self::Failed(value.to_string())
    }
}

/// Everything the caller of an `Orchestrator` can observe going wrong.
///
/// `Config`, `Dimension` and `Join` are recoverable: the pool is left intact.
/// Every other variant is fatal, the pool has already been torn down when it
/// is returned and the orchestrator only answers `Stopped` from then on.
#[derive(Debug)]
pub enum EvaluatorErr {
    Config(ConfigErr),
    Dimension(DimensionErr),
    /// At least one worker failed while running its partition.
    WorkerFailed {
        worker: usize,
        source: EvaluationErr,
    },
    /// A join hook failed after a successful round.
    Join(EvaluationErr),
    /// A worker thread could not be spawned.
    Spawn(io::Error),
    /// Re-partitioning was attempted while a worker was not idle.
    WorkerBusy { worker: usize },
    /// Every worker thread vanished before the round completed.
    Disconnected,
    /// The pool was stopped; the orchestrator can't evaluate anymore.
    Stopped,
}

impl EvaluatorErr {
    /// Whether the orchestrator is unusable after this error.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Config(_) | Self::Dimension(_) | Self::Join(_))
    }
}

impl fmt::Display for EvaluatorErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "configuration error: {e}"),
            Self::Dimension(e) => write!(f, "{e}"),
            Self::WorkerFailed { worker, source } => write!(
                f,
                "terminating, since at least worker thread {worker} failed: {source}"
            ),
            Self::Join(e) => write!(f, "could not join partial results: {e}"),
            Self::Spawn(e) => write!(f, "could not spawn a worker thread: {e}"),
            Self::WorkerBusy { worker } => write!(
                f,
                "worker thread {worker} was not idle while its partition was reassigned"
            ),
            Self::Disconnected => f.write_str("all worker threads disconnected mid round"),
            Self::Stopped => f.write_str("the worker threads have been stopped"),
        }
    }
}

impl Error for EvaluatorErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Dimension(e) => Some(e),
            Self::WorkerFailed { source, .. } => Some(source),
            Self::Join(e) => Some(e),
            Self::Spawn(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigErr> for EvaluatorErr {
    fn from(value: ConfigErr) -> Self {
        Self::Config(value)
    }
}

impl From<io::Error> for EvaluatorErr {
    fn from(value: io::Error) -> Self {
        Self::Spawn(value)
    }
}

impl From<DimensionErr> for EvaluatorErr {
    fn from(value: DimensionErr) -> Self {
        Self::Dimension(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_setup_and_join_errors_are_recoverable() {
        assert!(!EvaluatorErr::from(ConfigErr::NoWorkers).is_fatal());
        assert!(!EvaluatorErr::from(DimensionErr::new(1, 2)).is_fatal());
        assert!(!EvaluatorErr::Join(EvaluationErr::failed("empty")).is_fatal());
        assert!(EvaluatorErr::Stopped.is_fatal());
        assert!(EvaluatorErr::WorkerBusy { worker: 0 }.is_fatal());

        let failed = EvaluatorErr::WorkerFailed {
            worker: 3,
            source: EvaluationErr::failed("boom"),
        };
        assert!(failed.is_fatal());
    }

    #[test]
    fn worker_failure_names_the_worker() {
        let err = EvaluatorErr::WorkerFailed {
            worker: 2,
            source: EvaluationErr::failed("nan in partial sum"),
        };

        let msg = err.to_string();
        assert!(msg.contains("worker thread 2"), "{msg}");
        assert!(msg.contains("nan in partial sum"), "{msg}");
        assert!(err.source().is_some());
    }
}
