pub mod communication;
pub mod error;
pub mod orchestrator;
pub mod partition;
pub mod worker;

pub use communication::Task;
pub use error::{ConfigErr, DimensionErr, EvaluationErr, EvaluatorErr, Result};
pub use orchestrator::Orchestrator;
pub use partition::{Partition, plan};
