use std::{fmt, sync::Arc};

use crossbeam::channel::{self, Receiver, Sender};

use super::{error::EvaluationErr, partition::Partition};
use crate::data::DataSets;

/// What a worker is doing, as seen by the orchestrator.
///
/// `Wait` is the only idle state and the only one in which the worker's
/// partition may be reassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Wait,
    SetParameters,
    Evaluate,
    EvaluateGradient,
    Stop,
}

impl Task {
    /// Whether this task runs one of the objective's hooks.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::SetParameters | Self::Evaluate | Self::EvaluateGradient
        )
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Wait => "wait",
            Self::SetParameters => "set-parameters",
            Self::Evaluate => "evaluate",
            Self::EvaluateGradient => "evaluate-gradient",
            Self::Stop => "stop",
        })
    }
}

/// A message on a worker's inbox.
pub enum Command<S> {
    /// Run one active task and report a `Completion`.
    Run(Task),
    /// Replace the worker's partition and dataset. Only sent while idle.
    Reassign {
        partition: Partition,
        data: Arc<DataSets<S>>,
    },
    /// Leave the run loop.
    Stop,
}

/// The tagged result a worker reports after every `Command::Run`.
#[derive(Debug)]
pub struct Completion {
    pub worker: usize,
    pub task: Task,
    pub outcome: Result<(), EvaluationErr>,
}

/// Creates a worker inbox. It never holds more than one pending command
/// besides a trailing `Stop`.
pub fn inbox<S>() -> (Sender<Command<S>>, Receiver<Command<S>>) {
    channel::bounded(2)
}

/// Creates the completion channel shared by every worker of a pool.
pub fn completions(workers: usize) -> (Sender<Completion>, Receiver<Completion>) {
    channel::bounded(workers)
}
