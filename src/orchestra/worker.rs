use std::{
    any::Any,
    io,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread::{self, JoinHandle},
};

use crossbeam::channel::{Receiver, Sender};
use log::{debug, error, warn};
use parking_lot::RwLock;

use super::{
    communication::{self, Command, Completion, Task},
    error::{EvaluationErr, EvaluatorErr, Result},
    partition::Partition,
};
use crate::{data::DataSets, objective::Objective};

/// The part of a worker that actually runs hooks: its index, its partition
/// and the dataset the partition refers to.
pub struct WorkerCore<S> {
    index: usize,
    partition: Partition,
    data: Arc<DataSets<S>>,
}

impl<S> WorkerCore<S> {
    pub fn new(index: usize, partition: Partition, data: Arc<DataSets<S>>) -> Self {
        Self {
            index,
            partition,
            data,
        }
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Replaces the partition and the dataset it refers to.
    pub fn reassign(&mut self, partition: Partition, data: Arc<DataSets<S>>) {
        self.partition = partition;
        self.data = data;
    }

    /// Runs the single hook matching `task`. Idle tasks do nothing.
    pub fn execute<O>(
        &self,
        task: Task,
        objective: &O,
        params: &RwLock<Vec<f64>>,
    ) -> std::result::Result<(), EvaluationErr>
    where
        O: Objective<Sequence = S>,
    {
        match task {
            Task::SetParameters => {
                let params = params.read();
                objective.set_parameters_for_worker(self.index, &params)
            }
            Task::Evaluate => {
                objective.evaluate_function_for_worker(self.index, &self.data, &self.partition)
            }
            Task::EvaluateGradient => {
                objective.evaluate_gradient_for_worker(self.index, &self.data, &self.partition)
            }
            Task::Wait | Task::Stop => Ok(()),
        }
    }

    /// Like `execute`, but a panicking hook is reported as a failure
    /// instead of unwinding through the caller.
    pub fn execute_guarded<O>(
        &self,
        task: Task,
        objective: &O,
        params: &RwLock<Vec<f64>>,
    ) -> std::result::Result<(), EvaluationErr>
    where
        O: Objective<Sequence = S>,
    {
        panic::catch_unwind(AssertUnwindSafe(|| self.execute(task, objective, params)))
            .unwrap_or_else(|payload| Err(EvaluationErr::Panicked(panic_message(payload))))
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// The orchestrator's end of one long-lived worker thread.
pub struct WorkerHandle<S> {
    index: usize,
    task: Task,
    inbox: Sender<Command<S>>,
    thread: Option<JoinHandle<()>>,
}

impl<S: Send + Sync + 'static> WorkerHandle<S> {
    /// Starts a worker thread parked in `Task::Wait`.
    ///
    /// # Args
    /// * `core` - The worker's index, partition and data.
    /// * `objective` - The hooks every worker shares.
    /// * `params` - The shared parameter buffer, only read by the worker.
    /// * `done` - Where the worker reports a `Completion` after each task.
    ///
    /// # Errors
    /// The `io::Error` raised by the OS if the thread can't be spawned.
    pub fn spawn<O>(
        core: WorkerCore<S>,
        objective: Arc<O>,
        params: Arc<RwLock<Vec<f64>>>,
        done: Sender<Completion>,
    ) -> io::Result<Self>
    where
        O: Objective<Sequence = S>,
    {
        let index = core.index;
        let (inbox, rx) = communication::inbox();

        let thread = thread::Builder::new()
            .name(format!("worker thread {index}"))
            .spawn(move || run(core, &*objective, &params, rx, done))?;

        Ok(Self {
            index,
            task: Task::Wait,
            inbox,
            thread: Some(thread),
        })
    }
}

impl<S> WorkerHandle<S> {
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn is_waiting(&self) -> bool {
        self.task == Task::Wait
    }

    /// Wakes the worker with an active task.
    ///
    /// # Errors
    /// `EvaluatorErr::Disconnected` if the worker thread is gone.
    pub fn dispatch(&mut self, task: Task) -> Result<()> {
        debug_assert!(task.is_active(), "only active tasks are dispatched");
        debug_assert!(self.is_waiting(), "worker {} is busy", self.index);

        self.inbox
            .send(Command::Run(task))
            .map_err(|_| EvaluatorErr::Disconnected)?;

        self.task = task;
        Ok(())
    }

    /// Records that the worker reported back and is idle again.
    pub fn complete(&mut self) {
        self.task = Task::Wait;
    }

    /// Hands the worker a new partition. The worker must be idle.
    pub fn reassign(&mut self, partition: Partition, data: Arc<DataSets<S>>) -> Result<()> {
        self.inbox
            .send(Command::Reassign { partition, data })
            .map_err(|_| EvaluatorErr::Disconnected)
    }

    /// Asks the worker to leave its loop once its current task is done.
    pub fn stop(&mut self) {
        // A closed inbox means the thread already left its loop.
        let _ = self.inbox.send(Command::Stop);
        self.task = Task::Stop;
    }

    /// Waits for the worker thread to exit.
    pub fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!(worker = self.index; "worker thread panicked outside of a task");
            }
        }
    }
}

fn run<S, O>(
    mut core: WorkerCore<S>,
    objective: &O,
    params: &RwLock<Vec<f64>>,
    inbox: Receiver<Command<S>>,
    done: Sender<Completion>,
) where
    O: Objective<Sequence = S>,
{
    let worker = core.index;
    debug!(worker = worker; "worker thread started");

    while let Ok(command) = inbox.recv() {
        match command {
            Command::Run(task) => {
                let outcome = core.execute_guarded(task, objective, params);

                if let Err(e) = &outcome {
                    warn!(worker = worker; "{task} failed: {e}");
                }

                let completion = Completion {
                    worker,
                    task,
                    outcome,
                };

                if done.send(completion).is_err() {
                    debug!(worker = worker; "orchestrator is gone, leaving");
                    break;
                }
            }
            Command::Reassign { partition, data } => {
                debug!(worker = worker; "reassigned to {partition:?}");
                core.reassign(partition, data);
            }
            Command::Stop => break,
        }
    }

    debug!(worker = worker; "worker thread stopped");
}
