use std::{mem, sync::Arc};

use crossbeam::channel::Receiver;
use log::{debug, error, info};
use parking_lot::RwLock;

use super::{
    communication::{self, Completion, Task},
    error::{ConfigErr, EvaluatorErr, Result},
    partition::{self, Partition},
    worker::{WorkerCore, WorkerHandle},
};
use crate::{
    config::EvaluatorConfig,
    data::DataSets,
    objective::{DifferentiableFunction, Objective},
};

enum Pool<S> {
    /// A single worker runs on the caller's thread, no synchronization needed.
    Inline(WorkerCore<S>),
    Threaded {
        workers: Vec<WorkerHandle<S>>,
        completions: Receiver<Completion>,
    },
    Stopped,
}

/// Evaluates an `Objective` and its gradient over a partitioned dataset using
/// a fixed pool of long-lived worker threads.
///
/// Every public call blocks the caller until all workers are done with the
/// round. If any worker fails, the whole pool is torn down and every later
/// call returns `EvaluatorErr::Stopped`.
pub struct Orchestrator<O: Objective> {
    objective: Arc<O>,
    params: Arc<RwLock<Vec<f64>>>,
    data: Arc<DataSets<O::Sequence>>,
    partitions: Vec<Partition>,
    threads: usize,
    pool: Pool<O::Sequence>,
}

impl<O: Objective> Orchestrator<O> {
    /// Creates a new `Orchestrator` and starts its workers.
    ///
    /// # Args
    /// * `threads` - The amount of workers. With `1` everything runs on the caller's thread.
    /// * `objective` - The per-partition hooks.
    /// * `data` - The class datasets to split among the workers.
    ///
    /// # Errors
    /// `EvaluatorErr::Config` if `threads` is zero or the data can't be split
    /// among that many workers, `EvaluatorErr::Spawn` if a thread can't be started.
    pub fn new(threads: usize, mut objective: O, data: DataSets<O::Sequence>) -> Result<Self> {
        if threads == 0 {
            return Err(ConfigErr::NoWorkers.into());
        }

        let partitions = partition::plan(data.sizes(), threads)?;
        objective.allocate_workers(threads);

        let objective = Arc::new(objective);
        let params = Arc::new(RwLock::new(Vec::new()));
        let data = Arc::new(data);

        let pool = if threads == 1 {
            Pool::Inline(WorkerCore::new(0, partitions[0], Arc::clone(&data)))
        } else {
            let (done, completions) = communication::completions(threads);
            let mut workers = Vec::with_capacity(threads);

            for (index, &partition) in partitions.iter().enumerate() {
                let core = WorkerCore::new(index, partition, Arc::clone(&data));
                let spawned = WorkerHandle::spawn(
                    core,
                    Arc::clone(&objective),
                    Arc::clone(&params),
                    done.clone(),
                );

                match spawned {
                    Ok(worker) => workers.push(worker),
                    Err(e) => {
                        error!("could not spawn worker thread {index}: {e}");
                        shutdown(&mut workers);
                        return Err(e.into());
                    }
                }
            }

            Pool::Threaded {
                workers,
                completions,
            }
        };

        info!(
            "started {threads} worker(s) over {} sequences in {} classes",
            data.total_sequences(),
            data.num_classes()
        );

        Ok(Self {
            objective,
            params,
            data,
            partitions,
            threads,
            pool,
        })
    }

    /// Creates a new `Orchestrator` with the worker count taken from `config`.
    pub fn from_config(
        config: &EvaluatorConfig,
        objective: O,
        data: DataSets<O::Sequence>,
    ) -> Result<Self> {
        Self::new(config.resolved_threads(), objective, data)
    }

    /// The configured amount of workers.
    #[inline]
    pub fn threads(&self) -> usize {
        self.threads
    }

    #[inline]
    pub fn objective(&self) -> &O {
        &self.objective
    }

    #[inline]
    pub fn data(&self) -> &DataSets<O::Sequence> {
        &self.data
    }

    /// The partition of every worker, in worker order.
    #[inline]
    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    /// A copy of the parameters of the last `set_parameters` call.
    pub fn parameters(&self) -> Vec<f64> {
        self.params.read().clone()
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self.pool, Pool::Stopped)
    }

    /// Stores `params` and applies them on every worker.
    ///
    /// The shared buffer is reused when the length doesn't change. Workers
    /// only read it while a round is running, and it is only written here,
    /// between rounds.
    ///
    /// # Errors
    /// `EvaluatorErr::Dimension` if the objective rejects the length, or a
    /// fatal error if a worker fails.
    pub fn set_parameters(&mut self, params: &[f64]) -> Result<()> {
        if self.is_stopped() {
            return Err(EvaluatorErr::Stopped);
        }

        {
            let mut buf = self.params.write();
            if buf.len() == params.len() {
                buf.copy_from_slice(params);
            } else {
                *buf = params.to_vec();
            }
        }

        self.objective.set_thread_independent_parameters(params)?;
        self.round(Task::SetParameters)
    }

    /// Evaluates the objective at `params`.
    pub fn evaluate_function(&mut self, params: &[f64]) -> Result<f64> {
        self.set_parameters(params)?;
        self.round(Task::Evaluate)?;
        self.objective.join_function().map_err(EvaluatorErr::Join)
    }

    /// Evaluates the gradient of the objective at `params`.
    pub fn evaluate_gradient(&mut self, params: &[f64]) -> Result<Vec<f64>> {
        self.set_parameters(params)?;
        self.round(Task::EvaluateGradient)?;
        self.objective.join_gradient().map_err(EvaluatorErr::Join)
    }

    /// Replaces the dataset and re-splits it among the same workers.
    ///
    /// # Errors
    /// `EvaluatorErr::Config` if the new data can't be split, which leaves
    /// the pool untouched. `EvaluatorErr::WorkerBusy` if any worker isn't
    /// idle, in which case the pool is stopped.
    pub fn set_data_and_weights(&mut self, data: DataSets<O::Sequence>) -> Result<()> {
        if self.is_stopped() {
            return Err(EvaluatorErr::Stopped);
        }

        let partitions = partition::plan(data.sizes(), self.threads)?;
        let data = Arc::new(data);

        let reassigned = match &mut self.pool {
            Pool::Inline(core) => {
                core.reassign(partitions[0], Arc::clone(&data));
                Ok(())
            }
            Pool::Threaded { workers, .. } => reassign(workers, &partitions, &data),
            Pool::Stopped => Err(EvaluatorErr::Stopped),
        };

        if let Err(e) = reassigned {
            error!("{e}, stopping the worker threads");
            self.stop_threads();
            return Err(e);
        }

        info!(
            "re-split {} sequences in {} classes among {} worker(s)",
            data.total_sequences(),
            data.num_classes(),
            self.threads
        );

        self.data = data;
        self.partitions = partitions;
        Ok(())
    }

    /// Stops every worker and waits for the threads to exit.
    ///
    /// A task already running is finished first. Calling this again is a no-op.
    pub fn stop_threads(&mut self) {
        match mem::replace(&mut self.pool, Pool::Stopped) {
            Pool::Threaded { mut workers, .. } => {
                shutdown(&mut workers);
                info!("stopped {} worker thread(s)", workers.len());
            }
            Pool::Inline(_) => info!("stopped the inline worker"),
            Pool::Stopped => {}
        }
    }

    /// Runs one round of `task` and tears the pool down on failure.
    fn round(&mut self, task: Task) -> Result<()> {
        let outcome = match &mut self.pool {
            Pool::Inline(core) => core
                .execute_guarded(task, &*self.objective, &self.params)
                .map_err(|source| EvaluatorErr::WorkerFailed {
                    worker: core.index(),
                    source,
                }),
            Pool::Threaded {
                workers,
                completions,
            } => broadcast_and_wait(workers, completions, task),
            Pool::Stopped => return Err(EvaluatorErr::Stopped),
        };

        if let Err(e) = &outcome {
            error!("{e}, stopping the worker threads");
            self.stop_threads();
        }

        outcome
    }
}

impl<O: Objective> DifferentiableFunction for Orchestrator<O> {
    fn dimension(&self) -> usize {
        self.objective.dimension()
    }

    fn evaluate_function(&mut self, params: &[f64]) -> Result<f64> {
        Orchestrator::evaluate_function(self, params)
    }

    fn evaluate_gradient(&mut self, params: &[f64]) -> Result<Vec<f64>> {
        Orchestrator::evaluate_gradient(self, params)
    }
}

impl<O: Objective> Drop for Orchestrator<O> {
    fn drop(&mut self) {
        self.stop_threads();
    }
}

/// Wakes every worker with `task` and blocks until all of them report back.
///
/// Returns at the first failed completion; the caller must not reuse the
/// workers afterwards.
fn broadcast_and_wait<S>(
    workers: &mut [WorkerHandle<S>],
    completions: &Receiver<Completion>,
    task: Task,
) -> Result<()> {
    debug!("broadcasting {task} to {} workers", workers.len());

    for worker in workers.iter_mut() {
        worker.dispatch(task)?;
    }

    let mut pending = workers.len();
    while pending > 0 {
        let Completion {
            worker,
            task: finished,
            outcome,
        } = completions.recv().map_err(|_| EvaluatorErr::Disconnected)?;

        outcome.map_err(|source| EvaluatorErr::WorkerFailed { worker, source })?;

        debug!(worker = worker; "{finished} done");
        workers[worker].complete();
        pending -= 1;
    }

    Ok(())
}

fn reassign<S>(
    workers: &mut [WorkerHandle<S>],
    partitions: &[Partition],
    data: &Arc<DataSets<S>>,
) -> Result<()> {
    // Rounds always leave workers in `Wait`; a busy worker means a broken contract.
    if let Some(busy) = workers.iter().find(|w| !w.is_waiting()) {
        return Err(EvaluatorErr::WorkerBusy {
            worker: busy.index(),
        });
    }

    for (worker, &partition) in workers.iter_mut().zip(partitions) {
        worker.reassign(partition, Arc::clone(data))?;
    }

    Ok(())
}

fn shutdown<S>(workers: &mut [WorkerHandle<S>]) {
    for worker in workers.iter_mut() {
        worker.stop();
    }

    for worker in workers.iter_mut() {
        worker.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestra::{DimensionErr, EvaluationErr};

    /// Accepts parameters of any length and computes nothing.
    struct Idle;

    impl Objective for Idle {
        type Sequence = u8;

        fn allocate_workers(&mut self, _workers: usize) {}

        fn dimension(&self) -> usize {
            2
        }

        fn set_thread_independent_parameters(
            &self,
            _params: &[f64],
        ) -> std::result::Result<(), DimensionErr> {
            Ok(())
        }

        fn set_parameters_for_worker(
            &self,
            _worker: usize,
            _params: &[f64],
        ) -> std::result::Result<(), EvaluationErr> {
            Ok(())
        }

        fn evaluate_function_for_worker(
            &self,
            _worker: usize,
            _data: &DataSets<u8>,
            _partition: &Partition,
        ) -> std::result::Result<(), EvaluationErr> {
            Ok(())
        }

        fn evaluate_gradient_for_worker(
            &self,
            _worker: usize,
            _data: &DataSets<u8>,
            _partition: &Partition,
        ) -> std::result::Result<(), EvaluationErr> {
            Ok(())
        }

        fn join_function(&self) -> std::result::Result<f64, EvaluationErr> {
            Ok(0.0)
        }

        fn join_gradient(&self) -> std::result::Result<Vec<f64>, EvaluationErr> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn parameter_buffer_is_reused_while_the_length_holds() {
        let data = DataSets::unweighted([vec![1, 2], vec![3, 4]]).unwrap();
        let mut orch = Orchestrator::new(2, Idle, data).unwrap();

        orch.set_parameters(&[1.0, 2.0]).unwrap();
        let buffer = orch.params.read().as_ptr();

        orch.set_parameters(&[3.0, 4.0]).unwrap();
        assert_eq!(orch.params.read().as_ptr(), buffer);
        assert_eq!(orch.parameters(), vec![3.0, 4.0]);

        orch.set_parameters(&[5.0, 6.0, 7.0]).unwrap();
        assert_eq!(orch.parameters(), vec![5.0, 6.0, 7.0]);
    }
}
