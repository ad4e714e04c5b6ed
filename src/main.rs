use std::env;

use anyhow::Context;
use log::{debug, info};
use parking_lot::Mutex;

use parallel_objective::{
    ClassData, DataSets, DifferentiableFunction, DimensionErr, EvaluationErr, EvaluatorConfig,
    Objective, Orchestrator, Partition,
};

const CLASSES: usize = 4;
const SEQUENCES_PER_CLASS: usize = 2_500;
const MAX_ITERATIONS: usize = 100;
const STEP: f64 = 1.0;
const TOLERANCE: f64 = 1e-12;

#[derive(Default)]
struct Scratch {
    means: Vec<f64>,
    value: f64,
    gradient: Vec<f64>,
}

/// Weighted mean squared error of every class around its own mean parameter.
///
/// `f(m) = sum_c sum_i w_ci (x_ci - m_c)^2 / (2 W)` where `W` is the total weight.
struct SquaredError {
    classes: usize,
    norm: f64,
    scratch: Vec<Mutex<Scratch>>,
}

impl SquaredError {
    fn new(classes: usize, norm: f64) -> Self {
        Self {
            classes,
            norm,
            scratch: Vec::new(),
        }
    }

    fn slot(&self, worker: usize) -> Result<&Mutex<Scratch>, EvaluationErr> {
        self.scratch
            .get(worker)
            .ok_or_else(|| EvaluationErr::failed(format!("no scratch for worker {worker}")))
    }
}

impl Objective for SquaredError {
    type Sequence = f64;

    fn allocate_workers(&mut self, workers: usize) {
        self.scratch = (0..workers).map(|_| Mutex::default()).collect();
    }

    fn dimension(&self) -> usize {
        self.classes
    }

    fn set_thread_independent_parameters(&self, params: &[f64]) -> Result<(), DimensionErr> {
        if params.len() != self.classes {
            return Err(DimensionErr::new(params.len(), self.classes));
        }

        Ok(())
    }

    fn set_parameters_for_worker(
        &self,
        worker: usize,
        params: &[f64],
    ) -> Result<(), EvaluationErr> {
        let mut scratch = self.slot(worker)?.lock();
        scratch.means.clear();
        scratch.means.extend_from_slice(params);
        Ok(())
    }

    fn evaluate_function_for_worker(
        &self,
        worker: usize,
        data: &DataSets<f64>,
        partition: &Partition,
    ) -> Result<(), EvaluationErr> {
        let mut scratch = self.slot(worker)?.lock();
        let mut value = 0.0;

        for (class, range) in partition.ranges(data.sizes()) {
            let class_data = data.class(class);
            let mean = scratch.means[class];

            for i in range {
                let d = class_data.sequences()[i] - mean;
                value += class_data.weights()[i] * d * d;
            }
        }

        scratch.value = value / (2.0 * self.norm);
        Ok(())
    }

    fn evaluate_gradient_for_worker(
        &self,
        worker: usize,
        data: &DataSets<f64>,
        partition: &Partition,
    ) -> Result<(), EvaluationErr> {
        let mut scratch = self.slot(worker)?.lock();
        let mut gradient = vec![0.0; self.classes];

        for (class, range) in partition.ranges(data.sizes()) {
            let class_data = data.class(class);
            let mean = scratch.means[class];

            for i in range {
                gradient[class] += class_data.weights()[i] * (mean - class_data.sequences()[i]);
            }
        }

        gradient.iter_mut().for_each(|g| *g /= self.norm);
        scratch.gradient = gradient;
        Ok(())
    }

    fn join_function(&self) -> Result<f64, EvaluationErr> {
        Ok(self.scratch.iter().map(|s| s.lock().value).sum())
    }

    fn join_gradient(&self) -> Result<Vec<f64>, EvaluationErr> {
        let mut gradient = vec![0.0; self.classes];

        for slot in &self.scratch {
            for (acc, g) in gradient.iter_mut().zip(&slot.lock().gradient) {
                *acc += g;
            }
        }

        Ok(gradient)
    }
}

fn synthetic_data() -> anyhow::Result<DataSets<f64>> {
    let classes = (0..CLASSES)
        .map(|c| {
            let sequences = (0..SEQUENCES_PER_CLASS)
                .map(|i| c as f64 * 10.0 + (i % 17) as f64 * 0.25)
                .collect();
            let weights = (0..SEQUENCES_PER_CLASS)
                .map(|i| 1.0 + (i % 3) as f64)
                .collect();
            ClassData::weighted(sequences, weights)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(DataSets::new(classes)?)
}

/// Plain fixed-step steepest descent.
fn steepest_descent<F: DifferentiableFunction>(
    f: &mut F,
    start: Vec<f64>,
) -> anyhow::Result<Vec<f64>> {
    let mut params = start;

    for iteration in 0..MAX_ITERATIONS {
        let gradient = f.evaluate_gradient(&params)?;
        let norm = gradient.iter().map(|g| g * g).sum::<f64>().sqrt();

        let value = f.evaluate_function(&params)?;
        info!("iteration {iteration}: f={value:.6} |grad|={norm:.3e}");

        if norm < TOLERANCE {
            break;
        }

        for (p, g) in params.iter_mut().zip(&gradient) {
            *p -= STEP * g;
        }
    }

    Ok(params)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut config = match env::args().nth(1) {
        Some(path) => EvaluatorConfig::from_path(&path)
            .with_context(|| format!("loading configuration from {path}"))?,
        None => EvaluatorConfig::default(),
    };

    if let Ok(threads) = env::var("THREADS") {
        let threads = threads.parse().context("THREADS must be a number")?;
        config.threads = Some(threads);
    }

    let data = synthetic_data()?;
    let objective = SquaredError::new(data.num_classes(), data.total_weight());
    let mut orchestrator = Orchestrator::from_config(&config, objective, data)?;

    info!("evaluating with {} worker(s)", orchestrator.threads());
    for (worker, partition) in orchestrator.partitions().iter().enumerate() {
        debug!(worker = worker; "partition {partition:?}");
    }

    let start = vec![0.0; orchestrator.dimension()];
    let means = steepest_descent(&mut orchestrator, start)?;
    info!("estimated class means: {means:?}");

    orchestrator.stop_threads();
    Ok(())
}
