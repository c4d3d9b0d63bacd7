//! Parallel execution of independent what-if scenarios.

use std::sync::{Mutex, mpsc};
use std::thread;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use stockcast_engine::{
    EngineResult, ForecastResult, InventoryPolicy, Scenario, ScenarioExecution, ScenarioSimulator,
    StandardizedDistribution,
};

/// One scenario together with the baseline snapshot it perturbs.
#[derive(Debug, Clone)]
pub struct ScenarioJob<'a> {
    pub scenario: Scenario,
    pub baseline_forecast: &'a ForecastResult,
    pub baseline_policy: &'a InventoryPolicy,
}

impl<'a> ScenarioJob<'a> {
    pub fn new(
        scenario: Scenario,
        baseline_forecast: &'a ForecastResult,
        baseline_policy: &'a InventoryPolicy,
    ) -> Self {
        Self {
            scenario,
            baseline_forecast,
            baseline_policy,
        }
    }
}

/// Bounded pool of scoped worker threads fed from a shared job queue.
#[derive(Debug, Clone)]
pub struct ScenarioBatchRunner {
    workers: usize,
}

impl Default for ScenarioBatchRunner {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

impl ScenarioBatchRunner {
    /// `workers` is clamped to at least one.
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Execute every job, returning outcomes in job order.
    ///
    /// Jobs share nothing but read-only baselines, so the outcome of each is
    /// the same as running it alone.
    pub fn run<D: StandardizedDistribution>(
        &self,
        simulator: &ScenarioSimulator<D>,
        jobs: Vec<ScenarioJob<'_>>,
        at: DateTime<Utc>,
    ) -> Vec<EngineResult<ScenarioExecution>> {
        let total = jobs.len();
        if total == 0 {
            return Vec::new();
        }
        let workers = self.workers.min(total);
        info!(jobs = total, workers, "scenario batch started");

        let (job_tx, job_rx) = mpsc::channel();
        for job in jobs.into_iter().enumerate() {
            // The receiver is alive until the scope below ends.
            let _ = job_tx.send(job);
        }
        drop(job_tx);
        let job_rx = Mutex::new(job_rx);
        let (out_tx, out_rx) = mpsc::channel();

        thread::scope(|scope| {
            for worker in 0..workers {
                let job_rx = &job_rx;
                let out_tx = out_tx.clone();
                scope.spawn(move || {
                    loop {
                        let next = match job_rx.lock() {
                            Ok(rx) => rx.recv(),
                            Err(_) => break,
                        };
                        let Ok((index, job)) = next else { break };

                        debug!(worker, scenario_id = %job.scenario.id_typed(), "running scenario");
                        let execution = simulator.execute(
                            &job.scenario,
                            job.baseline_forecast,
                            job.baseline_policy,
                            at,
                        );
                        if out_tx.send((index, execution)).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(out_tx);

        let mut slots: Vec<Option<EngineResult<ScenarioExecution>>> =
            (0..total).map(|_| None).collect();
        for (index, execution) in out_rx {
            slots[index] = Some(execution);
        }

        let outcomes: Vec<_> = slots.into_iter().flatten().collect();
        let failed = outcomes
            .iter()
            .filter(|o| !matches!(o, Ok(ScenarioExecution { outcome: Ok(_), .. })))
            .count();
        if failed > 0 {
            warn!(jobs = total, failed, "scenario batch finished with failures");
        } else {
            info!(jobs = total, "scenario batch finished");
        }
        outcomes
    }
}
