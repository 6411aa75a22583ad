//! The online adaptation loop.
//!
//! ```text
//! INIT -> BOOTSTRAP -> (REFIT -> SELECT -> EVALUATE -> UPDATE)* -> CONVERGED | MAX_ITER | EXHAUSTED
//! ```
//!
//! The first trial is always the best simulated entry. Afterwards the
//! discrepancy model is refitted on every observation so far, the archive
//! fitness is corrected by the predicted residual, and UCB picks the next
//! candidate. Proposing an index that was already tested ends the run.

use crate::acquisition::{bootstrap, select_ucb};
use crate::archive::{load_map, Archive, CorrectedMap};
use crate::config::AdaptationConfig;
use crate::error::{AdaptError, ArchiveError, ModelError};
use crate::evaluator::{EvalOutcome, Evaluator};
use crate::model::{DiscrepancyModel, GaussianProcess};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Real performance reached `alpha` times the best simulated fitness.
    Converged,
    /// Trial budget spent without reaching the threshold.
    MaxIter,
    /// Acquisition proposed an index that was already tested.
    Exhausted,
}

impl Termination {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Converged => "converged",
            Self::MaxIter => "max_iter",
            Self::Exhausted => "exhausted",
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, Self::Converged)
    }
}

/// Archive descriptor of a tested entry and its real-minus-simulated residual.
#[derive(Clone, Debug, PartialEq)]
pub struct Observation {
    pub descriptor: Vec<f64>,
    pub residual: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub iteration: u32,
    pub index: usize,
    /// Corrected fitness of the entry when it was selected.
    pub expected_fitness: f64,
    pub real_fitness: f64,
    /// Descriptor reported by the evaluator. Not used for training.
    pub measured_descriptor: Vec<f64>,
    pub evaluator_failed: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BestTrial {
    pub index: usize,
    pub real_fitness: f64,
}

/// Mutable per-run state. Only the owning [`AdaptationLoop`] writes it.
#[derive(Clone, Debug)]
pub struct RunState {
    iteration: u32,
    tested_order: Vec<usize>,
    tested: BTreeSet<usize>,
    observations: Vec<Observation>,
    real_performances: Vec<f64>,
    corrected: CorrectedMap,
    uncertainty: Option<Vec<f64>>,
    trials: Vec<TrialRecord>,
}

impl RunState {
    fn new(archive: &Archive) -> Self {
        Self {
            iteration: 0,
            tested_order: Vec::new(),
            tested: BTreeSet::new(),
            observations: Vec::new(),
            real_performances: Vec::new(),
            corrected: CorrectedMap::from_archive(archive),
            uncertainty: None,
            trials: Vec::new(),
        }
    }

    /// Completed trials so far.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Tested archive indices in trial order.
    pub fn tested(&self) -> &[usize] {
        &self.tested_order
    }

    pub fn is_tested(&self, index: usize) -> bool {
        self.tested.contains(&index)
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn corrected_fitness(&self) -> &[f64] {
        &self.corrected.fitness
    }

    /// Predicted variance behind the current corrected fitness, if the model
    /// has been consulted.
    pub fn uncertainty(&self) -> Option<&[f64]> {
        self.uncertainty.as_deref()
    }

    pub fn trials(&self) -> &[TrialRecord] {
        &self.trials
    }

    /// Best real trial so far; `None` until a trial has completed.
    pub fn best(&self) -> Option<BestTrial> {
        let mut best: Option<BestTrial> = None;
        for (&index, &real_fitness) in self.tested_order.iter().zip(&self.real_performances) {
            match best {
                Some(current) if real_fitness <= current.real_fitness => {}
                _ => {
                    best = Some(BestTrial {
                        index,
                        real_fitness,
                    })
                }
            }
        }
        best
    }
}

#[derive(Clone, Debug)]
pub struct RunResult {
    pub termination: Termination,
    pub iterations_used: u32,
    /// `None` when the run ended before any trial completed.
    pub best: Option<BestTrial>,
    pub threshold: f64,
    pub corrected_map: CorrectedMap,
    pub trials: Vec<TrialRecord>,
}

impl RunResult {
    pub fn best_index(&self) -> Option<usize> {
        self.best.map(|b| b.index)
    }

    pub fn best_real_fitness(&self) -> Option<f64> {
        self.best.map(|b| b.real_fitness)
    }
}

pub struct AdaptationLoop<'a, M> {
    archive: &'a Archive,
    config: AdaptationConfig,
    model: M,
    threshold: f64,
    state: RunState,
    termination: Option<Termination>,
}

impl<'a> AdaptationLoop<'a, GaussianProcess> {
    /// Loop with the default Matérn 5/2 Gaussian-process discrepancy model.
    pub fn new(archive: &'a Archive, config: AdaptationConfig) -> Result<Self, AdaptError> {
        let model = GaussianProcess::new(&config.kernel);
        Self::with_model(archive, config, model)
    }
}

impl<'a, M: DiscrepancyModel> AdaptationLoop<'a, M> {
    pub fn with_model(
        archive: &'a Archive,
        config: AdaptationConfig,
        model: M,
    ) -> Result<Self, AdaptError> {
        config.validate()?;
        archive.validate()?;
        let best_simulated = archive
            .max_fitness()
            .ok_or(ArchiveError::Empty { what: "archive" })?;
        let threshold = config.alpha * best_simulated;

        tracing::info!(
            entries = archive.len(),
            descriptor_dim = archive.descriptor_dim(),
            controller_dim = archive.controller_dim(),
            best_simulated,
            threshold,
            max_iter = config.max_iter,
            "adaptation initialized"
        );

        Ok(Self {
            archive,
            config,
            model,
            threshold,
            state: RunState::new(archive),
            termination: None,
        })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn termination(&self) -> Option<Termination> {
        self.termination
    }

    /// Advances one SELECT/EVALUATE/UPDATE cycle.
    ///
    /// Returns the termination once the run is over; further calls are
    /// no-ops returning the same value.
    pub fn step<E: Evaluator + ?Sized>(
        &mut self,
        evaluator: &mut E,
    ) -> Result<Option<Termination>, AdaptError> {
        if let Some(done) = self.termination {
            return Ok(Some(done));
        }
        if let Some(done) = self.stop_condition() {
            return Ok(Some(self.finish(done)));
        }

        let candidate = if self.state.iteration == 0 {
            bootstrap(&self.archive.fitness)
        } else {
            self.refit()?;
            select_ucb(
                &self.state.corrected.fitness,
                self.state.uncertainty.as_deref(),
                self.config.kappa,
            )
        };

        let Some(index) = candidate else {
            tracing::warn!("no selectable candidate (all scores are NaN)");
            return Ok(Some(self.finish(Termination::Exhausted)));
        };
        if self.state.is_tested(index) {
            tracing::warn!(
                index,
                iteration = self.state.iteration,
                "acquisition re-proposed a tested entry"
            );
            return Ok(Some(self.finish(Termination::Exhausted)));
        }

        let expected_fitness = self.state.corrected.fitness[index];
        self.evaluate_and_record(index, expected_fitness, evaluator);

        match self.stop_condition() {
            Some(done) => Ok(Some(self.finish(done))),
            None => Ok(None),
        }
    }

    /// Steps until the run terminates.
    pub fn run<E: Evaluator + ?Sized>(mut self, evaluator: &mut E) -> Result<RunResult, AdaptError> {
        loop {
            if self.step(evaluator)?.is_some() {
                return Ok(self.into_result());
            }
        }
    }

    fn into_result(self) -> RunResult {
        let best = self.state.best();
        RunResult {
            termination: self.termination.unwrap_or(Termination::MaxIter),
            iterations_used: self.state.iteration,
            best,
            threshold: self.threshold,
            corrected_map: self.state.corrected,
            trials: self.state.trials,
        }
    }

    fn stop_condition(&self) -> Option<Termination> {
        if let Some(best) = self.state.best() {
            if best.real_fitness >= self.threshold {
                return Some(Termination::Converged);
            }
        }
        if self.state.iteration >= self.config.max_iter {
            return Some(Termination::MaxIter);
        }
        None
    }

    fn finish(&mut self, termination: Termination) -> Termination {
        self.termination = Some(termination);
        let best = self.state.best();
        tracing::info!(
            termination = termination.as_str(),
            iterations = self.state.iteration,
            best_index = best.map(|b| b.index),
            best_real_fitness = best.map(|b| b.real_fitness),
            "adaptation finished"
        );
        termination
    }

    /// Full refit on every observation, then recompute corrected fitness.
    fn refit(&mut self) -> Result<(), AdaptError> {
        let observed = self.state.observations.len();
        if observed < self.config.min_observations {
            self.state
                .corrected
                .fitness
                .copy_from_slice(&self.archive.fitness);
            self.state.uncertainty = None;
            return Ok(());
        }

        let (inputs, residuals): (Vec<Vec<f64>>, Vec<f64>) = self
            .state
            .observations
            .iter()
            .map(|obs| (obs.descriptor.clone(), obs.residual))
            .unzip();
        self.model.fit(&inputs, &residuals)?;
        let prediction = self.model.predict(&self.archive.descriptors)?;

        let n = self.archive.len();
        for found in [prediction.mean.len(), prediction.variance.len()] {
            if found != n {
                return Err(ModelError::PredictionLength { expected: n, found }.into());
            }
        }

        let corrected = &mut self.state.corrected.fitness;
        for ((slot, simulated), residual) in corrected
            .iter_mut()
            .zip(&self.archive.fitness)
            .zip(&prediction.mean)
        {
            *slot = simulated + residual;
        }
        self.state.uncertainty = Some(prediction.variance);

        tracing::debug!(
            observations = observed,
            predicted = n,
            "discrepancy model refitted"
        );
        Ok(())
    }

    fn evaluate_and_record<E: Evaluator + ?Sized>(
        &mut self,
        index: usize,
        expected_fitness: f64,
        evaluator: &mut E,
    ) {
        let iteration = self.state.iteration + 1;
        let dim = self.archive.descriptor_dim();
        let neutral = || (0.0, vec![0.0; dim], true);

        let (real_fitness, measured_descriptor, evaluator_failed) =
            match evaluator.evaluate(&self.archive.controllers[index]) {
                EvalOutcome::Completed {
                    fitness,
                    descriptor,
                } if fitness.is_finite() => {
                    let descriptor: Vec<f64> = descriptor
                        .into_iter()
                        .map(|v| if v.is_finite() { v } else { 0.0 })
                        .collect();
                    (fitness, descriptor, false)
                }
                EvalOutcome::Completed { fitness, .. } => {
                    tracing::warn!(
                        iteration,
                        index,
                        fitness,
                        "evaluator returned non-finite fitness; using neutral result"
                    );
                    neutral()
                }
                EvalOutcome::Failed { reason } => {
                    tracing::warn!(iteration, index, %reason, "evaluator failed; using neutral result");
                    neutral()
                }
            };

        let simulated = self.archive.fitness[index];
        self.state.tested_order.push(index);
        self.state.tested.insert(index);
        self.state.observations.push(Observation {
            descriptor: self.archive.descriptors[index].clone(),
            residual: real_fitness - simulated,
        });
        self.state.real_performances.push(real_fitness);
        self.state.iteration = iteration;

        tracing::info!(
            iteration,
            index,
            expected_fitness,
            real_fitness,
            "trial completed"
        );

        self.state.trials.push(TrialRecord {
            iteration,
            index,
            expected_fitness,
            real_fitness,
            measured_descriptor,
            evaluator_failed,
        });
    }
}

/// Loads the archive and centroids, checks their dimensions, and runs the
/// loop with the default discrepancy model.
pub fn run_adaptation<E: Evaluator + ?Sized>(
    archive_path: &Path,
    centroids_path: &Path,
    controller_dim: usize,
    config: AdaptationConfig,
    evaluator: &mut E,
) -> Result<RunResult, AdaptError> {
    config.validate()?;
    let (archive, _centroids) = load_map(archive_path, centroids_path, controller_dim)?;
    AdaptationLoop::new(&archive, config)?.run(evaluator)
}
