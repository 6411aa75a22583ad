//! Boundary to the costly real trial.
//!
//! Evaluators report failure through [`EvalOutcome::Failed`] instead of
//! erroring; the adaptation loop turns that into the neutral result.

use crate::archive::{load_archive, ArchiveLayout};
use crate::error::ArchiveError;
use std::collections::HashMap;
use std::path::Path;

#[derive(Clone, Debug, PartialEq)]
pub enum EvalOutcome {
    Completed { fitness: f64, descriptor: Vec<f64> },
    Failed { reason: String },
}

/// Executes one controller and measures it. Blocking; never cancelled.
pub trait Evaluator {
    fn evaluate(&mut self, controller: &[f64]) -> EvalOutcome;
}

impl<F> Evaluator for F
where
    F: FnMut(&[f64]) -> EvalOutcome,
{
    fn evaluate(&mut self, controller: &[f64]) -> EvalOutcome {
        self(controller)
    }
}

/// Replays recorded real outcomes, keyed by exact controller parameters.
#[derive(Clone, Debug, Default)]
pub struct TableEvaluator {
    outcomes: HashMap<Vec<u64>, (f64, Vec<f64>)>,
}

impl TableEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, controller: &[f64], fitness: f64, descriptor: Vec<f64>) {
        self.outcomes
            .insert(controller_key(controller), (fitness, descriptor));
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Reads a table in archive layout: each row's fitness and descriptor are
    /// the real outcome of its controller.
    pub fn load(path: &Path, layout: ArchiveLayout) -> Result<Self, ArchiveError> {
        let table = load_archive(path, layout)?;
        let mut evaluator = Self::new();
        for ((fitness, descriptor), controller) in table
            .fitness
            .into_iter()
            .zip(table.descriptors)
            .zip(&table.controllers)
        {
            evaluator.insert(controller, fitness, descriptor);
        }
        Ok(evaluator)
    }
}

impl Evaluator for TableEvaluator {
    fn evaluate(&mut self, controller: &[f64]) -> EvalOutcome {
        match self.outcomes.get(&controller_key(controller)) {
            Some((fitness, descriptor)) => EvalOutcome::Completed {
                fitness: *fitness,
                descriptor: descriptor.clone(),
            },
            None => EvalOutcome::Failed {
                reason: "no recorded outcome for controller".to_string(),
            },
        }
    }
}

fn controller_key(controller: &[f64]) -> Vec<u64> {
    // -0.0 and 0.0 describe the same controller.
    controller
        .iter()
        .map(|v| if *v == 0.0 { 0 } else { v.to_bits() })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_evaluators() {
        let mut calls = 0;
        let mut eval = |controller: &[f64]| {
            calls += 1;
            EvalOutcome::Completed {
                fitness: controller.iter().sum(),
                descriptor: vec![0.0],
            }
        };
        let outcome = eval.evaluate(&[1.0, 2.0]);
        assert_eq!(
            outcome,
            EvalOutcome::Completed {
                fitness: 3.0,
                descriptor: vec![0.0]
            }
        );
        assert_eq!(calls, 1);
    }

    #[test]
    fn table_lookup_is_exact() {
        let mut table = TableEvaluator::new();
        table.insert(&[0.0, 1.5], 2.0, vec![0.25]);
        assert_eq!(
            table.evaluate(&[-0.0, 1.5]),
            EvalOutcome::Completed {
                fitness: 2.0,
                descriptor: vec![0.25]
            }
        );
        assert!(matches!(
            table.evaluate(&[0.0, 1.5000001]),
            EvalOutcome::Failed { .. }
        ));
    }
}
