//! Discrepancy model: regression of (real − simulated) fitness over
//! descriptor space.
//!
//! The default model is a zero-mean Gaussian process with a Matérn 5/2
//! kernel plus a white-noise term. Hyperparameters come from
//! [`KernelConfig`] and are not optimized. Every call to
//! [`DiscrepancyModel::fit`] rebuilds the model from the full observation set.

use crate::config::KernelConfig;
use crate::error::ModelError;
use nalgebra::{linalg::Cholesky, DMatrix, DVector, Dyn};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Prediction {
    pub mean: Vec<f64>,
    pub variance: Vec<f64>,
}

/// Any regressor exposing `fit(X, Y)` / `predict(D) -> (mean, variance)`.
pub trait DiscrepancyModel {
    fn fit(&mut self, inputs: &[Vec<f64>], residuals: &[f64]) -> Result<(), ModelError>;
    fn predict(&self, points: &[Vec<f64>]) -> Result<Prediction, ModelError>;
}

/// Isotropic Matérn 5/2 kernel.
///
/// `k(r) = σ² (1 + √5 r/ρ + 5/3 (r/ρ)²) exp(-√5 r/ρ)`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Matern52 {
    pub length_scale: f64,
    pub signal_variance: f64,
}

impl Matern52 {
    pub fn eval(&self, a: &[f64], b: &[f64]) -> f64 {
        let r_sq: f64 = a
            .iter()
            .zip(b)
            .map(|(x, y)| {
                let diff = (x - y) / self.length_scale;
                diff * diff
            })
            .sum();
        let sqrt5_r = (5.0 * r_sq).sqrt();
        self.signal_variance * (1.0 + sqrt5_r + 5.0 / 3.0 * r_sq) * (-sqrt5_r).exp()
    }
}

struct Posterior {
    cholesky: Cholesky<f64, Dyn>,
    /// (K + σₙ²I)⁻¹ y
    weights: DVector<f64>,
    inputs: Vec<Vec<f64>>,
}

pub struct GaussianProcess {
    kernel: Matern52,
    noise_variance: f64,
    posterior: Option<Posterior>,
}

impl GaussianProcess {
    pub fn new(config: &KernelConfig) -> Self {
        Self {
            kernel: Matern52 {
                length_scale: config.length_scale,
                signal_variance: config.signal_variance,
            },
            noise_variance: config.noise_variance,
            posterior: None,
        }
    }

    pub fn observation_count(&self) -> usize {
        self.posterior.as_ref().map_or(0, |p| p.inputs.len())
    }

    fn covariance(&self, inputs: &[Vec<f64>]) -> DMatrix<f64> {
        let n = inputs.len();
        DMatrix::from_fn(n, n, |i, j| {
            let k = self.kernel.eval(&inputs[i], &inputs[j]);
            if i == j {
                k + self.noise_variance
            } else {
                k
            }
        })
    }
}

impl DiscrepancyModel for GaussianProcess {
    fn fit(&mut self, inputs: &[Vec<f64>], residuals: &[f64]) -> Result<(), ModelError> {
        self.posterior = None;
        if inputs.len() != residuals.len() {
            return Err(ModelError::LengthMismatch {
                inputs: inputs.len(),
                targets: residuals.len(),
            });
        }
        let dim = inputs.first().map(Vec::len).ok_or(ModelError::NoObservations)?;
        check_points(inputs, dim, "training inputs")?;
        if residuals.iter().any(|y| !y.is_finite()) {
            return Err(ModelError::NonFinite { what: "residuals" });
        }

        let size = inputs.len();
        let cholesky =
            Cholesky::new(self.covariance(inputs)).ok_or(ModelError::IllConditioned { size })?;
        let weights = cholesky.solve(&DVector::from_column_slice(residuals));
        if weights.iter().any(|w| !w.is_finite()) {
            return Err(ModelError::IllConditioned { size });
        }

        self.posterior = Some(Posterior {
            cholesky,
            weights,
            inputs: inputs.to_vec(),
        });
        Ok(())
    }

    fn predict(&self, points: &[Vec<f64>]) -> Result<Prediction, ModelError> {
        let posterior = self.posterior.as_ref().ok_or(ModelError::NotFitted)?;
        let dim = posterior.inputs[0].len();
        check_points(points, dim, "prediction points")?;

        let prior_variance = self.kernel.signal_variance + self.noise_variance;
        let mut prediction = Prediction {
            mean: Vec::with_capacity(points.len()),
            variance: Vec::with_capacity(points.len()),
        };
        for point in points {
            let k_star = DVector::from_iterator(
                posterior.inputs.len(),
                posterior.inputs.iter().map(|x| self.kernel.eval(point, x)),
            );
            let mean = k_star.dot(&posterior.weights);
            let v = posterior.cholesky.solve(&k_star);
            let variance = (prior_variance - k_star.dot(&v)).max(0.0);
            if !(mean.is_finite() && variance.is_finite()) {
                return Err(ModelError::NonFinite { what: "prediction" });
            }
            prediction.mean.push(mean);
            prediction.variance.push(variance);
        }
        Ok(prediction)
    }
}

fn check_points(points: &[Vec<f64>], dim: usize, what: &'static str) -> Result<(), ModelError> {
    for point in points {
        if point.len() != dim {
            return Err(ModelError::DimensionMismatch {
                expected: dim,
                found: point.len(),
            });
        }
        if point.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::NonFinite { what });
        }
    }
    Ok(())
}
