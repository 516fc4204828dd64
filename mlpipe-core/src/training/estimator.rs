//! Estimators: anything that can be fitted on a feature matrix and predict classes.

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Fit/predict capability the pipeline relies on.
pub trait Estimator {
    /// Fit on rows of features and 0/1 targets.
    fn fit(&mut self, features: &[Vec<f64>], targets: &[f64]) -> Result<(), ModelError>;

    /// Predict a class code (0 or 1) per row.
    fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<i64>, ModelError>;

    /// Type name used when displaying a model.
    fn name(&self) -> &'static str;
}

/// L2-regularised binary logistic regression fitted by batch gradient descent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub learning_rate: f64,
    pub epochs: usize,
    pub l2: f64,
    #[serde(default)]
    pub weights: Vec<f64>,
    #[serde(default)]
    pub bias: f64,
}

impl LogisticRegression {
    pub fn new(learning_rate: f64, epochs: usize, l2: f64) -> Self {
        Self {
            learning_rate,
            epochs,
            l2,
            weights: Vec::new(),
            bias: 0.0,
        }
    }

    pub fn is_fitted(&self) -> bool {
        !self.weights.is_empty()
    }

    /// Probability of class 1 per row.
    pub fn predict_proba(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        if !self.is_fitted() {
            return Err(ModelError::prediction("estimator has not been fitted"));
        }
        features
            .iter()
            .enumerate()
            .map(|(i, row)| {
                if row.len() != self.weights.len() {
                    return Err(ModelError::prediction(format!(
                        "row {i} has {} features, model expects {}",
                        row.len(),
                        self.weights.len()
                    )));
                }
                Ok(sigmoid(dot(&self.weights, row) + self.bias))
            })
            .collect()
    }
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new(0.1, 300, 0.001)
    }
}

impl Estimator for LogisticRegression {
    fn fit(&mut self, features: &[Vec<f64>], targets: &[f64]) -> Result<(), ModelError> {
        if features.is_empty() {
            return Err(ModelError::prediction("cannot fit on an empty training set"));
        }
        if features.len() != targets.len() {
            return Err(ModelError::prediction(format!(
                "{} feature rows but {} targets",
                features.len(),
                targets.len()
            )));
        }
        if let Some(bad) = targets.iter().find(|t| **t != 0.0 && **t != 1.0) {
            return Err(ModelError::prediction(format!(
                "targets must be 0 or 1, found {bad}"
            )));
        }
        let width = features[0].len();
        if let Some(i) = features.iter().position(|row| row.len() != width) {
            return Err(ModelError::prediction(format!(
                "row {i} has {} features, expected {width}",
                features[i].len()
            )));
        }

        let n = features.len() as f64;
        let mut weights = vec![0.0; width];
        let mut bias = 0.0;
        let mut grad_w = vec![0.0; width];
        for _ in 0..self.epochs {
            grad_w.iter_mut().for_each(|g| *g = 0.0);
            let mut grad_b = 0.0;
            for (row, target) in features.iter().zip(targets) {
                let err = sigmoid(dot(&weights, row) + bias) - target;
                for (g, x) in grad_w.iter_mut().zip(row) {
                    *g += err * x;
                }
                grad_b += err;
            }
            for (w, g) in weights.iter_mut().zip(&grad_w) {
                *w -= self.learning_rate * (g / n + self.l2 * *w);
            }
            bias -= self.learning_rate * grad_b / n;
        }

        // A zero-width model still needs a non-empty weight vector to count as fitted.
        self.weights = if width == 0 { vec![0.0] } else { weights };
        self.bias = bias;
        Ok(())
    }

    fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<i64>, ModelError> {
        Ok(self
            .predict_proba(features)?
            .into_iter()
            .map(|p| i64::from(p >= 0.5))
            .collect())
    }

    fn name(&self) -> &'static str {
        "LogisticRegression"
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Serializable description of a fitted estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EstimatorDescriptor {
    LogisticRegression(LogisticRegression),
}

impl EstimatorDescriptor {
    pub fn as_estimator(&self) -> &dyn Estimator {
        match self {
            Self::LogisticRegression(model) => model,
        }
    }
}
