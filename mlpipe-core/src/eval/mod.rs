//! Comparison of a freshly trained model against production.

pub mod evaluate;

pub use evaluate::{EvaluateModelResponse, ModelEvaluation};
