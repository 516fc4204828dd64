//! Model resolution and prediction.

pub mod predict;
pub mod resolve;

pub use predict::{PredictionRequest, PredictionService, RemoteEstimator};
pub use resolve::resolve_latest_model;
