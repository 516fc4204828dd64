//! Promotion of accepted models to the production key.

pub mod lock;
pub mod pusher;

pub use lock::PromotionLock;
pub use pusher::ModelPusher;
