//! Adaptive practice engine: attempt tracking, per-topic mastery, next-problem
//! selection and escalating hints for algorithmic exercises.

pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod services;
pub mod store;
pub mod telemetry;
pub mod utils;

pub use config::Config;
pub use error::{EngineError, EngineResult};
pub use services::PracticeEngine;
