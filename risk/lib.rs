#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod config;
pub mod data;
pub mod estimate;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod persist;
pub mod pipeline;
pub mod preprocess;
pub mod scaler;
pub mod service;
pub mod summary;
pub mod triage;
