pub mod actors;
pub mod config;
pub mod domain;
pub mod lookup;
pub mod metrics;
pub mod service;
pub mod store;
pub mod utils;
