pub mod assistant;
pub mod clock;
pub mod config;
pub mod error;
pub mod household;
pub mod models;
pub mod simulator;
pub mod store;
