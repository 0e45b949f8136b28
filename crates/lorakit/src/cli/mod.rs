//! Command implementations.

pub mod config;
pub mod models;
pub mod serve;
pub mod tag;
pub mod train_config;
