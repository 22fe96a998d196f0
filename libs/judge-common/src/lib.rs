pub mod config;
pub mod queue;
pub mod redis;
pub mod types;
