pub mod cluster;
pub mod commands;
pub mod config;
pub mod gitops;
pub mod telemetry;
pub mod value;
pub mod yaml;
