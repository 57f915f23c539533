pub mod config;
pub mod maintenance;
pub mod models;
pub mod services;
pub mod startup;
