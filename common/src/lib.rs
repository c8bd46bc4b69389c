// Core library of the SQL composer service: template model, token system,
// query composer, execution orchestrator and their supporting layers

pub mod composer;
pub mod config;
pub mod db;
pub mod dictionary;
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod target;
pub mod telemetry;
pub mod template;
pub mod token;
