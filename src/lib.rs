pub mod agents;
pub mod cli;
pub mod config;
pub mod controller;
pub mod doctor;
pub mod error;
pub mod interactive;
pub mod provider;
pub mod report;
pub mod retry;
pub mod search;
pub mod tasks;
pub mod telemetry;
pub mod theme;
pub mod workflow;
