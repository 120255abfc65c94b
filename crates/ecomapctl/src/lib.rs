//! Ecomapctl library - exposes CLI modules for integration tests

pub mod cli;
pub mod commands;
pub mod errors;
pub mod logging;
pub mod report;
