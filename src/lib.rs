#![forbid(unsafe_code)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod formats;
pub mod generate;
pub mod library;
pub mod logging;
pub mod manifest;
pub mod progress;
pub mod queue;
pub mod store;
