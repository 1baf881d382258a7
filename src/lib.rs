#[macro_use]
pub mod clitypes;

pub mod api;
pub mod cmd;
pub mod config;
pub mod files;
pub mod models;
pub mod repository;
pub mod util;

pub use clitypes::{CliError, CliResult};
