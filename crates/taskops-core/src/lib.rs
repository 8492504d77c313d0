//! `taskops-core`: shared vocabulary for the taskops scheduler.
//!
//! - [`types`]: validated [`Task`], [`Schedule`], [`RetryConfig`], [`TaskStatus`]
//! - [`interval`]: `"30m"` / `"6h"` / `"1d"` / `"1y"` parsing
//! - [`definition`] and [`loader`]: the YAML task format and directory loading
//! - [`config`]: `taskops.toml` + `TASKOPS_*` environment configuration

pub mod config;
pub mod definition;
pub mod error;
pub mod interval;
pub mod loader;
pub mod types;

pub use error::{Result, TaskopsError};
pub use interval::parse_interval;
pub use types::{RetryConfig, Schedule, Task, TaskStatus};
