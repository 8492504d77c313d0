//! taskops-shell: one-shot shell execution for scheduled commands.
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use taskops_shell::{ExecOptions, ShellExecutor};
//!
//! #[tokio::main]
//! async fn main() {
//!     let sh = ShellExecutor::new("sh");
//!     let opts = ExecOptions::default().with_timeout(Some(Duration::from_secs(30)));
//!     let result = sh.exec("echo hello", &opts).await.unwrap();
//!     println!("{} -> {}", result.exit_code, result.stdout);
//! }
//! ```

pub mod error;
pub mod executor;
pub mod truncate;
pub mod types;

pub use error::{Result, ShellError};
pub use executor::ShellExecutor;
pub use types::{ExecOptions, ExecResult};
