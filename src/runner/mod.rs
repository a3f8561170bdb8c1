//! Drivers: adapters that invoke the agent under test and report back.
//!
//! # Architecture
//!
//! ```text
//! Scheduler → Arc<dyn Driver> → process::invoke → agent process
//!                                   │
//!                                   └─ stdout / exit code / wall time → InvocationResult
//! ```
//!
//! Two drivers ship built in:
//! - **local**: runs the agent binary as a child with a private tree root
//! - **ssh**: runs the agent on a remote host via the `ssh` client
//!
//! Further drivers are added through [`DriverRegistry::register`].
//!
//! # Example
//!
//! ```ignore
//! use rlm_eval::runner::{DriverOptions, DriverRegistry, DriverSettings};
//!
//! let registry = DriverRegistry::with_builtins();
//! let driver = registry.create("local", &DriverSettings::new().with_model("gpt-5"))?;
//! let result = driver.call("What is the secret code?", Some(&context), &DriverOptions::default()).await?;
//! println!("{} ({} ms)", result.answer, result.wall_time_ms);
//! ```

pub mod config;
pub mod driver;
pub mod local;
pub mod process;
pub mod result;
pub mod ssh;

pub use config::{
    DriverOptions, DriverSettings, DEFAULT_CALL_TIMEOUT, DEFAULT_MAX_DEPTH,
    DEFAULT_MAX_ITERATIONS,
};
pub use driver::{Driver, DriverFactory, DriverRegistry};
pub use local::LocalDriver;
pub use process::{invoke, InvokeRequest, ProcessOutput};
pub use result::InvocationResult;
pub use ssh::SshDriver;
