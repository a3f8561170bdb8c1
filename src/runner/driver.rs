//! Driver abstraction and the registry that builds drivers by name.
//!
//! A driver is the adapter that invokes the agent under test in one
//! environment (local subprocess, remote shell, ...). The scheduler only
//! ever sees `Arc<dyn Driver>`.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::config::{DriverOptions, DriverSettings};
use super::local::LocalDriver;
use super::result::InvocationResult;
use super::ssh::SshDriver;
use crate::error::DriverError;

/// Something that can answer a query by invoking the agent.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Short name used in logs and in the report's `config.driver`.
    fn name(&self) -> &str;

    /// Runs the agent on `query`, streaming `context` to it if given.
    ///
    /// A non-zero exit code is not an error; it is reported through
    /// [`InvocationResult::exit_code`]. `Err` is reserved for failures that
    /// prevented the call from producing any outcome.
    async fn call(
        &self,
        query: &str,
        context: Option<&str>,
        options: &DriverOptions,
    ) -> Result<InvocationResult, DriverError>;
}

/// Builds a driver from construction-time settings.
pub type DriverFactory =
    Arc<dyn Fn(&DriverSettings) -> Result<Arc<dyn Driver>, DriverError> + Send + Sync>;

/// Name → factory table.
///
/// Built-in drivers are registered by [`DriverRegistry::with_builtins`];
/// operators add their own with [`DriverRegistry::register`] before the run
/// starts.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    factories: BTreeMap<String, DriverFactory>,
}

impl DriverRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the `local` and `ssh` drivers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(LocalDriver::NAME, |settings: &DriverSettings| {
            Ok(Arc::new(LocalDriver::from_settings(settings)) as Arc<dyn Driver>)
        });
        registry.register(SshDriver::NAME, |settings: &DriverSettings| {
            Ok(Arc::new(SshDriver::from_settings(settings)?) as Arc<dyn Driver>)
        });
        registry
    }

    /// Registers (or replaces) a factory under `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&DriverSettings) -> Result<Arc<dyn Driver>, DriverError> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Returns true if a factory is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered driver names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Builds the driver registered under `name`.
    pub fn create(
        &self,
        name: &str,
        settings: &DriverSettings,
    ) -> Result<Arc<dyn Driver>, DriverError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| DriverError::UnknownDriver {
                name: name.to_string(),
                available: self.names().join(", "),
            })?;
        factory(settings)
    }
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("drivers", &self.names())
            .finish()
    }
}
