//! Named driver registration.
//!
//! A [`DriverRegistry`] maps driver names (`"memory"`, `"couch"`, ...) to drivers so the
//! transport layer can pick a backend from configuration at runtime.

use std::{collections::BTreeMap, sync::Arc};
use tracing::debug;

use crate::{
    capability::Capabilities,
    client::CouchClient,
    context::Context,
    driver::Driver,
    error::{DriverError, DriverResult},
};

/// A set of drivers addressable by name.
#[derive(Debug, Default, Clone)]
pub struct DriverRegistry {
    drivers: BTreeMap<String, Arc<dyn Driver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `driver` under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::PreconditionFailed`] if the name is taken.
    pub fn register(&mut self, name: &str, driver: impl Driver + 'static) -> DriverResult<()> {
        if self.drivers.contains_key(name) {
            return Err(DriverError::PreconditionFailed(format!(
                "driver {name:?} is already registered"
            )));
        }

        debug!(driver = name, capabilities = ?driver.capabilities(), "registering driver");
        self.drivers
            .insert(name.to_string(), Arc::new(driver));

        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Driver>> {
        self.drivers.get(name)
    }

    /// Returns the capabilities the named driver declared.
    pub fn capabilities(&self, name: &str) -> Option<Capabilities> {
        self.drivers
            .get(name)
            .map(|driver| driver.capabilities())
    }

    /// Lists the registered driver names.
    pub fn names(&self) -> Vec<String> {
        self.drivers.keys().cloned().collect()
    }

    /// Opens a client of the named driver.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::NotFound`] for an unknown driver name, or whatever the
    /// driver reports while connecting.
    pub async fn connect(&self, ctx: &Context, name: &str, descriptor: &str) -> DriverResult<CouchClient> {
        let driver = self
            .drivers
            .get(name)
            .ok_or_else(|| DriverError::NotFound(format!("unknown driver {name:?}")))?;

        CouchClient::connect(ctx, driver.as_ref(), descriptor).await
    }
}
