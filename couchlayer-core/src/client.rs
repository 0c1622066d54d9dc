//! The caller-facing client.
//!
//! [`CouchClient`] wraps a backend [`Client`] together with the capability set its driver
//! declared. Mandatory operations are forwarded as-is. Optional operations are forwarded
//! when the capability is declared and the backend hands out its implementation;
//! otherwise they are emulated from mandatory operations, or fail with `NotImplemented`.
//!
//! # Example
//!
//! ```ignore
//! use couchlayer::prelude::*;
//!
//! let ctx = Context::background();
//! let client = CouchClient::connect(&ctx, &InMemoryDriver, "").await?;
//!
//! client.create_db(&ctx, "chicken", &CreateDbOptions::default()).await?;
//! let db = client.db(&ctx, "chicken", &ServerOptions::default()).await?;
//! ```

use std::{collections::BTreeMap, fmt, sync::Arc};
use tracing::debug;

use crate::{
    capability::{Capabilities, Config, ConfigMap, Configer},
    context::Context,
    database::CouchDatabase,
    driver::{Client, Driver},
    error::{DriverError, DriverResult},
    model::{Credentials, ServerInfo},
    options::{AllDbsOptions, CreateDbOptions, ServerOptions},
};

/// A shareable handle to one backend instance.
///
/// Cloning is cheap; clones talk to the same backend client.
#[derive(Clone)]
pub struct CouchClient {
    inner: Arc<dyn Client>,
    capabilities: Capabilities,
}

impl CouchClient {
    /// Wraps a backend client whose driver declared `capabilities`.
    pub fn new(client: Box<dyn Client>, capabilities: Capabilities) -> Self {
        Self {
            inner: Arc::from(client),
            capabilities,
        }
    }

    /// Opens a client through `driver`.
    pub async fn connect(ctx: &Context, driver: &dyn Driver, descriptor: &str) -> DriverResult<Self> {
        let client = ctx.run(driver.new_client(ctx, descriptor)).await?;

        Ok(Self::new(client, driver.capabilities()))
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Returns the backend client.
    pub fn driver_client(&self) -> &dyn Client {
        &*self.inner
    }

    pub async fn server_info(&self, ctx: &Context, options: &ServerOptions) -> DriverResult<ServerInfo> {
        ctx.check()?;
        self.inner.server_info(ctx, options).await
    }

    pub async fn all_dbs(&self, ctx: &Context, options: &AllDbsOptions) -> DriverResult<Vec<String>> {
        ctx.check()?;
        self.inner.all_dbs(ctx, options).await
    }

    pub async fn db_exists(&self, ctx: &Context, name: &str, options: &ServerOptions) -> DriverResult<bool> {
        ctx.check()?;
        self.inner
            .db_exists(ctx, name, options)
            .await
    }

    pub async fn create_db(&self, ctx: &Context, name: &str, options: &CreateDbOptions) -> DriverResult<()> {
        ctx.check()?;
        self.inner.create_db(ctx, name, options).await
    }

    pub async fn destroy_db(&self, ctx: &Context, name: &str, options: &ServerOptions) -> DriverResult<()> {
        ctx.check()?;
        self.inner
            .destroy_db(ctx, name, options)
            .await
    }

    /// Returns a handle to the named database.
    pub async fn db(&self, ctx: &Context, name: &str, options: &ServerOptions) -> DriverResult<CouchDatabase> {
        ctx.check()?;
        let db = self
            .inner
            .db(ctx, name, options)
            .await?;

        Ok(CouchDatabase::new(name.to_string(), db, self.capabilities))
    }

    /// Authenticates the client.
    ///
    /// Fails with `NotImplemented` ("unsupported authenticator") when the backend does not
    /// authenticate.
    pub async fn authenticate(&self, ctx: &Context, credentials: &Credentials) -> DriverResult<()> {
        ctx.check()?;

        match self
            .capability(Capabilities::AUTHENTICATE)
            .and_then(|client| client.authenticator())
        {
            Some(authenticator) => authenticator.authenticate(ctx, credentials).await,
            None => Err(DriverError::NotImplemented("unsupported authenticator".into())),
        }
    }

    /// Reads the whole backend configuration.
    pub async fn config(&self, ctx: &Context) -> DriverResult<ConfigMap> {
        self.open_config(ctx).await?.get_all(ctx).await
    }

    /// Reads one configuration section. An unknown section reads as empty.
    pub async fn config_section(&self, ctx: &Context, section: &str) -> DriverResult<BTreeMap<String, String>> {
        let config = self.open_config(ctx).await?;

        if let Some(reader) = self
            .has(Capabilities::CONFIG_SECTION)
            .then(|| config.section_reader())
            .flatten()
        {
            return reader.get_section(ctx, section).await;
        }

        debug!(section, "emulating config section read");

        Ok(config
            .get_all(ctx)
            .await?
            .remove(section)
            .unwrap_or_default())
    }

    /// Reads one configuration value.
    pub async fn config_value(&self, ctx: &Context, section: &str, key: &str) -> DriverResult<String> {
        let config = self.open_config(ctx).await?;

        if let Some(reader) = self
            .has(Capabilities::CONFIG_ITEM)
            .then(|| config.item_reader())
            .flatten()
        {
            return reader.get(ctx, section, key).await;
        }

        debug!(section, key, "emulating config item read");

        config
            .get_all(ctx)
            .await?
            .remove(section)
            .and_then(|mut values| values.remove(key))
            .ok_or_else(|| DriverError::NotFound(format!("unknown config value {section}/{key}")))
    }

    /// Writes one configuration value.
    pub async fn set_config_value(&self, ctx: &Context, section: &str, key: &str, value: &str) -> DriverResult<()> {
        self.open_config(ctx)
            .await?
            .set(ctx, section, key, value)
            .await
    }

    /// Deletes one configuration value.
    pub async fn delete_config_value(&self, ctx: &Context, section: &str, key: &str) -> DriverResult<()> {
        self.open_config(ctx)
            .await?
            .delete(ctx, section, key)
            .await
    }

    fn has(&self, capability: Capabilities) -> bool {
        self.capabilities.contains(capability)
    }

    fn capability(&self, capability: Capabilities) -> Option<&dyn Client> {
        self.has(capability).then_some(&*self.inner)
    }

    async fn open_config(&self, ctx: &Context) -> DriverResult<Box<dyn Config>> {
        ctx.check()?;

        let configer: &dyn Configer = self
            .capability(Capabilities::CONFIG)
            .and_then(|client| client.configer())
            .ok_or_else(|| DriverError::NotImplemented("configuration access is not supported".into()))?;

        configer.config(ctx).await
    }
}

impl fmt::Debug for CouchClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CouchClient")
            .field("client", &self.inner)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}
