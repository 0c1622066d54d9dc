//! In-memory driver and client.
//!
//! Every client owns an independent set of databases held in a `BTreeMap` behind an
//! async-aware read-write lock. Clones of a client share that set.

use async_trait::async_trait;
use mea::rwlock::RwLock;
use serde_json::json;
use std::{collections::BTreeMap, fmt, sync::Arc};
use tracing::{debug, info};

use couchlayer_core::{
    context::Context,
    driver::{Client, Database, Driver},
    error::{DriverError, DriverResult},
    model::ServerInfo,
    options::{AllDbsOptions, CreateDbOptions, ServerOptions},
};

use crate::database::{InMemoryDatabase, MemDatabase};

pub(crate) type StoreMap = BTreeMap<String, Arc<MemDatabase>>;

/// Vendor name reported by [`InMemoryClient::server_info`](Client::server_info).
pub const VENDOR: &str = "Couchlayer Memory Adaptor";

/// Database names must start with a lowercase letter and may then contain lowercase
/// letters, digits and any of `_$()+-/`. Names starting with `_` are reserved.
pub(crate) fn validate_db_name(name: &str) -> DriverResult<()> {
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "_$()+-/".contains(c));

    if valid {
        Ok(())
    } else {
        Err(DriverError::BadRequest(format!("illegal database name {name:?}")))
    }
}

/// The in-memory driver. Declares no optional capabilities.
///
/// The descriptor passed to [`new_client`](Driver::new_client) is ignored; every call
/// returns a client with its own, empty set of databases.
#[derive(Debug, Default, Clone, Copy)]
pub struct InMemoryDriver;

#[async_trait]
impl Driver for InMemoryDriver {
    async fn new_client(&self, ctx: &Context, descriptor: &str) -> DriverResult<Box<dyn Client>> {
        ctx.check()?;
        debug!(descriptor, "opening in-memory client");

        Ok(Box::new(InMemoryClient::builder().build().await?))
    }
}

/// A set of in-memory databases.
///
/// # Example
///
/// ```ignore
/// use couchlayer_memory::InMemoryClient;
///
/// let client = InMemoryClient::builder()
///     .with_database("_users")
///     .build()
///     .await?;
/// ```
#[derive(Clone, Default)]
pub struct InMemoryClient {
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryClient {
    /// Creates a client with no databases.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> InMemoryClientBuilder {
        InMemoryClientBuilder::default()
    }

    /// Returns a typed handle to the named database.
    pub fn database(&self, name: &str) -> InMemoryDatabase {
        InMemoryDatabase::new(name, self.store.clone())
    }
}

#[async_trait]
impl Client for InMemoryClient {
    async fn server_info(&self, ctx: &Context, _options: &ServerOptions) -> DriverResult<ServerInfo> {
        ctx.check()?;

        let version = env!("CARGO_PKG_VERSION");
        let response = json!({
            "couchdb": "Welcome",
            "version": version,
            "vendor": { "name": VENDOR, "version": version },
        });

        Ok(ServerInfo::new(response, version, VENDOR, version))
    }

    async fn all_dbs(&self, ctx: &Context, options: &AllDbsOptions) -> DriverResult<Vec<String>> {
        ctx.check()?;

        // In descending order the start key is the upper bound.
        let (low, high) = match options.descending {
            false => (&options.start_key, &options.end_key),
            true => (&options.end_key, &options.start_key),
        };

        let store = self.store.read().await;
        let mut names: Vec<String> = store
            .keys()
            .filter(|name| low.as_ref().is_none_or(|low| *name >= low))
            .filter(|name| high.as_ref().is_none_or(|high| *name <= high))
            .cloned()
            .collect();

        if options.descending {
            names.reverse();
        }

        Ok(names
            .into_iter()
            .skip(options.skip as usize)
            .take(options.limit.map_or(usize::MAX, |limit| limit as usize))
            .collect())
    }

    async fn db_exists(&self, ctx: &Context, name: &str, _options: &ServerOptions) -> DriverResult<bool> {
        ctx.check()?;

        Ok(self.store.read().await.contains_key(name))
    }

    async fn create_db(&self, ctx: &Context, name: &str, _options: &CreateDbOptions) -> DriverResult<()> {
        ctx.check()?;
        validate_db_name(name)?;

        let mut store = self.store.write().await;
        if store.contains_key(name) {
            return Err(DriverError::PreconditionFailed(format!("database {name} already exists")));
        }

        store.insert(name.to_string(), Arc::new(MemDatabase::new()));
        info!(db = name, "created database");

        Ok(())
    }

    async fn destroy_db(&self, ctx: &Context, name: &str, _options: &ServerOptions) -> DriverResult<()> {
        ctx.check()?;

        let db = self
            .store
            .write()
            .await
            .remove(name)
            .ok_or_else(|| DriverError::NotFound(format!("database {name} does not exist")))?;

        let seq = {
            let mut state = db.state.write().await;
            state.destroyed = true;
            state.seq
        };
        db.notify(seq);
        info!(db = name, "destroyed database");

        Ok(())
    }

    async fn db(&self, ctx: &Context, name: &str, _options: &ServerOptions) -> DriverResult<Box<dyn Database>> {
        ctx.check()?;

        Ok(Box::new(self.database(name)))
    }
}

impl fmt::Debug for InMemoryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryClient").finish_non_exhaustive()
    }
}

/// Builder for [`InMemoryClient`].
#[derive(Debug, Default)]
pub struct InMemoryClientBuilder {
    databases: Vec<String>,
}

impl InMemoryClientBuilder {
    /// Creates `name` when the client is built.
    pub fn with_database(mut self, name: impl Into<String>) -> Self {
        self.databases.push(name.into());
        self
    }

    /// Builds the client.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::BadRequest`] if a pre-created database name is illegal.
    /// System databases such as `_users` are accepted.
    pub async fn build(self) -> DriverResult<InMemoryClient> {
        let client = InMemoryClient::new();

        {
            let mut store = client.store.write().await;
            for name in self.databases {
                if !name.starts_with('_') {
                    validate_db_name(&name)?;
                }
                store
                    .entry(name)
                    .or_insert_with(|| Arc::new(MemDatabase::new()));
            }
        }

        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use couchlayer_core::error::Status;

    #[test]
    fn test_validate_db_name() {
        for name in ["chicken", "a1", "foo_bar$(baz)+q-r/s"] {
            assert!(validate_db_name(name).is_ok(), "{name}");
        }
        for name in ["", "Chicken", "1abc", "_users", "with space"] {
            assert!(validate_db_name(name).is_err(), "{name}");
        }
    }

    #[tokio::test]
    async fn test_create_and_destroy() {
        let ctx = Context::background();
        let client = InMemoryClient::new();

        client
            .create_db(&ctx, "chicken", &CreateDbOptions::default())
            .await
            .unwrap();
        assert!(client.db_exists(&ctx, "chicken", &ServerOptions::default()).await.unwrap());

        let err = client
            .create_db(&ctx, "chicken", &CreateDbOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Status::PreconditionFailed);

        client
            .destroy_db(&ctx, "chicken", &ServerOptions::default())
            .await
            .unwrap();
        let err = client
            .destroy_db(&ctx, "chicken", &ServerOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Status::NotFound);
    }

    #[tokio::test]
    async fn test_all_dbs_paging() {
        let ctx = Context::background();
        let client = InMemoryClient::builder()
            .with_database("_users")
            .with_database("b")
            .with_database("a")
            .with_database("c")
            .build()
            .await
            .unwrap();

        let all = client.all_dbs(&ctx, &AllDbsOptions::default()).await.unwrap();
        assert_eq!(all, ["_users", "a", "b", "c"]);

        let options = AllDbsOptions {
            descending: true,
            limit: Some(2),
            start_key: Some("b".into()),
            ..Default::default()
        };
        let page = client.all_dbs(&ctx, &options).await.unwrap();
        assert_eq!(page, ["b", "a"]);
    }

    #[tokio::test]
    async fn test_server_info() {
        let ctx = Context::background();
        let info = InMemoryClient::new()
            .server_info(&ctx, &ServerOptions::default())
            .await
            .unwrap();

        assert_eq!(info.vendor(), VENDOR);
        assert_eq!(info.version(), env!("CARGO_PKG_VERSION"));
        assert_eq!(info.response()["couchdb"], "Welcome");
    }

    #[tokio::test]
    async fn test_builder_rejects_illegal_names() {
        let err = InMemoryClient::builder()
            .with_database("Bad Name")
            .build()
            .await
            .unwrap_err();

        assert_eq!(err.status(), Status::BadRequest);
    }
}
