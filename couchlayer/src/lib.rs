//! Main couchlayer crate providing a uniform client over CouchDB-style backends.
//!
//! This crate is the primary entry point for users of couchlayer. It re-exports the
//! driver contract and the client layer from `couchlayer-core` and gives access to the
//! bundled backends.
//!
//! # Features
//!
//! - **One contract, many backends** - Drivers implement a small mandatory surface
//! - **Optional capabilities** - Backends opt into extras such as find or copy
//! - **Emulation** - Missing capabilities fall back to mandatory operations where possible
//! - **Guaranteed release** - Row, change and bulk-result cursors always close their iterator
//! - **Cancellation** - Every operation observes a [`Context`](context::Context)
//!
//! # Quick Start
//!
//! ```ignore
//! use couchlayer::{prelude::*, memory::InMemoryDriver};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Chicken {
//!     name: String,
//!     eggs: u32,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), DriverError> {
//!     let ctx = Context::background();
//!     let client = CouchClient::connect(&ctx, &InMemoryDriver, "").await?;
//!
//!     client.create_db(&ctx, "chicken", &CreateDbOptions::default()).await?;
//!     let db = client.db(&ctx, "chicken", &ServerOptions::default()).await?;
//!
//!     let hen = Chicken { name: "Henrietta".into(), eggs: 3 };
//!     let rev = db.put(&ctx, "henrietta", &hen, &WriteOptions::default()).await?;
//!
//!     // Rev is emulated with a document fetch on backends without the capability.
//!     assert_eq!(db.rev(&ctx, "henrietta").await?, rev);
//!
//!     let mut rows = db.all_docs(&ctx, &ViewOptions::default()).await?;
//!     while let Some(row) = rows.next().await? {
//!         println!("{} -> {}", row.id, row.value);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Writing a Driver
//!
//! A backend implements [`Driver`](driver::Driver), [`Client`](driver::Client) and
//! [`Database`](driver::Database). To offer an optional capability it implements the
//! matching trait from [`capability`], returns itself from the accessor and declares the
//! flag from [`Driver::capabilities`](driver::Driver::capabilities):
//!
//! ```ignore
//! use couchlayer::prelude::*;
//!
//! #[async_trait::async_trait]
//! impl Rever for MyDatabase {
//!     async fn rev(&self, ctx: &Context, doc_id: &str) -> DriverResult<String> {
//!         self.head(ctx, doc_id).await
//!     }
//! }
//!
//! // Inside `impl Database for MyDatabase`:
//! fn rever(&self) -> Option<&dyn Rever> {
//!     Some(self)
//! }
//!
//! // Inside `impl Driver for MyDriver`:
//! fn capabilities(&self) -> Capabilities {
//!     Capabilities::REV
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory reference backend (enabled by the default `memory` feature)

pub mod prelude;

pub use couchlayer_core::{auth, capability, client, context, database, driver, error, iter, model, options, registry};

// Re-exported for driver authors.
pub use async_trait::async_trait;
pub use serde_json;

/// In-memory backend implementations.
///
/// This module is only available when the `memory` feature is enabled.
#[cfg(feature = "memory")]
pub mod memory {
    pub use couchlayer_memory::{InMemoryChanges, InMemoryClient, InMemoryClientBuilder, InMemoryDatabase, InMemoryDriver, VENDOR};
}

/// Returns a registry with every bundled driver registered under its name.
///
/// With the default features this is the in-memory driver, registered as `"memory"`.
pub fn default_registry() -> error::DriverResult<registry::DriverRegistry> {
    #[allow(unused_mut)]
    let mut registry = registry::DriverRegistry::new();

    #[cfg(feature = "memory")]
    registry.register("memory", memory::InMemoryDriver)?;

    Ok(registry)
}
