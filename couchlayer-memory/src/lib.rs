//! In-memory reference backend for couchlayer.
//!
//! This crate implements the mandatory driver contract of `couchlayer-core` entirely in
//! memory. It declares no optional capabilities, so every optional operation reaches it
//! through the client layer's emulation, which makes it the reference for how those
//! fallbacks behave.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Revisions** - `N-hash` revision ids with update conflicts and `new_edits=false`
//! - **Changes feed** - Normal, longpoll and continuous feeds over a per-database log
//! - **Attachments** - Stored alongside their documents with a 128-bit digest
//!
//! Views are not evaluated: `query` reports `NotImplemented`.
//!
//! # Quick Start
//!
//! ```ignore
//! use couchlayer::prelude::*;
//! use couchlayer::memory::InMemoryDriver;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ctx = Context::background();
//!     let client = CouchClient::connect(&ctx, &InMemoryDriver, "").await?;
//!
//!     client.create_db(&ctx, "chicken", &CreateDbOptions::default()).await?;
//!     let db = client.db(&ctx, "chicken", &ServerOptions::default()).await?;
//!     let rev = db.put(&ctx, "hen", &serde_json::json!({ "eggs": 3 }), &WriteOptions::default()).await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as couchlayer_memory;

pub mod changes;
pub mod database;
pub mod store;

mod state;

pub use changes::InMemoryChanges;
pub use database::InMemoryDatabase;
pub use store::{InMemoryClient, InMemoryClientBuilder, InMemoryDriver, VENDOR};
