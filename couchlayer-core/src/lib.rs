//! The driver capability contract of a CouchDB-style document database.
//!
//! This crate is the core of the couchlayer project and provides:
//!
//! - **Error handling** ([`error`]) - Protocol statuses, the driver error type and wire error bodies
//! - **Cancellation** ([`context`]) - The context every operation observes
//! - **Options** ([`options`]) - Typed per-operation options decoded from option bags
//! - **Records** ([`model`]) - Server info, database info, security documents, rows and changes
//! - **Iterators** ([`iter`]) - The pull/close protocol and the guaranteed-release cursor
//! - **Driver contract** ([`driver`]) - The mandatory `Driver`, `Client` and `Database` traits
//! - **Capabilities** ([`capability`]) - Optional extension traits and the declared capability set
//! - **Client layer** ([`client`], [`database`]) - Capability detection and emulation
//! - **Registry** ([`registry`]) - Drivers addressable by name
//! - **Auth tokens** ([`auth`]) - Signed, time-stamped session tokens
//!
//! # Example
//!
//! ```ignore
//! use couchlayer_core::{client::CouchClient, context::Context, options::{CreateDbOptions, ServerOptions}};
//!
//! let ctx = Context::background();
//! let client = CouchClient::connect(&ctx, &my_driver, "memory://").await?;
//!
//! client.create_db(&ctx, "chicken", &CreateDbOptions::default()).await?;
//! assert!(client.db_exists(&ctx, "chicken", &ServerOptions::default()).await?);
//! ```

#[allow(unused_extern_crates)]
extern crate self as couchlayer_core;

pub mod auth;
pub mod capability;
pub mod client;
pub mod context;
pub mod database;
pub mod driver;
pub mod error;
pub mod iter;
pub mod model;
pub mod options;
pub mod registry;
