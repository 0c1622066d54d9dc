//! Optional capabilities a backend may provide beyond the mandatory contract.
//!
//! A driver announces what it provides through [`Capabilities`]; its handles then expose
//! each provided capability through the matching accessor (`Client::authenticator`,
//! `Database::rever`, ...). The client layer in [`crate::client`] and
//! [`crate::database`] uses a capability only when both agree, and otherwise falls back
//! to an emulation built from mandatory operations, or fails with `NotImplemented` when
//! none exists.

use async_trait::async_trait;
use bitflags::bitflags;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::{
    context::Context,
    error::DriverResult,
    iter::Rows,
    model::{AttachmentMeta, Credentials, Index},
    options::CopyOptions,
};

bitflags! {
    /// Set of optional capabilities declared by a driver.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Capabilities: u32 {
        const AUTHENTICATE = 1 << 0;
        const FIND = 1 << 1;
        const ATTACHMENT_META = 1 << 2;
        const REV = 1 << 3;
        const FLUSH = 1 << 4;
        const COPY = 1 << 5;
        const CONFIG = 1 << 6;
        const CONFIG_SECTION = 1 << 7;
        const CONFIG_ITEM = 1 << 8;
    }
}

/// Authenticates a client session.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Authenticates with `credentials`.
    ///
    /// Credential kinds the backend does not understand fail with `NotImplemented`.
    async fn authenticate(&self, ctx: &Context, credentials: &Credentials) -> DriverResult<()>;
}

/// Mango query and index management.
#[async_trait]
pub trait Finder: Send + Sync {
    /// Runs a `_find` query given as raw JSON.
    async fn find(&self, ctx: &Context, query: &Value) -> DriverResult<Box<dyn Rows>>;

    /// Creates an index unless it already exists. Empty `ddoc` or `name` are filled in
    /// by the backend.
    async fn create_index(&self, ctx: &Context, ddoc: &str, name: &str, index: &Value) -> DriverResult<()>;

    async fn get_indexes(&self, ctx: &Context) -> DriverResult<Vec<Index>>;

    async fn delete_index(&self, ctx: &Context, ddoc: &str, name: &str) -> DriverResult<()>;
}

/// Reads attachment metadata without transferring the body.
#[async_trait]
pub trait AttachmentMetaer: Send + Sync {
    async fn get_attachment_meta(
        &self,
        ctx: &Context,
        doc_id: &str,
        rev: Option<&str>,
        filename: &str,
    ) -> DriverResult<AttachmentMeta>;
}

/// Reads a document's current revision without transferring the body.
#[async_trait]
pub trait Rever: Send + Sync {
    async fn rev(&self, ctx: &Context, doc_id: &str) -> DriverResult<String>;
}

/// Forces buffered writes to permanent storage.
#[async_trait]
pub trait DbFlusher: Send + Sync {
    async fn flush(&self, ctx: &Context) -> DriverResult<()>;
}

/// Server-side document copy.
///
/// Returning `NotImplemented` makes the client layer fall back to a get followed by a put.
#[async_trait]
pub trait Copier: Send + Sync {
    /// Copies `source_id` to `target_id`, returning the target's new revision.
    async fn copy(
        &self,
        ctx: &Context,
        target_id: &str,
        source_id: &str,
        options: &CopyOptions,
    ) -> DriverResult<String>;
}

/// Backend configuration as `section -> key -> value`.
pub type ConfigMap = BTreeMap<String, BTreeMap<String, String>>;

/// Gives access to the backend's configuration.
#[async_trait]
pub trait Configer: Send + Sync {
    async fn config(&self, ctx: &Context) -> DriverResult<Box<dyn Config>>;
}

/// The minimal configuration backend.
#[async_trait]
pub trait Config: Send + Sync {
    async fn get_all(&self, ctx: &Context) -> DriverResult<ConfigMap>;

    async fn set(&self, ctx: &Context, section: &str, key: &str, value: &str) -> DriverResult<()>;

    async fn delete(&self, ctx: &Context, section: &str, key: &str) -> DriverResult<()>;

    fn section_reader(&self) -> Option<&dyn ConfigSection> {
        None
    }

    fn item_reader(&self) -> Option<&dyn ConfigItem> {
        None
    }
}

/// Reads one configuration section more cheaply than the whole configuration.
#[async_trait]
pub trait ConfigSection: Send + Sync {
    async fn get_section(&self, ctx: &Context, section: &str) -> DriverResult<BTreeMap<String, String>>;
}

/// Reads one configuration value more cheaply than the whole configuration.
#[async_trait]
pub trait ConfigItem: Send + Sync {
    async fn get(&self, ctx: &Context, section: &str, key: &str) -> DriverResult<String>;
}
