//! The mandatory driver contract.
//!
//! A backend provides a [`Driver`], which opens [`Client`]s from a connection
//! descriptor; a client hands out [`Database`] handles. Every method here must be
//! implemented. Optional capabilities live in [`crate::capability`] and are reached
//! through the accessor methods at the bottom of each trait, which default to `None`.
//!
//! # Thread Safety
//!
//! Clients and databases are shared across tasks and must be `Send + Sync`. Iterators
//! they return are owned by a single consumer.
//!
//! # Cancellation
//!
//! Every operation receives a [`Context`]. Operations that wait on I/O or on new data
//! must stop promptly once the context is done and report [`DriverError::Cancelled`].
//!
//! [`DriverError::Cancelled`]: crate::error::DriverError::Cancelled

use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Debug;

use crate::{
    capability::{
        AttachmentMetaer, Authenticator, Capabilities, Configer, Copier, DbFlusher, Finder, Rever,
    },
    context::Context,
    error::DriverResult,
    iter::{BulkResults, Changes, Rows},
    model::{Attachment, DbInfo, NewAttachment, Security, ServerInfo},
    options::{
        AllDbsOptions, ChangesOptions, CreateDbOptions, GetOptions, ServerOptions, ViewOptions,
        WriteOptions,
    },
};

/// Factory for clients of one backend technology.
#[async_trait]
pub trait Driver: Send + Sync + Debug {
    /// The optional capabilities clients of this driver provide.
    ///
    /// The emulation layer only asks a handle for a capability declared here.
    fn capabilities(&self) -> Capabilities {
        Capabilities::empty()
    }

    /// Opens a client. The descriptor format is driver-specific.
    async fn new_client(&self, ctx: &Context, descriptor: &str) -> DriverResult<Box<dyn Client>>;
}

/// A connection to one backend instance.
#[async_trait]
pub trait Client: Send + Sync + Debug {
    /// Returns the server implementation's details.
    async fn server_info(&self, ctx: &Context, options: &ServerOptions) -> DriverResult<ServerInfo>;

    /// Lists the names of all databases.
    async fn all_dbs(&self, ctx: &Context, options: &AllDbsOptions) -> DriverResult<Vec<String>>;

    /// Returns `true` if the database exists.
    async fn db_exists(&self, ctx: &Context, name: &str, options: &ServerOptions) -> DriverResult<bool>;

    /// Creates a database.
    ///
    /// Fails with `PreconditionFailed` if it already exists.
    async fn create_db(&self, ctx: &Context, name: &str, options: &CreateDbOptions) -> DriverResult<()>;

    /// Deletes a database and everything in it.
    ///
    /// Fails with `NotFound` if it does not exist.
    async fn destroy_db(&self, ctx: &Context, name: &str, options: &ServerOptions) -> DriverResult<()>;

    /// Returns a handle to a database. The database need not exist yet; operations on a
    /// missing database fail with `NotFound`.
    async fn db(&self, ctx: &Context, name: &str, options: &ServerOptions) -> DriverResult<Box<dyn Database>>;

    fn authenticator(&self) -> Option<&dyn Authenticator> {
        None
    }

    fn configer(&self) -> Option<&dyn Configer> {
        None
    }
}

/// A handle to one database.
#[async_trait]
pub trait Database: Send + Sync + Debug {
    /// Lists the documents of the database, subject to `options`.
    async fn all_docs(&self, ctx: &Context, options: &ViewOptions) -> DriverResult<Box<dyn Rows>>;

    /// Fetches a document.
    async fn get(&self, ctx: &Context, doc_id: &str, options: &GetOptions) -> DriverResult<Value>;

    /// Creates a document with a backend-assigned id, returning `(id, rev)`.
    async fn create_doc(&self, ctx: &Context, doc: Value, options: &WriteOptions) -> DriverResult<(String, String)>;

    /// Writes a document at a known id. The current revision travels in the document's
    /// `_rev` member. Returns the new revision.
    async fn put(&self, ctx: &Context, doc_id: &str, doc: Value, options: &WriteOptions) -> DriverResult<String>;

    /// Marks a document as deleted, returning the tombstone's revision.
    async fn delete(&self, ctx: &Context, doc_id: &str, rev: &str, options: &WriteOptions) -> DriverResult<String>;

    async fn info(&self, ctx: &Context, options: &ServerOptions) -> DriverResult<DbInfo>;

    /// Starts compaction of the database.
    async fn compact(&self, ctx: &Context, options: &ServerOptions) -> DriverResult<()>;

    /// Starts compaction of the views of one design document (without the `_design/` prefix).
    async fn compact_view(&self, ctx: &Context, ddoc: &str, options: &ServerOptions) -> DriverResult<()>;

    /// Removes index files no design document refers to anymore.
    async fn view_cleanup(&self, ctx: &Context, options: &ServerOptions) -> DriverResult<()>;

    async fn security(&self, ctx: &Context, options: &ServerOptions) -> DriverResult<Security>;

    async fn set_security(&self, ctx: &Context, security: &Security, options: &WriteOptions) -> DriverResult<()>;

    /// Opens the changes feed.
    ///
    /// In continuous mode the iterator never ends on its own; it stops with a
    /// cancellation error once `ctx` is done.
    async fn changes(&self, ctx: &Context, options: &ChangesOptions) -> DriverResult<Box<dyn Changes>>;

    /// Creates, updates and deletes documents in one request.
    ///
    /// The iterator yields exactly one result per input document, in input order.
    async fn bulk_docs(&self, ctx: &Context, docs: Vec<Value>, options: &WriteOptions) -> DriverResult<Box<dyn BulkResults>>;

    /// Uploads an attachment, returning the document's new revision.
    async fn put_attachment(
        &self,
        ctx: &Context,
        doc_id: &str,
        rev: &str,
        attachment: NewAttachment,
        options: &WriteOptions,
    ) -> DriverResult<String>;

    /// Fetches an attachment. `rev` of `None` reads the current document revision.
    async fn get_attachment(
        &self,
        ctx: &Context,
        doc_id: &str,
        rev: Option<&str>,
        filename: &str,
    ) -> DriverResult<Attachment>;

    /// Removes an attachment, returning the document's new revision.
    async fn delete_attachment(
        &self,
        ctx: &Context,
        doc_id: &str,
        rev: &str,
        filename: &str,
        options: &WriteOptions,
    ) -> DriverResult<String>;

    /// Queries a view. `ddoc` and `view` come without their `_design/` and `_view/` prefixes.
    async fn query(&self, ctx: &Context, ddoc: &str, view: &str, options: &ViewOptions) -> DriverResult<Box<dyn Rows>>;

    fn finder(&self) -> Option<&dyn Finder> {
        None
    }

    fn attachment_metaer(&self) -> Option<&dyn AttachmentMetaer> {
        None
    }

    fn rever(&self) -> Option<&dyn Rever> {
        None
    }

    fn flusher(&self) -> Option<&dyn DbFlusher> {
        None
    }

    fn copier(&self) -> Option<&dyn Copier> {
        None
    }
}
