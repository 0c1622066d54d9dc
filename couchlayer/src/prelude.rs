//! Convenient re-exports of commonly used types from couchlayer.
//!
//! ```ignore
//! use couchlayer::prelude::*;
//! ```
//!
//! This provides access to:
//! - The client layer and its cursors
//! - The driver contract and optional capability traits
//! - Operation options and records
//! - Error and status types

pub use couchlayer_core::{
    auth::{AuthSecret, TokenCodec},
    capability::{
        AttachmentMetaer, Authenticator, Capabilities, Config, ConfigItem, ConfigMap, ConfigSection, Configer, Copier,
        DbFlusher, Finder, Rever,
    },
    client::CouchClient,
    context::Context,
    database::CouchDatabase,
    driver::{Client, Database, Driver},
    error::{DriverError, DriverResult, Status},
    iter::{BulkCursor, BulkResults, Changes, ChangesCursor, Cursor, RecordIterator, RowCursor, Rows, VecIterator},
    model::{
        Attachment, AttachmentMeta, BulkResult, Change, Checksum, Credentials, DbInfo, Index, Members, NewAttachment,
        Row, Security, ServerInfo,
    },
    options::{
        AllDbsOptions, ChangesOptions, CopyOptions, CreateDbOptions, FeedMode, FromOptions, GetOptions, OptionBag,
        ServerOptions, ViewOptions, WriteOptions,
    },
    registry::DriverRegistry,
};
