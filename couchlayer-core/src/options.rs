//! Typed per-operation options.
//!
//! The transport layer hands requests over as a free-form [`OptionBag`] built from query
//! parameters. Each operation has its own option struct with documented defaults; decoding
//! a bag through [`FromOptions`] ignores keys the struct does not recognize and rejects
//! recognized keys whose value has the wrong type.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::error::{DriverError, DriverResult};

/// Free-form key/value configuration of a single request.
pub type OptionBag = Map<String, Value>;

/// Decodes an option struct from an [`OptionBag`].
///
/// Implemented for every option struct in this module.
pub trait FromOptions: DeserializeOwned + Default {
    /// Decodes the recognized keys of `bag`, leaving every other field at its default.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::BadRequest`] if a recognized key holds a value of the wrong type.
    fn from_bag(bag: &OptionBag) -> DriverResult<Self> {
        if bag.is_empty() {
            return Ok(Self::default());
        }

        serde_json::from_value(Value::Object(bag.clone()))
            .map_err(|e| DriverError::BadRequest(format!("invalid option: {e}")))
    }
}

/// Options for operations that recognize no keys.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ServerOptions {}

impl FromOptions for ServerOptions {}

/// Options for listing database names.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AllDbsOptions {
    pub descending: bool,
    pub limit: Option<u64>,
    pub skip: u64,
    #[serde(alias = "startkey")]
    pub start_key: Option<String>,
    #[serde(alias = "endkey")]
    pub end_key: Option<String>,
}

impl FromOptions for AllDbsOptions {}

/// Options for creating a database. Backends without sharding ignore `q` and `n`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct CreateDbOptions {
    /// Number of shards.
    pub q: Option<u32>,
    /// Number of replicas.
    pub n: Option<u32>,
    pub partitioned: bool,
}

impl FromOptions for CreateDbOptions {}

/// Options for row listings: all-docs and view queries.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ViewOptions {
    pub include_docs: bool,
    pub descending: bool,
    pub limit: Option<u64>,
    pub skip: u64,
    pub key: Option<Value>,
    #[serde(alias = "startkey")]
    pub start_key: Option<Value>,
    #[serde(alias = "endkey")]
    pub end_key: Option<Value>,
    /// Whether `end_key` itself is part of the range. Defaults to `true`.
    pub inclusive_end: bool,
    pub reduce: Option<bool>,
    pub group: bool,
    pub update_seq: bool,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            include_docs: false,
            descending: false,
            limit: None,
            skip: 0,
            key: None,
            start_key: None,
            end_key: None,
            inclusive_end: true,
            reduce: None,
            group: false,
            update_seq: false,
        }
    }
}

impl FromOptions for ViewOptions {}

/// Options for fetching a single document.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct GetOptions {
    /// A specific revision to fetch instead of the winning one.
    pub rev: Option<String>,
    pub revs: bool,
    pub conflicts: bool,
    pub attachments: bool,
}

impl FromOptions for GetOptions {}

/// Options for document writes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct WriteOptions {
    /// When `false`, the revision carried by the document is stored as-is, without a
    /// conflict check. Defaults to `true`.
    pub new_edits: bool,
    /// Allows the backend to defer durability of the write.
    pub batch: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self { new_edits: true, batch: false }
    }
}

impl FromOptions for WriteOptions {}

/// Delivery mode of a changes feed.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FeedMode {
    /// Return the changes recorded so far, then end.
    #[default]
    Normal,
    /// Wait for at least one change, return what is available, then end.
    Longpoll,
    /// Never end; the caller cancels the governing context.
    Continuous,
}

/// Options for the changes feed.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ChangesOptions {
    pub feed: FeedMode,
    /// Update sequence to start after. `"now"` starts at the current sequence.
    pub since: Option<String>,
    pub limit: Option<u64>,
    pub include_docs: bool,
    pub descending: bool,
    /// Heartbeat interval in milliseconds for long-lived feeds.
    pub heartbeat: Option<u64>,
    /// Longpoll timeout in milliseconds.
    pub timeout: Option<u64>,
}

impl FromOptions for ChangesOptions {}

/// Options for copying a document.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct CopyOptions {
    /// Revision of the source document to copy. Defaults to the winning revision.
    pub rev: Option<String>,
    /// Current revision of the target, required when overwriting an existing document.
    pub target_rev: Option<String>,
}

impl FromOptions for CopyOptions {}
