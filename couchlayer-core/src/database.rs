//! The caller-facing database handle.
//!
//! [`CouchDatabase`] forwards the mandatory operations to the backend [`Database`] and
//! decides, for each optional one, between the native implementation and an emulation:
//!
//! | Operation | Without the capability |
//! |---|---|
//! | [`find`](CouchDatabase::find) and index management | `NotImplemented` |
//! | [`attachment_meta`](CouchDatabase::attachment_meta) | full fetch, body dropped |
//! | [`rev`](CouchDatabase::rev) | full document fetch, `_rev` kept |
//! | [`flush`](CouchDatabase::flush) | success, nothing done |
//! | [`copy`](CouchDatabase::copy) | get followed by put |
//!
//! Iterators are returned as [`Cursor`]s, which close the backend iterator on every
//! exit path.

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::{fmt, sync::Arc};
use tracing::debug;

use crate::{
    capability::{Capabilities, Finder},
    context::Context,
    driver::Database,
    error::{DriverError, DriverResult},
    iter::{BulkCursor, ChangesCursor, Cursor, RowCursor},
    model::{Attachment, AttachmentMeta, DbInfo, Index, NewAttachment, Security, document_rev},
    options::{ChangesOptions, CopyOptions, GetOptions, ServerOptions, ViewOptions, WriteOptions},
};

/// A handle to one named database.
///
/// Cloning is cheap. Handles to the same name observe the same state.
#[derive(Clone)]
pub struct CouchDatabase {
    name: String,
    inner: Arc<dyn Database>,
    capabilities: Capabilities,
}

impl CouchDatabase {
    pub(crate) fn new(name: String, db: Box<dyn Database>, capabilities: Capabilities) -> Self {
        Self {
            name,
            inner: Arc::from(db),
            capabilities,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Returns the backend database handle.
    pub fn driver_db(&self) -> &dyn Database {
        &*self.inner
    }

    pub async fn all_docs(&self, ctx: &Context, options: &ViewOptions) -> DriverResult<RowCursor> {
        ctx.check()?;
        Ok(Cursor::new(self.inner.all_docs(ctx, options).await?))
    }

    /// Fetches a document as raw JSON.
    pub async fn get_raw(&self, ctx: &Context, doc_id: &str, options: &GetOptions) -> DriverResult<Value> {
        ctx.check()?;
        self.inner.get(ctx, doc_id, options).await
    }

    /// Fetches a document into the caller's type.
    pub async fn get<T: DeserializeOwned>(&self, ctx: &Context, doc_id: &str, options: &GetOptions) -> DriverResult<T> {
        Ok(serde_json::from_value(self.get_raw(ctx, doc_id, options).await?)?)
    }

    /// Creates a document with a backend-assigned id, returning `(id, rev)`.
    pub async fn create_doc<T: Serialize>(&self, ctx: &Context, doc: &T, options: &WriteOptions) -> DriverResult<(String, String)> {
        ctx.check()?;
        let doc = serde_json::to_value(doc)?;

        self.inner.create_doc(ctx, doc, options).await
    }

    /// Writes a document at `doc_id`, returning the new revision.
    pub async fn put<T: Serialize>(&self, ctx: &Context, doc_id: &str, doc: &T, options: &WriteOptions) -> DriverResult<String> {
        ctx.check()?;
        let doc = serde_json::to_value(doc)?;

        self.inner.put(ctx, doc_id, doc, options).await
    }

    pub async fn delete(&self, ctx: &Context, doc_id: &str, rev: &str, options: &WriteOptions) -> DriverResult<String> {
        ctx.check()?;
        self.inner.delete(ctx, doc_id, rev, options).await
    }

    pub async fn info(&self, ctx: &Context, options: &ServerOptions) -> DriverResult<DbInfo> {
        ctx.check()?;
        self.inner.info(ctx, options).await
    }

    pub async fn compact(&self, ctx: &Context, options: &ServerOptions) -> DriverResult<()> {
        ctx.check()?;
        self.inner.compact(ctx, options).await
    }

    pub async fn compact_view(&self, ctx: &Context, ddoc: &str, options: &ServerOptions) -> DriverResult<()> {
        ctx.check()?;
        self.inner
            .compact_view(ctx, ddoc, options)
            .await
    }

    pub async fn view_cleanup(&self, ctx: &Context, options: &ServerOptions) -> DriverResult<()> {
        ctx.check()?;
        self.inner
            .view_cleanup(ctx, options)
            .await
    }

    pub async fn security(&self, ctx: &Context, options: &ServerOptions) -> DriverResult<Security> {
        ctx.check()?;
        self.inner
            .security(ctx, options)
            .await
    }

    pub async fn set_security(&self, ctx: &Context, security: &Security, options: &WriteOptions) -> DriverResult<()> {
        ctx.check()?;
        self.inner
            .set_security(ctx, security, options)
            .await
    }

    /// Opens the changes feed. In continuous mode, cancel `ctx` to stop it.
    pub async fn changes(&self, ctx: &Context, options: &ChangesOptions) -> DriverResult<ChangesCursor> {
        ctx.check()?;
        Ok(Cursor::new(self.inner.changes(ctx, options).await?))
    }

    /// Writes many documents at once. Results arrive in input order, one per document.
    pub async fn bulk_docs<T: Serialize>(&self, ctx: &Context, docs: &[T], options: &WriteOptions) -> DriverResult<BulkCursor> {
        ctx.check()?;
        let docs = docs
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Cursor::new(self.inner.bulk_docs(ctx, docs, options).await?))
    }

    pub async fn put_attachment(&self, ctx: &Context, doc_id: &str, rev: &str, attachment: NewAttachment, options: &WriteOptions) -> DriverResult<String> {
        ctx.check()?;
        self.inner
            .put_attachment(ctx, doc_id, rev, attachment, options)
            .await
    }

    pub async fn get_attachment(&self, ctx: &Context, doc_id: &str, rev: Option<&str>, filename: &str) -> DriverResult<Attachment> {
        ctx.check()?;
        self.inner
            .get_attachment(ctx, doc_id, rev, filename)
            .await
    }

    pub async fn delete_attachment(&self, ctx: &Context, doc_id: &str, rev: &str, filename: &str, options: &WriteOptions) -> DriverResult<String> {
        ctx.check()?;
        self.inner
            .delete_attachment(ctx, doc_id, rev, filename, options)
            .await
    }

    /// Queries a view of a design document.
    pub async fn query(&self, ctx: &Context, ddoc: &str, view: &str, options: &ViewOptions) -> DriverResult<RowCursor> {
        ctx.check()?;
        let ddoc = ddoc.trim_start_matches("_design/");
        let view = view.trim_start_matches("_view/");

        Ok(Cursor::new(self.inner.query(ctx, ddoc, view, options).await?))
    }

    /// Runs a Mango query.
    pub async fn find(&self, ctx: &Context, query: &Value) -> DriverResult<RowCursor> {
        ctx.check()?;
        let finder = self.finder()?;

        Ok(Cursor::new(finder.find(ctx, query).await?))
    }

    pub async fn create_index(&self, ctx: &Context, ddoc: &str, name: &str, index: &Value) -> DriverResult<()> {
        ctx.check()?;
        self.finder()?
            .create_index(ctx, ddoc, name, index)
            .await
    }

    pub async fn get_indexes(&self, ctx: &Context) -> DriverResult<Vec<Index>> {
        ctx.check()?;
        self.finder()?.get_indexes(ctx).await
    }

    pub async fn delete_index(&self, ctx: &Context, ddoc: &str, name: &str) -> DriverResult<()> {
        ctx.check()?;
        self.finder()?
            .delete_index(ctx, ddoc, name)
            .await
    }

    /// Reads an attachment's content type and digest.
    pub async fn attachment_meta(&self, ctx: &Context, doc_id: &str, rev: Option<&str>, filename: &str) -> DriverResult<AttachmentMeta> {
        ctx.check()?;

        if let Some(metaer) = self
            .has(Capabilities::ATTACHMENT_META)
            .then(|| self.inner.attachment_metaer())
            .flatten()
        {
            return metaer
                .get_attachment_meta(ctx, doc_id, rev, filename)
                .await;
        }

        debug!(db = %self.name, doc_id, filename, "emulating attachment metadata with a full fetch");

        Ok(self
            .inner
            .get_attachment(ctx, doc_id, rev, filename)
            .await?
            .into_meta())
    }

    /// Returns the current revision of a document.
    pub async fn rev(&self, ctx: &Context, doc_id: &str) -> DriverResult<String> {
        ctx.check()?;

        if let Some(rever) = self
            .has(Capabilities::REV)
            .then(|| self.inner.rever())
            .flatten()
        {
            return rever.rev(ctx, doc_id).await;
        }

        debug!(db = %self.name, doc_id, "emulating rev with a full document fetch");

        let doc = self
            .inner
            .get(ctx, doc_id, &GetOptions::default())
            .await?;

        document_rev(&doc)
            .map(str::to_string)
            .ok_or_else(|| DriverError::Internal(format!("document {doc_id} has no revision")))
    }

    /// Asks the backend to make all writes durable.
    ///
    /// Flushing is advisory: backends without the capability succeed without doing anything.
    pub async fn flush(&self, ctx: &Context) -> DriverResult<()> {
        ctx.check()?;

        match self
            .has(Capabilities::FLUSH)
            .then(|| self.inner.flusher())
            .flatten()
        {
            Some(flusher) => flusher.flush(ctx).await,
            None => {
                debug!(db = %self.name, "flush not supported, skipping");
                Ok(())
            }
        }
    }

    /// Copies `source_id` to `target_id`, returning the target's new revision.
    ///
    /// Uses the backend's copy when available. If the backend has none, or its copy
    /// reports `NotImplemented`, the source is read and written back under the target id;
    /// an error of either step is returned unchanged.
    pub async fn copy(&self, ctx: &Context, target_id: &str, source_id: &str, options: &CopyOptions) -> DriverResult<String> {
        ctx.check()?;

        if let Some(copier) = self
            .has(Capabilities::COPY)
            .then(|| self.inner.copier())
            .flatten()
        {
            match copier.copy(ctx, target_id, source_id, options).await {
                Err(e) if e.is_not_implemented() => {
                    debug!(db = %self.name, reason = e.reason(), "native copy unavailable");
                }
                result => return result,
            }
        }

        debug!(db = %self.name, source_id, target_id, "emulating copy with get and put");

        let source = GetOptions {
            rev: options.rev.clone(),
            ..Default::default()
        };
        let mut doc = self.inner.get(ctx, source_id, &source).await?;

        let Value::Object(fields) = &mut doc else {
            return Err(DriverError::Internal(format!("document {source_id} is not an object")));
        };
        fields.insert("_id".into(), Value::String(target_id.to_string()));
        match &options.target_rev {
            Some(rev) => fields.insert("_rev".into(), Value::String(rev.clone())),
            None => fields.remove("_rev"),
        };

        self.inner
            .put(ctx, target_id, doc, &WriteOptions::default())
            .await
    }

    fn has(&self, capability: Capabilities) -> bool {
        self.capabilities.contains(capability)
    }

    fn finder(&self) -> DriverResult<&dyn Finder> {
        self.has(Capabilities::FIND)
            .then(|| self.inner.finder())
            .flatten()
            .ok_or_else(|| DriverError::NotImplemented("find is not supported by this backend".into()))
    }
}

impl fmt::Debug for CouchDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CouchDatabase")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}
