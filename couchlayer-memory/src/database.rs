//! The in-memory [`Database`] implementation.

use async_trait::async_trait;
use mea::rwlock::RwLock;
use serde_json::Value;
use std::{fmt, sync::Arc};
use tokio::sync::watch;
use tracing::{debug, trace};

use couchlayer_core::{
    context::Context,
    driver::Database,
    error::{DriverError, DriverResult},
    iter::{BulkResults, Changes, Rows, VecIterator},
    model::{Attachment, DbInfo, NewAttachment, Security},
    options::{ChangesOptions, GetOptions, ServerOptions, ViewOptions, WriteOptions},
};

use crate::{changes::InMemoryChanges, state::DbState, store::StoreMap};

/// One database: its state plus the channel change listeners wait on.
pub(crate) struct MemDatabase {
    pub(crate) state: RwLock<DbState>,
    updates: watch::Sender<u64>,
}

impl MemDatabase {
    pub(crate) fn new() -> Self {
        let (updates, _) = watch::channel(0);

        Self {
            state: RwLock::new(DbState::default()),
            updates,
        }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<u64> {
        self.updates.subscribe()
    }

    /// Wakes every changes feed waiting on this database.
    pub(crate) fn notify(&self, seq: u64) {
        self.updates.send_replace(seq);
    }
}

/// Handle to a named database of an [`InMemoryClient`](crate::InMemoryClient).
///
/// The handle resolves its database on every call, so it keeps working across a
/// destroy and re-create of the same name and reports `NotFound` in between.
#[derive(Clone)]
pub struct InMemoryDatabase {
    name: String,
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryDatabase {
    pub(crate) fn new(name: &str, store: Arc<RwLock<StoreMap>>) -> Self {
        Self {
            name: name.to_string(),
            store,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    async fn open(&self, ctx: &Context) -> DriverResult<Arc<MemDatabase>> {
        ctx.check()?;

        self.store
            .read()
            .await
            .get(&self.name)
            .cloned()
            .ok_or_else(|| DriverError::NotFound(format!("database {} does not exist", self.name)))
    }

    /// Runs a write against the database and wakes change listeners afterwards.
    async fn write<T>(&self, ctx: &Context, op: impl FnOnce(&mut DbState) -> T) -> DriverResult<T> {
        let db = self.open(ctx).await?;

        let (result, seq) = {
            let mut state = db.state.write().await;
            let before = state.seq;
            let result = op(&mut *state);

            (result, (state.seq != before).then_some(state.seq))
        };

        if let Some(seq) = seq {
            trace!(db = %self.name, seq, "database updated");
            db.notify(seq);
        }

        Ok(result)
    }

    async fn read<T>(&self, ctx: &Context, op: impl FnOnce(&DbState) -> T) -> DriverResult<T> {
        let db = self.open(ctx).await?;
        let state = db.state.read().await;

        Ok(op(&*state))
    }
}

#[async_trait]
impl Database for InMemoryDatabase {
    async fn all_docs(&self, ctx: &Context, options: &ViewOptions) -> DriverResult<Box<dyn Rows>> {
        let rows = self
            .read(ctx, |state| state.all_docs(options))
            .await??;

        Ok(Box::new(rows))
    }

    async fn get(&self, ctx: &Context, doc_id: &str, options: &GetOptions) -> DriverResult<Value> {
        self.read(ctx, |state| state.get(doc_id, options))
            .await?
    }

    async fn create_doc(&self, ctx: &Context, doc: Value, options: &WriteOptions) -> DriverResult<(String, String)> {
        self.write(ctx, |state| state.create(doc, options.new_edits))
            .await?
    }

    async fn put(&self, ctx: &Context, doc_id: &str, doc: Value, options: &WriteOptions) -> DriverResult<String> {
        self.write(ctx, |state| state.write(doc_id, doc, options.new_edits))
            .await?
    }

    async fn delete(&self, ctx: &Context, doc_id: &str, rev: &str, _options: &WriteOptions) -> DriverResult<String> {
        self.write(ctx, |state| state.delete(doc_id, rev))
            .await?
    }

    async fn info(&self, ctx: &Context, _options: &ServerOptions) -> DriverResult<DbInfo> {
        self.read(ctx, |state| state.info(&self.name))
            .await
    }

    async fn compact(&self, ctx: &Context, _options: &ServerOptions) -> DriverResult<()> {
        self.open(ctx).await?;
        debug!(db = %self.name, "nothing to compact in memory");

        Ok(())
    }

    async fn compact_view(&self, ctx: &Context, ddoc: &str, _options: &ServerOptions) -> DriverResult<()> {
        let id = format!("_design/{}", ddoc.trim_start_matches("_design/"));

        self.read(ctx, |state| state.get(&id, &GetOptions::default()).map(|_| ()))
            .await?
    }

    async fn view_cleanup(&self, ctx: &Context, _options: &ServerOptions) -> DriverResult<()> {
        self.open(ctx).await?;

        Ok(())
    }

    async fn security(&self, ctx: &Context, _options: &ServerOptions) -> DriverResult<Security> {
        self.read(ctx, |state| state.security.clone())
            .await
    }

    async fn set_security(&self, ctx: &Context, security: &Security, _options: &WriteOptions) -> DriverResult<()> {
        self.write(ctx, |state| state.security = security.clone())
            .await
    }

    async fn changes(&self, ctx: &Context, options: &ChangesOptions) -> DriverResult<Box<dyn Changes>> {
        let db = self.open(ctx).await?;

        debug!(db = %self.name, feed = ?options.feed, since = ?options.since, "opening changes feed");

        Ok(Box::new(InMemoryChanges::open(db, ctx, options).await?))
    }

    async fn bulk_docs(&self, ctx: &Context, docs: Vec<Value>, options: &WriteOptions) -> DriverResult<Box<dyn BulkResults>> {
        let results = self
            .write(ctx, |state| state.bulk(docs, options.new_edits))
            .await?;

        Ok(Box::new(VecIterator::new(results)))
    }

    async fn put_attachment(
        &self,
        ctx: &Context,
        doc_id: &str,
        rev: &str,
        attachment: NewAttachment,
        _options: &WriteOptions,
    ) -> DriverResult<String> {
        self.write(ctx, |state| state.put_attachment(doc_id, rev, attachment))
            .await?
    }

    async fn get_attachment(&self, ctx: &Context, doc_id: &str, rev: Option<&str>, filename: &str) -> DriverResult<Attachment> {
        self.read(ctx, |state| state.get_attachment(doc_id, rev, filename))
            .await?
    }

    async fn delete_attachment(
        &self,
        ctx: &Context,
        doc_id: &str,
        rev: &str,
        filename: &str,
        _options: &WriteOptions,
    ) -> DriverResult<String> {
        self.write(ctx, |state| state.delete_attachment(doc_id, rev, filename))
            .await?
    }

    async fn query(&self, ctx: &Context, ddoc: &str, view: &str, _options: &ViewOptions) -> DriverResult<Box<dyn Rows>> {
        let id = format!("_design/{ddoc}");
        self.read(ctx, |state| state.get(&id, &GetOptions::default()))
            .await??;

        Err(DriverError::NotImplemented(format!(
            "view {ddoc}/{view} cannot be evaluated by the in-memory backend"
        )))
    }
}

impl fmt::Debug for InMemoryDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryDatabase")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use couchlayer_core::{error::Status, options::FeedMode};
    use serde_json::json;
    use std::time::Duration;

    async fn database(name: &str) -> InMemoryDatabase {
        let store = Arc::new(RwLock::new(StoreMap::new()));
        store
            .write()
            .await
            .insert(name.to_string(), Arc::new(MemDatabase::new()));

        InMemoryDatabase::new(name, store)
    }

    #[tokio::test]
    async fn test_missing_database() {
        let ctx = Context::background();
        let db = InMemoryDatabase::new("nope", Arc::new(RwLock::new(StoreMap::new())));

        let err = db.info(&ctx, &ServerOptions::default()).await.unwrap_err();
        assert_eq!(err.status(), Status::NotFound);
    }

    #[tokio::test]
    async fn test_cancelled_context_fails_fast() {
        let ctx = Context::background();
        let db = database("chicken").await;
        ctx.cancel();

        let err = db
            .put(&ctx, "a", json!({}), &WriteOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Status::Cancelled);
    }

    #[tokio::test]
    async fn test_compact_view_requires_design_doc() {
        let ctx = Context::background();
        let db = database("chicken").await;

        let err = db
            .compact_view(&ctx, "views", &ServerOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Status::NotFound);

        db.put(&ctx, "_design/views", json!({}), &WriteOptions::default())
            .await
            .unwrap();
        db.compact_view(&ctx, "views", &ServerOptions::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_normal_changes_feed() {
        let ctx = Context::background();
        let db = database("chicken").await;
        for id in ["a", "b", "c"] {
            db.put(&ctx, id, json!({}), &WriteOptions::default())
                .await
                .unwrap();
        }

        let options = ChangesOptions {
            since: Some("1".into()),
            ..Default::default()
        };
        let mut changes = db.changes(&ctx, &options).await.unwrap();

        assert_eq!(changes.next().await.unwrap().unwrap().id, "b");
        assert_eq!(changes.next().await.unwrap().unwrap().id, "c");
        assert!(changes.next().await.unwrap().is_none());
        assert_eq!(changes.last_seq().as_deref(), Some("3"));

        let options = ChangesOptions {
            since: Some("soon".into()),
            ..Default::default()
        };
        let err = db.changes(&ctx, &options).await.err().unwrap();
        assert_eq!(err.status(), Status::BadRequest);
    }

    #[tokio::test]
    async fn test_longpoll_waits_for_a_write() {
        let ctx = Context::background();
        let db = database("chicken").await;

        let options = ChangesOptions {
            feed: FeedMode::Longpoll,
            since: Some("now".into()),
            ..Default::default()
        };
        let mut changes = db.changes(&ctx, &options).await.unwrap();

        let writer = db.clone();
        let write_ctx = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer
                .put(&write_ctx, "late", json!({}), &WriteOptions::default())
                .await
                .unwrap();
        });

        assert_eq!(changes.next().await.unwrap().unwrap().id, "late");
        assert!(changes.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_longpoll_timeout() {
        let ctx = Context::background();
        let db = database("chicken").await;

        let options = ChangesOptions {
            feed: FeedMode::Longpoll,
            timeout: Some(10),
            ..Default::default()
        };
        let mut changes = db.changes(&ctx, &options).await.unwrap();

        assert!(changes.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_continuous_feed_stops_on_cancel() {
        let ctx = Context::background();
        let db = database("chicken").await;
        db.put(&ctx, "a", json!({}), &WriteOptions::default())
            .await
            .unwrap();

        let feed_ctx = ctx.child();
        let options = ChangesOptions {
            feed: FeedMode::Continuous,
            ..Default::default()
        };
        let mut changes = db.changes(&feed_ctx, &options).await.unwrap();
        assert_eq!(changes.next().await.unwrap().unwrap().id, "a");

        let canceller = feed_ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = changes.next().await.unwrap_err();
        assert_eq!(err.status(), Status::Cancelled);
    }

    #[tokio::test]
    async fn test_descending_changes_with_limit() {
        let ctx = Context::background();
        let db = database("chicken").await;
        for id in ["a", "b", "c"] {
            db.put(&ctx, id, json!({}), &WriteOptions::default())
                .await
                .unwrap();
        }

        let options = ChangesOptions {
            descending: true,
            limit: Some(2),
            include_docs: true,
            ..Default::default()
        };
        let mut changes = db.changes(&ctx, &options).await.unwrap();

        let first = changes.next().await.unwrap().unwrap();
        assert_eq!(first.id, "c");
        assert_eq!(first.doc.unwrap()["_id"], "c");
        assert_eq!(changes.next().await.unwrap().unwrap().id, "b");
        assert!(changes.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_query_is_not_implemented() {
        let ctx = Context::background();
        let db = database("chicken").await;

        let err = db
            .query(&ctx, "views", "by_name", &ViewOptions::default())
            .await
            .err()
            .unwrap();
        assert_eq!(err.status(), Status::NotFound);

        db.put(&ctx, "_design/views", json!({}), &WriteOptions::default())
            .await
            .unwrap();
        let err = db
            .query(&ctx, "views", "by_name", &ViewOptions::default())
            .await
            .err()
            .unwrap();
        assert_eq!(err.status(), Status::NotImplemented);
    }
}
