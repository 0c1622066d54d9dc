//! The in-memory changes feed.

use async_trait::async_trait;
use std::{collections::VecDeque, future, sync::Arc, time::Duration};
use tokio::{sync::watch, time::Instant};

use couchlayer_core::{
    context::Context,
    error::{DriverError, DriverResult},
    iter::{Changes, RecordIterator},
    model::Change,
    options::{ChangesOptions, FeedMode},
};

use crate::database::MemDatabase;

/// Iterator over the change log of one database.
///
/// Normal feeds end once the log is drained. Longpoll feeds wait for the first change
/// (or their timeout) and end after draining. Continuous feeds never end on their own;
/// cancel the context to stop them.
pub struct InMemoryChanges {
    db: Arc<MemDatabase>,
    ctx: Context,
    updates: watch::Receiver<u64>,
    feed: FeedMode,
    since: u64,
    remaining: Option<u64>,
    include_docs: bool,
    deadline: Option<Instant>,
    /// Pre-computed records of a descending feed.
    backlog: Option<VecDeque<(u64, Change)>>,
    delivered: bool,
    closed: bool,
}

impl InMemoryChanges {
    pub(crate) async fn open(db: Arc<MemDatabase>, ctx: &Context, options: &ChangesOptions) -> DriverResult<Self> {
        let updates = db.subscribe();

        let (since, backlog) = {
            let state = db.state.read().await;

            let since = match options.since.as_deref() {
                None | Some("") | Some("0") => 0,
                Some("now") => state.seq,
                Some(since) => since
                    .parse()
                    .map_err(|_| DriverError::BadRequest(format!("invalid since sequence {since:?}")))?,
            };

            let backlog = (options.descending && options.feed == FeedMode::Normal)
                .then(|| VecDeque::from(state.changes_descending(since, options.include_docs)));

            (since, backlog)
        };

        let deadline = match options.feed {
            FeedMode::Longpoll => options
                .timeout
                .map(|ms| Instant::now() + Duration::from_millis(ms)),
            _ => None,
        };

        Ok(Self {
            db,
            ctx: ctx.clone(),
            updates,
            feed: options.feed,
            since,
            remaining: options.limit,
            include_docs: options.include_docs,
            deadline,
            backlog,
            delivered: false,
            closed: false,
        })
    }

    fn deliver(&mut self, seq: u64, change: Change) -> Option<Change> {
        if self.backlog.is_none() {
            self.since = seq;
        }
        self.delivered = true;
        if let Some(remaining) = &mut self.remaining {
            *remaining -= 1;
        }

        Some(change)
    }

    /// Waits for the next write. `Ok(false)` means the longpoll timeout passed.
    async fn wait(&mut self) -> DriverResult<bool> {
        let Self { ctx, updates, deadline, .. } = self;

        let timeout = async {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(*deadline).await,
                None => future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = ctx.done() => Err(ctx
                .check()
                .err()
                .unwrap_or_else(|| DriverError::Cancelled("context cancelled".into()))),
            changed = updates.changed() => changed
                .map(|_| true)
                .map_err(|_| DriverError::NotFound("database was deleted".into())),
            _ = timeout => Ok(false),
        }
    }
}

#[async_trait]
impl RecordIterator for InMemoryChanges {
    type Item = Change;

    async fn next(&mut self) -> DriverResult<Option<Change>> {
        if self.closed || self.remaining == Some(0) {
            return Ok(None);
        }
        self.ctx.check()?;

        if let Some(backlog) = &mut self.backlog {
            return Ok(match backlog.pop_front() {
                Some((seq, change)) => self.deliver(seq, change),
                None => None,
            });
        }

        loop {
            self.updates.borrow_and_update();

            let next = {
                let state = self.db.state.read().await;
                if state.destroyed {
                    return Err(DriverError::NotFound("database was deleted".into()));
                }
                state.change_after(self.since, self.include_docs)
            };

            if let Some((seq, change)) = next {
                return Ok(self.deliver(seq, change));
            }

            match self.feed {
                FeedMode::Normal => return Ok(None),
                FeedMode::Longpoll if self.delivered => return Ok(None),
                FeedMode::Longpoll | FeedMode::Continuous => {}
            }

            if !self.wait().await? {
                return Ok(None);
            }
        }
    }

    fn close(&mut self) -> DriverResult<()> {
        self.closed = true;
        self.backlog = None;

        Ok(())
    }
}

impl Changes for InMemoryChanges {
    fn last_seq(&self) -> Option<String> {
        Some(self.since.to_string())
    }
}
