//! The pull-based iterator protocol shared by row listings, the changes feed and bulk
//! results.
//!
//! Backends implement [`RecordIterator`] (and the [`Rows`] / [`Changes`] refinements
//! where metadata applies). Callers never hold a raw iterator: the client layer wraps it
//! in a [`Cursor`], which releases the backend resource on every exit path.

use async_trait::async_trait;
use futures::stream::{self, Stream};
use std::{collections::VecDeque, fmt};
use tracing::{trace, warn};

use crate::{
    error::DriverResult,
    model::{BulkResult, Change, Row},
};

/// A single-consumer iterator over records produced by a backend.
///
/// `next` returns `Ok(None)` at end of stream. `close` releases whatever the iterator
/// holds (cursors, network streams, subscriptions) and must be safe to call repeatedly.
#[async_trait]
pub trait RecordIterator: Send {
    type Item: Send;

    /// Pulls the next record.
    async fn next(&mut self) -> DriverResult<Option<Self::Item>>;

    /// Releases the iterator's resources.
    fn close(&mut self) -> DriverResult<()>;
}

/// Iterator over the rows of an all-docs listing, a view query or a find.
pub trait Rows: RecordIterator<Item = Row> {
    /// Number of rows skipped before the first returned row.
    fn offset(&self) -> u64 {
        0
    }

    /// Total rows in the listing, if the backend reports it.
    fn total_rows(&self) -> Option<u64> {
        None
    }

    /// Update sequence of the index the rows were read from, if requested and known.
    fn update_seq(&self) -> Option<String> {
        None
    }
}

/// Iterator over the changes feed.
pub trait Changes: RecordIterator<Item = Change> {
    /// Sequence of the last change delivered, or of the starting point if none was.
    fn last_seq(&self) -> Option<String> {
        None
    }
}

/// Iterator over bulk write results, in input order.
pub trait BulkResults: RecordIterator<Item = BulkResult> {}

impl<T: RecordIterator<Item = BulkResult>> BulkResults for T {}

/// An iterator over records that are already in memory.
///
/// Backends whose listings are computed eagerly can hand this out directly.
pub struct VecIterator<T> {
    items: VecDeque<T>,
    offset: u64,
    total_rows: Option<u64>,
    update_seq: Option<String>,
    closed: bool,
}

impl<T> VecIterator<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items: items.into(),
            offset: 0,
            total_rows: None,
            update_seq: None,
            closed: false,
        }
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_total_rows(mut self, total_rows: u64) -> Self {
        self.total_rows = Some(total_rows);
        self
    }

    pub fn with_update_seq(mut self, update_seq: Option<String>) -> Self {
        self.update_seq = update_seq;
        self
    }
}

#[async_trait]
impl<T: Send> RecordIterator for VecIterator<T> {
    type Item = T;

    async fn next(&mut self) -> DriverResult<Option<T>> {
        if self.closed {
            return Ok(None);
        }

        Ok(self.items.pop_front())
    }

    fn close(&mut self) -> DriverResult<()> {
        self.closed = true;
        self.items.clear();

        Ok(())
    }
}

impl Rows for VecIterator<Row> {
    fn offset(&self) -> u64 {
        self.offset
    }

    fn total_rows(&self) -> Option<u64> {
        self.total_rows
    }

    fn update_seq(&self) -> Option<String> {
        self.update_seq.clone()
    }
}

/// Owns a backend iterator and guarantees it is closed.
///
/// The wrapped iterator is closed on end of stream, on the first iteration error, on an
/// explicit [`Cursor::close`], and when the cursor is dropped. Once closed, `next`
/// keeps returning `Ok(None)`.
pub struct Cursor<I: RecordIterator + ?Sized> {
    inner: Box<I>,
    closed: bool,
}

/// Cursor over rows.
pub type RowCursor = Cursor<dyn Rows>;
/// Cursor over the changes feed.
pub type ChangesCursor = Cursor<dyn Changes>;
/// Cursor over bulk write results.
pub type BulkCursor = Cursor<dyn BulkResults>;

impl<I: RecordIterator + ?Sized> Cursor<I> {
    pub fn new(inner: Box<I>) -> Self {
        Self { inner, closed: false }
    }

    /// Returns the wrapped iterator, e.g. to read listing metadata.
    pub fn inner(&self) -> &I {
        &self.inner
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Pulls the next record, closing the iterator at end of stream or on error.
    pub async fn next(&mut self) -> DriverResult<Option<I::Item>> {
        if self.closed {
            return Ok(None);
        }

        match self.inner.next().await {
            Ok(Some(item)) => Ok(Some(item)),
            Ok(None) => {
                trace!("iterator exhausted");
                self.release();
                Ok(None)
            }
            Err(e) => {
                trace!(error = %e, "iterator failed");
                self.release();
                Err(e)
            }
        }
    }

    /// Closes the iterator. Calling this more than once is a no-op.
    pub fn close(&mut self) -> DriverResult<()> {
        if self.closed {
            return Ok(());
        }

        self.closed = true;
        self.inner.close()
    }

    /// Drains the remaining records.
    pub async fn collect(mut self) -> DriverResult<Vec<I::Item>> {
        let mut items = Vec::new();

        while let Some(item) = self.next().await? {
            items.push(item);
        }

        Ok(items)
    }

    fn release(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "failed to close iterator");
        }
    }
}

impl<I: RecordIterator + ?Sized + 'static> Cursor<I> {
    /// Converts the cursor into a stream of records. The stream ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = DriverResult<I::Item>> + Send {
        stream::unfold(Some(self), |cursor| async move {
            let mut cursor = cursor?;

            match cursor.next().await {
                Ok(Some(item)) => Some((Ok(item), Some(cursor))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

impl<I: RecordIterator + ?Sized> Drop for Cursor<I> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<I: RecordIterator + ?Sized> fmt::Debug for Cursor<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
