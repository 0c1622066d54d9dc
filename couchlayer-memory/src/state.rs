//! Document, revision and change-log bookkeeping of one in-memory database.
//!
//! Everything here is synchronous and runs under the database's write lock; the async
//! handle in [`crate::database`] only takes the lock and wakes change listeners.

use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use uuid::Uuid;

use couchlayer_core::{
    error::{DriverError, DriverResult},
    iter::VecIterator,
    model::{Attachment, BulkResult, Change, Checksum, DbInfo, NewAttachment, Row, Security},
    options::{GetOptions, ViewOptions},
};

pub(crate) struct StoredAttachment {
    pub(crate) content_type: String,
    pub(crate) digest: Checksum,
    pub(crate) body: Vec<u8>,
}

pub(crate) struct StoredDoc {
    /// Current revision.
    pub(crate) rev: String,
    /// Every revision of the document, newest first.
    pub(crate) history: Vec<String>,
    pub(crate) body: Map<String, Value>,
    pub(crate) deleted: bool,
    pub(crate) attachments: BTreeMap<String, StoredAttachment>,
}

impl StoredDoc {
    fn size(&self) -> u64 {
        let body = Value::Object(self.body.clone()).to_string().len();
        let attachments: usize = self
            .attachments
            .values()
            .map(|att| att.body.len())
            .sum();

        (body + attachments) as u64
    }
}

pub(crate) struct ChangeEntry {
    pub(crate) seq: u64,
    pub(crate) id: String,
    pub(crate) rev: String,
    pub(crate) deleted: bool,
}

/// State of one database.
#[derive(Default)]
pub(crate) struct DbState {
    pub(crate) docs: BTreeMap<String, StoredDoc>,
    /// Latest change of each document, ordered by sequence.
    pub(crate) log: Vec<ChangeEntry>,
    pub(crate) seq: u64,
    pub(crate) security: Security,
    pub(crate) destroyed: bool,
}

/// A document write, parsed out of its JSON form.
struct Edit {
    rev: Option<String>,
    deleted: bool,
    body: Map<String, Value>,
}

impl Edit {
    fn parse(id: &str, doc: Value) -> DriverResult<Self> {
        let Value::Object(mut body) = doc else {
            return Err(DriverError::BadRequest("Document must be a JSON object".into()));
        };

        if let Some(doc_id) = body.remove("_id") {
            if doc_id.as_str() != Some(id) {
                return Err(DriverError::BadRequest("Document id must match the request id".into()));
            }
        }

        let rev = match body.remove("_rev") {
            None | Some(Value::Null) => None,
            Some(Value::String(rev)) if !rev.is_empty() => Some(rev),
            Some(Value::String(_)) => None,
            Some(_) => return Err(DriverError::BadRequest("Invalid rev format".into())),
        };

        let deleted = match body.remove("_deleted") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(deleted)) => deleted,
            Some(_) => return Err(DriverError::BadRequest("_deleted must be a boolean".into())),
        };

        body.remove("_attachments");
        body.remove("_revisions");
        body.remove("_conflicts");

        Ok(Self { rev, deleted, body })
    }
}

/// Local documents are never listed or replicated.
fn is_local(id: &str) -> bool {
    id.starts_with("_local/")
}

pub(crate) fn validate_doc_id(id: &str) -> DriverResult<()> {
    if id.is_empty() {
        return Err(DriverError::BadRequest("Document id must not be empty".into()));
    }

    if id.starts_with('_') && !id.starts_with("_design/") && !is_local(id) {
        return Err(DriverError::BadRequest(
            "Only reserved document ids may start with underscore.".into(),
        ));
    }

    Ok(())
}

fn generation(rev: &str) -> Option<u64> {
    rev.split_once('-')
        .and_then(|(generation, _)| generation.parse().ok())
}

fn next_rev(previous: Option<&str>, body: &Map<String, Value>, deleted: bool) -> String {
    let generation = previous.and_then(generation).unwrap_or(0) + 1;

    let mut hasher = Sha256::new();
    hasher.update(previous.unwrap_or_default().as_bytes());
    hasher.update(Value::Object(body.clone()).to_string().as_bytes());
    hasher.update([u8::from(deleted)]);
    let digest = hasher.finalize();

    format!("{generation}-{}", hex::encode(&digest[..16]))
}

/// The first 128 bits of the SHA-256 of `body`.
pub(crate) fn checksum(body: &[u8]) -> Checksum {
    let digest = Sha256::digest(body);
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);

    Checksum(bytes)
}

fn conflict() -> DriverError {
    DriverError::Conflict("Document update conflict.".into())
}

fn missing(id: &str) -> DriverError {
    DriverError::NotFound(format!("document {id} is missing"))
}

impl DbState {
    fn record_change(&mut self, id: &str, rev: &str, deleted: bool) {
        self.seq += 1;
        self.log.retain(|entry| entry.id != id);
        self.log.push(ChangeEntry {
            seq: self.seq,
            id: id.to_string(),
            rev: rev.to_string(),
            deleted,
        });
    }

    fn live(&self, id: &str) -> DriverResult<&StoredDoc> {
        self.docs
            .get(id)
            .filter(|doc| !doc.deleted)
            .ok_or_else(|| missing(id))
    }

    /// Creates, updates or deletes `id`, returning the new revision.
    pub(crate) fn write(&mut self, id: &str, doc: Value, new_edits: bool) -> DriverResult<String> {
        validate_doc_id(id)?;
        let edit = Edit::parse(id, doc)?;
        let current = self.docs.get(id);

        let rev = if new_edits {
            match (current, edit.rev.as_deref()) {
                (Some(stored), Some(rev)) if stored.rev == rev => {}
                (Some(stored), None) if stored.deleted => {}
                (None, None) => {}
                (None, Some(_)) if !edit.deleted => return Err(conflict()),
                (None, Some(_)) => return Err(missing(id)),
                _ => return Err(conflict()),
            }

            let previous = current.map(|stored| stored.rev.as_str());
            next_rev(previous, &edit.body, edit.deleted)
        } else {
            let rev = edit
                .rev
                .ok_or_else(|| DriverError::BadRequest("new_edits=false requires a revision".into()))?;

            if generation(&rev).is_none() {
                return Err(DriverError::BadRequest(format!("Invalid rev format: {rev}")));
            }

            rev
        };

        let stored = self
            .docs
            .entry(id.to_string())
            .or_insert_with(|| StoredDoc {
                rev: String::new(),
                history: Vec::new(),
                body: Map::new(),
                deleted: false,
                attachments: BTreeMap::new(),
            });

        stored.rev = rev.clone();
        stored.history.insert(0, rev.clone());
        stored.deleted = edit.deleted;
        if edit.deleted {
            stored.body = Map::new();
            stored.attachments.clear();
        } else {
            stored.body = edit.body;
        }

        if !is_local(id) {
            self.record_change(id, &rev, edit.deleted);
        }

        Ok(rev)
    }

    /// Creates a document under its own `_id`, or a fresh one, returning `(id, rev)`.
    pub(crate) fn create(&mut self, doc: Value, new_edits: bool) -> DriverResult<(String, String)> {
        let id = match doc.get("_id") {
            None => Uuid::new_v4().simple().to_string(),
            Some(Value::String(id)) => id.clone(),
            Some(_) => return Err(DriverError::BadRequest("Document id must be a string".into())),
        };
        let rev = self.write(&id, doc, new_edits)?;

        Ok((id, rev))
    }

    pub(crate) fn delete(&mut self, id: &str, rev: &str) -> DriverResult<String> {
        self.live(id)?;
        self.write(id, json!({ "_rev": rev, "_deleted": true }), true)
    }

    /// Applies a bulk write. One result per input document, in input order.
    pub(crate) fn bulk(&mut self, docs: Vec<Value>, new_edits: bool) -> Vec<BulkResult> {
        docs.into_iter()
            .map(|doc| {
                let id = match doc.get("_id") {
                    None => Uuid::new_v4().simple().to_string(),
                    Some(Value::String(id)) => id.clone(),
                    Some(_) => {
                        return BulkResult::failed(
                            String::new(),
                            DriverError::BadRequest("Document id must be a string".into()),
                        );
                    }
                };

                match self.write(&id, doc, new_edits) {
                    Ok(rev) => BulkResult::ok(id, rev),
                    Err(e) => BulkResult::failed(id, e),
                }
            })
            .collect()
    }

    fn render(&self, id: &str, stored: &StoredDoc, options: &GetOptions) -> Value {
        let mut doc = Map::new();
        doc.insert("_id".into(), Value::String(id.to_string()));
        doc.insert("_rev".into(), Value::String(stored.rev.clone()));

        if stored.deleted {
            doc.insert("_deleted".into(), Value::Bool(true));
        }

        doc.extend(stored.body.clone());

        if !stored.attachments.is_empty() {
            let stubs: Map<String, Value> = stored
                .attachments
                .iter()
                .map(|(name, att)| {
                    let stub = json!({
                        "content_type": att.content_type,
                        "digest": format!("sha256-{}", att.digest),
                        "length": att.body.len(),
                        "stub": true,
                    });

                    (name.clone(), stub)
                })
                .collect();

            doc.insert("_attachments".into(), Value::Object(stubs));
        }

        if options.revs {
            let ids: Vec<&str> = stored
                .history
                .iter()
                .filter_map(|rev| rev.split_once('-').map(|(_, hash)| hash))
                .collect();

            doc.insert(
                "_revisions".into(),
                json!({ "start": generation(&stored.rev).unwrap_or(0), "ids": ids }),
            );
        }

        Value::Object(doc)
    }

    pub(crate) fn get(&self, id: &str, options: &GetOptions) -> DriverResult<Value> {
        let stored = self.live(id)?;

        if let Some(rev) = &options.rev {
            if *rev != stored.rev {
                return Err(DriverError::NotFound(format!("revision {rev} of {id} is missing")));
            }
        }

        Ok(self.render(id, stored, options))
    }

    fn attachment_target(&self, id: &str, rev: Option<&str>) -> DriverResult<&StoredDoc> {
        let stored = self.live(id)?;

        match rev {
            Some(rev) if rev != stored.rev => Err(DriverError::NotFound(format!(
                "revision {rev} of {id} is missing"
            ))),
            _ => Ok(stored),
        }
    }

    pub(crate) fn put_attachment(&mut self, id: &str, rev: &str, attachment: NewAttachment) -> DriverResult<String> {
        if attachment.filename.is_empty() {
            return Err(DriverError::BadRequest("Attachment name must not be empty".into()));
        }

        let body = match self.docs.get(id) {
            Some(stored) if !stored.deleted => {
                if stored.rev != rev {
                    return Err(conflict());
                }
                stored.body.clone()
            }
            _ if rev.is_empty() => Map::new(),
            _ => return Err(conflict()),
        };

        let mut doc = Value::Object(body);
        if !rev.is_empty() {
            doc["_rev"] = Value::String(rev.to_string());
        }
        let new_rev = self.write(id, doc, true)?;

        if let Some(stored) = self.docs.get_mut(id) {
            stored.attachments.insert(
                attachment.filename,
                StoredAttachment {
                    content_type: attachment.content_type,
                    digest: checksum(&attachment.body),
                    body: attachment.body,
                },
            );
        }

        Ok(new_rev)
    }

    pub(crate) fn get_attachment(&self, id: &str, rev: Option<&str>, filename: &str) -> DriverResult<Attachment> {
        let stored = self.attachment_target(id, rev)?;
        let att = stored
            .attachments
            .get(filename)
            .ok_or_else(|| DriverError::NotFound(format!("attachment {filename} of {id} is missing")))?;

        Ok(Attachment {
            filename: filename.to_string(),
            content_type: att.content_type.clone(),
            digest: att.digest,
            body: att.body.clone(),
        })
    }

    pub(crate) fn delete_attachment(&mut self, id: &str, rev: &str, filename: &str) -> DriverResult<String> {
        let stored = self.live(id)?;
        if stored.rev != rev {
            return Err(conflict());
        }
        if !stored.attachments.contains_key(filename) {
            return Err(DriverError::NotFound(format!("attachment {filename} of {id} is missing")));
        }

        let mut doc = Value::Object(stored.body.clone());
        doc["_rev"] = Value::String(rev.to_string());
        let new_rev = self.write(id, doc, true)?;

        if let Some(stored) = self.docs.get_mut(id) {
            stored.attachments.remove(filename);
        }

        Ok(new_rev)
    }

    pub(crate) fn info(&self, name: &str) -> DbInfo {
        let (live, deleted): (Vec<&StoredDoc>, Vec<&StoredDoc>) = self
            .docs
            .iter()
            .filter(|(id, _)| !is_local(id))
            .map(|(_, doc)| doc)
            .partition(|doc| !doc.deleted);
        let active_size = live.iter().map(|doc| doc.size()).sum();
        let disk_size = active_size + deleted.iter().map(|doc| doc.rev.len() as u64).sum::<u64>();

        DbInfo {
            name: name.to_string(),
            compact_running: false,
            doc_count: live.len() as u64,
            deleted_count: deleted.len() as u64,
            update_seq: self.seq.to_string(),
            disk_size,
            active_size,
            external_size: active_size,
        }
    }

    pub(crate) fn all_docs(&self, options: &ViewOptions) -> DriverResult<VecIterator<Row>> {
        let key = |value: &Option<Value>, name: &str| -> DriverResult<Option<String>> {
            match value {
                None => Ok(None),
                Some(Value::String(key)) => Ok(Some(key.clone())),
                Some(_) => Err(DriverError::BadRequest(format!("{name} must be a document id"))),
            }
        };
        let exact = key(&options.key, "key")?;
        let start = key(&options.start_key, "start_key")?;
        let end = key(&options.end_key, "end_key")?;

        let mut ids: Vec<&String> = self
            .docs
            .iter()
            .filter(|(id, doc)| !doc.deleted && !is_local(id))
            .map(|(id, _)| id)
            .collect();
        if options.descending {
            ids.reverse();
        }
        let total = ids.len();

        // Position of the first id inside the requested range.
        let first = ids
            .iter()
            .position(|id| match &start {
                None => true,
                Some(start) if options.descending => id.as_str() <= start.as_str(),
                Some(start) => id.as_str() >= start.as_str(),
            })
            .unwrap_or(total);

        let before_end = |id: &str| match &end {
            None => true,
            Some(end) => match (options.descending, options.inclusive_end) {
                (false, true) => id <= end.as_str(),
                (false, false) => id < end.as_str(),
                (true, true) => id >= end.as_str(),
                (true, false) => id > end.as_str(),
            },
        };

        let rows: Vec<Row> = ids[first..]
            .iter()
            .take_while(|id| before_end(id.as_str()))
            .filter(|id| exact.as_ref().is_none_or(|key| key == **id))
            .skip(options.skip as usize)
            .take(options.limit.map_or(usize::MAX, |limit| limit as usize))
            .filter_map(|id| {
                let stored = self.docs.get(*id)?;

                Some(Row {
                    id: (*id).clone(),
                    key: Value::String((*id).clone()),
                    value: json!({ "rev": stored.rev }),
                    doc: options
                        .include_docs
                        .then(|| self.render(id.as_str(), stored, &GetOptions::default())),
                    error: None,
                })
            })
            .collect();

        let offset = (first + options.skip as usize).min(total) as u64;

        Ok(VecIterator::new(rows)
            .with_offset(offset)
            .with_total_rows(total as u64)
            .with_update_seq(options.update_seq.then(|| self.seq.to_string())))
    }

    fn change(&self, entry: &ChangeEntry, include_docs: bool) -> Change {
        let doc = include_docs.then(|| match self.docs.get(&entry.id) {
            Some(stored) => self.render(&entry.id, stored, &GetOptions::default()),
            None => json!({ "_id": entry.id, "_rev": entry.rev, "_deleted": true }),
        });

        Change {
            id: entry.id.clone(),
            seq: entry.seq.to_string(),
            deleted: entry.deleted,
            changes: vec![entry.rev.clone()],
            doc,
        }
    }

    /// Returns the first change recorded after `since`.
    pub(crate) fn change_after(&self, since: u64, include_docs: bool) -> Option<(u64, Change)> {
        let index = self.log.partition_point(|entry| entry.seq <= since);

        self.log
            .get(index)
            .map(|entry| (entry.seq, self.change(entry, include_docs)))
    }

    /// Returns every change recorded after `since`, newest first.
    pub(crate) fn changes_descending(&self, since: u64, include_docs: bool) -> Vec<(u64, Change)> {
        self.log
            .iter()
            .rev()
            .take_while(|entry| entry.seq > since)
            .map(|entry| (entry.seq, self.change(entry, include_docs)))
            .collect()
    }
}
