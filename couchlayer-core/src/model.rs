//! Records exchanged across the driver boundary.
//!
//! Documents themselves travel as [`serde_json::Value`]; everything else a backend
//! reports (server info, database statistics, security documents, listings) has a
//! dedicated type here. Field names serialize with CouchDB's spelling.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{DriverError, DriverResult, Status};

/// Snapshot of a server's response to `GET /`.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerInfo {
    response: Value,
    version: String,
    vendor: String,
    vendor_version: String,
}

impl ServerInfo {
    pub fn new(
        response: Value,
        version: impl Into<String>,
        vendor: impl Into<String>,
        vendor_version: impl Into<String>,
    ) -> Self {
        Self {
            response,
            version: version.into(),
            vendor: vendor.into(),
            vendor_version: vendor_version.into(),
        }
    }

    /// Builds the info from a raw CouchDB-style welcome document.
    ///
    /// Missing fields are left empty.
    pub fn from_response(response: Value) -> Self {
        let field = |path: &[&str]| {
            path.iter()
                .try_fold(&response, |value, key| value.get(key))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        let version = field(&["version"]);
        let vendor = field(&["vendor", "name"]);
        let vendor_version = field(&["vendor", "version"]);

        Self { response, version, vendor, vendor_version }
    }

    /// The full, unparsed response.
    pub fn response(&self) -> &Value {
        &self.response
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    pub fn vendor_version(&self) -> &str {
        &self.vendor_version
    }
}

/// Statistics about a database.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct DbInfo {
    #[serde(rename = "db_name")]
    pub name: String,
    pub compact_running: bool,
    pub doc_count: u64,
    #[serde(rename = "doc_del_count")]
    pub deleted_count: u64,
    pub update_seq: String,
    pub disk_size: u64,
    #[serde(rename = "data_size")]
    pub active_size: u64,
    #[serde(skip)]
    pub external_size: u64,
}

/// One side of a security document.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Members {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
}

impl Members {
    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && self.roles.is_empty()
    }
}

/// A database security document.
///
/// A database without a security document behaves exactly like one holding
/// `Security::default()`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Security {
    #[serde(default)]
    pub admins: Members,
    #[serde(default)]
    pub members: Members,
}

/// A Mango-style index definition.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Index {
    #[serde(rename = "ddoc", default, skip_serializing_if = "String::is_empty")]
    pub design_doc: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "def")]
    pub definition: Value,
}

/// A 128-bit digest of an attachment body.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Checksum(pub [u8; 16]);

impl Checksum {
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Parses a 32-character hex string.
    pub fn from_hex(input: &str) -> DriverResult<Self> {
        let mut bytes = [0u8; 16];
        hex::decode_to_slice(input, &mut bytes)
            .map_err(|e| DriverError::BadRequest(format!("invalid checksum {input:?}: {e}")))?;

        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({})", self.to_hex())
    }
}

/// A fetched attachment, body included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub digest: Checksum,
    pub body: Vec<u8>,
}

impl Attachment {
    /// Drops the body, keeping the metadata.
    pub fn into_meta(self) -> AttachmentMeta {
        AttachmentMeta {
            filename: self.filename,
            content_type: self.content_type,
            digest: self.digest,
        }
    }
}

/// Attachment metadata without the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentMeta {
    pub filename: String,
    pub content_type: String,
    pub digest: Checksum,
}

/// An attachment to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAttachment {
    pub filename: String,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl NewAttachment {
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        body: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            body: body.into(),
        }
    }
}

/// A row of an all-docs listing, a view query or a find.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Row {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub key: Value,
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<Value>,
    /// Per-row failure, e.g. a key requested from all-docs that does not exist.
    #[serde(skip)]
    pub error: Option<DriverError>,
}

/// An entry of the changes feed.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Change {
    pub id: String,
    pub seq: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
    /// Leaf revisions of the document.
    pub changes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<Value>,
}

/// Outcome of one document in a bulk write.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkResult {
    pub id: String,
    pub rev: String,
    pub error: Option<DriverError>,
}

impl BulkResult {
    pub fn ok(id: impl Into<String>, rev: impl Into<String>) -> Self {
        Self { id: id.into(), rev: rev.into(), error: None }
    }

    pub fn failed(id: impl Into<String>, error: DriverError) -> Self {
        Self { id: id.into(), rev: String::new(), error: Some(error) }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn status(&self) -> Option<Status> {
        self.error.as_ref().map(DriverError::status)
    }
}

/// Credentials handed to an authenticator.
#[derive(Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Credentials {
    /// HTTP basic authentication.
    Basic { name: String, password: String },
    /// Cookie session authentication (`POST /_session`).
    Cookie { name: String, password: String },
    /// Bearer token, e.g. a JWT.
    Bearer(String),
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Basic { name, .. } => write!(f, "Basic({name}, [redacted])"),
            Credentials::Cookie { name, .. } => write!(f, "Cookie({name}, [redacted])"),
            Credentials::Bearer(_) => f.write_str("Bearer([redacted])"),
        }
    }
}

/// Reads the `_rev` member of a document.
pub fn document_rev(doc: &Value) -> Option<&str> {
    doc.get("_rev").and_then(Value::as_str)
}

/// Reads the `_id` member of a document.
pub fn document_id(doc: &Value) -> Option<&str> {
    doc.get("_id").and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_server_info_from_response() {
        let info = ServerInfo::from_response(json!({
            "couchdb": "Welcome",
            "version": "3.3.3",
            "vendor": { "name": "The Apache Software Foundation", "version": "3.3.3" },
        }));

        assert_eq!(info.version(), "3.3.3");
        assert_eq!(info.vendor(), "The Apache Software Foundation");
        assert_eq!(info.vendor_version(), "3.3.3");
        assert_eq!(info.response()["couchdb"], "Welcome");

        let sparse = ServerInfo::from_response(json!({}));
        assert_eq!(sparse.vendor(), "");
    }

    #[test]
    fn test_absent_security_equals_empty() {
        let parsed: Security = serde_json::from_value(json!({})).unwrap();
        assert_eq!(parsed, Security::default());
        assert!(parsed.admins.is_empty() && parsed.members.is_empty());

        assert_eq!(
            serde_json::to_value(Security::default()).unwrap(),
            json!({ "admins": {}, "members": {} })
        );
    }

    #[test]
    fn test_db_info_uses_couchdb_names() {
        let info = DbInfo {
            name: "chicken".into(),
            doc_count: 2,
            deleted_count: 1,
            update_seq: "3".into(),
            ..Default::default()
        };
        let value = serde_json::to_value(&info).unwrap();

        assert_eq!(value["db_name"], "chicken");
        assert_eq!(value["doc_del_count"], 1);
        assert!(value.get("external_size").is_none());
    }

    #[test]
    fn test_checksum_hex() {
        let sum = Checksum::from_hex("000102030405060708090a0b0c0d0e0f").unwrap();
        assert_eq!(sum.as_bytes()[15], 15);
        assert_eq!(sum.to_string(), "000102030405060708090a0b0c0d0e0f");

        assert!(Checksum::from_hex("abc").is_err());
    }

    #[test]
    fn test_credentials_debug_hides_secrets() {
        let creds = Credentials::Basic { name: "bob".into(), password: "hunter2".into() };
        assert!(!format!("{creds:?}").contains("hunter2"));
    }
}
