//! Signed, time-stamped authentication tokens for cookie sessions.
//!
//! A token binds a user name and an issuance time to the server secret and the user's
//! salt:
//!
//! ```text
//! base64url( name ":" hex(time) ":" HMAC-SHA256(secret ‖ salt, name ":" hex(time)) )
//! ```
//!
//! The time is a count of Unix seconds written as lowercase hex. Validation decodes the
//! name and time, recomputes the token and compares in constant time.
//!
//! The secret is process-wide: initialize it once with [`init_auth_secret`] and read it
//! with [`auth_secret`]. [`AuthSecret`] never prints its contents.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::{fmt, sync::OnceLock, time::Duration};
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::error::{DriverError, DriverResult};

type HmacSha256 = Hmac<Sha256>;

/// Default session lifetime, matching CouchDB's `couch_httpd_auth/timeout`.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(600);

/// The server secret tokens are signed with.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthSecret(String);

impl AuthSecret {
    /// Wraps a secret.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::BadRequest`] if the secret is empty.
    pub fn new(secret: impl Into<String>) -> DriverResult<Self> {
        let secret = secret.into();

        if secret.is_empty() {
            return Err(DriverError::BadRequest("auth secret must not be empty".into()));
        }

        Ok(Self(secret))
    }

    fn expose(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for AuthSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthSecret([redacted])")
    }
}

impl fmt::Display for AuthSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[redacted]")
    }
}

static AUTH_SECRET: OnceLock<AuthSecret> = OnceLock::new();

/// Sets the process-wide auth secret.
///
/// # Errors
///
/// Returns [`DriverError::BadRequest`] for an empty secret and
/// [`DriverError::PreconditionFailed`] if the secret was already initialized.
pub fn init_auth_secret(secret: impl Into<String>) -> DriverResult<()> {
    let secret = AuthSecret::new(secret)?;

    AUTH_SECRET
        .set(secret)
        .map_err(|_| DriverError::PreconditionFailed("auth secret already initialized".into()))?;

    debug!("auth secret initialized");

    Ok(())
}

/// Returns the process-wide auth secret.
///
/// # Errors
///
/// Returns [`DriverError::Internal`] if [`init_auth_secret`] has not been called.
pub fn auth_secret() -> DriverResult<&'static AuthSecret> {
    AUTH_SECRET
        .get()
        .ok_or_else(|| DriverError::Internal("auth secret not initialized".into()))
}

fn signature(salt: &str, secret: &AuthSecret, session: &[u8]) -> DriverResult<Vec<u8>> {
    let mut key = Vec::with_capacity(secret.expose().len() + salt.len());
    key.extend_from_slice(secret.expose());
    key.extend_from_slice(salt.as_bytes());

    let mut mac = HmacSha256::new_from_slice(&key)
        .map_err(|e| DriverError::Internal(format!("cannot key token signature: {e}")))?;
    mac.update(session);

    Ok(mac.finalize().into_bytes().to_vec())
}

/// Creates a token for `name`, issued at `time` (Unix seconds).
///
/// # Errors
///
/// Returns [`DriverError::BadRequest`] if `name` contains `:`, and
/// [`DriverError::Internal`] if the signature cannot be keyed.
pub fn create_auth_token(name: &str, salt: &str, secret: &AuthSecret, time: u64) -> DriverResult<String> {
    if name.contains(':') {
        return Err(DriverError::BadRequest(format!("user name {name:?} must not contain ':'")));
    }

    let session = format!("{name}:{time:x}");
    let mut token = session.clone().into_bytes();
    token.push(b':');
    token.extend(signature(salt, secret, session.as_bytes())?);

    Ok(URL_SAFE_NO_PAD.encode(token))
}

/// Extracts the user name and issuance time from a token, without checking its signature.
///
/// # Errors
///
/// Returns [`DriverError::BadRequest`] if the token is not base64url, has fewer than three
/// `:`-separated parts, or its time is not hexadecimal.
pub fn decode_auth_token(token: &str) -> DriverResult<(String, u64)> {
    let data = URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|e| DriverError::BadRequest(format!("malformed auth token: {e}")))?;

    let mut parts = data.splitn(3, |b| *b == b':');
    let (Some(name), Some(time), Some(_)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(DriverError::BadRequest("malformed auth token: missing parts".into()));
    };

    let name = std::str::from_utf8(name)
        .map_err(|_| DriverError::BadRequest("malformed auth token: name is not UTF-8".into()))?;

    if time.is_empty() || !time.iter().all(u8::is_ascii_hexdigit) {
        return Err(DriverError::BadRequest("invalid timestamp in auth token".into()));
    }

    let time = std::str::from_utf8(time)
        .ok()
        .and_then(|time| u64::from_str_radix(time, 16).ok())
        .ok_or_else(|| DriverError::BadRequest("invalid timestamp in auth token".into()))?;

    Ok((name.to_string(), time))
}

/// Returns `true` if `token` was issued to `name` with `salt` and `secret`.
///
/// Malformed tokens are invalid; this never panics.
pub fn validate_auth_token(token: &str, name: &str, salt: &str, secret: &AuthSecret) -> bool {
    let Ok((token_name, time)) = decode_auth_token(token) else {
        return false;
    };

    if token_name != name {
        return false;
    }

    create_auth_token(name, salt, secret, time)
        .is_ok_and(|expected| expected.as_bytes().ct_eq(token.as_bytes()).into())
}

/// Creates and validates tokens with a fixed secret and session lifetime.
///
/// # Example
///
/// ```ignore
/// let codec = TokenCodec::builder(AuthSecret::new("s3cr3t")?).with_timeout(Duration::from_secs(60)).build();
/// let token = codec.create_now("bob", &user.salt)?;
/// assert!(codec.validate_fresh(&token, "bob", &user.salt, now));
/// ```
#[derive(Debug, Clone)]
pub struct TokenCodec {
    secret: AuthSecret,
    timeout: Duration,
}

impl TokenCodec {
    pub fn new(secret: AuthSecret) -> Self {
        Self { secret, timeout: DEFAULT_SESSION_TIMEOUT }
    }

    pub fn builder(secret: AuthSecret) -> TokenCodecBuilder {
        TokenCodecBuilder::new(secret)
    }

    /// Builds a codec around the process-wide secret.
    pub fn from_process_secret() -> DriverResult<Self> {
        Ok(Self::new(auth_secret()?.clone()))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn create(&self, name: &str, salt: &str, time: u64) -> DriverResult<String> {
        create_auth_token(name, salt, &self.secret, time)
    }

    /// Creates a token issued now.
    pub fn create_now(&self, name: &str, salt: &str) -> DriverResult<String> {
        self.create(name, salt, now())
    }

    pub fn decode(&self, token: &str) -> DriverResult<(String, u64)> {
        decode_auth_token(token)
    }

    pub fn validate(&self, token: &str, name: &str, salt: &str) -> bool {
        validate_auth_token(token, name, salt, &self.secret)
    }

    /// Like [`TokenCodec::validate`], but also rejects tokens issued more than the
    /// session timeout before `now`, or after `now`.
    pub fn validate_fresh(&self, token: &str, name: &str, salt: &str, now: u64) -> bool {
        let Ok((_, issued)) = decode_auth_token(token) else {
            return false;
        };

        if issued > now || now - issued > self.timeout.as_secs() {
            return false;
        }

        self.validate(token, name, salt)
    }
}

fn now() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or_default()
}

/// Builder for [`TokenCodec`].
pub struct TokenCodecBuilder {
    secret: AuthSecret,
    timeout: Option<Duration>,
}

impl TokenCodecBuilder {
    pub fn new(secret: AuthSecret) -> Self {
        Self { secret, timeout: None }
    }

    /// Sets the session lifetime. Defaults to [`DEFAULT_SESSION_TIMEOUT`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> TokenCodec {
        TokenCodec {
            secret: self.secret,
            timeout: self.timeout.unwrap_or(DEFAULT_SESSION_TIMEOUT),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Status;

    fn secret(value: &str) -> AuthSecret {
        AuthSecret::new(value).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let s = secret("s3cr3t");
        let token = create_auth_token("bob", "pepper", &s, 1_500_000_000).unwrap();

        assert!(validate_auth_token(&token, "bob", "pepper", &s));
        assert_eq!(decode_auth_token(&token).unwrap(), ("bob".to_string(), 1_500_000_000));
    }

    #[test]
    fn test_name_with_colon_is_rejected() {
        let s = secret("s3cr3t");
        let err = create_auth_token("a:b", "pepper", &s, 1_500_000_000).unwrap_err();

        assert_eq!(err.status(), Status::BadRequest);
    }

    #[test]
    fn test_changing_any_input_invalidates() {
        let s = secret("s3cr3t");
        let token = create_auth_token("bob", "pepper", &s, 1_500_000_000).unwrap();

        assert!(!validate_auth_token(&token, "alice", "pepper", &s));
        assert!(!validate_auth_token(&token, "bob", "salt", &s));
        assert!(!validate_auth_token(&token, "bob", "pepper", &secret("other")));

        let later = create_auth_token("bob", "pepper", &s, 1_500_000_001).unwrap();
        assert_ne!(token, later);

        // Same signature, different issuance time.
        let raw = URL_SAFE_NO_PAD.decode(&token).unwrap();
        let prefix = format!("bob:{:x}:", 1_500_000_000u64);
        let forged = URL_SAFE_NO_PAD.encode(
            [format!("bob:{:x}:", 1_500_000_001u64).as_bytes(), &raw[prefix.len()..]].concat(),
        );
        assert!(!validate_auth_token(&forged, "bob", "pepper", &s));
    }

    #[test]
    fn test_timestamp_is_lowercase_hex() {
        let token = create_auth_token("bob", "pepper", &secret("s3cr3t"), 0xABCDEF).unwrap();
        let raw = URL_SAFE_NO_PAD.decode(token).unwrap();

        assert!(raw.starts_with(b"bob:abcdef:"));
    }

    #[test]
    fn test_malformed_tokens_fail() {
        let s = secret("s3cr3t");

        for raw in ["bob", "bob:5968e200", "bob:xyz:sig", "bob::sig", "bob:-1:sig"] {
            let token = URL_SAFE_NO_PAD.encode(raw);
            let err = decode_auth_token(&token).unwrap_err();

            assert_eq!(err.status(), Status::BadRequest, "{raw}");
            assert!(!validate_auth_token(&token, "bob", "pepper", &s));
        }

        assert!(decode_auth_token("not base64 !!").is_err());
        assert!(!validate_auth_token("", "bob", "pepper", &s));
    }

    #[test]
    fn test_secret_is_redacted() {
        let s = secret("s3cr3t");

        assert!(!format!("{s:?}").contains("s3cr3t"));
        assert!(!format!("{s}").contains("s3cr3t"));
        assert!(!format!("{:?}", TokenCodec::new(s)).contains("s3cr3t"));
        assert!(AuthSecret::new("").is_err());
    }

    #[test]
    fn test_process_secret() {
        init_auth_secret("process-wide").unwrap();

        assert_eq!(
            init_auth_secret("again").unwrap_err().status(),
            Status::PreconditionFailed
        );

        let codec = TokenCodec::from_process_secret().unwrap();
        let token = codec.create("bob", "pepper", 42).unwrap();
        assert!(validate_auth_token(&token, "bob", "pepper", auth_secret().unwrap()));
    }

    #[test]
    fn test_fresh_tokens() {
        let codec = TokenCodec::builder(secret("s3cr3t"))
            .with_timeout(Duration::from_secs(60))
            .build();
        let token = codec.create("bob", "pepper", 1_000).unwrap();

        assert!(codec.validate_fresh(&token, "bob", "pepper", 1_000));
        assert!(codec.validate_fresh(&token, "bob", "pepper", 1_060));
        assert!(!codec.validate_fresh(&token, "bob", "pepper", 1_061));
        assert!(!codec.validate_fresh(&token, "bob", "pepper", 999));
    }

    #[test]
    fn test_create_now_validates() {
        let codec = TokenCodec::new(secret("s3cr3t"));
        let token = codec.create_now("bob", "pepper").unwrap();

        let (_, issued) = codec.decode(&token).unwrap();
        assert!(codec.validate_fresh(&token, "bob", "pepper", issued));
    }
}
