//! Signed upload/download URLs for the local proxy backend.
//!
//! Signature format: `hex(HMAC-SHA256(secret, "{METHOD}\n{key}\n{expires}"))`,
//! passed as `?expires={unix_seconds}&signature={hex}`.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use http::Method;
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;

use crate::error::{StorageError, StorageResult};

type HmacSha256 = Hmac<Sha256>;

/// Path under which the server exposes the upload proxy.
pub const UPLOAD_ROUTE_PREFIX: &str = "/api/uploads/";

/// Query parameters carried by a signed URL.
#[derive(Debug, Clone, Deserialize)]
pub struct SignatureParams {
    pub expires: i64,
    pub signature: String,
}

/// Issues and verifies proxy URLs.
#[derive(Clone)]
pub struct UploadSigner {
    secret: Vec<u8>,
    base_url: String,
}

impl UploadSigner {
    /// # Arguments
    /// * `secret` - HMAC key shared by every server instance
    /// * `base_url` - public base URL of this server (e.g. `http://localhost:3000`)
    pub fn new(secret: impl AsRef<[u8]>, base_url: impl Into<String>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Unsigned URL of a key on this server.
    pub fn object_url(&self, key: &str) -> String {
        format!("{}{}{}", self.base_url, UPLOAD_ROUTE_PREFIX, key)
    }

    /// Signed URL valid for `expires_in` from now.
    pub fn signed_url(&self, method: &Method, key: &str, expires_in: Duration) -> String {
        let expires = Utc::now().timestamp() + expires_in.as_secs() as i64;
        let signature = self.sign(method, key, expires);
        format!(
            "{}?expires={}&signature={}",
            self.object_url(key),
            expires,
            signature
        )
    }

    fn mac(&self, method: &Method, key: &str, expires: i64) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        mac.update(format!("{}\n{}\n{}", method.as_str(), key, expires).as_bytes());
        mac
    }

    fn sign(&self, method: &Method, key: &str, expires: i64) -> String {
        hex::encode(self.mac(method, key, expires).finalize().into_bytes())
    }

    /// Check a signed request at time `now`.
    pub fn verify_at(
        &self,
        method: &Method,
        key: &str,
        params: &SignatureParams,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        if params.expires < now.timestamp() {
            return Err(StorageError::Signing("URL has expired".to_string()));
        }

        let provided = hex::decode(&params.signature)
            .map_err(|_| StorageError::Signing("malformed signature".to_string()))?;

        self.mac(method, key, params.expires)
            .verify_slice(&provided)
            .map_err(|_| StorageError::Signing("signature mismatch".to_string()))
    }

    /// Check a signed request now.
    pub fn verify(&self, method: &Method, key: &str, params: &SignatureParams) -> StorageResult<()> {
        self.verify_at(method, key, params, Utc::now())
    }
}

impl std::fmt::Debug for UploadSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadSigner")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Split the query string of a signed URL back into parameters.
pub fn parse_signed_url(url: &str) -> Option<SignatureParams> {
    let query = url.split_once('?')?.1;
    let mut expires = None;
    let mut signature = None;
    for pair in query.split('&') {
        match pair.split_once('=') {
            Some(("expires", v)) => expires = v.parse().ok(),
            Some(("signature", v)) => signature = Some(v.to_string()),
            _ => {}
        }
    }
    Some(SignatureParams {
        expires: expires?,
        signature: signature?,
    })
}
