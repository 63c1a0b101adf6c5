//! Time-limited signed URLs for blobs served by this process.
//!
//! A link carries `expires` (unix seconds) and `signature`, the hex
//! HMAC-SHA256 of `"{key}\n{expires}"` under the gateway's signing secret.

use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use sha2::Sha256;
use std::fmt;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Encode everything in a key except unreserved characters and `/`.
const KEY_PATH_ENCODE_SET: AsciiSet = NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("link expired")]
    Expired,
    #[error("signature does not match")]
    Mismatch,
}

/// Signs and verifies blob links.
#[derive(Clone)]
pub struct UrlSigner {
    secret: Vec<u8>,
    public_url: String,
}

impl fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlSigner")
            .field("public_url", &self.public_url)
            .finish_non_exhaustive()
    }
}

impl UrlSigner {
    pub fn new(secret: impl Into<Vec<u8>>, public_url: impl Into<String>) -> Self {
        let public_url = public_url.into().trim_end_matches('/').to_string();
        Self {
            secret: secret.into(),
            public_url,
        }
    }

    fn mac(&self, key: &str, expires_at: i64) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires_at.to_string().as_bytes());
        mac
    }

    /// Hex signature for `key` valid until `expires_at`.
    pub fn sign(&self, key: &str, expires_at: i64) -> String {
        hex::encode(self.mac(key, expires_at).finalize().into_bytes())
    }

    /// Full download URL for `key` valid until `expires_at`.
    ///
    /// The key is percent-encoded in the path; the signature covers the
    /// decoded key, which is what the `/blobs` route sees.
    pub fn signed_url(&self, key: &str, expires_at: i64) -> String {
        format!(
            "{}/blobs/{}?expires={}&signature={}",
            self.public_url,
            utf8_percent_encode(key, &KEY_PATH_ENCODE_SET),
            expires_at,
            self.sign(key, expires_at)
        )
    }

    /// Check a presented link. `now` is unix seconds.
    pub fn verify(
        &self,
        key: &str,
        expires_at: i64,
        signature: &str,
        now: i64,
    ) -> Result<(), SignatureError> {
        if now > expires_at {
            return Err(SignatureError::Expired);
        }
        let presented = hex::decode(signature).map_err(|_| SignatureError::Mismatch)?;
        // verify_slice compares in constant time
        self.mac(key, expires_at)
            .verify_slice(&presented)
            .map_err(|_| SignatureError::Mismatch)
    }
}
