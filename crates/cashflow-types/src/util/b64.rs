//! Base64 encoding and decoding utilities.
//!
//! Adapted from the teacher crate's `x402_types::util::b64`; used by the
//! token signer to encode the HMAC-signed envelope.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as b64;
use std::borrow::Cow;
use std::fmt::Display;

/// A wrapper for URL-safe, unpadded base64 data, used in access tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Base64Bytes<'a>(pub Cow<'a, [u8]>);

impl Base64Bytes<'_> {
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        b64.decode(&self.0)
    }

    pub fn encode<T: AsRef<[u8]>>(input: T) -> Base64Bytes<'static> {
        let encoded = b64.encode(input.as_ref());
        Base64Bytes(Cow::Owned(encoded.into_bytes()))
    }

    pub fn decode_str(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
        b64.decode(s)
    }
}

impl AsRef<[u8]> for Base64Bytes<'_> {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl Display for Base64Bytes<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.0.as_ref()))
    }
}
