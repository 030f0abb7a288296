//! Token Signer (`spec.md` §4.14).
//!
//! HMAC-SHA256 over a base64url-encoded JSON envelope — the same shape as
//! a JWT, hand-assembled with `hmac`+`sha2`+`base64` rather than pulling
//! in `jsonwebtoken`, matching the teacher's preference for small,
//! focused crates over heavier frameworks.

use crate::error::TokenError;
use cashflow_types::util::Base64Bytes;
use cashflow_types::UnixTimestamp;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const PERCALL_TOKEN_EXPIRY_SECONDS: u64 = 60;
pub const SUBSCRIPTION_TOKEN_EXPIRY_SECONDS: u64 = 3600;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TokenPayload {
    Percall {
        txid: String,
        #[serde(rename = "amountSats")]
        amount_sats: String,
        nonce: String,
    },
    Subscription {
        #[serde(rename = "tokenCategory")]
        token_category: String,
        #[serde(rename = "contractAddress")]
        contract_address: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct Envelope {
    iat: UnixTimestamp,
    exp: UnixTimestamp,
    #[serde(flatten)]
    payload: TokenPayload,
}

pub struct TokenSigner {
    secret: Vec<u8>,
}

impl TokenSigner {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        TokenSigner {
            secret: secret.into(),
        }
    }

    fn sign(&self, envelope: &Envelope) -> Result<String, TokenError> {
        let json = serde_json::to_vec(envelope).map_err(|_| TokenError::Malformed)?;
        let payload_b64 = Base64Bytes::encode(&json).to_string();
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).map_err(|_| TokenError::Malformed)?;
        mac.update(payload_b64.as_bytes());
        let signature = mac.finalize().into_bytes();
        let sig_b64 = Base64Bytes::encode(signature).to_string();
        Ok(format!("{payload_b64}.{sig_b64}"))
    }

    pub fn sign_percall(&self, txid: String, amount_sats: u64, nonce: String) -> Result<String, TokenError> {
        let now = UnixTimestamp::now();
        let envelope = Envelope {
            iat: now,
            exp: now + PERCALL_TOKEN_EXPIRY_SECONDS,
            payload: TokenPayload::Percall {
                txid,
                amount_sats: amount_sats.to_string(),
                nonce,
            },
        };
        self.sign(&envelope)
    }

    pub fn sign_subscription(
        &self,
        token_category: String,
        contract_address: String,
    ) -> Result<String, TokenError> {
        let now = UnixTimestamp::now();
        let envelope = Envelope {
            iat: now,
            exp: now + SUBSCRIPTION_TOKEN_EXPIRY_SECONDS,
            payload: TokenPayload::Subscription {
                token_category,
                contract_address,
            },
        };
        self.sign(&envelope)
    }

    /// Verifies signature and expiry, returning the decoded payload.
    /// Never decodes without verifying in security-sensitive paths.
    pub fn verify(&self, token: &str) -> Result<TokenPayload, TokenError> {
        let (payload_b64, sig_b64) = token.split_once('.').ok_or(TokenError::Malformed)?;

        let mut mac =
            HmacSha256::new_from_slice(&self.secret).map_err(|_| TokenError::Malformed)?;
        mac.update(payload_b64.as_bytes());
        let expected_sig = Base64Bytes::decode_str(sig_b64).map_err(|_| TokenError::Malformed)?;
        mac.verify_slice(&expected_sig)
            .map_err(|_| TokenError::BadSignature)?;

        let json = Base64Bytes::decode_str(payload_b64).map_err(|_| TokenError::Malformed)?;
        let envelope: Envelope = serde_json::from_slice(&json).map_err(|_| TokenError::Malformed)?;
        if envelope.exp.is_past() {
            return Err(TokenError::Expired);
        }
        Ok(envelope.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percall_token_roundtrips() {
        let signer = TokenSigner::new(b"test-secret".to_vec());
        let token = signer
            .sign_percall("abc123".into(), 100, "nonce-1".into())
            .unwrap();
        let payload = signer.verify(&token).unwrap();
        assert_eq!(
            payload,
            TokenPayload::Percall {
                txid: "abc123".into(),
                amount_sats: "100".into(),
                nonce: "nonce-1".into(),
            }
        );
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let signer = TokenSigner::new(b"test-secret".to_vec());
        let token = signer
            .sign_subscription("cafe".repeat(8), "bchtest:contract".into())
            .unwrap();
        let mut tampered = token.clone();
        tampered.push('x');
        assert!(matches!(
            signer.verify(&tampered),
            Err(TokenError::BadSignature) | Err(TokenError::Malformed)
        ));
    }

    #[test]
    fn a_different_secret_cannot_verify() {
        let signer = TokenSigner::new(b"secret-a".to_vec());
        let other = TokenSigner::new(b"secret-b".to_vec());
        let token = signer
            .sign_percall("abc".into(), 10, "n".into())
            .unwrap();
        assert!(matches!(other.verify(&token), Err(TokenError::BadSignature)));
    }
}
