//! The shared `402` response envelope and BIP-21 URI builder used by both
//! the Per-call Gate and the Subscription Gate (`spec.md` §4.10, §6).

use axum_core::response::{IntoResponse, Response};
use cashflow_types::Sats;
use http::StatusCode;
use serde::Serialize;
use serde_json::json;

/// The body of a `402 Payment Required` challenge response.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentChallengeBody {
    #[serde(rename = "paymentUri")]
    pub payment_uri: String,
    #[serde(rename = "amountSats")]
    pub amount_sats: Sats,
    #[serde(rename = "merchantAddress")]
    pub merchant_address: String,
    pub nonce: String,
    #[serde(rename = "verifyUrl")]
    pub verify_url: String,
    #[serde(rename = "expiresAt")]
    pub expires_at: cashflow_types::UnixTimestamp,
    pub instructions: Vec<String>,
}

impl IntoResponse for PaymentChallengeBody {
    fn into_response(self) -> Response {
        let mut response = (StatusCode::PAYMENT_REQUIRED, axum::Json(&self)).into_response();
        if let Ok(header_value) = http::HeaderValue::from_str(&self.payment_uri) {
            response.headers_mut().insert("Payment-Required", header_value);
        }
        response
    }
}

/// Gate-level errors, each mapping to a stable HTTP status
/// (`spec.md` §7).
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    PaymentRequired(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("server error: {0}")]
    ServerError(String),
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            GateError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            GateError::PaymentRequired(m) => (StatusCode::PAYMENT_REQUIRED, m.clone()),
            GateError::Forbidden(m) => (StatusCode::FORBIDDEN, m.clone()),
            GateError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            GateError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
            GateError::ServerError(m) => (StatusCode::INTERNAL_SERVER_ERROR, m.clone()),
        };
        (status, axum::Json(json!({ "error": message }))).into_response()
    }
}

/// Builds a BIP-21 URI: `<address>?amount=<bch>&label=&message=&c=&nonce=`
/// (`spec.md` §6). The cashaddr `address` already carries its own scheme
/// prefix (`bitcoincash:`/`bchtest:`), so it is not prepended again.
pub fn build_bip21_uri(
    address: &str,
    amount_sats: Sats,
    label: &str,
    message: &str,
    token_category: Option<&str>,
    nonce: Option<&str>,
) -> String {
    let bch_amount = format!("{}.{:08}", amount_sats.as_u64() / 100_000_000, amount_sats.as_u64() % 100_000_000);
    let mut uri = format!(
        "{address}?amount={bch_amount}&label={}&message={}",
        urlencode(label),
        urlencode(message)
    );
    if let Some(category) = token_category {
        uri.push_str(&format!("&c={}", urlencode(category)));
    }
    if let Some(nonce) = nonce {
        uri.push_str(&format!("&nonce={}", urlencode(nonce)));
    }
    uri
}

fn urlencode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bip21_uri_has_eight_decimal_places() {
        let uri = build_bip21_uri(
            "bchtest:qpum00000000000000000000000000000shj478",
            Sats::new(100),
            "CashFlow402",
            "per-call payment",
            None,
            Some("abc-nonce"),
        );
        assert!(uri.starts_with("bchtest:qpum"));
        assert!(uri.contains("amount=0.00000100"));
        assert!(uri.contains("nonce=abc-nonce"));
    }
}
