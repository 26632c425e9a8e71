//! Request signing for the WEEX REST API
//!
//! Signature = base64(HMAC-SHA256(secret, timestamp + METHOD + path + query + body)).
//! The query string carries a leading `?` when non-empty; GET requests sign an
//! empty body.

use super::transport::HttpMethod;
use base64::Engine;
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Canonical query string: `?k1=v1&k2=v2` in insertion order, or empty
pub fn canonical_query(params: &[(String, String)]) -> String {
    if params.is_empty() {
        return String::new();
    }
    let joined = params
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&");
    format!("?{}", joined)
}

/// Exact string covered by the signature
pub fn signing_payload(
    timestamp: &str,
    method: HttpMethod,
    path: &str,
    query_string: &str,
    body: &str,
) -> String {
    let body = match method {
        HttpMethod::Get => "",
        _ => body,
    };
    format!("{}{}{}{}{}", timestamp, method.as_str(), path, query_string, body)
}

/// Sign a request with the account secret
pub fn sign(
    secret: &str,
    timestamp: &str,
    method: HttpMethod,
    path: &str,
    query_string: &str,
    body: &str,
) -> Result<String, InvalidLength> {
    let payload = signing_payload(timestamp, method, path, query_string, body);
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(payload.as_bytes());
    Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_canonical_query_keeps_order() {
        assert_eq!(canonical_query(&[]), "");
        assert_eq!(
            canonical_query(&params(&[("symbol", "cmt_btcusdt"), ("limit", "1")])),
            "?symbol=cmt_btcusdt&limit=1"
        );
    }

    #[test]
    fn test_get_signature_matches_reference() {
        let signature = sign(
            "secret",
            "1700000000000",
            HttpMethod::Get,
            "/capi/v2/account/position/allPosition",
            "?symbol=cmt_btcusdt",
            "",
        )
        .unwrap();
        assert_eq!(signature, "WWc5COLxbzEK80DO8/We76a/RTBJMlZmUdK0zPRochc=");
    }

    #[test]
    fn test_post_signature_covers_body() {
        let signature = sign(
            "secret",
            "1700000000000",
            HttpMethod::Post,
            "/capi/v2/order/placeOrder",
            "",
            r#"{"size":"0.01","symbol":"cmt_btcusdt"}"#,
        )
        .unwrap();
        assert_eq!(signature, "4YluBNlZq7FtRa0OV5j0xL2waD5Hg4gSzNsWvHYzMOk=");
    }

    #[test]
    fn test_get_ignores_body() {
        let with_body = sign("k", "1", HttpMethod::Get, "/p", "", "{\"a\":1}").unwrap();
        let without = sign("k", "1", HttpMethod::Get, "/p", "", "").unwrap();
        assert_eq!(with_body, without);
    }

    #[test]
    fn test_sign_is_deterministic() {
        let a = sign("k", "1700000000001", HttpMethod::Delete, "/x", "?a=1", "{}").unwrap();
        let b = sign("k", "1700000000001", HttpMethod::Delete, "/x", "?a=1", "{}").unwrap();
        assert_eq!(a, b);

        let later = sign("k", "1700000000002", HttpMethod::Delete, "/x", "?a=1", "{}").unwrap();
        assert_ne!(a, later);
    }
}
