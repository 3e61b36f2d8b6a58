//! Webhook request signature verification.
//!
//! The provider signs each webhook with HMAC-SHA1 keyed by the account auth
//! token. The signed payload is the exact public URL the request was posted
//! to, followed by every form parameter name and value, sorted by name. The
//! signature header carries the base64 encoding of the MAC.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// Name of the header carrying the signature.
pub const SIGNATURE_HEADER: &str = "X-Twilio-Signature";

fn signing_mac(secret: &str, url: &str, params: &[(String, String)]) -> HmacSha1 {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort();

    let mut mac = HmacSha1::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(url.as_bytes());
    for (name, value) in sorted {
        mac.update(name.as_bytes());
        mac.update(value.as_bytes());
    }
    mac
}

/// Compute the signature the provider would send for this request.
pub fn compute_signature(secret: &str, url: &str, params: &[(String, String)]) -> String {
    STANDARD.encode(signing_mac(secret, url, params).finalize().into_bytes())
}

/// Verify a webhook signature in constant time.
///
/// Returns `false` for malformed signatures instead of erroring.
pub fn verify_signature(
    secret: &str,
    signature: &str,
    url: &str,
    params: &[(String, String)],
) -> bool {
    let Ok(provided) = STANDARD.decode(signature.trim()) else {
        return false;
    };
    signing_mac(secret, url, params).verify_slice(&provided).is_ok()
}
