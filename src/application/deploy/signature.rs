//! `X-Hub-Signature` verification: `sha1=<hex HMAC-SHA1(body, secret)>`.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use subtle::ConstantTimeEq;

type HmacSha1 = Hmac<Sha1>;

const PREFIX: &str = "sha1=";

/// Header value a sender holding `secret` would attach to `body`.
pub fn sign(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(format!("{PREFIX}{}", hex::encode(mac.finalize().into_bytes())))
}

/// Constant-time check of a signature header against `body`.
pub fn verify(secret: &str, body: &[u8], header: Option<&str>) -> bool {
    let (Some(header), Some(expected)) = (header, sign(secret, body)) else {
        return false;
    };
    expected.as_bytes().ct_eq(header.trim().as_bytes()).unwrap_u8() == 1
}
