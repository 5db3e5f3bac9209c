use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::SignatureError;

type HmacSha256 = Hmac<Sha256>;

/// Compute the hex-encoded HMAC-SHA256 of the concatenated `parts`.
pub fn compute_hmac(secret: &[u8], parts: &[&[u8]]) -> Result<String, SignatureError> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| SignatureError::Signing(format!("invalid HMAC key: {e}")))?;
    for part in parts {
        mac.update(part);
    }
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check a hex-encoded signature against the HMAC of `parts`.
///
/// Comparison is constant-time. Undecodable hex or a wrong length is a
/// mismatch, not an error.
pub fn verify_hmac_hex(secret: &[u8], parts: &[&[u8]], provided_hex: &str) -> bool {
    let Ok(provided) = hex::decode(provided_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    for part in parts {
        mac.update(part);
    }
    let expected = mac.finalize().into_bytes();
    let expected_bytes: &[u8] = expected.as_ref();
    expected_bytes.ct_eq(provided.as_slice()).into()
}
