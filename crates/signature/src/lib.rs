//! Signature verification and signing for Hookline webhooks.
//!
//! Three schemes cover the producers Hookline talks to:
//!
//! - [`SignatureScheme::Hmac`]: HMAC-SHA256 of the raw body, hex encoded,
//!   with an optional prefix such as `sha256=`.
//! - [`SignatureScheme::Timestamped`]: a `t=<unix>,v1=<hex>` header signed
//!   over `"{t}.{body}"` and rejected outside a tolerance window.
//! - [`SignatureScheme::HeaderAlias`]: the plain HMAC scheme, read from a
//!   primary header name or a legacy one.
//!
//! Verification is a pure function of the request and the secret. A missing
//! or malformed header is simply an invalid signature; the only error is a
//! request whose raw body bytes are unavailable.
//!
//! ```
//! use hookline_core::RequestHeaders;
//! use hookline_signature::SignatureScheme;
//! use secrecy::SecretString;
//!
//! let scheme = SignatureScheme::github();
//! let secret = SecretString::new("s3cret".into());
//! let body = br#"{"zen":"keep it simple"}"#;
//!
//! let signed = scheme.sign(body, &secret).unwrap();
//! let headers = RequestHeaders::new().with(&signed.name, signed.value);
//! assert!(scheme.verify(Some(body), &headers, &secret).unwrap());
//! ```

pub mod error;
pub mod mac;
pub mod scheme;

pub use error::SignatureError;
pub use mac::{compute_hmac, verify_hmac_hex};
pub use scheme::{DEFAULT_TOLERANCE, SignatureScheme, SignedHeader, TimestampHeader};
