use std::time::Duration;

use chrono::{DateTime, Utc};
use hookline_core::RequestHeaders;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::SignatureError;
use crate::mac::{compute_hmac, verify_hmac_hex};

/// Default replay window for timestamp-qualified signatures.
pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(300);

fn default_tolerance_seconds() -> u64 {
    DEFAULT_TOLERANCE.as_secs()
}

/// How a webhook request is signed.
///
/// Deserializes from configuration as a tagged table, e.g.
///
/// ```toml
/// type = "timestamped"
/// header = "Stripe-Signature"
/// tolerance_seconds = 300
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignatureScheme {
    /// HMAC-SHA256 of the raw body, hex encoded, in a single header.
    Hmac {
        header: String,
        /// Required prefix before the hex digest (e.g. `sha256=`).
        #[serde(default)]
        prefix: Option<String>,
    },
    /// `t=<unix-seconds>,v1=<hex>[,v1=<hex>...]` signed over `"{t}.{body}"`.
    Timestamped {
        header: String,
        /// Maximum allowed distance between `t` and the verifier's clock.
        #[serde(default = "default_tolerance_seconds")]
        tolerance_seconds: u64,
    },
    /// The [`Hmac`](Self::Hmac) scheme read from either of two header names.
    HeaderAlias {
        primary: String,
        legacy: String,
        #[serde(default)]
        prefix: Option<String>,
    },
}

/// A header produced by [`SignatureScheme::sign`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeader {
    pub name: String,
    pub value: String,
}

/// Parsed form of a `t=...,v1=...` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampHeader {
    pub timestamp: i64,
    pub signatures: Vec<String>,
}

impl TimestampHeader {
    /// Parse a timestamp-qualified header. Unknown keys are ignored; a
    /// missing `t` or no `v1` entries yields `None`.
    pub fn parse(value: &str) -> Option<Self> {
        let mut timestamp = None;
        let mut signatures = Vec::new();
        for item in value.split(',') {
            let Some((key, val)) = item.split_once('=') else {
                continue;
            };
            match key.trim() {
                "t" => timestamp = Some(val.trim().parse::<i64>().ok()?),
                "v1" => signatures.push(val.trim().to_owned()),
                _ => {}
            }
        }
        if signatures.is_empty() {
            return None;
        }
        Some(Self {
            timestamp: timestamp?,
            signatures,
        })
    }
}

impl SignatureScheme {
    /// `X-Hub-Signature-256: sha256=<hex>`.
    pub fn github() -> Self {
        Self::Hmac {
            header: "X-Hub-Signature-256".into(),
            prefix: Some("sha256=".into()),
        }
    }

    /// `Stripe-Signature: t=...,v1=...` with the default tolerance.
    pub fn stripe() -> Self {
        Self::Timestamped {
            header: "Stripe-Signature".into(),
            tolerance_seconds: default_tolerance_seconds(),
        }
    }

    /// `X-Webhook-Signature: sha256=<hex>`, also accepted as `X-Signature`.
    pub fn generic() -> Self {
        Self::HeaderAlias {
            primary: "X-Webhook-Signature".into(),
            legacy: "X-Signature".into(),
            prefix: Some("sha256=".into()),
        }
    }

    /// Name of the header this scheme writes when signing.
    pub fn header_name(&self) -> &str {
        match self {
            Self::Hmac { header, .. } | Self::Timestamped { header, .. } => header,
            Self::HeaderAlias { primary, .. } => primary,
        }
    }

    /// Verify a request against the current clock.
    pub fn verify(
        &self,
        body: Option<&[u8]>,
        headers: &RequestHeaders,
        secret: &SecretString,
    ) -> Result<bool, SignatureError> {
        self.verify_at(body, headers, secret, Utc::now())
    }

    /// Verify a request as if the clock read `now`.
    pub fn verify_at(
        &self,
        body: Option<&[u8]>,
        headers: &RequestHeaders,
        secret: &SecretString,
        now: DateTime<Utc>,
    ) -> Result<bool, SignatureError> {
        let body = body.ok_or(SignatureError::RawBodyUnavailable)?;
        let key = secret.expose_secret().as_bytes();

        let valid = match self {
            Self::Hmac { header, prefix } => headers
                .get(header)
                .is_some_and(|value| verify_plain(key, body, value, prefix.as_deref())),
            Self::HeaderAlias {
                primary,
                legacy,
                prefix,
            } => [primary, legacy]
                .into_iter()
                .filter_map(|name| headers.get(name))
                .any(|value| verify_plain(key, body, value, prefix.as_deref())),
            Self::Timestamped {
                header,
                tolerance_seconds,
            } => headers
                .get(header)
                .and_then(TimestampHeader::parse)
                .is_some_and(|parsed| {
                    verify_timestamped(key, body, &parsed, *tolerance_seconds, now)
                }),
        };
        Ok(valid)
    }

    /// Sign a body with the current clock.
    pub fn sign(&self, body: &[u8], secret: &SecretString) -> Result<SignedHeader, SignatureError> {
        self.sign_at(body, secret, Utc::now())
    }

    /// Sign a body as if the clock read `now`.
    pub fn sign_at(
        &self,
        body: &[u8],
        secret: &SecretString,
        now: DateTime<Utc>,
    ) -> Result<SignedHeader, SignatureError> {
        let key = secret.expose_secret().as_bytes();
        let value = match self {
            Self::Hmac { prefix, .. } | Self::HeaderAlias { prefix, .. } => {
                let digest = compute_hmac(key, &[body])?;
                format!("{}{digest}", prefix.as_deref().unwrap_or_default())
            }
            Self::Timestamped { .. } => {
                let t = now.timestamp().to_string();
                let digest = compute_hmac(key, &[t.as_bytes(), b".", body])?;
                format!("t={t},v1={digest}")
            }
        };
        Ok(SignedHeader {
            name: self.header_name().to_owned(),
            value,
        })
    }
}

fn verify_plain(key: &[u8], body: &[u8], value: &str, prefix: Option<&str>) -> bool {
    let digest = match prefix {
        Some(p) => match value.trim().strip_prefix(p) {
            Some(rest) => rest,
            None => return false,
        },
        None => value.trim(),
    };
    verify_hmac_hex(key, &[body], digest)
}

fn verify_timestamped(
    key: &[u8],
    body: &[u8],
    parsed: &TimestampHeader,
    tolerance_seconds: u64,
    now: DateTime<Utc>,
) -> bool {
    let skew = now.timestamp().abs_diff(parsed.timestamp);
    if skew > tolerance_seconds {
        return false;
    }
    let t = parsed.timestamp.to_string();
    parsed
        .signatures
        .iter()
        .any(|sig| verify_hmac_hex(key, &[t.as_bytes(), b".", body], sig))
}
