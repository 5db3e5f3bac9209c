//! HTTP transport for Hookline outbound deliveries.
//!
//! Implements the [`Transport`](hookline_provider::Transport) trait on top of
//! a pooled `reqwest` client. The dispatcher builds the signed request; this
//! crate only moves bytes and classifies failures.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use hookline_webhook::{HttpTransport, HttpTransportConfig};
//!
//! let transport = HttpTransport::new(HttpTransportConfig::default())?;
//! # Ok::<(), hookline_webhook::WebhookError>(())
//! ```

pub mod config;
pub mod error;
pub mod transport;

pub use config::HttpTransportConfig;
pub use error::WebhookError;
pub use transport::HttpTransport;
