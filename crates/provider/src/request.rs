use std::time::Duration;

use bytes::Bytes;

/// Response bytes a transport reads when the caller sets no limit.
pub const DEFAULT_RESPONSE_LIMIT: usize = 4096;

/// A fully prepared outbound POST.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub url: String,
    /// Header pairs in send order.
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    /// Upper bound for the whole exchange.
    pub timeout: Duration,
    /// Most response body bytes the transport should read. The rest is
    /// left unread.
    pub response_limit: usize,
}

impl OutboundRequest {
    pub fn new(url: impl Into<String>, body: impl Into<Bytes>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            body: body.into(),
            timeout,
            response_limit: DEFAULT_RESPONSE_LIMIT,
        }
    }

    #[must_use]
    pub fn with_response_limit(mut self, limit: usize) -> Self {
        self.response_limit = limit;
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First header with `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Whatever the destination answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Bytes,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// 2xx acknowledges the delivery.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as UTF-8 (lossy), truncated to at most `max_bytes` on a char
    /// boundary.
    pub fn body_text(&self, max_bytes: usize) -> String {
        let text = String::from_utf8_lossy(&self.body);
        if text.len() <= max_bytes {
            return text.into_owned();
        }
        let mut end = max_bytes;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text[..end].to_owned()
    }
}
