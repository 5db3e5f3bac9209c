//! In-process test doubles for exercising the dispatcher without a network.

use std::collections::VecDeque;

use hookline_provider::{OutboundRequest, Transport, TransportError, TransportResponse};
use parking_lot::Mutex;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum Reply {
    Status(u16),
    StatusWithBody(u16, String),
    Error(TransportError),
    /// Never answer; the dispatcher's timeout fires.
    Hang,
}

/// [`Transport`] that answers from a script and records every request.
///
/// Replies are consumed in order; once the script is empty every request
/// gets the fallback reply.
#[derive(Debug)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    requests: Mutex<Vec<OutboundRequest>>,
}

impl ScriptedTransport {
    /// Answer every request with `status`.
    pub fn always(status: u16) -> Self {
        Self::with_fallback(Reply::Status(status))
    }

    pub fn with_fallback(fallback: Reply) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer with `statuses` in order, then 200.
    pub fn statuses(statuses: impl IntoIterator<Item = u16>) -> Self {
        let transport = Self::always(200);
        transport
            .script
            .lock()
            .extend(statuses.into_iter().map(Reply::Status));
        transport
    }

    /// Append a reply to the script.
    #[must_use]
    pub fn then(self, reply: Reply) -> Self {
        self.script.lock().push_back(reply);
        self
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }
}

impl Transport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn send(&self, request: &OutboundRequest) -> Result<TransportResponse, TransportError> {
        self.requests.lock().push(request.clone());
        let reply = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        match reply {
            Reply::Status(status) => Ok(TransportResponse::new(status, "")),
            Reply::StatusWithBody(status, body) => Ok(TransportResponse::new(status, body)),
            Reply::Error(err) => Err(err),
            Reply::Hang => std::future::pending().await,
        }
    }
}
