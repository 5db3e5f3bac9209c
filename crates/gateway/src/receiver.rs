use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use futures::FutureExt;
use hookline_core::{EventStatus, HandlerOutcome, RequestHeaders, WebhookEvent};
use hookline_signature::SignatureError;
use hookline_state::{EventInsert, WebhookRepository};
use tracing::{debug, instrument, warn};

use crate::error::ReceiveError;
use crate::handlers::HandlerRegistry;
use crate::metrics::WebhookMetrics;
use crate::notifications::{LifecycleEvent, Notifier};
use crate::sources::{SourceRegistry, resolve_event_type};

/// An inbound HTTP request as the receiver sees it.
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    pub headers: RequestHeaders,
    /// Raw body bytes exactly as received. `None` when the framework
    /// consumed them before they could be retained.
    pub body: Option<Bytes>,
}

impl InboundRequest {
    pub fn new(headers: RequestHeaders, body: impl Into<Bytes>) -> Self {
        Self {
            headers,
            body: Some(body.into()),
        }
    }
}

/// Outcome of a successful [`WebhookReceiver::handle`].
#[derive(Debug, Clone)]
pub struct Received {
    pub event: WebhookEvent,
    /// The delivery id was already recorded; `event` is the original and no
    /// handler ran.
    pub duplicate: bool,
}

/// Inbound ingestion: verify, deduplicate, persist, then run handlers.
pub struct WebhookReceiver {
    repository: Arc<dyn WebhookRepository>,
    sources: SourceRegistry,
    handlers: HandlerRegistry,
    notifier: Notifier,
    metrics: Arc<WebhookMetrics>,
}

impl WebhookReceiver {
    pub(crate) fn new(
        repository: Arc<dyn WebhookRepository>,
        sources: SourceRegistry,
        handlers: HandlerRegistry,
        notifier: Notifier,
        metrics: Arc<WebhookMetrics>,
    ) -> Self {
        Self {
            repository,
            sources,
            handlers,
            notifier,
            metrics,
        }
    }

    pub fn sources(&self) -> &SourceRegistry {
        &self.sources
    }

    /// Ingest one request from `source`.
    ///
    /// A replayed delivery id returns the stored event with
    /// `duplicate: true`. Handler failures are recorded on the event and
    /// never fail the call.
    #[instrument(name = "receiver.handle", skip(self, request))]
    pub async fn handle(
        &self,
        source: &str,
        request: &InboundRequest,
    ) -> Result<Received, ReceiveError> {
        let profile = self
            .sources
            .get(source)
            .ok_or_else(|| ReceiveError::UnknownSource(source.to_owned()))?;
        let source_id = profile.source().clone();

        let Some(body) = request.body.as_deref() else {
            return Err(ReceiveError::RawBodyUnavailable);
        };
        let valid = match profile
            .signature()
            .verify(Some(body), &request.headers, profile.secret())
        {
            Ok(valid) => valid,
            Err(SignatureError::RawBodyUnavailable) => {
                return Err(ReceiveError::RawBodyUnavailable);
            }
            Err(SignatureError::Signing(error)) => {
                warn!(%error, "signature computation failed");
                false
            }
        };
        if !valid {
            self.metrics.increment_signatures_invalid();
            self.notifier.notify(&LifecycleEvent::SignatureInvalid {
                source: source_id.clone(),
            });
            return Err(ReceiveError::SignatureInvalid {
                source_name: source_id.to_string(),
            });
        }

        let payload: serde_json::Value = serde_json::from_slice(body).map_err(|e| {
            self.metrics.increment_payloads_malformed();
            ReceiveError::MalformedPayload(e.to_string())
        })?;
        let event_type = resolve_event_type(profile.as_ref(), &request.headers, &payload);
        let delivery_id = profile.delivery_id(&request.headers, &payload);

        if let Some(id) = &delivery_id
            && let Some(existing) = self
                .repository
                .find_event_by_delivery_id(&source_id, id)
                .await?
        {
            return Ok(self.duplicate(existing));
        }

        let event = WebhookEvent::new(source_id, event_type, delivery_id, payload)
            .with_headers(request.headers.clone());
        let inserted = self.repository.store_incoming_event(&event).await?;
        if let EventInsert::Duplicate(existing) = inserted {
            // Lost a race with a concurrent request carrying the same id.
            return Ok(self.duplicate(existing));
        }
        self.metrics.increment_events_received();
        debug!(event_id = %event.id, event_type = %event.event_type, "event stored");

        let event = self.run_handlers(event).await?;
        Ok(Received {
            event,
            duplicate: false,
        })
    }

    fn duplicate(&self, existing: WebhookEvent) -> Received {
        self.metrics.increment_events_duplicate();
        debug!(event_id = %existing.id, "duplicate delivery, returning stored event");
        self.notifier.notify(&LifecycleEvent::EventDuplicate {
            source: existing.source.clone(),
            event_id: existing.id.clone(),
        });
        Received {
            event: existing,
            duplicate: true,
        }
    }

    async fn run_handlers(&self, event: WebhookEvent) -> Result<WebhookEvent, ReceiveError> {
        let mut results = Vec::new();
        for (name, handler) in self.handlers.handlers_for(&event.source, &event.event_type) {
            let outcome = match AssertUnwindSafe(handler.handle(&event)).catch_unwind().await {
                Ok(Ok(())) => HandlerOutcome::ok(name),
                Ok(Err(e)) => HandlerOutcome::failed(name, e.to_string()),
                Err(panic) => HandlerOutcome::failed(
                    name,
                    format!("handler panicked: {}", panic_message(&*panic)),
                ),
            };
            if let Some(error) = &outcome.error {
                self.metrics.increment_handler_failures();
                self.notifier.notify(&LifecycleEvent::HandlerFailed {
                    event_id: event.id.clone(),
                    handler: name.to_owned(),
                    error: error.clone(),
                });
            }
            results.push(outcome);
        }

        let status = if results.iter().all(|r| r.success) {
            EventStatus::Processed
        } else {
            EventStatus::Failed
        };
        let updated = self
            .repository
            .update_event_status(&event.id, status, results, Utc::now())
            .await?;
        self.notifier.notify(&LifecycleEvent::EventHandled {
            event_id: updated.id.clone(),
            source: updated.source.clone(),
            event_type: updated.event_type.clone(),
            status,
        });
        Ok(updated)
    }
}

impl std::fmt::Debug for WebhookReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookReceiver")
            .field("sources", &self.sources)
            .field("handlers", &self.handlers)
            .finish_non_exhaustive()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
