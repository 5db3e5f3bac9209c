use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use hookline_core::{
    AttemptResponse, CircuitBreakerStatus, DeliveryId, DeliveryQuery, DeliveryResult,
    DeliveryStats, DeliveryStatus, FailedAttempt, FailureReason, StatusUpdate, WebhookDelivery,
    WebhookEndpoint,
};
use hookline_executor::{DispatcherConfig, RetryQueue};
use hookline_provider::{DynTransport, OutboundRequest, TransportError, TransportResponse};
use hookline_signature::SignatureScheme;
use hookline_state::{RepositoryError, WebhookRepository};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};

use crate::circuit_breaker::{
    Admission, CircuitBreaker, CircuitBreakerRegistry, Permit, Transition,
};
use crate::error::DispatchError;
use crate::fallback::CircuitOpenFallback;
use crate::matcher::{first_per_endpoint, match_subscriptions};
use crate::metrics::{MetricsSnapshot, WebhookMetrics};
use crate::notifications::{LifecycleEvent, Notifier};

pub const HEADER_DELIVERY_ID: &str = "X-Webhook-Delivery-Id";
pub const HEADER_EVENT: &str = "X-Webhook-Event";
pub const HEADER_TIMESTAMP: &str = "X-Webhook-Timestamp";

/// Aggregated view returned by [`WebhookDispatcher::stats`].
#[derive(Debug, Clone, Serialize)]
pub struct DispatcherStats {
    pub deliveries: DeliveryStats,
    pub metrics: MetricsSnapshot,
    pub circuit_breakers: Vec<CircuitBreakerStatus>,
    /// Deliveries currently waiting in the retry queue.
    pub queued_retries: usize,
}

/// Everything the dispatcher is assembled from. Built by
/// [`DispatcherBuilder`](crate::builder::DispatcherBuilder).
pub(crate) struct DispatcherParts {
    pub repository: Arc<dyn WebhookRepository>,
    pub transport: Arc<dyn DynTransport>,
    pub breakers: Arc<CircuitBreakerRegistry>,
    pub signature: SignatureScheme,
    pub config: DispatcherConfig,
    pub notifier: Notifier,
    pub fallbacks: Vec<Arc<dyn CircuitOpenFallback>>,
    pub metrics: Arc<WebhookMetrics>,
}

struct Inner {
    repository: Arc<dyn WebhookRepository>,
    transport: Arc<dyn DynTransport>,
    breakers: Arc<CircuitBreakerRegistry>,
    signature: SignatureScheme,
    config: DispatcherConfig,
    notifier: Notifier,
    fallbacks: Vec<Arc<dyn CircuitOpenFallback>>,
    metrics: Arc<WebhookMetrics>,
    queue: RetryQueue,
    permits: Semaphore,
    tasks: TaskTracker,
}

/// Outbound delivery engine.
///
/// Each attempt consults the destination's circuit breaker, signs and posts
/// the payload, then records the outcome through the repository. Failed
/// attempts are retried with exponential backoff until the delivery's
/// attempt budget runs out.
///
/// Cloning is cheap; clones share the queue, breakers and task tracker.
#[derive(Clone)]
pub struct WebhookDispatcher {
    inner: Arc<Inner>,
}

impl WebhookDispatcher {
    pub(crate) fn from_parts(parts: DispatcherParts) -> Self {
        let permits = Semaphore::new(parts.config.max_concurrent);
        Self {
            inner: Arc::new(Inner {
                repository: parts.repository,
                transport: parts.transport,
                breakers: parts.breakers,
                signature: parts.signature,
                config: parts.config,
                notifier: parts.notifier,
                fallbacks: parts.fallbacks,
                metrics: parts.metrics,
                queue: RetryQueue::new(),
                permits,
                tasks: TaskTracker::new(),
            }),
        }
    }

    /// Persist `delivery` (if new) and run one attempt, waiting for it.
    #[instrument(name = "dispatcher.dispatch", skip_all, fields(delivery_id = %delivery.id))]
    pub async fn dispatch(
        &self,
        delivery: WebhookDelivery,
    ) -> Result<DeliveryResult, DispatchError> {
        self.persist_new(&delivery).await?;
        self.attempt(&delivery.id).await
    }

    /// Persist `delivery` and run its first attempt in the background.
    pub async fn submit(&self, delivery: WebhookDelivery) -> Result<DeliveryId, DispatchError> {
        if self.inner.tasks.is_closed() {
            return Err(DispatchError::Shutdown);
        }
        self.persist_new(&delivery).await?;
        self.spawn_attempt(delivery.id.clone());
        Ok(delivery.id)
    }

    /// Attempt a non-terminal delivery now, ahead of any scheduled retry.
    #[instrument(name = "dispatcher.retry", skip(self), fields(delivery_id = %id))]
    pub async fn retry(&self, id: &DeliveryId) -> Result<DeliveryResult, DispatchError> {
        let delivery = self.load(id).await?;
        if delivery.is_terminal() {
            return Err(DispatchError::Terminal {
                id: id.clone(),
                status: delivery.status,
            });
        }
        self.inner.queue.remove(id);
        self.attempt(id).await
    }

    /// Move a non-terminal delivery to `cancelled`.
    ///
    /// An attempt already in flight finishes, but its result is discarded.
    #[instrument(name = "dispatcher.cancel", skip(self), fields(delivery_id = %id))]
    pub async fn cancel(
        &self,
        id: &DeliveryId,
        reason: &str,
    ) -> Result<DeliveryResult, DispatchError> {
        let update = StatusUpdate::new(DeliveryStatus::Cancelled).with_note(reason);
        let cancelled = self
            .inner
            .repository
            .update_delivery_status(id, &update)
            .await?;
        self.inner.queue.remove(id);
        self.inner.metrics.increment_cancelled();
        self.inner.notifier.notify(&LifecycleEvent::DeliveryCancelled {
            delivery_id: id.clone(),
            reason: reason.to_owned(),
        });
        Ok(DeliveryResult::from(&cancelled))
    }

    /// Fan an event out to every matching subscription.
    ///
    /// One delivery is created per matched endpoint; when several
    /// subscriptions on the same endpoint match, the one with the lowest id
    /// wins.
    #[instrument(name = "dispatcher.publish", skip(self, payload))]
    pub async fn publish(
        &self,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<Vec<DeliveryId>, DispatchError> {
        let repo = &self.inner.repository;
        let subscriptions = repo.find_subscriptions_for_event(event_type).await?;
        let endpoints = repo.find_endpoints_for_event(event_type).await?;

        let deliveries: Vec<WebhookDelivery> = first_per_endpoint(match_subscriptions(
            event_type,
            &payload,
            &subscriptions,
            &endpoints,
        ))
        .into_iter()
        .map(|m| {
            WebhookDelivery::new(
                m.endpoint,
                event_type,
                payload.clone(),
                self.inner.config.max_attempts,
            )
            .with_subscription(m.subscription.id.clone())
        })
        .collect();
        debug!(matched = deliveries.len(), "publishing event");

        let mut ids = Vec::with_capacity(deliveries.len());
        for delivery in deliveries {
            ids.push(self.submit(delivery).await?);
        }
        Ok(ids)
    }

    /// Build a delivery for `endpoint` with the dispatcher's default budget.
    pub fn delivery_for(
        &self,
        endpoint: &WebhookEndpoint,
        event_type: &str,
        payload: serde_json::Value,
    ) -> WebhookDelivery {
        WebhookDelivery::new(endpoint, event_type, payload, self.inner.config.max_attempts)
    }

    pub async fn stats(&self) -> Result<DispatcherStats, DispatchError> {
        let deliveries = self.inner.repository.count_deliveries_by_status().await?;
        Ok(DispatcherStats {
            deliveries,
            metrics: self.inner.metrics.snapshot(),
            circuit_breakers: self.inner.breakers.snapshots(),
            queued_retries: self.inner.queue.len(),
        })
    }

    pub async fn get_delivery(&self, id: &DeliveryId) -> Result<WebhookDelivery, DispatchError> {
        self.load(id).await
    }

    /// Re-enqueue every persisted non-terminal delivery.
    ///
    /// `retrying` deliveries keep their scheduled time. `pending` ones never
    /// got a first attempt and `dispatching` ones were cut off mid-attempt;
    /// both are queued for now. Call once at startup, before any attempt
    /// runs, since a `dispatching` delivery is assumed abandoned.
    pub async fn recover(&self) -> Result<usize, DispatchError> {
        let repo = &self.inner.repository;
        let now = Utc::now();
        let mut recovered = 0;

        for delivery in repo
            .list_deliveries(&DeliveryQuery::with_status(DeliveryStatus::Pending))
            .await?
        {
            self.inner.queue.schedule(delivery.id, now);
            recovered += 1;
        }

        let release = StatusUpdate::new(DeliveryStatus::Retrying).with_next_retry(now);
        for delivery in repo
            .list_deliveries(&DeliveryQuery::with_status(DeliveryStatus::Dispatching))
            .await?
        {
            match repo.update_delivery_status(&delivery.id, &release).await {
                Ok(_) => {
                    self.inner.queue.schedule(delivery.id, now);
                    recovered += 1;
                }
                Err(e) if e.is_terminal() => {}
                Err(e) => return Err(e.into()),
            }
        }

        for delivery in repo
            .list_deliveries(&DeliveryQuery::with_status(DeliveryStatus::Retrying))
            .await?
        {
            let at = delivery.next_retry_at.unwrap_or(now);
            self.inner.queue.schedule(delivery.id, at);
            recovered += 1;
        }

        info!(count = recovered, "recovered unfinished deliveries");
        Ok(recovered)
    }

    /// Spawn an attempt for every retry due at `now`. Returns how many were
    /// started. Never waits on the attempts themselves.
    pub fn run_due(&self, now: DateTime<Utc>) -> usize {
        let due = self.inner.queue.pop_due(now);
        let mut started = 0;
        for id in due {
            if self.spawn_attempt(id.clone()) {
                started += 1;
            } else {
                // Shutting down; leave it for recovery on the next start.
                self.inner.queue.schedule(id, now);
            }
        }
        if started > 0 {
            debug!(started, "resubmitted due retries");
        }
        started
    }

    /// Open `destination`'s circuit for exactly `duration`.
    pub fn force_open(&self, destination: &str, duration: Duration) -> CircuitBreakerStatus {
        let breaker = self.inner.breakers.get_or_create(destination);
        let transition = breaker.force_open(duration);
        self.report_transition(&breaker, transition);
        breaker.snapshot()
    }

    /// Close `destination`'s circuit. `None` if no breaker exists for it.
    pub fn force_close(&self, destination: &str) -> Option<CircuitBreakerStatus> {
        let breaker = self.inner.breakers.get(destination)?;
        let transition = breaker.force_close();
        self.report_transition(&breaker, transition);
        Some(breaker.snapshot())
    }

    pub fn circuit_breakers(&self) -> &CircuitBreakerRegistry {
        &self.inner.breakers
    }

    pub fn metrics(&self) -> &WebhookMetrics {
        &self.inner.metrics
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.inner.config
    }

    pub fn queue(&self) -> &RetryQueue {
        &self.inner.queue
    }

    /// Stop accepting background work and wait for in-flight attempts.
    pub async fn shutdown(&self) {
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        info!("dispatcher shutdown complete");
    }

    // -- Attempt ----------------------------------------------------------

    async fn persist_new(&self, delivery: &WebhookDelivery) -> Result<(), DispatchError> {
        match self.inner.repository.store_outgoing_delivery(delivery).await {
            // Already stored: this is an existing lineage being re-driven.
            Ok(()) | Err(RepositoryError::Conflict { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn load(&self, id: &DeliveryId) -> Result<WebhookDelivery, DispatchError> {
        self.inner
            .repository
            .get_delivery(id)
            .await?
            .ok_or_else(|| DispatchError::NotFound(id.clone()))
    }

    fn spawn_attempt(&self, id: DeliveryId) -> bool {
        if self.inner.tasks.is_closed() {
            return false;
        }
        let this = self.clone();
        self.inner.tasks.spawn(async move {
            match this.attempt(&id).await {
                Ok(_) => {}
                Err(DispatchError::InFlight(_)) => {
                    debug!(delivery_id = %id, "attempt already in flight, skipping");
                }
                Err(e) => {
                    warn!(delivery_id = %id, error = %e, "background delivery attempt failed");
                }
            }
        });
        true
    }

    #[instrument(name = "dispatcher.attempt", skip(self), fields(delivery_id = %id))]
    async fn attempt(&self, id: &DeliveryId) -> Result<DeliveryResult, DispatchError> {
        let inner = &self.inner;
        let _slot = inner
            .permits
            .acquire()
            .await
            .map_err(|_| DispatchError::Shutdown)?;

        // The claim is the only way into `dispatching`, so at most one
        // attempt per delivery runs at a time.
        let delivery = match inner.repository.claim_delivery(id).await {
            Ok(delivery) => delivery,
            Err(RepositoryError::Terminal { status, .. }) => {
                debug!(%status, "delivery already terminal, skipping attempt");
                return Ok(DeliveryResult::from(&self.load(id).await?));
            }
            Err(e) => return Err(e.into()),
        };
        let Some(endpoint) = inner.repository.get_endpoint(&delivery.endpoint_id).await? else {
            warn!(endpoint_id = %delivery.endpoint_id, "endpoint removed, cancelling delivery");
            return self.cancel(id, "endpoint no longer exists").await;
        };

        let breaker = inner.breakers.get_or_create(&delivery.url);
        let (admission, transition) = breaker.check();
        self.report_transition(&breaker, transition);
        let permit = match admission {
            Admission::Allowed { permit, .. } => permit,
            Admission::Rejected { retry_after } => {
                return self.defer(&delivery, &breaker, retry_after).await;
            }
        };

        let request = match self.build_request(&delivery, &endpoint) {
            Ok(request) => request,
            Err(e) => {
                breaker.abandon_trial(permit);
                self.release(id).await;
                return Err(e);
            }
        };

        let attempt = delivery.attempts.saturating_add(1);
        inner.metrics.increment_attempts();
        inner.notifier.notify(&LifecycleEvent::DeliveryAttempting {
            delivery_id: id.clone(),
            endpoint_id: delivery.endpoint_id.clone(),
            destination: breaker.destination().to_owned(),
            attempt,
        });

        let started = Instant::now();
        let timeout = inner.config.request_timeout;
        let outcome = tokio::time::timeout(timeout, inner.transport.send(&request))
            .await
            .unwrap_or(Err(TransportError::Timeout(timeout)));
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok(response) if response.is_success() => {
                self.on_success(&delivery, &breaker, permit, &response, latency_ms)
                    .await
            }
            Ok(response) => {
                let recorded = AttemptResponse {
                    status_code: Some(response.status),
                    body: Some(response.body_text(inner.config.response_body_limit)),
                    latency_ms,
                };
                let error = format!("HTTP {}", response.status);
                self.on_failure(
                    &delivery,
                    &breaker,
                    permit,
                    FailureReason::DestinationRejected,
                    error,
                    recorded,
                )
                .await
            }
            Err(e) => {
                let recorded = AttemptResponse {
                    status_code: None,
                    body: None,
                    latency_ms,
                };
                self.on_failure(
                    &delivery,
                    &breaker,
                    permit,
                    e.failure_reason(),
                    e.to_string(),
                    recorded,
                )
                .await
            }
        }
    }

    fn build_request(
        &self,
        delivery: &WebhookDelivery,
        endpoint: &WebhookEndpoint,
    ) -> Result<OutboundRequest, DispatchError> {
        let body = serde_json::to_vec(&delivery.payload)
            .map_err(|e| DispatchError::Encoding(e.to_string()))?;
        let now = Utc::now();
        let signed = self.inner.signature.sign_at(&body, &endpoint.secret, now)?;

        Ok(
            OutboundRequest::new(delivery.url.clone(), body, self.inner.config.request_timeout)
                .with_response_limit(self.inner.config.response_body_limit)
                .with_header("Content-Type", "application/json")
                .with_header(HEADER_EVENT, delivery.event_type.clone())
                .with_header(HEADER_DELIVERY_ID, delivery.id.to_string())
                .with_header(HEADER_TIMESTAMP, now.timestamp().to_string())
                .with_header(signed.name, signed.value),
        )
    }

    async fn on_success(
        &self,
        delivery: &WebhookDelivery,
        breaker: &CircuitBreaker,
        permit: Permit,
        response: &TransportResponse,
        latency_ms: u64,
    ) -> Result<DeliveryResult, DispatchError> {
        let inner = &self.inner;
        let transition = breaker.record_success(permit);
        self.report_transition(breaker, transition);

        let recorded = AttemptResponse {
            status_code: Some(response.status),
            body: Some(response.body_text(inner.config.response_body_limit)),
            latency_ms,
        };
        let updated = match inner
            .repository
            .mark_delivery_succeeded(&delivery.id, &recorded)
            .await
        {
            Ok(updated) => updated,
            Err(e) => return self.discard_if_terminal(&delivery.id, e).await,
        };

        inner.metrics.increment_delivered();
        debug!(
            attempts = updated.attempts,
            status_code = response.status,
            latency_ms,
            "delivery succeeded"
        );
        inner.notifier.notify(&LifecycleEvent::DeliverySucceeded {
            delivery_id: delivery.id.clone(),
            attempts: updated.attempts,
            status_code: response.status,
            latency_ms,
        });
        Ok(DeliveryResult::from(&updated))
    }

    async fn on_failure(
        &self,
        delivery: &WebhookDelivery,
        breaker: &CircuitBreaker,
        permit: Permit,
        reason: FailureReason,
        error: String,
        response: AttemptResponse,
    ) -> Result<DeliveryResult, DispatchError> {
        let inner = &self.inner;
        let transition = breaker.record_failure(permit);
        self.report_transition(breaker, transition);
        inner.metrics.increment_attempt_failures();

        // `delivery` is the claimed copy, so this is the attempt just made.
        let attempts = delivery.attempts.saturating_add(1);
        let next_retry_at = (attempts < delivery.max_attempts)
            .then(|| after(Utc::now(), inner.config.retry.delay_for(attempts)));
        let reason = if next_retry_at.is_some() {
            reason
        } else {
            FailureReason::MaxRetriesExceeded
        };

        let failure = FailedAttempt {
            next_retry_at,
            reason,
            error: error.clone(),
            response,
        };
        let updated = match inner
            .repository
            .mark_delivery_failed(&delivery.id, &failure)
            .await
        {
            Ok(updated) => updated,
            Err(e) => return self.discard_if_terminal(&delivery.id, e).await,
        };

        if let Some(at) = next_retry_at {
            inner.queue.schedule(delivery.id.clone(), at);
            inner.metrics.increment_retries_scheduled();
            warn!(
                attempt = attempts,
                max_attempts = delivery.max_attempts,
                %reason,
                %error,
                retry_at = %at,
                "delivery attempt failed, retry scheduled"
            );
        } else {
            inner.metrics.increment_exhausted();
            info!(attempts, %error, "delivery exhausted");
        }
        inner.notifier.notify(&LifecycleEvent::DeliveryFailed {
            delivery_id: delivery.id.clone(),
            attempts,
            reason,
            error,
            next_retry_at,
        });
        Ok(DeliveryResult::from(&updated))
    }

    /// Circuit refused the attempt: park the delivery until the breaker may
    /// admit again. No attempt is consumed.
    async fn defer(
        &self,
        delivery: &WebhookDelivery,
        breaker: &CircuitBreaker,
        retry_after: Duration,
    ) -> Result<DeliveryResult, DispatchError> {
        let inner = &self.inner;
        inner.metrics.increment_circuit_open();

        let retry_at = after(Utc::now(), retry_after.max(inner.config.scheduler_interval));
        debug!(
            destination = breaker.destination(),
            %retry_at,
            "circuit open, deferring delivery"
        );
        let update = StatusUpdate::new(DeliveryStatus::Retrying)
            .with_next_retry(retry_at)
            .with_reason(FailureReason::CircuitOpen);
        let updated = match inner
            .repository
            .update_delivery_status(&delivery.id, &update)
            .await
        {
            Ok(updated) => updated,
            Err(e) => return self.discard_if_terminal(&delivery.id, e).await,
        };
        inner.queue.schedule(delivery.id.clone(), retry_at);

        for fallback in &inner.fallbacks {
            inner.metrics.increment_circuit_fallbacks();
            if let Err(error) = fallback
                .on_circuit_open(&updated, breaker.destination())
                .await
            {
                warn!(fallback = fallback.name(), %error, "circuit-open fallback failed");
            }
        }

        inner.notifier.notify(&LifecycleEvent::DeliveryDeferred {
            delivery_id: delivery.id.clone(),
            destination: breaker.destination().to_owned(),
            retry_at,
        });
        Ok(DeliveryResult::from(&updated))
    }

    /// Hand a claimed delivery back without consuming an attempt. It stays
    /// `retrying` with nothing scheduled; `retry` or `recover` picks it up.
    async fn release(&self, id: &DeliveryId) {
        let update = StatusUpdate::new(DeliveryStatus::Retrying);
        if let Err(e) = self.inner.repository.update_delivery_status(id, &update).await
            && !e.is_terminal()
        {
            warn!(delivery_id = %id, error = %e, "failed to release claimed delivery");
        }
    }

    /// A terminal refusal from the repository means the delivery was
    /// cancelled (or finished) while this attempt ran. Report the stored
    /// state instead of failing.
    async fn discard_if_terminal(
        &self,
        id: &DeliveryId,
        err: RepositoryError,
    ) -> Result<DeliveryResult, DispatchError> {
        if !err.is_terminal() {
            return Err(err.into());
        }
        let current = self.load(id).await?;
        debug!(status = %current.status, "delivery became terminal mid-attempt, result discarded");
        Ok(DeliveryResult::from(&current))
    }

    fn report_transition(&self, breaker: &CircuitBreaker, transition: Option<Transition>) {
        let Some((from, to)) = transition else {
            return;
        };
        self.inner.metrics.increment_circuit_transitions();
        self.inner.notifier.notify(&LifecycleEvent::CircuitTransition {
            destination: breaker.destination().to_owned(),
            from,
            to,
        });
    }
}

impl std::fmt::Debug for WebhookDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookDispatcher")
            .field("transport", &self.inner.transport.name())
            .field("config", &self.inner.config)
            .field("queued_retries", &self.inner.queue.len())
            .finish_non_exhaustive()
    }
}

/// `now + delay`, saturating instead of overflowing.
fn after(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    let delta = TimeDelta::from_std(delay).unwrap_or(TimeDelta::MAX);
    now.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC)
}
