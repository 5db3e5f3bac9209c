use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hookline_core::{
    AttemptResponse, DeliveryId, DeliveryQuery, DeliveryStats, EndpointId, EventId, EventStatus,
    FailedAttempt, HandlerOutcome, SourceId, StatusUpdate, WebhookDelivery, WebhookEndpoint,
    WebhookEvent, WebhookSubscription,
};

use crate::error::RepositoryError;

/// Outcome of [`WebhookRepository::store_incoming_event`].
#[derive(Debug, Clone)]
pub enum EventInsert {
    /// The event was new and has been stored.
    Inserted,
    /// Another event with the same `(source, delivery_id)` already exists.
    /// Carries the stored original.
    Duplicate(WebhookEvent),
}

/// Durable storage for inbound events, outbound deliveries, endpoints and
/// subscriptions.
///
/// Every delivery mutation is atomic with respect to the terminal check: an
/// implementation must refuse to change a delivery whose current status is
/// terminal and return [`RepositoryError::Terminal`] instead.
#[async_trait]
pub trait WebhookRepository: Send + Sync {
    /// Store a new inbound event.
    ///
    /// When the event carries a delivery id that is already recorded for the
    /// same source, nothing is written and the existing event is returned as
    /// [`EventInsert::Duplicate`]. The check and the insert are atomic.
    async fn store_incoming_event(&self, event: &WebhookEvent)
    -> Result<EventInsert, RepositoryError>;

    async fn find_event_by_delivery_id(
        &self,
        source: &SourceId,
        delivery_id: &str,
    ) -> Result<Option<WebhookEvent>, RepositoryError>;

    async fn get_event(&self, id: &EventId) -> Result<Option<WebhookEvent>, RepositoryError>;

    /// Record handler results on a stored event.
    async fn update_event_status(
        &self,
        id: &EventId,
        status: EventStatus,
        results: Vec<HandlerOutcome>,
        processed_at: DateTime<Utc>,
    ) -> Result<WebhookEvent, RepositoryError>;

    /// Store a new delivery. Fails with [`RepositoryError::Conflict`] if the
    /// id is taken.
    async fn store_outgoing_delivery(
        &self,
        delivery: &WebhookDelivery,
    ) -> Result<(), RepositoryError>;

    async fn update_delivery_status(
        &self,
        id: &DeliveryId,
        update: &StatusUpdate,
    ) -> Result<WebhookDelivery, RepositoryError>;

    /// Move a `pending` or `retrying` delivery to `dispatching` and return
    /// it. The caller owns the next attempt until it records an outcome.
    ///
    /// The status check and the write are atomic. A delivery that is already
    /// `dispatching` fails with [`RepositoryError::InFlight`]; a terminal one
    /// with [`RepositoryError::Terminal`].
    async fn claim_delivery(&self, id: &DeliveryId) -> Result<WebhookDelivery, RepositoryError>;

    /// Record a 2xx attempt. Increments `attempts` by one.
    async fn mark_delivery_succeeded(
        &self,
        id: &DeliveryId,
        response: &AttemptResponse,
    ) -> Result<WebhookDelivery, RepositoryError>;

    /// Record a failed attempt. Increments `attempts` by one.
    async fn mark_delivery_failed(
        &self,
        id: &DeliveryId,
        failure: &FailedAttempt,
    ) -> Result<WebhookDelivery, RepositoryError>;

    async fn get_delivery(
        &self,
        id: &DeliveryId,
    ) -> Result<Option<WebhookDelivery>, RepositoryError>;

    /// Deliveries matching `query`, oldest first.
    async fn list_deliveries(
        &self,
        query: &DeliveryQuery,
    ) -> Result<Vec<WebhookDelivery>, RepositoryError>;

    async fn count_deliveries_by_status(&self) -> Result<DeliveryStats, RepositoryError>;

    /// Active endpoints whose allow-list admits `event_type`.
    async fn find_endpoints_for_event(
        &self,
        event_type: &str,
    ) -> Result<Vec<WebhookEndpoint>, RepositoryError>;

    /// Active subscriptions with at least one pattern matching `event_type`.
    /// Payload filters are not evaluated here.
    async fn find_subscriptions_for_event(
        &self,
        event_type: &str,
    ) -> Result<Vec<WebhookSubscription>, RepositoryError>;

    async fn get_endpoint(
        &self,
        id: &EndpointId,
    ) -> Result<Option<WebhookEndpoint>, RepositoryError>;

    /// Insert or replace an endpoint.
    async fn save_endpoint(&self, endpoint: &WebhookEndpoint) -> Result<(), RepositoryError>;

    /// Insert or replace a subscription.
    async fn save_subscription(
        &self,
        subscription: &WebhookSubscription,
    ) -> Result<(), RepositoryError>;
}
