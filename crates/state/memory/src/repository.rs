use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use hookline_core::{
    AttemptResponse, DeliveryId, DeliveryQuery, DeliveryStats, DeliveryStatus, EndpointId,
    EventId, EventStatus, FailedAttempt, HandlerOutcome, SourceId, StatusUpdate, SubscriptionId, WebhookDelivery,
    WebhookEndpoint, WebhookEvent, WebhookSubscription,
};
use hookline_state::{EventInsert, RepositoryError, WebhookRepository};

/// In-memory [`WebhookRepository`] backed by [`DashMap`]s.
///
/// Each delivery mutation runs under the map's shard lock for that key, so
/// the terminal check and the write are atomic. Nothing is persisted across
/// restarts.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    events: DashMap<EventId, WebhookEvent>,
    /// `(source, delivery_id)` to the event that claimed it.
    event_index: DashMap<(SourceId, String), EventId>,
    deliveries: DashMap<DeliveryId, WebhookDelivery>,
    endpoints: DashMap<EndpointId, WebhookEndpoint>,
    subscriptions: DashMap<SubscriptionId, WebhookSubscription>,
}

impl MemoryRepository {
    /// Create a new, empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `mutate` to a non-terminal delivery and return the result.
    fn mutate_delivery(
        &self,
        id: &DeliveryId,
        mutate: impl FnOnce(&mut WebhookDelivery, DateTime<Utc>),
    ) -> Result<WebhookDelivery, RepositoryError> {
        let mut entry = self
            .deliveries
            .get_mut(id)
            .ok_or_else(|| RepositoryError::not_found("delivery", id.as_str()))?;
        if entry.is_terminal() {
            return Err(RepositoryError::Terminal {
                id: id.clone(),
                status: entry.status,
            });
        }
        mutate(&mut entry, Utc::now());
        Ok(entry.value().clone())
    }
}

#[async_trait]
impl WebhookRepository for MemoryRepository {
    async fn store_incoming_event(
        &self,
        event: &WebhookEvent,
    ) -> Result<EventInsert, RepositoryError> {
        let Some(delivery_id) = &event.delivery_id else {
            self.events.insert(event.id.clone(), event.clone());
            return Ok(EventInsert::Inserted);
        };

        // The index entry guard is held until the event is written, so a
        // concurrent insert of the same key observes either nothing or both.
        match self
            .event_index
            .entry((event.source.clone(), delivery_id.clone()))
        {
            Entry::Occupied(existing) => {
                let original = self.events.get(existing.get()).map(|e| e.value().clone());
                original.map(EventInsert::Duplicate).ok_or_else(|| {
                    RepositoryError::Backend(format!(
                        "index points at missing event {}",
                        existing.get()
                    ))
                })
            }
            Entry::Vacant(vacant) => {
                self.events.insert(event.id.clone(), event.clone());
                vacant.insert(event.id.clone());
                Ok(EventInsert::Inserted)
            }
        }
    }

    async fn find_event_by_delivery_id(
        &self,
        source: &SourceId,
        delivery_id: &str,
    ) -> Result<Option<WebhookEvent>, RepositoryError> {
        let key = (source.clone(), delivery_id.to_owned());
        let Some(id) = self.event_index.get(&key).map(|id| id.value().clone()) else {
            return Ok(None);
        };
        Ok(self.events.get(&id).map(|e| e.value().clone()))
    }

    async fn get_event(&self, id: &EventId) -> Result<Option<WebhookEvent>, RepositoryError> {
        Ok(self.events.get(id).map(|e| e.value().clone()))
    }

    async fn update_event_status(
        &self,
        id: &EventId,
        status: EventStatus,
        results: Vec<HandlerOutcome>,
        processed_at: DateTime<Utc>,
    ) -> Result<WebhookEvent, RepositoryError> {
        let mut event = self
            .events
            .get_mut(id)
            .ok_or_else(|| RepositoryError::not_found("event", id.as_str()))?;
        event.status = status;
        event.handler_results = results;
        event.processed_at = Some(processed_at);
        Ok(event.value().clone())
    }

    async fn store_outgoing_delivery(
        &self,
        delivery: &WebhookDelivery,
    ) -> Result<(), RepositoryError> {
        match self.deliveries.entry(delivery.id.clone()) {
            Entry::Occupied(_) => Err(RepositoryError::Conflict {
                kind: "delivery",
                id: delivery.id.to_string(),
            }),
            Entry::Vacant(vacant) => {
                vacant.insert(delivery.clone());
                Ok(())
            }
        }
    }

    async fn update_delivery_status(
        &self,
        id: &DeliveryId,
        update: &StatusUpdate,
    ) -> Result<WebhookDelivery, RepositoryError> {
        self.mutate_delivery(id, |d, now| d.apply_status(update, now))
    }

    async fn claim_delivery(&self, id: &DeliveryId) -> Result<WebhookDelivery, RepositoryError> {
        let mut entry = self
            .deliveries
            .get_mut(id)
            .ok_or_else(|| RepositoryError::not_found("delivery", id.as_str()))?;
        if entry.is_terminal() {
            return Err(RepositoryError::Terminal {
                id: id.clone(),
                status: entry.status,
            });
        }
        if !entry.status.is_claimable() {
            return Err(RepositoryError::InFlight { id: id.clone() });
        }
        entry.apply_status(&StatusUpdate::new(DeliveryStatus::Dispatching), Utc::now());
        Ok(entry.value().clone())
    }

    async fn mark_delivery_succeeded(
        &self,
        id: &DeliveryId,
        response: &AttemptResponse,
    ) -> Result<WebhookDelivery, RepositoryError> {
        self.mutate_delivery(id, |d, now| d.apply_success(response, now))
    }

    async fn mark_delivery_failed(
        &self,
        id: &DeliveryId,
        failure: &FailedAttempt,
    ) -> Result<WebhookDelivery, RepositoryError> {
        self.mutate_delivery(id, |d, now| d.apply_failure(failure, now))
    }

    async fn get_delivery(
        &self,
        id: &DeliveryId,
    ) -> Result<Option<WebhookDelivery>, RepositoryError> {
        Ok(self.deliveries.get(id).map(|d| d.value().clone()))
    }

    async fn list_deliveries(
        &self,
        query: &DeliveryQuery,
    ) -> Result<Vec<WebhookDelivery>, RepositoryError> {
        let mut found: Vec<WebhookDelivery> = self
            .deliveries
            .iter()
            .filter(|d| query.status.is_none_or(|s| d.status == s))
            .filter(|d| {
                query
                    .endpoint_id
                    .as_ref()
                    .is_none_or(|ep| &d.endpoint_id == ep)
            })
            .map(|d| d.value().clone())
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        if let Some(limit) = query.limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    async fn count_deliveries_by_status(&self) -> Result<DeliveryStats, RepositoryError> {
        Ok(DeliveryStats::from_counts(
            self.deliveries.iter().map(|d| (d.status, 1)),
        ))
    }

    async fn find_endpoints_for_event(
        &self,
        event_type: &str,
    ) -> Result<Vec<WebhookEndpoint>, RepositoryError> {
        Ok(self
            .endpoints
            .iter()
            .filter(|ep| ep.active && ep.accepts_event(event_type))
            .map(|ep| ep.value().clone())
            .collect())
    }

    async fn find_subscriptions_for_event(
        &self,
        event_type: &str,
    ) -> Result<Vec<WebhookSubscription>, RepositoryError> {
        Ok(self
            .subscriptions
            .iter()
            .filter(|s| s.active && s.matches_event_type(event_type))
            .map(|s| s.value().clone())
            .collect())
    }

    async fn get_endpoint(
        &self,
        id: &EndpointId,
    ) -> Result<Option<WebhookEndpoint>, RepositoryError> {
        Ok(self.endpoints.get(id).map(|ep| ep.value().clone()))
    }

    async fn save_endpoint(&self, endpoint: &WebhookEndpoint) -> Result<(), RepositoryError> {
        self.endpoints.insert(endpoint.id.clone(), endpoint.clone());
        Ok(())
    }

    async fn save_subscription(
        &self,
        subscription: &WebhookSubscription,
    ) -> Result<(), RepositoryError> {
        self.subscriptions
            .insert(subscription.id.clone(), subscription.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use hookline_state::testing::run_repository_conformance_tests;
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn conformance() {
        let repo = MemoryRepository::new();
        run_repository_conformance_tests(&repo)
            .await
            .expect("conformance tests should pass");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_duplicate_inserts_store_one_event() {
        let repo = Arc::new(MemoryRepository::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let repo = Arc::clone(&repo);
            handles.push(tokio::spawn(async move {
                let event =
                    WebhookEvent::new("github", "push", Some("race".into()), json!({ "i": i }));
                repo.store_incoming_event(&event).await.unwrap()
            }));
        }

        let mut inserted = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), EventInsert::Inserted) {
                inserted += 1;
            }
        }
        assert_eq!(inserted, 1, "exactly one concurrent insert should win");
        assert_eq!(repo.events.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_claims_admit_one_attempt() {
        let repo = Arc::new(MemoryRepository::new());
        let ep = WebhookEndpoint::new("https://example.com", "s");
        let d = WebhookDelivery::new(&ep, "x", json!({}), 1);
        repo.store_outgoing_delivery(&d).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let repo = Arc::clone(&repo);
            let id = d.id.clone();
            handles.push(tokio::spawn(async move { repo.claim_delivery(&id).await }));
        }

        let mut claimed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(d) => {
                    assert_eq!(d.status, DeliveryStatus::Dispatching);
                    claimed += 1;
                }
                Err(e) => assert!(matches!(e, RepositoryError::InFlight { .. }), "{e}"),
            }
        }
        assert_eq!(claimed, 1, "exactly one concurrent claim should win");
    }

    #[tokio::test]
    async fn exhausted_delivery_rejects_further_updates() {
        let repo = MemoryRepository::new();
        let ep = WebhookEndpoint::new("https://example.com", "s");
        let d = WebhookDelivery::new(&ep, "x", json!({}), 1);
        repo.store_outgoing_delivery(&d).await.unwrap();

        let failure = FailedAttempt {
            next_retry_at: None,
            reason: hookline_core::FailureReason::MaxRetriesExceeded,
            error: "HTTP 503".into(),
            response: AttemptResponse::default(),
        };
        let updated = repo.mark_delivery_failed(&d.id, &failure).await.unwrap();
        assert_eq!(updated.status, DeliveryStatus::Exhausted);

        let err = repo
            .update_delivery_status(&d.id, &StatusUpdate::new(DeliveryStatus::Dispatching))
            .await
            .unwrap_err();
        assert!(err.is_terminal());
    }
}
