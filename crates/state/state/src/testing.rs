use chrono::{Duration, Utc};
use hookline_core::{
    AttemptResponse, DeliveryId, DeliveryQuery, DeliveryStatus, EventPattern, EventStatus,
    FailedAttempt, FailureReason, HandlerOutcome, SourceId, StatusUpdate, WebhookDelivery,
    WebhookEndpoint, WebhookEvent, WebhookSubscription,
};
use serde_json::json;

use crate::error::RepositoryError;
use crate::repository::{EventInsert, WebhookRepository};

fn pattern(p: &str) -> EventPattern {
    EventPattern::parse(p).unwrap_or_else(|e| panic!("bad test pattern {p}: {e}"))
}

fn endpoint() -> WebhookEndpoint {
    WebhookEndpoint::new("https://subscriber.test/hook", "secret")
}

fn delivery_for(endpoint: &WebhookEndpoint) -> WebhookDelivery {
    WebhookDelivery::new(endpoint, "order.created", json!({"id": 1}), 3)
}

fn failure(exhausted: bool) -> FailedAttempt {
    FailedAttempt {
        next_retry_at: (!exhausted).then(|| Utc::now() + Duration::seconds(30)),
        reason: if exhausted {
            FailureReason::MaxRetriesExceeded
        } else {
            FailureReason::DestinationRejected
        },
        error: "HTTP 500".into(),
        response: AttemptResponse {
            status_code: Some(500),
            body: Some("oops".into()),
            latency_ms: 5,
        },
    }
}

/// Run the full repository conformance test suite.
///
/// Call this from your backend's test module with a fresh repository.
///
/// # Errors
///
/// Returns an error if any repository call fails unexpectedly.
pub async fn run_repository_conformance_tests(
    repo: &dyn WebhookRepository,
) -> Result<(), RepositoryError> {
    test_event_insert_and_lookup(repo).await?;
    test_duplicate_event_returns_original(repo).await?;
    test_delivery_id_is_scoped_per_source(repo).await?;
    test_update_event_status(repo).await?;
    test_delivery_conflict(repo).await?;
    test_delivery_success(repo).await?;
    test_delivery_failure_then_exhausted(repo).await?;
    test_claim_is_exclusive(repo).await?;
    test_terminal_deliveries_are_immutable(repo).await?;
    test_missing_delivery_is_not_found(repo).await?;
    test_list_and_count_deliveries(repo).await?;
    test_endpoint_lookup(repo).await?;
    test_subscription_lookup(repo).await?;
    Ok(())
}

async fn test_event_insert_and_lookup(repo: &dyn WebhookRepository) -> Result<(), RepositoryError> {
    let event = WebhookEvent::new("conf-a", "push", Some("d-1".into()), json!({"a": 1}));
    let outcome = repo.store_incoming_event(&event).await?;
    assert!(
        matches!(outcome, EventInsert::Inserted),
        "first insert should be stored"
    );

    let loaded = repo.get_event(&event.id).await?;
    assert_eq!(
        loaded.map(|e| e.event_type),
        Some("push".to_owned()),
        "stored event should be retrievable by id"
    );

    let found = repo
        .find_event_by_delivery_id(&SourceId::new("conf-a"), "d-1")
        .await?;
    assert_eq!(found.map(|e| e.id), Some(event.id.clone()));

    let missing = repo
        .find_event_by_delivery_id(&SourceId::new("conf-a"), "nope")
        .await?;
    assert!(missing.is_none(), "unknown delivery id should return None");
    Ok(())
}

async fn test_duplicate_event_returns_original(
    repo: &dyn WebhookRepository,
) -> Result<(), RepositoryError> {
    let first = WebhookEvent::new("conf-b", "push", Some("dup".into()), json!({"n": 1}));
    repo.store_incoming_event(&first).await?;

    let second = WebhookEvent::new("conf-b", "push", Some("dup".into()), json!({"n": 2}));
    match repo.store_incoming_event(&second).await? {
        EventInsert::Duplicate(existing) => {
            assert_eq!(existing.id, first.id, "duplicate should carry the original");
            assert_eq!(existing.payload, json!({"n": 1}));
        }
        EventInsert::Inserted => panic!("second insert with same delivery id must not store"),
    }
    assert!(
        repo.get_event(&second.id).await?.is_none(),
        "duplicate must not be written"
    );

    // Events without a delivery id are never de-duplicated.
    let a = WebhookEvent::new("conf-b", "push", None, json!({}));
    let b = WebhookEvent::new("conf-b", "push", None, json!({}));
    assert!(matches!(
        repo.store_incoming_event(&a).await?,
        EventInsert::Inserted
    ));
    assert!(matches!(
        repo.store_incoming_event(&b).await?,
        EventInsert::Inserted
    ));
    Ok(())
}

async fn test_delivery_id_is_scoped_per_source(
    repo: &dyn WebhookRepository,
) -> Result<(), RepositoryError> {
    let a = WebhookEvent::new("conf-c1", "push", Some("shared".into()), json!({}));
    let b = WebhookEvent::new("conf-c2", "push", Some("shared".into()), json!({}));
    assert!(matches!(
        repo.store_incoming_event(&a).await?,
        EventInsert::Inserted
    ));
    assert!(
        matches!(repo.store_incoming_event(&b).await?, EventInsert::Inserted),
        "same delivery id from another source is a different event"
    );
    Ok(())
}

async fn test_update_event_status(repo: &dyn WebhookRepository) -> Result<(), RepositoryError> {
    let event = WebhookEvent::new("conf-d", "push", None, json!({}));
    repo.store_incoming_event(&event).await?;

    let now = Utc::now();
    let updated = repo
        .update_event_status(
            &event.id,
            EventStatus::Failed,
            vec![HandlerOutcome::ok("a"), HandlerOutcome::failed("b", "boom")],
            now,
        )
        .await?;
    assert_eq!(updated.status, EventStatus::Failed);
    assert_eq!(updated.handler_results.len(), 2);
    assert_eq!(updated.processed_at, Some(now));

    let missing = WebhookEvent::new("conf-d", "push", None, json!({}));
    let err = repo
        .update_event_status(&missing.id, EventStatus::Processed, Vec::new(), now)
        .await;
    assert!(
        matches!(err, Err(RepositoryError::NotFound { .. })),
        "updating an unknown event should be NotFound"
    );
    Ok(())
}

async fn test_delivery_conflict(repo: &dyn WebhookRepository) -> Result<(), RepositoryError> {
    let d = delivery_for(&endpoint());
    repo.store_outgoing_delivery(&d).await?;
    let again = repo.store_outgoing_delivery(&d).await;
    assert!(
        matches!(again, Err(RepositoryError::Conflict { .. })),
        "storing the same delivery id twice should conflict"
    );
    Ok(())
}

async fn test_delivery_success(repo: &dyn WebhookRepository) -> Result<(), RepositoryError> {
    let d = delivery_for(&endpoint());
    repo.store_outgoing_delivery(&d).await?;

    let dispatching = repo
        .update_delivery_status(&d.id, &StatusUpdate::new(DeliveryStatus::Dispatching))
        .await?;
    assert_eq!(dispatching.status, DeliveryStatus::Dispatching);
    assert_eq!(dispatching.attempts, 0, "status updates do not count attempts");

    let done = repo
        .mark_delivery_succeeded(
            &d.id,
            &AttemptResponse {
                status_code: Some(204),
                body: None,
                latency_ms: 7,
            },
        )
        .await?;
    assert_eq!(done.status, DeliveryStatus::Success);
    assert_eq!(done.attempts, 1);
    assert_eq!(done.last_status_code, Some(204));
    assert_eq!(done.last_latency_ms, Some(7));
    assert!(done.last_attempt_at.is_some());

    let loaded = repo.get_delivery(&d.id).await?;
    assert_eq!(loaded.map(|x| x.status), Some(DeliveryStatus::Success));
    Ok(())
}

async fn test_delivery_failure_then_exhausted(
    repo: &dyn WebhookRepository,
) -> Result<(), RepositoryError> {
    let d = delivery_for(&endpoint());
    repo.store_outgoing_delivery(&d).await?;

    let retrying = repo.mark_delivery_failed(&d.id, &failure(false)).await?;
    assert_eq!(retrying.status, DeliveryStatus::Retrying);
    assert_eq!(retrying.attempts, 1);
    assert!(retrying.next_retry_at.is_some());
    assert_eq!(
        retrying.failure_reason,
        Some(FailureReason::DestinationRejected)
    );

    let exhausted = repo.mark_delivery_failed(&d.id, &failure(true)).await?;
    assert_eq!(exhausted.status, DeliveryStatus::Exhausted);
    assert_eq!(exhausted.attempts, 2, "each recorded failure is one attempt");
    assert!(exhausted.next_retry_at.is_none());
    Ok(())
}

async fn test_claim_is_exclusive(repo: &dyn WebhookRepository) -> Result<(), RepositoryError> {
    let d = delivery_for(&endpoint());
    repo.store_outgoing_delivery(&d).await?;

    let claimed = repo.claim_delivery(&d.id).await?;
    assert_eq!(claimed.status, DeliveryStatus::Dispatching);
    assert_eq!(claimed.attempts, 0, "claiming does not count an attempt");

    let second = repo.claim_delivery(&d.id).await;
    assert!(
        matches!(second, Err(RepositoryError::InFlight { .. })),
        "a dispatching delivery cannot be claimed again"
    );

    let retrying = repo.mark_delivery_failed(&d.id, &failure(false)).await?;
    assert_eq!(retrying.attempts, 1);
    let reclaimed = repo.claim_delivery(&d.id).await?;
    assert_eq!(reclaimed.status, DeliveryStatus::Dispatching);
    assert_eq!(reclaimed.attempts, 1);

    let done = repo
        .mark_delivery_succeeded(&d.id, &AttemptResponse::default())
        .await?;
    assert_eq!(done.attempts, 2);
    let err = repo.claim_delivery(&d.id).await;
    assert!(
        matches!(err, Err(RepositoryError::Terminal { .. })),
        "a finished delivery cannot be claimed"
    );

    let missing = repo.claim_delivery(&DeliveryId::generate()).await;
    assert!(matches!(missing, Err(RepositoryError::NotFound { .. })));
    Ok(())
}

async fn test_terminal_deliveries_are_immutable(
    repo: &dyn WebhookRepository,
) -> Result<(), RepositoryError> {
    let d = delivery_for(&endpoint());
    repo.store_outgoing_delivery(&d).await?;
    repo.update_delivery_status(
        &d.id,
        &StatusUpdate::new(DeliveryStatus::Cancelled).with_note("unsubscribed"),
    )
    .await?;

    let err = repo
        .mark_delivery_succeeded(&d.id, &AttemptResponse::default())
        .await;
    assert!(
        matches!(err, Err(RepositoryError::Terminal { .. })),
        "success on a cancelled delivery must be refused"
    );

    let err = repo.mark_delivery_failed(&d.id, &failure(false)).await;
    assert!(
        matches!(err, Err(RepositoryError::Terminal { .. })),
        "failure on a cancelled delivery must be refused"
    );

    let err = repo
        .update_delivery_status(&d.id, &StatusUpdate::new(DeliveryStatus::Retrying))
        .await;
    assert!(
        matches!(err, Err(RepositoryError::Terminal { .. })),
        "status change on a cancelled delivery must be refused"
    );

    let stored = repo.get_delivery(&d.id).await?;
    let stored = stored.unwrap_or_else(|| panic!("delivery {} disappeared", d.id));
    assert_eq!(stored.status, DeliveryStatus::Cancelled);
    assert_eq!(stored.cancel_reason.as_deref(), Some("unsubscribed"));
    assert_eq!(stored.attempts, 0);
    Ok(())
}

async fn test_missing_delivery_is_not_found(
    repo: &dyn WebhookRepository,
) -> Result<(), RepositoryError> {
    let id = DeliveryId::generate();
    assert!(repo.get_delivery(&id).await?.is_none());
    let err = repo
        .update_delivery_status(&id, &StatusUpdate::new(DeliveryStatus::Dispatching))
        .await;
    assert!(matches!(err, Err(RepositoryError::NotFound { .. })));
    Ok(())
}

async fn test_list_and_count_deliveries(
    repo: &dyn WebhookRepository,
) -> Result<(), RepositoryError> {
    let before = repo.count_deliveries_by_status().await?;

    let ep = endpoint();
    let first = delivery_for(&ep);
    let second = delivery_for(&ep);
    let third = delivery_for(&ep);
    for d in [&first, &second, &third] {
        repo.store_outgoing_delivery(d).await?;
    }
    repo.mark_delivery_failed(&second.id, &failure(false))
        .await?;

    let all = repo
        .list_deliveries(&DeliveryQuery {
            endpoint_id: Some(ep.id.clone()),
            ..DeliveryQuery::default()
        })
        .await?;
    assert_eq!(all.len(), 3, "all deliveries for the endpoint are listed");

    let retrying = repo
        .list_deliveries(&DeliveryQuery {
            status: Some(DeliveryStatus::Retrying),
            endpoint_id: Some(ep.id.clone()),
            limit: None,
        })
        .await?;
    assert_eq!(retrying.len(), 1);
    assert_eq!(retrying[0].id, second.id);

    let limited = repo
        .list_deliveries(&DeliveryQuery {
            endpoint_id: Some(ep.id.clone()),
            limit: Some(2),
            ..DeliveryQuery::default()
        })
        .await?;
    assert_eq!(limited.len(), 2, "limit caps the result set");

    let after = repo.count_deliveries_by_status().await?;
    assert_eq!(after.total, before.total + 3);
    assert_eq!(
        after.count(DeliveryStatus::Pending),
        before.count(DeliveryStatus::Pending) + 2
    );
    assert_eq!(
        after.count(DeliveryStatus::Retrying),
        before.count(DeliveryStatus::Retrying) + 1
    );
    Ok(())
}

async fn test_endpoint_lookup(repo: &dyn WebhookRepository) -> Result<(), RepositoryError> {
    let open = endpoint().with_id("conf-ep-open");
    let restricted = endpoint()
        .with_id("conf-ep-restricted")
        .with_event_types(vec![pattern("conf.billing.*")]);
    let disabled = endpoint().with_id("conf-ep-disabled").inactive();
    for ep in [&open, &restricted, &disabled] {
        repo.save_endpoint(ep).await?;
    }

    let ids = |eps: Vec<WebhookEndpoint>| {
        let mut ids: Vec<String> = eps
            .into_iter()
            .map(|e| e.id.to_string())
            .filter(|id| id.starts_with("conf-ep-"))
            .collect();
        ids.sort();
        ids
    };

    let billing = ids(repo.find_endpoints_for_event("conf.billing.paid").await?);
    assert_eq!(billing, vec!["conf-ep-open", "conf-ep-restricted"]);

    let other = ids(repo.find_endpoints_for_event("conf.user.created").await?);
    assert_eq!(
        other,
        vec!["conf-ep-open"],
        "allow-list and active flag must be applied"
    );

    let loaded = repo.get_endpoint(&disabled.id).await?;
    assert!(
        loaded.is_some_and(|e| !e.active),
        "inactive endpoints remain retrievable by id"
    );

    let replaced = open.clone().inactive();
    repo.save_endpoint(&replaced).await?;
    let after = ids(repo.find_endpoints_for_event("conf.user.created").await?);
    assert!(after.is_empty(), "save_endpoint should replace the record");
    Ok(())
}

async fn test_subscription_lookup(repo: &dyn WebhookRepository) -> Result<(), RepositoryError> {
    let wildcard =
        WebhookSubscription::new("conf-ep-open", vec![pattern("conf.order.*")]).with_id("conf-s1");
    let exact = WebhookSubscription::new("conf-ep-open", vec![pattern("conf.order.created")])
        .with_id("conf-s2");
    let disabled = WebhookSubscription::new("conf-ep-open", vec![pattern("conf.order.*")])
        .with_id("conf-s3")
        .inactive();
    for s in [&wildcard, &exact, &disabled] {
        repo.save_subscription(s).await?;
    }

    let mut found: Vec<String> = repo
        .find_subscriptions_for_event("conf.order.created")
        .await?
        .into_iter()
        .map(|s| s.id.to_string())
        .filter(|id| id.starts_with("conf-s"))
        .collect();
    found.sort();
    assert_eq!(found, vec!["conf-s1", "conf-s2"]);

    let none = repo.find_subscriptions_for_event("conf.refund").await?;
    assert!(
        none.iter().all(|s| !s.id.starts_with("conf-s")),
        "non-matching event types return no subscriptions"
    );
    Ok(())
}
