//! End-to-end flows through the receiver and dispatcher with in-process
//! transports and the memory repository.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use hookline_core::{
    DeliveryStatus, EventPattern, FailureReason, RequestHeaders, WebhookEndpoint,
    WebhookSubscription,
};
use hookline_gateway::testing::ScriptedTransport;
use hookline_gateway::{
    CircuitBreakerConfig, CircuitState, DispatcherBuilder, HandlerError, InboundRequest,
    Notifier, ReceiverBuilder, StripeSource, WebhookDispatcher, WebhookMetrics, handler_fn,
};
use hookline_provider::{OutboundRequest, Transport, TransportError, TransportResponse};
use hookline_signature::SignatureScheme;
use hookline_state::WebhookRepository;
use hookline_state_memory::MemoryRepository;
use secrecy::SecretString;
use serde_json::json;
use tokio::sync::Notify;

fn secret(value: &str) -> SecretString {
    SecretString::new(value.to_owned())
}

/// First call answers 500; every later call waits for the gate, then 200.
#[derive(Default)]
struct GatedTransport {
    calls: AtomicUsize,
    gate: Notify,
}

impl Transport for GatedTransport {
    fn name(&self) -> &str {
        "gated"
    }

    async fn send(&self, _request: &OutboundRequest) -> Result<TransportResponse, TransportError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Ok(TransportResponse::new(500, "down"));
        }
        self.gate.notified().await;
        Ok(TransportResponse::new(200, "ok"))
    }
}

#[tokio::test]
async fn half_open_admits_a_single_trial() {
    let repo = Arc::new(MemoryRepository::new());
    let endpoint = WebhookEndpoint::new("https://flaky.example.com/hook", "s");
    repo.save_endpoint(&endpoint).await.unwrap();
    let transport = Arc::new(GatedTransport::default());
    let dispatcher = DispatcherBuilder::new()
        .repository(repo.clone())
        .transport(transport.clone())
        .circuit_breaker(CircuitBreakerConfig {
            failure_threshold: 1,
            success_threshold: 1,
            reset_timeout: Duration::from_millis(50),
            ..CircuitBreakerConfig::default()
        })
        .build()
        .unwrap();

    let first = dispatcher.delivery_for(&endpoint, "ping", json!({}));
    let first_id = first.id.clone();
    dispatcher.dispatch(first).await.unwrap();
    let breaker = dispatcher.circuit_breakers().get(&endpoint.url).unwrap();
    assert_eq!(breaker.state(), CircuitState::Open);

    tokio::time::sleep(Duration::from_millis(80)).await;

    // The trial blocks inside the transport until the gate opens.
    let trial = {
        let dispatcher = dispatcher.clone();
        let id = first_id.clone();
        tokio::spawn(async move { dispatcher.retry(&id).await })
    };
    while transport.calls.load(Ordering::SeqCst) < 2 {
        tokio::task::yield_now().await;
    }
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    let second = dispatcher.delivery_for(&endpoint, "ping", json!({}));
    let refused = dispatcher.dispatch(second).await.unwrap();
    assert_eq!(refused.failure_reason, Some(FailureReason::CircuitOpen));
    assert_eq!(refused.attempts, 0);
    assert_eq!(transport.calls.load(Ordering::SeqCst), 2);

    transport.gate.notify_one();
    let result = trial.await.unwrap().unwrap();
    assert_eq!(result.status, DeliveryStatus::Success);
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test]
async fn received_event_fans_out_to_subscribers() {
    let repo = Arc::new(MemoryRepository::new());
    let notifier = Notifier::new();
    let metrics = Arc::new(WebhookMetrics::default());

    let crm = WebhookEndpoint::new("https://crm.example.com/hooks", "crm-secret").with_id("crm");
    let ledger = WebhookEndpoint::new("https://ledger.example.com/in", "ledger-secret")
        .with_id("ledger");
    repo.save_endpoint(&crm).await.unwrap();
    repo.save_endpoint(&ledger).await.unwrap();
    let invoices = EventPattern::parse("invoice.*").unwrap();
    let charges = EventPattern::parse("charge.*").unwrap();
    repo.save_subscription(&WebhookSubscription::new("crm", vec![invoices.clone()]))
        .await
        .unwrap();
    repo.save_subscription(&WebhookSubscription::new("ledger", vec![invoices, charges]))
        .await
        .unwrap();

    let transport = Arc::new(ScriptedTransport::always(204));
    let dispatcher: WebhookDispatcher = DispatcherBuilder::new()
        .repository(repo.clone())
        .transport(transport.clone())
        .notifier(notifier.clone())
        .metrics(metrics.clone())
        .build()
        .unwrap();

    let forward = {
        let dispatcher = dispatcher.clone();
        handler_fn(move |event| {
            let dispatcher = dispatcher.clone();
            let event_type = event.event_type.clone();
            let payload = event.payload.clone();
            async move {
                dispatcher
                    .publish(&event_type, payload)
                    .await
                    .map(|_| ())
                    .map_err(|e| HandlerError(e.to_string()))
            }
        })
    };
    let receiver = ReceiverBuilder::new()
        .repository(repo.clone())
        .source(Arc::new(StripeSource::new("stripe", "whsec")))
        .any_event_handler("forward", "stripe", Arc::new(forward))
        .notifier(notifier)
        .metrics(metrics.clone())
        .build()
        .unwrap();

    let body = r#"{"id":"evt_1","type":"invoice.paid","data":{"amount":1200}}"#;
    let header = SignatureScheme::stripe()
        .sign(body.as_bytes(), &secret("whsec"))
        .unwrap();
    let request = InboundRequest::new(RequestHeaders::new().with(header.name, header.value), body);

    let received = receiver.handle("stripe", &request).await.unwrap();
    assert_eq!(received.event.event_type, "invoice.paid");
    dispatcher.shutdown().await;

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    for request in &requests {
        let target = if request.url == crm.url { &crm } else { &ledger };
        let mut headers = RequestHeaders::new();
        for (name, value) in &request.headers {
            headers.insert(name, value.clone());
        }
        assert!(
            SignatureScheme::generic()
                .verify(Some(&request.body), &headers, &target.secret)
                .unwrap(),
            "request to {} signed with the wrong secret",
            request.url
        );
        assert_eq!(request.header("X-Webhook-Event"), Some("invoice.paid"));
    }

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.events_received, 1);
    assert_eq!(snapshot.delivered, 2);

    // Replaying the provider request publishes nothing new.
    let replay = receiver.handle("stripe", &request).await.unwrap();
    assert!(replay.duplicate);
    assert_eq!(replay.event.id, received.event.id);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn signed_payload_is_stored_once() {
    let repo = Arc::new(MemoryRepository::new());
    let receiver = ReceiverBuilder::new()
        .repository(repo.clone())
        .source(Arc::new(hookline_gateway::GenericSource::new("orders", "s")))
        .build()
        .unwrap();

    let body = r#"{"id":1}"#;
    let signed = SignatureScheme::generic()
        .sign(body.as_bytes(), &secret("s"))
        .unwrap();
    let request = InboundRequest::new(
        RequestHeaders::new()
            .with(signed.name, signed.value)
            .with("X-Webhook-Delivery-Id", "dlv-1"),
        body,
    );

    let first = receiver.handle("orders", &request).await.unwrap();
    let again = receiver.handle("orders", &request).await.unwrap();
    assert_eq!(first.event.id, again.event.id);
    assert!(again.duplicate);

    // One changed byte invalidates the signature.
    let mut tampered = request.clone();
    tampered.body = Some(bytes::Bytes::from_static(br#"{"id":2}"#));
    assert!(receiver.handle("orders", &tampered).await.is_err());
}

#[tokio::test]
async fn retries_survive_a_restart() {
    let repo = Arc::new(MemoryRepository::new());
    let endpoint = WebhookEndpoint::new("https://hooks.example.com", "s");
    repo.save_endpoint(&endpoint).await.unwrap();

    let failing = DispatcherBuilder::new()
        .repository(repo.clone())
        .transport(Arc::new(ScriptedTransport::always(502)))
        .build()
        .unwrap();
    let delivery = failing.delivery_for(&endpoint, "order.created", json!({"n": 1}));
    let id = delivery.id.clone();
    failing.dispatch(delivery).await.unwrap();
    failing.shutdown().await;

    let transport = Arc::new(ScriptedTransport::always(200));
    let restarted = DispatcherBuilder::new()
        .repository(repo.clone())
        .transport(transport.clone())
        .build()
        .unwrap();
    assert_eq!(restarted.recover().await.unwrap(), 1);
    assert!(restarted.queue().contains(&id));

    let due = restarted.queue().next_due().unwrap() + chrono::TimeDelta::seconds(1);
    assert_eq!(restarted.run_due(due), 1);
    restarted.shutdown().await;

    let stored = repo.get_delivery(&id).await.unwrap().unwrap();
    assert_eq!(stored.status, DeliveryStatus::Success);
    assert_eq!(stored.attempts, 2);
    assert_eq!(transport.calls(), 1);
}
