//! Assembles the engine from configuration.

use std::sync::Arc;

use hookline_gateway::{
    DispatcherBuilder, EventHandler, HandlerError, Notifier, ReceiverBuilder, TracingObserver,
    WebhookDispatcher, WebhookMetrics, handler_fn,
};
use hookline_provider::DynTransport;
use hookline_state::WebhookRepository;
use tracing::{debug, info};

use crate::api::AppState;
use crate::config::HooklineConfig;
use crate::error::ServerError;

/// Build the shared state from `config`.
///
/// Configured endpoints and subscriptions are saved into `repository`
/// first. The returned dispatcher has not recovered persisted retries;
/// call [`WebhookDispatcher::recover`] before starting the scheduler.
pub async fn build_state(
    config: &HooklineConfig,
    repository: Arc<dyn WebhookRepository>,
    transport: Arc<dyn DynTransport>,
) -> Result<AppState, ServerError> {
    for endpoint in &config.endpoints {
        repository
            .save_endpoint(&endpoint.to_endpoint())
            .await
            .map_err(|e| ServerError::Config(format!("endpoint {}: {e}", endpoint.id)))?;
    }
    for subscription in &config.subscriptions {
        repository
            .save_subscription(&subscription.to_subscription())
            .await
            .map_err(|e| {
                ServerError::Config(format!("subscription for {}: {e}", subscription.endpoint))
            })?;
    }

    let notifier = Notifier::new().with_observer(Arc::new(TracingObserver));
    let metrics = Arc::new(WebhookMetrics::default());

    let mut dispatcher = DispatcherBuilder::new()
        .repository(Arc::clone(&repository))
        .transport(transport)
        .config(config.dispatcher.to_dispatcher_config())
        .signature(config.dispatcher.signature.clone())
        .circuit_breaker(config.circuit_breaker.to_breaker_config())
        .notifier(notifier.clone())
        .metrics(Arc::clone(&metrics));
    for (destination, breaker) in config.circuit_breaker.overrides() {
        dispatcher = dispatcher.circuit_breaker_override(destination, breaker);
    }
    let dispatcher = dispatcher.build()?;

    let mut receiver = ReceiverBuilder::new()
        .repository(repository)
        .notifier(notifier)
        .metrics(Arc::clone(&metrics));
    for source in &config.sources {
        receiver = receiver.source(source.profile());
        if source.forward {
            receiver = receiver.any_event_handler(
                "forward",
                &source.name,
                forwarder(dispatcher.clone()),
            );
        }
    }
    let receiver = receiver.build()?;

    info!(
        sources = config.sources.len(),
        endpoints = config.endpoints.len(),
        subscriptions = config.subscriptions.len(),
        "engine assembled"
    );

    Ok(AppState {
        dispatcher,
        receiver: Arc::new(receiver),
        metrics,
    })
}

/// Handler that republishes each inbound event to matching subscriptions.
fn forwarder(dispatcher: WebhookDispatcher) -> Arc<dyn EventHandler> {
    Arc::new(handler_fn(move |event| {
        let dispatcher = dispatcher.clone();
        let event_type = event.event_type.clone();
        let payload = event.payload.clone();
        async move {
            match dispatcher.publish(&event_type, payload).await {
                Ok(ids) => {
                    debug!(%event_type, deliveries = ids.len(), "event forwarded");
                    Ok(())
                }
                Err(e) => Err(HandlerError(e.to_string())),
            }
        }
    }))
}
