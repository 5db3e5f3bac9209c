use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use hookline_core::{SourceId, WebhookEvent};
use thiserror::Error;

/// Error returned by an [`EventHandler`]. Recorded on the event; never
/// propagated to the webhook producer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self(message.to_owned())
    }
}

/// Application code run for each stored inbound event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &WebhookEvent) -> Result<(), HandlerError>;
}

/// Adapter turning an async closure into an [`EventHandler`].
pub struct FnHandler<F>(F);

/// Wrap `f` as a handler.
///
/// ```
/// use hookline_gateway::handlers::{HandlerError, handler_fn};
///
/// let handler = handler_fn(|event| {
///     let kind = event.event_type.clone();
///     async move {
///         if kind == "boom" {
///             return Err(HandlerError::from("refused"));
///         }
///         Ok(())
///     }
/// });
/// # let _ = handler;
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(&WebhookEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    FnHandler(f)
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(&WebhookEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, event: &WebhookEvent) -> Result<(), HandlerError> {
        (self.0)(event).await
    }
}

#[derive(Clone)]
struct Registration {
    name: String,
    source: SourceId,
    /// `None` binds the handler to every event from the source.
    event_type: Option<String>,
    handler: Arc<dyn EventHandler>,
}

/// Handlers bound to sources, kept in registration order.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    registrations: Vec<Registration>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to events of `event_type` from `source`.
    pub fn on(
        &mut self,
        name: impl Into<String>,
        source: impl Into<SourceId>,
        event_type: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) {
        self.registrations.push(Registration {
            name: name.into(),
            source: source.into(),
            event_type: Some(event_type.into()),
            handler,
        });
    }

    /// Bind `handler` to every event from `source`.
    pub fn on_any(
        &mut self,
        name: impl Into<String>,
        source: impl Into<SourceId>,
        handler: Arc<dyn EventHandler>,
    ) {
        self.registrations.push(Registration {
            name: name.into(),
            source: source.into(),
            event_type: None,
            handler,
        });
    }

    /// Handlers for `(source, event_type)`, with their names, in
    /// registration order.
    pub fn handlers_for<'a>(
        &'a self,
        source: &'a SourceId,
        event_type: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a Arc<dyn EventHandler>)> + 'a {
        self.registrations
            .iter()
            .filter(move |r| {
                &r.source == source && r.event_type.as_deref().is_none_or(|t| t == event_type)
            })
            .map(|r| (r.name.as_str(), &r.handler))
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.registrations.iter().map(|r| r.name.as_str()).collect();
        f.debug_struct("HandlerRegistry")
            .field("handlers", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn noop() -> Arc<dyn EventHandler> {
        Arc::new(handler_fn(|_event| async { Ok(()) }))
    }

    #[test]
    fn handlers_for_keeps_registration_order() {
        let mut registry = HandlerRegistry::new();
        registry.on_any("audit", "github", noop());
        registry.on("deploy", "github", "push", noop());
        registry.on("labels", "github", "issues", noop());
        registry.on("billing", "stripe", "push", noop());
        registry.on_any("late-audit", "github", noop());

        let source = SourceId::new("github");
        let names: Vec<&str> = registry
            .handlers_for(&source, "push")
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["audit", "deploy", "late-audit"]);
    }

    #[tokio::test]
    async fn fn_handler_runs_closure() {
        let handler = handler_fn(|event| {
            let kind = event.event_type.clone();
            async move {
                if kind == "bad" {
                    Err(HandlerError::from("refused"))
                } else {
                    Ok(())
                }
            }
        });
        let ok = WebhookEvent::new("github", "good", None, json!({}));
        let bad = WebhookEvent::new("github", "bad", None, json!({}));
        assert!(handler.handle(&ok).await.is_ok());
        assert_eq!(
            handler.handle(&bad).await.unwrap_err(),
            HandlerError("refused".into())
        );
    }
}
