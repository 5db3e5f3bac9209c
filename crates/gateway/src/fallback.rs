use async_trait::async_trait;
use hookline_core::WebhookDelivery;

/// Hook invoked when a delivery is refused because its destination's
/// circuit is open.
///
/// The delivery itself is still deferred and retried; a fallback is for side
/// channels such as paging an operator or parking a copy elsewhere. Errors
/// are logged and otherwise ignored.
#[async_trait]
pub trait CircuitOpenFallback: Send + Sync {
    fn name(&self) -> &str;

    async fn on_circuit_open(
        &self,
        delivery: &WebhookDelivery,
        destination: &str,
    ) -> Result<(), String>;
}
