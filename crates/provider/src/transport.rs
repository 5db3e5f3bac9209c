use async_trait::async_trait;

use crate::error::TransportError;
use crate::request::{OutboundRequest, TransportResponse};

/// Strongly-typed transport trait with native `async fn`.
///
/// Not object-safe. Every `Transport` also implements [`DynTransport`]
/// through a blanket implementation, which is what the dispatcher holds.
pub trait Transport: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Send the request and return the destination's response.
    ///
    /// Any response, 2xx or not, is `Ok`. `Err` means no response was
    /// received.
    fn send(
        &self,
        request: &OutboundRequest,
    ) -> impl std::future::Future<Output = Result<TransportResponse, TransportError>> + Send;
}

/// Object-safe transport trait for use behind `Arc<dyn DynTransport>`.
///
/// Implement [`Transport`] instead and rely on the blanket implementation.
#[async_trait]
pub trait DynTransport: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, request: &OutboundRequest) -> Result<TransportResponse, TransportError>;
}

#[async_trait]
impl<T: Transport + Sync> DynTransport for T {
    fn name(&self) -> &str {
        Transport::name(self)
    }

    async fn send(&self, request: &OutboundRequest) -> Result<TransportResponse, TransportError> {
        Transport::send(self, request).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    struct StaticTransport {
        status: u16,
    }

    impl Transport for StaticTransport {
        fn name(&self) -> &str {
            "static"
        }

        async fn send(
            &self,
            request: &OutboundRequest,
        ) -> Result<TransportResponse, TransportError> {
            if request.url.is_empty() {
                return Err(TransportError::InvalidRequest("empty url".into()));
            }
            Ok(TransportResponse::new(self.status, request.body.clone()))
        }
    }

    #[tokio::test]
    async fn blanket_dyn_transport_impl() {
        let transport: Arc<dyn DynTransport> = Arc::new(StaticTransport { status: 202 });
        assert_eq!(transport.name(), "static");

        let req = OutboundRequest::new("http://x", "{}", Duration::from_secs(1));
        let resp = transport.send(&req).await.unwrap();
        assert_eq!(resp.status, 202);
        assert_eq!(&resp.body[..], b"{}");
    }

    #[tokio::test]
    async fn errors_pass_through() {
        let transport: Arc<dyn DynTransport> = Arc::new(StaticTransport { status: 200 });
        let req = OutboundRequest::new("", "{}", Duration::from_secs(1));
        let err = transport.send(&req).await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidRequest(_)));
    }
}
