use hookline_provider::{OutboundRequest, Transport, TransportError, TransportResponse};
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, instrument, warn};

use crate::config::HttpTransportConfig;
use crate::error::WebhookError;

/// [`Transport`] that POSTs over a shared `reqwest` connection pool.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Build a transport with its own client.
    pub fn new(config: HttpTransportConfig) -> Result<Self, WebhookError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout())
            .pool_idle_timeout(config.pool_idle_timeout())
            .redirect(if config.follow_redirects {
                reqwest::redirect::Policy::default()
            } else {
                reqwest::redirect::Policy::none()
            })
            .build()?;
        Ok(Self { client })
    }

    /// Wrap an existing client, e.g. to share a pool.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn header_map(request: &OutboundRequest) -> Result<HeaderMap, WebhookError> {
        let mut headers = HeaderMap::with_capacity(request.headers.len());
        for (name, value) in &request.headers {
            let invalid = |reason: String| WebhookError::InvalidHeader {
                name: name.clone(),
                reason,
            };
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
            let header_value = HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
            headers.append(header_name, header_value);
        }
        Ok(headers)
    }

    async fn post(&self, request: &OutboundRequest) -> Result<TransportResponse, WebhookError> {
        let timed_out = |e: reqwest::Error| {
            if e.is_timeout() {
                WebhookError::TimedOut(request.timeout)
            } else {
                WebhookError::Http(e)
            }
        };

        let mut response = self
            .client
            .post(&request.url)
            .headers(Self::header_map(request)?)
            .body(request.body.clone())
            .timeout(request.timeout)
            .send()
            .await
            .map_err(timed_out)?;

        let status = response.status().as_u16();
        let limit = request.response_limit;
        let mut body = Vec::with_capacity(limit.min(8 * 1024));
        while let Some(chunk) = response.chunk().await.map_err(timed_out)? {
            let room = limit - body.len();
            if chunk.len() >= room {
                body.extend_from_slice(&chunk[..room]);
                debug!(limit, "response body truncated");
                break;
            }
            body.extend_from_slice(&chunk);
        }
        Ok(TransportResponse::new(status, body))
    }
}

impl Transport for HttpTransport {
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "http"
    }

    #[instrument(skip(self, request), fields(url = %request.url))]
    async fn send(&self, request: &OutboundRequest) -> Result<TransportResponse, TransportError> {
        match self.post(request).await {
            Ok(response) => {
                debug!(status = response.status, "destination responded");
                Ok(response)
            }
            Err(e) => {
                warn!(error = %e, "outbound request failed");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use hookline_provider::DynTransport;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    /// A minimal mock HTTP server built on tokio that returns canned responses.
    struct MockWebhookServer {
        listener: tokio::net::TcpListener,
        base_url: String,
    }

    impl MockWebhookServer {
        async fn start() -> Self {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                .await
                .expect("failed to bind mock server");
            let port = listener.local_addr().unwrap().port();
            let base_url = format!("http://127.0.0.1:{port}/hook");
            Self { listener, base_url }
        }

        /// Accept one connection, answer with `status_code` and `body`, and
        /// return the raw request bytes.
        async fn respond_once(self, status_code: u16, body: &str) -> Vec<u8> {
            let body = body.to_owned();
            let (mut stream, _) = self.listener.accept().await.unwrap();

            let buf = read_request(&mut stream).await;

            let response = format!(
                "HTTP/1.1 {status_code} OK\r\n\
                 Content-Type: text/plain\r\n\
                 Content-Length: {}\r\n\
                 Connection: close\r\n\
                 \r\n\
                 {body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();

            buf
        }

        /// Accept one connection and answer 200 with `len` bytes of body.
        async fn respond_large(self, len: usize) {
            let (mut stream, _) = self.listener.accept().await.unwrap();
            read_request(&mut stream).await;
            let head = format!(
                "HTTP/1.1 200 OK\r\n\
                 Content-Type: text/plain\r\n\
                 Content-Length: {len}\r\n\
                 Connection: close\r\n\
                 \r\n"
            );
            stream.write_all(head.as_bytes()).await.unwrap();
            let body = vec![b'x'; len];
            // The client stops reading at its limit and may hang up early.
            let _ = stream.write_all(&body).await;
            let _ = stream.shutdown().await;
        }

        /// Accept one connection and never answer.
        async fn hang(self) {
            let (_stream, _) = self.listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
    }

    /// Read until the headers and `Content-Length` bytes of body arrived.
    async fn read_request(stream: &mut tokio::net::TcpStream) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                return buf;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(split) = text.find("\r\n\r\n") {
                let content_length = text[..split]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= split + 4 + content_length {
                    return buf;
                }
            }
        }
    }

    fn transport() -> HttpTransport {
        HttpTransport::new(HttpTransportConfig::default()).unwrap()
    }

    fn request(url: &str) -> OutboundRequest {
        OutboundRequest::new(url, r#"{"id":1}"#, Duration::from_secs(5))
            .with_header("Content-Type", "application/json")
            .with_header("X-Webhook-Event", "order.created")
            .with_header("X-Webhook-Delivery-Id", "d-1")
    }

    #[test]
    fn transport_name() {
        assert_eq!(Transport::name(&transport()), "http");
    }

    #[tokio::test]
    async fn posts_body_and_headers() {
        let server = MockWebhookServer::start().await;
        let req = request(&server.base_url);
        let handle = tokio::spawn(async move { server.respond_once(200, "thanks").await });

        let resp = Transport::send(&transport(), &req).await.unwrap();
        let raw = handle.await.unwrap();
        let raw = String::from_utf8_lossy(&raw);

        assert_eq!(resp.status, 200);
        assert_eq!(&resp.body[..], b"thanks");
        assert!(raw.starts_with("POST /hook "));
        assert!(raw.to_ascii_lowercase().contains("x-webhook-event: order.created"));
        assert!(raw.to_ascii_lowercase().contains("x-webhook-delivery-id: d-1"));
        assert!(raw.ends_with(r#"{"id":1}"#));
    }

    #[tokio::test]
    async fn non_2xx_is_a_response_not_an_error() {
        let server = MockWebhookServer::start().await;
        let req = request(&server.base_url);
        let handle = tokio::spawn(async move { server.respond_once(500, "boom").await });

        let transport: Box<dyn DynTransport> = Box::new(transport());
        let resp = transport.send(&req).await.unwrap();
        handle.await.unwrap();

        assert_eq!(resp.status, 500);
        assert!(!resp.is_success());
        assert_eq!(resp.body_text(1024), "boom");
    }

    #[tokio::test]
    async fn oversized_response_body_is_cut_at_limit() {
        let server = MockWebhookServer::start().await;
        let req = request(&server.base_url).with_response_limit(100);
        let handle = tokio::spawn(server.respond_large(256 * 1024));

        let resp = Transport::send(&transport(), &req).await.unwrap();
        handle.await.unwrap();

        assert_eq!(resp.status, 200);
        assert_eq!(resp.body.len(), 100);
        assert!(resp.body.iter().all(|b| *b == b'x'));
    }

    #[tokio::test]
    async fn zero_limit_reads_no_body() {
        let server = MockWebhookServer::start().await;
        let req = request(&server.base_url).with_response_limit(0);
        let handle = tokio::spawn(server.respond_large(64));

        let resp = Transport::send(&transport(), &req).await.unwrap();
        handle.await.unwrap();

        assert_eq!(resp.status, 200);
        assert!(resp.body.is_empty());
    }

    #[tokio::test]
    async fn slow_destination_times_out() {
        let server = MockWebhookServer::start().await;
        let mut req = request(&server.base_url);
        req.timeout = Duration::from_millis(200);
        let handle = tokio::spawn(server.hang());

        let err = Transport::send(&transport(), &req).await.unwrap_err();
        handle.abort();

        assert!(
            matches!(err, TransportError::Timeout(d) if d == Duration::from_millis(200)),
            "expected timeout, got {err:?}"
        );
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn refused_connection_is_a_connection_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let req = request(&format!("http://127.0.0.1:{port}/hook"));
        let err = Transport::send(&transport(), &req).await.unwrap_err();
        assert!(matches!(err, TransportError::Connection(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn bad_header_value_is_rejected_before_sending() {
        let req = OutboundRequest::new("http://127.0.0.1:9/hook", "{}", Duration::from_secs(1))
            .with_header("X-Bad", "line\nbreak");
        let err = Transport::send(&transport(), &req).await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidRequest(_)));
    }
}
