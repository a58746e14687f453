use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use fetchcache::{RawResponse, Transport, TransportError, TransportErrorKind, TransportRequest};

type Responder = Box<dyn Fn(&TransportRequest) -> Result<RawResponse, TransportError> + Send + Sync>;

/// Transport double that counts calls and records every request.
pub struct MockTransport {
    responder: Responder,
    delay: Duration,
    calls: AtomicUsize,
    requests: Mutex<Vec<TransportRequest>>,
}

impl MockTransport {
    pub fn with(
        responder: impl Fn(&TransportRequest) -> Result<RawResponse, TransportError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn ok(status: u16, headers: &[(&str, &str)], body: &'static str) -> Self {
        let headers: Vec<(String, String)> = headers
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        Self::with(move |_| {
            Ok(RawResponse {
                status,
                headers: headers.clone(),
                body: Bytes::from_static(body.as_bytes()),
            })
        })
    }

    pub fn cacheable(max_age: u64, body: &'static str) -> Self {
        let cache_control = format!("max-age={max_age}");
        Self::with(move |_| {
            Ok(RawResponse {
                status: 200,
                headers: vec![
                    ("Cache-Control".to_string(), cache_control.clone()),
                    ("Content-Type".to_string(), "text/plain".to_string()),
                ],
                body: Bytes::from_static(body.as_bytes()),
            })
        })
    }

    pub fn failing(kind: TransportErrorKind) -> Self {
        Self::with(move |_| Err(TransportError::new(kind, "simulated failure")))
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> TransportRequest {
        self.requests().pop().expect("transport was never called")
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: TransportRequest) -> Result<RawResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.responder)(&request)
    }
}
