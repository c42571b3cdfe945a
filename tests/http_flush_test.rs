//! End-to-end flush tests against an in-process HTTP endpoint
//!
//! The endpoint is a minimal HTTP/1.1 responder on a tokio TcpListener that
//! records every request body and answers with a fixed status.

use parking_lot::Mutex;
use statclient::payload::{decode, Pair};
use statclient::{FlushError, StatClient, StatConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone)]
struct Received {
    content_type: Option<String>,
    body: Vec<u8>,
}

struct TestEndpoint {
    url: String,
    received: Arc<Mutex<Vec<Received>>>,
}

impl TestEndpoint {
    async fn start(status: u16) -> Self {
        Self::start_with_delay(status, Duration::ZERO).await
    }

    /// Endpoint that holds each request for `delay` before answering
    async fn start_with_delay(status: u16, delay: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/stats", listener.local_addr().unwrap());
        let received = Arc::new(Mutex::new(Vec::new()));

        let log = received.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let log = log.clone();
                tokio::spawn(async move {
                    if let Some(req) = read_request(stream, status, delay).await {
                        log.lock().push(req);
                    }
                });
            }
        });

        TestEndpoint { url, received }
    }

    fn received(&self) -> Vec<Received> {
        self.received.lock().clone()
    }

    async fn wait_for_requests(&self, n: usize) -> Vec<Received> {
        for _ in 0..100 {
            let got = self.received();
            if got.len() >= n {
                return got;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("endpoint did not receive {} requests", n);
    }
}

async fn read_request(mut stream: TcpStream, status: u16, delay: Duration) -> Option<Received> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut content_length = 0usize;
    let mut content_type = None;
    for line in head.lines().skip(1) {
        if let Some((name, value)) = line.split_once(':') {
            match name.trim().to_ascii_lowercase().as_str() {
                "content-length" => content_length = value.trim().parse().unwrap_or(0),
                "content-type" => content_type = Some(value.trim().to_string()),
                _ => {}
            }
        }
    }

    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let response = format!(
        "HTTP/1.1 {} Test\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok",
        status
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;

    Some(Received {
        content_type,
        body: buf[header_end..].to_vec(),
    })
}

fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/stats", addr)
}

fn sorted(mut pairs: Vec<Pair>) -> Vec<Pair> {
    pairs.sort_by(|a, b| a.key.cmp(&b.key));
    pairs
}

#[tokio::test]
async fn test_flush_immediate_sends_exact_body_and_bypasses_map() {
    let endpoint = TestEndpoint::start(200).await;
    let client = StatClient::start(StatConfig::default().with_endpoint(&endpoint.url)).unwrap();

    client.push_counter("a", 1);
    client.flush_immediate(&[Pair::new("y", 5)]).await.unwrap();

    let received = endpoint.wait_for_requests(1).await;
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].body, br#"{"pairs":[{"key":"y","val":5}]}"#.to_vec());
    assert_eq!(received[0].content_type.as_deref(), Some("application/json"));

    assert_eq!(client.pending().await.unwrap(), vec![Pair::new("a", 1)]);
}

#[tokio::test]
async fn test_non_success_status_is_an_error() {
    let endpoint = TestEndpoint::start(500).await;
    let client = StatClient::start(StatConfig::default().with_endpoint(&endpoint.url)).unwrap();

    let result = client.flush_immediate(&[Pair::new("y", 5)]).await;
    assert!(matches!(result, Err(FlushError::Status(500))));
    assert_eq!(endpoint.wait_for_requests(1).await.len(), 1);
}

#[tokio::test]
async fn test_unreachable_endpoint_is_an_error() {
    let client = StatClient::start(StatConfig::default().with_endpoint(closed_port_url())).unwrap();

    let result = client.flush_immediate(&[Pair::new("y", 5)]).await;
    assert!(matches!(
        result,
        Err(FlushError::Network(_)) | Err(FlushError::Timeout)
    ));
}

#[tokio::test]
async fn test_request_timeout_applies_after_reconfigure() {
    // Accepts connections but never answers
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/stats", listener.local_addr().unwrap());
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let client = StatClient::start(StatConfig::default().with_endpoint(url)).unwrap();
    client.configure_timeout(Duration::from_millis(100)).unwrap();

    let started = std::time::Instant::now();
    let result = client.flush_immediate(&[Pair::new("slow", 1)]).await;
    assert!(matches!(result, Err(FlushError::Timeout)));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_reconfigure_leaves_in_flight_request_on_old_client() {
    let endpoint = TestEndpoint::start_with_delay(200, Duration::from_millis(300)).await;
    let config = StatConfig::default()
        .with_endpoint(&endpoint.url)
        .with_request_timeout(Duration::from_secs(2));
    let client = StatClient::start(config).unwrap();

    let in_flight = {
        let client = client.clone();
        tokio::spawn(async move { client.flush_immediate(&[Pair::new("first", 1)]).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    client.configure_timeout(Duration::from_millis(10)).unwrap();
    client.configure_pool(1).unwrap();
    assert_eq!(client.transport().generation(), 2);

    // Started under the 2s timeout, so the 300ms answer still arrives
    assert!(in_flight.await.unwrap().is_ok());

    let next = client.flush_immediate(&[Pair::new("second", 1)]).await;
    assert!(matches!(next, Err(FlushError::Timeout)));

    let received = endpoint.wait_for_requests(1).await;
    let request = decode(&received[0].body).unwrap();
    assert_eq!(request.pairs, vec![Pair::new("first", 1)]);
}

#[tokio::test]
async fn test_failed_tick_retains_then_delivers_sum() {
    let config = StatConfig::default()
        .with_endpoint(closed_port_url())
        .with_flush_interval(Duration::from_secs(1));
    let client = StatClient::start(config).unwrap();

    client.push_counter("x", 1);

    for _ in 0..100 {
        if client.stats().failed_flushes > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(client.stats().failed_flushes >= 1);
    assert_eq!(client.pending().await.unwrap(), vec![Pair::new("x", 1)]);

    let endpoint = TestEndpoint::start(200).await;
    client.configure_endpoint(&endpoint.url);
    client.push_counter("x", 2);

    let received = endpoint.wait_for_requests(1).await;
    let request = decode(&received[0].body).unwrap();
    assert_eq!(request.pairs, vec![Pair::new("x", 3)]);
    assert!(client.pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_shutdown_flushes_remaining_counters() {
    let endpoint = TestEndpoint::start(200).await;
    let client = StatClient::start(StatConfig::default().with_endpoint(&endpoint.url)).unwrap();

    client.push_counter("a", 3);
    client.push_counter("a", 4);
    client.push_counter("b", 10);
    client.shutdown().await;

    let received = endpoint.wait_for_requests(1).await;
    let request = decode(&received[0].body).unwrap();
    assert_eq!(
        sorted(request.pairs),
        vec![Pair::new("a", 7), Pair::new("b", 10)]
    );
    assert_eq!(client.stats().flushes, 1);
}
