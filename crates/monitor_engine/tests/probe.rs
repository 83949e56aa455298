use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use monitor_core::BackoffPolicy;
use monitor_engine::{wait_until_ready, HealthProbe, ReqwestHealthProbe};
use tokio::time::Instant;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FAST: BackoffPolicy = BackoffPolicy::new(Duration::from_millis(5), Duration::from_millis(20));

fn probe_for(server: &MockServer) -> ReqwestHealthProbe {
    let url = Url::parse(&format!("{}/health", server.uri())).unwrap();
    ReqwestHealthProbe::new(url, Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn healthy_backend_is_ready_on_first_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"status":"ok"}"#))
        .expect(1)
        .mount(&server)
        .await;

    let probe = probe_for(&server);
    assert!(wait_until_ready(&probe, FAST, 5, Duration::from_secs(2)).await);
}

#[tokio::test]
async fn unhealthy_backend_exhausts_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(503))
        .expect(5)
        .mount(&server)
        .await;

    let probe = probe_for(&server);
    assert!(!wait_until_ready(&probe, FAST, 5, Duration::from_secs(2)).await);
}

#[tokio::test]
async fn slow_backend_counts_as_not_ready() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let probe = probe_for(&server);
    assert!(!wait_until_ready(&probe, FAST, 2, Duration::from_millis(50)).await);
}

#[tokio::test]
async fn unreachable_backend_is_not_ready() {
    let url = Url::parse("http://127.0.0.1:9/health").unwrap();
    let probe = ReqwestHealthProbe::new(url, Duration::from_millis(200)).unwrap();
    assert!(!probe.check().await);
}

/// Fails a fixed number of times, then reports ready.
struct Flaky {
    failures: u32,
    calls: AtomicU32,
}

#[async_trait::async_trait]
impl HealthProbe for Flaky {
    async fn check(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst) >= self.failures
    }
}

#[tokio::test(start_paused = true)]
async fn retries_back_off_between_attempts() {
    let probe = Flaky {
        failures: 3,
        calls: AtomicU32::new(0),
    };
    let started = Instant::now();
    assert!(wait_until_ready(&probe, BackoffPolicy::probe(), 5, Duration::from_secs(2)).await);
    assert_eq!(probe.calls.load(Ordering::SeqCst), 4);
    // 500 + 1000 + 2000 ms of backoff before the fourth attempt.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(3_500) && elapsed < Duration::from_millis(3_600));
}

#[tokio::test(start_paused = true)]
async fn no_wait_after_final_attempt() {
    let probe = Flaky {
        failures: u32::MAX,
        calls: AtomicU32::new(0),
    };
    let started = Instant::now();
    assert!(!wait_until_ready(&probe, BackoffPolicy::probe(), 3, Duration::from_secs(2)).await);
    assert_eq!(probe.calls.load(Ordering::SeqCst), 3);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(1_500) && elapsed < Duration::from_millis(1_600));
}
