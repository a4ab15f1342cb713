//! Tests for the HTTP imagery client and the caching wrapper.
//!
//! The HTTP tests run against a one-shot server on a local TCP port that
//! records the request and replies with a canned response.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use imagery_client::{
    CachedImagerySource, HttpClientConfig, HttpImageryClient, ImageryQuery, ImageryResult,
    ImagerySource, Reducer, VisParams,
};
use map_common::{BoundingBox, MapError, MapResult};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

// ============================================================================
// Helpers
// ============================================================================

fn query() -> ImageryQuery {
    ImageryQuery::new(
        "COPERNICUS/S5P/NRTI/L3_CO",
        "CO_column_number_density",
        NaiveDate::from_ymd_opt(2024, 11, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 12, 5).unwrap(),
        BoundingBox::new(-45.0, -20.0, -5.0, 12.0),
    )
}

struct Captured {
    head: String,
    body: serde_json::Value,
}

async fn read_request(socket: &mut TcpStream) -> Captured {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = socket.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client closed before sending headers");
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .map(|(_, value)| value.trim().parse::<usize>().unwrap())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client closed mid-body");
        buf.extend_from_slice(&chunk[..n]);
    }

    let body = serde_json::from_slice(&buf[header_end..header_end + content_length]).unwrap();
    Captured { head, body }
}

/// Serve one request with `status` and `body`; the handle yields the request.
async fn serve_once(status: &'static str, body: String) -> (String, JoinHandle<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let captured = read_request(&mut socket).await;
        let response = format!(
            "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        let _ = socket.shutdown().await;
        captured
    });

    (format!("http://{}", addr), handle)
}

fn client(base_url: &str) -> HttpImageryClient {
    HttpImageryClient::new(HttpClientConfig::new(base_url)).unwrap()
}

const GRID_RESPONSE: &str = r#"{
    "width": 3,
    "height": 2,
    "transform": [-45.0, 0.5, 0.0, 12.0, 0.0, -0.5],
    "values": [0.01, 0.02, null, 0.03, 0.04, 0.05],
    "tile_url": "https://tiles.example/maps/abc/{z}/{x}/{y}"
}"#;

// ============================================================================
// HTTP client tests
// ============================================================================

#[tokio::test]
async fn test_fetch_decodes_grid() {
    let (base, server) = serve_once("200 OK", GRID_RESPONSE.to_string()).await;

    let result = client(&base).fetch(&query(), None).await.unwrap();
    server.await.unwrap();

    let raster = &result.raster;
    assert_eq!((raster.width(), raster.height()), (3, 2));
    assert_eq!(raster.valid_count(), 5);
    assert!(raster.get(2, 0).unwrap().is_nan());
    assert_eq!(raster.get(2, 1), Some(0.05));
    assert_eq!(raster.bounds(), BoundingBox::new(-45.0, 11.0, -43.5, 12.0));
    assert_eq!(
        result.tile_url.as_deref(),
        Some("https://tiles.example/maps/abc/{z}/{x}/{y}")
    );
}

#[tokio::test]
async fn test_request_shape() {
    let (base, server) = serve_once("200 OK", GRID_RESPONSE.to_string()).await;
    let vis = VisParams::default();

    client(&base)
        .fetch(&query().with_reducer(Reducer::Median), Some(&vis))
        .await
        .unwrap();
    let request = server.await.unwrap();

    assert!(request
        .head
        .starts_with("POST /collections/COPERNICUS%2FS5P%2FNRTI%2FL3_CO/aggregate HTTP/1.1"));
    assert_eq!(request.body["band"], "CO_column_number_density");
    assert_eq!(request.body["start"], "2024-11-01");
    assert_eq!(request.body["end"], "2024-12-05");
    assert_eq!(request.body["bbox"], serde_json::json!([-45.0, -20.0, -5.0, 12.0]));
    assert_eq!(request.body["reducer"], "median");
    assert_eq!(request.body["visualization"]["max"], 0.05);
    assert_eq!(request.body["visualization"]["palette"][0], "black");
}

#[tokio::test]
async fn test_visualization_omitted_without_vis() {
    let (base, server) = serve_once("200 OK", GRID_RESPONSE.to_string()).await;
    client(&base).fetch(&query(), None).await.unwrap();
    let request = server.await.unwrap();
    assert!(request.body.get("visualization").is_none());
}

#[tokio::test]
async fn test_bearer_key_sent() {
    let (base, server) = serve_once("200 OK", GRID_RESPONSE.to_string()).await;
    let mut config = HttpClientConfig::new(base);
    config.api_key = Some("s3cret".to_string());

    HttpImageryClient::new(config)
        .unwrap()
        .fetch(&query(), None)
        .await
        .unwrap();
    let request = server.await.unwrap();

    assert!(request
        .head
        .lines()
        .any(|l| l.eq_ignore_ascii_case("authorization: Bearer s3cret")));
}

#[tokio::test]
async fn test_server_error_is_remote_error() {
    let (base, server) =
        serve_once("503 Service Unavailable", r#"{"error":"quota"}"#.to_string()).await;

    let err = client(&base).fetch(&query(), None).await.unwrap_err();
    server.await.unwrap();

    assert_eq!(err.kind(), "RemoteAPIError");
    assert!(err.to_string().contains("503"));
    assert!(err.to_string().contains("quota"));
}

#[tokio::test]
async fn test_malformed_body_is_remote_error() {
    let (base, server) = serve_once("200 OK", r#"{"width": "wide"}"#.to_string()).await;
    let err = client(&base).fetch(&query(), None).await.unwrap_err();
    server.await.unwrap();
    assert_eq!(err.kind(), "RemoteAPIError");
}

#[tokio::test]
async fn test_value_count_mismatch_is_remote_error() {
    let body = r#"{"width": 2, "height": 2, "transform": [0,1,0,0,0,-1], "values": [1.0]}"#;
    let (base, server) = serve_once("200 OK", body.to_string()).await;
    let err = client(&base).fetch(&query(), None).await.unwrap_err();
    server.await.unwrap();
    assert_eq!(err.kind(), "RemoteAPIError");
}

#[tokio::test]
async fn test_timeout_is_remote_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        drop(socket);
    });

    let mut config = HttpClientConfig::new(format!("http://{}", addr));
    config.timeout = Duration::from_millis(200);
    let err = HttpImageryClient::new(config)
        .unwrap()
        .fetch(&query(), None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "RemoteAPIError");
    assert!(err.to_string().contains("timed out"));
}

#[tokio::test]
async fn test_connection_refused_is_remote_error() {
    // Bind then drop to get a port with nothing listening.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let err = client(&format!("http://{}", addr))
        .fetch(&query(), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "RemoteAPIError");
}

#[tokio::test]
async fn test_invalid_query_not_sent() {
    let mut bad = query();
    bad.end = bad.start;
    // No server: validation must fail before any connection attempt.
    let err = client("http://127.0.0.1:9")
        .fetch(&bad, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "InvalidParameter");
}

// ============================================================================
// Cached source tests
// ============================================================================

struct CountingSource {
    calls: Arc<AtomicUsize>,
    fail: bool,
}

#[async_trait]
impl ImagerySource for CountingSource {
    async fn fetch(
        &self,
        _query: &ImageryQuery,
        vis: Option<&VisParams>,
    ) -> MapResult<ImageryResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(MapError::remote("unavailable"));
        }
        Ok(ImageryResult {
            raster: test_utils::constant_raster(2, 2, 0.02),
            tile_url: vis.map(|v| format!("https://tiles/{}/{{z}}/{{x}}/{{y}}", v.max)),
        })
    }
}

fn counting(fail: bool) -> (CachedImagerySource<CountingSource>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let source = CountingSource {
        calls: Arc::clone(&calls),
        fail,
    };
    (CachedImagerySource::new(source, None), calls)
}

#[tokio::test]
async fn test_cache_reuses_identical_query() {
    let (cached, calls) = counting(false);

    let first = cached.fetch(&query(), None).await.unwrap();
    let second = cached.fetch(&query(), None).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let stats = cached.stats().await;
    assert_eq!((stats.hits, stats.misses), (1, 1));
}

#[tokio::test]
async fn test_cache_key_includes_every_input() {
    let (cached, calls) = counting(false);
    let vis = VisParams::default();
    let other_vis = VisParams {
        max: 0.1,
        ..VisParams::default()
    };
    let mut later = query();
    later.end = NaiveDate::from_ymd_opt(2024, 12, 6).unwrap();

    cached.fetch(&query(), None).await.unwrap();
    cached.fetch(&query(), Some(&vis)).await.unwrap();
    let with_other = cached.fetch(&query(), Some(&other_vis)).await.unwrap();
    cached.fetch(&later, None).await.unwrap();
    cached.fetch(&query().with_reducer(Reducer::Max), None).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 5);
    assert_eq!(
        with_other.tile_url.as_deref(),
        Some("https://tiles/0.1/{z}/{x}/{y}")
    );
}

#[tokio::test]
async fn test_cache_does_not_store_failures() {
    let (cached, calls) = counting(true);

    assert!(cached.fetch(&query(), None).await.is_err());
    assert!(cached.fetch(&query(), None).await.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_cache_clear() {
    let (cached, calls) = counting(false);

    cached.fetch(&query(), None).await.unwrap();
    cached.clear().await;
    cached.fetch(&query(), None).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
