use anyhow::Result;
use serde_json::Value;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

use sade_feed::api::{FeedApiConfig, FeedApiHandle, FeedApiServer};
use sade_feed::detect::share;
use sade_feed::ingest::{SyntheticConfig, SyntheticSource};
use sade_feed::{
    BoundingBox, Detection, DetectionKind, FeedController, FeedSettings, ManualClock, Priority,
    SimulatedBackend,
};

fn read_response(stream: &mut TcpStream) -> Result<(String, String)> {
    let mut response = String::new();
    stream.read_to_string(&mut response)?;
    let mut parts = response.splitn(2, "\r\n\r\n");
    let headers = parts.next().unwrap_or("").to_string();
    let body = parts.next().unwrap_or("").to_string();
    Ok((headers, body))
}

fn detection(label: &str, timestamp_ms: u64, priority: Priority) -> Detection {
    Detection {
        kind: DetectionKind::Object,
        label: label.to_string(),
        confidence: 0.9,
        timestamp_ms,
        coordinates: BoundingBox::new(1.0, 2.0, 3.0, 4.0),
        vector: vec![0.5; 96],
        priority: Some(priority),
        details: None,
        subtype: None,
    }
}

struct TestApi {
    controller: Arc<FeedController>,
    api_handle: Option<FeedApiHandle>,
}

impl TestApi {
    fn new(display_limit: usize) -> Result<Self> {
        let source = SyntheticSource::new(SyntheticConfig {
            url: "stub://api_test".to_string(),
            width: 32,
            height: 24,
            frame_limit: None,
        })?;
        let controller = Arc::new(FeedController::new(
            FeedSettings {
                display_limit,
                ..FeedSettings::simulated()
            },
            Box::new(source),
            share(SimulatedBackend::new(Some(1))),
            Arc::new(ManualClock::new(10_000)),
        )?);
        let api_config = FeedApiConfig {
            addr: "127.0.0.1:0".to_string(),
        };
        let api_handle = FeedApiServer::new(api_config, controller.clone()).spawn()?;
        Ok(Self {
            controller,
            api_handle: Some(api_handle),
        })
    }

    fn handle(&self) -> &FeedApiHandle {
        self.api_handle
            .as_ref()
            .expect("test API handle should be initialized")
    }

    fn request(&self, method: &str, path: &str) -> Result<(String, String)> {
        let mut stream = TcpStream::connect(self.handle().addr)?;
        let request = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        stream.write_all(request.as_bytes())?;
        read_response(&mut stream)
    }
}

impl Drop for TestApi {
    fn drop(&mut self) {
        if let Some(handle) = self.api_handle.take() {
            handle.stop().expect("failed to stop API server");
        }
    }
}

#[test]
fn health_endpoint_responds() -> Result<()> {
    let api = TestApi::new(8)?;
    let (headers, body) = api.request("GET", "/health")?;
    assert!(headers.contains("200 OK"));
    assert!(body.contains(r#""status":"ok""#));
    Ok(())
}

#[test]
fn detections_endpoint_returns_display_order() -> Result<()> {
    let api = TestApi::new(2)?;
    api.controller.preload(vec![
        detection("low", 9_000, Priority::Low),
        detection("critical", 8_000, Priority::Critical),
        detection("medium", 7_000, Priority::Medium),
    ])?;

    let (headers, body) = api.request("GET", "/detections")?;
    assert!(headers.contains("200 OK"));
    assert!(headers.contains("Cache-Control: no-store"));
    let value: Value = serde_json::from_str(&body)?;
    assert_eq!(value["total"], 3);
    let shown = value["detections"].as_array().expect("detections array");
    assert_eq!(shown.len(), 2);
    assert_eq!(shown[0]["label"], "critical");
    assert_eq!(shown[0]["type"], "object");
    assert_eq!(shown[0]["priority"], "critical");
    assert_eq!(shown[0]["timestamp"], 8_000);
    assert_eq!(shown[1]["label"], "medium");

    let (_, body) = api.request("GET", "/detections/all")?;
    let value: Value = serde_json::from_str(&body)?;
    let all = value["detections"].as_array().expect("detections array");
    assert_eq!(all.len(), 3);
    assert_eq!(all[0]["label"], "low");
    assert_eq!(all[0]["vector"].as_array().map(Vec::len), Some(96));
    Ok(())
}

#[test]
fn status_endpoint_reports_connection() -> Result<()> {
    let api = TestApi::new(8)?;
    let (_, body) = api.request("GET", "/status")?;
    let value: Value = serde_json::from_str(&body)?;
    assert_eq!(value["backend"], "simulated");
    assert_eq!(value["status"]["connection"], "testing");

    api.controller.connect()?;
    api.controller.poll_cycle()?;
    let (_, body) = api.request("GET", "/status")?;
    let value: Value = serde_json::from_str(&body)?;
    assert_eq!(value["status"]["connection"], "connected");
    assert_eq!(value["status"]["frame_count"], 1);
    assert_eq!(value["backend_stats"]["requests"], 1);
    Ok(())
}

#[test]
fn rejects_unknown_paths_and_methods() -> Result<()> {
    let api = TestApi::new(8)?;
    let (headers, _) = api.request("GET", "/events")?;
    assert!(headers.contains("404 Not Found"));
    let (headers, _) = api.request("POST", "/detections")?;
    assert!(headers.contains("405 Method Not Allowed"));
    Ok(())
}
