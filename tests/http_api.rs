use anyhow::{anyhow, Result};
use base64::prelude::{Engine as _, BASE64_STANDARD};
use serde_json::{json, Value};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracker_kernel::api::{ApiConfig, ApiHandle, ApiServer, AppState};
use tracker_kernel::detect::{Detector, DetectorBackend, RawDetection, StubBackend};
use tracker_kernel::track::{AliasTable, TrackingState};

// Canned detections are given in pixels of the 100x100 test frame.
fn det(class_id: usize, confidence: f32, x1: f32, y1: f32, x2: f32, y2: f32) -> RawDetection {
    RawDetection {
        class_id,
        confidence,
        x1,
        y1,
        x2,
        y2,
    }
}

/// Persons with areas 0.02 / 0.2 / 0.08 plus two cups whose joint scores
/// are 0.081 and 0.06, and one cell phone.
fn busy_frame() -> Vec<RawDetection> {
    vec![
        det(0, 0.9, 0.0, 0.0, 20.0, 10.0),
        det(0, 0.6, 0.0, 0.0, 50.0, 40.0),
        det(0, 0.95, 10.0, 10.0, 50.0, 30.0),
        det(41, 0.9, 10.0, 10.0, 40.0, 40.0),
        det(41, 0.2, 0.0, 0.0, 60.0, 50.0),
        det(67, 0.8, 50.0, 50.0, 80.0, 80.0),
    ]
}

fn image_payload() -> String {
    let img = image::RgbImage::from_pixel(100, 100, image::Rgb([128, 128, 128]));
    let mut bytes = Vec::new();
    img.write_to(
        &mut std::io::Cursor::new(&mut bytes),
        image::ImageFormat::Png,
    )
    .unwrap();
    BASE64_STANDARD.encode(bytes)
}

struct TestServer {
    handle: Option<ApiHandle>,
}

impl TestServer {
    fn start(canned: Vec<RawDetection>) -> Result<Self> {
        Self::start_with_detector(Detector::new(
            Box::new(move || {
                Ok(Box::new(StubBackend::new().with_detections(canned))
                    as Box<dyn DetectorBackend>)
            }),
            0.5,
            Duration::from_secs(2),
        ))
    }

    fn start_with_detector(detector: Detector) -> Result<Self> {
        let state = Arc::new(AppState {
            detector,
            aliases: AliasTable::builtin(),
            tracking: TrackingState::new(),
        });
        let api_config = ApiConfig {
            addr: "127.0.0.1:0".to_string(),
        };
        let handle = ApiServer::new(api_config, state).spawn()?;
        Ok(Self {
            handle: Some(handle),
        })
    }

    fn addr(&self) -> SocketAddr {
        self.handle.as_ref().expect("server running").addr
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.stop().expect("failed to stop API server");
        }
    }
}

fn raw_request(
    addr: SocketAddr,
    method: &str,
    path: &str,
    body: &[u8],
) -> Result<(u16, String, Value)> {
    let mut stream = TcpStream::connect(addr)?;
    let head = format!(
        "{method} {path} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    stream.write_all(head.as_bytes())?;
    stream.write_all(body)?;

    let mut response = Vec::new();
    stream.read_to_end(&mut response)?;
    let text = String::from_utf8_lossy(&response).to_string();
    let (headers, body_text) = text
        .split_once("\r\n\r\n")
        .ok_or_else(|| anyhow!("malformed response: {}", text))?;
    let status: u16 = headers
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .ok_or_else(|| anyhow!("missing status line"))?
        .parse()?;
    let value = if body_text.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(body_text.trim())?
    };
    Ok((status, headers.to_string(), value))
}

fn request(addr: SocketAddr, method: &str, path: &str, body: Option<Value>) -> Result<(u16, Value)> {
    let bytes = match body {
        Some(value) => serde_json::to_vec(&value)?,
        None => Vec::new(),
    };
    let (status, _headers, value) = raw_request(addr, method, path, &bytes)?;
    Ok((status, value))
}

fn frame_body() -> Value {
    json!({ "image": image_payload() })
}

#[test]
fn health_reports_status_and_tracked_object() -> Result<()> {
    let server = TestServer::start(busy_frame())?;

    let (status, body) = request(server.addr(), "GET", "/health", None)?;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["detector_available"], true);
    assert_eq!(body["tracked_object"], Value::Null);

    let (status, _) = request(
        server.addr(),
        "POST",
        "/track/set",
        Some(json!({"object": "cup"})),
    )?;
    assert_eq!(status, 200);

    let (_, body) = request(server.addr(), "GET", "/health", None)?;
    assert_eq!(body["tracked_object"], "cup");
    Ok(())
}

#[test]
fn classes_lists_the_full_vocabulary() -> Result<()> {
    let server = TestServer::start(Vec::new())?;
    let (status, body) = request(server.addr(), "GET", "/classes", None)?;
    assert_eq!(status, 200);
    let classes = body["classes"].as_array().expect("classes array");
    assert_eq!(classes.len(), 80);
    assert!(classes.iter().any(|c| c == "cell phone"));
    Ok(())
}

#[test]
fn detect_returns_normalized_detections() -> Result<()> {
    let server = TestServer::start(busy_frame())?;
    let (status, body) = request(server.addr(), "POST", "/detect", Some(frame_body()))?;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    // The 0.2-confidence cup falls below the 0.5 threshold.
    assert_eq!(body["count"], 5);

    for detection in body["detections"].as_array().unwrap() {
        assert!(detection["confidence"].as_f64().unwrap() >= 0.5);
        let x = detection["x"].as_f64().unwrap();
        let y = detection["y"].as_f64().unwrap();
        assert!((-1.0..=1.0).contains(&x));
        assert!((-1.0..=1.0).contains(&y));
        let w = detection["width"].as_f64().unwrap();
        let h = detection["height"].as_f64().unwrap();
        assert!((0.0..=1.0).contains(&w));
        assert!((0.0..=1.0).contains(&h));
    }
    Ok(())
}

#[test]
fn detect_with_no_qualifying_detections_is_not_an_error() -> Result<()> {
    let server = TestServer::start(Vec::new())?;
    let (status, body) = request(server.addr(), "POST", "/detect", Some(frame_body()))?;
    assert_eq!(status, 200);
    assert_eq!(body["count"], 0);
    assert_eq!(body["detections"].as_array().unwrap().len(), 0);
    Ok(())
}

#[test]
fn track_face_picks_the_closest_person() -> Result<()> {
    let server = TestServer::start(busy_frame())?;
    let (status, body) = request(server.addr(), "POST", "/track/face", Some(frame_body()))?;
    assert_eq!(status, 200);
    let face = &body["face"];
    assert_eq!(face["detected"], true);
    // Largest person has area 0.2 -> "close", confidence 0.6.
    assert_eq!(face["distance"], "close");
    assert!((face["confidence"].as_f64().unwrap() - 0.6).abs() < 1e-6);
    Ok(())
}

#[test]
fn track_face_without_persons_is_a_miss() -> Result<()> {
    let server = TestServer::start(vec![det(41, 0.9, 10.0, 10.0, 40.0, 40.0)])?;
    let (status, body) = request(server.addr(), "POST", "/track/face", Some(frame_body()))?;
    assert_eq!(status, 200);
    assert_eq!(body["face"]["detected"], false);
    assert_eq!(body["face"]["x"], 0.0);
    assert_eq!(body["face"]["y"], 0.0);
    Ok(())
}

#[test]
fn track_object_resolves_aliases() -> Result<()> {
    let server = TestServer::start(busy_frame())?;
    let mut body = frame_body();
    body["object"] = json!("phone");
    let (status, body) = request(server.addr(), "POST", "/track/object", Some(body))?;
    assert_eq!(status, 200);
    assert_eq!(body["tracking"], "phone");
    assert_eq!(body["object"]["detected"], true);
    assert_eq!(body["object"]["class"], "cell phone");
    Ok(())
}

#[test]
fn track_object_prefers_the_higher_joint_score() -> Result<()> {
    let server = TestServer::start(busy_frame())?;
    let mut body = frame_body();
    body["object"] = json!("cup");
    let (_, body) = request(server.addr(), "POST", "/track/object", Some(body))?;
    // area 0.09 * conf 0.9 = 0.081 beats area 0.30 * conf 0.2 = 0.06
    // (and the low-confidence cup is threshold-filtered anyway).
    assert_eq!(body["object"]["detected"], true);
    assert!((body["object"]["confidence"].as_f64().unwrap() - 0.9).abs() < 1e-6);
    Ok(())
}

#[test]
fn track_object_without_a_name_needs_a_stored_target() -> Result<()> {
    let server = TestServer::start(busy_frame())?;

    let (status, body) = request(server.addr(), "POST", "/track/object", Some(frame_body()))?;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "no object specified to track");

    // With a stored target the same request succeeds.
    request(
        server.addr(),
        "POST",
        "/track/set",
        Some(json!({"object": "cup"})),
    )?;
    let (status, body) = request(server.addr(), "POST", "/track/object", Some(frame_body()))?;
    assert_eq!(status, 200);
    assert_eq!(body["tracking"], "cup");
    Ok(())
}

#[test]
fn set_and_clear_drive_auto_mode() -> Result<()> {
    let server = TestServer::start(busy_frame())?;

    let (_, fresh) = request(server.addr(), "POST", "/track/auto", Some(frame_body()))?;
    assert_eq!(fresh["mode"], "face");
    assert_eq!(fresh["tracking"], Value::Null);
    assert_eq!(fresh["all_detections"], 5);

    let (status, body) = request(
        server.addr(),
        "POST",
        "/track/set",
        Some(json!({"object": "cup"})),
    )?;
    assert_eq!(status, 200);
    assert_eq!(body["tracking"], "cup");

    let (_, auto) = request(server.addr(), "POST", "/track/auto", Some(frame_body()))?;
    assert_eq!(auto["mode"], "object");
    assert_eq!(auto["tracking"], "cup");
    assert_eq!(auto["position"]["detected"], true);

    let (status, body) = request(server.addr(), "POST", "/track/clear", None)?;
    assert_eq!(status, 200);
    assert_eq!(body["tracking"], Value::Null);

    // After clearing, auto behaves exactly like a fresh service.
    let (_, cleared) = request(server.addr(), "POST", "/track/auto", Some(frame_body()))?;
    assert_eq!(cleared["mode"], fresh["mode"]);
    assert_eq!(cleared["tracking"], fresh["tracking"]);
    assert_eq!(cleared["position"], fresh["position"]);
    Ok(())
}

#[test]
fn set_without_a_name_is_rejected() -> Result<()> {
    let server = TestServer::start(busy_frame())?;
    let (status, body) = request(server.addr(), "POST", "/track/set", Some(json!({})))?;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "no object specified to track");

    let (status, _) = request(
        server.addr(),
        "POST",
        "/track/set",
        Some(json!({"object": "   "})),
    )?;
    assert_eq!(status, 400);
    Ok(())
}

#[test]
fn malformed_bodies_are_structured_errors() -> Result<()> {
    let server = TestServer::start(busy_frame())?;

    let (status, _, body) = raw_request(server.addr(), "POST", "/detect", b"{not json")?;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "invalid JSON");

    let (status, body) = request(server.addr(), "POST", "/detect", Some(json!({})))?;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "no image provided");

    let (status, body) = request(
        server.addr(),
        "POST",
        "/detect",
        Some(json!({"image": "!!not-base64!!"})),
    )?;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "failed to decode image");
    Ok(())
}

#[test]
fn unknown_routes_are_404() -> Result<()> {
    let server = TestServer::start(Vec::new())?;

    let (status, body) = request(server.addr(), "GET", "/nope", None)?;
    assert_eq!(status, 404);
    assert_eq!(body["error"], "unknown endpoint");

    // Wrong method on a known path is unknown too.
    let (status, _) = request(server.addr(), "GET", "/detect", None)?;
    assert_eq!(status, 404);
    Ok(())
}

#[test]
fn detector_failure_is_a_500_and_health_degrades() -> Result<()> {
    let server = TestServer::start_with_detector(Detector::new(
        Box::new(|| Err(anyhow!("weights missing"))),
        0.5,
        Duration::from_secs(2),
    ))?;

    let (status, body) = request(server.addr(), "POST", "/detect", Some(frame_body()))?;
    assert_eq!(status, 500);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("weights missing"));

    let (status, body) = request(server.addr(), "GET", "/health", None)?;
    assert_eq!(status, 200);
    assert_eq!(body["detector_available"], false);
    assert_eq!(body["model_loaded"], false);
    Ok(())
}

#[test]
fn cors_is_permissive() -> Result<()> {
    let server = TestServer::start(Vec::new())?;

    let (status, headers, _) = raw_request(server.addr(), "OPTIONS", "/detect", b"")?;
    assert_eq!(status, 200);
    assert!(headers.contains("Access-Control-Allow-Origin: *"));
    assert!(headers.contains("Access-Control-Allow-Methods: GET, POST, OPTIONS"));

    let (_, headers, _) = raw_request(server.addr(), "GET", "/health", b"")?;
    assert!(headers.contains("Access-Control-Allow-Origin: *"));
    Ok(())
}

#[test]
fn concurrent_requests_never_overlap_inference() -> Result<()> {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let backend = StubBackend::new()
        .with_detections(busy_frame())
        .with_delay(Duration::from_millis(25))
        .with_gauges(in_flight.clone(), peak.clone());

    let server = TestServer::start_with_detector(Detector::new(
        Box::new(move || Ok(Box::new(backend) as Box<dyn DetectorBackend>)),
        0.5,
        Duration::from_secs(5),
    ))?;

    let addr = server.addr();
    let mut handles = Vec::new();
    for _ in 0..4 {
        handles.push(std::thread::spawn(move || {
            request(addr, "POST", "/track/auto", Some(frame_body()))
        }));
    }
    for handle in handles {
        let (status, body) = handle.join().unwrap()?;
        assert_eq!(status, 200);
        assert_eq!(body["mode"], "face");
    }
    assert_eq!(peak.load(Ordering::SeqCst), 1);
    Ok(())
}
