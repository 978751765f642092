//! HTTP surface of the tracking service.
//!
//! A deliberately small, dependency-free HTTP/1.1 server over `TcpListener`:
//! one accept loop, one worker thread per connection, JSON bodies
//! throughout. The caller is a local desktop-app frontend, so CORS is
//! allow-all and there is no authentication.
//!
//! Routes compose the detector adapter, the alias resolver, the target
//! selector and the tracking state machine; all failures are converted to
//! structured `{"error": ...}` bodies at this boundary.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::classes::CLASS_NAMES;
use crate::detect::{Detection, Detector, DetectorError};
use crate::ingest;
use crate::track::{
    select_face, select_object, AliasTable, FoundTarget, TrackingState, TrackingTarget,
};

const MAX_HEADER_BYTES: usize = 8192;
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Everything a request handler needs, shared across connections.
pub struct AppState {
    pub detector: Detector,
    pub aliases: AliasTable,
    pub tracking: TrackingState,
}

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8765".to_string(),
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, state: Arc<AppState>) -> Self {
        Self { cfg, state }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        if configured_addr.ip().is_loopback() && !addr.ip().is_loopback() {
            return Err(anyhow!(
                "api configured for loopback address '{}', but bound to non-loopback address '{}'",
                configured_addr,
                addr
            ));
        }
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let state = self.state;
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, state, shutdown_thread) {
                log::error!("tracking api stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(listener: TcpListener, state: Arc<AppState>, shutdown: Arc<AtomicBool>) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                let state = state.clone();
                std::thread::spawn(move || {
                    if let Err(err) = handle_connection(stream, &state) {
                        log::warn!("tracking api request failed: {}", err);
                    }
                });
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

// ----------------------------------------------------------------------------
// Request handling
// ----------------------------------------------------------------------------

/// Handler failure carrying the HTTP status it maps to.
struct ApiError {
    status: u16,
    message: String,
}

impl ApiError {
    fn bad_request(message: &str) -> Self {
        Self {
            status: 400,
            message: message.to_string(),
        }
    }

    fn not_found() -> Self {
        Self {
            status: 404,
            message: "unknown endpoint".to_string(),
        }
    }
}

impl From<DetectorError> for ApiError {
    fn from(err: DetectorError) -> Self {
        let status = match err {
            DetectorError::Busy => 503,
            DetectorError::Unavailable(_) | DetectorError::Inference(_) => 500,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

/// The one request body shape all POST endpoints share; unused fields are
/// simply absent.
#[derive(Debug, Default, Deserialize)]
struct RequestBody {
    image: Option<String>,
    object: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    detector_available: bool,
    model_loaded: bool,
    tracked_object: Option<String>,
}

#[derive(Serialize)]
struct ClassesResponse {
    classes: &'static [&'static str],
}

#[derive(Serialize)]
struct DetectResponse {
    success: bool,
    detections: Vec<Detection>,
    count: usize,
    elapsed_ms: f64,
}

#[derive(Serialize)]
struct FaceResponse {
    success: bool,
    face: FoundTarget,
    elapsed_ms: f64,
}

#[derive(Serialize)]
struct ObjectResponse {
    success: bool,
    tracking: String,
    object: FoundTarget,
    elapsed_ms: f64,
}

#[derive(Serialize)]
struct TrackingResponse {
    success: bool,
    tracking: Option<String>,
}

#[derive(Serialize)]
struct AutoResponse {
    success: bool,
    mode: &'static str,
    tracking: Option<String>,
    position: FoundTarget,
    all_detections: usize,
    elapsed_ms: f64,
}

fn handle_connection(mut stream: TcpStream, state: &AppState) -> Result<()> {
    let request = match read_request(&mut stream) {
        Ok(request) => request,
        Err(err) => {
            write_error(&mut stream, 400, "malformed request")?;
            return Err(err);
        }
    };

    if request.method == "OPTIONS" {
        return write_response(&mut stream, 200, "application/json", b"");
    }

    let result = match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/health") => handle_health(state),
        ("GET", "/classes") => to_json(&ClassesResponse {
            classes: &CLASS_NAMES,
        }),
        ("POST", "/detect") => handle_detect(state, &request.body),
        ("POST", "/track/face") => handle_track_face(state, &request.body),
        ("POST", "/track/object") => handle_track_object(state, &request.body),
        ("POST", "/track/set") => handle_track_set(state, &request.body),
        ("POST", "/track/clear") => handle_track_clear(state),
        ("POST", "/track/auto") => handle_track_auto(state, &request.body),
        _ => Err(ApiError::not_found()),
    };

    match result {
        Ok(body) => write_response(&mut stream, 200, "application/json", &body),
        Err(err) => {
            if err.status >= 500 {
                log::error!("{} {}: {}", request.method, request.path, err.message);
            } else {
                log::debug!("{} {}: {}", request.method, request.path, err.message);
            }
            write_error(&mut stream, err.status, &err.message)
        }
    }
}

fn handle_health(state: &AppState) -> Result<Vec<u8>, ApiError> {
    let status = state.detector.status();
    let target = state.tracking.snapshot();
    to_json(&HealthResponse {
        status: "ok",
        detector_available: status.available,
        model_loaded: status.loaded,
        tracked_object: target.target_name().map(str::to_string),
    })
}

fn handle_detect(state: &AppState, body: &[u8]) -> Result<Vec<u8>, ApiError> {
    let request = parse_body(body)?;
    let image = decode_frame(&request)?;

    let started = Instant::now();
    let detections = state.detector.detect_frame(&image)?;
    let elapsed = elapsed_ms(started);

    to_json(&DetectResponse {
        success: true,
        count: detections.len(),
        detections,
        elapsed_ms: elapsed,
    })
}

fn handle_track_face(state: &AppState, body: &[u8]) -> Result<Vec<u8>, ApiError> {
    let request = parse_body(body)?;
    let image = decode_frame(&request)?;

    let started = Instant::now();
    let detections = state.detector.detect_frame(&image)?;
    let face = select_face(&detections);
    let elapsed = elapsed_ms(started);

    to_json(&FaceResponse {
        success: true,
        face,
        elapsed_ms: elapsed,
    })
}

fn handle_track_object(state: &AppState, body: &[u8]) -> Result<Vec<u8>, ApiError> {
    let request = parse_body(body)?;
    // An explicit name wins; otherwise fall back to the stored target.
    // Neither mutates the tracking state.
    let name = match requested_object(&request) {
        Some(name) => name,
        None => match state.tracking.snapshot() {
            TrackingTarget::Object(name) => name,
            TrackingTarget::Face => {
                return Err(ApiError::bad_request("no object specified to track"))
            }
        },
    };
    let image = decode_frame(&request)?;

    let started = Instant::now();
    let detections = state.detector.detect_frame(&image)?;
    let object = select_object(&detections, &name, &state.aliases);
    let elapsed = elapsed_ms(started);

    to_json(&ObjectResponse {
        success: true,
        tracking: name,
        object,
        elapsed_ms: elapsed,
    })
}

fn handle_track_set(state: &AppState, body: &[u8]) -> Result<Vec<u8>, ApiError> {
    let request = parse_body(body)?;
    let name = requested_object(&request)
        .ok_or_else(|| ApiError::bad_request("no object specified to track"))?;
    let name = state
        .tracking
        .set_target(&name)
        .map_err(|e| ApiError::bad_request(&e.to_string()))?;
    log::info!("now tracking: {}", name);

    to_json(&TrackingResponse {
        success: true,
        tracking: Some(name),
    })
}

fn handle_track_clear(state: &AppState) -> Result<Vec<u8>, ApiError> {
    state.tracking.clear();
    log::info!("cleared tracking, back to face mode");

    to_json(&TrackingResponse {
        success: true,
        tracking: None,
    })
}

fn handle_track_auto(state: &AppState, body: &[u8]) -> Result<Vec<u8>, ApiError> {
    let request = parse_body(body)?;
    let image = decode_frame(&request)?;

    let started = Instant::now();
    let detections = state.detector.detect_frame(&image)?;

    let target = state.tracking.snapshot();
    let (mode, tracking, position) = match &target {
        TrackingTarget::Object(name) => {
            let position = select_object(&detections, name, &state.aliases);
            if !position.detected && !detections.is_empty() {
                let mut seen: Vec<&str> =
                    detections.iter().map(|d| d.class_label.as_str()).collect();
                seen.sort_unstable();
                seen.dedup();
                log::debug!("looking for '{}' but only found: {:?}", name, seen);
            }
            ("object", Some(name.clone()), position)
        }
        TrackingTarget::Face => ("face", None, select_face(&detections)),
    };
    let elapsed = elapsed_ms(started);

    if position.detected {
        log::debug!(
            "tracking {}: x={:.2}, y={:.2}",
            mode,
            position.x,
            position.y
        );
    }

    to_json(&AutoResponse {
        success: true,
        mode,
        tracking,
        position,
        all_detections: detections.len(),
        elapsed_ms: elapsed,
    })
}

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

fn parse_body(body: &[u8]) -> Result<RequestBody, ApiError> {
    if body.is_empty() {
        return Ok(RequestBody::default());
    }
    serde_json::from_slice(body).map_err(|_| ApiError::bad_request("invalid JSON"))
}

fn requested_object(request: &RequestBody) -> Option<String> {
    request
        .object
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

fn decode_frame(request: &RequestBody) -> Result<RgbImage, ApiError> {
    let payload = request
        .image
        .as_deref()
        .ok_or_else(|| ApiError::bad_request("no image provided"))?;
    ingest::decode_image(payload).map_err(|err| {
        log::debug!("image decode failed: {}", err);
        ApiError::bad_request("failed to decode image")
    })
}

fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>, ApiError> {
    serde_json::to_vec(value).map_err(|e| ApiError {
        status: 500,
        message: format!("response serialization failed: {}", e),
    })
}

/// Inference + resolution wall time, at 0.1 ms granularity.
fn elapsed_ms(started: Instant) -> f64 {
    (started.elapsed().as_secs_f64() * 10_000.0).round() / 10.0
}

fn write_error(stream: &mut TcpStream, status: u16, message: &str) -> Result<()> {
    let body = serde_json::to_vec(&ErrorBody { error: message })?;
    write_response(stream, status, "application/json", &body)
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        503 => "HTTP/1.1 503 Service Unavailable",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nAccess-Control-Allow-Origin: *\r\nAccess-Control-Allow-Methods: GET, POST, OPTIONS\r\nAccess-Control-Allow-Headers: Content-Type\r\nCache-Control: no-store\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

// ----------------------------------------------------------------------------
// Request parsing
// ----------------------------------------------------------------------------

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    body: Vec<u8>,
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(10)))?;
    let mut buf = [0u8; 4096];
    let mut data = Vec::new();

    let header_end = loop {
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        if data.len() > MAX_HEADER_BYTES {
            return Err(anyhow!("request headers too large"));
        }
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed mid-request"));
        }
        data.extend_from_slice(&buf[..n]);
    };

    let head = std::str::from_utf8(&data[..header_end])?;
    let mut lines = head.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;

    let mut headers = HashMap::new();
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }

    let content_length: usize = match headers.get("content-length") {
        Some(value) => value
            .parse()
            .map_err(|_| anyhow!("invalid content-length"))?,
        None => 0,
    };
    if content_length > MAX_BODY_BYTES {
        return Err(anyhow!("request body too large"));
    }

    let mut body = data[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed mid-body"));
        }
        body.extend_from_slice(&buf[..n]);
    }
    body.truncate(content_length);

    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
        body,
    })
}
