//! HTTP detection service.
//!
//! A small blocking HTTP/1.1 server on a background thread. Requests are served one
//! at a time by the thread that owns the detection pipeline.
//!
//! - `GET /health`: liveness and backend name
//! - `GET /classes`: classes the detector can report
//! - `POST /detect?threshold=0.5`: raw encoded image body, or a `multipart/form-data`
//!   upload with an `image` file and an optional `threshold` field; returns the
//!   annotated image as a JPEG data URI plus the detections

use anyhow::{anyhow, Result};
use serde_json::json;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::codec;
use crate::detect::{DetectionPipeline, DetectorBackend};
use crate::error::VisionError;
use crate::frame::ImageInput;
use crate::render::{OverlayRenderer, SharedColorAssigner};

const MAX_HEADER_BYTES: usize = 8192;
const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    /// Largest accepted request body; bigger uploads get 413.
    pub max_body_bytes: usize,
    /// Used when `/detect` has no `threshold` query parameter.
    pub default_threshold: f32,
    /// Boxes drawn on the returned image; everything the detector kept by default.
    pub display_threshold: f32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8800".to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            default_threshold: 0.5,
            display_threshold: 0.0,
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

pub struct ApiServer<B: DetectorBackend = Box<dyn DetectorBackend>> {
    cfg: ApiConfig,
    pipeline: DetectionPipeline<B>,
    renderer: OverlayRenderer,
    colors: SharedColorAssigner,
}

impl<B: DetectorBackend + 'static> ApiServer<B> {
    pub fn new(
        cfg: ApiConfig,
        pipeline: DetectionPipeline<B>,
        renderer: OverlayRenderer,
        colors: SharedColorAssigner,
    ) -> Self {
        Self {
            cfg,
            pipeline,
            renderer,
            colors,
        }
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
        log::info!(
            "detection api listening on {} (backend {})",
            addr,
            self.pipeline.backend_name()
        );

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let join = std::thread::spawn(move || {
            let mut server = self;
            if let Err(err) = server.run(listener, shutdown_thread) {
                log::error!("detection api stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }

    fn run(&mut self, listener: TcpListener, shutdown: Arc<AtomicBool>) -> Result<()> {
        loop {
            if shutdown.load(Ordering::SeqCst) {
                break;
            }
            match listener.accept() {
                Ok((stream, peer)) => {
                    if let Err(err) = self.handle_connection(stream) {
                        log::warn!("detection api request from {} failed: {}", peer, err);
                    }
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

    fn handle_connection(&mut self, mut stream: TcpStream) -> Result<()> {
        stream.set_nonblocking(false)?;
        let peer = stream.peer_addr()?;
        let local = stream.local_addr()?;
        if local.ip().is_loopback() && !peer.ip().is_loopback() {
            let response = HttpError::new(403, "forbidden").into_response();
            return write_response(&mut stream, &response);
        }

        let response = match read_request(&mut stream, self.cfg.max_body_bytes) {
            Ok(request) => {
                log::debug!("{} {} ({} bytes)", request.method, request.path, request.body.len());
                self.route(&request).unwrap_or_else(HttpError::into_response)
            }
            Err(err) => err.into_response(),
        };
        write_response(&mut stream, &response)
    }

    fn route(&mut self, request: &HttpRequest) -> Result<HttpResponse, HttpError> {
        match (request.method.as_str(), request.path.as_str()) {
            ("GET", "/health") => Ok(HttpResponse::json(
                200,
                &json!({"status": "ok", "backend": self.pipeline.backend_name()}),
            )),
            ("GET", "/classes") => Ok(HttpResponse::json(
                200,
                &json!({"classes": self.pipeline.class_names()}),
            )),
            ("POST", "/detect") => self.detect(request),
            (_, "/health" | "/classes" | "/detect") => {
                Err(HttpError::new(405, "method_not_allowed"))
            }
            _ => Err(HttpError::new(404, "not_found")),
        }
    }

    fn detect(&mut self, request: &HttpRequest) -> Result<HttpResponse, HttpError> {
        let upload = Upload::from_request(request)?;
        let threshold = match upload
            .threshold
            .or_else(|| request.query.get("threshold").map(String::as_str))
        {
            Some(raw) => raw
                .trim()
                .parse::<f32>()
                .map_err(|_| HttpError::new(400, "invalid_threshold"))?,
            None => self.cfg.default_threshold,
        };
        if upload.image.is_empty() {
            return Err(HttpError::new(400, "empty_body"));
        }

        let image = codec::decode_image(upload.image)?;
        let detections = self
            .pipeline
            .run(&ImageInput::image(&image), threshold)?;

        let annotated = {
            let mut colors = self.colors.lock().unwrap_or_else(PoisonError::into_inner);
            self.renderer.render(
                &image.to_rgb8(),
                &detections,
                self.cfg.display_threshold,
                &mut colors,
            )
        };
        let uri = codec::to_data_uri(&annotated)?;
        log::info!(
            "detect: {} objects (threshold {:.2})",
            detections.len(),
            threshold
        );

        Ok(HttpResponse::json(
            200,
            &json!({"image": uri, "detections": detections.records()}),
        ))
    }
}

/// Image bytes and threshold pulled from a `/detect` request.
#[derive(Debug)]
struct Upload<'a> {
    image: &'a [u8],
    threshold: Option<&'a str>,
}

impl<'a> Upload<'a> {
    fn from_request(request: &'a HttpRequest) -> Result<Self, HttpError> {
        let boundary = match request.content_type.as_deref().and_then(multipart_boundary) {
            Some(boundary) => boundary,
            None => {
                return Ok(Self {
                    image: &request.body,
                    threshold: None,
                })
            }
        };

        let mut image = None;
        let mut threshold = None;
        for part in parse_multipart(&request.body, boundary)? {
            match part.name.as_str() {
                "image" => image = Some(part.data),
                "threshold" => {
                    let raw = std::str::from_utf8(part.data)
                        .map_err(|_| HttpError::new(400, "invalid_threshold"))?;
                    threshold = Some(raw);
                }
                _ => {}
            }
        }
        let image = image.ok_or_else(|| HttpError::new(400, "missing_image"))?;
        Ok(Self { image, threshold })
    }
}

#[derive(Debug)]
struct FormPart<'a> {
    name: String,
    data: &'a [u8],
}

fn multipart_boundary(content_type: &str) -> Option<&str> {
    let mut params = content_type.split(';').map(str::trim);
    let kind = params.next()?;
    if !kind.eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }
    params
        .find_map(|param| param.strip_prefix("boundary="))
        .map(|boundary| boundary.trim_matches('"'))
        .filter(|boundary| !boundary.is_empty())
}

fn parse_multipart<'a>(body: &'a [u8], boundary: &str) -> Result<Vec<FormPart<'a>>, HttpError> {
    let malformed = |detail: &str| HttpError::new(400, "bad_multipart").with_detail(detail);
    let separator = format!("\r\n--{}", boundary).into_bytes();
    let delimiter = &separator[2..];

    let start = find_bytes(body, delimiter).ok_or_else(|| malformed("missing boundary"))?;
    let mut rest = &body[start + delimiter.len()..];
    let mut parts = Vec::new();
    loop {
        if rest.starts_with(b"--") {
            break;
        }
        rest = rest
            .strip_prefix(b"\r\n")
            .ok_or_else(|| malformed("bad boundary line"))?;
        let header_end =
            find_bytes(rest, b"\r\n\r\n").ok_or_else(|| malformed("unterminated part headers"))?;
        let head = String::from_utf8_lossy(&rest[..header_end]);
        let content = &rest[header_end + 4..];
        let end = find_bytes(content, &separator).ok_or_else(|| malformed("unterminated part"))?;
        if let Some(name) = part_name(&head) {
            parts.push(FormPart {
                name,
                data: &content[..end],
            });
        }
        rest = &content[end + separator.len()..];
    }
    Ok(parts)
}

fn part_name(head: &str) -> Option<String> {
    head.split("\r\n")
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("content-disposition"))
        .and_then(|(_, value)| {
            value
                .split(';')
                .map(str::trim)
                .find_map(|param| param.strip_prefix("name="))
                .map(|name| name.trim_matches('"').to_string())
        })
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[derive(Debug)]
struct HttpResponse {
    status: u16,
    body: Vec<u8>,
}

impl HttpResponse {
    fn json(status: u16, value: &serde_json::Value) -> Self {
        Self {
            status,
            body: value.to_string().into_bytes(),
        }
    }
}

#[derive(Debug)]
struct HttpError {
    status: u16,
    code: &'static str,
    detail: Option<String>,
}

impl HttpError {
    fn new(status: u16, code: &'static str) -> Self {
        Self {
            status,
            code,
            detail: None,
        }
    }

    fn with_detail(mut self, detail: impl ToString) -> Self {
        self.detail = Some(detail.to_string());
        self
    }

    fn into_response(self) -> HttpResponse {
        let value = match &self.detail {
            Some(detail) => json!({"error": self.code, "detail": detail}),
            None => json!({"error": self.code}),
        };
        HttpResponse::json(self.status, &value)
    }
}

impl From<VisionError> for HttpError {
    fn from(err: VisionError) -> Self {
        let (status, code) = match &err {
            VisionError::UnsupportedInputType(_) | VisionError::Codec(_) => {
                (400, "unsupported_image")
            }
            VisionError::InvalidThreshold(_) => (400, "invalid_threshold"),
            VisionError::InferenceError(_) => (500, "inference_failed"),
            VisionError::CameraUnavailable { .. } | VisionError::Io(_) => (500, "internal_error"),
        };
        if status >= 500 {
            log::error!("detect failed: {}", err);
        }
        HttpError::new(status, code).with_detail(err)
    }
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    query: HashMap<String, String>,
    content_type: Option<String>,
    body: Vec<u8>,
}

fn read_request(stream: &mut TcpStream, max_body: usize) -> Result<HttpRequest, HttpError> {
    let bad_request = |detail: &str| HttpError::new(400, "bad_request").with_detail(detail);
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .map_err(|e| bad_request(&e.to_string()))?;

    let mut buf = [0u8; 4096];
    let mut data = Vec::new();
    let header_end = loop {
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        if data.len() > MAX_HEADER_BYTES {
            return Err(HttpError::new(431, "headers_too_large"));
        }
        let n = stream
            .read(&mut buf)
            .map_err(|e| bad_request(&e.to_string()))?;
        if n == 0 {
            return Err(bad_request("connection closed before end of headers"));
        }
        data.extend_from_slice(&buf[..n]);
    };

    let head = String::from_utf8_lossy(&data[..header_end]).into_owned();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().ok_or_else(|| bad_request("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| bad_request("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| bad_request("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }

    let content_length = match headers.get("content-length") {
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| bad_request("invalid content-length"))?,
        None => 0,
    };
    if content_length > max_body {
        return Err(HttpError::new(413, "payload_too_large")
            .with_detail(format!("limit is {} bytes", max_body)));
    }

    let mut body = data.split_off(header_end);
    body.truncate(content_length);
    while body.len() < content_length {
        let n = stream
            .read(&mut buf)
            .map_err(|e| bad_request(&e.to_string()))?;
        if n == 0 {
            return Err(bad_request("connection closed before end of body"));
        }
        let take = n.min(content_length - body.len());
        body.extend_from_slice(&buf[..take]);
    }

    let (path, query) = match raw_path.split_once('?') {
        Some((path, query)) => (path, parse_query(query)),
        None => (raw_path, HashMap::new()),
    };
    Ok(HttpRequest {
        method: method.to_string(),
        path: path.to_string(),
        query,
        content_type: headers.get("content-type").cloned(),
        body,
    })
}

fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn write_response(stream: &mut TcpStream, response: &HttpResponse) -> Result<()> {
    let status_line = match response.status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        403 => "HTTP/1.1 403 Forbidden",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        413 => "HTTP/1.1 413 Payload Too Large",
        431 => "HTTP/1.1 431 Request Header Fields Too Large",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        status_line = status_line,
        len = response.body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(&response.body)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_pairs_are_split() {
        let query = parse_query("threshold=0.8&flag&x=1");
        assert_eq!(query.get("threshold").map(String::as_str), Some("0.8"));
        assert_eq!(query.get("x").map(String::as_str), Some("1"));
        assert!(!query.contains_key("flag"));
    }

    fn form_request(body: &[u8]) -> HttpRequest {
        HttpRequest {
            method: "POST".to_string(),
            path: "/detect".to_string(),
            query: HashMap::new(),
            content_type: Some("multipart/form-data; boundary=XyZ".to_string()),
            body: body.to_vec(),
        }
    }

    #[test]
    fn boundary_comes_from_form_data_content_type() {
        assert_eq!(
            multipart_boundary("multipart/form-data; boundary=\"abc 1\""),
            Some("abc 1")
        );
        assert_eq!(multipart_boundary("Multipart/Form-Data;boundary=q"), Some("q"));
        assert_eq!(multipart_boundary("image/png"), None);
        assert_eq!(multipart_boundary("multipart/form-data"), None);
    }

    #[test]
    fn form_upload_yields_image_and_threshold() {
        let body = b"preamble\r\n--XyZ\r\n\
Content-Disposition: form-data; name=\"threshold\"\r\n\r\n0.8\r\n--XyZ\r\n\
Content-Disposition: form-data; name=\"image\"; filename=\"a.png\"\r\n\
Content-Type: image/png\r\n\r\n\x89PNG\r\n--XyZ--\r\n";
        let request = form_request(body);
        let upload = Upload::from_request(&request).expect("upload");
        assert_eq!(upload.image, b"\x89PNG");
        assert_eq!(upload.threshold, Some("0.8"));
    }

    #[test]
    fn form_upload_without_image_is_rejected() {
        let body = b"--XyZ\r\nContent-Disposition: form-data; name=\"threshold\"\r\n\r\n0.5\r\n--XyZ--\r\n";
        let request = form_request(body);
        let err = Upload::from_request(&request).expect_err("no image part");
        assert_eq!((err.status, err.code), (400, "missing_image"));

        let request = form_request(b"--XyZ\r\nContent-Disposition: form-data; name=\"image\"\r\n\r\nabc");
        let err = Upload::from_request(&request).expect_err("unterminated");
        assert_eq!((err.status, err.code), (400, "bad_multipart"));
    }

    #[test]
    fn vision_errors_map_to_status_codes() {
        let err: HttpError = VisionError::InvalidThreshold(3.0).into();
        assert_eq!(err.status, 400);
        let err: HttpError = VisionError::InferenceError(anyhow!("boom")).into();
        assert_eq!(err.status, 500);
        let body = String::from_utf8(err.into_response().body).unwrap();
        assert!(body.contains(r#""error":"inference_failed""#));
    }
}
