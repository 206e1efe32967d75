//! HTTP façade over the [`Detector`].
//!
//! - `GET /health` always answers `{"status":"healthy"}`.
//! - `POST /detect` (and its alias `/detect/upload`) accepts either a JSON
//!   body with base64 image data or a multipart upload.
//!
//! Each accepted connection is handled on its own thread and closed after
//! one response. At most `max_connections` are in flight; further clients
//! wait in the listen backlog.

mod http;
mod request;

use anyhow::{anyhow, Result};
use serde_json::json;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::detect::Detector;
use crate::error::DetectError;

use http::{read_request, write_json_response, write_response, HttpRequest, ReadOutcome};
pub use request::{decode_base64, validate_cpu_threads, DetectionRequest, RequestError};

const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;
const DEFAULT_MAX_CONNECTIONS: usize = 64;

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    pub max_body_bytes: usize,
    pub max_connections: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8000".to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

/// Counter bounding the number of connections handled at once.
#[derive(Clone, Debug)]
struct ConnectionSlots {
    active: Arc<AtomicUsize>,
    limit: usize,
}

/// Held by a connection thread; frees its slot on drop.
struct SlotGuard(Arc<AtomicUsize>);

impl ConnectionSlots {
    fn new(limit: usize) -> Self {
        Self {
            active: Arc::new(AtomicUsize::new(0)),
            limit: limit.max(1),
        }
    }

    fn try_acquire(&self) -> Option<SlotGuard> {
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.limit).then_some(n + 1)
            })
            .ok()
            .map(|_| SlotGuard(self.active.clone()))
    }

    fn in_use(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
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
    detector: Arc<Detector>,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, detector: Arc<Detector>) -> Self {
        Self { cfg, detector }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let cfg = self.cfg;
        let detector = self.detector;
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, cfg, detector, shutdown_thread) {
                log::error!("detection api stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(
    listener: TcpListener,
    cfg: ApiConfig,
    detector: Arc<Detector>,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let slots = ConnectionSlots::new(cfg.max_connections);
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        let Some(slot) = slots.try_acquire() else {
            log::debug!("{} connections in flight, deferring accept", slots.in_use());
            std::thread::sleep(Duration::from_millis(50));
            continue;
        };
        match listener.accept() {
            Ok((stream, _)) => {
                let detector = detector.clone();
                let max_body_bytes = cfg.max_body_bytes;
                std::thread::spawn(move || {
                    let _slot = slot;
                    if let Err(err) = handle_connection(stream, &detector, max_body_bytes) {
                        log::warn!("detection api request rejected: {}", err);
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

fn handle_connection(mut stream: TcpStream, detector: &Detector, max_body_bytes: usize) -> Result<()> {
    stream.set_nonblocking(false)?;
    let request = match read_request(&mut stream, max_body_bytes) {
        Ok(ReadOutcome::Request(request)) => request,
        Ok(ReadOutcome::TooLarge(len)) => {
            let detail = format!("request body of {len} bytes exceeds limit of {max_body_bytes}");
            write_error(&mut stream, 413, "payload_too_large", &detail)?;
            return Ok(());
        }
        Err(err) => {
            let _ = write_error(&mut stream, 400, "bad_request", &err.to_string());
            return Err(err);
        }
    };

    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/health") => write_json_response(&mut stream, 200, &json!({"status": "healthy"})),
        (_, "/health") => write_error(&mut stream, 405, "method_not_allowed", "use GET"),
        ("POST", "/detect") | ("POST", "/detect/upload") => {
            handle_detect(&mut stream, detector, &request)
        }
        (_, "/detect") | (_, "/detect/upload") => {
            write_error(&mut stream, 405, "method_not_allowed", "use POST")
        }
        _ => write_error(&mut stream, 404, "not_found", &request.path),
    }
}

fn handle_detect(stream: &mut TcpStream, detector: &Detector, request: &HttpRequest) -> Result<()> {
    let content_type = request.header("content-type").unwrap_or("application/json");
    let parsed = if content_type
        .to_ascii_lowercase()
        .starts_with("multipart/form-data")
    {
        DetectionRequest::from_multipart(content_type, &request.body)
    } else {
        DetectionRequest::from_json(&request.body)
    };

    let parsed = match parsed {
        Ok(parsed) => parsed,
        Err(RequestError::Malformed(detail)) => {
            log::warn!("detect request rejected: {}", detail);
            return write_error(stream, 400, "bad_request", &detail);
        }
        Err(RequestError::Invalid(err)) => return write_detect_error(stream, &err),
    };

    match detector.detect_bytes(&parsed.image, parsed.device, parsed.cpu_threads) {
        Ok(result) => {
            let payload = serde_json::to_vec(&result)?;
            write_response(stream, 200, "application/json", &payload)
        }
        Err(err) => write_detect_error(stream, &err),
    }
}

/// HTTP status for a pipeline error.
///
/// Payload problems (including an undecodable base64 image field) are 400;
/// range violations on other fields are 422.
pub fn status_for(err: &DetectError) -> u16 {
    match err {
        DetectError::Validation { field, .. } if *field == request::IMAGE_FIELD => 400,
        DetectError::Validation { .. } => 422,
        DetectError::Inference(_) => 500,
        DetectError::Decode(_)
        | DetectError::UnsupportedDevice { .. }
        | DetectError::DeviceUnavailable { .. } => 400,
    }
}

fn write_detect_error(stream: &mut TcpStream, err: &DetectError) -> Result<()> {
    let status = status_for(err);
    log::warn!("detect request failed ({}): {}", status, err);
    write_error(stream, status, err.kind(), &err.to_string())
}

fn write_error(stream: &mut TcpStream, status: u16, kind: &str, detail: &str) -> Result<()> {
    write_json_response(stream, status, &json!({"error": kind, "detail": detail}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Device;

    #[test]
    fn connection_slots_are_bounded_and_released() {
        let slots = ConnectionSlots::new(2);
        let first = slots.try_acquire().expect("first slot");
        let second = slots.try_acquire().expect("second slot");
        assert!(slots.try_acquire().is_none());
        assert_eq!(slots.in_use(), 2);

        drop(first);
        assert_eq!(slots.in_use(), 1);
        let third = slots.try_acquire().expect("slot freed by drop");
        drop((second, third));
        assert_eq!(slots.in_use(), 0);

        // A zero limit still admits one connection at a time.
        let slots = ConnectionSlots::new(0);
        let only = slots.try_acquire().expect("one slot");
        assert!(slots.try_acquire().is_none());
        drop(only);
    }

    #[test]
    fn status_mapping() {
        assert_eq!(status_for(&DetectError::Decode("bad".into())), 400);
        assert_eq!(
            status_for(&DetectError::validation("cpuThreads", "out of range")),
            422
        );
        assert_eq!(
            status_for(&DetectError::validation("imageData", "invalid base64")),
            400
        );
        assert_eq!(
            status_for(&DetectError::UnsupportedDevice {
                device: Device::Gpu,
                available: vec![],
            }),
            400
        );
        assert_eq!(status_for(&DetectError::Inference("boom".into())), 500);
    }
}
