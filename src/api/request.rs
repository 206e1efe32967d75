use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::Value;

use crate::config::{CPU_THREADS_MAX, CPU_THREADS_MIN};
use crate::device::Device;
use crate::error::DetectError;

use super::http::{multipart_boundary, parse_multipart};

pub(crate) const IMAGE_FIELD: &str = "imageData";
pub(crate) const THREADS_FIELD: &str = "cpuThreads";

/// JSON body of `POST /detect`. Keys are camelCase; snake_case names are
/// accepted too.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetectionRequestBody {
    #[serde(alias = "image_data")]
    image_data: String,
    #[serde(default)]
    device: Option<Value>,
    #[serde(default, alias = "cpu_threads")]
    cpu_threads: Option<Value>,
}

/// Validated detection request, independent of the wire encoding.
#[derive(Debug)]
pub struct DetectionRequest {
    pub image: Vec<u8>,
    pub device: Device,
    pub cpu_threads: Option<usize>,
}

/// Failure to turn a request body into a [`DetectionRequest`].
#[derive(Debug)]
pub enum RequestError {
    /// Body is not parseable as the declared encoding.
    Malformed(String),
    Invalid(DetectError),
}

impl From<DetectError> for RequestError {
    fn from(err: DetectError) -> Self {
        RequestError::Invalid(err)
    }
}

impl DetectionRequest {
    pub fn from_json(body: &[u8]) -> Result<Self, RequestError> {
        let parsed: DetectionRequestBody = serde_json::from_slice(body)
            .map_err(|e| RequestError::Malformed(format!("invalid JSON body: {e}")))?;
        // Range check first: an out-of-range thread count is rejected before
        // the payload is even looked at.
        let cpu_threads = parse_threads_value(parsed.cpu_threads.as_ref())?;
        let image = decode_base64(&parsed.image_data)?;
        Ok(Self {
            image,
            device: Device::normalize(parsed.device.as_ref().and_then(Value::as_str)),
            cpu_threads,
        })
    }

    pub fn from_multipart(content_type: &str, body: &[u8]) -> Result<Self, RequestError> {
        let boundary = multipart_boundary(content_type)
            .ok_or_else(|| RequestError::Malformed("multipart body without boundary".into()))?;
        let parts = parse_multipart(body, &boundary)
            .map_err(|e| RequestError::Malformed(format!("invalid multipart body: {e}")))?;

        let mut image = None;
        let mut device = None;
        let mut threads = None;
        for part in parts {
            match part.name.as_str() {
                "image" | "file" | IMAGE_FIELD => {
                    if let Some(filename) = &part.filename {
                        log::debug!("upload '{}' ({} bytes)", filename, part.data.len());
                    }
                    image = Some(part.data);
                }
                "device" => device = Some(part.text()),
                "cpu_threads" | THREADS_FIELD => {
                    let text = part.text();
                    if !text.is_empty() {
                        threads = Some(text);
                    }
                }
                _ => {}
            }
        }

        let cpu_threads = match threads {
            Some(text) => {
                let value: i64 = text.parse().map_err(|_| {
                    DetectError::validation(THREADS_FIELD, format!("must be an integer, got '{text}'"))
                })?;
                Some(validate_cpu_threads(value)?)
            }
            None => None,
        };
        let image = image.ok_or_else(|| {
            RequestError::Malformed("multipart body has no 'image' part".into())
        })?;
        Ok(Self {
            image,
            device: Device::normalize(device.as_deref()),
            cpu_threads,
        })
    }
}

/// Structural base64 check and decode; the content is not inspected.
pub fn decode_base64(data: &str) -> Result<Vec<u8>, DetectError> {
    let trimmed = data.trim();
    if trimmed.is_empty() {
        return Err(DetectError::validation(IMAGE_FIELD, "image data is empty"));
    }
    STANDARD
        .decode(trimmed)
        .map_err(|e| DetectError::validation(IMAGE_FIELD, format!("invalid base64 encoding: {e}")))
}

/// Check a requested CPU thread count against the supported range.
pub fn validate_cpu_threads(value: i64) -> Result<usize, DetectError> {
    if value < CPU_THREADS_MIN as i64 || value > CPU_THREADS_MAX as i64 {
        return Err(DetectError::validation(
            THREADS_FIELD,
            format!(
                "must be between {} and {}, got {}",
                CPU_THREADS_MIN, CPU_THREADS_MAX, value
            ),
        ));
    }
    Ok(value as usize)
}

fn parse_threads_value(value: Option<&Value>) -> Result<Option<usize>, DetectError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(v) => validate_cpu_threads(v).map(Some),
            None => Err(DetectError::validation(
                THREADS_FIELD,
                format!("must be an integer, got {n}"),
            )),
        },
        Some(other) => Err(DetectError::validation(
            THREADS_FIELD,
            format!("must be an integer, got {other}"),
        )),
    }
}
