//! Response interpretation
//!
//! The upstream API is inconsistent about body shapes: most endpoints return
//! JSON objects, some return bare JSON arrays, a few return a JSON string that
//! itself contains JSON, and at least one legacy endpoint returns a plain-text
//! token as the entire body. [`classify`] decides the shape once, purely from
//! the text; [`interpret`] then dispatches on it.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ClientError, Result};
use crate::utils::log_sanitizer::truncate_for_log;

/// A completed HTTP response. Read-only once received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseEnvelope {
    status_code: u16,
    body: String,
}

impl ResponseEnvelope {
    pub fn new(status_code: u16, body: impl Into<String>) -> Self {
        Self {
            status_code,
            body: body.into(),
        }
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Whether the status is an application error (`400..=599`).
    pub fn is_error(&self) -> bool {
        (400..=599).contains(&self.status_code)
    }
}

/// Shape of a response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyShape {
    /// A JSON array.
    Array,
    /// A JSON object.
    Object,
    /// A JSON string whose content is itself a JSON array or object (double-encoded).
    Encoded(String),
    /// Any other JSON value: number, boolean, null, or a plain string (unquoted here).
    Scalar(String),
    /// Not JSON at all.
    Opaque,
}

/// Classify a body without decoding it into any target.
pub fn classify(body: &str) -> BodyShape {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return BodyShape::Opaque;
    };

    match value {
        Value::Array(_) => BodyShape::Array,
        Value::Object(_) => BodyShape::Object,
        Value::String(inner) => match serde_json::from_str::<Value>(&inner) {
            Ok(Value::Array(_) | Value::Object(_)) => BodyShape::Encoded(inner),
            _ => BodyShape::Scalar(inner),
        },
        scalar => BodyShape::Scalar(scalar.to_string()),
    }
}

/// A type a response body can be decoded into.
///
/// `decode_json` handles arrays, objects and double-encoded JSON;
/// `from_literal` handles plain-text and scalar bodies and returns `None` when
/// the target has no literal slot.
pub trait ResponseTarget: Sized {
    /// Decode a JSON document.
    fn decode_json(json: &str) -> serde_json::Result<Self>;

    /// Build the target from literal text, if the target supports it.
    fn from_literal(_text: &str) -> Option<Self> {
        None
    }

    /// Build the target from a scalar JSON body.
    ///
    /// `body` is the raw JSON, `text` its unquoted form. Defaults to
    /// [`from_literal`](Self::from_literal) on `text`.
    fn decode_scalar(_body: &str, text: &str) -> Option<Self> {
        Self::from_literal(text)
    }
}

/// Wrapper decoding any `DeserializeOwned` type, without a literal slot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: DeserializeOwned> ResponseTarget for Json<T> {
    fn decode_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json).map(Json)
    }
}

impl<T: DeserializeOwned> ResponseTarget for Vec<T> {
    fn decode_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl ResponseTarget for Value {
    fn decode_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    fn from_literal(text: &str) -> Option<Self> {
        Some(Value::String(text.to_string()))
    }

    /// Scalars keep their JSON type: `42` stays a number, `null` stays null.
    fn decode_scalar(body: &str, _text: &str) -> Option<Self> {
        serde_json::from_str(body).ok()
    }
}

impl ResponseTarget for String {
    fn decode_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    fn from_literal(text: &str) -> Option<Self> {
        Some(text.to_string())
    }
}

/// Target for endpoints that answer with a bare value, such as the legacy
/// token endpoint returning the token as the whole body.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LiteralResponse {
    pub value: String,
}

impl ResponseTarget for LiteralResponse {
    fn decode_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    fn from_literal(text: &str) -> Option<Self> {
        Some(Self {
            value: text.to_string(),
        })
    }
}

/// Fail with [`ClientError::Api`] for `400..=599`, body kept verbatim.
pub fn ensure_success(envelope: &ResponseEnvelope) -> Result<()> {
    if envelope.is_error() {
        log::debug!(
            "API error status {}: {}",
            envelope.status_code,
            truncate_for_log(&envelope.body)
        );
        return Err(ClientError::Api {
            status: envelope.status_code,
            body: envelope.body.clone(),
        });
    }
    Ok(())
}

/// Check the status, then decode the body into `T` according to its shape.
///
/// Returns `Ok(None)` when the body is a JSON scalar and `T` has no literal
/// slot: such bodies are ignored on purpose, not reported.
///
/// # Errors
/// - [`ClientError::Api`] for `400..=599`; the body is never decoded then
/// - [`ClientError::Decode`] when the body does not fit `T`, or is not JSON
///   and `T` has no literal slot
pub fn interpret<T: ResponseTarget>(envelope: &ResponseEnvelope) -> Result<Option<T>> {
    ensure_success(envelope)?;

    let body = envelope.body();
    match classify(body) {
        BodyShape::Opaque => T::from_literal(body).map(Some).ok_or_else(|| {
            decode_error("body is not JSON and the target has no literal slot", body)
        }),
        BodyShape::Array | BodyShape::Object => decode(body, body),
        BodyShape::Encoded(inner) => decode(&inner, body),
        BodyShape::Scalar(text) => {
            let literal = T::decode_scalar(body, &text);
            if literal.is_none() {
                log::debug!(
                    "Ignoring scalar response body: {}",
                    truncate_for_log(body)
                );
            }
            Ok(literal)
        }
    }
}

/// Like [`interpret`], but writes into an optional caller-owned target.
///
/// With `None` only the status is checked. The target is left untouched when
/// the body is ignored.
pub fn interpret_into<T: ResponseTarget>(
    envelope: &ResponseEnvelope,
    target: Option<&mut T>,
) -> Result<()> {
    let Some(target) = target else {
        return ensure_success(envelope);
    };
    if let Some(value) = interpret::<T>(envelope)? {
        *target = value;
    }
    Ok(())
}

fn decode<T: ResponseTarget>(json: &str, body: &str) -> Result<Option<T>> {
    T::decode_json(json).map(Some).map_err(|e| {
        log::error!("Response decode failed: {e}");
        log::error!("Raw response: {}", truncate_for_log(body));
        decode_error(e, body)
    })
}

fn decode_error(detail: impl ToString, body: &str) -> ClientError {
    ClientError::Decode {
        detail: detail.to_string(),
        body: body.to_string(),
    }
}
