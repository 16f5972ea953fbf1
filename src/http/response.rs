//! Response returned by a transport.

use serde_json::Value;

use super::{Headers, StatusCode};

/// A completed HTTP response with a decoded JSON payload.
///
/// # Examples
///
/// ```
/// use recache::http::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::OK)
///     .header("Content-Type", "application/json")
///     .payload(serde_json::json!({ "status": "ok" }));
///
/// assert!(response.status().is_success());
/// assert_eq!(response.into_payload()["status"], "ok");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    payload: Value,
}

impl Response {
    /// Creates a response with the given status and a `null` payload.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            payload: Value::Null,
        }
    }

    /// Shorthand for a `200 OK` response carrying `payload`.
    pub fn ok(payload: Value) -> Self {
        Self::new(StatusCode::OK).payload(payload)
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Mutable header access for middleware that decorates responses.
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn payload_ref(&self) -> &Value {
        &self.payload
    }

    /// Consumes the response and returns its payload.
    pub fn into_payload(self) -> Value {
        self.payload
    }
}
