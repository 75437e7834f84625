//! HTTP transport for the rewards backend and the classifier service.
//!
//! Requests are described as plain data (`Request`) and executed by a
//! `Transport`. Non-2xx statuses are ordinary `Response`s, not errors: the
//! session layer needs to see a 401 to decide whether to refresh.

use crate::error::TransportError;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
        }
    }
}

/// A single file part of a multipart/form-data body
#[derive(Debug, Clone)]
pub struct FilePart {
    pub field: String,
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub enum Body {
    Empty,
    Json(Value),
    Multipart(FilePart),
}

/// An outgoing request, relative to the transport's base URL.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Body,
    pub bearer: Option<String>,
}

impl Request {
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            query: Vec::new(),
            body: Body::Empty,
            bearer: None,
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: &str, body: Value) -> Self {
        Self::new(Method::Post, path).json(body)
    }

    pub fn put(path: &str, body: Value) -> Self {
        Self::new(Method::Put, path).json(body)
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Body::Json(body);
        self
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn multipart(mut self, part: FilePart) -> Self {
        self.body = Body::Multipart(part);
        self
    }

    /// Copy of this request carrying the given bearer token (or none)
    pub fn with_bearer(&self, token: Option<&str>) -> Self {
        let mut req = self.clone();
        req.bearer = token.map(str::to_string);
        req
    }
}

/// A received response with its body parsed as JSON where possible.
/// Non-JSON bodies are kept as a JSON string; empty bodies become `Null`.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Value,
}

impl Response {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.body.clone())
    }

    /// Human-readable error text from the body, if the backend sent one
    pub fn message(&self) -> Option<String> {
        match &self.body {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Object(map) => ["message", "error", "mensaje"]
                .iter()
                .find_map(|k| map.get(*k).and_then(|v| v.as_str()))
                .map(str::to_string),
            _ => None,
        }
    }
}

/// Executes requests against one base URL.
pub trait Transport: Send + Sync {
    fn send(&self, request: &Request) -> Result<Response, TransportError>;
}

/// Blocking HTTP transport backed by a shared `ureq::Agent`
pub struct HttpTransport {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout_ms: u64) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(timeout_ms))
            .build();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &Request) -> Result<Response, TransportError> {
        let url = self.url(&request.path);
        debug!(method = request.method.as_str(), %url, "sending request");

        let mut req = self.agent.request(request.method.as_str(), &url);
        for (key, value) in &request.query {
            req = req.query(key, value);
        }
        if let Some(token) = &request.bearer {
            req = req.set("Authorization", &format!("Bearer {}", token));
        }

        let result = match &request.body {
            Body::Empty => req.call(),
            Body::Json(value) => req
                .set("Content-Type", "application/json")
                .send_json(value.clone()),
            Body::Multipart(part) => {
                let boundary = format!("recyclo-{}", uuid::Uuid::new_v4().simple());
                req.set(
                    "Content-Type",
                    &format!("multipart/form-data; boundary={}", boundary),
                )
                .send_bytes(&multipart_body(&boundary, part))
            }
        };

        let resp = match result {
            Ok(r) => r,
            Err(ureq::Error::Status(_, r)) => r,
            Err(ureq::Error::Transport(t)) => {
                return Err(TransportError::Connect {
                    url,
                    message: t.to_string(),
                })
            }
        };

        let status = resp.status();
        let text = resp.into_string()?;
        debug!(status, %url, "received response");
        Ok(Response::new(status, parse_body(&text)))
    }
}

fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Encode a single-file multipart/form-data body
fn multipart_body(boundary: &str, part: &FilePart) -> Vec<u8> {
    let mut body = Vec::with_capacity(part.bytes.len() + 256);
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            part.field, part.filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", part.content_type).as_bytes());
    body.extend_from_slice(&part.bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(""), Value::Null);
        assert_eq!(parse_body("{\"a\":1}"), json!({"a": 1}));
        assert_eq!(parse_body("Unauthorized"), json!("Unauthorized"));
    }

    #[test]
    fn test_response_message() {
        let resp = Response::new(400, json!({"message": "bad email"}));
        assert_eq!(resp.message().as_deref(), Some("bad email"));

        let resp = Response::new(200, json!({"error": "sin puntos"}));
        assert_eq!(resp.message().as_deref(), Some("sin puntos"));

        let resp = Response::new(500, Value::Null);
        assert!(resp.message().is_none());
    }

    #[test]
    fn test_multipart_body_layout() {
        let part = FilePart {
            field: "file".to_string(),
            filename: "photo_1.jpg".to_string(),
            content_type: "image/jpeg".to_string(),
            bytes: b"JPEG".to_vec(),
        };
        let body = String::from_utf8(multipart_body("XYZ", &part)).unwrap();
        assert!(body.starts_with("--XYZ\r\n"));
        assert!(body.contains("name=\"file\"; filename=\"photo_1.jpg\""));
        assert!(body.contains("Content-Type: image/jpeg\r\n\r\nJPEG\r\n"));
        assert!(body.ends_with("--XYZ--\r\n"));
    }

    #[test]
    fn test_with_bearer_does_not_mutate_original() {
        let req = Request::get("/api/usuario/getPerfil");
        let authed = req.with_bearer(Some("A1"));
        assert!(req.bearer.is_none());
        assert_eq!(authed.bearer.as_deref(), Some("A1"));
    }
}
