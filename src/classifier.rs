//! Client for the image classification service.
//!
//! The service is separate from the rewards backend and takes no
//! credentials: one multipart upload, one JSON verdict.

use crate::error::{ApiError, StoreError};
use crate::transport::{FilePart, Method, Request, Transport};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

pub const CLASSIFY_PATH: &str = "/classify";

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    #[serde(default)]
    pub top_class: Option<String>,
    /// Either a 0..=1 fraction or an already-scaled percentage
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub score: Option<f64>,
}

impl Classification {
    pub fn confidence_display(&self) -> String {
        match self.confidence {
            Some(c) if c <= 1.0 => format!("{:.1}%", c * 100.0),
            Some(c) => format!("{:.1}%", c),
            None => "-".to_string(),
        }
    }
}

pub struct Classifier {
    transport: Arc<dyn Transport>,
}

impl Classifier {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub fn classify_file(&self, path: &Path) -> Result<Classification, ApiError> {
        let bytes = std::fs::read(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.classify_bytes(bytes, image_content_type(path))
    }

    pub fn classify_bytes(
        &self,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<Classification, ApiError> {
        let part = FilePart {
            field: "file".to_string(),
            filename: format!("photo_{}.jpg", chrono::Utc::now().timestamp_millis()),
            content_type: content_type.to_string(),
            bytes,
        };
        let request = Request::new(Method::Post, CLASSIFY_PATH).multipart(part);
        let response = self.transport.send(&request)?;
        if !response.is_success() {
            return Err(ApiError::Status {
                status: response.status,
                message: response
                    .message()
                    .unwrap_or_else(|| "classification failed".to_string()),
            });
        }
        let verdict: Classification = response.json()?;
        debug!(material = ?verdict.top_class, score = ?verdict.score, "image classified");
        Ok(verdict)
    }
}

/// MIME type from the file extension; JPEG when unknown, as the camera
/// pipeline produces
pub fn image_content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;
    use crate::transport::{Body, Response};
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_classify_file_uploads_multipart() {
        let transport = Arc::new(MockTransport::new(|_| {
            Ok(Response::new(
                200,
                json!({ "topClass": "plastico", "confidence": 0.93, "score": 15 }),
            ))
        }));
        let classifier = Classifier::new(transport.clone());

        let mut file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        file.write_all(b"PNGDATA").unwrap();

        let verdict = classifier.classify_file(file.path()).unwrap();
        assert_eq!(verdict.top_class.as_deref(), Some("plastico"));
        assert_eq!(verdict.score, Some(15.0));
        assert_eq!(verdict.confidence_display(), "93.0%");

        let sent = transport.recorded();
        assert_eq!(sent[0].path, CLASSIFY_PATH);
        assert!(sent[0].bearer.is_none());
        match &sent[0].body {
            Body::Multipart(part) => {
                assert_eq!(part.field, "file");
                assert_eq!(part.content_type, "image/png");
                assert_eq!(part.bytes, b"PNGDATA");
                assert!(part.filename.starts_with("photo_"));
            }
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[test]
    fn test_classifier_error_status() {
        let transport = Arc::new(MockTransport::new(|_| {
            Ok(Response::new(422, json!({ "error": "no image" })))
        }));
        let classifier = Classifier::new(transport);
        match classifier.classify_bytes(vec![1, 2, 3], "image/jpeg") {
            Err(ApiError::Status { status, message }) => {
                assert_eq!(status, 422);
                assert_eq!(message, "no image");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_missing_file() {
        let transport = Arc::new(MockTransport::new(|_| Ok(Response::new(200, json!({})))));
        let classifier = Classifier::new(transport.clone());
        assert!(matches!(
            classifier.classify_file(Path::new("/nonexistent/photo.jpg")),
            Err(ApiError::Store(_))
        ));
        assert!(transport.recorded().is_empty());
    }

    #[test]
    fn test_confidence_display_scaled() {
        let c = Classification {
            confidence: Some(87.5),
            ..Default::default()
        };
        assert_eq!(c.confidence_display(), "87.5%");
        assert_eq!(Classification::default().confidence_display(), "-");
    }

    #[test]
    fn test_image_content_type() {
        assert_eq!(image_content_type(Path::new("a.JPG")), "image/jpeg");
        assert_eq!(image_content_type(Path::new("a.png")), "image/png");
        assert_eq!(image_content_type(Path::new("noext")), "image/jpeg");
    }
}
