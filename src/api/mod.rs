//! Typed wrappers over the rewards backend.
//!
//! Every call is routed through [`SessionManager::authorized_request`], so
//! an expired access token is renewed transparently. A non-2xx status that
//! survives the refresh-and-retry protocol becomes [`ApiError::Status`].

pub mod admin;
pub mod profile;
pub mod recycling;
pub mod rewards;

use crate::error::ApiError;
use crate::session::SessionManager;
use crate::transport::{Request, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::sync::Arc;

pub const STATS_PATH: &str = "/api/stats/data";

pub struct Api {
    session: Arc<SessionManager>,
}

impl Api {
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Send through the session and reject non-2xx statuses
    fn call(&self, request: Request) -> Result<Response, ApiError> {
        let response = self.session.authorized_request(&request)?;
        if !response.is_success() {
            return Err(ApiError::Status {
                status: response.status,
                message: response
                    .message()
                    .unwrap_or_else(|| "request failed".to_string()),
            });
        }
        Ok(response)
    }

    fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        Ok(self.call(Request::get(path))?.json()?)
    }

    /// Raw statistics rows for client-side aggregation
    pub fn stat_records(&self) -> Result<Vec<crate::stats::StatRecord>, ApiError> {
        #[derive(Deserialize)]
        struct StatsResponse {
            #[serde(default)]
            stats: Option<Vec<crate::stats::StatRecord>>,
        }
        let body: StatsResponse = self.get(STATS_PATH)?;
        Ok(body.stats.unwrap_or_default())
    }
}

/// Application-level error reported inside a 2xx body
fn body_error(body: &Value) -> Option<String> {
    body.get("error").and_then(|v| match v {
        Value::String(s) => Some(s.clone()),
        Value::Null | Value::Bool(false) => None,
        other => Some(other.to_string()),
    })
}

/// Numbers sometimes arrive as strings (`"120"`) or decimals; accept all
pub(crate) fn de_lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_i64(&Value::deserialize(deserializer)?).unwrap_or(0))
}

pub(crate) fn lenient_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared fixtures: a session already signed in against a mock backend.

    use super::*;
    use crate::error::TransportError;
    use crate::session::store::memory::MemoryTokenStore;
    use crate::session::LOGIN_PATH;
    use crate::transport::mock::MockTransport;
    use serde_json::json;

    pub fn signed_in(
        handler: impl Fn(&Request) -> Result<Response, TransportError> + Send + Sync + 'static,
    ) -> (Api, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new(move |req| {
            if req.path == LOGIN_PATH {
                return Ok(Response::new(
                    200,
                    json!({ "accessToken": "A1", "refreshToken": "R1", "usuario": { "id_rol": 1 } }),
                ));
            }
            handler(req)
        }));
        let session = Arc::new(SessionManager::new(
            transport.clone(),
            Arc::new(MemoryTokenStore::default()),
        ));
        session.login("a@duoc.cl", "x").expect("mock login");
        (Api::new(session), transport)
    }

    pub fn json_body(req: &Request) -> Value {
        match &req.body {
            crate::transport::Body::Json(v) => v.clone(),
            _ => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::signed_in;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lenient_numbers() {
        assert_eq!(lenient_i64(&json!(12)), Some(12));
        assert_eq!(lenient_i64(&json!("12")), Some(12));
        assert_eq!(lenient_i64(&json!(2.6)), Some(3));
        assert_eq!(lenient_i64(&json!(true)), Some(1));
        assert_eq!(lenient_i64(&json!(null)), None);
    }

    #[test]
    fn test_body_error() {
        assert_eq!(body_error(&json!({"error": "sin stock"})).as_deref(), Some("sin stock"));
        assert!(body_error(&json!({"error": null})).is_none());
        assert!(body_error(&json!({"ok": true})).is_none());
    }

    #[test]
    fn test_status_error_carries_backend_message() {
        let (api, _) = signed_in(|_| Ok(Response::new(500, json!({"message": "db down"}))));
        match api.stat_records() {
            Err(ApiError::Status { status, message }) => {
                assert_eq!(status, 500);
                assert_eq!(message, "db down");
            }
            other => panic!("unexpected {:?}", other.map(|v| v.len())),
        }
    }

    #[test]
    fn test_missing_stats_is_empty() {
        let (api, _) = signed_in(|_| Ok(Response::new(200, json!({}))));
        assert!(api.stat_records().unwrap().is_empty());
    }
}
