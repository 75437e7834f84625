//! Reward catalogue and point redemption for members.

use super::{body_error, de_lenient_i64, lenient_i64, Api};
use crate::error::{ApiError, SessionError};
use crate::transport::Request;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

pub const CATALOGUE_PATH: &str = "/api/canje/premios";
pub const VERIFY_REDEMPTION_PATH: &str = "/api/canje/verificarCanje";
pub const REDEEM_PATH: &str = "/api/canje/canjePremio";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Reward {
    #[serde(deserialize_with = "de_lenient_i64")]
    pub id_premio: i64,
    pub nombre: String,
    #[serde(default, deserialize_with = "de_lenient_i64")]
    pub puntos_requeridos: i64,
    #[serde(default, deserialize_with = "de_lenient_i64")]
    pub stock: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disponible: Option<Value>,
}

impl Reward {
    /// Rewards without an explicit flag are treated as enabled
    pub fn is_available(&self) -> bool {
        self.disponible
            .as_ref()
            .and_then(lenient_i64)
            .map_or(true, |v| v != 0)
    }
}

/// Outcome of a redemption request: the id the QR code encodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redemption {
    /// A redemption for this reward was already pending and is reused
    Existing(String),
    Created(String),
}

impl Redemption {
    pub fn id(&self) -> &str {
        match self {
            Redemption::Existing(id) | Redemption::Created(id) => id,
        }
    }
}

pub(crate) fn id_canje(body: &Value) -> Option<String> {
    match body.get("id_canje")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl Api {
    pub fn reward_catalogue(&self) -> Result<Vec<Reward>, ApiError> {
        #[derive(Deserialize)]
        struct CatalogueResponse {
            #[serde(default)]
            premios: Vec<Reward>,
        }
        let body: CatalogueResponse = self.get(CATALOGUE_PATH)?;
        Ok(body.premios)
    }

    /// Redeem points for a reward, reusing a pending redemption if the
    /// backend already has one for it
    pub fn redeem(&self, id_premio: i64) -> Result<Redemption, ApiError> {
        let body = json!({ "id_premio": id_premio });

        match self
            .session()
            .authorized_request(&Request::post(VERIFY_REDEMPTION_PATH, body.clone()))
        {
            Ok(resp) if resp.is_success() => {
                if let Some(id) = id_canje(&resp.body) {
                    return Ok(Redemption::Existing(id));
                }
            }
            Ok(resp) => debug!(status = resp.status, "no pending redemption to reuse"),
            Err(e @ SessionError::RefreshFailure(_)) => return Err(e.into()),
            Err(e) => warn!(error = %e, "redemption check failed"),
        }

        let resp = self.call(Request::post(REDEEM_PATH, body))?;
        if let Some(message) = body_error(&resp.body) {
            return Err(ApiError::Rejected(message));
        }
        id_canje(&resp.body)
            .map(Redemption::Created)
            .ok_or_else(|| ApiError::Rejected("backend returned no redemption id".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{json_body, signed_in};
    use super::*;
    use crate::transport::Response;

    #[test]
    fn test_catalogue() {
        let (api, _) = signed_in(|_| {
            Ok(Response::new(
                200,
                json!({ "premios": [
                    { "id_premio": 1, "nombre": "Botella", "puntos_requeridos": 100, "stock": 3 },
                    { "id_premio": "2", "nombre": "Bolso", "puntos_requeridos": "250", "stock": 0, "disponible": 0 }
                ] }),
            ))
        });
        let rewards = api.reward_catalogue().unwrap();
        assert_eq!(rewards[1].id_premio, 2);
        assert_eq!(rewards[1].puntos_requeridos, 250);
        assert!(rewards[0].is_available());
        assert!(!rewards[1].is_available());
    }

    #[test]
    fn test_redeem_reuses_pending_redemption() {
        let (api, transport) = signed_in(|req| match req.path.as_str() {
            VERIFY_REDEMPTION_PATH => Ok(Response::new(200, json!({ "id_canje": "uuid-1" }))),
            _ => Ok(Response::new(500, Value::Null)),
        });
        assert_eq!(
            api.redeem(4).unwrap(),
            Redemption::Existing("uuid-1".to_string())
        );
        assert_eq!(transport.calls_to(REDEEM_PATH), 0);
    }

    #[test]
    fn test_redeem_creates_when_check_fails() {
        let (api, transport) = signed_in(|req| match req.path.as_str() {
            VERIFY_REDEMPTION_PATH => Ok(Response::new(404, json!({ "message": "none" }))),
            REDEEM_PATH => Ok(Response::new(200, json!({ "id_canje": 77 }))),
            _ => Ok(Response::new(500, Value::Null)),
        });
        let redemption = api.redeem(4).unwrap();
        assert_eq!(redemption, Redemption::Created("77".to_string()));
        assert_eq!(redemption.id(), "77");

        let sent = transport.recorded();
        let redeem = sent.iter().find(|r| r.path == REDEEM_PATH).unwrap();
        assert_eq!(json_body(redeem)["id_premio"], 4);
    }

    #[test]
    fn test_redeem_rejected_in_body() {
        let (api, _) = signed_in(|req| match req.path.as_str() {
            VERIFY_REDEMPTION_PATH => Ok(Response::new(200, json!({}))),
            _ => Ok(Response::new(200, json!({ "error": "Puntos insuficientes" }))),
        });
        match api.redeem(4) {
            Err(ApiError::Rejected(msg)) => assert_eq!(msg, "Puntos insuficientes"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
