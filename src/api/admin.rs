//! Admin console: reward inventory, redemption history and staff-side
//! validation of redemptions.
//!
//! The client only hides these behind the admin role; the backend enforces.

use super::rewards::{id_canje, Reward};
use super::{body_error, de_lenient_i64, Api};
use crate::error::ApiError;
use crate::session::user::de_opt_id;
use crate::transport::Request;
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const ADMIN_REWARDS_PATH: &str = "/api/admin/premios";
pub const ADMIN_REWARD_PATH: &str = "/api/admin/premiosolo";
pub const REWARD_PATH: &str = "/api/admin/premio";
pub const REWARD_STATE_PATH: &str = "/api/admin/estadoPremio";
pub const HISTORY_PATH: &str = "/api/admin/historial";
pub const REDEMPTION_SUMMARY_PATH: &str = "/api/canje/resumen";
pub const VALIDATE_REDEMPTION_PATH: &str = "/api/canje/validarCanje";

/// Redemption state in which staff may hand over the reward
pub const CONFIRMABLE_STATE: &str = "Canjeado";

/// Fields an admin sets when creating or editing a reward
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RewardDraft {
    pub nombre: String,
    pub puntos_requeridos: i64,
    pub stock: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HistoryEntry {
    #[serde(default, deserialize_with = "de_opt_id")]
    pub id_canje: Option<String>,
    #[serde(default)]
    pub premio: Option<String>,
    #[serde(default)]
    pub fecha: Option<String>,
    #[serde(default)]
    pub nombre: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedemptionSummary {
    #[serde(default, deserialize_with = "de_opt_id")]
    pub id_canje: Option<String>,
    #[serde(default)]
    pub premio: Option<String>,
    #[serde(default)]
    pub nombre: Option<String>,
    #[serde(default)]
    pub fecha: Option<String>,
    #[serde(default, deserialize_with = "de_lenient_i64")]
    pub puntos_requeridos: i64,
    #[serde(default, deserialize_with = "de_lenient_i64")]
    pub puntos: i64,
    #[serde(default, deserialize_with = "de_lenient_i64")]
    pub stock: i64,
    #[serde(default)]
    pub estado: Option<String>,
}

impl RedemptionSummary {
    pub fn is_confirmable(&self) -> bool {
        self.estado.as_deref() == Some(CONFIRMABLE_STATE)
    }
}

impl Api {
    pub fn admin_rewards(&self) -> Result<Vec<Reward>, ApiError> {
        #[derive(Deserialize)]
        struct RewardsResponse {
            #[serde(default)]
            premios: Vec<Reward>,
        }
        let body: RewardsResponse = self.get(ADMIN_REWARDS_PATH)?;
        Ok(body.premios)
    }

    pub fn admin_reward(&self, id_premio: i64) -> Result<Reward, ApiError> {
        let response = self.call(Request::get(ADMIN_REWARD_PATH).query("id_premio", id_premio))?;
        if response.body.is_null() {
            return Err(ApiError::Rejected(format!("reward {} not found", id_premio)));
        }
        Ok(response.json()?)
    }

    pub fn add_reward(&self, draft: &RewardDraft) -> Result<(), ApiError> {
        self.call(Request::post(REWARD_PATH, serde_json::to_value(draft)?))?;
        Ok(())
    }

    pub fn update_reward(&self, id_premio: i64, draft: &RewardDraft) -> Result<(), ApiError> {
        let mut body = serde_json::to_value(draft)?;
        body["id_premio"] = json!(id_premio);
        self.call(Request::put(REWARD_PATH, body))?;
        Ok(())
    }

    pub fn set_reward_available(&self, id_premio: i64, available: bool) -> Result<(), ApiError> {
        let estado = if available { "1" } else { "0" };
        self.call(Request::put(
            REWARD_STATE_PATH,
            json!({ "id_premio": id_premio, "estado": estado }),
        ))?;
        Ok(())
    }

    pub fn redemption_history(&self) -> Result<Vec<HistoryEntry>, ApiError> {
        #[derive(Deserialize)]
        struct HistoryResponse {
            #[serde(default)]
            premios: Vec<HistoryEntry>,
        }
        let body: HistoryResponse = self.get(HISTORY_PATH)?;
        Ok(body.premios)
    }

    /// Look up a scanned redemption id
    pub fn redemption_summary(&self, id: &str) -> Result<RedemptionSummary, ApiError> {
        let response = self.call(Request::post(
            REDEMPTION_SUMMARY_PATH,
            json!({ "id_canje": id }),
        ))?;
        if let Some(message) = body_error(&response.body) {
            return Err(ApiError::Rejected(message));
        }
        let mut summary: RedemptionSummary = response.json()?;
        if summary.id_canje.is_none() {
            summary.id_canje = id_canje(&response.body).or_else(|| Some(id.to_string()));
        }
        Ok(summary)
    }

    /// Confirm the hand-over; returns the backend's confirmation message
    pub fn validate_redemption(&self, id: &str) -> Result<String, ApiError> {
        let response = self.call(Request::post(
            VALIDATE_REDEMPTION_PATH,
            json!({ "uuid": id }),
        ))?;
        if let Some(message) = body_error(&response.body) {
            return Err(ApiError::Rejected(message));
        }
        Ok(response
            .message()
            .unwrap_or_else(|| "redemption confirmed".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{json_body, signed_in};
    use super::*;
    use crate::transport::{Method, Response};
    use serde_json::Value;

    #[test]
    fn test_admin_reward_by_id() {
        let (api, transport) = signed_in(|_| {
            Ok(Response::new(
                200,
                json!({ "id_premio": 3, "nombre": "Taza", "puntos_requeridos": 80, "stock": 5, "disponible": 1 }),
            ))
        });
        let reward = api.admin_reward(3).unwrap();
        assert_eq!(reward.nombre, "Taza");
        assert!(reward.is_available());

        let sent = transport.recorded();
        let req = sent.last().unwrap();
        assert_eq!(req.path, ADMIN_REWARD_PATH);
        assert_eq!(req.query, vec![("id_premio".to_string(), "3".to_string())]);
    }

    #[test]
    fn test_admin_reward_missing() {
        let (api, _) = signed_in(|_| Ok(Response::new(200, Value::Null)));
        assert!(matches!(api.admin_reward(3), Err(ApiError::Rejected(_))));
    }

    #[test]
    fn test_update_reward_sends_id() {
        let (api, transport) = signed_in(|_| Ok(Response::new(200, json!({}))));
        let draft = RewardDraft {
            nombre: "Taza".to_string(),
            puntos_requeridos: 90,
            stock: 2,
        };
        api.update_reward(3, &draft).unwrap();

        let sent = transport.recorded();
        let req = sent.last().unwrap();
        assert_eq!(req.method, Method::Put);
        let body = json_body(req);
        assert_eq!(body["id_premio"], 3);
        assert_eq!(body["puntos_requeridos"], 90);
    }

    #[test]
    fn test_set_reward_available_encodes_flag() {
        let (api, transport) = signed_in(|_| Ok(Response::new(200, json!({}))));
        api.set_reward_available(3, false).unwrap();
        let sent = transport.recorded();
        assert_eq!(json_body(sent.last().unwrap())["estado"], "0");
    }

    #[test]
    fn test_redemption_summary_and_validation() {
        let (api, transport) = signed_in(|req| match req.path.as_str() {
            REDEMPTION_SUMMARY_PATH => Ok(Response::new(
                200,
                json!({
                    "id_canje": "abc", "premio": "Taza", "nombre": "Ana",
                    "fecha": "2025-03-01", "puntos_requeridos": 80, "puntos": 120,
                    "stock": 4, "estado": "Canjeado"
                }),
            )),
            VALIDATE_REDEMPTION_PATH => Ok(Response::new(200, json!({ "mensaje": "Canje validado" }))),
            _ => Ok(Response::new(404, Value::Null)),
        });

        let summary = api.redemption_summary("abc").unwrap();
        assert!(summary.is_confirmable());
        assert_eq!(summary.puntos, 120);

        assert_eq!(api.validate_redemption("abc").unwrap(), "Canje validado");
        let sent = transport.recorded();
        assert_eq!(json_body(sent.last().unwrap())["uuid"], "abc");
    }

    #[test]
    fn test_redemption_summary_error_in_body() {
        let (api, _) = signed_in(|_| Ok(Response::new(200, json!({ "error": "Canje no encontrado" }))));
        match api.redemption_summary("zzz") {
            Err(ApiError::Rejected(msg)) => assert_eq!(msg, "Canje no encontrado"),
            other => panic!("unexpected {:?}", other.map(|s| s.id_canje)),
        }
    }

    #[test]
    fn test_history() {
        let (api, _) = signed_in(|_| {
            Ok(Response::new(
                200,
                json!({ "premios": [ { "id_canje": 10, "premio": "Taza", "fecha": "2025-03-01", "nombre": "Ana" } ] }),
            ))
        });
        let history = api.redemption_history().unwrap();
        assert_eq!(history[0].id_canje.as_deref(), Some("10"));
    }
}
