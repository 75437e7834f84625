//! Profile, recycling history and the points ranking.

use super::{de_lenient_i64, Api};
use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const PROFILE_PATH: &str = "/api/usuario/getPerfil";
pub const RANKING_PATH: &str = "/api/usuario/rankingUsuarios";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProfileInfo {
    #[serde(default)]
    pub nombre: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "de_lenient_i64")]
    pub puntos: i64,
}

/// One past recycling drop-off. Only the id is interpreted; the rest is
/// shown as the backend sent it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecyclingRecord {
    #[serde(default, deserialize_with = "de_lenient_i64")]
    pub id_reciclaje: i64,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub perfil: ProfileInfo,
    #[serde(default)]
    pub reciclajes: Vec<RecyclingRecord>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RankingEntry {
    pub nombre: String,
    #[serde(default, deserialize_with = "de_lenient_i64")]
    pub puntos: i64,
}

impl Api {
    /// Profile with recycling history, newest first
    pub fn profile(&self) -> Result<Profile, ApiError> {
        let mut profile: Profile = self.get(PROFILE_PATH)?;
        profile
            .reciclajes
            .sort_by(|a, b| b.id_reciclaje.cmp(&a.id_reciclaje));
        Ok(profile)
    }

    pub fn ranking(&self) -> Result<Vec<RankingEntry>, ApiError> {
        #[derive(Deserialize)]
        struct RankingResponse {
            #[serde(default)]
            ranking: Vec<RankingEntry>,
        }
        let body: RankingResponse = self.get(RANKING_PATH)?;
        Ok(body.ranking)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::signed_in;
    use crate::transport::Response;
    use serde_json::json;

    #[test]
    fn test_profile_history_sorted_newest_first() {
        let (api, transport) = signed_in(|_| {
            Ok(Response::new(
                200,
                json!({
                    "perfil": { "nombre": "Ana", "email": "a@duoc.cl", "puntos": "120" },
                    "reciclajes": [
                        { "id_reciclaje": 3, "fecha": "2025-01-03" },
                        { "id_reciclaje": 9, "fecha": "2025-02-01" },
                        { "id_reciclaje": 5, "fecha": "2025-01-20" }
                    ]
                }),
            ))
        });

        let profile = api.profile().unwrap();
        assert_eq!(profile.perfil.puntos, 120);
        let ids: Vec<i64> = profile.reciclajes.iter().map(|r| r.id_reciclaje).collect();
        assert_eq!(ids, vec![9, 5, 3]);
        assert_eq!(profile.reciclajes[0].details["fecha"], "2025-02-01");
        assert_eq!(
            transport.recorded().last().unwrap().bearer.as_deref(),
            Some("A1")
        );
    }

    #[test]
    fn test_ranking() {
        let (api, _) = signed_in(|_| {
            Ok(Response::new(
                200,
                json!({ "ranking": [ { "nombre": "Ana", "puntos": 50 }, { "nombre": "Bea", "puntos": 40 } ] }),
            ))
        });
        let ranking = api.ranking().unwrap();
        assert_eq!(ranking.len(), 2);
        assert_eq!(ranking[0].nombre, "Ana");
    }
}
