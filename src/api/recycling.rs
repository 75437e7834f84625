//! Materials catalogue and recycling submissions.

use super::{de_lenient_i64, Api};
use crate::classifier::image_content_type;
use crate::error::ApiError;
use crate::pending::{group_by_material, PendingStore};
use crate::transport::Request;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

pub const MATERIALS_PATH: &str = "/api/reciclaje/materiales";
pub const REGISTER_RECYCLING_PATH: &str = "/api/reciclaje/registroReciclaje";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Material {
    #[serde(deserialize_with = "de_lenient_i64")]
    pub id_material: i64,
    pub nombre: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmittedMaterial {
    pub id_material: i64,
    pub cantidad: u32,
    pub foto: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecyclingSubmission {
    pub id_sede: i64,
    pub materiales: Vec<SubmittedMaterial>,
}

impl Api {
    pub fn materials(&self) -> Result<Vec<Material>, ApiError> {
        #[derive(Deserialize)]
        struct MaterialsResponse {
            #[serde(default)]
            materiales: Vec<Material>,
        }
        let body: MaterialsResponse = self.get(MATERIALS_PATH)?;
        Ok(body.materiales)
    }

    pub fn register_recycling(&self, submission: &RecyclingSubmission) -> Result<(), ApiError> {
        let body = serde_json::to_value(submission)?;
        self.call(Request::post(REGISTER_RECYCLING_PATH, body))?;
        Ok(())
    }

    /// Submit every pending item that maps to a known material, then clear
    /// the pending list
    pub fn submit_pending(
        &self,
        pending: &mut PendingStore,
        site_id: i64,
    ) -> Result<RecyclingSubmission, ApiError> {
        let materials = self.materials()?;
        let groups = group_by_material(pending.items(), &materials);
        if groups.is_empty() {
            return Err(ApiError::NothingToSubmit);
        }

        let submission = RecyclingSubmission {
            id_sede: site_id,
            materiales: groups
                .into_iter()
                .map(|g| SubmittedMaterial {
                    id_material: g.id_material,
                    cantidad: g.cantidad,
                    foto: g.photo.as_deref().and_then(photo_data_url),
                })
                .collect(),
        };
        self.register_recycling(&submission)?;
        info!(
            site = site_id,
            materials = submission.materiales.len(),
            "recycling registered"
        );
        pending.clear()?;
        Ok(submission)
    }
}

/// Inline a photo as a `data:` URL; unreadable photos are skipped
fn photo_data_url(path: &Path) -> Option<String> {
    match std::fs::read(path) {
        Ok(bytes) => Some(format!(
            "data:{};base64,{}",
            image_content_type(path),
            STANDARD.encode(bytes)
        )),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot attach photo");
            None
        }
    }
}
