//! Locally cached classification results waiting to be submitted as one
//! recycling drop-off.

use crate::api::recycling::Material;
use crate::classifier::Classification;
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

/// Label used for items the classifier could not name
pub const UNKNOWN_MATERIAL: &str = "desconocido";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingItem {
    pub id: Uuid,
    #[serde(default)]
    pub material: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub photo: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
}

impl PendingItem {
    pub fn from_classification(verdict: &Classification, photo: Option<&Path>) -> Self {
        Self {
            id: Uuid::new_v4(),
            material: verdict.top_class.clone(),
            confidence: verdict.confidence,
            score: verdict.score.unwrap_or(0.0),
            photo: photo.map(Path::to_path_buf),
            created_at: Utc::now(),
        }
    }

    pub fn material_label(&self) -> &str {
        self.material
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(UNKNOWN_MATERIAL)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingSummary {
    pub by_material: BTreeMap<String, usize>,
    pub total_score: f64,
}

/// Items grouped under one backend material id
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialGroup {
    pub id_material: i64,
    pub cantidad: u32,
    /// Photo of the first item in the group
    pub photo: Option<PathBuf>,
}

pub struct PendingStore {
    path: PathBuf,
    items: Vec<PendingItem>,
}

impl PendingStore {
    /// Open the store; a missing or unreadable file starts empty
    pub fn open(path: &Path) -> Self {
        let items = match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "discarding unreadable pending items");
                Vec::new()
            }),
            Err(_) => Vec::new(),
        };
        Self {
            path: path.to_path_buf(),
            items,
        }
    }

    pub fn items(&self) -> &[PendingItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Newest first
    pub fn add(&mut self, item: PendingItem) -> Result<(), StoreError> {
        self.items.insert(0, item);
        self.save()
    }

    /// Remove by full id or unambiguous prefix. Returns the removed item.
    pub fn remove(&mut self, id: &str) -> Result<Option<PendingItem>, StoreError> {
        // An empty prefix would match every id
        let id = id.trim();
        if id.is_empty() {
            return Ok(None);
        }
        let matches: Vec<usize> = self
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.id.to_string().starts_with(id))
            .map(|(i, _)| i)
            .collect();
        let [index] = matches.as_slice() else {
            return Ok(None);
        };
        let removed = self.items.remove(*index);
        self.save()?;
        Ok(Some(removed))
    }

    pub fn clear(&mut self) -> Result<(), StoreError> {
        self.items.clear();
        self.save()
    }

    pub fn summary(&self) -> PendingSummary {
        let mut summary = PendingSummary::default();
        for item in &self.items {
            *summary
                .by_material
                .entry(item.material_label().to_string())
                .or_insert(0) += 1;
            summary.total_score += item.score;
        }
        summary
    }

    fn save(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: self.path.clone(),
                source,
            })?;
        }
        let content =
            serde_json::to_string_pretty(&self.items).map_err(|source| StoreError::Encode {
                path: self.path.clone(),
                source,
            })?;
        std::fs::write(&self.path, content).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

/// Match items to backend materials by case-insensitive name, drop the
/// unmatched ones and count per material id (ascending id order)
pub fn group_by_material(items: &[PendingItem], materials: &[Material]) -> Vec<MaterialGroup> {
    let mut groups: BTreeMap<i64, MaterialGroup> = BTreeMap::new();
    for item in items {
        let Some(name) = item.material.as_deref() else {
            continue;
        };
        let Some(material) = materials
            .iter()
            .find(|m| m.nombre.to_lowercase() == name.to_lowercase())
        else {
            continue;
        };
        groups
            .entry(material.id_material)
            .or_insert_with(|| MaterialGroup {
                id_material: material.id_material,
                cantidad: 0,
                photo: item.photo.clone(),
            })
            .cantidad += 1;
    }
    groups.into_values().collect()
}
