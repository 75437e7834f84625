//! Client-side aggregation of the raw statistics rows into the buckets the
//! dashboard shows: per material, per day, per site, top users and a
//! summary.

use crate::api::lenient_i64;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

const UNKNOWN_MATERIAL: &str = "Desconocido";
const UNKNOWN_SITE: &str = "No especificada";
const ANONYMOUS: &str = "Anónimo";
const TOP_USERS: usize = 5;

/// One recycling row as the backend reports it
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatRecord {
    #[serde(default)]
    pub material: Option<String>,
    /// Only JSON numbers count; anything else is treated as 0
    #[serde(default)]
    pub cantidad: Value,
    #[serde(default)]
    pub fecha: Option<String>,
    #[serde(default)]
    pub sede: Option<String>,
    #[serde(default)]
    pub usuario: Option<String>,
}

impl StatRecord {
    fn quantity(&self) -> i64 {
        match &self.cantidad {
            Value::Number(_) => lenient_i64(&self.cantidad).unwrap_or(0),
            _ => 0,
        }
    }

    /// Date part of `fecha` (everything before the first space)
    fn day(&self) -> Option<&str> {
        let fecha = self.fecha.as_deref()?;
        fecha.split(' ').next().filter(|d| !d.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bucket {
    pub name: String,
    pub cantidad: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayBucket {
    pub date: String,
    pub cantidad: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub total: i64,
    /// Items per distinct user, rounded to one decimal
    pub average: f64,
    pub busiest_day: Option<DayBucket>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Stats {
    pub by_material: Vec<Bucket>,
    pub activity: Vec<DayBucket>,
    pub by_site: Vec<Bucket>,
    pub top_users: Vec<Bucket>,
    pub summary: Summary,
}

/// Sum quantities per key, keeping first-seen key order
fn tally<'a>(records: &'a [StatRecord], key: impl Fn(&'a StatRecord) -> String) -> Vec<Bucket> {
    let mut order: Vec<String> = Vec::new();
    let mut sums: HashMap<String, i64> = HashMap::new();
    for record in records {
        let k = key(record);
        let entry = sums.entry(k.clone()).or_insert_with(|| {
            order.push(k);
            0
        });
        *entry += record.quantity();
    }
    order
        .into_iter()
        .map(|name| {
            let cantidad = sums[&name];
            Bucket { name, cantidad }
        })
        .collect()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn date_key(date: &str) -> (Option<NaiveDate>, &str) {
    (NaiveDate::parse_from_str(date, "%Y-%m-%d").ok(), date)
}

pub fn aggregate(records: &[StatRecord]) -> Stats {
    if records.is_empty() {
        return Stats::default();
    }

    let by_material = tally(records, |r| {
        capitalize(
            r.material
                .as_deref()
                .filter(|m| !m.is_empty())
                .unwrap_or(UNKNOWN_MATERIAL),
        )
    });

    let dated: Vec<StatRecord> = records
        .iter()
        .filter(|r| r.day().is_some())
        .cloned()
        .collect();
    let mut activity: Vec<DayBucket> = tally(&dated, |r| r.day().unwrap_or_default().to_string())
        .into_iter()
        .map(|b| DayBucket {
            date: b.name,
            cantidad: b.cantidad,
        })
        .collect();
    // Unparseable dates sort first, then by text
    activity.sort_by(|a, b| date_key(&a.date).cmp(&date_key(&b.date)));

    let by_site = tally(records, |r| {
        r.sede
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| UNKNOWN_SITE.to_string())
    });

    let mut top_users = tally(records, |r| {
        r.usuario
            .clone()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| ANONYMOUS.to_string())
    });
    top_users.sort_by(|a, b| b.cantidad.cmp(&a.cantidad));
    top_users.truncate(TOP_USERS);

    let total: i64 = records.iter().map(StatRecord::quantity).sum();
    let users: HashSet<Option<&str>> = records.iter().map(|r| r.usuario.as_deref()).collect();
    let average = if users.is_empty() {
        0.0
    } else {
        (total as f64 / users.len() as f64 * 10.0).round() / 10.0
    };

    let mut busiest_day: Option<DayBucket> = None;
    for day in &activity {
        if busiest_day.as_ref().map_or(true, |b| day.cantidad > b.cantidad) {
            busiest_day = Some(day.clone());
        }
    }

    Stats {
        by_material,
        activity,
        by_site,
        top_users,
        summary: Summary {
            total,
            average,
            busiest_day,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records(value: Value) -> Vec<StatRecord> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_empty_input() {
        let stats = aggregate(&[]);
        assert!(stats.by_material.is_empty());
        assert!(stats.activity.is_empty());
        assert_eq!(stats.summary.total, 0);
        assert_eq!(stats.summary.average, 0.0);
        assert!(stats.summary.busiest_day.is_none());
    }

    #[test]
    fn test_aggregate() {
        let rows = records(json!([
            { "material": "plastico", "cantidad": 3, "fecha": "2025-03-02 10:00:00", "sede": "Maipú", "usuario": "ana" },
            { "material": "vidrio", "cantidad": 2, "fecha": "2025-03-01 09:00:00", "sede": "Maipú", "usuario": "bea" },
            { "material": "plastico", "cantidad": "7", "fecha": "2025-03-01 12:00:00", "usuario": "ana" },
            { "cantidad": 4, "fecha": "2025-03-02 18:30:00", "sede": "Alameda" }
        ]));
        let stats = aggregate(&rows);

        assert_eq!(
            stats.by_material,
            vec![
                Bucket { name: "Plastico".to_string(), cantidad: 3 },
                Bucket { name: "Vidrio".to_string(), cantidad: 2 },
                Bucket { name: "Desconocido".to_string(), cantidad: 4 },
            ]
        );
        assert_eq!(
            stats.activity,
            vec![
                DayBucket { date: "2025-03-01".to_string(), cantidad: 2 },
                DayBucket { date: "2025-03-02".to_string(), cantidad: 7 },
            ]
        );
        assert_eq!(stats.by_site[0], Bucket { name: "Maipú".to_string(), cantidad: 5 });
        assert_eq!(stats.by_site[1].name, "No especificada");
        assert_eq!(stats.top_users[0].name, "Anónimo");
        assert_eq!(stats.top_users[0].cantidad, 4);

        assert_eq!(stats.summary.total, 9);
        // 9 items over ana, bea and one anonymous user
        assert_eq!(stats.summary.average, 3.0);
        assert_eq!(
            stats.summary.busiest_day,
            Some(DayBucket { date: "2025-03-02".to_string(), cantidad: 7 })
        );
    }

    #[test]
    fn test_top_users_limited_to_five() {
        let rows: Vec<StatRecord> = (1..=7)
            .map(|i| StatRecord {
                usuario: Some(format!("user{}", i)),
                cantidad: json!(i),
                ..Default::default()
            })
            .collect();
        let stats = aggregate(&rows);
        assert_eq!(stats.top_users.len(), 5);
        assert_eq!(stats.top_users[0].name, "user7");
        assert_eq!(stats.top_users[4].name, "user3");
    }

    #[test]
    fn test_busiest_day_keeps_earliest_tie() {
        let rows = records(json!([
            { "cantidad": 5, "fecha": "2025-01-02" },
            { "cantidad": 5, "fecha": "2025-01-01" }
        ]));
        let stats = aggregate(&rows);
        assert_eq!(stats.summary.busiest_day.unwrap().date, "2025-01-01");
    }

    #[test]
    fn test_average_rounds_to_one_decimal() {
        let rows = records(json!([
            { "cantidad": 10, "usuario": "a" },
            { "cantidad": 0, "usuario": "b" },
            { "cantidad": 0, "usuario": "c" }
        ]));
        assert_eq!(aggregate(&rows).summary.average, 3.3);
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("ñandú"), "Ñandú");
        assert_eq!(capitalize(""), "");
    }
}
