//! Advisory extraction-quality gate.
//!
//! Samples the most recently written products and reports what fraction meet
//! the minimum completeness bar. Purely informational; the pipeline never
//! halts on a bad report.

use chrono::{Duration, Utc};
use serde::Serialize;
use tilescout_shared::{QualityConfig, Result};
use tilescout_storage::Storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityLevel {
    Good,
    Warning,
    Critical,
}

impl std::fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Good => f.write_str("good"),
            Self::Warning => f.write_str("warning"),
            Self::Critical => f.write_str("critical"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QualityReport {
    pub level: QualityLevel,
    /// Fraction of sampled records at or above `min_fields`.
    pub ratio: f64,
    pub sampled: u32,
    pub acceptable: u32,
    pub min_fields: u32,
}

pub struct QualityGate {
    config: QualityConfig,
}

impl QualityGate {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    /// Sample recent writes and grade them. An empty sample grades `Good`:
    /// there is nothing to raise an alarm about yet.
    pub async fn sample(&self, storage: &Storage) -> Result<QualityReport> {
        let since = Utc::now() - Duration::hours(self.config.time_window_hours as i64);
        let rows = storage
            .recent_completeness(self.config.window_size, since)
            .await?;

        let sampled = rows.len() as u32;
        let acceptable = rows
            .iter()
            .filter(|(_, score)| *score >= self.config.min_fields)
            .count() as u32;

        let ratio = if sampled == 0 {
            1.0
        } else {
            f64::from(acceptable) / f64::from(sampled)
        };

        let level = if ratio >= self.config.good_threshold {
            QualityLevel::Good
        } else if ratio >= self.config.warning_threshold {
            QualityLevel::Warning
        } else {
            QualityLevel::Critical
        };

        Ok(QualityReport {
            level,
            ratio,
            sampled,
            acceptable,
            min_fields: self.config.min_fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tilescout_shared::ProductRecord;
    use uuid::Uuid;

    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("ts_quality_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    /// Write `count` products with `fields` populated scalar fields each.
    async fn seed(storage: &Storage, count: u32, fields: u32, offset: u32) {
        for i in 0..count {
            let mut record =
                ProductRecord::new(format!("https://shop.example.com/product/{}", offset + i));
            let slots: [&mut Option<String>; 6] = [
                &mut record.sku,
                &mut record.title,
                &mut record.brand,
                &mut record.finish,
                &mut record.color,
                &mut record.dimensions,
            ];
            for slot in slots.into_iter().take(fields as usize) {
                *slot = Some("x".into());
            }
            storage.upsert_product(&record).await.unwrap();
        }
    }

    fn gate(min_fields: u32) -> QualityGate {
        QualityGate::new(QualityConfig {
            min_fields,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn empty_sample_is_good() {
        let storage = test_storage().await;
        let report = gate(10).sample(&storage).await.unwrap();
        assert_eq!(report.level, QualityLevel::Good);
        assert_eq!(report.sampled, 0);
    }

    #[tokio::test]
    async fn all_acceptable_is_good() {
        let storage = test_storage().await;
        seed(&storage, 10, 5, 0).await;
        let report = gate(4).sample(&storage).await.unwrap();
        assert_eq!(report.level, QualityLevel::Good);
        assert_eq!(report.sampled, 10);
        assert_eq!(report.acceptable, 10);
        assert!((report.ratio - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn mixed_sample_is_warning() {
        let storage = test_storage().await;
        seed(&storage, 7, 5, 0).await; // acceptable
        seed(&storage, 3, 1, 100).await; // below bar
        let report = gate(4).sample(&storage).await.unwrap();
        assert_eq!(report.level, QualityLevel::Warning);
        assert_eq!(report.acceptable, 7);
    }

    #[tokio::test]
    async fn half_acceptable_is_critical() {
        let storage = test_storage().await;
        seed(&storage, 5, 5, 0).await;
        seed(&storage, 5, 1, 100).await;
        let report = gate(4).sample(&storage).await.unwrap();
        // 50% sits below the 60% warning floor
        assert_eq!(report.level, QualityLevel::Critical);
        assert!((report.ratio - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn window_size_caps_the_sample() {
        let storage = test_storage().await;
        seed(&storage, 10, 5, 0).await;
        let gate = QualityGate::new(QualityConfig {
            window_size: 4,
            min_fields: 4,
            ..Default::default()
        });
        let report = gate.sample(&storage).await.unwrap();
        assert_eq!(report.sampled, 4);
    }
}
