//! Dataset Generator
//!
//! Produces a synthetic department → user → score dataset and writes it to
//! the intermediate CSV file (`department,user_id,score`).

use rand::Rng;
use std::ops::Range;
use std::path::Path;
use tracing::info;

use crate::config::DatasetConfig;
use crate::error::ThreatScoreResult;
use crate::model::{ScoreRecord, DATASET_HEADER, MAX_SCORE};

/// What `generate` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerateOutcome {
    /// A file was already present; nothing was written
    Skipped,
    /// A new file was written with this many records
    Written { records: usize },
}

/// Synthetic data generator.
///
/// For every department draws a user count from `users` and, for each user,
/// a score uniformly from [0, 90).
#[derive(Debug, Clone)]
pub struct DatasetGenerator {
    departments: Vec<String>,
    users: Range<u32>,
}

impl DatasetGenerator {
    pub fn new(config: &DatasetConfig) -> Self {
        Self {
            departments: config.departments.clone(),
            users: config.min_users..config.max_users,
        }
    }

    /// Draw a full dataset from `rng`
    pub fn records_with_rng<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<ScoreRecord> {
        let mut records = Vec::new();
        for department in &self.departments {
            let users = if self.users.is_empty() {
                self.users.start
            } else {
                rng.gen_range(self.users.clone())
            };
            for user_id in 0..users {
                let score = rng.gen_range(0.0..f64::from(MAX_SCORE));
                records.push(ScoreRecord::new(department.clone(), user_id, score));
            }
        }
        records
    }

    /// Write a fresh dataset to `path` unless a file already exists there
    pub fn generate(&self, path: impl AsRef<Path>) -> ThreatScoreResult<GenerateOutcome> {
        self.generate_with_rng(path, &mut rand::thread_rng())
    }

    pub fn generate_with_rng<R: Rng + ?Sized>(
        &self,
        path: impl AsRef<Path>,
        rng: &mut R,
    ) -> ThreatScoreResult<GenerateOutcome> {
        let path = path.as_ref();
        if path.exists() {
            info!("Dataset already exists at {:?}, skipping generation", path);
            return Ok(GenerateOutcome::Skipped);
        }
        let records = self.regenerate_with_rng(path, rng)?;
        Ok(GenerateOutcome::Written { records })
    }

    /// Write a fresh dataset to `path`, replacing any existing file.
    ///
    /// Returns the number of records written.
    pub fn regenerate(&self, path: impl AsRef<Path>) -> ThreatScoreResult<usize> {
        self.regenerate_with_rng(path, &mut rand::thread_rng())
    }

    pub fn regenerate_with_rng<R: Rng + ?Sized>(
        &self,
        path: impl AsRef<Path>,
        rng: &mut R,
    ) -> ThreatScoreResult<usize> {
        let path = path.as_ref();
        let records = self.records_with_rng(rng);
        write_dataset(path, &records)?;
        info!("Dataset with {} records saved to {:?}", records.len(), path);
        Ok(records.len())
    }
}

impl Default for DatasetGenerator {
    fn default() -> Self {
        Self::new(&DatasetConfig::default())
    }
}

/// Write `records` to `path` as CSV with the header row.
///
/// The header is written even when `records` is empty.
pub fn write_dataset(path: impl AsRef<Path>, records: &[ScoreRecord]) -> ThreatScoreResult<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;

    writer.write_record(DATASET_HEADER)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::read_dataset;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_generate_bounds() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("threat_scores.csv");

        let outcome = DatasetGenerator::default().generate(&path).unwrap();
        let written = match outcome {
            GenerateOutcome::Written { records } => records,
            GenerateOutcome::Skipped => panic!("fresh path must be written"),
        };

        let dataset = read_dataset(&path, 0.0).unwrap();
        assert_eq!(dataset.records.len(), written);

        let mut per_department: HashMap<&str, u32> = HashMap::new();
        for record in &dataset.records {
            assert!(record.score >= 0.0 && record.score < 90.0);
            *per_department.entry(record.department.as_str()).or_default() += 1;
        }

        assert_eq!(per_department.len(), 5);
        for (department, users) in per_department {
            assert!(
                (10..200).contains(&users),
                "{} has {} users",
                department,
                users
            );
        }
    }

    #[test]
    fn test_generate_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("threat_scores.csv");
        let generator = DatasetGenerator::default();

        generator.generate(&path).unwrap();
        let first = read_dataset(&path, 0.0).unwrap().records;

        assert_eq!(generator.generate(&path).unwrap(), GenerateOutcome::Skipped);
        let second = read_dataset(&path, 0.0).unwrap().records;

        assert_eq!(first.len(), second.len());
        assert_eq!(first, second);
    }

    #[test]
    fn test_regenerate_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("threat_scores.csv");
        write_dataset(&path, &[ScoreRecord::new("HR", 0, 1.0)]).unwrap();

        let config = DatasetConfig {
            departments: vec!["Ops".to_string()],
            min_users: 3,
            max_users: 4,
            ..DatasetConfig::default()
        };
        let written = DatasetGenerator::new(&config).regenerate(&path).unwrap();
        assert_eq!(written, 3);

        let records = read_dataset(&path, 0.0).unwrap().records;
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.department == "Ops"));
        let ids: Vec<u32> = records.iter().map(|r| r.user_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_seeded_generation_is_reproducible() {
        let generator = DatasetGenerator::default();
        let a = generator.records_with_rng(&mut StdRng::seed_from_u64(7));
        let b = generator.records_with_rng(&mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
    }

    #[test]
    fn test_write_empty_dataset_keeps_header() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("empty.csv");
        write_dataset(&path, &[]).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.trim_end(), "department,user_id,score");
    }
}
