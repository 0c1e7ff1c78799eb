//! Data model for the threat-score pipeline
//!
//! `ScoreRecord` is the unit written to the dataset file and the record store.
//! `ThreatScore` is the bounded result handed back to callers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed name of the backing index
pub const INDEX_NAME: &str = "threat_scores";

/// Fixed relative filename of the intermediate dataset
pub const DATASET_FILE: &str = "threat_scores.csv";

/// Header row of the dataset file, in column order
pub const DATASET_HEADER: [&str; 3] = ["department", "user_id", "score"];

/// Default page size for `query_all`, sized to the expected maximum corpus
pub const DEFAULT_QUERY_LIMIT: usize = 10_000;

/// Upper bound of both the per-user score range and the aggregated score
pub const MAX_SCORE: u8 = 90;

/// Largest `user_id` the index's 32-bit `integer` mapping accepts
pub const MAX_INDEXED_USER_ID: u32 = i32::MAX as u32;

/// Departments of the reference dataset
pub const DEPARTMENTS: [&str; 5] = ["Engineering", "Marketing", "Finance", "HR", "Science"];

/// One user's score inside a department.
///
/// `user_id` is only unique within a department; stored records are
/// identified by the id the store generates (see [`StoredRecord`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    /// Department name (exact-match keyword in the index)
    pub department: String,
    /// User id within the department
    pub user_id: u32,
    /// Threat score in [0, 90]
    pub score: f64,
}

impl ScoreRecord {
    pub fn new(department: impl Into<String>, user_id: u32, score: f64) -> Self {
        Self {
            department: department.into(),
            user_id,
            score,
        }
    }

    /// Check the record against the data model bounds.
    ///
    /// Returns a human-readable reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        if self.department.is_empty() {
            return Err("department is empty".to_string());
        }
        if !self.score.is_finite() {
            return Err(format!("score {} is not finite", self.score));
        }
        if self.score < 0.0 || self.score > f64::from(MAX_SCORE) {
            return Err(format!("score {} outside [0, {}]", self.score, MAX_SCORE));
        }
        Ok(())
    }
}

/// A record as returned by the store, with the store-generated id
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: String,
    pub record: ScoreRecord,
}

/// Aggregated threat score, always within [0, 90]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreatScore(u8);

impl ThreatScore {
    pub const MIN: ThreatScore = ThreatScore(0);
    pub const MAX: ThreatScore = ThreatScore(MAX_SCORE);

    /// Build a score from an integer, clamping into [0, 90]
    pub fn saturating(value: i64) -> Self {
        Self(value.clamp(0, i64::from(MAX_SCORE)) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl fmt::Display for ThreatScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<ThreatScore> for u8 {
    fn from(score: ThreatScore) -> Self {
        score.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_bounds() {
        assert!(ScoreRecord::new("HR", 1, 0.0).validate().is_ok());
        assert!(ScoreRecord::new("HR", 1, 90.0).validate().is_ok());
        assert!(ScoreRecord::new("HR", 1, 90.5).validate().is_err());
        assert!(ScoreRecord::new("HR", 1, -0.1).validate().is_err());
        assert!(ScoreRecord::new("HR", 1, f64::NAN).validate().is_err());
        assert!(ScoreRecord::new("", 1, 10.0).validate().is_err());
        assert!(ScoreRecord::new("  ", 1, 10.0).validate().is_ok());
    }

    #[test]
    fn test_threat_score_saturating() {
        assert_eq!(ThreatScore::saturating(-5), ThreatScore::MIN);
        assert_eq!(ThreatScore::saturating(42).value(), 42);
        assert_eq!(ThreatScore::saturating(1_000), ThreatScore::MAX);
    }

    #[test]
    fn test_record_json_shape() {
        let json = serde_json::to_value(ScoreRecord::new("Finance", 7, 12.5)).unwrap();
        assert_eq!(json, serde_json::json!({"department": "Finance", "user_id": 7, "score": 12.5}));
    }
}
