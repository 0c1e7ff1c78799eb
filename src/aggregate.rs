//! Aggregation Engine
//!
//! Groups stored records by department and reduces them to one bounded
//! threat score:
//!
//! 1. per department: `mean(scores) + variance(scores)` (population variance)
//! 2. across departments: arithmetic mean of the departmental scores
//! 3. truncate toward zero and clamp into [0, 90]
//!
//! The variance term rewards dispersion: a department with a few extreme
//! outliers scores higher than one with uniformly moderate risk.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::AggregationConfig;
use crate::error::{ThreatScoreError, ThreatScoreResult};
use crate::model::{ScoreRecord, StoredRecord, ThreatScore};
use crate::store::RecordStore;

/// How departmental scores are combined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weighting {
    /// Every department counts once, whatever its size
    #[default]
    Unweighted,
    /// Departments count in proportion to their user count
    BySize,
}

/// Statistics of one department
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepartmentScore {
    pub users: usize,
    pub mean: f64,
    /// Population variance (divisor = count)
    pub variance: f64,
}

impl DepartmentScore {
    /// Raw departmental score, unbounded above 90
    pub fn score(&self) -> f64 {
        self.mean + self.variance
    }
}

/// Result of one aggregation pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assessment {
    pub departments: BTreeMap<String, DepartmentScore>,
    pub score: ThreatScore,
}

/// Mean and population variance of `scores`; `None` when empty
pub fn department_score(scores: &[f64]) -> Option<DepartmentScore> {
    if scores.is_empty() {
        return None;
    }
    let n = scores.len() as f64;
    let mean = scores.iter().sum::<f64>() / n;
    let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
    Some(DepartmentScore {
        users: scores.len(),
        mean,
        variance,
    })
}

/// Group records by department and compute each group's statistics
pub fn group_by_department<'a, I>(records: I) -> BTreeMap<String, DepartmentScore>
where
    I: IntoIterator<Item = &'a ScoreRecord>,
{
    let mut groups: FxHashMap<&'a str, Vec<f64>> = FxHashMap::default();
    for record in records {
        groups
            .entry(record.department.as_str())
            .or_default()
            .push(record.score);
    }

    groups
        .into_iter()
        .filter_map(|(department, scores)| {
            department_score(&scores).map(|stats| (department.to_string(), stats))
        })
        .collect()
}

/// `min(max(0, trunc(x)), 90)`; NaN maps to 0
pub fn clamp_score(raw: f64) -> ThreatScore {
    if raw.is_nan() {
        return ThreatScore::MIN;
    }
    // `as` saturates, so infinities land on the bounds.
    ThreatScore::saturating(raw.trunc() as i64)
}

/// Combine departmental scores into the bounded threat score.
///
/// Fails with `NoData` when there are no departments.
pub fn aggregate_departments(
    departments: &BTreeMap<String, DepartmentScore>,
    weighting: Weighting,
) -> ThreatScoreResult<ThreatScore> {
    if departments.is_empty() {
        return Err(ThreatScoreError::NoData);
    }

    let raw = match weighting {
        Weighting::Unweighted => {
            departments.values().map(DepartmentScore::score).sum::<f64>() / departments.len() as f64
        }
        Weighting::BySize => {
            let users: usize = departments.values().map(|d| d.users).sum();
            departments
                .values()
                .map(|d| d.score() * d.users as f64)
                .sum::<f64>()
                / users as f64
        }
    };

    Ok(clamp_score(raw))
}

/// Read side of the pipeline: queries the store and scores the result
pub struct AggregationEngine<'a, S: RecordStore + ?Sized> {
    store: &'a S,
    limit: usize,
    weighting: Weighting,
}

impl<'a, S: RecordStore + ?Sized> AggregationEngine<'a, S> {
    pub fn new(store: &'a S, limit: usize, config: &AggregationConfig) -> Self {
        Self {
            store,
            limit,
            weighting: config.weighting,
        }
    }

    async fn fetch(&self) -> ThreatScoreResult<Vec<StoredRecord>> {
        let records = self.store.query_all(self.limit).await?;
        debug!("Fetched {} records for aggregation", records.len());
        Ok(records)
    }

    /// Department → statistics; empty when the store holds no records
    pub async fn compute_department_scores(&self) -> ThreatScoreResult<BTreeMap<String, DepartmentScore>> {
        let records = self.fetch().await?;
        Ok(group_by_department(records.iter().map(|r| &r.record)))
    }

    /// Department breakdown and bounded score from a single query
    pub async fn assess(&self) -> ThreatScoreResult<Assessment> {
        let departments = self.compute_department_scores().await?;
        let score = aggregate_departments(&departments, self.weighting)?;

        for (name, stats) in &departments {
            debug!(
                "{}: users={} mean={:.3} variance={:.3} score={:.3}",
                name,
                stats.users,
                stats.mean,
                stats.variance,
                stats.score()
            );
        }

        Ok(Assessment { departments, score })
    }

    /// Bounded threat score over every record in the store
    pub async fn compute_aggregated_score(&self) -> ThreatScoreResult<ThreatScore> {
        Ok(self.assess().await?.score)
    }
}
