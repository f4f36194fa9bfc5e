//! Per-repository outcomes and the run report built from them.

pub mod render;

use crate::repos::RepositoryDescriptor;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Pipeline stage a repository failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Prepare,
    Clone,
    Archive,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureStage::Prepare => "prepare",
            FailureStage::Clone => "clone",
            FailureStage::Archive => "archive",
        };
        f.write_str(s)
    }
}

/// Result of backing up one repository. Built once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupOutcome {
    #[serde(flatten)]
    pub repository: RepositoryDescriptor,

    #[serde(rename = "success")]
    pub succeeded: bool,

    #[serde(rename = "error", default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<FailureStage>,

    /// Mirror size before compression
    #[serde(rename = "size")]
    pub uncompressed_size_bytes: u64,

    #[serde(rename = "zip_size", default, skip_serializing_if = "Option::is_none")]
    pub archive_size_bytes: Option<u64>,

    #[serde(rename = "duration", with = "duration_secs")]
    pub elapsed: Duration,

    #[serde(rename = "start_time")]
    pub started_at: DateTime<Utc>,

    #[serde(rename = "end_time")]
    pub finished_at: DateTime<Utc>,
}

impl BackupOutcome {
    pub fn success(
        repository: RepositoryDescriptor,
        uncompressed_size_bytes: u64,
        archive_size_bytes: u64,
        started_at: DateTime<Utc>,
        elapsed: Duration,
    ) -> Self {
        Self {
            repository,
            succeeded: true,
            failure_reason: None,
            failed_stage: None,
            uncompressed_size_bytes,
            archive_size_bytes: Some(archive_size_bytes),
            elapsed,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn failure(
        repository: RepositoryDescriptor,
        stage: FailureStage,
        reason: impl Into<String>,
        uncompressed_size_bytes: u64,
        started_at: DateTime<Utc>,
        elapsed: Duration,
    ) -> Self {
        Self {
            repository,
            succeeded: false,
            failure_reason: Some(reason.into()),
            failed_stage: Some(stage),
            uncompressed_size_bytes,
            archive_size_bytes: None,
            elapsed,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn name(&self) -> &str {
        &self.repository.name
    }
}

/// Overall status carried by notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    /// Partial or total failure, or a pre-flight error
    Failure,
    /// The run panicked before producing a report
    Crashed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Success => "Success",
            RunStatus::Failure => "Failure",
            RunStatus::Crashed => "Crashed",
        };
        f.write_str(s)
    }
}

/// Aggregate of one run. `success_count + failure_count == results.len()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    #[serde(rename = "date")]
    pub run_date: NaiveDate,

    #[serde(rename = "start_time")]
    pub started_at: DateTime<Utc>,

    #[serde(rename = "end_time")]
    pub finished_at: DateTime<Utc>,

    #[serde(rename = "duration", with = "duration_secs")]
    pub elapsed: Duration,

    #[serde(rename = "results")]
    pub outcomes: Vec<BackupOutcome>,

    #[serde(rename = "success_count")]
    pub succeeded_count: usize,

    #[serde(rename = "failure_count")]
    pub failed_count: usize,
}

impl RunReport {
    pub fn build(
        run_date: NaiveDate,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        outcomes: Vec<BackupOutcome>,
    ) -> Self {
        let succeeded_count = outcomes.iter().filter(|o| o.succeeded).count();
        let failed_count = outcomes.len() - succeeded_count;
        let elapsed = (finished_at - started_at).to_std().unwrap_or_default();

        Self {
            run_date,
            started_at,
            finished_at,
            elapsed,
            outcomes,
            succeeded_count,
            failed_count,
        }
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// Percentage of repositories backed up; 0 when nothing was processed.
    pub fn success_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            0.0
        } else {
            self.succeeded_count as f64 * 100.0 / self.outcomes.len() as f64
        }
    }

    pub fn all_succeeded(&self) -> bool {
        !self.outcomes.is_empty() && self.failed_count == 0
    }

    pub fn status(&self) -> RunStatus {
        if self.all_succeeded() {
            RunStatus::Success
        } else {
            RunStatus::Failure
        }
    }

    pub fn successful_names(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|o| o.succeeded)
            .map(|o| o.name().to_string())
            .collect()
    }

    pub fn total_archive_bytes(&self) -> u64 {
        self.outcomes.iter().filter_map(|o| o.archive_size_bytes).sum()
    }
}

/// Serialize a `Duration` as fractional seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    pub(crate) fn repo(name: &str) -> RepositoryDescriptor {
        RepositoryDescriptor {
            name: name.to_string(),
            source_url: format!("https://example.com/org/{}.git", name),
        }
    }

    pub(crate) fn sample_report() -> RunReport {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 2, 0, 0).unwrap();
        let outcomes = vec![
            BackupOutcome::success(repo("TestRepo1"), 1_200_000, 400_000, start, Duration::from_secs(60)),
            BackupOutcome::failure(
                repo("TestRepo2"),
                FailureStage::Clone,
                "test error",
                0,
                start,
                Duration::from_secs(30),
            ),
        ];
        RunReport::build(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            start,
            start + chrono::Duration::seconds(90),
            outcomes,
        )
    }

    #[test]
    fn test_counts_add_up() {
        let report = sample_report();
        assert_eq!(report.succeeded_count, 1);
        assert_eq!(report.failed_count, 1);
        assert_eq!(report.succeeded_count + report.failed_count, report.total());
        assert_eq!(report.elapsed, Duration::from_secs(90));
        assert_eq!(report.status(), RunStatus::Failure);
        assert_eq!(report.successful_names(), ["TestRepo1"]);
    }

    #[test]
    fn test_success_rate_guards_empty_run() {
        let now = Utc::now();
        let report = RunReport::build(now.date_naive(), now, now, Vec::new());
        assert_eq!(report.success_rate(), 0.0);
        assert_eq!(report.total(), 0);
        assert!(!report.all_succeeded());
        assert_eq!(report.status(), RunStatus::Failure);

        assert!((sample_report().success_rate() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_finish_before_start_yields_zero_elapsed() {
        let now = Utc::now();
        let report = RunReport::build(now.date_naive(), now, now - chrono::Duration::seconds(5), Vec::new());
        assert_eq!(report.elapsed, Duration::ZERO);
    }

    #[test]
    fn test_structured_field_names() {
        let value = serde_json::to_value(sample_report()).unwrap();

        for key in ["date", "start_time", "end_time", "duration", "results", "success_count", "failure_count"] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert_eq!(value["date"], "2024-01-01");

        let ok = &value["results"][0];
        assert_eq!(ok["name"], "TestRepo1");
        assert_eq!(ok["success"], true);
        assert_eq!(ok["size"], 1_200_000);
        assert_eq!(ok["zip_size"], 400_000);
        assert!(ok.get("error").is_none());

        let failed = &value["results"][1];
        assert_eq!(failed["error"], "test error");
        assert_eq!(failed["failed_stage"], "clone");
        assert!(failed.get("zip_size").is_none());
    }

    #[test]
    fn test_structured_form_reads_back() {
        let json = serde_json::to_string(&sample_report()).unwrap();
        let parsed: RunReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.run_date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(parsed.succeeded_count, 1);
        assert_eq!(parsed.outcomes[1].failure_reason.as_deref(), Some("test error"));
    }
}
