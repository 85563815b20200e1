//! Run report: per-group outcomes, summary and output files

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

use super::aggregate::EnsembleResult;
use super::forecast::ForecastTable;
use crate::errors::{EnsembleError, Result};
use crate::grid::FrequencyGroup;

/// A member left out of the aggregation under the skip-member policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberFailure {
    pub model: String,
    pub version: String,
    pub reason: String,
}

/// Everything a successful group produced
#[derive(Debug, Clone)]
pub struct GroupFit {
    pub group: FrequencyGroup,
    pub planned_models: usize,
    pub ensemble: EnsembleResult,
    pub members: Vec<ForecastTable>,
    pub failures: Vec<MemberFailure>,
}

#[derive(Debug)]
pub struct GroupOutcome {
    pub group: String,
    pub result: Result<GroupFit>,
}

#[derive(Debug)]
pub struct FitReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub groups: Vec<GroupOutcome>,
}

impl FitReport {
    /// Ensemble forecasts of the groups that completed, keyed by group name
    pub fn results(&self) -> BTreeMap<&str, &EnsembleResult> {
        self.groups
            .iter()
            .filter_map(|outcome| {
                outcome
                    .result
                    .as_ref()
                    .ok()
                    .map(|fit| (outcome.group.as_str(), &fit.ensemble))
            })
            .collect()
    }

    pub fn get(&self, group: &str) -> Option<&GroupOutcome> {
        self.groups.iter().find(|outcome| outcome.group == group)
    }

    pub fn error(&self, group: &str) -> Option<&EnsembleError> {
        self.get(group).and_then(|outcome| outcome.result.as_ref().err())
    }

    pub fn succeeded(&self) -> usize {
        self.groups.iter().filter(|g| g.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.groups.len() - self.succeeded()
    }

    pub fn summary(&self) -> RunSummary {
        let groups = self
            .groups
            .iter()
            .map(|outcome| match &outcome.result {
                Ok(fit) => GroupSummary {
                    group: outcome.group.clone(),
                    status: GroupStatus::Completed,
                    planned_models: fit.planned_models,
                    trained_models: fit.members.len(),
                    series: fit.ensemble.rows.len(),
                    horizon: fit.ensemble.horizon,
                    skipped_members: fit.failures.clone(),
                    error_kind: None,
                    error: None,
                },
                Err(e) => GroupSummary {
                    group: outcome.group.clone(),
                    status: GroupStatus::Failed,
                    planned_models: 0,
                    trained_models: 0,
                    series: 0,
                    horizon: 0,
                    skipped_members: Vec::new(),
                    error_kind: Some(e.kind().to_string()),
                    error: Some(e.to_string()),
                },
            })
            .collect();

        RunSummary {
            run_id: self.run_id,
            started_at: self.started_at,
            finished_at: self.finished_at,
            duration_secs: (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0,
            groups,
        }
    }

    /// Print run summary
    pub fn display_summary(&self) {
        println!("\n╔════════════════════════════════════════════════════════╗");
        println!("║              NBEATS ENSEMBLE RUN SUMMARY                ║");
        println!("╚════════════════════════════════════════════════════════╝\n");
        println!("Run: {}", self.run_id);
        println!(
            "Groups: {} completed, {} failed\n",
            self.succeeded(),
            self.failed()
        );

        for outcome in &self.groups {
            match &outcome.result {
                Ok(fit) => {
                    println!(
                        "✅ {:<10} {} / {} models, {} series, horizon {}",
                        outcome.group,
                        fit.members.len(),
                        fit.planned_models,
                        fit.ensemble.rows.len(),
                        fit.ensemble.horizon
                    );
                    for failure in &fit.failures {
                        println!("   ⚠️  skipped {} ({}): {}", failure.model, failure.version, failure.reason);
                    }
                }
                Err(e) => println!("❌ {:<10} {}", outcome.group, e),
            }
        }
        println!();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSummary {
    pub group: String,
    pub status: GroupStatus,
    pub planned_models: usize,
    pub trained_models: usize,
    pub series: usize,
    pub horizon: usize,
    pub skipped_members: Vec<MemberFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub groups: Vec<GroupSummary>,
}

/// Write `{group}_ensemble.csv` and `{group}_members.csv` for every completed group,
/// plus `summary.json` for the whole run. Returns the written paths.
pub fn write_outputs(report: &FitReport, dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::new();

    for outcome in &report.groups {
        let Ok(fit) = &outcome.result else {
            continue;
        };

        let ensemble_path = dir.join(format!("{}_ensemble.csv", outcome.group));
        write_ensemble_csv(&fit.ensemble, &ensemble_path)?;
        written.push(ensemble_path);

        let members_path = dir.join(format!("{}_members.csv", outcome.group));
        write_members_csv(&fit.members, fit.ensemble.horizon, &members_path)?;
        written.push(members_path);
    }

    let summary_path = dir.join("summary.json");
    fs::write(&summary_path, serde_json::to_string_pretty(&report.summary())?)?;
    written.push(summary_path);

    info!(dir = %dir.display(), files = written.len(), "Wrote run outputs");
    Ok(written)
}

fn step_columns(horizon: usize) -> impl Iterator<Item = String> {
    (1..=horizon).map(|step| format!("y_hat_{}", step))
}

fn write_ensemble_csv(result: &EnsembleResult, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;

    let mut header = vec!["unique_id".to_string()];
    header.extend(step_columns(result.horizon));
    writer.write_record(&header)?;

    for row in &result.rows {
        let mut record = vec![row.unique_id.clone()];
        record.extend(row.values.iter().map(|v| v.to_string()));
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

fn write_members_csv(members: &[ForecastTable], horizon: usize, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;

    let mut header = vec!["unique_id".to_string(), "model".to_string(), "version".to_string()];
    header.extend(step_columns(horizon));
    writer.write_record(&header)?;

    for member in members {
        for row in &member.rows {
            let mut record = vec![row.unique_id.clone(), member.model.clone(), member.version.clone()];
            record.extend(row.values.iter().map(|v| v.to_string()));
            writer.write_record(&record)?;
        }
    }

    writer.flush()?;
    Ok(())
}
