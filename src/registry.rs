//! Analysis Registry - In-Flight and Finished Analyses
//!
//! Shared map from request id to progress and result. Pipeline stages
//! report into it through `RegistryObserver`; the lock is only ever held
//! for a map operation, never across an await.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::pipeline::{
    AnalysisPipeline, AnalysisRequest, AnalysisStage, StageObserver, StageStatus, STAGES,
};
use crate::report::{describe_file, AnalysisResult, BuildingType};

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("Analysis not found: {0}")]
    NotFound(String),

    #[error("Analysis {0} has not finished")]
    NotReady(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisEntry {
    pub request_id: String,
    pub file_name: String,
    pub building_type: BuildingType,
    pub status: StageStatus,
    /// Overall percentage across all stages.
    pub progress: f64,
    pub current_stage: Option<String>,
    pub steps: Vec<AnalysisStage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub result: Option<AnalysisResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryStatistics {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub average_score: Option<f64>,
    /// Seconds, over every finished run including failed ones.
    pub average_processing_time: Option<f64>,
    pub critical_issues: usize,
}

#[derive(Clone, Default)]
pub struct AnalysisRegistry {
    entries: Arc<Mutex<HashMap<String, AnalysisEntry>>>,
}

impl AnalysisRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, AnalysisEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a pending analysis and return its request id.
    pub fn create(&self, file_name: impl Into<String>, building_type: BuildingType) -> String {
        let request_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let entry = AnalysisEntry {
            request_id: request_id.clone(),
            file_name: file_name.into(),
            building_type,
            status: StageStatus::Pending,
            progress: 0.0,
            current_stage: None,
            steps: vec![],
            created_at: now,
            updated_at: now,
            result: None,
        };
        self.lock().insert(request_id.clone(), entry);
        request_id
    }

    pub fn get(&self, request_id: &str) -> Option<AnalysisEntry> {
        self.lock().get(request_id).cloned()
    }

    pub fn result(&self, request_id: &str) -> Result<AnalysisResult, RegistryError> {
        let entries = self.lock();
        let entry = entries
            .get(request_id)
            .ok_or_else(|| RegistryError::NotFound(request_id.to_string()))?;
        entry
            .result
            .clone()
            .ok_or_else(|| RegistryError::NotReady(request_id.to_string()))
    }

    /// Newest first.
    pub fn list(&self, limit: usize, offset: usize) -> Vec<AnalysisEntry> {
        let mut entries: Vec<_> = self.lock().values().cloned().collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.into_iter().skip(offset).take(limit).collect()
    }

    pub fn delete(&self, request_id: &str) -> Result<AnalysisEntry, RegistryError> {
        self.lock()
            .remove(request_id)
            .ok_or_else(|| RegistryError::NotFound(request_id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn statistics(&self) -> RegistryStatistics {
        let entries = self.lock();
        let mut stats = RegistryStatistics { total: entries.len(), ..Default::default() };
        let mut scores = vec![];
        let mut times = vec![];

        for entry in entries.values() {
            match entry.status {
                StageStatus::Pending => stats.pending += 1,
                StageStatus::Processing => stats.processing += 1,
                StageStatus::Completed => stats.completed += 1,
                StageStatus::Failed | StageStatus::Cancelled => stats.failed += 1,
            }
            if let Some(result) = &entry.result {
                times.push(result.processing_time);
            }
            // Runs that failed a stage have no meaningful score.
            if let Some(result) = entry.result.as_ref().filter(|_| entry.status == StageStatus::Completed) {
                scores.push(result.compliance_score);
                stats.critical_issues += result.summary.critical_issues;
            }
        }

        if !scores.is_empty() {
            let mean = scores.iter().sum::<f64>() / scores.len() as f64;
            stats.average_score = Some((mean * 10.0).round() / 10.0);
        }
        if !times.is_empty() {
            let mean = times.iter().sum::<f64>() / times.len() as f64;
            stats.average_processing_time = Some((mean * 1000.0).round() / 1000.0);
        }
        stats
    }

    /// Fold one stage transition into the entry's progress.
    pub fn record_stage(&self, request_id: &str, stage: &AnalysisStage) {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(request_id) else {
            tracing::warn!(request_id, stage = %stage.name, "Stage update for unknown analysis");
            return;
        };

        match entry.steps.iter_mut().find(|s| s.step_id == stage.step_id) {
            Some(existing) => *existing = stage.clone(),
            None => entry.steps.push(stage.clone()),
        }

        if stage.status == StageStatus::Processing {
            entry.status = StageStatus::Processing;
            entry.current_stage = Some(stage.name.clone());
        }

        let done: f64 = entry
            .steps
            .iter()
            .map(|s| if s.status == StageStatus::Completed { 100.0 } else { s.progress.min(100.0) })
            .sum();
        entry.progress = ((done / STAGES.len() as f64) * 10.0).round() / 10.0;
        entry.updated_at = Utc::now();
    }

    /// Store the final result. A run that failed a stage is `Failed`.
    pub fn finish(&self, request_id: &str, result: AnalysisResult) {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(request_id) else {
            tracing::warn!(request_id, "Result for unknown analysis dropped");
            return;
        };

        let stage_failed = result.analysis_steps.iter().any(|s| s.status == StageStatus::Failed);
        entry.status = if stage_failed { StageStatus::Failed } else { StageStatus::Completed };
        if !stage_failed {
            entry.progress = 100.0;
        }
        entry.current_stage = None;
        entry.steps = result.analysis_steps.clone();
        entry.updated_at = Utc::now();
        entry.result = Some(result);
    }

    pub fn observer(&self, request_id: impl Into<String>) -> RegistryObserver {
        RegistryObserver { registry: self.clone(), request_id: request_id.into() }
    }

    /// Register an analysis and run it on a spawned task.
    pub fn spawn_analysis(
        &self,
        pipeline: Arc<AnalysisPipeline>,
        request: AnalysisRequest,
    ) -> (String, JoinHandle<()>) {
        let (file_name, _) = describe_file(&request.file_path);
        let request_id = self.create(file_name, request.building_type);

        let registry = self.clone();
        let id = request_id.clone();
        let handle = tokio::spawn(async move {
            let observer = registry.observer(id.clone());
            let result = pipeline
                .run_with_id(id.clone(), &request.file_path, request.building_type, request.project_info, &observer)
                .await;
            registry.finish(&id, result);
        });

        (request_id, handle)
    }
}

/// Forwards stage transitions of one analysis into the registry.
pub struct RegistryObserver {
    registry: AnalysisRegistry,
    request_id: String,
}

impl StageObserver for RegistryObserver {
    fn stage_updated(&self, stage: &AnalysisStage) {
        self.registry.record_stage(&self.request_id, stage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(step: usize, status: StageStatus) -> AnalysisStage {
        AnalysisStage {
            step_id: format!("a-step-{}", step),
            name: STAGES[step - 1].name.to_string(),
            description: String::new(),
            status,
            start_time: None,
            end_time: None,
            duration: None,
            progress: if status == StageStatus::Completed { 100.0 } else { 0.0 },
            result: None,
            errors: vec![],
        }
    }

    #[test]
    fn test_create_get_delete() {
        let registry = AnalysisRegistry::new();
        let id = registry.create("plan.png", BuildingType::Residential);

        let entry = registry.get(&id).unwrap();
        assert_eq!(entry.status, StageStatus::Pending);
        assert_eq!(entry.file_name, "plan.png");
        assert!(matches!(registry.result(&id), Err(RegistryError::NotReady(_))));

        assert!(registry.delete(&id).is_ok());
        assert_eq!(registry.delete(&id).unwrap_err(), RegistryError::NotFound(id.clone()));
        assert!(registry.get(&id).is_none());
    }

    #[test]
    fn test_progress_follows_stages() {
        let registry = AnalysisRegistry::new();
        let id = registry.create("plan.png", BuildingType::Commercial);
        let observer = registry.observer(id.clone());

        observer.stage_updated(&stage(1, StageStatus::Processing));
        let entry = registry.get(&id).unwrap();
        assert_eq!(entry.status, StageStatus::Processing);
        assert_eq!(entry.current_stage.as_deref(), Some("load_image"));
        assert_eq!(entry.progress, 0.0);

        observer.stage_updated(&stage(1, StageStatus::Completed));
        observer.stage_updated(&stage(2, StageStatus::Completed));
        observer.stage_updated(&stage(3, StageStatus::Completed));
        let entry = registry.get(&id).unwrap();
        assert_eq!(entry.steps.len(), 3);
        assert_eq!(entry.progress, 50.0);
    }

    #[test]
    fn test_list_newest_first_with_paging() {
        let registry = AnalysisRegistry::new();
        let first = registry.create("a.png", BuildingType::Commercial);
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = registry.create("b.png", BuildingType::Commercial);

        let listed: Vec<_> = registry.list(10, 0).into_iter().map(|e| e.request_id).collect();
        assert_eq!(listed, vec![second.clone(), first.clone()]);
        assert_eq!(registry.list(1, 1)[0].request_id, first);
        assert!(registry.list(10, 5).is_empty());
    }

    #[test]
    fn test_unknown_id_is_ignored() {
        let registry = AnalysisRegistry::new();
        registry.record_stage("missing", &stage(1, StageStatus::Processing));
        assert!(registry.is_empty());
        assert!(matches!(registry.result("missing"), Err(RegistryError::NotFound(_))));
    }

    #[test]
    fn test_statistics_counts_statuses() {
        let registry = AnalysisRegistry::new();
        registry.create("a.png", BuildingType::Commercial);
        let running = registry.create("b.png", BuildingType::Commercial);
        registry.record_stage(&running, &stage(1, StageStatus::Processing));

        let stats = registry.statistics();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.processing, 1);
        assert_eq!(stats.average_score, None);
        assert_eq!(stats.average_processing_time, None);
    }

    #[test]
    fn test_statistics_average_processing_time() {
        let registry = AnalysisRegistry::new();
        let failed_id = registry.create("a.png", BuildingType::Commercial);
        let mut failed_steps: Vec<_> = (1..=STAGES.len()).map(|n| stage(n, StageStatus::Cancelled)).collect();
        failed_steps[0].status = StageStatus::Failed;
        let failed = AnalysisResult::failed(
            failed_id.clone(),
            std::path::Path::new("a.png"),
            BuildingType::Commercial,
            "unreadable",
            failed_steps,
            0.5,
        );
        registry.finish(&failed_id, failed);

        let done_id = registry.create("b.png", BuildingType::Commercial);
        let mut done = AnalysisResult::failed(
            done_id.clone(),
            std::path::Path::new("b.png"),
            BuildingType::Commercial,
            "placeholder",
            (1..=STAGES.len()).map(|n| stage(n, StageStatus::Completed)).collect(),
            1.5,
        );
        done.compliance_score = 80.0;
        registry.finish(&done_id, done);
        registry.create("c.png", BuildingType::Commercial);

        let stats = registry.statistics();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.average_processing_time, Some(1.0));
        assert_eq!(stats.average_score, Some(80.0));
    }
}
