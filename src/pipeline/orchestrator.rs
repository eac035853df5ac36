use super::steps::{CncfloraStage, EspacenetStage, ScopusStage, Stage, StageResult, UnifyStage};
use crate::config::Config;
use crate::constants::RUN_REPORT_FILE;
use crate::error::{EtlError, Result};
use crate::storage::TableStore;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, info_span};

/// Runs the stages in their fixed order, stopping at the first failure
pub struct PipelineOrchestrator {
    stages: Vec<Box<dyn Stage>>,
}

impl PipelineOrchestrator {
    /// The four source stages in execution order
    pub fn new(config: &Config) -> Result<Self> {
        let stages: Vec<Box<dyn Stage>> = vec![
            Box::new(ScopusStage::new(config)),
            Box::new(CncfloraStage::new(config)),
            Box::new(UnifyStage::new(config)),
            Box::new(EspacenetStage::new(config)),
        ];
        Self::from_stages(stages)
    }

    pub fn from_stages(stages: Vec<Box<dyn Stage>>) -> Result<Self> {
        validate_order(&stages)?;
        Ok(Self { stages })
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage in order
    pub fn run_all(&self, store: &mut dyn TableStore) -> Result<PipelineExecutionResult> {
        let stages: Vec<&dyn Stage> = self.stages.iter().map(|s| s.as_ref()).collect();
        self.run(&stages, store)
    }

    /// Run one stage on its own; its inputs must already be in the store
    pub fn run_stage(&self, name: &str, store: &mut dyn TableStore) -> Result<PipelineExecutionResult> {
        let stage = self
            .stages
            .iter()
            .find(|s| s.name() == name)
            .ok_or_else(|| EtlError::UnknownStage(name.to_string()))?;
        self.run(&[stage.as_ref()], store)
    }

    fn run(&self, stages: &[&dyn Stage], store: &mut dyn TableStore) -> Result<PipelineExecutionResult> {
        let mut execution = PipelineExecutionResult::new();
        info!("🚀 Starting pipeline with {} stage(s)", stages.len());

        for (index, stage) in stages.iter().enumerate() {
            info!("🔄 Executing stage {}/{}: {}", index + 1, stages.len(), stage.name());
            match execute_stage(*stage, store) {
                Ok(result) => {
                    info!("✅ Stage '{}' completed: {}", stage.name(), result.message);
                    execution.add_stage_result(result);
                }
                Err(e) => {
                    error!("❌ Stage '{}' failed: {}", stage.name(), e);
                    return Err(EtlError::Stage {
                        stage: stage.name().to_string(),
                        source: Box::new(e),
                    });
                }
            }
        }

        execution.complete();
        info!(
            "🎉 Pipeline completed: {} tables, {} rows",
            execution.total_tables, execution.total_rows
        );
        Ok(execution)
    }
}

/// A stage may only depend on stages listed before it. Dependencies that are
/// not part of this pipeline are satisfied by tables already in the store.
fn validate_order(stages: &[Box<dyn Stage>]) -> Result<()> {
    if stages.is_empty() {
        return Err(EtlError::Config("Pipeline must have at least one stage".to_string()));
    }
    let all: HashSet<&str> = stages.iter().map(|s| s.name()).collect();
    if all.len() != stages.len() {
        return Err(EtlError::Config("Pipeline lists a stage more than once".to_string()));
    }

    let mut seen = HashSet::new();
    for stage in stages {
        for dependency in stage.dependencies() {
            if all.contains(dependency) && !seen.contains(dependency) {
                return Err(EtlError::Config(format!(
                    "Stage '{}' depends on '{}' which appears later in the pipeline",
                    stage.name(),
                    dependency
                )));
            }
        }
        seen.insert(stage.name());
    }
    Ok(())
}

fn execute_stage(stage: &dyn Stage, store: &mut dyn TableStore) -> Result<StageResult> {
    let span = info_span!("stage", name = stage.name());
    let _enter = span.enter();

    for input in stage.inputs() {
        if !store.contains(&input) {
            counter!("etl_stage_runs_total", "stage" => stage.name(), "status" => "missing_input").increment(1);
            return Err(EtlError::MissingInput {
                path: store.location(&input),
            });
        }
    }

    let started = Instant::now();
    let outcome = stage.execute(store);
    let elapsed = started.elapsed();
    histogram!("etl_stage_duration_seconds", "stage" => stage.name()).record(elapsed.as_secs_f64());

    match outcome {
        Ok(mut result) => {
            counter!("etl_stage_runs_total", "stage" => stage.name(), "status" => "ok").increment(1);
            result.duration_ms = elapsed.as_millis() as u64;
            Ok(result)
        }
        Err(e) => {
            counter!("etl_stage_runs_total", "stage" => stage.name(), "status" => "error").increment(1);
            Err(e)
        }
    }
}

/// Summary of one pipeline run, written as the run report
#[derive(Debug, Clone, Serialize)]
pub struct PipelineExecutionResult {
    pub stages: Vec<StageResult>,
    pub total_tables: usize,
    pub total_rows: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PipelineExecutionResult {
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            total_tables: 0,
            total_rows: 0,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn add_stage_result(&mut self, result: StageResult) {
        self.total_tables += result.tables.len();
        self.total_rows += result.rows_written();
        self.stages.push(result);
    }

    pub fn complete(&mut self) {
        self.completed_at = Some(Utc::now());
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        self.completed_at.map(|end| end - self.started_at)
    }

    pub fn stage(&self, name: &str) -> Option<&StageResult> {
        self.stages.iter().find(|s| s.stage == name)
    }

    /// Write `run_report.json` under `dir`
    pub fn write_report(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(RUN_REPORT_FILE);
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        info!("📝 Run report written to {}", path.display());
        Ok(path)
    }
}

impl Default for PipelineExecutionResult {
    fn default() -> Self {
        Self::new()
    }
}
