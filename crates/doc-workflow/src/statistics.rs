// Agregados de lectura. Los contadores usan IndexMap para conservar el orden
// de las enumeraciones al serializar.
use doc_domain::{Document, DocumentVersion, InstanceStatus, VersionStatus, VersionType, WorkflowInstance, WorkflowTemplate};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::BTreeSet;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowStatistics {
  pub total_instances: usize,
  pub active_instances: usize,
  pub by_status: IndexMap<String, usize>,
  /// Media de `progress()` sobre todas las instancias.
  pub average_progress: f64,
  /// Instancias activas esperando decisión, por rol del paso actual.
  pub pending_by_role: IndexMap<String, usize>,
  pub average_completion_hours: Option<f64>,
  pub ledger_entries: usize,
  pub active_templates: usize,
}

impl WorkflowStatistics {
  pub fn compute(instances: &[WorkflowInstance], templates: &[WorkflowTemplate], ledger_entries: usize) -> Self {
    let mut by_status: IndexMap<String, usize> = InstanceStatus::ALL.iter().map(|s| (s.as_str().to_string(), 0)).collect();
    let mut pending_by_role: IndexMap<String, usize> = IndexMap::new();
    let mut progress_sum = 0.0;
    let mut completion = Vec::new();

    for inst in instances {
      *by_status.entry(inst.status.as_str().to_string()).or_insert(0) += 1;
      progress_sum += inst.progress();
      if inst.status == InstanceStatus::Completed {
        if let Some(done) = inst.completed_at {
          completion.push((done - inst.started_at).num_seconds() as f64 / 3600.0);
        }
      }
      if let Some(step) = inst.current_step() {
        *pending_by_role.entry(step.approver_role.clone()).or_insert(0) += 1;
      }
    }

    let total = instances.len();
    Self { total_instances: total,
           active_instances: instances.iter().filter(|i| i.is_active()).count(),
           by_status,
           average_progress: if total == 0 { 0.0 } else { progress_sum / total as f64 },
           pending_by_role,
           average_completion_hours: if completion.is_empty() {
             None
           } else {
             Some(completion.iter().sum::<f64>() / completion.len() as f64)
           },
           ledger_entries,
           active_templates: templates.iter().filter(|t| t.is_active).count() }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersioningStatistics {
  pub document_id: Uuid,
  pub document_code: String,
  pub total_versions: usize,
  pub deleted_versions: usize,
  pub by_type: IndexMap<String, usize>,
  pub by_status: IndexMap<String, usize>,
  pub branches: Vec<String>,
  pub current_version: Option<String>,
  pub latest_version: Option<String>,
  pub total_size_bytes: u64,
  pub total_access_count: i64,
  pub total_download_count: i64,
  pub signed_versions: usize,
  pub watermarked_versions: usize,
  pub compressed_versions: usize,
}

impl VersioningStatistics {
  /// Las versiones borradas sólo cuentan en `deleted_versions`.
  pub fn compute(document: &Document, versions: &[DocumentVersion]) -> Self {
    let live: Vec<&DocumentVersion> = versions.iter().filter(|v| !v.is_deleted).collect();
    let mut by_type: IndexMap<String, usize> = VersionType::ALL.iter().map(|t| (t.as_str().to_string(), 0)).collect();
    let mut by_status: IndexMap<String, usize> = VersionStatus::ALL.iter().map(|s| (s.as_str().to_string(), 0)).collect();
    for v in &live {
      *by_type.entry(v.version_type.as_str().to_string()).or_insert(0) += 1;
      *by_status.entry(v.status.as_str().to_string()).or_insert(0) += 1;
    }
    let branches: BTreeSet<String> = live.iter().map(|v| v.branch_name.clone()).collect();

    Self { document_id: document.id,
           document_code: document.code.clone(),
           total_versions: live.len(),
           deleted_versions: versions.len() - live.len(),
           by_type,
           by_status,
           branches: branches.into_iter().collect(),
           current_version: live.iter()
                                .find(|v| v.is_current_version)
                                .map(|v| v.version_number.to_string()),
           latest_version: live.iter().max_by_key(|v| v.sequence).map(|v| v.version_number.to_string()),
           total_size_bytes: live.iter().map(|v| v.size_bytes).sum(),
           total_access_count: live.iter().map(|v| v.access_count).sum(),
           total_download_count: live.iter().map(|v| v.download_count).sum(),
           signed_versions: live.iter().filter(|v| v.signature.is_some()).count(),
           watermarked_versions: live.iter().filter(|v| v.has_watermark()).count(),
           compressed_versions: live.iter().filter(|v| v.is_compressed()).count() }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::{Duration, Utc};
  use doc_domain::{content_checksum, DocumentType, SecurityLevel, StepDefinition, StepState, StepStatus, VersionNumber,
                   MAIN_BRANCH};

  #[test]
  fn workflow_statistics_count_pending_roles() {
    let t = WorkflowTemplate::new("t",
                                  vec![DocumentType::Report],
                                  vec![StepDefinition::new(1, "Manager", "manager", true),
                                       StepDefinition::new(2, "Director", "director", true)]).unwrap();
    let now = Utc::now();
    let step = |status| StepState { status,
                                    ..StepState::from_definition(&t.steps[0], true) };
    let active = WorkflowInstance { id: Uuid::new_v4(),
                                    template_id: t.id,
                                    document_id: Uuid::new_v4(),
                                    version_id: Uuid::new_v4(),
                                    current_step_index: 0,
                                    status: InstanceStatus::Pending,
                                    started_at: now,
                                    started_by: "u".into(),
                                    completed_at: None,
                                    steps: vec![step(StepStatus::Pending)] };
    let mut done = active.clone();
    done.id = Uuid::new_v4();
    done.status = InstanceStatus::Completed;
    done.current_step_index = 1;
    done.steps = vec![step(StepStatus::Completed)];
    done.completed_at = Some(now + Duration::hours(2));

    let stats = WorkflowStatistics::compute(&[active, done], &[t], 1);
    assert_eq!(stats.total_instances, 2);
    assert_eq!(stats.active_instances, 1);
    assert_eq!(stats.by_status["pending"], 1);
    assert_eq!(stats.by_status["completed"], 1);
    assert_eq!(stats.pending_by_role["manager"], 1);
    assert_eq!(stats.average_progress, 0.5);
    assert_eq!(stats.average_completion_hours, Some(2.0));
  }

  #[test]
  fn versioning_statistics_ignore_deleted_versions() {
    let doc = Document::new("R-1", "Informe", DocumentType::Report, SecurityLevel::Public, "o").unwrap();
    let mk = |n: VersionNumber, seq: i64| {
      let mut v = DocumentVersion::new(doc.id,
                                       n,
                                       VersionType::Major,
                                       MAIN_BRANCH,
                                       None,
                                       content_checksum(b"x"),
                                       content_checksum(b"x"),
                                       10,
                                       "u");
      v.sequence = seq;
      v
    };
    let a = mk(VersionNumber::release(1, 0, 0), 1);
    let mut b = mk(VersionNumber::release(2, 0, 0), 2);
    b.is_deleted = true;
    let stats = VersioningStatistics::compute(&doc, &[a, b]);
    assert_eq!(stats.total_versions, 1);
    assert_eq!(stats.deleted_versions, 1);
    assert_eq!(stats.by_type["MAJOR"], 1);
    assert_eq!(stats.latest_version.as_deref(), Some("1.0.0"));
    assert_eq!(stats.total_size_bytes, 10);
  }
}
