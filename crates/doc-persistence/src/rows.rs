// Filas Diesel y conversiones desde/hacia las entidades del dominio. El orden
// de los campos sigue al de `schema.rs` (requisito de `Queryable`).
use crate::schema;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use doc_domain::{Approval, Document, DocumentVersion, DomainError, StepState, WorkflowInstance, WorkflowTemplate};
use docstore::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::str::FromStr;
use uuid::Uuid;

pub(crate) fn ts(d: &DateTime<Utc>) -> i64 {
  d.timestamp_millis()
}

pub(crate) fn from_ts(ms: i64) -> Result<DateTime<Utc>> {
  DateTime::<Utc>::from_timestamp_millis(ms).ok_or_else(|| DomainError::Serialization(format!("timestamp inválido: {}", ms)))
}

fn from_ts_opt(ms: Option<i64>) -> Result<Option<DateTime<Utc>>> {
  ms.map(from_ts).transpose()
}

fn uuid(s: &str) -> Result<Uuid> {
  Uuid::parse_str(s).map_err(|e| DomainError::Serialization(format!("uuid inválido '{}': {}", s, e)))
}

fn uuid_opt(s: &Option<String>) -> Result<Option<Uuid>> {
  s.as_deref().map(uuid).transpose()
}

fn parse<T: FromStr<Err = DomainError>>(s: &str, column: &str) -> Result<T> {
  s.parse::<T>()
   .map_err(|e| DomainError::Serialization(format!("columna {}: {}", column, e)))
}

fn to_json<T: Serialize>(v: &T) -> Result<String> {
  Ok(serde_json::to_string(v)?)
}

fn from_json<T: DeserializeOwned>(s: &str) -> Result<T> {
  Ok(serde_json::from_str(s)?)
}

fn to_json_opt<T: Serialize>(v: &Option<T>) -> Result<Option<String>> {
  v.as_ref().map(to_json).transpose()
}

fn from_json_opt<T: DeserializeOwned>(s: &Option<String>) -> Result<Option<T>> {
  s.as_deref().map(from_json).transpose()
}

#[derive(Debug, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = schema::documents)]
#[diesel(treat_none_as_null = true)]
pub(crate) struct DocumentRow {
  pub id: String,
  pub code: String,
  pub title: String,
  pub description: Option<String>,
  pub current_version_id: Option<String>,
  pub status: String,
  pub security_level: String,
  pub document_type: String,
  pub tags: String,
  pub retention_years: Option<i32>,
  pub owner_id: String,
  pub is_archived: bool,
  pub is_deleted: bool,
  pub revision: i64,
  pub created_at_ts: i64,
  pub updated_at_ts: i64,
}

impl DocumentRow {
  pub fn from_domain(d: &Document) -> Result<Self> {
    Ok(Self { id: d.id.to_string(),
              code: d.code.clone(),
              title: d.title.clone(),
              description: d.description.clone(),
              current_version_id: d.current_version_id.map(|u| u.to_string()),
              status: d.status.to_string(),
              security_level: d.security_level.to_string(),
              document_type: d.document_type.to_string(),
              tags: to_json(&d.tags)?,
              retention_years: d.retention_years
                                .map(|y| {
                                  i32::try_from(y).map_err(|_| DomainError::Validation(format!("retención de {} años fuera de rango", y)))
                                })
                                .transpose()?,
              owner_id: d.owner_id.clone(),
              is_archived: d.is_archived,
              is_deleted: d.is_deleted,
              revision: d.revision,
              created_at_ts: ts(&d.created_at),
              updated_at_ts: ts(&d.updated_at) })
  }

  pub fn into_domain(self) -> Result<Document> {
    Ok(Document { id: uuid(&self.id)?,
                  code: self.code,
                  title: self.title,
                  description: self.description,
                  current_version_id: uuid_opt(&self.current_version_id)?,
                  status: parse(&self.status, "documents.status")?,
                  security_level: parse(&self.security_level, "documents.security_level")?,
                  document_type: parse(&self.document_type, "documents.document_type")?,
                  tags: from_json(&self.tags)?,
                  retention_years: self.retention_years
                                       .map(|y| {
                                         u32::try_from(y).map_err(|_| {
                                                           DomainError::Serialization(format!("documents.retention_years inválido: {}", y))
                                                         })
                                       })
                                       .transpose()?,
                  owner_id: self.owner_id,
                  is_archived: self.is_archived,
                  is_deleted: self.is_deleted,
                  revision: self.revision,
                  created_at: from_ts(self.created_at_ts)?,
                  updated_at: from_ts(self.updated_at_ts)? })
  }
}

#[derive(Debug, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = schema::document_versions)]
#[diesel(treat_none_as_null = true)]
pub(crate) struct VersionRow {
  pub id: String,
  pub document_id: String,
  pub sequence: i64,
  pub version_number: String,
  pub version_type: String,
  pub branch_name: String,
  pub parent_version_id: Option<String>,
  pub merge_source_version_id: Option<String>,
  pub superseded_by: Option<String>,
  pub content_ref: String,
  pub checksum: String,
  pub size_bytes: i64,
  pub change_summary: Option<String>,
  pub status: String,
  pub is_current_version: bool,
  pub is_archived: bool,
  pub archived_from: Option<String>,
  pub is_deleted: bool,
  pub signature: Option<String>,
  pub watermark: Option<String>,
  pub compression: Option<String>,
  pub approved_by: Option<String>,
  pub approved_at_ts: Option<i64>,
  pub retention_until_ts: Option<i64>,
  pub access_count: i64,
  pub last_accessed_at_ts: Option<i64>,
  pub download_count: i64,
  pub last_downloaded_at_ts: Option<i64>,
  pub created_by: String,
  pub created_at_ts: i64,
}

impl VersionRow {
  pub fn from_domain(v: &DocumentVersion) -> Result<Self> {
    Ok(Self { id: v.id.to_string(),
              document_id: v.document_id.to_string(),
              sequence: v.sequence,
              version_number: v.version_number.to_string(),
              version_type: v.version_type.to_string(),
              branch_name: v.branch_name.clone(),
              parent_version_id: v.parent_version_id.map(|u| u.to_string()),
              merge_source_version_id: v.merge_source_version_id.map(|u| u.to_string()),
              superseded_by: v.superseded_by.map(|u| u.to_string()),
              content_ref: v.content_ref.clone(),
              checksum: v.checksum.clone(),
              size_bytes: v.size_bytes as i64,
              change_summary: v.change_summary.clone(),
              status: v.status.to_string(),
              is_current_version: v.is_current_version,
              is_archived: v.is_archived,
              archived_from: v.archived_from.map(|s| s.to_string()),
              is_deleted: v.is_deleted,
              signature: to_json_opt(&v.signature)?,
              watermark: to_json_opt(&v.watermark)?,
              compression: to_json_opt(&v.compression)?,
              approved_by: v.approved_by.clone(),
              approved_at_ts: v.approved_at.as_ref().map(ts),
              retention_until_ts: v.retention_until.as_ref().map(ts),
              access_count: v.access_count,
              last_accessed_at_ts: v.last_accessed_at.as_ref().map(ts),
              download_count: v.download_count,
              last_downloaded_at_ts: v.last_downloaded_at.as_ref().map(ts),
              created_by: v.created_by.clone(),
              created_at_ts: ts(&v.created_at) })
  }

  pub fn into_domain(self) -> Result<DocumentVersion> {
    Ok(DocumentVersion { id: uuid(&self.id)?,
                         document_id: uuid(&self.document_id)?,
                         sequence: self.sequence,
                         version_number: parse(&self.version_number, "document_versions.version_number")?,
                         version_type: parse(&self.version_type, "document_versions.version_type")?,
                         branch_name: self.branch_name,
                         parent_version_id: uuid_opt(&self.parent_version_id)?,
                         merge_source_version_id: uuid_opt(&self.merge_source_version_id)?,
                         superseded_by: uuid_opt(&self.superseded_by)?,
                         content_ref: self.content_ref,
                         checksum: self.checksum,
                         size_bytes: self.size_bytes.max(0) as u64,
                         change_summary: self.change_summary,
                         status: parse(&self.status, "document_versions.status")?,
                         is_current_version: self.is_current_version,
                         is_archived: self.is_archived,
                         archived_from: self.archived_from
                                            .as_deref()
                                            .map(|s| parse(s, "document_versions.archived_from"))
                                            .transpose()?,
                         is_deleted: self.is_deleted,
                         signature: from_json_opt(&self.signature)?,
                         watermark: from_json_opt(&self.watermark)?,
                         compression: from_json_opt(&self.compression)?,
                         approved_by: self.approved_by,
                         approved_at: from_ts_opt(self.approved_at_ts)?,
                         retention_until: from_ts_opt(self.retention_until_ts)?,
                         access_count: self.access_count,
                         last_accessed_at: from_ts_opt(self.last_accessed_at_ts)?,
                         download_count: self.download_count,
                         last_downloaded_at: from_ts_opt(self.last_downloaded_at_ts)?,
                         created_by: self.created_by,
                         created_at: from_ts(self.created_at_ts)? })
  }
}

#[derive(Debug, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = schema::workflow_templates)]
#[diesel(treat_none_as_null = true)]
pub(crate) struct TemplateRow {
  pub id: String,
  pub name: String,
  pub description: Option<String>,
  pub document_types: String,
  pub steps: String,
  pub is_active: bool,
  pub created_at_ts: i64,
  pub updated_at_ts: i64,
}

impl TemplateRow {
  pub fn from_domain(t: &WorkflowTemplate) -> Result<Self> {
    Ok(Self { id: t.id.to_string(),
              name: t.name.clone(),
              description: t.description.clone(),
              document_types: to_json(&t.document_types)?,
              steps: to_json(&t.steps)?,
              is_active: t.is_active,
              created_at_ts: ts(&t.created_at),
              updated_at_ts: ts(&t.updated_at) })
  }

  pub fn into_domain(self) -> Result<WorkflowTemplate> {
    Ok(WorkflowTemplate { id: uuid(&self.id)?,
                          name: self.name,
                          description: self.description,
                          document_types: from_json(&self.document_types)?,
                          steps: from_json(&self.steps)?,
                          is_active: self.is_active,
                          created_at: from_ts(self.created_at_ts)?,
                          updated_at: from_ts(self.updated_at_ts)? })
  }
}

#[derive(Debug, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = schema::workflow_instances)]
#[diesel(treat_none_as_null = true)]
pub(crate) struct InstanceRow {
  pub id: String,
  pub template_id: String,
  pub document_id: String,
  pub version_id: String,
  pub current_step_index: i64,
  pub status: String,
  pub started_at_ts: i64,
  pub started_by: String,
  pub completed_at_ts: Option<i64>,
}

#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = schema::workflow_steps)]
pub(crate) struct StepRow {
  pub workflow_instance_id: String,
  pub step_index: i64,
  pub step_order: i64,
  pub step_name: String,
  pub approver_role: String,
  pub is_required: bool,
  pub applicable: bool,
  pub status: String,
  pub approver_id: Option<String>,
  pub decided_at_ts: Option<i64>,
  pub comments: Option<String>,
}

impl InstanceRow {
  pub fn from_domain(i: &WorkflowInstance) -> (Self, Vec<StepRow>) {
    let id = i.id.to_string();
    let steps = i.steps
                 .iter()
                 .enumerate()
                 .map(|(idx, s)| StepRow { workflow_instance_id: id.clone(),
                                           step_index: idx as i64,
                                           step_order: s.step_order as i64,
                                           step_name: s.name.clone(),
                                           approver_role: s.approver_role.clone(),
                                           is_required: s.is_required,
                                           applicable: s.applicable,
                                           status: s.status.to_string(),
                                           approver_id: s.approver_id.clone(),
                                           decided_at_ts: s.decided_at.as_ref().map(ts),
                                           comments: s.comments.clone() })
                 .collect();
    let row = Self { id,
                     template_id: i.template_id.to_string(),
                     document_id: i.document_id.to_string(),
                     version_id: i.version_id.to_string(),
                     current_step_index: i.current_step_index as i64,
                     status: i.status.to_string(),
                     started_at_ts: ts(&i.started_at),
                     started_by: i.started_by.clone(),
                     completed_at_ts: i.completed_at.as_ref().map(ts) };
    (row, steps)
  }

  /// `steps` debe venir ordenado por `step_index`.
  pub fn into_domain(self, steps: Vec<StepRow>) -> Result<WorkflowInstance> {
    let mut states = Vec::with_capacity(steps.len());
    for s in steps {
      states.push(StepState { step_order: s.step_order.max(0) as u32,
                              name: s.step_name,
                              approver_role: s.approver_role,
                              is_required: s.is_required,
                              applicable: s.applicable,
                              status: parse(&s.status, "workflow_steps.status")?,
                              approver_id: s.approver_id,
                              decided_at: from_ts_opt(s.decided_at_ts)?,
                              comments: s.comments });
    }
    Ok(WorkflowInstance { id: uuid(&self.id)?,
                          template_id: uuid(&self.template_id)?,
                          document_id: uuid(&self.document_id)?,
                          version_id: uuid(&self.version_id)?,
                          current_step_index: self.current_step_index.max(0) as usize,
                          status: parse(&self.status, "workflow_instances.status")?,
                          started_at: from_ts(self.started_at_ts)?,
                          started_by: self.started_by,
                          completed_at: from_ts_opt(self.completed_at_ts)?,
                          steps: states })
  }
}

#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = schema::approvals)]
pub(crate) struct ApprovalRow {
  pub id: String,
  pub workflow_instance_id: String,
  pub step_index: i64,
  pub decision: String,
  pub approver_id: String,
  pub comments: Option<String>,
  pub timestamp_ts: i64,
  pub sequence: i64,
  pub prev_hash: String,
  pub entry_hash: String,
}

impl ApprovalRow {
  pub fn from_domain(a: &Approval) -> Self {
    Self { id: a.id.to_string(),
           workflow_instance_id: a.workflow_instance_id.to_string(),
           step_index: a.step_index as i64,
           decision: a.decision.to_string(),
           approver_id: a.approver_id.clone(),
           comments: a.comments.clone(),
           timestamp_ts: ts(&a.timestamp),
           sequence: a.sequence,
           prev_hash: a.prev_hash.clone(),
           entry_hash: a.entry_hash.clone() }
  }

  pub fn into_domain(self) -> Result<Approval> {
    Ok(Approval { id: uuid(&self.id)?,
                  workflow_instance_id: uuid(&self.workflow_instance_id)?,
                  step_index: self.step_index.max(0) as usize,
                  decision: parse(&self.decision, "approvals.decision")?,
                  approver_id: self.approver_id,
                  comments: self.comments,
                  timestamp: from_ts(self.timestamp_ts)?,
                  sequence: self.sequence,
                  prev_hash: self.prev_hash,
                  entry_hash: self.entry_hash })
  }
}

#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = schema::contents)]
pub(crate) struct ContentRow {
  pub content_ref: String,
  pub checksum: String,
  pub size_bytes: i64,
  pub data: String,
  pub tombstoned: bool,
  pub created_at_ts: i64,
}
