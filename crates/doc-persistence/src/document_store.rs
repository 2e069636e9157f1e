use crate::pool::{build_pool, get_conn, DbConn, DbPool};
use crate::rows::{ApprovalRow, DocumentRow, InstanceRow, StepRow, TemplateRow, VersionRow};
use crate::schema::{approvals, document_versions, documents, workflow_instances, workflow_steps, workflow_templates};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use doc_domain::{Approval, Document, DocumentVersion, DomainError, WorkflowInstance, WorkflowTemplate};
use docstore::{DocumentStore, PersistResult, Result, StoreTx};
use std::sync::Arc;
use uuid::Uuid;

/// Store Diesel que implementa `DocumentStore`.
#[derive(Clone)]
pub struct DieselDocumentStore {
  pool: Arc<DbPool>,
}

impl DieselDocumentStore {
  pub fn new(database_url: &str) -> Result<Self> {
    Ok(Self::from_pool(Arc::new(build_pool(database_url, 8)?)))
  }

  pub fn from_pool(pool: Arc<DbPool>) -> Self {
    Self { pool }
  }

  pub fn pool(&self) -> Arc<DbPool> {
    self.pool.clone()
  }
}

/// Error interno de la transacción Diesel: o falla la base de datos o falla
/// la lógica de dominio que corre dentro.
enum TxError {
  Db(DieselError),
  Domain(DomainError),
}

impl From<DieselError> for TxError {
  fn from(e: DieselError) -> Self {
    TxError::Db(e)
  }
}

fn db_err(e: DieselError) -> DomainError {
  DomainError::Storage(format!("db: {}", e))
}

impl DocumentStore for DieselDocumentStore {
  fn transaction(&self, work: &mut dyn FnMut(&mut dyn StoreTx) -> Result<()>) -> Result<()> {
    let mut pooled = get_conn(&self.pool)?;
    let conn: &mut DbConn = &mut pooled;
    let body = |c: &mut DbConn| -> std::result::Result<(), TxError> {
      let mut tx = DieselTx { conn: c };
      work(&mut tx).map_err(TxError::Domain)
    };
    // En SQLite se toma el lock de escritura al empezar para evitar
    // deadlocks al promocionar un lock de lectura.
    #[cfg(not(feature = "pg"))]
    let res = conn.immediate_transaction(body);
    #[cfg(feature = "pg")]
    let res = conn.transaction(body);
    match res {
      Ok(()) => Ok(()),
      Err(TxError::Domain(e)) => Err(e),
      Err(TxError::Db(e)) => Err(db_err(e)),
    }
  }
}

struct DieselTx<'a> {
  conn: &'a mut DbConn,
}

impl DieselTx<'_> {
  fn load_steps(&mut self, instance_id: &str) -> Result<Vec<StepRow>> {
    workflow_steps::table.filter(workflow_steps::workflow_instance_id.eq(instance_id))
                         .order(workflow_steps::step_index.asc())
                         .load::<StepRow>(self.conn)
                         .map_err(db_err)
  }

  fn write_steps(&mut self, instance_id: &str, steps: &[StepRow]) -> Result<()> {
    diesel::delete(workflow_steps::table.filter(workflow_steps::workflow_instance_id.eq(instance_id))).execute(self.conn)
                                                                                                    .map_err(db_err)?;
    diesel::insert_into(workflow_steps::table).values(steps)
                                              .execute(self.conn)
                                              .map_err(db_err)?;
    Ok(())
  }
}

impl StoreTx for DieselTx<'_> {
  fn get_document(&mut self, id: &Uuid) -> Result<Option<Document>> {
    documents::table.find(id.to_string())
                    .first::<DocumentRow>(self.conn)
                    .optional()
                    .map_err(db_err)?
                    .map(DocumentRow::into_domain)
                    .transpose()
  }

  fn list_documents(&mut self) -> Result<Vec<Document>> {
    documents::table.order((documents::created_at_ts.asc(), documents::code.asc()))
                    .load::<DocumentRow>(self.conn)
                    .map_err(db_err)?
                    .into_iter()
                    .map(DocumentRow::into_domain)
                    .collect()
  }

  fn insert_document(&mut self, doc: &Document) -> Result<()> {
    let row = DocumentRow::from_domain(doc)?;
    match diesel::insert_into(documents::table).values(&row).execute(self.conn) {
      Ok(_) => Ok(()),
      Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
        Err(DomainError::Validation(format!("código de documento ya usado: {}", doc.code)))
      }
      Err(e) => Err(db_err(e)),
    }
  }

  fn update_document(&mut self, doc: &Document, expected_revision: i64) -> Result<PersistResult> {
    let id = doc.id.to_string();
    let mut row = DocumentRow::from_domain(doc)?;
    row.revision = expected_revision + 1;
    let updated = diesel::update(documents::table.filter(documents::id.eq(&id))
                                                 .filter(documents::revision.eq(expected_revision))).set(&row)
                                                                                                     .execute(self.conn)
                                                                                                     .map_err(db_err)?;
    if updated == 1 {
      return Ok(PersistResult::Ok { new_revision: expected_revision + 1 });
    }
    let actual = documents::table.find(&id)
                                 .select(documents::revision)
                                 .first::<i64>(self.conn)
                                 .optional()
                                 .map_err(db_err)?;
    match actual {
      Some(actual) => Ok(PersistResult::Conflict { expected: expected_revision, actual }),
      None => Err(DomainError::DocumentNotFound(doc.id)),
    }
  }

  fn get_version(&mut self, id: &Uuid) -> Result<Option<DocumentVersion>> {
    document_versions::table.find(id.to_string())
                            .first::<VersionRow>(self.conn)
                            .optional()
                            .map_err(db_err)?
                            .map(VersionRow::into_domain)
                            .transpose()
  }

  fn list_versions(&mut self, document_id: &Uuid) -> Result<Vec<DocumentVersion>> {
    document_versions::table.filter(document_versions::document_id.eq(document_id.to_string()))
                            .order(document_versions::sequence.asc())
                            .load::<VersionRow>(self.conn)
                            .map_err(db_err)?
                            .into_iter()
                            .map(VersionRow::into_domain)
                            .collect()
  }

  fn list_all_versions(&mut self) -> Result<Vec<DocumentVersion>> {
    document_versions::table.order((document_versions::created_at_ts.asc(), document_versions::sequence.asc()))
                            .load::<VersionRow>(self.conn)
                            .map_err(db_err)?
                            .into_iter()
                            .map(VersionRow::into_domain)
                            .collect()
  }

  fn insert_version(&mut self, version: &DocumentVersion) -> Result<()> {
    let row = VersionRow::from_domain(version)?;
    match diesel::insert_into(document_versions::table).values(&row).execute(self.conn) {
      Ok(_) => Ok(()),
      // (document_id, sequence) único: otra escritura se adelantó.
      Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
        Err(DomainError::VersionConflict(format!("secuencia {} ya usada en el documento {}",
                                                 version.sequence, version.document_id)))
      }
      Err(e) => Err(db_err(e)),
    }
  }

  fn update_version(&mut self, version: &DocumentVersion) -> Result<()> {
    let row = VersionRow::from_domain(version)?;
    let n = diesel::update(document_versions::table.find(version.id.to_string())).set(&row)
                                                                               .execute(self.conn)
                                                                               .map_err(db_err)?;
    if n == 0 {
      return Err(DomainError::VersionNotFound(version.id));
    }
    Ok(())
  }

  fn get_template(&mut self, id: &Uuid) -> Result<Option<WorkflowTemplate>> {
    workflow_templates::table.find(id.to_string())
                             .first::<TemplateRow>(self.conn)
                             .optional()
                             .map_err(db_err)?
                             .map(TemplateRow::into_domain)
                             .transpose()
  }

  fn list_templates(&mut self) -> Result<Vec<WorkflowTemplate>> {
    workflow_templates::table.order((workflow_templates::created_at_ts.asc(), workflow_templates::name.asc()))
                             .load::<TemplateRow>(self.conn)
                             .map_err(db_err)?
                             .into_iter()
                             .map(TemplateRow::into_domain)
                             .collect()
  }

  fn insert_template(&mut self, template: &WorkflowTemplate) -> Result<()> {
    let row = TemplateRow::from_domain(template)?;
    diesel::insert_into(workflow_templates::table).values(&row)
                                                  .execute(self.conn)
                                                  .map_err(db_err)?;
    Ok(())
  }

  fn update_template(&mut self, template: &WorkflowTemplate) -> Result<()> {
    let row = TemplateRow::from_domain(template)?;
    let n = diesel::update(workflow_templates::table.find(template.id.to_string())).set(&row)
                                                                                 .execute(self.conn)
                                                                                 .map_err(db_err)?;
    if n == 0 {
      return Err(DomainError::TemplateNotFound(template.id));
    }
    Ok(())
  }

  fn get_instance(&mut self, id: &Uuid) -> Result<Option<WorkflowInstance>> {
    let id_s = id.to_string();
    let row = workflow_instances::table.find(&id_s)
                                       .first::<InstanceRow>(self.conn)
                                       .optional()
                                       .map_err(db_err)?;
    match row {
      Some(r) => {
        let steps = self.load_steps(&id_s)?;
        Ok(Some(r.into_domain(steps)?))
      }
      None => Ok(None),
    }
  }

  fn list_instances(&mut self) -> Result<Vec<WorkflowInstance>> {
    let rows = workflow_instances::table.order(workflow_instances::started_at_ts.asc())
                                        .load::<InstanceRow>(self.conn)
                                        .map_err(db_err)?;
    let mut out = Vec::with_capacity(rows.len());
    for r in rows {
      let steps = self.load_steps(&r.id)?;
      out.push(r.into_domain(steps)?);
    }
    Ok(out)
  }

  fn insert_instance(&mut self, instance: &WorkflowInstance) -> Result<()> {
    let (row, steps) = InstanceRow::from_domain(instance);
    diesel::insert_into(workflow_instances::table).values(&row)
                                                  .execute(self.conn)
                                                  .map_err(db_err)?;
    self.write_steps(&row.id, &steps)
  }

  fn update_instance(&mut self, instance: &WorkflowInstance) -> Result<()> {
    let (row, steps) = InstanceRow::from_domain(instance);
    let n = diesel::update(workflow_instances::table.find(&row.id)).set(&row)
                                                                  .execute(self.conn)
                                                                  .map_err(db_err)?;
    if n == 0 {
      return Err(DomainError::InstanceNotFound(instance.id));
    }
    self.write_steps(&row.id, &steps)
  }

  fn append_approval(&mut self, approval: &Approval) -> Result<()> {
    let row = ApprovalRow::from_domain(approval);
    match diesel::insert_into(approvals::table).values(&row).execute(self.conn) {
      Ok(_) => Ok(()),
      Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
        Err(DomainError::DuplicateDecision { instance_id: approval.workflow_instance_id,
                                             step_index: approval.step_index })
      }
      Err(e) => Err(db_err(e)),
    }
  }

  fn list_approvals(&mut self, instance_id: &Uuid) -> Result<Vec<Approval>> {
    approvals::table.filter(approvals::workflow_instance_id.eq(instance_id.to_string()))
                    .order(approvals::sequence.asc())
                    .load::<ApprovalRow>(self.conn)
                    .map_err(db_err)?
                    .into_iter()
                    .map(ApprovalRow::into_domain)
                    .collect()
  }

  fn count_approvals(&mut self) -> Result<usize> {
    let n = approvals::table.count().get_result::<i64>(self.conn).map_err(db_err)?;
    Ok(n.max(0) as usize)
  }
}
