// Workflow Engine: plantillas, instanciación y avance por pasos.
//
// `advance` es "añadir al ledger y plegar" dentro de una única transacción:
// leer instancia y ledger, validar, registrar la decisión, aplicar el fold y
// actualizar instancia, versión y documento. Los eventos se publican sólo
// después del commit.
use crate::config::EngineConfig;
use crate::events::{WorkflowEvent, WorkflowEventBus};
use crate::fold::{self, Transition};
use crate::ledger::{ApprovalLedger, ChainVerification};
use crate::roles::RoleDirectory;
use crate::statistics::WorkflowStatistics;
use crate::versions::{self, load_document, load_version};
use chrono::Utc;
use doc_domain::{Approval, Decision, DocumentType, DomainError, StepAction, VersionStatus, VersionType, WorkflowInstance,
                 WorkflowTemplate};
use docstore::{in_transaction, DocumentStore, Result, StoreTx};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use uuid::Uuid;

fn load_template(tx: &mut dyn StoreTx, id: &Uuid) -> Result<WorkflowTemplate> {
  tx.get_template(id)?.ok_or(DomainError::TemplateNotFound(*id))
}

fn load_instance(tx: &mut dyn StoreTx, id: &Uuid) -> Result<WorkflowInstance> {
  tx.get_instance(id)?.ok_or(DomainError::InstanceNotFound(*id))
}

fn role_of(instance: &WorkflowInstance, step_index: usize) -> Option<String> {
  instance.steps.get(step_index).map(|s| s.approver_role.clone())
}

#[derive(Clone)]
pub struct WorkflowEngine {
  store: Arc<dyn DocumentStore>,
  roles: Arc<dyn RoleDirectory>,
  events: Arc<WorkflowEventBus>,
  config: EngineConfig,
}

impl WorkflowEngine {
  pub fn new(store: Arc<dyn DocumentStore>,
             roles: Arc<dyn RoleDirectory>,
             events: Arc<WorkflowEventBus>,
             config: EngineConfig)
             -> Self {
    Self { store, roles, events, config }
  }

  pub fn events(&self) -> &Arc<WorkflowEventBus> {
    &self.events
  }

  pub fn register_template(&self, template: WorkflowTemplate) -> Result<WorkflowTemplate> {
    let mut template = template;
    template.normalize()?;
    in_transaction(self.store.as_ref(), |tx: &mut dyn StoreTx| tx.insert_template(&template))?;
    log::info!("plantilla '{}' registrada con {} pasos", template.name, template.steps.len());
    Ok(template)
  }

  /// Sustituye la definición de una plantilla. Falla mientras alguna
  /// instancia activa la referencie; las terminadas conservan sus pasos.
  pub fn update_template(&self, template: WorkflowTemplate) -> Result<WorkflowTemplate> {
    let mut template = template;
    template.normalize()?;
    in_transaction(self.store.as_ref(), |tx: &mut dyn StoreTx| {
      let stored = load_template(tx, &template.id)?;
      let in_use = tx.list_instances()?
                     .iter()
                     .any(|i| i.template_id == template.id && i.is_active());
      if in_use {
        return Err(DomainError::InvalidTransition(format!("la plantilla '{}' tiene instancias activas", stored.name)));
      }
      let mut updated = template.clone();
      updated.created_at = stored.created_at;
      updated.updated_at = Utc::now();
      tx.update_template(&updated)?;
      Ok(updated)
    })
  }

  pub fn deactivate_template(&self, template_id: Uuid) -> Result<WorkflowTemplate> {
    in_transaction(self.store.as_ref(), |tx: &mut dyn StoreTx| {
      let mut t = load_template(tx, &template_id)?;
      t.is_active = false;
      t.updated_at = Utc::now();
      tx.update_template(&t)?;
      Ok(t)
    })
  }

  pub fn get_template(&self, template_id: Uuid) -> Result<WorkflowTemplate> {
    in_transaction(self.store.as_ref(), |tx: &mut dyn StoreTx| load_template(tx, &template_id))
  }

  pub fn list_templates(&self) -> Result<Vec<WorkflowTemplate>> {
    in_transaction(self.store.as_ref(), |tx: &mut dyn StoreTx| tx.list_templates())
  }

  /// Plantillas activas que aplican a un tipo de documento.
  pub fn templates_for(&self, document_type: DocumentType) -> Result<Vec<WorkflowTemplate>> {
    Ok(self.list_templates()?
           .into_iter()
           .filter(|t| t.is_active && t.applies_to(document_type))
           .collect())
  }

  pub fn instantiate(&self,
                     template_id: Uuid,
                     document_id: Uuid,
                     version_id: Uuid,
                     started_by: &str)
                     -> Result<WorkflowInstance> {
    let (instance, role) = in_transaction(self.store.as_ref(), |tx: &mut dyn StoreTx| {
                             let template = load_template(tx, &template_id)?;
                             if !template.is_active {
                               return Err(DomainError::InvalidTransition(format!("la plantilla '{}' está desactivada",
                                                                                 template.name)));
                             }
                             let doc = load_document(tx, &document_id)?;
                             versions::ensure_document_writable(&doc)?;
                             if !template.applies_to(doc.document_type) {
                               return Err(DomainError::WorkflowTemplateMismatch { template_id,
                                                                                  document_type: doc.document_type });
                             }
                             let version = load_version(tx, &version_id)?;
                             if version.document_id != doc.id {
                               return Err(DomainError::Validation(format!("la versión {} no pertenece al documento {}",
                                                                          version_id, doc.code)));
                             }
                             if version.version_type == VersionType::Draft {
                               return Err(DomainError::InvalidTransition(format!("la versión {} es un borrador de trabajo; guárdela como MAJOR, MINOR o PATCH antes de enviarla",
                                                                                 version.id)));
                             }
                             if !version.is_live() || version.status != VersionStatus::Draft {
                               return Err(DomainError::InvalidTransition(format!("la versión {} no es un borrador enviable ({})",
                                                                                 version.version_number, version.status)));
                             }
                             let busy = tx.list_instances()?
                                          .iter()
                                          .any(|i| i.version_id == version_id && i.is_active());
                             if busy {
                               return Err(DomainError::InvalidTransition(format!("la versión {} ya tiene un workflow activo",
                                                                                 version.version_number)));
                             }
                             let instance = fold::start(&template, &doc, version_id, started_by, Utc::now())?;
                             tx.insert_instance(&instance)?;
                             versions::set_status(tx, &version_id, VersionStatus::PendingApproval)?;
                             let role = role_of(&instance, instance.current_step_index);
                             Ok((instance, role))
                           })?;
    log::info!("workflow {} iniciado sobre la versión {} (paso {})",
               instance.id,
               version_id,
               instance.current_step_index);
    self.events.publish(WorkflowEvent::InstanceStarted { instance_id: instance.id,
                                                         version_id,
                                                         current_step_index: instance.current_step_index });
    if let Some(approver_role) = role {
      self.events.publish(WorkflowEvent::StepActivated { instance_id: instance.id,
                                                         step_index: instance.current_step_index,
                                                         approver_role });
    }
    Ok(instance)
  }

  /// Registra una decisión sobre el paso actual. Los fallos transitorios del
  /// store se reintentan; el resto se devuelve tal cual y la transacción se
  /// descarta.
  pub fn advance(&self,
                 instance_id: Uuid,
                 step_index: usize,
                 decision: Decision,
                 approver_id: &str,
                 comments: Option<&str>)
                 -> Result<WorkflowInstance> {
    let (instance, events) = self.config.retry.run("workflow.advance", || {
                                                 in_transaction(self.store.as_ref(), |tx: &mut dyn StoreTx| {
                                                   self.advance_in_tx(tx, instance_id, step_index, decision, approver_id, comments)
                                                 })
                                               })?;
    log::info!("workflow {}: paso {} {} por {} -> {}",
               instance_id,
               step_index,
               decision,
               approver_id,
               instance.status);
    for e in events {
      self.events.publish(e);
    }
    if instance.is_terminal() {
      self.events.close(&instance_id);
    }
    Ok(instance)
  }

  fn advance_in_tx(&self,
                   tx: &mut dyn StoreTx,
                   instance_id: Uuid,
                   step_index: usize,
                   decision: Decision,
                   approver_id: &str,
                   comments: Option<&str>)
                   -> Result<(WorkflowInstance, Vec<WorkflowEvent>)> {
    let mut instance = load_instance(tx, &instance_id)?;
    let template = load_template(tx, &instance.template_id)?;
    fold::check_decidable(&instance, step_index)?;
    if tx.list_approvals(&instance_id)?.iter().any(|a| a.step_index == step_index) {
      return Err(DomainError::DuplicateDecision { instance_id, step_index });
    }
    let required_role = instance.steps[step_index].approver_role.clone();
    let authorized = self.roles.has_role(approver_id, &required_role)
                     || (decision == Decision::Cancel && approver_id == instance.started_by);
    if !authorized {
      return Err(DomainError::UnauthorizedApprover { approver_id: approver_id.to_string(),
                                                     required_role });
    }
    let actions = fold::step_definition(&template, &instance.steps[step_index])?.actions.clone();

    let approval: Approval = ApprovalLedger::record(tx, instance_id, step_index, decision, approver_id, comments)?;
    let transition = fold::apply(&mut instance, &approval)?;
    tx.update_instance(&instance)?;

    let mut events = vec![WorkflowEvent::StepDecided { instance_id,
                                                       step_index,
                                                       decision,
                                                       approver_id: approver_id.to_string() }];
    if decision == Decision::Approve {
      for action in &actions {
        match action {
          StepAction::NotifyRole { role, message } => events.push(WorkflowEvent::RoleNotified { instance_id,
                                                                                               role: role.clone(),
                                                                                               message: message.clone() }),
          StepAction::ApplyWatermark { text } => {
            versions::watermark(tx, &instance.version_id, text)?;
          }
        }
      }
    }

    let version_id = instance.version_id;
    match transition {
      Transition::Advanced { next_step } => {
        if let Some(approver_role) = role_of(&instance, next_step) {
          events.push(WorkflowEvent::StepActivated { instance_id,
                                                     step_index: next_step,
                                                     approver_role });
        }
      }
      Transition::Completed => {
        versions::promote(tx, &version_id, approver_id, approval.timestamp)?;
        events.push(WorkflowEvent::InstanceCompleted { instance_id, version_id });
      }
      Transition::Rejected => {
        versions::set_status(tx, &version_id, VersionStatus::Rejected)?;
        events.push(WorkflowEvent::InstanceRejected { instance_id, version_id });
      }
      Transition::Cancelled => {
        versions::set_status(tx, &version_id, VersionStatus::Draft)?;
        events.push(WorkflowEvent::InstanceCancelled { instance_id, version_id });
      }
    }
    Ok((instance, events))
  }

  /// Instancia reconstruida desde el ledger.
  pub fn get_instance(&self, instance_id: Uuid) -> Result<WorkflowInstance> {
    let (stored, ledger) = in_transaction(self.store.as_ref(), |tx: &mut dyn StoreTx| {
                             let stored = load_instance(tx, &instance_id)?;
                             let ledger = tx.list_approvals(&instance_id)?;
                             Ok((stored, ledger))
                           })?;
    let folded = fold::refold(&stored, &ledger)?;
    if folded != stored {
      log::warn!("workflow {}: el estado guardado difiere del ledger; se usa el plegado", instance_id);
    }
    Ok(folded)
  }

  pub fn active_instance_for_version(&self, version_id: Uuid) -> Result<Option<WorkflowInstance>> {
    Ok(self.list_instances()?
           .into_iter()
           .find(|i| i.version_id == version_id && i.is_active()))
  }

  pub fn list_instances(&self) -> Result<Vec<WorkflowInstance>> {
    in_transaction(self.store.as_ref(), |tx: &mut dyn StoreTx| tx.list_instances())
  }

  pub fn instances_for_document(&self, document_id: Uuid) -> Result<Vec<WorkflowInstance>> {
    Ok(self.list_instances()?
           .into_iter()
           .filter(|i| i.document_id == document_id)
           .collect())
  }

  pub fn ledger(&self, instance_id: Uuid) -> Result<Vec<Approval>> {
    ApprovalLedger::entries(self.store.as_ref(), &instance_id)
  }

  pub fn verify_chain(&self, instance_id: Uuid) -> Result<ChainVerification> {
    ApprovalLedger::verify_chain(self.store.as_ref(), &instance_id)
  }

  pub fn subscribe(&self, instance_id: Uuid) -> Receiver<WorkflowEvent> {
    self.events.subscribe(instance_id)
  }

  pub fn statistics(&self) -> Result<WorkflowStatistics> {
    let (instances, templates, ledger_entries) = in_transaction(self.store.as_ref(), |tx: &mut dyn StoreTx| {
                                                   Ok((tx.list_instances()?, tx.list_templates()?, tx.count_approvals()?))
                                                 })?;
    Ok(WorkflowStatistics::compute(&instances, &templates, ledger_entries))
  }
}
