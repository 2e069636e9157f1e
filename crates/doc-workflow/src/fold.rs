// Máquina de estados del workflow como fold determinista sobre el ledger.
//
// `start` construye la instancia inicial (aplicabilidad evaluada una sola
// vez, pasos copiados de la plantilla), `apply` aplica una decisión y
// `refold` reconstruye el estado desde cero a partir de los pasos guardados
// en la instancia y el ledger. La plantilla sólo interviene en `start`.
use chrono::{DateTime, Utc};
use doc_domain::{Approval, Decision, Document, DomainError, InstanceStatus, StepDefinition, StepState, StepStatus,
                 WorkflowInstance, WorkflowTemplate};
use uuid::Uuid;

/// Efecto de aplicar una decisión.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
  /// La instancia sigue en el paso indicado.
  Advanced { next_step: usize },
  Completed,
  Rejected,
  Cancelled,
}

/// Definición de la plantilla que corresponde a un paso de la instancia.
pub fn step_definition<'t>(template: &'t WorkflowTemplate, step: &StepState) -> Result<&'t StepDefinition, DomainError> {
  template.steps
          .iter()
          .find(|d| d.order == step.step_order)
          .ok_or_else(|| {
            DomainError::Validation(format!("la plantilla {} no define el paso con orden {}", template.id, step.step_order))
          })
}

pub fn initial_steps(template: &WorkflowTemplate, document: &Document) -> Vec<StepState> {
  template.steps
          .iter()
          .map(|d| StepState::from_definition(d, d.condition.evaluate(document)))
          .collect()
}

fn first_applicable(steps: &[StepState]) -> Option<usize> {
  steps.iter().position(|s| s.applicable)
}

/// Instancia nueva en estado PENDING sobre el primer paso aplicable.
pub fn start(template: &WorkflowTemplate,
             document: &Document,
             version_id: Uuid,
             started_by: &str,
             started_at: DateTime<Utc>)
             -> Result<WorkflowInstance, DomainError> {
  let steps = initial_steps(template, document);
  let first = first_applicable(&steps).ok_or_else(|| {
                                        DomainError::Validation(format!("ningún paso de la plantilla '{}' aplica al documento {}",
                                                                        template.name, document.code))
                                      })?;
  Ok(WorkflowInstance { id: Uuid::new_v4(),
                        template_id: template.id,
                        document_id: document.id,
                        version_id,
                        current_step_index: first,
                        status: InstanceStatus::Pending,
                        started_at,
                        started_by: started_by.to_string(),
                        completed_at: None,
                        steps })
}

/// Comprueba que una decisión puede aplicarse al paso indicado.
pub fn check_decidable(instance: &WorkflowInstance, step_index: usize) -> Result<(), DomainError> {
  if instance.is_terminal() {
    return Err(DomainError::InvalidTransition(format!("la instancia {} ya terminó ({})", instance.id, instance.status)));
  }
  if step_index != instance.current_step_index {
    return Err(DomainError::InvalidTransition(format!("el paso actual de la instancia {} es {}, no {}",
                                                      instance.id, instance.current_step_index, step_index)));
  }
  if step_index >= instance.steps.len() {
    return Err(DomainError::InvalidTransition(format!("paso {} fuera de rango", step_index)));
  }
  Ok(())
}

/// Aplica una entrada del ledger a la instancia.
pub fn apply(instance: &mut WorkflowInstance, approval: &Approval) -> Result<Transition, DomainError> {
  check_decidable(instance, approval.step_index)?;
  let idx = approval.step_index;
  let is_required = instance.steps[idx].is_required;
  match approval.decision {
    Decision::Approve => {
      decide_step(&mut instance.steps[idx], approval, StepStatus::Completed);
      continue_after(instance, idx, is_required, approval.timestamp)
    }
    Decision::Reject if is_required => {
      decide_step(&mut instance.steps[idx], approval, StepStatus::Rejected);
      instance.status = InstanceStatus::Rejected;
      instance.completed_at = Some(approval.timestamp);
      Ok(Transition::Rejected)
    }
    Decision::Reject => {
      decide_step(&mut instance.steps[idx], approval, StepStatus::Rejected);
      continue_after(instance, idx, false, approval.timestamp)
    }
    Decision::Cancel => {
      // La cancelación no decide el paso actual: sólo lo salta.
      for s in instance.steps.iter_mut() {
        if matches!(s.status, StepStatus::Pending | StepStatus::InProgress) {
          s.status = StepStatus::Skipped;
        }
      }
      instance.status = InstanceStatus::Cancelled;
      instance.completed_at = Some(approval.timestamp);
      Ok(Transition::Cancelled)
    }
  }
}

fn decide_step(step: &mut StepState, approval: &Approval, status: StepStatus) {
  step.status = status;
  step.approver_id = Some(approval.approver_id.clone());
  step.decided_at = Some(approval.timestamp);
  step.comments = approval.comments.clone();
}

fn continue_after(instance: &mut WorkflowInstance, idx: usize, was_required: bool, at: DateTime<Utc>) -> Result<Transition, DomainError> {
  let mut next = None;
  let mut required_remaining = false;
  for j in idx + 1..instance.steps.len() {
    if !instance.steps[j].applicable {
      continue;
    }
    if next.is_none() {
      next = Some(j);
    }
    if instance.steps[j].is_required {
      required_remaining = true;
    }
  }
  let completes = !required_remaining && (was_required || next.is_none());
  match next {
    Some(n) if !completes => {
      instance.current_step_index = n;
      instance.steps[n].status = StepStatus::InProgress;
      instance.status = InstanceStatus::InProgress;
      Ok(Transition::Advanced { next_step: n })
    }
    _ => {
      for s in instance.steps[idx + 1..].iter_mut() {
        if s.status == StepStatus::Pending {
          s.status = StepStatus::Skipped;
        }
      }
      instance.current_step_index = instance.steps.len();
      instance.status = InstanceStatus::Completed;
      instance.completed_at = Some(at);
      Ok(Transition::Completed)
    }
  }
}

/// Reconstruye la instancia desde el ledger. Parte de los pasos guardados en
/// `instance`, no vuelve a evaluar condiciones ni a leer la plantilla.
pub fn refold(instance: &WorkflowInstance, ledger: &[Approval]) -> Result<WorkflowInstance, DomainError> {
  let mut out = instance.clone();
  for s in out.steps.iter_mut() {
    s.status = if s.applicable { StepStatus::Pending } else { StepStatus::Skipped };
    s.approver_id = None;
    s.decided_at = None;
    s.comments = None;
  }
  out.current_step_index = first_applicable(&out.steps).unwrap_or(out.steps.len());
  out.status = InstanceStatus::Pending;
  out.completed_at = None;
  for a in ledger {
    apply(&mut out, a)?;
  }
  Ok(out)
}

#[cfg(test)]
mod tests {
  use super::*;
  use doc_domain::{DocumentType, SecurityLevel, StepCondition};

  fn template(steps: Vec<StepDefinition>) -> WorkflowTemplate {
    WorkflowTemplate::new("t", vec![DocumentType::Contract], steps).unwrap()
  }

  fn document() -> Document {
    Document::new("C-1", "Contrato", DocumentType::Contract, SecurityLevel::Internal, "owner").unwrap()
  }

  fn decision(instance: &WorkflowInstance, step: usize, d: Decision) -> Approval {
    Approval { id: Uuid::new_v4(),
               workflow_instance_id: instance.id,
               step_index: step,
               decision: d,
               approver_id: "u".into(),
               comments: None,
               timestamp: Utc::now(),
               sequence: 0,
               prev_hash: String::new(),
               entry_hash: String::new() }
  }

  #[test]
  fn condition_skipped_first_step_is_never_current() {
    let t = template(vec![StepDefinition::new(1, "Seguridad", "sec", true).with_condition(StepCondition::SecurityLevelAtLeast { level: SecurityLevel::Secret }),
                          StepDefinition::new(2, "Manager", "manager", true)]);
    let inst = start(&t, &document(), Uuid::new_v4(), "u", Utc::now()).unwrap();
    assert_eq!(inst.current_step_index, 1);
    assert_eq!(inst.steps[0].status, StepStatus::Skipped);
    assert_eq!(inst.status, InstanceStatus::Pending);
  }

  #[test]
  fn no_applicable_steps_is_a_validation_error() {
    let t = template(vec![StepDefinition::new(1, "Tag", "x", true).with_condition(StepCondition::HasTag { tag: "nope".into() })]);
    assert!(matches!(start(&t, &document(), Uuid::new_v4(), "u", Utc::now()), Err(DomainError::Validation(_))));
  }

  #[test]
  fn trailing_optional_steps_are_skipped_on_completion() {
    let t = template(vec![StepDefinition::new(1, "Manager", "manager", true),
                          StepDefinition::new(2, "Revisión", "peer", false)]);
    let mut inst = start(&t, &document(), Uuid::new_v4(), "u", Utc::now()).unwrap();
    let a = decision(&inst, 0, Decision::Approve);
    assert_eq!(apply(&mut inst, &a).unwrap(), Transition::Completed);
    assert_eq!(inst.steps[1].status, StepStatus::Skipped);
    assert_eq!(inst.current_step_index, 2);
  }

  #[test]
  fn optional_reject_continues_like_approval() {
    let t = template(vec![StepDefinition::new(1, "Revisión", "peer", false),
                          StepDefinition::new(2, "Director", "director", true)]);
    let mut inst = start(&t, &document(), Uuid::new_v4(), "u", Utc::now()).unwrap();
    let a = decision(&inst, 0, Decision::Reject);
    assert_eq!(apply(&mut inst, &a).unwrap(), Transition::Advanced { next_step: 1 });
    assert_eq!(inst.steps[0].status, StepStatus::Rejected);
    assert_eq!(inst.steps[1].status, StepStatus::InProgress);
    assert_eq!(inst.status, InstanceStatus::InProgress);
  }

  #[test]
  fn all_optional_template_runs_every_applicable_step() {
    let t = template(vec![StepDefinition::new(1, "A", "a", false), StepDefinition::new(2, "B", "b", false)]);
    let mut inst = start(&t, &document(), Uuid::new_v4(), "u", Utc::now()).unwrap();
    let a = decision(&inst, 0, Decision::Approve);
    assert_eq!(apply(&mut inst, &a).unwrap(), Transition::Advanced { next_step: 1 });
    let b = decision(&inst, 1, Decision::Approve);
    assert_eq!(apply(&mut inst, &b).unwrap(), Transition::Completed);
  }

  #[test]
  fn refold_reproduces_applied_state() {
    let t = template(vec![StepDefinition::new(1, "Manager", "manager", true),
                          StepDefinition::new(2, "Director", "director", true),
                          StepDefinition::new(3, "CEO", "ceo", true)]);
    let mut inst = start(&t, &document(), Uuid::new_v4(), "u", Utc::now()).unwrap();
    let initial = inst.clone();
    let a = decision(&inst, 0, Decision::Approve);
    apply(&mut inst, &a).unwrap();
    let c = decision(&inst, 1, Decision::Cancel);
    apply(&mut inst, &c).unwrap();
    let folded = refold(&initial, &[a, c]).unwrap();
    assert_eq!(folded, inst);
    assert_eq!(folded.steps[0].status, StepStatus::Completed);
    assert_eq!(folded.steps[1].status, StepStatus::Skipped);
    assert_eq!(folded.steps[2].status, StepStatus::Skipped);
  }

  #[test]
  fn terminal_instances_accept_no_more_decisions() {
    let t = template(vec![StepDefinition::new(1, "Manager", "manager", true)]);
    let mut inst = start(&t, &document(), Uuid::new_v4(), "u", Utc::now()).unwrap();
    let r = decision(&inst, 0, Decision::Reject);
    assert_eq!(apply(&mut inst, &r).unwrap(), Transition::Rejected);
    let again = decision(&inst, 0, Decision::Approve);
    assert!(matches!(apply(&mut inst, &again), Err(DomainError::InvalidTransition(_))));
  }

  #[test]
  fn refold_ignores_later_template_changes() {
    let mut t = template(vec![StepDefinition::new(1, "Manager", "manager", true),
                              StepDefinition::new(2, "Director", "director", true)]);
    let mut inst = start(&t, &document(), Uuid::new_v4(), "u", Utc::now()).unwrap();
    let initial = inst.clone();
    let a = decision(&inst, 0, Decision::Approve);
    apply(&mut inst, &a).unwrap();
    let b = decision(&inst, 1, Decision::Approve);
    apply(&mut inst, &b).unwrap();
    t.steps = vec![StepDefinition::new(10, "Otro", "otro", false)];
    let folded = refold(&initial, &[a, b]).unwrap();
    assert_eq!(folded, inst);
    assert_eq!(folded.status, InstanceStatus::Completed);
    assert_eq!(folded.steps[1].approver_role, "director");
  }
}
