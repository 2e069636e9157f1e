use doc_domain::{Decision, Document, DocumentStatus, DocumentType, DomainError, InstanceStatus, SecurityLevel, StepAction,
                 StepCondition, StepDefinition, StepStatus, VersionStatus, WorkflowInstance, WorkflowTemplate};
use doc_workflow::{DocumentService, EngineConfig, StaticRoleDirectory, WorkflowEvent};
use docstore::{InMemoryContentStore, InMemoryDocumentStore, RetryPolicy};
use std::sync::Arc;

fn roles() -> Arc<StaticRoleDirectory> {
  Arc::new(StaticRoleDirectory::new().with_grant("maria", "manager")
                                     .with_grant("diego", "director")
                                     .with_grant("carla", "ceo")
                                     .with_grant("pablo", "peer"))
}

fn config() -> EngineConfig {
  EngineConfig { retry: RetryPolicy::immediate(3),
                 ..EngineConfig::default() }
}

struct Fixture {
  svc: DocumentService,
  store: Arc<InMemoryDocumentStore>,
}

fn fixture() -> Fixture {
  let store = Arc::new(InMemoryDocumentStore::new());
  let contents = Arc::new(InMemoryContentStore::new());
  let svc = DocumentService::new(store.clone(), contents, roles(), config());
  Fixture { svc, store }
}

fn policy(svc: &DocumentService, code: &str) -> Document {
  let doc = Document::new(code, "Política de viajes", DocumentType::Policy, SecurityLevel::Internal, "owner").unwrap();
  svc.create_document(doc).unwrap()
}

fn manager_director(svc: &DocumentService) -> WorkflowTemplate {
  let t = WorkflowTemplate::new("W1",
                                vec![DocumentType::Policy],
                                vec![StepDefinition::new(1, "Manager", "manager", true),
                                     StepDefinition::new(2, "Director", "director", true)]).unwrap();
  svc.register_template(t).unwrap()
}

fn assert_terminal_prefix(inst: &WorkflowInstance) {
  for s in &inst.steps[..inst.current_step_index.min(inst.steps.len())] {
    assert!(!matches!(s.status, StepStatus::Pending | StepStatus::InProgress),
            "paso {} no terminal antes del índice actual",
            s.step_order);
  }
  assert!(inst.steps.iter().filter(|s| s.status == StepStatus::InProgress).count() <= 1);
}

#[test]
fn approving_every_required_step_promotes_the_version() {
  let f = fixture();
  let doc = policy(&f.svc, "D1");
  let v1 = f.svc.create_major_version(doc.id, b"contenido v1", "alice").unwrap();
  let w1 = manager_director(&f.svc);

  let inst = f.svc.instantiate_workflow(w1.id, doc.id, v1.id, "alice").unwrap();
  assert_eq!(inst.status, InstanceStatus::Pending);
  assert_eq!(inst.current_step_index, 0);
  assert_eq!(f.svc.get_version(v1.id).unwrap().status, VersionStatus::PendingApproval);

  let inst = f.svc.advance_step(inst.id, 0, Decision::Approve, "maria", None).unwrap();
  assert_eq!(inst.steps[0].status, StepStatus::Completed);
  assert_eq!(inst.current_step_index, 1);
  assert_eq!(inst.status, InstanceStatus::InProgress);
  assert_terminal_prefix(&inst);

  let inst = f.svc.advance_step(inst.id, 1, Decision::Approve, "diego", Some("conforme")).unwrap();
  assert_eq!(inst.steps[1].status, StepStatus::Completed);
  assert_eq!(inst.status, InstanceStatus::Completed);
  assert_eq!(inst.progress(), 1.0);
  assert_terminal_prefix(&inst);

  let v1 = f.svc.get_version(v1.id).unwrap();
  assert_eq!(v1.status, VersionStatus::Approved);
  assert!(v1.is_current_version);
  assert_eq!(v1.approved_by.as_deref(), Some("diego"));
  let doc = f.svc.get_document(doc.id).unwrap();
  assert_eq!(doc.current_version_id, Some(v1.id));
  assert_eq!(doc.status, DocumentStatus::Approved);

  assert_eq!(f.svc.get_instance(inst.id).unwrap(), inst);
  let chain = f.svc.verify_chain(inst.id).unwrap();
  assert!(chain.valid);
  assert_eq!(chain.entries, 2);
}

#[test]
fn rejecting_a_required_step_leaves_current_pointer_untouched() {
  let f = fixture();
  let doc = policy(&f.svc, "D1");
  let w1 = manager_director(&f.svc);

  let v1 = f.svc.create_major_version(doc.id, b"v1", "alice").unwrap();
  f.svc.instantiate_workflow(w1.id, doc.id, v1.id, "alice").unwrap();
  f.svc.approve_version(v1.id, "maria", None).unwrap();
  f.svc.approve_version(v1.id, "diego", None).unwrap();

  let v2 = f.svc.create_minor_version(doc.id, b"v2", "alice").unwrap();
  let inst = f.svc.instantiate_workflow(w1.id, doc.id, v2.id, "alice").unwrap();
  f.svc.approve_version(v2.id, "maria", None).unwrap();
  let inst = f.svc.advance_step(inst.id, 1, Decision::Reject, "diego", Some("Missing signature")).unwrap();

  assert_eq!(inst.status, InstanceStatus::Rejected);
  assert_eq!(inst.steps[1].status, StepStatus::Rejected);
  assert_eq!(inst.steps[1].comments.as_deref(), Some("Missing signature"));
  assert_eq!(f.svc.get_version(v2.id).unwrap().status, VersionStatus::Rejected);
  let doc = f.svc.get_document(doc.id).unwrap();
  assert_eq!(doc.current_version_id, Some(v1.id));
  assert_eq!(doc.status, DocumentStatus::Approved);

  let again = f.svc.advance_step(inst.id, 1, Decision::Approve, "diego", None);
  assert!(matches!(again, Err(DomainError::InvalidTransition(_))));
  assert!(matches!(f.svc.approve_version(v2.id, "diego", None),
                   Err(DomainError::InvalidTransition(ref m)) if m.contains(&v2.id.to_string())));
}

#[test]
fn first_version_rejected_keeps_document_without_current() {
  let f = fixture();
  let doc = policy(&f.svc, "D1");
  let w1 = manager_director(&f.svc);
  let v1 = f.svc.create_major_version(doc.id, b"v1", "alice").unwrap();
  f.svc.instantiate_workflow(w1.id, doc.id, v1.id, "alice").unwrap();
  f.svc.approve_version(v1.id, "maria", None).unwrap();
  f.svc.reject_version(v1.id, "diego", Some("Missing signature")).unwrap();

  let doc = f.svc.get_document(doc.id).unwrap();
  assert_eq!(doc.current_version_id, None);
  assert_eq!(doc.status, DocumentStatus::Draft);
}

#[test]
fn cancel_skips_remaining_steps_and_returns_version_to_draft() {
  let f = fixture();
  let doc = policy(&f.svc, "D1");
  let t = WorkflowTemplate::new("Tres niveles",
                                vec![DocumentType::Policy],
                                vec![StepDefinition::new(1, "Manager", "manager", true),
                                     StepDefinition::new(2, "Director", "director", true),
                                     StepDefinition::new(3, "CEO", "ceo", true)]).unwrap();
  let t = f.svc.register_template(t).unwrap();
  let v1 = f.svc.create_major_version(doc.id, b"v1", "alice").unwrap();
  let inst = f.svc.instantiate_workflow(t.id, doc.id, v1.id, "alice").unwrap();
  f.svc.advance_step(inst.id, 0, Decision::Approve, "maria", None).unwrap();

  // El iniciador puede cancelar aunque no tenga el rol del paso.
  let inst = f.svc.advance_step(inst.id, 1, Decision::Cancel, "alice", Some("retirada")).unwrap();
  assert_eq!(inst.status, InstanceStatus::Cancelled);
  assert_eq!(inst.steps[0].status, StepStatus::Completed);
  assert_eq!(inst.steps[1].status, StepStatus::Skipped);
  assert_eq!(inst.steps[2].status, StepStatus::Skipped);
  assert_eq!(f.svc.get_instance(inst.id).unwrap(), inst);

  assert_eq!(f.svc.get_version(v1.id).unwrap().status, VersionStatus::Draft);
  assert_eq!(f.svc.get_document(doc.id).unwrap().current_version_id, None);
  let restarted = f.svc.instantiate_workflow(t.id, doc.id, v1.id, "alice").unwrap();
  assert_eq!(restarted.status, InstanceStatus::Pending);
}

#[test]
fn concurrent_decisions_on_the_same_step_admit_exactly_one() {
  let f = fixture();
  let doc = policy(&f.svc, "D1");
  let w1 = manager_director(&f.svc);
  let v1 = f.svc.create_major_version(doc.id, b"v1", "alice").unwrap();
  let inst = f.svc.instantiate_workflow(w1.id, doc.id, v1.id, "alice").unwrap();

  let results: Vec<_> = std::thread::scope(|s| {
                          let handles: Vec<_> =
                            (0..2).map(|_| s.spawn(|| f.svc.advance_step(inst.id, 0, Decision::Approve, "maria", None)))
                                  .collect();
                          handles.into_iter().map(|h| h.join().unwrap()).collect()
                        });
  assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
  for r in results.iter().filter(|r| r.is_err()) {
    assert!(matches!(r, Err(DomainError::InvalidTransition(_)) | Err(DomainError::DuplicateDecision { .. })));
  }
  let ledger = f.svc.ledger(inst.id).unwrap();
  assert_eq!(ledger.iter().filter(|a| a.step_index == 0).count(), 1);
}

#[test]
fn approver_without_role_is_refused_and_nothing_is_recorded() {
  let f = fixture();
  let doc = policy(&f.svc, "D1");
  let w1 = manager_director(&f.svc);
  let v1 = f.svc.create_major_version(doc.id, b"v1", "alice").unwrap();
  let inst = f.svc.instantiate_workflow(w1.id, doc.id, v1.id, "alice").unwrap();

  let res = f.svc.advance_step(inst.id, 0, Decision::Approve, "diego", None);
  assert!(matches!(res, Err(DomainError::UnauthorizedApprover { ref required_role, .. }) if required_role == "manager"));
  assert!(f.svc.ledger(inst.id).unwrap().is_empty());
  assert!(matches!(f.svc.advance_step(inst.id, 1, Decision::Approve, "diego", None),
                   Err(DomainError::InvalidTransition(_))));
}

#[test]
fn template_for_other_document_type_is_a_mismatch() {
  let f = fixture();
  let doc = policy(&f.svc, "D1");
  let v1 = f.svc.create_major_version(doc.id, b"v1", "alice").unwrap();
  let contracts = WorkflowTemplate::new("Contratos",
                                        vec![DocumentType::Contract],
                                        vec![StepDefinition::new(1, "Legal", "legal", true)]).unwrap();
  let contracts = f.svc.register_template(contracts).unwrap();
  let res = f.svc.instantiate_workflow(contracts.id, doc.id, v1.id, "alice");
  assert!(matches!(res, Err(DomainError::WorkflowTemplateMismatch { document_type: DocumentType::Policy, .. })));
  assert_eq!(f.svc.get_version(v1.id).unwrap().status, VersionStatus::Draft);
}

#[test]
fn optional_step_rejection_does_not_reject_the_instance() {
  let f = fixture();
  let doc = policy(&f.svc, "D1");
  let t = WorkflowTemplate::new("Con revisión",
                                vec![DocumentType::Policy],
                                vec![StepDefinition::new(1, "Revisión", "peer", false),
                                     StepDefinition::new(2, "Director", "director", true)]).unwrap();
  let t = f.svc.register_template(t).unwrap();
  let v1 = f.svc.create_major_version(doc.id, b"v1", "alice").unwrap();
  let inst = f.svc.instantiate_workflow(t.id, doc.id, v1.id, "alice").unwrap();

  let inst = f.svc.advance_step(inst.id, 0, Decision::Reject, "pablo", Some("estilo")).unwrap();
  assert_eq!(inst.status, InstanceStatus::InProgress);
  assert_eq!(inst.steps[0].status, StepStatus::Rejected);
  assert_eq!(f.svc.get_version(v1.id).unwrap().status, VersionStatus::PendingApproval);

  let inst = f.svc.advance_step(inst.id, 1, Decision::Approve, "diego", None).unwrap();
  assert_eq!(inst.status, InstanceStatus::Completed);
  assert_eq!(f.svc.get_version(v1.id).unwrap().status, VersionStatus::Approved);
}

#[test]
fn condition_skipped_step_is_never_current() {
  let f = fixture();
  let doc = policy(&f.svc, "D1");
  let t = WorkflowTemplate::new("Seguridad",
                                vec![DocumentType::Policy],
                                vec![StepDefinition::new(1, "Seguridad", "security", true)
                                       .with_condition(StepCondition::SecurityLevelAtLeast { level: SecurityLevel::Restricted }),
                                     StepDefinition::new(2, "Manager", "manager", true)]).unwrap();
  let t = f.svc.register_template(t).unwrap();
  let v1 = f.svc.create_major_version(doc.id, b"v1", "alice").unwrap();
  let inst = f.svc.instantiate_workflow(t.id, doc.id, v1.id, "alice").unwrap();
  assert_eq!(inst.current_step_index, 1);
  assert_eq!(inst.steps[0].status, StepStatus::Skipped);
  assert!(matches!(f.svc.advance_step(inst.id, 0, Decision::Approve, "maria", None),
                   Err(DomainError::InvalidTransition(_))));
  let inst = f.svc.advance_step(inst.id, 1, Decision::Approve, "maria", None).unwrap();
  assert_eq!(inst.status, InstanceStatus::Completed);
}

#[test]
fn at_most_one_current_version_per_document() {
  let f = fixture();
  let doc = policy(&f.svc, "D1");
  let w1 = manager_director(&f.svc);
  let mut approved = Vec::new();
  for content in ["uno", "dos", "tres"] {
    let v = f.svc.create_minor_version(doc.id, content.as_bytes(), "alice").unwrap();
    f.svc.instantiate_workflow(w1.id, doc.id, v.id, "alice").unwrap();
    f.svc.approve_version(v.id, "maria", None).unwrap();
    f.svc.approve_version(v.id, "diego", None).unwrap();
    approved.push(v.id);
  }
  let versions = f.svc.list_versions(doc.id).unwrap();
  let current: Vec<_> = versions.iter().filter(|v| v.is_current_version).collect();
  assert_eq!(current.len(), 1);
  assert_eq!(current[0].id, approved[2]);
  assert!(versions.iter().all(|v| v.status == VersionStatus::Approved));
  assert_eq!(f.svc.get_document(doc.id).unwrap().current_version_id, Some(approved[2]));
}

#[test]
fn second_instance_on_the_same_version_is_refused() {
  let f = fixture();
  let doc = policy(&f.svc, "D1");
  let w1 = manager_director(&f.svc);
  let v1 = f.svc.create_major_version(doc.id, b"v1", "alice").unwrap();
  f.svc.instantiate_workflow(w1.id, doc.id, v1.id, "alice").unwrap();
  assert!(matches!(f.svc.instantiate_workflow(w1.id, doc.id, v1.id, "alice"),
                   Err(DomainError::InvalidTransition(_))));
}

#[test]
fn templates_in_use_cannot_change() {
  let f = fixture();
  let doc = policy(&f.svc, "D1");
  let w1 = manager_director(&f.svc);
  let v1 = f.svc.create_major_version(doc.id, b"v1", "alice").unwrap();
  f.svc.instantiate_workflow(w1.id, doc.id, v1.id, "alice").unwrap();

  let mut changed = w1.clone();
  changed.steps.push(StepDefinition::new(3, "CEO", "ceo", true));
  assert!(matches!(f.svc.update_template(changed.clone()), Err(DomainError::InvalidTransition(_))));

  f.svc.approve_version(v1.id, "maria", None).unwrap();
  f.svc.approve_version(v1.id, "diego", None).unwrap();
  let updated = f.svc.update_template(changed).unwrap();
  assert_eq!(updated.steps.len(), 3);

  f.svc.deactivate_template(w1.id).unwrap();
  let v2 = f.svc.create_minor_version(doc.id, b"v2", "alice").unwrap();
  assert!(matches!(f.svc.instantiate_workflow(w1.id, doc.id, v2.id, "alice"),
                   Err(DomainError::InvalidTransition(_))));
}

#[test]
fn working_drafts_cannot_enter_a_workflow() {
  let f = fixture();
  let doc = policy(&f.svc, "D1");
  let w1 = manager_director(&f.svc);
  let draft = f.svc.create_draft_version(doc.id, b"borrador", "alice").unwrap();
  assert!(matches!(f.svc.instantiate_workflow(w1.id, doc.id, draft.id, "alice"),
                   Err(DomainError::InvalidTransition(_))));
  assert_eq!(f.svc.get_version(draft.id).unwrap().status, VersionStatus::Draft);
  assert!(f.svc.get_document(doc.id).unwrap().current_version_id.is_none());
}

#[test]
fn finished_instances_survive_template_changes() {
  let f = fixture();
  let doc = policy(&f.svc, "D1");
  let w1 = manager_director(&f.svc);
  let v1 = f.svc.create_major_version(doc.id, b"v1", "alice").unwrap();
  let inst = f.svc.instantiate_workflow(w1.id, doc.id, v1.id, "alice").unwrap();
  f.svc.approve_version(v1.id, "maria", None).unwrap();
  let done = f.svc.approve_version(v1.id, "diego", None).unwrap();
  assert_eq!(done.status, InstanceStatus::Completed);

  let mut changed = w1.clone();
  changed.steps = vec![StepDefinition::new(10, "Otro", "ceo", false)];
  f.svc.update_template(changed).unwrap();

  let folded = f.svc.get_instance(inst.id).unwrap();
  assert_eq!(folded, done);
  assert_eq!(folded.steps[1].approver_role, "director");
  assert!(folded.steps.iter().all(|s| s.is_required));
  assert!(f.svc.verify_chain(inst.id).unwrap().valid);
}

#[test]
fn archived_and_deleted_documents_refuse_new_work() {
  let f = fixture();
  let doc = policy(&f.svc, "D-ARCH");
  let v1 = f.svc.create_major_version(doc.id, b"v1", "alice").unwrap();
  let w1 = manager_director(&f.svc);
  let inst = f.svc.instantiate_workflow(w1.id, doc.id, v1.id, "alice").unwrap();
  assert!(matches!(f.svc.archive_document(doc.id), Err(DomainError::InvalidTransition(_))));
  assert!(matches!(f.svc.delete_document(doc.id), Err(DomainError::InvalidTransition(_))));
  f.svc.advance_step(inst.id, 0, Decision::Approve, "maria", None).unwrap();
  f.svc.advance_step(inst.id, 1, Decision::Approve, "diego", None).unwrap();

  let archived = f.svc.archive_document(doc.id).unwrap();
  assert!(archived.is_archived);
  assert_eq!(f.svc.get_document(doc.id).unwrap().status, DocumentStatus::Archived);
  assert!(matches!(f.svc.create_minor_version(doc.id, b"v2", "alice"), Err(DomainError::InvalidTransition(_))));
  assert_eq!(f.svc.read_content(v1.id).unwrap(), b"v1".to_vec());

  let restored = f.svc.restore_document(doc.id).unwrap();
  assert_eq!(restored.status, DocumentStatus::Approved);
  let v2 = f.svc.create_minor_version(doc.id, b"v2", "alice").unwrap();

  let deleted = f.svc.delete_document(doc.id).unwrap();
  assert_eq!(deleted.status, DocumentStatus::Deleted);
  assert!(matches!(f.svc.instantiate_workflow(w1.id, doc.id, v2.id, "alice"), Err(DomainError::InvalidTransition(_))));
  assert!(matches!(f.svc.restore_document(doc.id), Err(DomainError::InvalidTransition(_))));
  assert!(matches!(f.svc.delete_document(doc.id), Err(DomainError::InvalidTransition(_))));
  assert_eq!(f.svc.current_version(doc.id).unwrap().map(|v| v.id), Some(v1.id));
}

#[test]
fn events_follow_the_instance_until_it_terminates() {
  let f = fixture();
  let doc = policy(&f.svc, "D1");
  let t = WorkflowTemplate::new("Con avisos",
                                vec![DocumentType::Policy],
                                vec![StepDefinition::new(1, "Manager", "manager", true),
                                     StepDefinition::new(2, "Director", "director", true)
                                       .with_action(StepAction::NotifyRole { role: "archivo".into(),
                                                                            message: "publicar".into() })
                                       .with_action(StepAction::ApplyWatermark { text: "APROBADO".into() })]).unwrap();
  let t = f.svc.register_template(t).unwrap();
  let v1 = f.svc.create_major_version(doc.id, b"v1", "alice").unwrap();
  let inst = f.svc.instantiate_workflow(t.id, doc.id, v1.id, "alice").unwrap();
  let rx = f.svc.subscribe(inst.id);

  f.svc.approve_version(v1.id, "maria", None).unwrap();
  f.svc.approve_version(v1.id, "diego", None).unwrap();

  let events: Vec<WorkflowEvent> = rx.iter().collect();
  assert_eq!(events.len(), 5);
  assert!(matches!(events[1], WorkflowEvent::StepActivated { step_index: 1, ref approver_role, .. } if approver_role == "director"));
  assert!(matches!(events[3], WorkflowEvent::RoleNotified { ref role, .. } if role == "archivo"));
  assert!(matches!(events[4], WorkflowEvent::InstanceCompleted { .. }));
  assert_eq!(f.svc.get_version(v1.id).unwrap().watermark.map(|w| w.text), Some("APROBADO".to_string()));
}

#[test]
fn transient_store_failures_are_retried_then_surface_as_unavailable() {
  let f = fixture();
  let doc = policy(&f.svc, "D1");
  let w1 = manager_director(&f.svc);
  let v1 = f.svc.create_major_version(doc.id, b"v1", "alice").unwrap();
  let inst = f.svc.instantiate_workflow(w1.id, doc.id, v1.id, "alice").unwrap();

  f.store.fail_next_transactions(2);
  let inst = f.svc.advance_step(inst.id, 0, Decision::Approve, "maria", None).unwrap();
  assert_eq!(inst.current_step_index, 1);

  f.store.fail_next_transactions(10);
  let res = f.svc.advance_step(inst.id, 1, Decision::Approve, "diego", None);
  assert!(matches!(res, Err(DomainError::StorageUnavailable(_))));
  f.store.fail_next_transactions(0);
  assert_eq!(f.svc.ledger(inst.id).unwrap().len(), 1);
}

#[test]
fn workflow_statistics_reflect_instances_and_ledger() {
  let f = fixture();
  let doc = policy(&f.svc, "D1");
  let w1 = manager_director(&f.svc);
  let v1 = f.svc.create_major_version(doc.id, b"v1", "alice").unwrap();
  f.svc.instantiate_workflow(w1.id, doc.id, v1.id, "alice").unwrap();
  f.svc.approve_version(v1.id, "maria", None).unwrap();

  let stats = f.svc.get_workflow_statistics().unwrap();
  assert_eq!(stats.total_instances, 1);
  assert_eq!(stats.by_status["in_progress"], 1);
  assert_eq!(stats.pending_by_role["director"], 1);
  assert_eq!(stats.ledger_entries, 1);
  assert_eq!(stats.average_progress, 0.5);
}
