#![cfg(not(feature = "pg"))]
use doc_domain::{Decision, Document, DocumentStatus, DocumentType, DomainError, InstanceStatus, SecurityLevel, StepCondition,
                 StepDefinition, StepStatus, VersionNumber, VersionStatus, WorkflowTemplate};
use doc_persistence::new_sqlite_for_test;
use doc_workflow::{DocumentService, EngineConfig, StaticRoleDirectory};
use docstore::RetryPolicy;
use std::sync::Arc;

fn service() -> DocumentService {
  let (docs, contents) = new_sqlite_for_test().unwrap();
  let roles = Arc::new(StaticRoleDirectory::new().with_grant("legal", "legal")
                                                 .with_grant("cfo", "finance")
                                                 .with_grant("ceo", "ceo"));
  let config = EngineConfig { retry: RetryPolicy::immediate(3),
                              ..EngineConfig::default() };
  DocumentService::new(Arc::new(docs), Arc::new(contents), roles, config)
}

#[test]
fn contract_goes_through_approval_on_sqlite() {
  let svc = service();
  let doc = Document::new("CON-2025-001", "Contrato de suministro", DocumentType::Contract, SecurityLevel::Confidential, "ana")
    .unwrap();
  let doc = svc.create_document(doc.with_tags(["finanzas"])).unwrap();
  let t = WorkflowTemplate::new("Contratos",
                                vec![DocumentType::Contract],
                                vec![StepDefinition::new(1, "Legal", "legal", true),
                                     StepDefinition::new(2, "Finanzas", "finance", true)
                                       .with_condition(StepCondition::HasTag { tag: "finanzas".into() }),
                                     StepDefinition::new(3, "Dirección", "ceo", true)
                                       .with_condition(StepCondition::SecurityLevelAtLeast { level: SecurityLevel::Secret })]).unwrap();
  let t = svc.register_template(t).unwrap();

  let v1 = svc.create_major_version(doc.id, b"%PDF-1.7 contrato", "ana").unwrap();
  let inst = svc.instantiate_workflow(t.id, doc.id, v1.id, "ana").unwrap();
  assert_eq!(inst.steps[2].status, StepStatus::Skipped);

  svc.advance_step(inst.id, 0, Decision::Approve, "legal", Some("revisado")).unwrap();
  let dup = svc.advance_step(inst.id, 0, Decision::Approve, "legal", None);
  assert!(matches!(dup, Err(DomainError::InvalidTransition(_))));
  let done = svc.advance_step(inst.id, 1, Decision::Approve, "cfo", None).unwrap();
  assert_eq!(done.status, InstanceStatus::Completed);

  let folded = svc.get_instance(inst.id).unwrap();
  assert_eq!(folded.status, InstanceStatus::Completed);
  assert_eq!(folded.steps[0].comments.as_deref(), Some("revisado"));
  assert_eq!(folded.steps[2].status, StepStatus::Skipped);
  assert!(svc.verify_chain(inst.id).unwrap().valid);

  let v1 = svc.get_version(v1.id).unwrap();
  assert_eq!(v1.status, VersionStatus::Approved);
  assert!(v1.is_current_version);
  let doc = svc.get_document(doc.id).unwrap();
  assert_eq!(doc.current_version_id, Some(v1.id));
  assert_eq!(doc.status, DocumentStatus::Approved);
  assert_eq!(svc.read_content(v1.id).unwrap(), b"%PDF-1.7 contrato".to_vec());
}

#[test]
fn branch_and_merge_on_sqlite() {
  let svc = service();
  let doc = Document::new("POL-7", "Política", DocumentType::Policy, SecurityLevel::Internal, "ana").unwrap();
  let doc = svc.create_document(doc).unwrap();
  let v1 = svc.create_major_version(doc.id, b"1.0.0", "ana").unwrap();
  let seed = svc.create_branch(doc.id, "revision-2025", v1.id, b"1.0.1", "ana").unwrap();
  assert_eq!(seed.version_number, VersionNumber::release(1, 0, 1));
  let merged = svc.merge_branch(seed.id, doc.id, b"2.0.0", None, "ana").unwrap();
  assert_eq!(merged.version_number, VersionNumber::release(2, 0, 0));
  assert_eq!(merged.parent_version_id, Some(seed.id));

  let stats = svc.get_versioning_statistics(doc.id).unwrap();
  assert_eq!(stats.total_versions, 3);
  assert_eq!(stats.branches.len(), 2);
}
