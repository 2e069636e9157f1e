// Ledger de aprobaciones: único camino de escritura de decisiones.
//
// Cada entrada se encadena con la anterior de la misma instancia:
// `entry_hash = blake3(prev_hash | instancia | paso | decisión | aprobador |
// comentarios | timestamp_ms | secuencia)`. La primera entrada usa
// `GENESIS_HASH` como `prev_hash`.
use chrono::{DateTime, Utc};
use doc_domain::{Approval, Decision, DomainError};
use docstore::{in_transaction, DocumentStore, Result, StoreTx};
use uuid::Uuid;

pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Resultado de recomputar la cadena de una instancia.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainVerification {
  pub entries: usize,
  pub valid: bool,
  /// Secuencia de la primera entrada que no cuadra.
  pub broken_at: Option<i64>,
}

#[allow(clippy::too_many_arguments)]
pub fn entry_hash(prev_hash: &str,
                  instance_id: &Uuid,
                  step_index: usize,
                  decision: Decision,
                  approver_id: &str,
                  comments: Option<&str>,
                  timestamp: &DateTime<Utc>,
                  sequence: i64)
                  -> String {
  let mut h = blake3::Hasher::new();
  h.update(prev_hash.as_bytes());
  h.update(b"|");
  h.update(instance_id.as_bytes());
  h.update(b"|");
  h.update(&(step_index as u64).to_le_bytes());
  h.update(b"|");
  h.update(decision.as_str().as_bytes());
  h.update(b"|");
  h.update(approver_id.as_bytes());
  h.update(b"|");
  h.update(comments.unwrap_or("").as_bytes());
  h.update(b"|");
  h.update(&timestamp.timestamp_millis().to_le_bytes());
  h.update(b"|");
  h.update(&sequence.to_le_bytes());
  h.finalize().to_hex().to_string()
}

pub struct ApprovalLedger;

impl ApprovalLedger {
  /// Añade una decisión dentro de la transacción `tx`. Falla con
  /// `DuplicateDecision` si el paso ya tiene una entrada.
  pub fn record(tx: &mut dyn StoreTx,
                instance_id: Uuid,
                step_index: usize,
                decision: Decision,
                approver_id: &str,
                comments: Option<&str>)
                -> Result<Approval> {
    let existing = tx.list_approvals(&instance_id)?;
    if existing.iter().any(|a| a.step_index == step_index) {
      return Err(DomainError::DuplicateDecision { instance_id, step_index });
    }
    let (prev_hash, sequence) = match existing.last() {
      Some(last) => (last.entry_hash.clone(), last.sequence + 1),
      None => (GENESIS_HASH.to_string(), 1),
    };
    // Precisión de milisegundos: es la que se persiste y la que entra al hash.
    let now = Utc::now();
    let timestamp = DateTime::<Utc>::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now);
    let hash = entry_hash(&prev_hash, &instance_id, step_index, decision, approver_id, comments, &timestamp, sequence);
    let approval = Approval { id: Uuid::new_v4(),
                              workflow_instance_id: instance_id,
                              step_index,
                              decision,
                              approver_id: approver_id.to_string(),
                              comments: comments.map(|c| c.to_string()),
                              timestamp,
                              sequence,
                              prev_hash,
                              entry_hash: hash };
    tx.append_approval(&approval)?;
    log::info!("ledger: instancia {} paso {} {} por {} (#{})",
               instance_id,
               step_index,
               decision,
               approver_id,
               sequence);
    Ok(approval)
  }

  pub fn entries(store: &dyn DocumentStore, instance_id: &Uuid) -> Result<Vec<Approval>> {
    in_transaction(store, |tx: &mut dyn StoreTx| tx.list_approvals(instance_id))
  }

  /// Recalcula la cadena de hashes de una lista de entradas ordenada.
  pub fn verify_entries(entries: &[Approval]) -> ChainVerification {
    let mut prev = GENESIS_HASH.to_string();
    for (i, a) in entries.iter().enumerate() {
      let expected = entry_hash(&prev,
                                &a.workflow_instance_id,
                                a.step_index,
                                a.decision,
                                &a.approver_id,
                                a.comments.as_deref(),
                                &a.timestamp,
                                a.sequence);
      if a.prev_hash != prev || a.entry_hash != expected || a.sequence != i as i64 + 1 {
        return ChainVerification { entries: entries.len(),
                                   valid: false,
                                   broken_at: Some(a.sequence) };
      }
      prev = a.entry_hash.clone();
    }
    ChainVerification { entries: entries.len(),
                        valid: true,
                        broken_at: None }
  }

  pub fn verify_chain(store: &dyn DocumentStore, instance_id: &Uuid) -> Result<ChainVerification> {
    let entries = Self::entries(store, instance_id)?;
    let res = Self::verify_entries(&entries);
    if !res.valid {
      log::warn!("ledger: cadena rota en la instancia {} (secuencia {:?})", instance_id, res.broken_at);
    }
    Ok(res)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use docstore::InMemoryDocumentStore;

  #[test]
  fn chain_verifies_and_detects_tampering() {
    let store = InMemoryDocumentStore::new();
    let inst = Uuid::new_v4();
    in_transaction(&store, |tx: &mut dyn StoreTx| {
      ApprovalLedger::record(tx, inst, 0, Decision::Approve, "ana", Some("ok"))?;
      ApprovalLedger::record(tx, inst, 1, Decision::Reject, "luis", None)
    }).unwrap();
    let res = ApprovalLedger::verify_chain(&store, &inst).unwrap();
    assert!(res.valid);
    assert_eq!(res.entries, 2);

    let mut entries = ApprovalLedger::entries(&store, &inst).unwrap();
    entries[1].approver_id = "mallory".into();
    let tampered = ApprovalLedger::verify_entries(&entries);
    assert!(!tampered.valid);
    assert_eq!(tampered.broken_at, Some(2));
  }

  #[test]
  fn second_decision_on_same_step_is_rejected() {
    let store = InMemoryDocumentStore::new();
    let inst = Uuid::new_v4();
    in_transaction(&store, |tx: &mut dyn StoreTx| ApprovalLedger::record(tx, inst, 0, Decision::Approve, "ana", None)).unwrap();
    let dup = in_transaction(&store, |tx: &mut dyn StoreTx| ApprovalLedger::record(tx, inst, 0, Decision::Approve, "ana", None));
    assert!(matches!(dup, Err(DomainError::DuplicateDecision { .. })));
  }
}
