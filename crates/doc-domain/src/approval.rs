// approval.rs
use crate::Decision;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Entrada del ledger de aprobaciones. Append-only: nunca se actualiza ni se
/// borra. `prev_hash`/`entry_hash` encadenan las entradas de una misma
/// instancia.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
  pub id: Uuid,
  pub workflow_instance_id: Uuid,
  pub step_index: usize,
  pub decision: Decision,
  pub approver_id: String,
  pub comments: Option<String>,
  pub timestamp: DateTime<Utc>,
  /// Posición en el ledger de la instancia (1-based).
  pub sequence: i64,
  pub prev_hash: String,
  pub entry_hash: String,
}
