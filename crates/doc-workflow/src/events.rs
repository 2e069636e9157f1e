// Canal de eventos por instancia de workflow. Los eventos se publican
// después del commit; el estado de referencia sigue siendo el ledger, los
// suscriptores releen la instancia plegada.
use doc_domain::Decision;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowEvent {
  InstanceStarted { instance_id: Uuid, version_id: Uuid, current_step_index: usize },
  StepDecided { instance_id: Uuid, step_index: usize, decision: Decision, approver_id: String },
  StepActivated { instance_id: Uuid, step_index: usize, approver_role: String },
  RoleNotified { instance_id: Uuid, role: String, message: String },
  InstanceCompleted { instance_id: Uuid, version_id: Uuid },
  InstanceRejected { instance_id: Uuid, version_id: Uuid },
  InstanceCancelled { instance_id: Uuid, version_id: Uuid },
}

impl WorkflowEvent {
  pub fn instance_id(&self) -> Uuid {
    match self {
      WorkflowEvent::InstanceStarted { instance_id, .. }
      | WorkflowEvent::StepDecided { instance_id, .. }
      | WorkflowEvent::StepActivated { instance_id, .. }
      | WorkflowEvent::RoleNotified { instance_id, .. }
      | WorkflowEvent::InstanceCompleted { instance_id, .. }
      | WorkflowEvent::InstanceRejected { instance_id, .. }
      | WorkflowEvent::InstanceCancelled { instance_id, .. } => *instance_id,
    }
  }
}

#[derive(Debug, Default)]
pub struct WorkflowEventBus {
  subscribers: Mutex<HashMap<Uuid, Vec<Sender<WorkflowEvent>>>>,
}

impl WorkflowEventBus {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn subscribe(&self, instance_id: Uuid) -> Receiver<WorkflowEvent> {
    let (tx, rx) = channel();
    self.subscribers
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .entry(instance_id)
        .or_default()
        .push(tx);
    rx
  }

  /// Entrega el evento a los suscriptores vivos de su instancia.
  pub fn publish(&self, event: WorkflowEvent) {
    let mut subs = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(list) = subs.get_mut(&event.instance_id()) {
      list.retain(|s| s.send(event.clone()).is_ok());
    }
  }

  /// Cierra el canal de la instancia; los receptores ven fin de stream.
  pub fn close(&self, instance_id: &Uuid) {
    self.subscribers.lock().unwrap_or_else(|e| e.into_inner()).remove(instance_id);
  }

  pub fn subscriber_count(&self, instance_id: &Uuid) -> usize {
    self.subscribers
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .get(instance_id)
        .map(|l| l.len())
        .unwrap_or(0)
  }
}
