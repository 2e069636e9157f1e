// workflow.rs
use crate::{Document, DocumentType, DomainError, InstanceStatus, SecurityLevel, StepStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Condición de aplicabilidad de un paso. Se evalúa una sola vez, al
/// instanciar el workflow, contra el documento.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepCondition {
  #[default]
  Always,
  SecurityLevelAtLeast {
    level: SecurityLevel,
  },
  DocumentTypeIn {
    types: Vec<DocumentType>,
  },
  HasTag {
    tag: String,
  },
}

impl StepCondition {
  pub fn evaluate(&self, document: &Document) -> bool {
    match self {
      StepCondition::Always => true,
      StepCondition::SecurityLevelAtLeast { level } => document.security_level.rank() >= level.rank(),
      StepCondition::DocumentTypeIn { types } => types.contains(&document.document_type),
      StepCondition::HasTag { tag } => document.has_tag(tag),
    }
  }
}

/// Acciones que se ejecutan cuando el paso queda aprobado.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepAction {
  NotifyRole { role: String, message: String },
  ApplyWatermark { text: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDefinition {
  pub order: u32,
  pub name: String,
  pub approver_role: String,
  pub is_required: bool,
  #[serde(default)]
  pub estimated_days: Option<u32>,
  #[serde(default)]
  pub condition: StepCondition,
  #[serde(default)]
  pub actions: Vec<StepAction>,
}

impl StepDefinition {
  pub fn new(order: u32, name: &str, approver_role: &str, is_required: bool) -> Self {
    Self { order,
           name: name.to_string(),
           approver_role: approver_role.to_string(),
           is_required,
           estimated_days: None,
           condition: StepCondition::Always,
           actions: Vec::new() }
  }

  pub fn with_condition(mut self, condition: StepCondition) -> Self {
    self.condition = condition;
    self
  }

  pub fn with_action(mut self, action: StepAction) -> Self {
    self.actions.push(action);
    self
  }

  pub fn with_estimated_days(mut self, days: u32) -> Self {
    self.estimated_days = Some(days);
    self
  }
}

/// Plantilla de cadena de aprobación. Los pasos se mantienen ordenados por
/// `order`; una plantilla referenciada por una instancia activa no se puede
/// modificar. Las instancias terminadas conservan su propia copia de los
/// pasos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTemplate {
  pub id: Uuid,
  pub name: String,
  pub description: Option<String>,
  pub document_types: Vec<DocumentType>,
  pub steps: Vec<StepDefinition>,
  pub is_active: bool,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl WorkflowTemplate {
  pub fn new(name: &str, document_types: Vec<DocumentType>, steps: Vec<StepDefinition>) -> Result<Self, DomainError> {
    let now = Utc::now();
    let mut t = Self { id: Uuid::new_v4(),
                       name: name.trim().to_string(),
                       description: None,
                       document_types,
                       steps,
                       is_active: true,
                       created_at: now,
                       updated_at: now };
    t.normalize()?;
    Ok(t)
  }

  pub fn with_description(mut self, description: &str) -> Self {
    self.description = Some(description.to_string());
    self
  }

  /// Valida la plantilla y ordena sus pasos por `order`.
  pub fn normalize(&mut self) -> Result<(), DomainError> {
    if self.name.is_empty() {
      return Err(DomainError::Validation("La plantilla necesita un nombre".to_string()));
    }
    if self.document_types.is_empty() {
      return Err(DomainError::Validation("La plantilla debe aplicar al menos a un tipo de documento".to_string()));
    }
    if self.steps.is_empty() {
      return Err(DomainError::Validation("La plantilla debe tener al menos un paso".to_string()));
    }
    let mut seen = HashSet::new();
    for s in &self.steps {
      if s.approver_role.trim().is_empty() {
        return Err(DomainError::Validation(format!("El paso '{}' no tiene rol aprobador", s.name)));
      }
      if !seen.insert(s.order) {
        return Err(DomainError::Validation(format!("Orden de paso duplicado: {}", s.order)));
      }
    }
    self.steps.sort_by_key(|s| s.order);
    Ok(())
  }

  pub fn applies_to(&self, document_type: DocumentType) -> bool {
    self.document_types.contains(&document_type)
  }
}

/// Estado de un paso dentro de una instancia. Nombre, rol y obligatoriedad
/// se copian de la plantilla al instanciar: el fold de una instancia nunca
/// depende de la versión actual de su plantilla.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepState {
  /// `order` de la definición en la plantilla.
  pub step_order: u32,
  pub name: String,
  pub approver_role: String,
  pub is_required: bool,
  pub applicable: bool,
  pub status: StepStatus,
  pub approver_id: Option<String>,
  pub decided_at: Option<DateTime<Utc>>,
  pub comments: Option<String>,
}

impl StepState {
  pub fn from_definition(def: &StepDefinition, applicable: bool) -> Self {
    Self { step_order: def.order,
           name: def.name.clone(),
           approver_role: def.approver_role.clone(),
           is_required: def.is_required,
           applicable,
           status: if applicable { StepStatus::Pending } else { StepStatus::Skipped },
           approver_id: None,
           decided_at: None,
           comments: None }
  }
}

/// Instancia de workflow sobre una versión concreta. Su estado es una
/// proyección del ledger de aprobaciones; lo persistido es una caché que se
/// puede recalcular en cualquier momento.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInstance {
  pub id: Uuid,
  pub template_id: Uuid,
  pub document_id: Uuid,
  pub version_id: Uuid,
  pub current_step_index: usize,
  pub status: InstanceStatus,
  pub started_at: DateTime<Utc>,
  pub started_by: String,
  pub completed_at: Option<DateTime<Utc>>,
  pub steps: Vec<StepState>,
}

impl WorkflowInstance {
  pub fn is_terminal(&self) -> bool {
    self.status.is_terminal()
  }

  pub fn is_active(&self) -> bool {
    !self.is_terminal()
  }

  pub fn completed_steps(&self) -> usize {
    self.steps.iter().filter(|s| s.status == StepStatus::Completed).count()
  }

  /// Progreso calculado, nunca almacenado.
  pub fn progress(&self) -> f64 {
    if self.steps.is_empty() {
      return 0.0;
    }
    self.completed_steps() as f64 / self.steps.len() as f64
  }

  pub fn current_step(&self) -> Option<&StepState> {
    if self.is_terminal() {
      return None;
    }
    self.steps.get(self.current_step_index)
  }
}
