// enums.rs
// Enumeraciones del contrato externo. Los valores textuales forman parte del
// wire format y se usan tal cual en JSON y en las columnas de texto.
use crate::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! wire_enum {
  ($(#[$meta:meta])* $name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
    $(#[$meta])*
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub enum $name {
      $(#[serde(rename = $wire)] $variant),+
    }

    impl $name {
      /// Todas las variantes en orden de declaración.
      pub const ALL: &'static [$name] = &[$($name::$variant),+];

      pub fn as_str(&self) -> &'static str {
        match self {
          $($name::$variant => $wire),+
        }
      }
    }

    impl fmt::Display for $name {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
      }
    }

    impl FromStr for $name {
      type Err = DomainError;

      fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        $(
          if s.eq_ignore_ascii_case($wire) {
            return Ok($name::$variant);
          }
        )+
        Err(DomainError::Validation(format!("Valor desconocido para {}: {}", stringify!($name), s)))
      }
    }
  };
}

wire_enum! {
  /// Estado del documento; siempre derivable de la versión actual.
  DocumentStatus {
    Draft => "DRAFT",
    PendingApproval => "PENDING_APPROVAL",
    Approved => "APPROVED",
    Rejected => "REJECTED",
    Archived => "ARCHIVED",
    Expired => "EXPIRED",
    Deleted => "DELETED",
  }
}

wire_enum! {
  VersionType {
    Major => "MAJOR",
    Minor => "MINOR",
    Patch => "PATCH",
    Draft => "DRAFT",
  }
}

wire_enum! {
  VersionStatus {
    Draft => "DRAFT",
    PendingApproval => "PENDING_APPROVAL",
    Approved => "APPROVED",
    Rejected => "REJECTED",
    Archived => "ARCHIVED",
    Expired => "EXPIRED",
  }
}

wire_enum! {
  /// Niveles ordenados de menor a mayor restricción.
  SecurityLevel {
    Public => "PUBLIC",
    Internal => "INTERNAL",
    Confidential => "CONFIDENTIAL",
    Restricted => "RESTRICTED",
    Secret => "SECRET",
  }
}

wire_enum! {
  DocumentType {
    Invoice => "INVOICE",
    Receipt => "RECEIPT",
    Contract => "CONTRACT",
    Report => "REPORT",
    Policy => "POLICY",
    Procedure => "PROCEDURE",
    Manual => "MANUAL",
    Certificate => "CERTIFICATE",
    License => "LICENSE",
    Insurance => "INSURANCE",
    TaxDocument => "TAX_DOCUMENT",
    LegalDocument => "LEGAL_DOCUMENT",
    HrDocument => "HR_DOCUMENT",
    AssetDocument => "ASSET_DOCUMENT",
    InventoryDocument => "INVENTORY_DOCUMENT",
    FinancialStatement => "FINANCIAL_STATEMENT",
    AuditReport => "AUDIT_REPORT",
    ComplianceDocument => "COMPLIANCE_DOCUMENT",
    Other => "OTHER",
  }
}

wire_enum! {
  InstanceStatus {
    Pending => "pending",
    InProgress => "in_progress",
    Completed => "completed",
    Rejected => "rejected",
    Cancelled => "cancelled",
  }
}

wire_enum! {
  StepStatus {
    Pending => "pending",
    InProgress => "in_progress",
    Completed => "completed",
    Rejected => "rejected",
    Skipped => "skipped",
  }
}

wire_enum! {
  /// Decisión registrada en el ledger de aprobaciones.
  Decision {
    Approve => "APPROVE",
    Reject => "REJECT",
    Cancel => "CANCEL",
  }
}

impl SecurityLevel {
  /// Posición en la escala de restricción (PUBLIC = 0).
  pub fn rank(&self) -> usize {
    SecurityLevel::ALL.iter().position(|l| l == self).unwrap_or(0)
  }
}

impl InstanceStatus {
  pub fn is_terminal(&self) -> bool {
    matches!(self, InstanceStatus::Completed | InstanceStatus::Rejected | InstanceStatus::Cancelled)
  }
}

impl StepStatus {
  pub fn is_terminal(&self) -> bool {
    matches!(self, StepStatus::Completed | StepStatus::Rejected | StepStatus::Skipped)
  }
}

impl From<VersionStatus> for DocumentStatus {
  fn from(s: VersionStatus) -> Self {
    match s {
      VersionStatus::Draft => DocumentStatus::Draft,
      VersionStatus::PendingApproval => DocumentStatus::PendingApproval,
      VersionStatus::Approved => DocumentStatus::Approved,
      VersionStatus::Rejected => DocumentStatus::Rejected,
      VersionStatus::Archived => DocumentStatus::Archived,
      VersionStatus::Expired => DocumentStatus::Expired,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn wire_values_roundtrip_through_serde() {
    assert_eq!(serde_json::to_string(&InstanceStatus::InProgress).unwrap(), "\"in_progress\"");
    assert_eq!(serde_json::to_string(&DocumentStatus::PendingApproval).unwrap(), "\"PENDING_APPROVAL\"");
    let st: StepStatus = serde_json::from_str("\"skipped\"").unwrap();
    assert_eq!(st, StepStatus::Skipped);
  }

  #[test]
  fn from_str_is_case_insensitive_and_rejects_unknown() {
    assert_eq!("major".parse::<VersionType>().unwrap(), VersionType::Major);
    assert_eq!("TAX_DOCUMENT".parse::<DocumentType>().unwrap(), DocumentType::TaxDocument);
    match "FINAL".parse::<VersionType>() {
      Err(DomainError::Validation(_)) => (),
      other => panic!("expected validation error, got {:?}", other),
    }
  }

  #[test]
  fn security_levels_are_ordered() {
    assert!(SecurityLevel::Secret.rank() > SecurityLevel::Confidential.rank());
    assert_eq!(SecurityLevel::Public.rank(), 0);
  }
}
