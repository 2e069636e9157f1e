mod approval;
mod document;
mod document_version;
mod enums;
mod errors;
mod version_number;
mod workflow;

pub use approval::Approval;
pub use document::{Document, MAX_RETENTION_YEARS};
pub use document_version::{content_checksum, CompressionInfo, DocumentVersion, SignatureInfo, WatermarkInfo, MAIN_BRANCH};
pub use enums::{Decision, DocumentStatus, DocumentType, InstanceStatus, SecurityLevel, StepStatus, VersionStatus, VersionType};
pub use errors::DomainError;
pub use version_number::VersionNumber;
pub use workflow::{StepAction, StepCondition, StepDefinition, StepState, WorkflowInstance, WorkflowTemplate};
