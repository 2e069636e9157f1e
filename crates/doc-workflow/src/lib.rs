//! doc-workflow: motor de versiones y aprobaciones
//!
//! Reúne el servicio de contenido, el Version Manager, el ledger de
//! aprobaciones, el fold del workflow y el `WorkflowEngine`, y los expone a
//! través de `DocumentService`. El estado de una instancia es siempre el
//! resultado de plegar su ledger sobre la plantilla.

pub mod config;
pub mod content;
pub mod engine;
pub mod events;
pub mod factory;
pub mod fold;
pub mod ledger;
pub mod roles;
pub mod service;
pub mod statistics;
pub mod versions;

pub use config::EngineConfig;
pub use content::ContentService;
pub use engine::WorkflowEngine;
pub use events::{WorkflowEvent, WorkflowEventBus};
pub use factory::DocflowFactory;
pub use fold::Transition;
pub use ledger::{ApprovalLedger, ChainVerification, GENESIS_HASH};
pub use roles::{RoleDirectory, StaticRoleDirectory};
pub use service::DocumentService;
pub use statistics::{VersioningStatistics, WorkflowStatistics};
pub use versions::{NewVersion, SignatureVerification, VersionManager};
