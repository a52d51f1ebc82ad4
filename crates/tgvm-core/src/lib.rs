//! Shared types for tgvm: the provisioning context, strict templates,
//! the error taxonomy and the run report.

pub mod config;
pub mod error;
pub mod report;
pub mod template;

pub use config::{ProvisionContext, SystemPaths};
pub use error::{AppError, ProvisionError, StepError, TemplateError};
pub use report::{ProvisionReport, StepOutcome, StepStatus};
