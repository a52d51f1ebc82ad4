//! Declarative host provisioning: an ordered plan of steps, one handler per
//! step kind, and the fail-fast executor that runs them.

pub mod executor;
pub mod handlers;
pub mod plan;
pub mod runner;
pub mod step;
pub mod templates;

#[cfg(test)]
mod fake;
#[cfg(test)]
mod tests;

pub use executor::{Provisioner, RunOptions};
pub use plan::{default_plan, verification_steps};
pub use runner::{CommandRunner, SystemRunner};
pub use step::{Step, StepKind};
