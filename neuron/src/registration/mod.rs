//! Subnet registration by proof of work.

pub mod config;
pub mod error;
pub mod orchestrator;

pub use config::RegistrationConfig;
pub use error::RegistrationError;
pub use orchestrator::{RegistrationOrchestrator, RegistrationReport, RegistrationResult};
