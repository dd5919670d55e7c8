//! Lifecycle orchestration for a single containerizer container.
//!
//! An [`Orchestrator`] starts the host process, creates the container through
//! the control plane, stages the application payload, exposes the network and
//! runs the application over the run stream. [`Orchestrator::teardown`] walks
//! back whatever was reached.

mod config;
mod error;
mod host;
mod orchestrator;
mod stager;
mod state;

pub use containerizer_client as client;
pub use containerizer_common as common;

pub use config::OrchestratorConfig;
pub use error::{Error, Operation, Result};
pub use host::{ContainerHost, HostProcess, ProcessError};
pub use orchestrator::{Orchestrator, TeardownReport};
pub use stager::{namespace_for, PayloadStager, StagedPayload, StagingError};
pub use state::LifecycleState;
