use containerizer_client::ClientError;
use std::fmt::Display;
use thiserror::Error;

use crate::host::ProcessError;
use crate::stager::StagingError;
use crate::state::LifecycleState;

/// Lifecycle step an error or teardown action belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    StartHost,
    CreateContainer,
    DeployApplication,
    ExposeNetwork,
    RunApplication,
    CloseStream,
    StopContainer,
    DeleteContainer,
    KillHost,
}

impl Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Operation::StartHost => "start host",
            Operation::CreateContainer => "create container",
            Operation::DeployApplication => "deploy application",
            Operation::ExposeNetwork => "expose network",
            Operation::RunApplication => "run application",
            Operation::CloseStream => "close run stream",
            Operation::StopContainer => "stop container",
            Operation::DeleteContainer => "delete container",
            Operation::KillHost => "kill host",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("{operation} failed: {source}")]
    Client {
        operation: Operation,
        #[source]
        source: ClientError,
    },

    #[error("{operation} failed: {source}")]
    Staging {
        operation: Operation,
        #[source]
        source: StagingError,
    },

    #[error("{operation} failed: {source}")]
    Process {
        operation: Operation,
        #[source]
        source: ProcessError,
    },

    #[error("cannot {operation} while container is {state}")]
    InvalidState {
        operation: Operation,
        state: LifecycleState,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn operation(&self) -> Option<Operation> {
        match self {
            Error::Client { operation, .. }
            | Error::Staging { operation, .. }
            | Error::Process { operation, .. }
            | Error::InvalidState { operation, .. } => Some(*operation),
            Error::Config(_) => None,
        }
    }

    /// HTTP status of a control-plane rejection, if that is what this is.
    pub fn control_plane_status(&self) -> Option<u16> {
        match self {
            Error::Client { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub(crate) fn client(operation: Operation) -> impl FnOnce(ClientError) -> Self {
        move |source| Error::Client { operation, source }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
