use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::{info, instrument};

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to spawn {}: {source}", .binary.display())]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to kill host process: {0}")]
    Kill(#[source] std::io::Error),

    #[error("host process is not running")]
    NotRunning,

    #[error("host process already started (pid {0:?})")]
    AlreadyStarted(Option<u32>),
}

/// The container-host subprocess that serves the control plane.
#[async_trait]
pub trait HostProcess: Send {
    async fn start(&mut self) -> Result<(), ProcessError>;
    async fn kill(&mut self) -> Result<(), ProcessError>;
}

/// Launches the host executable as `<binary> --machineip <ip> --port <port>`.
///
/// Output goes straight to this process's stdout/stderr. The child is killed
/// if the handle is dropped without an explicit [`HostProcess::kill`].
#[derive(Debug)]
pub struct ContainerHost {
    binary: PathBuf,
    machine_ip: String,
    port: u16,
    child: Option<Child>,
}

impl ContainerHost {
    pub fn new(binary: impl Into<PathBuf>, machine_ip: impl Into<String>, port: u16) -> Self {
        Self {
            binary: binary.into(),
            machine_ip: machine_ip.into(),
            port,
            child: None,
        }
    }

    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .arg("--machineip")
            .arg(&self.machine_ip)
            .arg("--port")
            .arg(self.port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl HostProcess for ContainerHost {
    #[instrument(skip(self), fields(binary = %self.binary.display(), port = self.port))]
    async fn start(&mut self) -> Result<(), ProcessError> {
        if self.child.is_some() {
            return Err(ProcessError::AlreadyStarted(self.id()));
        }
        let child = self.command().spawn().map_err(|source| ProcessError::Spawn {
            binary: self.binary.clone(),
            source,
        })?;
        info!(pid = ?child.id(), "host process started");
        self.child = Some(child);
        Ok(())
    }

    #[instrument(skip(self), fields(binary = %self.binary.display()))]
    async fn kill(&mut self) -> Result<(), ProcessError> {
        let mut child = self.child.take().ok_or(ProcessError::NotRunning)?;
        let pid = child.id();
        child.kill().await.map_err(ProcessError::Kill)?;
        info!(?pid, "host process killed");
        Ok(())
    }
}
