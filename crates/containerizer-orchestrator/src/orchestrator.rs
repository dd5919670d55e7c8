use containerizer_client::{
    ControlPlaneClient, ProcessStream, ProcessStreamClient, ProcessStreamEvent,
};
use containerizer_common::{ContainerSpec, Handle, ProcessSpec};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::config::OrchestratorConfig;
use crate::error::{Error, Operation, Result};
use crate::host::{ContainerHost, HostProcess};
use crate::stager::{PayloadStager, StagedPayload};
use crate::state::LifecycleState;

/// What a call to [`Orchestrator::teardown`] did.
#[derive(Debug, Default)]
pub struct TeardownReport {
    /// Steps attempted, in order.
    pub attempted: Vec<Operation>,
    /// Steps that failed. A failure never stops the following steps.
    pub failures: Vec<Error>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Nothing had to be undone.
    pub fn is_noop(&self) -> bool {
        self.attempted.is_empty()
    }

    fn record(&mut self, error: Error) {
        warn!(operation = ?error.operation(), error = %error, "teardown step failed");
        self.failures.push(error);
    }
}

/// Drives one container through its lifecycle against the control plane.
///
/// Every operation checks the current [`LifecycleState`] first and fails with
/// [`Error::InvalidState`] when called out of order. A failed operation leaves
/// the state where it was. [`teardown`](Self::teardown) undoes exactly what
/// the current state says was done, and is safe to call more than once.
pub struct Orchestrator {
    config: OrchestratorConfig,
    handle: Handle,
    control_plane: ControlPlaneClient,
    streams: ProcessStreamClient,
    stager: PayloadStager,
    host: Box<dyn HostProcess>,
    state: LifecycleState,
    payload: Option<StagedPayload>,
    stream: Option<ProcessStream>,
}

impl Orchestrator {
    /// Orchestrator that launches the host executable named by `config`.
    pub fn new(config: OrchestratorConfig) -> Result<Self> {
        let host = ContainerHost::new(
            config.host_binary_path(),
            config.machine_ip.clone(),
            config.control_plane_port,
        );
        Self::with_host(config, Box::new(host))
    }

    pub fn with_host(config: OrchestratorConfig, host: Box<dyn HostProcess>) -> Result<Self> {
        config.validate()?;

        let control_plane = ControlPlaneClient::for_host(
            &config.control_plane_host,
            config.control_plane_port,
            config.request_timeout(),
        )
        .map_err(|e| Error::Config(format!("control plane client: {e}")))?;
        let streams = ProcessStreamClient::new(config.origin.clone(), config.handshake_timeout());

        Ok(Self {
            handle: config.handle(),
            stager: PayloadStager::from_config(&config),
            config,
            control_plane,
            streams,
            host,
            state: LifecycleState::Idle,
            payload: None,
            stream: None,
        })
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn staged_payload(&self) -> Option<&StagedPayload> {
        self.payload.as_ref()
    }

    /// Output of the running application, available once per run.
    pub fn take_output(&mut self) -> Option<mpsc::UnboundedReceiver<ProcessStreamEvent>> {
        self.stream.as_mut().and_then(ProcessStream::take_events)
    }

    /// Resolves when the run stream's receive loop ends. Never resolves without a stream.
    pub async fn stream_closed(&self) {
        match &self.stream {
            Some(stream) => stream.closed().await,
            None => std::future::pending().await,
        }
    }

    pub fn stream_finished(&self) -> bool {
        self.stream.as_ref().is_some_and(ProcessStream::is_finished)
    }

    fn require(
        &self,
        operation: Operation,
        allowed: impl Fn(LifecycleState) -> bool,
    ) -> Result<()> {
        if allowed(self.state) {
            Ok(())
        } else {
            Err(Error::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    #[instrument(skip(self), fields(handle = %self.handle))]
    pub async fn start_host(&mut self) -> Result<()> {
        self.require(Operation::StartHost, |s| s == LifecycleState::Idle)?;
        self.host
            .start()
            .await
            .map_err(|source| Error::Process {
                operation: Operation::StartHost,
                source,
            })?;
        self.state = LifecycleState::HostStarted;
        Ok(())
    }

    #[instrument(skip(self), fields(handle = %self.handle))]
    pub async fn create_container(&mut self) -> Result<()> {
        self.require(Operation::CreateContainer, |s| s == LifecycleState::HostStarted)?;

        let spec = ContainerSpec::new(
            self.handle.clone(),
            self.config.grace_period(),
            self.config.limits,
        )
        .with_port_properties(&self.config.port_properties)
        .with_env(self.config.container_env.clone());

        self.control_plane
            .create_container(&spec)
            .await
            .map_err(Error::client(Operation::CreateContainer))?;
        self.state = LifecycleState::Created;
        Ok(())
    }

    #[instrument(skip(self), fields(handle = %self.handle))]
    pub async fn deploy_application(&mut self) -> Result<()> {
        self.require(Operation::DeployApplication, |s| s == LifecycleState::Created)?;

        let payload = self
            .stager
            .stage(&self.handle)
            .await
            .map_err(|source| Error::Staging {
                operation: Operation::DeployApplication,
                source,
            })?;
        self.payload = Some(payload);
        self.state = LifecycleState::Deployed;
        Ok(())
    }

    /// Applies every configured net-in rule, in order.
    #[instrument(skip(self), fields(handle = %self.handle))]
    pub async fn expose_network(&mut self) -> Result<()> {
        self.require(Operation::ExposeNetwork, |s| {
            matches!(s, LifecycleState::Created | LifecycleState::Deployed)
        })?;

        for rule in &self.config.net_in {
            self.control_plane
                .net_in(&self.handle, rule)
                .await
                .map_err(Error::client(Operation::ExposeNetwork))?;
        }
        Ok(())
    }

    /// Exposes the network, then opens the run stream with the staged payload.
    #[instrument(skip(self), fields(handle = %self.handle))]
    pub async fn run_application(&mut self) -> Result<()> {
        let operation = Operation::RunApplication;
        self.require(operation, |s| s == LifecycleState::Deployed)?;
        let payload = self.payload.clone().ok_or(Error::InvalidState {
            operation,
            state: self.state,
        })?;

        self.expose_network().await?;

        let url = self
            .control_plane
            .run_stream_url(&self.handle)
            .map_err(Error::client(operation))?;
        let command = ProcessStreamEvent::run(ProcessSpec {
            path: payload.exec_path.to_string_lossy().into_owned(),
            args: vec![
                self.config.app_root_flag.clone(),
                payload.app_path.to_string_lossy().into_owned(),
            ],
            env: self.config.run_env.clone(),
        });

        let stream = self
            .streams
            .run_stream(&url, &command)
            .await
            .map_err(Error::client(operation))?;
        self.stream = Some(stream);
        self.state = LifecycleState::Running;
        info!("application running");
        Ok(())
    }

    /// Asks the control plane to stop the container. State is left to [`teardown`](Self::teardown).
    #[instrument(skip(self), fields(handle = %self.handle))]
    pub async fn stop_container(&self) -> Result<()> {
        self.require(Operation::StopContainer, LifecycleState::container_created)?;
        self.control_plane
            .stop_container(&self.handle)
            .await
            .map_err(Error::client(Operation::StopContainer))
    }

    #[instrument(skip(self), fields(handle = %self.handle))]
    pub async fn delete_container(&self) -> Result<()> {
        self.require(Operation::DeleteContainer, LifecycleState::container_created)?;
        self.control_plane
            .delete_container(&self.handle)
            .await
            .map_err(Error::client(Operation::DeleteContainer))
    }

    /// Undoes whatever the current state says was done, best effort.
    ///
    /// Order: close the run stream, stop then delete the container if it was
    /// created, kill the host if it was started. The state ends `Stopped`;
    /// calling again returns an empty report without touching anything.
    #[instrument(skip(self), fields(handle = %self.handle, state = %self.state))]
    pub async fn teardown(&mut self) -> TeardownReport {
        let mut report = TeardownReport::default();
        let state = self.state;
        if state.is_terminal() {
            debug!("already torn down");
            return report;
        }

        if let Some(stream) = self.stream.take() {
            report.attempted.push(Operation::CloseStream);
            match stream.shutdown().await {
                Ok(outcome) => debug!(?outcome, "run stream closed"),
                Err(source) => report.record(Error::Client {
                    operation: Operation::CloseStream,
                    source,
                }),
            }
        }

        if state.container_created() {
            report.attempted.push(Operation::StopContainer);
            if let Err(e) = self.stop_container().await {
                report.record(e);
            }
            report.attempted.push(Operation::DeleteContainer);
            if let Err(e) = self.delete_container().await {
                report.record(e);
            }
        }

        if state.host_started() {
            report.attempted.push(Operation::KillHost);
            if let Err(source) = self.host.kill().await {
                report.record(Error::Process {
                    operation: Operation::KillHost,
                    source,
                });
            }
        }

        self.state = LifecycleState::Stopped;
        self.payload = None;
        info!(
            steps = report.attempted.len(),
            failures = report.failures.len(),
            "teardown finished"
        );
        report
    }
}
