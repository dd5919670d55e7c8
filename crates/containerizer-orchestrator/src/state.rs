use std::fmt::Display;

/// Lifecycle of the single container an [`Orchestrator`](crate::Orchestrator) owns.
///
/// `Idle -> HostStarted -> Created -> Deployed -> Running`, with `Stopped`
/// reachable from any of them through teardown. The state is one value; what
/// teardown has to undo is derived from it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    #[default]
    Idle,
    HostStarted,
    Created,
    Deployed,
    Running,
    Stopped,
}

impl LifecycleState {
    /// The host process was launched and has not been torn down.
    pub fn host_started(self) -> bool {
        !matches!(self, LifecycleState::Idle | LifecycleState::Stopped)
    }

    /// The control plane accepted the container and it has not been torn down.
    pub fn container_created(self) -> bool {
        matches!(
            self,
            LifecycleState::Created | LifecycleState::Deployed | LifecycleState::Running
        )
    }

    pub fn is_terminal(self) -> bool {
        self == LifecycleState::Stopped
    }
}

impl Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LifecycleState::Idle => "idle",
            LifecycleState::HostStarted => "host-started",
            LifecycleState::Created => "created",
            LifecycleState::Deployed => "deployed",
            LifecycleState::Running => "running",
            LifecycleState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}
