// Wire envelopes shared by the control-plane client and the orchestrator.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::time::Duration;

pub use serde::{Deserialize, Serialize};

/// Message type of the single outbound command on a run stream.
pub const RUN_MESSAGE_TYPE: &str = "run";

/// Message type assigned to inbound text that is not a JSON event.
pub const RAW_MESSAGE_TYPE: &str = "raw";

/// Opaque identifier naming one container to the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(String);

impl Handle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Handle {
    fn from(handle: &str) -> Self {
        Self::new(handle)
    }
}

impl From<String> for Handle {
    fn from(handle: String) -> Self {
        Self(handle)
    }
}

/// Resource ceilings applied when a container is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    pub cpu_shares: u32,
    pub disk_bytes: u64,
    pub memory_bytes: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            cpu_shares: 9999,
            disk_bytes: 2_073_741_824,
            memory_bytes: 1_073_741_824,
        }
    }
}

/// Body of `POST /api/containers`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub handle: Handle,
    /// Nanoseconds.
    pub grace_time: i64,
    #[serde(rename = "Properties")]
    pub properties: BTreeMap<String, String>,
    #[serde(rename = "Env")]
    pub env: Option<Vec<String>>,
    #[serde(rename = "Limits")]
    pub limits: Limits,
    pub bind_mounts: BindMounts,
}

impl ContainerSpec {
    pub fn new(handle: Handle, grace_period: Duration, limits: ResourceLimits) -> Self {
        Self {
            handle,
            grace_time: i64::try_from(grace_period.as_nanos()).unwrap_or(i64::MAX),
            properties: BTreeMap::new(),
            env: None,
            limits: limits.into(),
            bind_mounts: BindMounts::default(),
        }
    }

    /// Adds a `ContainerPort:<p>` property for each container port to host port mapping.
    pub fn with_port_properties(mut self, ports: &BTreeMap<u16, u16>) -> Self {
        for (container_port, host_port) in ports {
            self.properties
                .insert(format!("ContainerPort:{container_port}"), host_port.to_string());
        }
        self
    }

    pub fn with_env(mut self, env: Option<Vec<String>>) -> Self {
        self.env = env;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    pub cpu_limits: CpuLimits,
    pub disk_limits: DiskLimits,
    pub memory_limits: MemoryLimits,
}

impl From<ResourceLimits> for Limits {
    fn from(limits: ResourceLimits) -> Self {
        Self {
            cpu_limits: CpuLimits {
                limit_in_shares: limits.cpu_shares,
            },
            disk_limits: DiskLimits {
                byte_hard: limits.disk_bytes,
            },
            memory_limits: MemoryLimits {
                limit_in_bytes: limits.memory_bytes,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuLimits {
    pub limit_in_shares: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskLimits {
    pub byte_hard: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryLimits {
    pub limit_in_bytes: u64,
}

/// Placeholder sent with every creation request; the control plane expects the key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindMounts {
    #[serde(rename = "src_path")]
    pub source_path: String,
    #[serde(rename = "des_path")]
    pub destination_path: String,
}

/// Body of `POST /api/containers/<handle>/net/in`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetInRule {
    #[serde(rename = "hostPort", alias = "host_port")]
    pub host_port: u32,
    #[serde(rename = "containerPort", alias = "container_port")]
    pub container_port: u32,
}

/// Process launched inside the container by a run command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSpec {
    pub path: String,
    pub args: Vec<String>,
    pub env: Vec<String>,
}

/// One message on the run WebSocket.
///
/// Outbound, only the run command is ever sent: `{"type":"run","pspec":{..}}`.
/// Inbound messages carry `{"type":..,"data":..}` where `data` is captured
/// process output and is not interpreted further.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStreamEvent {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(rename = "pspec", default, skip_serializing_if = "Option::is_none")]
    pub process_spec: Option<ProcessSpec>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data: String,
}

impl ProcessStreamEvent {
    pub fn run(spec: ProcessSpec) -> Self {
        Self {
            message_type: RUN_MESSAGE_TYPE.to_string(),
            process_spec: Some(spec),
            data: String::new(),
        }
    }

    pub fn is_run(&self) -> bool {
        self.message_type == RUN_MESSAGE_TYPE && self.process_spec.is_some()
    }

    /// Parses an inbound text frame. Text that is not an event is kept verbatim.
    pub fn from_text(text: &str) -> Self {
        serde_json::from_str(text).unwrap_or_else(|_| Self {
            message_type: RAW_MESSAGE_TYPE.to_string(),
            process_spec: None,
            data: text.to_string(),
        })
    }

    /// Wraps a binary frame as a `raw` event. Returns `true` in the second
    /// slot when the bytes were not UTF-8 and invalid sequences were replaced.
    pub fn from_binary(bytes: &[u8]) -> (Self, bool) {
        let data = String::from_utf8_lossy(bytes);
        let lossy = matches!(data, std::borrow::Cow::Owned(_));
        let event = Self {
            message_type: RAW_MESSAGE_TYPE.to_string(),
            process_spec: None,
            data: data.into_owned(),
        };
        (event, lossy)
    }
}

impl Display for ProcessStreamEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.message_type, self.data)
    }
}
