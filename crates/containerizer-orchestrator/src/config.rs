use containerizer_common::{Handle, NetInRule, ResourceLimits};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Everything an [`Orchestrator`](crate::Orchestrator) needs to drive one container.
///
/// Missing fields in a YAML file fall back to [`Default`], which matches the
/// stock containerizer install.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub control_plane_host: String,
    pub control_plane_port: u16,
    /// Address the host process binds its machine interface to.
    pub machine_ip: String,
    pub install_root: PathBuf,
    /// Host-process executable, relative to `install_root` unless absolute.
    pub host_binary: String,
    /// In-container runtime host binary staged into the container namespace.
    pub runtime_binary: String,
    /// Application directory under `<install_root>/env`.
    pub application: String,
    pub handle: String,
    pub grace_period_secs: u64,
    pub limits: ResourceLimits,
    /// Container port to host port, sent as `ContainerPort:<port>` properties.
    pub port_properties: BTreeMap<u16, u16>,
    pub container_env: Option<Vec<String>>,
    pub net_in: Vec<NetInRule>,
    pub run_env: Vec<String>,
    pub app_root_flag: String,
    pub origin: String,
    pub request_timeout_secs: u64,
    pub handshake_timeout_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            control_plane_host: "localhost".to_string(),
            control_plane_port: 1788,
            machine_ip: ".".to_string(),
            install_root: default_install_root(),
            host_binary: "containerizer.exe".to_string(),
            runtime_binary: "hwc.exe".to_string(),
            application: "WebApiMemoryLimit".to_string(),
            handle: "hwchandle".to_string(),
            grace_period_secs: 300,
            limits: ResourceLimits::default(),
            port_properties: BTreeMap::from([(2222, 64061), (8080, 64055)]),
            container_env: None,
            net_in: vec![NetInRule {
                host_port: 64055,
                container_port: 1788,
            }],
            run_env: vec!["PORT=8080".to_string()],
            app_root_flag: "-appRootPath".to_string(),
            origin: "http://localhost".to_string(),
            request_timeout_secs: 30,
            handshake_timeout_secs: 30,
        }
    }
}

#[cfg(windows)]
fn default_install_root() -> PathBuf {
    PathBuf::from(r"C:\containerizer")
}

#[cfg(not(windows))]
fn default_install_root() -> PathBuf {
    PathBuf::from("/var/lib/containerizer")
}

impl OrchestratorConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| Error::Config(format!("invalid config: {e}")))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_yaml_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.handle.trim().is_empty() {
            return Err(Error::Config("handle must not be empty".to_string()));
        }
        if self.control_plane_host.trim().is_empty() {
            return Err(Error::Config("control plane host must not be empty".to_string()));
        }
        if self.control_plane_port == 0 {
            return Err(Error::Config("control plane port must not be 0".to_string()));
        }
        if self.request_timeout_secs == 0 || self.handshake_timeout_secs == 0 {
            return Err(Error::Config("timeouts must be at least one second".to_string()));
        }
        if self.runtime_binary.is_empty() || self.application.is_empty() {
            return Err(Error::Config(
                "runtime binary and application names are required".to_string(),
            ));
        }
        Ok(())
    }

    pub fn handle(&self) -> Handle {
        Handle::new(self.handle.clone())
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn host_binary_path(&self) -> PathBuf {
        let binary = Path::new(&self.host_binary);
        if binary.is_absolute() {
            binary.to_path_buf()
        } else {
            self.install_root.join(binary)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_stock_install() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.control_plane_port, 1788);
        assert_eq!(config.handle, "hwchandle");
        assert_eq!(config.grace_period(), Duration::from_secs(300));
        assert_eq!(config.limits.cpu_shares, 9999);
        assert_eq!(config.port_properties.get(&8080), Some(&64055));
        assert_eq!(config.net_in[0].host_port, 64055);
        assert_eq!(config.run_env, vec!["PORT=8080".to_string()]);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = OrchestratorConfig::from_yaml_str(
            r#"
handle: other
control_plane_port: 9000
limits:
  disk_bytes: 1073741824
net_in:
  - host_port: 1
    container_port: 2
"#,
        )
        .unwrap();

        assert_eq!(config.handle, "other");
        assert_eq!(config.control_plane_port, 9000);
        assert_eq!(config.limits.disk_bytes, 1_073_741_824);
        assert_eq!(config.limits.memory_bytes, 1_073_741_824);
        assert_eq!(config.net_in.len(), 1);
        assert_eq!(config.net_in[0].container_port, 2);
        assert_eq!(config.origin, "http://localhost");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let empty_handle = OrchestratorConfig {
            handle: String::new(),
            ..Default::default()
        };
        assert!(matches!(empty_handle.validate(), Err(Error::Config(_))));

        let zero_port = OrchestratorConfig {
            control_plane_port: 0,
            ..Default::default()
        };
        assert!(zero_port.validate().is_err());

        let zero_timeout = OrchestratorConfig {
            handshake_timeout_secs: 0,
            ..Default::default()
        };
        assert!(zero_timeout.validate().is_err());
    }

    #[test]
    fn test_host_binary_path_is_relative_to_install_root() {
        let config = OrchestratorConfig {
            install_root: PathBuf::from("root"),
            ..Default::default()
        };
        assert_eq!(config.host_binary_path(), Path::new("root").join("containerizer.exe"));
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(matches!(
            OrchestratorConfig::from_yaml_str("handle: [unclosed"),
            Err(Error::Config(_))
        ));
    }
}
