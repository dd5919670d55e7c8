use clap::{Parser, Subcommand};
use containerizer_orchestrator::{OrchestratorConfig, Result};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "containerizer-driver")]
#[command(author, version, long_about = None)]
#[command(about = "Run one container on a local containerizer host")]
pub struct Args {
    #[command(subcommand)]
    pub mode: Mode,

    /// YAML file with orchestrator settings; flags override its values
    #[arg(long, global = true, env = "CONTAINERIZER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding the host binary, the runtime binary and env/<application>
    #[arg(long, alias = "containerdir", global = true, env = "CONTAINERIZER_INSTALL_ROOT")]
    pub install_root: Option<PathBuf>,

    /// Machine IP passed to the host process
    #[arg(long, alias = "machineip", global = true, env = "CONTAINERIZER_MACHINE_IP")]
    pub machine_ip: Option<String>,

    /// Control-plane port the host process listens on
    #[arg(long, alias = "containerport", global = true, env = "CONTAINERIZER_PORT")]
    pub port: Option<u16>,

    /// Container handle
    #[arg(long, global = true, env = "CONTAINERIZER_HANDLE")]
    pub handle: Option<String>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Start the host and create the container, then hold until interrupted
    Emulate,
    /// Also deploy and run the application, streaming its output
    Run,
}

impl Args {
    /// File (or default) settings with command-line overrides applied.
    pub fn load_config(&self) -> Result<OrchestratorConfig> {
        let mut config = match &self.config {
            Some(path) => OrchestratorConfig::from_file(path)?,
            None => OrchestratorConfig::default(),
        };

        if let Some(install_root) = &self.install_root {
            config.install_root = install_root.clone();
        }
        if let Some(machine_ip) = &self.machine_ip {
            config.machine_ip = machine_ip.clone();
        }
        if let Some(port) = self.port {
            config.control_plane_port = port;
        }
        if let Some(handle) = &self.handle {
            config.handle = handle.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    // Built directly so CONTAINERIZER_* variables in the environment cannot leak in.
    fn args(mode: Mode) -> Args {
        Args {
            mode,
            config: None,
            install_root: None,
            machine_ip: None,
            port: None,
            handle: None,
        }
    }

    #[test]
    fn test_flags_are_parsed() {
        let args = Args::try_parse_from([
            "containerizer-driver",
            "run",
            "--install-root",
            "/opt/containerizer",
            "--port",
            "2000",
            "--handle",
            "web",
        ])
        .unwrap();
        assert_eq!(args.mode, Mode::Run);
        assert_eq!(args.install_root.as_deref(), Some(Path::new("/opt/containerizer")));
        assert_eq!(args.port, Some(2000));
        assert_eq!(args.handle.as_deref(), Some("web"));
    }

    #[test]
    fn test_legacy_flag_names() {
        let args = Args::try_parse_from([
            "containerizer-driver",
            "emulate",
            "--containerdir",
            "root",
            "--machineip",
            "10.0.0.5",
            "--containerport",
            "1789",
        ])
        .unwrap();
        assert_eq!(args.mode, Mode::Emulate);
        assert_eq!(args.install_root.as_deref(), Some(Path::new("root")));
        assert_eq!(args.machine_ip.as_deref(), Some("10.0.0.5"));
        assert_eq!(args.port, Some(1789));
    }

    #[test]
    fn test_flags_override_defaults() {
        let args = Args {
            install_root: Some("/opt/containerizer".into()),
            port: Some(2000),
            handle: Some("web".to_string()),
            ..args(Mode::Run)
        };
        let config = args.load_config().unwrap();
        assert_eq!(config.install_root, Path::new("/opt/containerizer"));
        assert_eq!(config.control_plane_port, 2000);
        assert_eq!(config.handle, "web");
        assert_eq!(config.machine_ip, ".");
    }

    #[test]
    fn test_config_file_then_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("containerizer.yaml");
        std::fs::write(&path, "handle: from-file\ncontrol_plane_port: 3000\n").unwrap();

        let args = Args {
            config: Some(path),
            port: Some(4000),
            ..args(Mode::Emulate)
        };
        let config = args.load_config().unwrap();
        assert_eq!(config.handle, "from-file");
        assert_eq!(config.control_plane_port, 4000);
    }

    #[test]
    fn test_zero_port_is_rejected() {
        let args = Args {
            port: Some(0),
            ..args(Mode::Emulate)
        };
        assert!(args.load_config().is_err());
    }

    #[test]
    fn test_mode_is_required() {
        assert!(Args::try_parse_from(["containerizer-driver"]).is_err());
    }
}
