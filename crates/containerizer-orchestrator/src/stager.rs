use containerizer_common::Handle;
use sha1::{Digest, Sha1};
use std::fmt::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, instrument};

use crate::config::OrchestratorConfig;

/// Bytes of the handle digest used for the namespace directory name.
const NAMESPACE_BYTES: usize = 9;

#[derive(Error, Debug)]
pub enum StagingError {
    #[error("staging source not found: {}", .0.display())]
    MissingSource(PathBuf),

    #[error("expected a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StagingError {
    fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| StagingError::Io { path, source }
    }
}

/// Per-container directory name: the first nine bytes of SHA-1(handle) in uppercase hex.
pub fn namespace_for(handle: &Handle) -> String {
    let digest = Sha1::digest(handle.as_str().as_bytes());
    digest[..NAMESPACE_BYTES]
        .iter()
        .fold(String::with_capacity(NAMESPACE_BYTES * 2), |mut out, byte| {
            let _ = write!(out, "{byte:02X}");
            out
        })
}

/// Paths the run command refers to once deployment has finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedPayload {
    pub exec_path: PathBuf,
    pub app_path: PathBuf,
}

/// Copies the runtime host binary and the application tree into a handle's namespace.
///
/// Sources live under the install root (`<root>/<binary>`, `<root>/env/<app>`);
/// targets are `<root>/<namespace>/bin/<binary>` and `<root>/<namespace>/user/<app>`.
/// A failed copy is left in place.
#[derive(Debug, Clone)]
pub struct PayloadStager {
    install_root: PathBuf,
    runtime_binary: String,
    application: String,
}

impl PayloadStager {
    pub fn new(
        install_root: impl Into<PathBuf>,
        runtime_binary: impl Into<String>,
        application: impl Into<String>,
    ) -> Self {
        Self {
            install_root: install_root.into(),
            runtime_binary: runtime_binary.into(),
            application: application.into(),
        }
    }

    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self::new(
            config.install_root.clone(),
            config.runtime_binary.clone(),
            config.application.clone(),
        )
    }

    pub fn source_binary(&self) -> PathBuf {
        self.install_root.join(&self.runtime_binary)
    }

    pub fn source_application(&self) -> PathBuf {
        self.install_root.join("env").join(&self.application)
    }

    /// Target paths for `handle`, without touching the file system.
    pub fn layout(&self, handle: &Handle) -> StagedPayload {
        let namespace = self.install_root.join(namespace_for(handle));
        StagedPayload {
            exec_path: namespace.join("bin").join(&self.runtime_binary),
            app_path: namespace.join("user").join(&self.application),
        }
    }

    #[instrument(skip(self), fields(root = %self.install_root.display()))]
    pub async fn stage(&self, handle: &Handle) -> Result<StagedPayload, StagingError> {
        let source_binary = self.source_binary();
        let source_app = self.source_application();
        let staged = self.layout(handle);

        let binary_meta = metadata(&source_binary).await?;
        if binary_meta.is_dir() {
            return Err(StagingError::MissingSource(source_binary));
        }
        if !metadata(&source_app).await?.is_dir() {
            return Err(StagingError::NotADirectory(source_app));
        }

        copy_file(&source_binary, &staged.exec_path).await?;
        let files = copy_dir(&source_app, &staged.app_path).await?;

        info!(
            exec_path = %staged.exec_path.display(),
            app_path = %staged.app_path.display(),
            files,
            "payload staged"
        );
        Ok(staged)
    }
}

async fn metadata(path: &Path) -> Result<std::fs::Metadata, StagingError> {
    match fs::metadata(path).await {
        Ok(meta) => Ok(meta),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(StagingError::MissingSource(path.to_path_buf()))
        }
        Err(e) => Err(StagingError::io(path)(e)),
    }
}

async fn copy_file(src: &Path, dst: &Path) -> Result<(), StagingError> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(StagingError::io(parent))?;
    }
    fs::copy(src, dst).await.map_err(StagingError::io(dst))?;
    debug!(src = %src.display(), dst = %dst.display(), "copied");
    Ok(())
}

/// Copies the tree under `src` into `dst`, returning the number of files written.
async fn copy_dir(src: &Path, dst: &Path) -> Result<usize, StagingError> {
    let mut files = 0;
    let mut pending = vec![(src.to_path_buf(), dst.to_path_buf())];

    while let Some((from, to)) = pending.pop() {
        fs::create_dir_all(&to).await.map_err(StagingError::io(&to))?;

        let mut entries = fs::read_dir(&from).await.map_err(StagingError::io(&from))?;
        while let Some(entry) = entries.next_entry().await.map_err(StagingError::io(&from))? {
            let src_path = entry.path();
            let dst_path = to.join(entry.file_name());

            let file_type = entry.file_type().await.map_err(StagingError::io(&src_path))?;
            if file_type.is_dir() {
                pending.push((src_path, dst_path));
            } else {
                fs::copy(&src_path, &dst_path)
                    .await
                    .map_err(StagingError::io(&dst_path))?;
                files += 1;
            }
        }
    }

    Ok(files)
}
