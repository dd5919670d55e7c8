//! Shared fixtures: an in-process control plane and a scripted host process.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use containerizer_orchestrator::{HostProcess, OrchestratorConfig, ProcessError};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

/// One HTTP request the mock control plane received.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub method: String,
    pub path: String,
    pub body: Option<Value>,
}

impl Call {
    pub fn route(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

#[derive(Clone, Default)]
struct MockState {
    calls: Arc<Mutex<Vec<Call>>>,
    runs: Arc<Mutex<Vec<String>>>,
    failures: Arc<Mutex<HashMap<String, u16>>>,
    reset_runs: Arc<AtomicBool>,
}

/// Control plane bound to an ephemeral local port.
///
/// Every HTTP call answers `200` unless a failure status was registered for
/// its route. The run endpoint records the command, emits one stdout event
/// and then holds the connection until the client closes it.
#[derive(Clone)]
pub struct MockControlPlane {
    pub addr: SocketAddr,
    state: MockState,
}

impl MockControlPlane {
    pub async fn start() -> Self {
        let state = MockState::default();
        let app = Router::new()
            .route("/api/containers/:handle/run", get(run_endpoint))
            .fallback(record_call)
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    /// Answers `status` to `<method> <path>` from now on.
    pub fn fail(&self, method: &str, path: &str, status: u16) {
        self.state
            .failures
            .lock()
            .unwrap()
            .insert(format!("{method} {path}"), status);
    }

    /// Run connections are dropped without a close frame once the command arrives.
    pub fn reset_run_streams(&self) {
        self.state.reset_runs.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.calls.lock().unwrap().clone()
    }

    pub fn routes(&self) -> Vec<String> {
        self.calls().iter().map(Call::route).collect()
    }

    pub fn run_commands(&self) -> Vec<String> {
        self.state.runs.lock().unwrap().clone()
    }

    /// Polls until a run command arrives.
    pub async fn wait_for_run_command(&self) -> String {
        let poll = async {
            loop {
                if let Some(command) = self.run_commands().into_iter().next() {
                    return command;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), poll)
            .await
            .expect("run command not received")
    }
}

async fn record_call(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> StatusCode {
    let call = Call {
        method: method.to_string(),
        path: uri.path().to_string(),
        body: serde_json::from_slice(&body).ok(),
    };
    let route = call.route();
    state.calls.lock().unwrap().push(call);

    let status = state.failures.lock().unwrap().get(&route).copied();
    status
        .and_then(|code| StatusCode::from_u16(code).ok())
        .unwrap_or(StatusCode::OK)
}

async fn run_endpoint(ws: WebSocketUpgrade, State(state): State<MockState>) -> Response {
    ws.on_upgrade(move |socket| serve_run(socket, state))
}

async fn serve_run(mut socket: WebSocket, state: MockState) {
    if let Some(Ok(Message::Text(text))) = socket.recv().await {
        state.runs.lock().unwrap().push(text);
    }
    if state.reset_runs.load(Ordering::SeqCst) {
        drop(socket);
        return;
    }

    let event = json!({ "type": "stdout", "data": "Server listening on 8080\n" });
    if socket.send(Message::Text(event.to_string())).await.is_err() {
        return;
    }

    while let Some(Ok(message)) = socket.recv().await {
        if matches!(message, Message::Close(_)) {
            break;
        }
    }
}

/// Host process double that counts calls instead of spawning anything.
#[derive(Clone, Default)]
pub struct FakeHost {
    pub starts: Arc<AtomicUsize>,
    pub kills: Arc<AtomicUsize>,
    pub fail_start: bool,
    pub fail_kill: bool,
}

impl FakeHost {
    pub fn failing_start() -> Self {
        Self {
            fail_start: true,
            ..Default::default()
        }
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn kill_count(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HostProcess for FakeHost {
    async fn start(&mut self) -> Result<(), ProcessError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start {
            return Err(ProcessError::Spawn {
                binary: "containerizer.exe".into(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not installed"),
            });
        }
        Ok(())
    }

    async fn kill(&mut self) -> Result<(), ProcessError> {
        self.kills.fetch_add(1, Ordering::SeqCst);
        if self.fail_kill {
            return Err(ProcessError::Kill(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "access denied",
            )));
        }
        Ok(())
    }
}

pub fn config_for(addr: SocketAddr, install_root: &Path) -> OrchestratorConfig {
    OrchestratorConfig {
        control_plane_host: "127.0.0.1".to_string(),
        control_plane_port: addr.port(),
        install_root: install_root.to_path_buf(),
        request_timeout_secs: 5,
        handshake_timeout_secs: 5,
        ..Default::default()
    }
}

/// Lays out the runtime binary and application tree the stager copies from.
pub fn seed_install_root(root: &Path) {
    std::fs::write(root.join("hwc.exe"), b"runtime host").unwrap();
    let app = root.join("env").join("WebApiMemoryLimit");
    std::fs::create_dir_all(app.join("bin")).unwrap();
    std::fs::write(app.join("web.config"), b"<configuration/>").unwrap();
    std::fs::write(app.join("bin").join("WebApiMemoryLimit.dll"), b"app").unwrap();
}
