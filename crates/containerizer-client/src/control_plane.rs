use containerizer_common::{ContainerSpec, Handle, NetInRule};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::error::{ClientError, Result};

/// Path segments of the containers collection under the control-plane base URL.
pub const CONTAINERS_PATH: [&str; 2] = ["api", "containers"];

/// HTTP client for the control-plane container API.
///
/// One attempt per call; no retries. Every request is bounded by the timeout
/// the client was built with.
#[derive(Debug, Clone)]
pub struct ControlPlaneClient {
    client: Client,
    base_url: Url,
    timeout: Duration,
}

impl ControlPlaneClient {
    /// Client for `base_url` (e.g. `http://localhost:1788`).
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ClientError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(base_url.to_string()));
        }

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    pub fn for_host(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        Self::new(&format!("http://{host}:{port}"), timeout)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// `<base>/api/containers/<segments..>`
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(CONTAINERS_PATH)
            .extend(segments);
        Ok(url)
    }

    /// WebSocket URL of the run endpoint for `handle`.
    pub fn run_stream_url(&self, handle: &Handle) -> Result<Url> {
        let mut url = self.endpoint(&[handle.as_str(), "run"])?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| ClientError::InvalidUrl(format!("cannot use {scheme} for {url}")))?;
        Ok(url)
    }

    /// Sends one request and reduces the response to success or a classified failure.
    ///
    /// `Content-Type: application/json` is set only when a body is present.
    /// Only `200 OK` counts as success; any other status, including other 2xx
    /// codes, yields [`ClientError::ControlPlane`].
    #[instrument(skip(self, body))]
    pub async fn send<B>(&self, method: Method, segments: &[&str], body: Option<&B>) -> Result<()>
    where
        B: Serialize + ?Sized,
    {
        let url = self.endpoint(segments)?;
        debug!(%url, "sending control-plane request");

        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            let payload = serde_json::to_vec(body)?;
            request = request
                .header(CONTENT_TYPE, "application/json")
                .body(payload);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ClientError::Timeout(self.timeout)
            } else {
                ClientError::Transport(e)
            }
        })?;

        let status = response.status();
        if status != StatusCode::OK {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            warn!(%status, ?headers, %body, "control plane rejected request");
            return Err(ClientError::ControlPlane {
                status,
                headers,
                body,
            });
        }

        Ok(())
    }

    /// `POST /api/containers`
    pub async fn create_container(&self, spec: &ContainerSpec) -> Result<()> {
        self.send(Method::POST, &[], Some(spec)).await?;
        info!(handle = %spec.handle, "container created");
        Ok(())
    }

    /// `POST /api/containers/<handle>/net/in`
    pub async fn net_in(&self, handle: &Handle, rule: &NetInRule) -> Result<()> {
        self.send(Method::POST, &[handle.as_str(), "net", "in"], Some(rule))
            .await?;
        info!(
            %handle,
            host_port = rule.host_port,
            container_port = rule.container_port,
            "net-in rule set"
        );
        Ok(())
    }

    /// `POST /api/containers/<handle>/stop`
    pub async fn stop_container(&self, handle: &Handle) -> Result<()> {
        self.send::<()>(Method::POST, &[handle.as_str(), "stop"], None)
            .await?;
        info!(%handle, "container stopped");
        Ok(())
    }

    /// `DELETE /api/containers/<handle>`
    pub async fn delete_container(&self, handle: &Handle) -> Result<()> {
        self.send::<()>(Method::DELETE, &[handle.as_str()], None)
            .await?;
        info!(%handle, "container deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ControlPlaneClient {
        ControlPlaneClient::for_host("localhost", 1788, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_endpoint_paths() {
        let client = client();
        assert_eq!(
            client.endpoint(&[]).unwrap().as_str(),
            "http://localhost:1788/api/containers"
        );
        assert_eq!(
            client.endpoint(&["hwchandle", "net", "in"]).unwrap().as_str(),
            "http://localhost:1788/api/containers/hwchandle/net/in"
        );
    }

    #[test]
    fn test_handle_is_a_single_segment() {
        let url = client().endpoint(&["a/b"]).unwrap();
        assert_eq!(url.path(), "/api/containers/a%2Fb");
    }

    #[test]
    fn test_run_stream_url() {
        let url = client().run_stream_url(&Handle::from("hwchandle")).unwrap();
        assert_eq!(url.as_str(), "ws://localhost:1788/api/containers/hwchandle/run");
    }

    #[test]
    fn test_invalid_base_url() {
        let err = ControlPlaneClient::new("not a url", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ClientError::InvalidUrl(_)));
    }
}
