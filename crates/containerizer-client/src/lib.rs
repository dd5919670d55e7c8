//! Client side of the containerizer control plane.
//!
//! Two transports are covered:
//!
//! - [`ControlPlaneClient`] issues the synchronous lifecycle calls
//!   (create, net-in, stop, delete) against `http://<host>:<port>/api/containers`
//!   and treats exactly `200 OK` as success.
//! - [`ProcessStreamClient`] opens the `run` WebSocket, sends the single run
//!   command and hands back a [`ProcessStream`] whose background receive loop
//!   surfaces the process output as [`ProcessStreamEvent`]s.
//!
//! ```no_run
//! use containerizer_client::{ControlPlaneClient, ProcessStreamClient};
//! use containerizer_common::{Handle, ProcessSpec, ProcessStreamEvent};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), containerizer_client::ClientError> {
//! let client = ControlPlaneClient::for_host("localhost", 1788, Duration::from_secs(30))?;
//! let handle = Handle::from("hwchandle");
//! let url = client.run_stream_url(&handle)?;
//!
//! let streams = ProcessStreamClient::new("http://localhost", Duration::from_secs(30));
//! let mut stream = streams
//!     .run_stream(&url, &ProcessStreamEvent::run(ProcessSpec::default()))
//!     .await?;
//! if let Some(mut events) = stream.take_events() {
//!     while let Some(event) = events.recv().await {
//!         println!("{event}");
//!     }
//! }
//! stream.shutdown().await?;
//! # Ok(())
//! # }
//! ```

mod control_plane;
mod error;
mod stream;

pub use containerizer_common as common;
pub use containerizer_common::ProcessStreamEvent;
pub use control_plane::{ControlPlaneClient, CONTAINERS_PATH};
pub use error::{ClientError, Result};
pub use reqwest::Method;
pub use stream::{ProcessStream, ProcessStreamClient, StreamOutcome};
pub use tokio_util::sync::CancellationToken;
pub use url::Url;
