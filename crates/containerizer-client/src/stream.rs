use containerizer_common::ProcessStreamEvent;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::ORIGIN;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::error::{ClientError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How a receive loop ended without a transport error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The peer closed the connection.
    Closed,
    /// The loop was cancelled locally.
    Cancelled,
}

/// Opens run streams against the control plane.
#[derive(Debug, Clone)]
pub struct ProcessStreamClient {
    origin: String,
    handshake_timeout: Duration,
}

impl ProcessStreamClient {
    pub fn new(origin: impl Into<String>, handshake_timeout: Duration) -> Self {
        Self {
            origin: origin.into(),
            handshake_timeout,
        }
    }

    /// Connects to `url`, starts the receive loop and sends `command` as one text message.
    ///
    /// The receive loop is running before the command is written, so no output
    /// produced in response to it can be missed.
    #[instrument(skip(self, url, command), fields(url = %url))]
    pub async fn run_stream(
        &self,
        url: &Url,
        command: &ProcessStreamEvent,
    ) -> Result<ProcessStream> {
        let payload = serde_json::to_string(command)?;

        let mut request = url.as_str().into_client_request()?;
        let origin = HeaderValue::from_str(&self.origin)
            .map_err(|e| ClientError::Stream(format!("invalid origin {:?}: {e}", self.origin)))?;
        request.headers_mut().insert(ORIGIN, origin);

        let (socket, response) =
            tokio::time::timeout(self.handshake_timeout, connect_async(request))
                .await
                .map_err(|_| ClientError::Timeout(self.handshake_timeout))??;
        debug!(status = %response.status(), "run stream connected");

        let (mut writer, reader) = socket.split();
        let cancel = CancellationToken::new();
        let closed = CancellationToken::new();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(receive_loop(reader, events_tx, cancel.clone(), closed.clone()));

        if let Err(e) = writer.send(Message::Text(payload)).await {
            cancel.cancel();
            task.abort();
            return Err(ClientError::Stream(format!("failed to send run command: {e}")));
        }
        info!("run command sent");

        Ok(ProcessStream {
            writer,
            cancel,
            closed,
            task: Some(task),
            events: Some(events_rx),
        })
    }
}

/// An open run stream and its background receive loop.
///
/// Dropping the stream cancels the loop.
pub struct ProcessStream {
    writer: SplitSink<WsStream, Message>,
    cancel: CancellationToken,
    closed: CancellationToken,
    task: Option<JoinHandle<Result<StreamOutcome>>>,
    events: Option<mpsc::UnboundedReceiver<ProcessStreamEvent>>,
}

impl ProcessStream {
    /// Receiver of inbound events, in the order the peer sent them. Available once.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<ProcessStreamEvent>> {
        self.events.take()
    }

    /// Token that stops the receive loop when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the receive loop has ended, for whatever reason.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    /// Waits for the peer to end the stream.
    pub async fn wait(mut self) -> Result<StreamOutcome> {
        self.join().await
    }

    /// Cancels the receive loop, sends a close frame and reports how the loop ended.
    ///
    /// If the loop had already ended, its original outcome is returned.
    pub async fn shutdown(mut self) -> Result<StreamOutcome> {
        self.cancel.cancel();
        if !self.closed.is_cancelled() {
            if let Err(e) = self.writer.send(Message::Close(None)).await {
                debug!(error = %e, "close frame not sent");
            }
        }
        self.join().await
    }

    async fn join(&mut self) -> Result<StreamOutcome> {
        match self.task.take() {
            Some(task) => task
                .await
                .map_err(|e| ClientError::Stream(format!("receive loop aborted: {e}")))?,
            None => Ok(StreamOutcome::Cancelled),
        }
    }
}

impl Drop for ProcessStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn receive_loop(
    mut reader: SplitStream<WsStream>,
    events: mpsc::UnboundedSender<ProcessStreamEvent>,
    cancel: CancellationToken,
    closed: CancellationToken,
) -> Result<StreamOutcome> {
    let _closed = closed.drop_guard();

    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("run stream cancelled");
                return Ok(StreamOutcome::Cancelled);
            }
            message = reader.next() => message,
        };

        let event = match message {
            Some(Ok(Message::Text(text))) => ProcessStreamEvent::from_text(&text),
            Some(Ok(Message::Binary(bytes))) => {
                let (event, lossy) = ProcessStreamEvent::from_binary(&bytes);
                if lossy {
                    warn!(len = bytes.len(), "binary frame is not UTF-8, invalid bytes replaced");
                }
                event
            }
            Some(Ok(Message::Close(frame))) => {
                info!(?frame, "run stream closed by peer");
                return Ok(StreamOutcome::Closed);
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                error!(error = %e, "run stream read failed");
                return Err(ClientError::Stream(e.to_string()));
            }
            None => return Ok(StreamOutcome::Closed),
        };

        info!(event_type = %event.message_type, data = %event.data, "ws recv");
        // The receiver is optional; output is still logged when nobody listens.
        let _ = events.send(event);
    }
}
