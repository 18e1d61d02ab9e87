//! Request dispatcher: one read loop, one writer task, a task per request.
//!
//! The read loop owns the handshake state. Once the connection is `Ready`,
//! each request is handed to its own tokio task and the loop goes straight
//! back to reading, so a slow script never blocks a fast one. Responses go
//! to the writer task over a channel and are written in completion order.

use std::panic::AssertUnwindSafe;
use std::time::Instant;

use anyhow::Context as _;
use futures::FutureExt as _;
use serde_json::json;
use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, BufReader};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::Instrument as _;

use super::ScriptServer;
use crate::jsonrpc::{
    FrameReader, FrameWriter, Message, Notification, Request, Response, RpcError,
};

/// Supported protocol versions, newest first.
pub const PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

/// Outbound messages queued ahead of the writer.
const OUTBOUND_CAPACITY: usize = 64;

/// Handshake progress for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    AwaitingInitialize,
    AwaitingInitialized,
    Ready,
    Closed,
}

/// Run a connection to completion.
///
/// Returns once the input is exhausted and every in-flight request has been
/// answered, or as soon as either side of the stream fails.
pub(crate) async fn serve<R, W>(server: ScriptServer, reader: R, writer: W) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let cancel = CancellationToken::new();
    let (outbound, queue) = mpsc::channel(OUTBOUND_CAPACITY);
    let writer_task = tokio::spawn(write_loop(FrameWriter::new(writer), queue, cancel.clone()));

    let mut dispatcher = Dispatcher::new(server, outbound);
    let mut frames = FrameReader::new(BufReader::new(reader));
    let read_result = dispatcher.read_loop(&mut frames, &cancel).await;
    dispatcher.drain(&cancel).await;
    // Last sender gone: the writer flushes what is queued and stops.
    drop(dispatcher);

    let write_result = writer_task.await.context("Writer task failed")?;
    read_result?;
    write_result
}

async fn write_loop<W>(
    mut writer: FrameWriter<W>,
    mut queue: mpsc::Receiver<Message>,
    cancel: CancellationToken,
) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = queue.recv().await {
        if let Err(e) = writer.write_message(&message).await {
            tracing::error!(error = %e, "output stream failed");
            cancel.cancel();
            return Err(e).context("Failed to write response");
        }
    }
    writer.shutdown().await.context("Failed to flush output")
}

struct Dispatcher {
    server: ScriptServer,
    state: ConnectionState,
    outbound: mpsc::Sender<Message>,
    in_flight: JoinSet<()>,
}

impl Dispatcher {
    fn new(server: ScriptServer, outbound: mpsc::Sender<Message>) -> Self {
        Self {
            server,
            state: ConnectionState::AwaitingInitialize,
            outbound,
            in_flight: JoinSet::new(),
        }
    }

    async fn read_loop<R>(
        &mut self,
        frames: &mut FrameReader<R>,
        cancel: &CancellationToken,
    ) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    tracing::debug!("read loop cancelled");
                    return Ok(());
                }

                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    reap(joined);
                }

                frame = frames.read_message() => match frame {
                    Ok(Some(message)) => self.dispatch(message).await,
                    Ok(None) => {
                        tracing::info!(in_flight = self.in_flight.len(), "input closed");
                        return Ok(());
                    }
                    Err(e) if e.is_fatal() => {
                        return Err(e).context("Failed to read request");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "rejected inbound frame");
                        if let Some(response) = e.to_response() {
                            self.send(response.into()).await;
                        }
                    }
                },
            }
        }
    }

    /// Wait for in-flight requests. Aborts them if the output is gone.
    async fn drain(&mut self, cancel: &CancellationToken) {
        self.state = ConnectionState::Closed;
        let mut aborted = false;
        loop {
            tokio::select! {
                _ = cancel.cancelled(), if !aborted => {
                    tracing::debug!(in_flight = self.in_flight.len(), "aborting in-flight requests");
                    self.in_flight.abort_all();
                    aborted = true;
                }
                joined = self.in_flight.join_next() => match joined {
                    Some(joined) => reap(joined),
                    None => break,
                },
            }
        }
    }

    async fn dispatch(&mut self, message: Message) {
        match message {
            Message::Request(request) => self.on_request(request).await,
            Message::Notification(notification) => self.on_notification(notification),
            Message::Response(response) => {
                tracing::debug!(id = ?response.id, "dropping unsolicited response");
            }
        }
    }

    async fn on_request(&mut self, request: Request) {
        use ConnectionState::*;

        let method = request.method.clone();
        match (self.state, method.as_str()) {
            (_, "ping") => {
                self.send(Response::success(request.id, json!({})).into()).await;
            }
            (AwaitingInitialize, "initialize") => {
                let result = self.server.initialize_result(&request.params);
                tracing::info!(
                    protocol = %result["protocolVersion"],
                    client = %request.params.get("clientInfo").unwrap_or(&serde_json::Value::Null),
                    "initialize"
                );
                self.state = AwaitingInitialized;
                self.send(Response::success(request.id, result).into()).await;
            }
            (_, "initialize") => {
                let error = RpcError::invalid_request("server already initialized");
                self.send(Response::error(Some(request.id), error).into()).await;
            }
            (Ready, _) => self.spawn_request(request),
            (state, method) => {
                tracing::warn!(method, ?state, "request before initialization");
                self.send(Response::error(Some(request.id), RpcError::not_initialized()).into())
                    .await;
            }
        }
    }

    fn on_notification(&mut self, notification: Notification) {
        match notification.method.as_str() {
            "notifications/initialized" | "initialized" => {
                if self.state == ConnectionState::AwaitingInitialized {
                    self.state = ConnectionState::Ready;
                    tracing::info!("client initialized");
                } else {
                    tracing::debug!(state = ?self.state, "unexpected initialized notification");
                }
            }
            "notifications/cancelled" => {
                // Runs are not interruptible; the request still gets its response.
                tracing::info!(params = %notification.params, "client cancelled a request");
            }
            method => tracing::debug!(method, "ignoring notification"),
        }
    }

    fn spawn_request(&mut self, request: Request) {
        let server = self.server.clone();
        let outbound = self.outbound.clone();
        let span = tracing::info_span!("request", method = %request.method, id = %request.id);

        self.in_flight.spawn(
            async move {
                let started = Instant::now();
                let Request { id, method, params } = request;

                let result = match AssertUnwindSafe(server.handle(&method, params))
                    .catch_unwind()
                    .await
                {
                    Ok(result) => result,
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        tracing::error!(panic = %message, "handler panicked");
                        Err(RpcError::internal_error(message))
                    }
                };

                tracing::debug!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    error = result.is_err(),
                    "request finished"
                );
                // Explicitly ignored: the writer is gone only when the connection is closing
                let _ = outbound.send(Response::from_result(id, result).into()).await;
            }
            .instrument(span),
        );
    }

    async fn send(&self, message: Message) {
        if self.outbound.send(message).await.is_err() {
            tracing::debug!("writer closed, dropping message");
        }
    }
}

fn reap(joined: Result<(), JoinError>) {
    match joined {
        Err(e) if !e.is_cancelled() => tracing::error!(error = %e, "request task failed"),
        _ => {}
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
