//! MCP server lifecycle and transport loop.
//!
//! The server owns a [`Dispatcher`] and drives it from a line transport:
//!
//! 1. **Start**: [`McpServer::serve`] moves the server to `Running`; a second
//!    call while running returns immediately
//! 2. **Serve**: each line is parsed and fully handled (reply written) before
//!    the next line is read
//! 3. **Stop**: EOF, a [`ServerHandle::stop`] call, or SIGINT/SIGTERM in
//!    [`McpServer::run`] ends the loop
//!
//! Notifications are handed to a separate sink task over a channel and never
//! produce output.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::mcp::dispatcher::Dispatcher;
use crate::mcp::protocol::{parse_message, IncomingMessage, JsonRpcNotification};
use crate::mcp::transport::LineTransport;

/// Server state in the MCP lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Constructed, not yet serving.
    Idle,
    /// Consuming input lines.
    Running,
    /// Stopped by EOF, signal or an explicit stop.
    Stopped,
}

/// Cloneable handle for observing and stopping a running server.
#[derive(Clone)]
pub struct ServerHandle {
    lifecycle: Arc<watch::Sender<ServerState>>,
}

impl ServerHandle {
    /// Marks the server inactive.
    ///
    /// The line currently being handled completes; no further lines are
    /// dispatched.
    pub fn stop(&self) {
        self.lifecycle.send_replace(ServerState::Stopped);
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ServerState {
        *self.lifecycle.borrow()
    }
}

/// The MCP server for Xcode tooling.
pub struct McpServer {
    /// Request router with its registries.
    dispatcher: Arc<Dispatcher>,
    /// Lifecycle state shared with handles.
    lifecycle: Arc<watch::Sender<ServerState>>,
}

impl McpServer {
    /// Creates a new server around a fully populated dispatcher.
    #[must_use]
    pub fn new(dispatcher: Dispatcher) -> Self {
        let (lifecycle, _) = watch::channel(ServerState::Idle);
        Self {
            dispatcher: Arc::new(dispatcher),
            lifecycle: Arc::new(lifecycle),
        }
    }

    /// Returns the dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Returns a handle that can stop the server from elsewhere.
    #[must_use]
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            lifecycle: Arc::clone(&self.lifecycle),
        }
    }

    /// Returns the current server state.
    #[must_use]
    pub fn state(&self) -> ServerState {
        *self.lifecycle.borrow()
    }

    /// Marks the server inactive. See [`ServerHandle::stop`].
    pub fn stop(&self) {
        self.handle().stop();
    }

    /// Serves stdin/stdout until EOF or a termination signal.
    ///
    /// # Errors
    ///
    /// Returns an error if signal handlers cannot be installed or transport
    /// I/O fails.
    pub async fn run(&self) -> io::Result<()> {
        tokio::select! {
            result = self.serve(tokio::io::stdin(), tokio::io::stdout()) => result,
            signal = shutdown_signal() => {
                let name = signal?;
                info!("Received {name}, initiating graceful shutdown");
                self.stop();
                Ok(())
            }
        }
    }

    /// Serves an arbitrary line transport until EOF or [`Self::stop`].
    ///
    /// Calling this while the server is already running is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if reading input or writing a reply fails. A closed
    /// output pipe is treated as a normal shutdown.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> io::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        if !self.begin() {
            debug!("Server already running; ignoring start request");
            return Ok(());
        }
        info!(
            tools = self.dispatcher.tools().len(),
            resources = self.dispatcher.resources().len(),
            "MCP server ready, waiting for client messages"
        );

        let mut transport = LineTransport::new(reader, writer);
        let (notifications, inbox) = mpsc::unbounded_channel();
        let sink = tokio::spawn(drain_notifications(Arc::clone(&self.dispatcher), inbox));

        let result = self.serve_lines(&mut transport, &notifications).await;

        drop(notifications);
        if let Err(e) = sink.await {
            warn!(error = %e, "Notification sink ended abnormally");
        }
        self.lifecycle.send_replace(ServerState::Stopped);

        match result {
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                info!("Output closed by client, shutting down");
                Ok(())
            }
            other => other,
        }
    }

    /// Atomically moves to `Running`. Returns `false` if already running.
    fn begin(&self) -> bool {
        self.lifecycle.send_if_modified(|state| {
            if *state == ServerState::Running {
                false
            } else {
                *state = ServerState::Running;
                true
            }
        })
    }

    async fn serve_lines<R, W>(
        &self,
        transport: &mut LineTransport<R, W>,
        notifications: &mpsc::UnboundedSender<JsonRpcNotification>,
    ) -> io::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lifecycle = self.lifecycle.subscribe();

        loop {
            let line = tokio::select! {
                biased;

                _ = lifecycle.wait_for(|state| *state == ServerState::Stopped) => {
                    info!("Stop requested, no further messages will be handled");
                    return Ok(());
                }

                line = transport.read_line() => line?,
            };

            let Some(line) = line else {
                info!("Input closed, shutting down");
                return Ok(());
            };

            if line.trim().is_empty() {
                continue;
            }

            self.handle_line(&line, transport, notifications).await?;
        }
    }

    /// Handles a single line of input.
    async fn handle_line<R, W>(
        &self,
        line: &str,
        transport: &mut LineTransport<R, W>,
        notifications: &mpsc::UnboundedSender<JsonRpcNotification>,
    ) -> io::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        match parse_message(line) {
            Ok(IncomingMessage::Request(req)) => {
                let reply = self.dispatcher.dispatch(req).await;
                transport.write_message(&reply).await
            }
            Ok(IncomingMessage::Notification(notif)) => {
                if notifications.send(notif).is_err() {
                    warn!("Notification sink closed; dropping notification");
                }
                Ok(())
            }
            Err(error) if error.id.is_some() => {
                warn!(
                    code = error.error.code,
                    message = %error.error.message,
                    "Rejecting malformed message"
                );
                transport.write_message(&error.into()).await
            }
            Err(error) => {
                warn!(
                    code = error.error.code,
                    message = %error.error.message,
                    "Dropping malformed message without a usable id"
                );
                Ok(())
            }
        }
    }
}

async fn drain_notifications(
    dispatcher: Arc<Dispatcher>,
    mut inbox: mpsc::UnboundedReceiver<JsonRpcNotification>,
) {
    while let Some(notif) = inbox.recv().await {
        dispatcher.handle_notification(&notif);
    }
}

/// Resolves when the process is asked to terminate.
#[cfg(unix)]
async fn shutdown_signal() -> io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => Ok("SIGINT"),
        _ = sigterm.recv() => Ok("SIGTERM"),
    }
}

/// Resolves when the process is asked to terminate.
#[cfg(windows)]
async fn shutdown_signal() -> io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("Ctrl+C")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::registry::{ResourceRegistry, ToolRegistry};

    fn empty_server() -> McpServer {
        McpServer::new(Dispatcher::new(ToolRegistry::new(), ResourceRegistry::new()))
    }

    #[test]
    fn server_initial_state() {
        let server = empty_server();
        assert_eq!(server.state(), ServerState::Idle);
    }

    #[tokio::test]
    async fn eof_stops_server() {
        let server = empty_server();
        let mut output = Vec::new();
        server.serve(&b""[..], &mut output).await.unwrap();
        assert!(output.is_empty());
        assert_eq!(server.state(), ServerState::Stopped);
    }

    #[tokio::test]
    async fn notifications_never_write_output() {
        let server = empty_server();
        let reader = tokio_test::io::Builder::new()
            .read(b"{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n")
            .read(b"{\"jsonrpc\":\"2.0\",\"method\":\"notifications/cancelled\",\"params\":{\"requestId\":3}}\n")
            .read(b"{\"jsonrpc\":\"2.0\",\"method\":\"tools/call\"}\n")
            .read(b"this is not json\n")
            .read(b"\n")
            .build();
        // A mock with no expectations panics on any write.
        let writer = tokio_test::io::Builder::new().build();

        server.serve(reader, writer).await.unwrap();
    }

    #[tokio::test]
    async fn start_is_idempotent_and_stop_ends_loop() {
        let server = empty_server();
        let handle = server.handle();
        let (client, server_io) = tokio::io::duplex(1024);
        let (reader, writer) = tokio::io::split(server_io);

        let first = server.serve(reader, writer);
        let second = async {
            while handle.state() != ServerState::Running {
                tokio::task::yield_now().await;
            }
            let result = server.serve(tokio::io::empty(), tokio::io::sink()).await;
            assert_eq!(handle.state(), ServerState::Running);
            handle.stop();
            result
        };

        let (first, second) = tokio::join!(first, second);
        first.unwrap();
        second.unwrap();
        assert_eq!(server.state(), ServerState::Stopped);
        drop(client);
    }
}
