//! One live socket plus the cancellation token shared between its receiver
//! task and any thread that wants to interrupt it.

use crate::error::{EdgeError, Result};
use crate::messages::command::Command;
use crate::messages::wire::{self, WireConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, Interest};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Cooperative cancellation token.
///
/// Closing a connection triggers the token, which unblocks any in-flight
/// send or receive within a bounded time.
pub struct CancelToken {
    flag: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            flag: AtomicBool::new(false),
            notify: Notify::new(),
        })
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolve once the token is triggered.
    pub async fn cancelled(&self) {
        loop {
            // Register interest before checking the flag so a concurrent
            // cancel() cannot be missed.
            let notified = self.notify.notified();
            if self.flag.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }
}

/// Probe socket-level liveness without consuming data.
///
/// Distinguishes "peer sent FIN" (dead) from "idle but alive" (no readiness
/// condition set) and "data pending" (readable without hangup).
pub(crate) async fn probe_alive(stream: &TcpStream) -> bool {
    match tokio::time::timeout(Duration::ZERO, stream.ready(Interest::READABLE)).await {
        // No readiness condition within the probe window: idle but alive.
        Err(_) => true,
        Ok(Err(_)) => false,
        Ok(Ok(ready)) => {
            if ready.is_error() || ready.is_read_closed() {
                debug!("Socket is not available, possibly EOS");
                return false;
            }
            true
        }
    }
}

/// A single live TCP connection to a remote peer.
///
/// Owned exclusively by its connection-table entry. Closing signals the
/// cancellation token, joins the receiver task if any, then releases the
/// socket — in that order.
pub struct Connection {
    remote: String,
    running: Arc<AtomicBool>,
    stream: Arc<Mutex<TcpStream>>,
    cancel: Arc<CancelToken>,
    receiver: Option<JoinHandle<()>>,
}

impl Connection {
    /// Wrap an established stream. Disables Nagle batching on the socket.
    pub fn new(stream: TcpStream, remote: String) -> Result<Self> {
        stream.set_nodelay(true)?;
        Ok(Self {
            remote,
            running: Arc::new(AtomicBool::new(false)),
            stream: Arc::new(Mutex::new(stream)),
            cancel: CancelToken::new(),
            receiver: None,
        })
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    pub(crate) fn stream_handle(&self) -> Arc<Mutex<TcpStream>> {
        self.stream.clone()
    }

    pub(crate) fn cancel_token(&self) -> Arc<CancelToken> {
        self.cancel.clone()
    }

    pub(crate) fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Attach the receiver task to be joined on close.
    pub(crate) fn attach_receiver(&mut self, task: JoinHandle<()>) {
        self.receiver = Some(task);
    }

    /// Check whether the socket still looks usable.
    pub async fn is_alive(&self) -> bool {
        let stream = self.stream.lock().await;
        probe_alive(&stream).await
    }

    /// Send one frame, bounded by the cancel token and the fallback timeout.
    pub(crate) async fn send_frame(&self, cmd: &Command, config: &WireConfig) -> Result<()> {
        let mut stream = self.stream.lock().await;
        tokio::select! {
            _ = self.cancel.cancelled() => Err(cancelled_error()),
            result = wire::with_timeout(config.io_timeout, wire::send_command(&mut *stream, cmd)) => result,
        }
    }

    /// Receive one frame, bounded by the cancel token and the fallback timeout.
    pub(crate) async fn receive_frame(&self, config: &WireConfig) -> Result<Command> {
        let mut stream = self.stream.lock().await;
        tokio::select! {
            _ = self.cancel.cancelled() => Err(cancelled_error()),
            result = wire::with_timeout(config.io_timeout, wire::receive_command(&mut *stream, config)) => result,
        }
    }

    /// Close the connection. Idempotent.
    ///
    /// Clears the running flag and triggers the cancel token so a blocked
    /// receiver returns promptly, joins the receiver task, then shuts the
    /// socket down.
    pub async fn close(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.cancel.cancel();

        if let Some(task) = self.receiver.take() {
            if let Err(e) = task.await {
                warn!(remote = %self.remote, error = %e, "Receiver task ended abnormally");
            }
        }

        let mut stream = self.stream.lock().await;
        if let Err(e) = stream.shutdown().await {
            debug!(remote = %self.remote, error = %e, "Socket shutdown failed");
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("remote", &self.remote)
            .field("running", &self.running.load(Ordering::SeqCst))
            .field("has_receiver", &self.receiver.is_some())
            .finish()
    }
}

fn cancelled_error() -> EdgeError {
    EdgeError::Io(std::io::Error::new(
        std::io::ErrorKind::Interrupted,
        "Connection cancelled",
    ))
}
