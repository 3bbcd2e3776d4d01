//! Capability exchange and duplex-channel bootstrap.
//!
//! Two nodes build a duplex channel out of two simplex TCP connections: the
//! accept side sends its capability, learns the peer's reachable address
//! and then dials back, so both ends finish with one inbound and one
//! outbound connection per peer id. A single TCP connection is deliberately
//! not reused bidirectionally.

use crate::error::{EdgeError, Result};
use crate::event::EdgeEvent;
use crate::messages::command::{Command, CommandKind};
use crate::network::connection::{CancelToken, Connection};
use crate::network::handle::Shared;
use crate::network::receiver;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Weak};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// Source of server-assigned peer ids, monotonically increasing.
static NEXT_CLIENT_ID: AtomicI64 = AtomicI64::new(1);

pub(crate) fn next_client_id() -> i64 {
    NEXT_CLIENT_ID.fetch_add(1, Ordering::SeqCst)
}

/// Format a reachable address as the "ip:port" handshake string.
pub(crate) fn format_host(ip: &str, port: u16) -> String {
    format!("{}:{}", ip, port)
}

/// Parse an "ip:port" handshake string.
pub(crate) fn parse_host(host: &str) -> Result<(String, u16)> {
    let (ip, port) = host
        .rsplit_once(':')
        .ok_or_else(|| EdgeError::protocol(format!("Malformed host string: {}", host)))?;
    let port = port
        .parse()
        .map_err(|_| EdgeError::protocol(format!("Malformed port in host string: {}", host)))?;
    Ok((ip.to_string(), port))
}

/// Accept incoming sockets until cancelled.
///
/// Each accepted socket is handled on its own task so the listener re-arms
/// immediately; a failed handshake never stalls the loop.
pub(crate) async fn accept_loop(
    shared: Weak<Shared>,
    listener: TcpListener,
    cancel: Arc<CancelToken>,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Accept loop cancelled");
                break;
            }
            result = listener.accept() => match result {
                Ok((stream, peer_addr)) => {
                    let Some(shared) = shared.upgrade() else { break };
                    if !shared.alive.load(Ordering::SeqCst) {
                        break;
                    }
                    tokio::spawn(async move {
                        if let Err(e) = accept_incoming(shared, stream, peer_addr).await {
                            warn!(peer = %peer_addr, error = %e, "Incoming handshake failed");
                        }
                    });
                }
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}

/// Accept-side handshake for one incoming socket.
///
/// Sends the local capability, receives the peer's reachable address,
/// spawns the message receiver and registers the inbound connection; a
/// server then dials the advertised address to complete the duplex channel.
/// On failure the partially-built connection is closed and no table entry
/// is committed.
async fn accept_incoming(
    shared: Arc<Shared>,
    stream: TcpStream,
    peer_addr: SocketAddr,
) -> Result<()> {
    let (is_server, own_client_id, caps, wire) = {
        let state = shared.state.lock().await;
        shared.ensure_alive()?;
        (
            state.is_server,
            state.client_id,
            state.caps.clone(),
            state.wire.clone(),
        )
    };

    let mut conn = Connection::new(stream, peer_addr.to_string())?;

    // A server mints a fresh peer id for the contact; a client reuses the
    // id assigned to it during its own connect handshake.
    let client_id = if is_server {
        next_client_id()
    } else {
        own_client_id
    };

    let exchange = async {
        conn.send_frame(&Command::capability(client_id, &caps), &wire)
            .await?;

        let cmd = conn.receive_frame(&wire).await?;
        if cmd.header.kind != CommandKind::HostInfo {
            return Err(EdgeError::connection("Failed to get host info from peer"));
        }
        parse_host(&cmd.text_payload()?)
    };

    let (peer_ip, peer_port) = match exchange.await {
        Ok(parsed) => parsed,
        Err(e) => {
            conn.close().await;
            return Err(e);
        }
    };

    conn.running_flag().store(true, Ordering::SeqCst);
    let task = receiver::spawn_receiver(
        Arc::downgrade(&shared),
        client_id,
        conn.stream_handle(),
        conn.running_flag(),
        conn.cancel_token(),
        wire.clone(),
    );
    conn.attach_receiver(task);

    {
        let mut state = shared.state.lock().await;
        if !shared.alive.load(Ordering::SeqCst) {
            drop(state);
            conn.close().await;
            return Err(EdgeError::invalid_param("Given edge handle is invalid"));
        }
        state.table.set_src(client_id, conn).await;
    }
    info!(client_id, peer = %peer_addr, "Inbound connection registered");

    // Complete the duplex channel by dialing the peer's advertised address.
    if is_server {
        if let Err(e) = connect_to(&shared, &peer_ip, peer_port).await {
            warn!(client_id, error = %e, "Failed to establish reverse connection");
        }
    }

    Ok(())
}

/// Connect-side handshake: dial the target, check its capability through
/// the event callback, advertise our own reachable address and register the
/// outbound connection.
pub(crate) async fn connect_to(shared: &Arc<Shared>, ip: &str, port: u16) -> Result<()> {
    let (own_host, wire) = {
        let state = shared.state.lock().await;
        shared.ensure_alive()?;
        (format_host(&state.host, state.port), state.wire.clone())
    };

    let stream = tokio::time::timeout(wire.io_timeout, TcpStream::connect((ip, port)))
        .await
        .map_err(|_| EdgeError::connection(format!("Timed out connecting to {}:{}", ip, port)))?
        .map_err(|e| EdgeError::connection(format!("Failed to connect to {}:{}: {}", ip, port, e)))?;

    let mut conn = Connection::new(stream, format_host(ip, port))?;

    let exchange = async {
        let cmd = conn.receive_frame(&wire).await?;
        if cmd.header.kind != CommandKind::Capability {
            return Err(EdgeError::connection("Failed to get capability from peer"));
        }
        let client_id = cmd.header.client_id;
        let caps = cmd.text_payload()?;

        // Commit the assigned peer id before advertising our address: once
        // the peer learns where to dial back, its incoming handshake reads
        // this id from the handle.
        {
            let mut state = shared.state.lock().await;
            shared.ensure_alive()?;
            state.client_id = client_id;
        }

        // Let the consumer accept or reject the peer based on format
        // compatibility.
        match shared.invoke_event(EdgeEvent::Capability { caps }).await {
            Ok(()) => {
                conn.send_frame(&Command::host_info(client_id, &own_host), &wire)
                    .await?;
                Ok(client_id)
            }
            Err(e) => {
                warn!(error = %e, "Capability is not acceptable");
                let _ = conn.send_frame(&Command::error(client_id), &wire).await;
                Err(EdgeError::connection("Capability rejected by consumer"))
            }
        }
    };

    match exchange.await {
        Ok(client_id) => {
            let mut state = shared.state.lock().await;
            if !shared.alive.load(Ordering::SeqCst) {
                drop(state);
                conn.close().await;
                return Err(EdgeError::connection("Handle released during handshake"));
            }
            state.table.set_sink(client_id, conn).await;
            info!(client_id, peer = %format_host(ip, port), "Outbound connection registered");
            Ok(())
        }
        Err(e) => {
            conn.close().await;
            Err(match e {
                EdgeError::ConnectionFailure(_) => e,
                other => EdgeError::connection(format!("Handshake failed: {}", other)),
            })
        }
    }
}
