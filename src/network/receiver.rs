//! Per-connection receiver loop: turns incoming frames into data events
//! delivered to the owning handle's callback.

use crate::data::{EdgeData, CLIENT_ID_KEY};
use crate::event::EdgeEvent;
use crate::messages::command::{Command, CommandKind};
use crate::messages::wire::{self, WireConfig};
use crate::network::connection::{probe_alive, CancelToken};
use crate::network::handle::Shared;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Spawn the receiver task for one inbound connection.
///
/// The task runs until the running flag clears, the cancel token fires, the
/// handle dies or the socket fails. The connection is not auto-reconnected;
/// an external `connect` call is required to re-establish it.
pub(crate) fn spawn_receiver(
    shared: Weak<Shared>,
    client_id: i64,
    stream: Arc<Mutex<TcpStream>>,
    running: Arc<AtomicBool>,
    cancel: Arc<CancelToken>,
    config: WireConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        message_loop(&shared, client_id, &stream, &running, &cancel, &config).await;
        running.store(false, Ordering::SeqCst);
        debug!(client_id, "Receiver loop finished");
    })
}

async fn message_loop(
    shared: &Weak<Shared>,
    client_id: i64,
    stream: &Arc<Mutex<TcpStream>>,
    running: &Arc<AtomicBool>,
    cancel: &Arc<CancelToken>,
    config: &WireConfig,
) {
    while running.load(Ordering::SeqCst) {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        if !shared.alive.load(Ordering::SeqCst) {
            debug!(client_id, "The edge handle is invalid, it would be expired");
            break;
        }

        {
            let guard = stream.lock().await;
            if !probe_alive(&guard).await {
                break;
            }
        }

        let cmd = {
            let mut guard = stream.lock().await;
            tokio::select! {
                _ = cancel.cancelled() => break,
                result = wire::with_timeout(
                    config.io_timeout,
                    wire::receive_command(&mut *guard, config),
                ) => match result {
                    Ok(cmd) => cmd,
                    Err(e) => {
                        debug!(client_id, error = %e, "Failed to receive data from the connected node");
                        break;
                    }
                }
            }
        };

        match cmd.header.kind {
            CommandKind::Error => {
                warn!(client_id, "Received error, stopping receiver loop");
                break;
            }
            CommandKind::TransferData => {}
            other => {
                // Reserved for future command kinds on the data channel.
                debug!(client_id, kind = ?other, "Discarding non-transfer command");
                continue;
            }
        }

        let data = wrap_transfer(client_id, cmd);

        // Backpressure is advisory: a rejected delivery does not abort the
        // loop or close the connection.
        if shared
            .invoke_event(EdgeEvent::NewDataReceived { data })
            .await
            .is_err()
        {
            warn!(client_id, "The consumer does not accept data from the peer");
        }
    }
}

/// Wrap received transfer buffers into an EdgeData tagged with the peer id.
fn wrap_transfer(client_id: i64, cmd: Command) -> EdgeData {
    let mut data = EdgeData::new();
    data.set_info(CLIENT_ID_KEY, client_id.to_string());
    for buffer in cmd.buffers {
        // The frame decoder already enforces the buffer-count limit.
        if let Err(e) = data.add_bytes(buffer) {
            warn!(client_id, error = %e, "Dropping excess payload buffer");
            break;
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_transfer_tags_peer_id_and_buffers() {
        let cmd = Command::transfer(99, vec![vec![1; 128], vec![2; 256]]).unwrap();
        let data = wrap_transfer(99, cmd);

        assert_eq!(data.info(CLIENT_ID_KEY), Some("99"));
        assert_eq!(data.count(), 2);
        assert_eq!(data.buffer(0).unwrap().len(), 128);
        assert_eq!(data.buffer(1).unwrap().len(), 256);
    }
}
