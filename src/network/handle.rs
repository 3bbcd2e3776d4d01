//! The caller-visible object representing one node's participation in the
//! edge transport: configuration, listener, connection table and the public
//! request/respond/connect/disconnect operations.

use crate::data::{EdgeData, CLIENT_ID_KEY};
use crate::error::{EdgeError, Result};
use crate::event::{EdgeEvent, EventCallback};
use crate::messages::command::Command;
use crate::messages::wire::WireConfig;
use crate::network::connection::CancelToken;
use crate::network::handshake;
use crate::network::table::ConnectionTable;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Transport protocol selector. Only TCP is supported today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    #[default]
    Tcp,
}

/// Mutable handle state, guarded by the single per-handle lock.
pub(crate) struct State {
    pub id: String,
    pub topic: String,
    pub protocol: Protocol,
    pub is_server: bool,
    /// This node's own reachable address, advertised during handshake.
    pub host: String,
    pub port: u16,
    pub caps: String,
    /// Peer id of this node's own connection pair (assigned by the server
    /// side of the handshake).
    pub client_id: i64,
    pub wire: WireConfig,
    pub table: ConnectionTable,
    accept_task: Option<JoinHandle<()>>,
    accept_cancel: Option<Arc<CancelToken>>,
}

/// State shared between the handle, its accept loop and receiver tasks.
///
/// The `alive` marker is invalidated by `release` before teardown so any
/// operation racing the release fails fast instead of touching stale state.
pub(crate) struct Shared {
    pub alive: AtomicBool,
    pub state: Mutex<State>,
    /// Registered event callback. Kept outside the state lock so receiver
    /// tasks can deliver events while a table edit is closing (and joining)
    /// a sibling connection.
    event_cb: std::sync::Mutex<Option<Arc<EventCallback>>>,
}

impl Shared {
    pub fn ensure_alive(&self) -> Result<()> {
        if self.alive.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(EdgeError::invalid_param("Given edge handle is invalid"))
        }
    }

    fn callback(&self) -> Option<Arc<EventCallback>> {
        self.event_cb
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn swap_callback(&self, callback: Option<Arc<EventCallback>>) -> Option<Arc<EventCallback>> {
        std::mem::replace(
            &mut *self
                .event_cb
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
            callback,
        )
    }

    /// Invoke the registered event callback, if any.
    ///
    /// The callback runs without the handle lock held. A missing callback is
    /// not an error.
    pub async fn invoke_event(&self, event: EdgeEvent) -> Result<()> {
        let Some(callback) = self.callback() else {
            warn!("The event callback is null, do nothing");
            return Ok(());
        };

        let kind = event.kind();
        let result = callback(event);
        if let Err(e) = &result {
            warn!(kind, error = %e, "The event callback returned an error");
        }
        result
    }
}

/// A node's participation in the edge transport.
///
/// Cheap to clone; all clones drive the same underlying handle. Every
/// public operation acquires the per-handle lock and verifies the handle
/// has not been released.
#[derive(Clone)]
pub struct EdgeHandle {
    shared: Arc<Shared>,
}

impl EdgeHandle {
    /// Create a new handle with the given node id and topic.
    pub fn new(id: &str, topic: &str) -> Result<Self> {
        if id.is_empty() {
            return Err(EdgeError::invalid_param("Given ID is invalid"));
        }
        if topic.is_empty() {
            return Err(EdgeError::invalid_param("Given topic is invalid"));
        }

        Ok(Self {
            shared: Arc::new(Shared {
                alive: AtomicBool::new(true),
                state: Mutex::new(State {
                    id: id.to_string(),
                    topic: topic.to_string(),
                    protocol: Protocol::Tcp,
                    is_server: true,
                    host: "localhost".to_string(),
                    port: 0,
                    caps: String::new(),
                    client_id: 0,
                    wire: WireConfig::default(),
                    table: ConnectionTable::new(),
                    accept_task: None,
                    accept_cancel: None,
                }),
                event_cb: std::sync::Mutex::new(None),
            }),
        })
    }

    /// Register the event callback, releasing any previous one.
    ///
    /// The previous callback is notified with `CallbackReleased`; an error
    /// from that notification aborts the swap.
    pub async fn set_event_callback(
        &self,
        callback: impl Fn(EdgeEvent) -> Result<()> + Send + Sync + 'static,
    ) -> Result<()> {
        self.shared.ensure_alive()?;
        let _state = self.shared.state.lock().await;
        self.shared.ensure_alive()?;

        if let Some(old) = self.shared.callback() {
            if let Err(e) = old(EdgeEvent::CallbackReleased) {
                warn!(error = %e, "Failed to release previous event callback");
                return Err(e);
            }
        }

        self.shared.swap_callback(Some(Arc::new(callback)));
        Ok(())
    }

    /// Start listening for incoming connections.
    ///
    /// Binds the configured address (an ephemeral port is resolved and
    /// recorded when the configured port is 0) and spawns the accept loop;
    /// accept handling never blocks this caller.
    pub async fn start(&self, is_server: bool) -> Result<()> {
        self.shared.ensure_alive()?;
        let mut state = self.shared.state.lock().await;
        self.shared.ensure_alive()?;

        state.is_server = is_server;

        let listener = TcpListener::bind((state.host.as_str(), state.port))
            .await
            .map_err(|e| {
                EdgeError::connection(format!(
                    "Failed to bind listener on {}:{}: {}",
                    state.host, state.port, e
                ))
            })?;
        let local = listener
            .local_addr()
            .map_err(|e| EdgeError::connection(format!("Failed to resolve listen address: {}", e)))?;
        state.port = local.port();

        let cancel = CancelToken::new();
        let task = tokio::spawn(handshake::accept_loop(
            Arc::downgrade(&self.shared),
            listener,
            cancel.clone(),
        ));

        if let Some(old_cancel) = state.accept_cancel.replace(cancel) {
            old_cancel.cancel();
        }
        if let Some(old_task) = state.accept_task.replace(task) {
            let _ = old_task.await;
        }

        info!(
            id = %state.id,
            port = state.port,
            protocol = ?state.protocol,
            is_server,
            "Edge handle started"
        );
        Ok(())
    }

    /// Connect to a destination node.
    ///
    /// Requires a registered event callback: the peer's capability is
    /// delivered through it and a rejection aborts the handshake.
    pub async fn connect(&self, ip: &str, port: u16) -> Result<()> {
        if ip.is_empty() {
            return Err(EdgeError::invalid_param("Given IP is invalid"));
        }
        self.shared.ensure_alive()?;

        {
            let mut state = self.shared.state.lock().await;
            self.shared.ensure_alive()?;

            if self.shared.callback().is_none() {
                return Err(EdgeError::connection("Edge event callback is not registered"));
            }
            state.is_server = false;
            state.protocol = Protocol::Tcp;
        }

        handshake::connect_to(&self.shared, ip, port).await
    }

    /// Push data to the connected peer on this handle's own channel.
    pub async fn request(&self, data: &EdgeData) -> Result<()> {
        self.shared.ensure_alive()?;
        let state = self.shared.state.lock().await;
        self.shared.ensure_alive()?;

        let client_id = state.client_id;
        self.send_on_sink(&state, client_id, data).await
    }

    /// Respond to a previously received request, routed by the peer id
    /// stored in the data's info map.
    pub async fn respond(&self, data: &EdgeData) -> Result<()> {
        self.shared.ensure_alive()?;
        let state = self.shared.state.lock().await;
        self.shared.ensure_alive()?;

        let client_id = data
            .info(CLIENT_ID_KEY)
            .ok_or_else(|| EdgeError::invalid_param("Cannot find client ID in edge data"))?
            .parse::<i64>()
            .map_err(|_| EdgeError::invalid_param("Client ID in edge data is not a number"))?;

        self.send_on_sink(&state, client_id, data).await
    }

    async fn send_on_sink(&self, state: &State, client_id: i64, data: &EdgeData) -> Result<()> {
        let pair = state.table.get(client_id).ok_or_else(|| {
            EdgeError::invalid_param("Cannot find connection, invalid client ID")
        })?;
        let sink = pair
            .sink
            .as_ref()
            .ok_or_else(|| EdgeError::invalid_param("No outbound connection for client ID"))?;

        if !sink.is_alive().await {
            return Err(EdgeError::connection("Failed to send, connection failure"));
        }

        let cmd = Command::transfer(client_id, data.payload())?;
        sink.send_frame(&cmd, &state.wire).await
    }

    /// Drop all peer connections. The handle itself stays usable.
    pub async fn disconnect(&self) -> Result<()> {
        self.shared.ensure_alive()?;
        let mut state = self.shared.state.lock().await;
        self.shared.ensure_alive()?;

        state.table.clear().await;
        Ok(())
    }

    /// Release the handle: stop the listener, drop the callback and close
    /// every connection. Operations racing the release fail fast.
    pub async fn release(&self) -> Result<()> {
        if !self.shared.alive.swap(false, Ordering::SeqCst) {
            return Err(EdgeError::invalid_param("Given edge handle is invalid"));
        }

        let mut state = self.shared.state.lock().await;
        if let Some(cancel) = state.accept_cancel.take() {
            cancel.cancel();
        }
        if let Some(task) = state.accept_task.take() {
            let _ = task.await;
        }
        self.shared.swap_callback(None);
        state.table.clear().await;

        debug!(id = %state.id, "Edge handle released");
        Ok(())
    }

    /// Update handle configuration.
    ///
    /// `CAPS` appends to the capability string; `IP`, `PORT` and `TOPIC`
    /// replace the current value. Unrecognized keys are logged and ignored.
    pub async fn set_info(&self, key: &str, value: &str) -> Result<()> {
        self.shared.ensure_alive()?;
        let mut state = self.shared.state.lock().await;
        self.shared.ensure_alive()?;

        if key.eq_ignore_ascii_case("CAPS") {
            state.caps.push_str(value);
        } else if key.eq_ignore_ascii_case("IP") {
            state.host = value.to_string();
        } else if key.eq_ignore_ascii_case("PORT") {
            state.port = value
                .parse()
                .map_err(|_| EdgeError::invalid_param(format!("Invalid port value: {}", value)))?;
        } else if key.eq_ignore_ascii_case("TOPIC") {
            state.topic = value.to_string();
        } else {
            warn!(key, "Failed to set edge info, unknown key");
        }

        Ok(())
    }

    /// Get the topic of this handle.
    pub async fn topic(&self) -> Result<String> {
        self.shared.ensure_alive()?;
        let state = self.shared.state.lock().await;
        self.shared.ensure_alive()?;
        Ok(state.topic.clone())
    }

    /// Publish a message to the handle's topic.
    ///
    /// Pass-through: topic distribution is handled outside this transport.
    pub async fn publish(&self, _data: &EdgeData) -> Result<()> {
        self.shared.ensure_alive()?;
        let _state = self.shared.state.lock().await;
        self.shared.ensure_alive()?;
        debug!("publish is a pass-through in the edge transport layer");
        Ok(())
    }

    /// Subscribe to the handle's topic.
    ///
    /// Pass-through: topic distribution is handled outside this transport.
    pub async fn subscribe(&self, _data: &EdgeData) -> Result<()> {
        self.shared.ensure_alive()?;
        let _state = self.shared.state.lock().await;
        self.shared.ensure_alive()?;
        debug!("subscribe is a pass-through in the edge transport layer");
        Ok(())
    }

    /// Cancel a previous subscription.
    ///
    /// Pass-through: topic distribution is handled outside this transport.
    pub async fn unsubscribe(&self) -> Result<()> {
        self.shared.ensure_alive()?;
        let _state = self.shared.state.lock().await;
        self.shared.ensure_alive()?;
        debug!("unsubscribe is a pass-through in the edge transport layer");
        Ok(())
    }

    /// The listen port actually bound by `start` (useful with ephemeral ports).
    pub async fn port(&self) -> Result<u16> {
        self.shared.ensure_alive()?;
        Ok(self.shared.state.lock().await.port)
    }

    /// Peer id of this handle's own connection pair, assigned during handshake.
    pub async fn client_id(&self) -> Result<i64> {
        self.shared.ensure_alive()?;
        Ok(self.shared.state.lock().await.client_id)
    }

    /// Peer ids currently present in the connection table.
    pub async fn connected_peers(&self) -> Result<Vec<i64>> {
        self.shared.ensure_alive()?;
        Ok(self.shared.state.lock().await.table.peer_ids())
    }

    /// Whether the inbound / outbound connections exist for a peer id.
    pub async fn connection_info(&self, client_id: i64) -> Result<Option<(bool, bool)>> {
        self.shared.ensure_alive()?;
        let state = self.shared.state.lock().await;
        Ok(state
            .table
            .get(client_id)
            .map(|pair| (pair.src.is_some(), pair.sink.is_some())))
    }
}
