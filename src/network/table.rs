//! Connection table: one duplex pair of connections per remote peer.

use crate::network::connection::Connection;
use std::collections::HashMap;
use tracing::debug;

/// The two simplex connections making up a duplex channel to one peer.
///
/// `src` is the socket the peer dialed into this node; `sink` is the socket
/// this node dialed into the peer.
#[derive(Debug, Default)]
pub struct ConnectionPair {
    pub src: Option<Connection>,
    pub sink: Option<Connection>,
}

/// Maps a peer identifier to its connection pair.
///
/// Mutated only while holding the owning handle's lock. Replacing a
/// direction closes the old connection first; removal closes both, so no
/// receiver task can outlive its table entry.
#[derive(Debug, Default)]
pub struct ConnectionTable {
    entries: HashMap<i64, ConnectionPair>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, client_id: i64) -> Option<&ConnectionPair> {
        self.entries.get(&client_id)
    }

    pub fn contains(&self, client_id: i64) -> bool {
        self.entries.contains_key(&client_id)
    }

    pub fn peer_ids(&self) -> Vec<i64> {
        self.entries.keys().copied().collect()
    }

    /// Register the inbound connection for a peer, closing any previous one.
    pub async fn set_src(&mut self, client_id: i64, conn: Connection) {
        let entry = self.entries.entry(client_id).or_default();
        if let Some(mut old) = entry.src.replace(conn) {
            debug!(client_id, "Replacing inbound connection, closing old one");
            old.close().await;
        }
    }

    /// Register the outbound connection for a peer, closing any previous one.
    pub async fn set_sink(&mut self, client_id: i64, conn: Connection) {
        let entry = self.entries.entry(client_id).or_default();
        if let Some(mut old) = entry.sink.replace(conn) {
            debug!(client_id, "Replacing outbound connection, closing old one");
            old.close().await;
        }
    }

    /// Remove one peer's entry, closing both directions.
    pub async fn remove(&mut self, client_id: i64) {
        if let Some(pair) = self.entries.remove(&client_id) {
            close_pair(pair).await;
        }
    }

    /// Drop every entry, closing all connections.
    pub async fn clear(&mut self) {
        for (client_id, pair) in self.entries.drain() {
            debug!(client_id, "Closing connection pair");
            close_pair(pair).await;
        }
    }
}

async fn close_pair(pair: ConnectionPair) {
    if let Some(mut src) = pair.src {
        src.close().await;
    }
    if let Some(mut sink) = pair.sink {
        sink.close().await;
    }
}
