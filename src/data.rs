//! Buffer-set abstraction passed across the request/respond/receive boundary.

use std::collections::HashMap;

use crate::error::{EdgeError, Result};
use crate::messages::command::EDGE_DATA_LIMIT;

/// Info key under which the originating peer id is stashed on received data,
/// so a later `respond` can find the right connection.
pub const CLIENT_ID_KEY: &str = "client_id";

/// One payload buffer, optionally carrying a release hook invoked exactly
/// once when the buffer is dropped.
pub struct EdgeBuffer {
    bytes: Vec<u8>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl EdgeBuffer {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            release: None,
        }
    }

    /// Attach a release hook to be invoked when the buffer is dropped.
    pub fn with_release(bytes: Vec<u8>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            bytes,
            release: Some(Box::new(release)),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
}

impl Drop for EdgeBuffer {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for EdgeBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeBuffer")
            .field("len", &self.bytes.len())
            .field("has_release", &self.release.is_some())
            .finish()
    }
}

/// An ordered set of payload buffers plus a string-keyed info map.
///
/// Created per received or outgoing message. Buffers are released when the
/// data is dropped, invoking each buffer's release hook at most once.
#[derive(Debug, Default)]
pub struct EdgeData {
    buffers: Vec<EdgeBuffer>,
    info: HashMap<String, String>,
}

impl EdgeData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a buffer. Fails with `InvalidParameter` once the fixed maximum
    /// buffer count is reached.
    pub fn add(&mut self, buffer: EdgeBuffer) -> Result<()> {
        if self.buffers.len() >= EDGE_DATA_LIMIT {
            return Err(EdgeError::invalid_param(format!(
                "Cannot add more than {} buffers to edge data",
                EDGE_DATA_LIMIT
            )));
        }
        self.buffers.push(buffer);
        Ok(())
    }

    /// Convenience for appending an owned byte buffer without a release hook.
    pub fn add_bytes(&mut self, bytes: Vec<u8>) -> Result<()> {
        self.add(EdgeBuffer::new(bytes))
    }

    pub fn count(&self) -> usize {
        self.buffers.len()
    }

    /// Borrow the bytes of the buffer at `index`.
    pub fn buffer(&self, index: usize) -> Option<&[u8]> {
        self.buffers.get(index).map(|b| b.as_slice())
    }

    /// Set an info key. Replaces any previous value for the key.
    pub fn set_info(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.info.insert(key.into(), value.into());
    }

    pub fn info(&self, key: &str) -> Option<&str> {
        self.info.get(key).map(|v| v.as_str())
    }

    /// Copy out the raw payload bytes for framing onto the wire.
    pub(crate) fn payload(&self) -> Vec<Vec<u8>> {
        self.buffers.iter().map(|b| b.bytes.clone()).collect()
    }
}
