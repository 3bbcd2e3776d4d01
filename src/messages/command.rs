//! Fixed-layout command frames exchanged between edge nodes.
//!
//! Every frame starts with a constant-size header (command kind, peer id,
//! buffer count and the full array of per-buffer sizes) followed by the raw
//! payload buffers back-to-back. Both sides rely on the header size being
//! constant regardless of payload, so the size array always carries
//! `EDGE_DATA_LIMIT` slots with unused entries zeroed.
//!
//! All header integers are encoded in the host's native byte order; peers
//! are expected to agree on architecture endianness.

use crate::error::{EdgeError, Result};

/// Maximum number of payload buffers in a single frame.
pub const EDGE_DATA_LIMIT: usize = 16;

/// Encoded header size in bytes: kind (4) + peer id (8) + count (4) +
/// `EDGE_DATA_LIMIT` sizes (8 each).
pub const HEADER_SIZE: usize = 4 + 8 + 4 + EDGE_DATA_LIMIT * 8;

/// Command kinds understood by the edge wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CommandKind {
    /// Error signal; a frame with no buffers is valid here.
    Error = 0,
    /// Payload transfer between nodes.
    TransferData = 1,
    /// Reachable "ip:port" of the sending node.
    HostInfo = 2,
    /// Capability string for compatibility checks.
    Capability = 3,
}

impl CommandKind {
    /// Decode a raw wire value. Unknown values are a protocol violation.
    pub fn from_raw(raw: u32) -> Result<Self> {
        match raw {
            0 => Ok(CommandKind::Error),
            1 => Ok(CommandKind::TransferData),
            2 => Ok(CommandKind::HostInfo),
            3 => Ok(CommandKind::Capability),
            other => Err(EdgeError::protocol(format!(
                "Unknown command kind on wire: {}",
                other
            ))),
        }
    }
}

/// Fixed-size frame header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandHeader {
    pub kind: CommandKind,
    /// Peer identifier of the logical connection pair this frame belongs to.
    pub client_id: i64,
    /// Number of payload buffers following the header.
    pub num: u32,
    /// Byte size of each payload buffer; slots beyond `num` are zero.
    pub sizes: [u64; EDGE_DATA_LIMIT],
}

impl CommandHeader {
    pub fn new(kind: CommandKind, client_id: i64) -> Self {
        Self {
            kind,
            client_id,
            num: 0,
            sizes: [0; EDGE_DATA_LIMIT],
        }
    }

    /// Encode the header into its constant-size wire form (native endian).
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&(self.kind as u32).to_ne_bytes());
        buf[4..12].copy_from_slice(&self.client_id.to_ne_bytes());
        buf[12..16].copy_from_slice(&self.num.to_ne_bytes());
        for (i, size) in self.sizes.iter().enumerate() {
            let offset = 16 + i * 8;
            buf[offset..offset + 8].copy_from_slice(&size.to_ne_bytes());
        }
        buf
    }

    /// Decode a header from its wire form.
    ///
    /// Rejects unknown command kinds and buffer counts above the fixed
    /// maximum, so no payload allocation happens for malformed frames.
    pub fn decode(buf: &[u8; HEADER_SIZE]) -> Result<Self> {
        let kind = CommandKind::from_raw(u32::from_ne_bytes(buf[0..4].try_into().unwrap()))?;
        let client_id = i64::from_ne_bytes(buf[4..12].try_into().unwrap());
        let num = u32::from_ne_bytes(buf[12..16].try_into().unwrap());

        if num as usize > EDGE_DATA_LIMIT {
            return Err(EdgeError::protocol(format!(
                "Buffer count {} exceeds the maximum of {}",
                num, EDGE_DATA_LIMIT
            )));
        }

        let mut sizes = [0u64; EDGE_DATA_LIMIT];
        for (i, size) in sizes.iter_mut().enumerate() {
            let offset = 16 + i * 8;
            *size = u64::from_ne_bytes(buf[offset..offset + 8].try_into().unwrap());
        }

        Ok(Self {
            kind,
            client_id,
            num,
            sizes,
        })
    }
}

/// A full frame: header plus owned payload buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub header: CommandHeader,
    pub buffers: Vec<Vec<u8>>,
}

impl Command {
    /// Create a frame with no payload buffers.
    pub fn new(kind: CommandKind, client_id: i64) -> Self {
        Self {
            header: CommandHeader::new(kind, client_id),
            buffers: Vec::new(),
        }
    }

    /// Create a frame carrying the given payload buffers.
    pub fn with_payload(kind: CommandKind, client_id: i64, buffers: Vec<Vec<u8>>) -> Result<Self> {
        if buffers.len() > EDGE_DATA_LIMIT {
            return Err(EdgeError::invalid_param(format!(
                "Cannot frame {} buffers, maximum is {}",
                buffers.len(),
                EDGE_DATA_LIMIT
            )));
        }

        let mut header = CommandHeader::new(kind, client_id);
        header.num = buffers.len() as u32;
        for (i, buffer) in buffers.iter().enumerate() {
            header.sizes[i] = buffer.len() as u64;
        }

        Ok(Self { header, buffers })
    }

    /// Capability frame carrying the local capability string.
    pub fn capability(client_id: i64, caps: &str) -> Self {
        Self::with_text(CommandKind::Capability, client_id, caps)
    }

    /// Host-info frame carrying this node's reachable "ip:port" string.
    pub fn host_info(client_id: i64, host: &str) -> Self {
        Self::with_text(CommandKind::HostInfo, client_id, host)
    }

    fn with_text(kind: CommandKind, client_id: i64, text: &str) -> Self {
        let mut header = CommandHeader::new(kind, client_id);
        header.num = 1;
        header.sizes[0] = text.len() as u64;
        Self {
            header,
            buffers: vec![text.as_bytes().to_vec()],
        }
    }

    /// Error frame with no payload.
    pub fn error(client_id: i64) -> Self {
        Self::new(CommandKind::Error, client_id)
    }

    /// Data-transfer frame from the given payload buffers.
    pub fn transfer(client_id: i64, buffers: Vec<Vec<u8>>) -> Result<Self> {
        Self::with_payload(CommandKind::TransferData, client_id, buffers)
    }

    /// Interpret the first payload buffer as a UTF-8 string (capability and
    /// host-info frames carry exactly one).
    pub fn text_payload(&self) -> Result<String> {
        let buffer = self
            .buffers
            .first()
            .ok_or_else(|| EdgeError::protocol("Frame carries no payload buffer"))?;
        String::from_utf8(buffer.clone())
            .map_err(|_| EdgeError::protocol("Frame payload is not valid UTF-8"))
    }
}
