//! Wire codec: fixed-size command header plus raw payload buffers.
//!
//! Send and receive loop on partial I/O until the requested byte count is
//! fully transferred; a short read or write aborts the whole frame with an
//! IO error. Nothing is retried here — a failed frame terminates the
//! owning connection's receiver loop.

use crate::error::{EdgeError, Result};
use crate::messages::command::{Command, CommandHeader, EDGE_DATA_LIMIT, HEADER_SIZE};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, trace, warn};

/// Fallback timeout applied to blocking socket operations.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-buffer size ceiling. Peers advertising a larger buffer are treated
/// as a protocol violation before any allocation happens.
pub const MAX_BUFFER_SIZE: u64 = 256 * 1024 * 1024;

/// Configuration for wire operations: timeouts and payload size limits.
#[derive(Debug, Clone)]
pub struct WireConfig {
    pub io_timeout: Duration,
    pub max_buffer_size: u64,
}

impl Default for WireConfig {
    fn default() -> Self {
        Self {
            io_timeout: DEFAULT_IO_TIMEOUT,
            max_buffer_size: MAX_BUFFER_SIZE,
        }
    }
}

impl WireConfig {
    /// Create a WireConfig with a custom timeout and default size limit.
    pub fn with_timeout(io_timeout: Duration) -> Self {
        Self {
            io_timeout,
            ..Self::default()
        }
    }
}

/// Robust write operation with recovery logic for partial writes.
async fn write_all_with_recovery(
    writer: &mut (impl AsyncWrite + Unpin),
    data: &[u8],
) -> Result<()> {
    let mut total_written = 0;
    let data_len = data.len();

    while total_written < data_len {
        let remaining = &data[total_written..];

        match writer.write(remaining).await {
            Ok(0) => {
                error!(
                    total_written,
                    remaining = remaining.len(),
                    "Write returned 0 bytes, connection closed"
                );
                return Err(EdgeError::Io(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    format!(
                        "Connection closed after writing {} of {} bytes",
                        total_written, data_len
                    ),
                )));
            }
            Ok(written) => {
                total_written += written;
                if written < remaining.len() {
                    trace!(
                        written,
                        total_written,
                        remaining = data_len - total_written,
                        "Partial write, continuing"
                    );
                }
            }
            Err(e) => {
                error!(error = %e, total_written, data_len, "Write operation failed");
                return Err(EdgeError::Io(e));
            }
        }
    }

    Ok(())
}

/// Robust read operation with recovery logic for partial reads.
async fn read_exact_with_recovery(
    reader: &mut (impl AsyncRead + Unpin),
    buffer: &mut [u8],
) -> Result<()> {
    let mut total_read = 0;
    let buffer_len = buffer.len();

    while total_read < buffer_len {
        let remaining = &mut buffer[total_read..];

        match reader.read(remaining).await {
            Ok(0) => {
                debug!(
                    total_read,
                    expected = buffer_len,
                    "Unexpected EOF, connection closed"
                );
                return Err(EdgeError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!(
                        "Connection closed after reading {} of {} bytes",
                        total_read, buffer_len
                    ),
                )));
            }
            Ok(read) => {
                total_read += read;
                if read < remaining.len() {
                    trace!(
                        read,
                        total_read,
                        remaining = buffer_len - total_read,
                        "Partial read, continuing"
                    );
                }
            }
            Err(e) => {
                error!(error = %e, total_read, expected = buffer_len, "Read operation failed");
                return Err(EdgeError::Io(e));
            }
        }
    }

    Ok(())
}

/// Write a command frame: header first, then each payload buffer.
///
/// A failure on any buffer aborts the whole frame; no buffer is retried
/// independently.
pub async fn send_command(
    writer: &mut (impl AsyncWrite + Unpin),
    cmd: &Command,
) -> Result<()> {
    trace!(kind = ?cmd.header.kind, num = cmd.header.num, "Sending command frame");

    write_all_with_recovery(writer, &cmd.header.encode()).await?;

    for (i, buffer) in cmd.buffers.iter().enumerate() {
        if let Err(e) = write_all_with_recovery(writer, buffer).await {
            error!(index = i, "Failed to send payload buffer");
            return Err(e);
        }
    }

    writer.flush().await?;
    Ok(())
}

/// Read one command frame: constant-size header, then exactly the
/// advertised payload buffers.
///
/// A buffer count above the fixed maximum is rejected before allocation.
/// If any buffer read fails, buffers already allocated for the frame are
/// dropped and no partial frame is visible to the caller.
pub async fn receive_command(
    reader: &mut (impl AsyncRead + Unpin),
    config: &WireConfig,
) -> Result<Command> {
    let mut header_buf = [0u8; HEADER_SIZE];
    read_exact_with_recovery(reader, &mut header_buf).await?;

    let header = CommandHeader::decode(&header_buf)?;
    debug!(kind = ?header.kind, num = header.num, "Received command header");

    let mut buffers = Vec::with_capacity(header.num as usize);
    for i in 0..header.num as usize {
        let size = header.sizes[i];
        if size > config.max_buffer_size {
            warn!(index = i, size, limit = config.max_buffer_size, "Advertised buffer size exceeds limit");
            return Err(EdgeError::protocol(format!(
                "Advertised buffer size {} exceeds limit {}",
                size, config.max_buffer_size
            )));
        }

        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(size as usize)
            .map_err(|_| EdgeError::OutOfMemory)?;
        buffer.resize(size as usize, 0);

        read_exact_with_recovery(reader, &mut buffer).await?;
        buffers.push(buffer);
    }

    Ok(Command { header, buffers })
}

/// Run a wire operation with the configured fallback timeout.
///
/// The timeout bounds how long a blocked send or receive can hold up its
/// caller when the peer stalls without closing the socket.
pub async fn with_timeout<T>(
    duration: Duration,
    operation: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(duration, operation).await {
        Ok(result) => result,
        Err(_) => {
            warn!(timeout = ?duration, "Wire operation timed out");
            Err(EdgeError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("Wire operation timed out after {:?}", duration),
            )))
        }
    }
}
