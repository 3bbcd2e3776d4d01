//! Mock stream implementations for testing wire protocol behavior
//!
//! This module provides mock stream types that simulate different network
//! conditions and I/O patterns, in particular partial reads and short
//! writes.

use std::io::Cursor;
use tokio::io::{AsyncRead, AsyncWrite};

/// Basic mock stream for simple read/write testing
pub struct MockStream {
    read_cursor: Cursor<Vec<u8>>,
    write_buffer: Vec<u8>,
}

impl MockStream {
    pub fn new() -> Self {
        Self {
            read_cursor: Cursor::new(Vec::new()),
            write_buffer: Vec::new(),
        }
    }

    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            read_cursor: Cursor::new(data),
            write_buffer: Vec::new(),
        }
    }

    pub fn get_written_data(&self) -> &[u8] {
        &self.write_buffer
    }
}

impl AsyncRead for MockStream {
    fn poll_read(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut self.read_cursor).poll_read(cx, buf)
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(
        mut self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<Result<usize, std::io::Error>> {
        self.write_buffer.extend_from_slice(buf);
        std::task::Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), std::io::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), std::io::Error>> {
        std::task::Poll::Ready(Ok(()))
    }
}

/// A controllable mock stream that returns predetermined read sizes to test partial I/O
pub struct ControlledMockStream {
    data: Vec<u8>,
    position: usize,
    read_sizes: Vec<usize>, // Predetermined sizes for each read operation
    read_count: usize,      // Track how many read operations have been performed
}

impl ControlledMockStream {
    /// Create a new ControlledMockStream with data and predetermined read sizes
    pub fn new(data: Vec<u8>, read_sizes: Vec<usize>) -> Self {
        Self {
            data,
            position: 0,
            read_sizes,
            read_count: 0,
        }
    }

    /// Check if all data has been read
    pub fn is_finished(&self) -> bool {
        self.position >= self.data.len()
    }
}

impl AsyncRead for ControlledMockStream {
    fn poll_read(
        mut self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        // If we've read all data, return 0 (EOF)
        if self.position >= self.data.len() {
            return std::task::Poll::Ready(Ok(()));
        }

        // Determine how many bytes to read this time
        let read_size = if self.read_count < self.read_sizes.len() {
            self.read_sizes[self.read_count]
        } else {
            // If we've exhausted predetermined sizes, read remaining data
            self.data.len() - self.position
        };

        // Calculate actual bytes to read (limited by available space and remaining data)
        let remaining_data = self.data.len() - self.position;
        let bytes_to_read =
            std::cmp::min(read_size, std::cmp::min(buf.remaining(), remaining_data));

        if bytes_to_read > 0 {
            // Copy data to the buffer
            let end_pos = self.position + bytes_to_read;
            buf.put_slice(&self.data[self.position..end_pos]);
            self.position = end_pos;
        }

        self.read_count += 1;
        std::task::Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for ControlledMockStream {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
        _buf: &[u8],
    ) -> std::task::Poll<Result<usize, std::io::Error>> {
        // Not used for read testing
        std::task::Poll::Ready(Ok(0))
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), std::io::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), std::io::Error>> {
        std::task::Poll::Ready(Ok(()))
    }
}

/// A mock stream that accepts at most `max_chunk` bytes per write call,
/// simulating a short-write transport.
pub struct ChunkedWriteStream {
    written: Vec<u8>,
    max_chunk: usize,
}

impl ChunkedWriteStream {
    pub fn new(max_chunk: usize) -> Self {
        Self {
            written: Vec::new(),
            max_chunk,
        }
    }

    pub fn get_written_data(&self) -> &[u8] {
        &self.written
    }
}

impl AsyncRead for ChunkedWriteStream {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
        _buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        // Not used for write testing
        std::task::Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for ChunkedWriteStream {
    fn poll_write(
        mut self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<Result<usize, std::io::Error>> {
        let max_chunk = self.max_chunk;
        let accepted = std::cmp::min(max_chunk, buf.len());
        self.written.extend_from_slice(&buf[..accepted]);
        std::task::Poll::Ready(Ok(accepted))
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), std::io::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), std::io::Error>> {
        std::task::Poll::Ready(Ok(()))
    }
}
