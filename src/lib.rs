pub mod cli;
pub mod data;
pub mod error;
pub mod event;
pub mod messages;
pub mod network;

// Re-export key types for easy consumption
pub use data::{EdgeBuffer, EdgeData, CLIENT_ID_KEY};
pub use error::{EdgeError, Result};
pub use event::EdgeEvent;
pub use messages::{Command, CommandHeader, CommandKind, WireConfig, EDGE_DATA_LIMIT};
pub use network::{EdgeHandle, Protocol};
