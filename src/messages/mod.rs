pub mod command;
pub mod wire;

pub use command::{Command, CommandHeader, CommandKind, EDGE_DATA_LIMIT, HEADER_SIZE};
pub use wire::WireConfig;
