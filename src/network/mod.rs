pub mod connection;
pub mod handle;
pub(crate) mod handshake;
pub(crate) mod receiver;
pub mod table;

pub use connection::Connection;
pub use handle::{EdgeHandle, Protocol};
pub use table::{ConnectionPair, ConnectionTable};
