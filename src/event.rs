//! Asynchronous events delivered to the handle's registered callback.

use crate::data::EdgeData;
use crate::error::Result;

/// Events raised by the transport toward the owning application.
///
/// `Capability` is raised during the connect-side handshake; returning an
/// error from the callback rejects the peer and aborts the handshake.
/// A non-success return from `NewDataReceived` is advisory only.
#[derive(Debug)]
pub enum EdgeEvent {
    /// Peer capability string received during handshake, for compatibility
    /// checks by the consumer.
    Capability { caps: String },
    /// A data frame arrived on an inbound connection.
    NewDataReceived { data: EdgeData },
    /// The previously registered callback is being replaced.
    CallbackReleased,
}

impl EdgeEvent {
    /// Get the event kind as a string, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            EdgeEvent::Capability { .. } => "Capability",
            EdgeEvent::NewDataReceived { .. } => "NewDataReceived",
            EdgeEvent::CallbackReleased => "CallbackReleased",
        }
    }
}

/// Callback invoked for every transport event.
///
/// Callbacks are plain synchronous functions; consumers that need to call
/// back into the handle (for example to `respond`) should forward the event
/// through a channel to their own task.
pub type EventCallback = dyn Fn(EdgeEvent) -> Result<()> + Send + Sync;
