//! The transport collaborator this core is built against
//!
//! Socket handling, reconnection and the full command surface of the wire
//! protocol live outside this crate. The containers only need three things
//! from a connection: fire a command, fetch a query result, and subscribe to
//! the multiplexed event stream. Everything is injected as an
//! `Arc<dyn Transport>` at container construction, so tests script a mock and
//! the real client plugs in its socket layer.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

/// Which domain an inbound server event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventDomain {
    Player,
    Queue,
    Library,
}

/// One inbound push from the server.
///
/// Player and queue events carry a target id; a container drops events whose
/// target does not match its current selection.
#[derive(Debug, Clone)]
pub struct ServerEvent {
    pub domain: EventDomain,
    pub target_id: Option<String>,
    pub payload: Value,
}

/// Failures reported by the transport for a single attempt. Retry policy, if
/// any, belongs to the transport itself, not to this layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("not connected")]
    NotConnected,
    #[error("rejected by server: {0}")]
    Rejected(String),
}

/// Opaque command-and-event API of the server connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fire-and-confirm command ("player/play", "player/volume", ...).
    async fn issue_command(&self, name: &str, args: Value) -> Result<(), TransportError>;

    /// Request/response query used for page fetches and search.
    async fn fetch_query(&self, command: &str, args: Value) -> Result<Value, TransportError>;

    /// Subscribe to the server's push events for one domain. Each call
    /// returns an independent receiver; dropping it ends the subscription.
    fn subscribe(&self, domain: EventDomain) -> mpsc::Receiver<ServerEvent>;
}
