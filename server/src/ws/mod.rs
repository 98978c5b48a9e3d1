pub mod actor;
pub mod events;
pub mod handler;
pub mod protocol;

use tokio::sync::mpsc;

/// Type alias for the sender half of a WebSocket connection's channel.
/// The session loop holds one per connection to push events to that client.
pub type ConnectionSender = mpsc::UnboundedSender<axum::extract::ws::Message>;
