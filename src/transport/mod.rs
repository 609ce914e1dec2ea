// Transport layer: how commands leave the runtime
//
// Provides:
// - The `Transport` publish seam used by the executor
// - A zenoh implementation talking to the robot bridge
// - An in-memory mock for tests and dry runs

mod mock;
mod zenoh_link;

pub use mock::MockTransport;
pub use zenoh_link::{FeedbackSubscriber, ZenohLink};

use serde::Serialize;

use crate::error::TransportError;

/// Publish side of the robot connection
///
/// Publishing is synchronous so it can also run from `Drop` (see `HaltGuard`).
pub trait Transport: Send + Sync {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError>;
}

/// Encode `message` as JSON and publish it
pub fn publish_json<T: Serialize + ?Sized>(
    transport: &dyn Transport,
    topic: &str,
    message: &T,
) -> Result<(), TransportError> {
    let payload = serde_json::to_vec(message)?;
    transport.publish(topic, payload)
}

/// Whether commands can currently reach the robot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connected,
}
