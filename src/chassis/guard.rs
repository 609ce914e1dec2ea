// Zero-velocity guard for planned chassis motions

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::TOPIC_CHASSIS;
use crate::messages::ChassisVelocity;
use crate::transport::{Transport, publish_json};

/// Publishes zero velocity when dropped
///
/// A planned motion holds one of these for its whole lifetime, so the base
/// is halted on every exit path: normal end, stop, abort or panic.
pub struct HaltGuard {
    transport: Arc<dyn Transport>,
}

impl HaltGuard {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// End the motion now
    pub fn halt(self) {
        drop(self);
    }
}

impl Drop for HaltGuard {
    fn drop(&mut self) {
        debug!("Halting chassis");
        if let Err(e) = publish_json(
            self.transport.as_ref(),
            TOPIC_CHASSIS,
            &ChassisVelocity::zero(),
        ) {
            warn!("Failed to publish chassis halt: {}", e);
        }
    }
}
