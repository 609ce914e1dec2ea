// Error types for the motion runtime

use crate::ik::IkError;
use crate::limb::Limb;

/// Boxed error used at the binary edge and by feedback callbacks
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T> = std::result::Result<T, MotionError>;

/// Errors raised while publishing commands
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Zenoh error: {0}")]
    Zenoh(String),

    #[error("Failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("No publisher declared for topic {0}")]
    NoPublisher(String),

    #[error("No joint feedback received within {0:?}")]
    NoFeedback(std::time::Duration),
}

/// Errors surfaced to callers of the robot API
///
/// Every variant is scoped to the call or limb that raised it.
#[derive(Debug, thiserror::Error)]
pub enum MotionError {
    #[error("Not connected to the robot")]
    Disconnected,

    #[error("IK failed: {0}")]
    Ik(#[from] IkError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Timed out waiting for {limbs:?}")]
    Timeout { limbs: Vec<Limb> },

    #[error("Joint index {index} out of range for {limb} ({len} joints)")]
    InvalidJointIndex { limb: Limb, index: usize, len: usize },

    #[error("{limb} expects {expected} joint values, got {got}")]
    DimensionMismatch {
        limb: Limb,
        expected: usize,
        got: usize,
    },

    #[error("{operation} is not supported for {limb}")]
    Unsupported {
        limb: Limb,
        operation: &'static str,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
