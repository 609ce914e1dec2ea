// Motion target and completion runtime for the Mantis robot
//
// Commands go out over zenoh to the robot's ROS2 bridge; joint feedback comes
// back on one topic and decides when a limb's motion is complete.

pub mod chassis;
pub mod config;
pub mod error;
pub mod executor;
pub mod feedback;
pub mod ik;
pub mod limb;
pub mod limbs;
pub mod limits;
pub mod messages;
pub mod monitor;
pub mod robot;
pub mod runtime;
pub mod target;
pub mod transport;

pub use config::RobotConfig;
pub use error::{MotionError, Result};
pub use ik::{IkError, IkSolver, Pose};
pub use limb::Limb;
pub use monitor::{MotionStatus, WaitReport};
pub use robot::{FeedbackSink, Robot};
