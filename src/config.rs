// Timeouts, topics, tolerances and the loadable robot configuration
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chassis::FrictionCoeffs;
use crate::error::MotionError;

// Feedback watchdog frequency
pub const LOOP_HZ: u64 = 50;

// Feedback older than this is treated as unknown
pub const FEEDBACK_STALE_AFTER: Duration = Duration::from_millis(500);

// Default bound for blocking commands
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

// Extra time a blocking chassis move waits beyond its planned duration
pub const CHASSIS_SETTLE_MARGIN: Duration = Duration::from_secs(1);

// How long connect() waits for the first feedback message
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// Zenoh router port on the robot
pub const DEFAULT_PORT: u16 = 7447;

// Snapshots queued for feedback callbacks; newer ones are dropped when full
pub const CALLBACK_QUEUE_DEPTH: usize = 64;

// Zenoh topics (bridged ROS2 topics on the robot)
pub const TOPIC_JOINT_CMD: &str = "Teleop/joint_angle_solution/smooth"; // both arms
pub const TOPIC_GRIPPER: &str = "Teleop/gripper_pos";
pub const TOPIC_HEAD: &str = "Teleop/head_pose";
pub const TOPIC_WAIST: &str = "Teleop/pelvis_speed";
pub const TOPIC_CHASSIS: &str = "Teleop/cmd_vel";
pub const TOPIC_JOINT_FEEDBACK: &str = "joint_states_fdb";

/// Every topic the runtime publishes on
pub const COMMAND_TOPICS: [&str; 5] = [
    TOPIC_JOINT_CMD,
    TOPIC_GRIPPER,
    TOPIC_HEAD,
    TOPIC_WAIST,
    TOPIC_CHASSIS,
];

// Chassis safety limits
pub const MAX_LINEAR_SPEED: f64 = 3.0; // m/s
pub const MAX_ANGULAR_SPEED: f64 = 2.0; // rad/s

// Chassis defaults for the convenience moves
pub const DEFAULT_LINEAR_SPEED: f64 = 0.1; // m/s
pub const DEFAULT_ANGULAR_SPEED: f64 = 0.3; // rad/s

// Gripper travel at the execution boundary
pub const GRIPPER_TRAVEL_M: f64 = 0.04;

// Convergence tolerances per joint class
pub const REVOLUTE_TOLERANCE: f64 = 0.02; // rad
pub const GRIPPER_TOLERANCE: f64 = 0.002; // m
pub const PRISMATIC_TOLERANCE: f64 = 0.005; // m

/// Robot connection and motion configuration
///
/// Every field has a default, so a config file only needs the values it changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    /// Robot IP; `None` relies on zenoh scouting on the local network
    pub ip: Option<String>,
    pub port: u16,
    /// Require a feedback message before connect() succeeds
    pub verify: bool,
    pub connect_timeout_ms: u64,
    pub wait_timeout_ms: u64,
    pub stale_after_ms: u64,
    pub friction: FrictionCoeffs,
    pub linear_speed: f64,
    pub angular_speed: f64,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            ip: None,
            port: DEFAULT_PORT,
            verify: true,
            connect_timeout_ms: CONNECT_TIMEOUT.as_millis() as u64,
            wait_timeout_ms: DEFAULT_WAIT_TIMEOUT.as_millis() as u64,
            stale_after_ms: FEEDBACK_STALE_AFTER.as_millis() as u64,
            friction: FrictionCoeffs::default(),
            linear_speed: DEFAULT_LINEAR_SPEED,
            angular_speed: DEFAULT_ANGULAR_SPEED,
        }
    }
}

impl RobotConfig {
    /// Load a JSON config file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, MotionError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| MotionError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, MotionError> {
        serde_json::from_str(raw).map_err(|e| MotionError::Config(e.to_string()))
    }

    /// Zenoh endpoint of the robot router, e.g. `tcp/192.168.1.111:7447`
    pub fn router_endpoint(&self) -> Option<String> {
        self.ip.as_ref().map(|ip| format!("tcp/{}:{}", ip, self.port))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }
}
