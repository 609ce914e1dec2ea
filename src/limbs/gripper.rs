// Gripper control in normalized units (0 = closed, 1 = open)

use std::time::Duration;

use crate::config::GRIPPER_TRAVEL_M;
use crate::error::Result;
use crate::limb::Limb;
use crate::monitor::{MotionStatus, WaitReport};
use crate::robot::Robot;

pub const OPEN: f64 = 1.0;
pub const HALF_OPEN: f64 = 0.5;
pub const CLOSED: f64 = 0.0;

/// Normalized position -> finger travel in meters
pub fn to_joint_value(normalized: f64) -> f64 {
    normalized.clamp(0.0, 1.0) * GRIPPER_TRAVEL_M
}

/// Finger travel in meters -> normalized position
pub fn from_joint_value(meters: f64) -> f64 {
    (meters / GRIPPER_TRAVEL_M).clamp(0.0, 1.0)
}

pub struct Gripper<'a> {
    robot: &'a Robot,
    limb: Limb,
}

impl<'a> Gripper<'a> {
    pub(crate) fn new(robot: &'a Robot, limb: Limb) -> Self {
        debug_assert!(limb.is_gripper());
        Self { robot, limb }
    }

    pub fn limb(&self) -> Limb {
        self.limb
    }

    /// Target position (normalized)
    pub fn position(&self) -> f64 {
        self.robot.target(self.limb).joints[0]
    }

    pub async fn set_position(&self, position: f64, block: bool) -> Result<MotionStatus> {
        self.robot.set_joint(self.limb, 0, position, block).await
    }

    pub async fn open(&self, block: bool) -> Result<MotionStatus> {
        self.set_position(OPEN, block).await
    }

    pub async fn half_open(&self, block: bool) -> Result<MotionStatus> {
        self.set_position(HALF_OPEN, block).await
    }

    pub async fn close(&self, block: bool) -> Result<MotionStatus> {
        self.set_position(CLOSED, block).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.robot.stop(self.limb).await
    }

    pub fn is_moving(&self) -> bool {
        self.robot.is_moving(self.limb)
    }

    pub async fn wait(&self, timeout: Duration) -> Result<WaitReport> {
        self.robot.wait(&[self.limb], timeout).await
    }
}
