// 7-DOF arm controller

use std::time::Duration;

use crate::error::Result;
use crate::ik::Pose;
use crate::limb::Limb;
use crate::limits::LimitEntry;
use crate::monitor::{MotionStatus, WaitReport};
use crate::robot::Robot;

/// Arm joints in command order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmJoint {
    ShoulderPitch,
    ShoulderYaw,
    ShoulderRoll,
    ElbowPitch,
    WristRoll,
    WristPitch,
    WristYaw,
}

impl ArmJoint {
    pub const ALL: [ArmJoint; 7] = [
        ArmJoint::ShoulderPitch,
        ArmJoint::ShoulderYaw,
        ArmJoint::ShoulderRoll,
        ArmJoint::ElbowPitch,
        ArmJoint::WristRoll,
        ArmJoint::WristPitch,
        ArmJoint::WristYaw,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

pub struct Arm<'a> {
    robot: &'a Robot,
    limb: Limb,
}

impl<'a> Arm<'a> {
    pub(crate) fn new(robot: &'a Robot, limb: Limb) -> Self {
        debug_assert!(limb.is_arm());
        Self { robot, limb }
    }

    pub fn limb(&self) -> Limb {
        self.limb
    }

    /// Stored joint target
    pub fn joints(&self) -> Vec<f64> {
        self.robot.target(self.limb).joints
    }

    pub fn joint(&self, joint: ArmJoint) -> f64 {
        self.joints()[joint.index()]
    }

    pub fn limits(&self) -> &'a [LimitEntry] {
        self.robot.limits().limb(self.limb)
    }

    pub async fn set_joint(&self, joint: ArmJoint, value: f64, block: bool) -> Result<MotionStatus> {
        self.robot
            .set_joint(self.limb, joint.index(), value, block)
            .await
    }

    pub async fn set_joints(&self, joints: &[f64], block: bool) -> Result<MotionStatus> {
        self.robot.set_joints(self.limb, joints, block).await
    }

    /// Move the end effector by `delta` (or to it, if `absolute`)
    pub async fn ik(&self, pose: Pose, absolute: bool, block: bool) -> Result<MotionStatus> {
        self.robot.ik(self.limb, pose, absolute, block).await
    }

    pub async fn home(&self, block: bool) -> Result<MotionStatus> {
        self.robot.home(self.limb, block).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.robot.stop(self.limb).await
    }

    pub fn is_moving(&self) -> bool {
        self.robot.is_moving(self.limb)
    }

    pub fn status(&self) -> MotionStatus {
        self.robot.status(self.limb)
    }

    pub async fn wait(&self, timeout: Duration) -> Result<WaitReport> {
        self.robot.wait(&[self.limb], timeout).await
    }
}
