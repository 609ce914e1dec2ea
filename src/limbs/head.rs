// Head controller: pitch + yaw

use crate::error::Result;
use crate::limb::Limb;
use crate::monitor::MotionStatus;
use crate::robot::Robot;

pub const DEFAULT_LOOK_YAW: f64 = 0.5;
pub const DEFAULT_LOOK_PITCH: f64 = 0.3;

pub struct Head<'a> {
    robot: &'a Robot,
}

impl<'a> Head<'a> {
    pub(crate) fn new(robot: &'a Robot) -> Self {
        Self { robot }
    }

    pub fn pitch(&self) -> f64 {
        self.robot.target(Limb::Head).joints[0]
    }

    pub fn yaw(&self) -> f64 {
        self.robot.target(Limb::Head).joints[1]
    }

    /// Set either angle, keeping the other one's target
    pub async fn set_pose(&self, pitch: Option<f64>, yaw: Option<f64>, block: bool) -> Result<MotionStatus> {
        let edit = |joints: &mut [f64]| {
            if let Some(pitch) = pitch {
                joints[0] = pitch;
            }
            if let Some(yaw) = yaw {
                joints[1] = yaw;
            }
        };
        self.robot.update_joints(Limb::Head, edit, block).await
    }

    // Look helpers set absolute angles; the sign is fixed by the direction.
    // `None` uses DEFAULT_LOOK_YAW / DEFAULT_LOOK_PITCH.
    pub async fn look_left(&self, yaw: Option<f64>, block: bool) -> Result<MotionStatus> {
        let yaw = yaw.unwrap_or(DEFAULT_LOOK_YAW).abs();
        self.set_pose(None, Some(yaw), block).await
    }

    pub async fn look_right(&self, yaw: Option<f64>, block: bool) -> Result<MotionStatus> {
        let yaw = yaw.unwrap_or(DEFAULT_LOOK_YAW).abs();
        self.set_pose(None, Some(-yaw), block).await
    }

    // up is negative pitch
    pub async fn look_up(&self, pitch: Option<f64>, block: bool) -> Result<MotionStatus> {
        let pitch = pitch.unwrap_or(DEFAULT_LOOK_PITCH).abs();
        self.set_pose(Some(-pitch), None, block).await
    }

    pub async fn look_down(&self, pitch: Option<f64>, block: bool) -> Result<MotionStatus> {
        let pitch = pitch.unwrap_or(DEFAULT_LOOK_PITCH).abs();
        self.set_pose(Some(pitch), None, block).await
    }

    pub async fn center(&self, block: bool) -> Result<MotionStatus> {
        self.robot.home(Limb::Head, block).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.robot.stop(Limb::Head).await
    }

    pub fn is_moving(&self) -> bool {
        self.robot.is_moving(Limb::Head)
    }
}
