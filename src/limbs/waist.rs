// Waist (prismatic lift) controller, heights in meters

use crate::error::Result;
use crate::limb::Limb;
use crate::monitor::MotionStatus;
use crate::robot::Robot;

pub const DEFAULT_STEP: f64 = 0.05;

pub struct Waist<'a> {
    robot: &'a Robot,
}

impl<'a> Waist<'a> {
    pub(crate) fn new(robot: &'a Robot) -> Self {
        Self { robot }
    }

    /// Target height
    pub fn height(&self) -> f64 {
        self.robot.target(Limb::Waist).joints[0]
    }

    pub async fn set_height(&self, height: f64, block: bool) -> Result<MotionStatus> {
        self.robot.set_joints(Limb::Waist, &[height], block).await
    }

    /// Raise the target by `step` (DEFAULT_STEP if `None`)
    pub async fn up(&self, step: Option<f64>, block: bool) -> Result<MotionStatus> {
        self.step_by(step.unwrap_or(DEFAULT_STEP).abs(), block).await
    }

    pub async fn down(&self, step: Option<f64>, block: bool) -> Result<MotionStatus> {
        self.step_by(-step.unwrap_or(DEFAULT_STEP).abs(), block).await
    }

    async fn step_by(&self, delta: f64, block: bool) -> Result<MotionStatus> {
        self.robot
            .update_joints(Limb::Waist, |joints| joints[0] += delta, block)
            .await
    }

    pub async fn home(&self, block: bool) -> Result<MotionStatus> {
        self.robot.home(Limb::Waist, block).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.robot.stop(Limb::Waist).await
    }

    pub fn is_moving(&self) -> bool {
        self.robot.is_moving(Limb::Waist)
    }
}
