// Chassis controller: relative moves at the configured default speeds, or a
// held velocity

use crate::chassis::{FrictionCoeffs, MoveRequest};
use crate::error::Result;
use crate::limb::Limb;
use crate::monitor::MotionStatus;
use crate::robot::Robot;

pub struct Chassis<'a> {
    robot: &'a Robot,
}

impl<'a> Chassis<'a> {
    pub(crate) fn new(robot: &'a Robot) -> Self {
        Self { robot }
    }

    pub fn friction(&self) -> FrictionCoeffs {
        self.robot.friction()
    }

    /// Friction used by every later move of this robot
    pub fn set_friction(&self, friction: FrictionCoeffs) {
        self.robot.set_friction(friction);
    }

    /// Move by (x, y) meters in the body frame and turn by `degrees`
    pub async fn move_by(&self, x: f64, y: f64, degrees: f64, block: bool) -> Result<MotionStatus> {
        let config = self.robot.config();
        let request = MoveRequest {
            x,
            y,
            angle: degrees.to_radians(),
            linear_speed: config.linear_speed,
            angular_speed: config.angular_speed,
            friction: self.friction(),
        };
        self.robot.chassis_move_request(&request, block).await
    }

    pub async fn forward(&self, distance: f64, block: bool) -> Result<MotionStatus> {
        self.move_by(distance.abs(), 0.0, 0.0, block).await
    }

    pub async fn backward(&self, distance: f64, block: bool) -> Result<MotionStatus> {
        self.move_by(-distance.abs(), 0.0, 0.0, block).await
    }

    pub async fn strafe_left(&self, distance: f64, block: bool) -> Result<MotionStatus> {
        self.move_by(0.0, distance.abs(), 0.0, block).await
    }

    pub async fn strafe_right(&self, distance: f64, block: bool) -> Result<MotionStatus> {
        self.move_by(0.0, -distance.abs(), 0.0, block).await
    }

    /// Counter-clockwise turn
    pub async fn turn_left(&self, degrees: f64, block: bool) -> Result<MotionStatus> {
        self.move_by(0.0, 0.0, degrees.abs(), block).await
    }

    pub async fn turn_right(&self, degrees: f64, block: bool) -> Result<MotionStatus> {
        self.move_by(0.0, 0.0, -degrees.abs(), block).await
    }

    /// Drive at (vx, vy) m/s and `omega` rad/s until `stop()` or another move
    pub async fn set_velocity(&self, vx: f64, vy: f64, omega: f64) -> Result<MotionStatus> {
        self.robot.chassis_velocity(vx, vy, omega).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.robot.stop(Limb::Chassis).await
    }

    pub fn is_moving(&self) -> bool {
        self.robot.is_moving(Limb::Chassis)
    }
}
