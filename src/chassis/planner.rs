// Displacement -> (velocity, duration) planning for the omnidirectional base
//
// Ground friction makes the base cover less distance per second than
// commanded, so the nominal duration is inflated by (1 + friction). The
// planner emits a single constant velocity; ramping is done by the bridge.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{MAX_ANGULAR_SPEED, MAX_LINEAR_SPEED};
use crate::error::{MotionError, Result};

/// Friction compensation factors per axis (0.0 = no compensation)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FrictionCoeffs {
    pub linear: f64,
    pub angular: f64,
}

impl FrictionCoeffs {
    pub fn new(linear: f64, angular: f64) -> Self {
        Self { linear, angular }
    }
}

/// Relative chassis move in the body frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveRequest {
    pub x: f64,     // m, forward
    pub y: f64,     // m, left
    pub angle: f64, // rad, counter-clockwise
    pub linear_speed: f64,
    pub angular_speed: f64,
    pub friction: FrictionCoeffs,
}

/// One constant velocity held for `duration`, then zero
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChassisCommand {
    pub vx: f64,
    pub vy: f64,
    pub omega: f64,
    pub duration: Duration,
}

impl ChassisCommand {
    pub fn idle() -> Self {
        Self {
            vx: 0.0,
            vy: 0.0,
            omega: 0.0,
            duration: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ChassisPlanner {
    max_linear: f64,
    max_angular: f64,
}

impl Default for ChassisPlanner {
    fn default() -> Self {
        Self::new()
    }
}

impl ChassisPlanner {
    pub fn new() -> Self {
        Self::with_limits(MAX_LINEAR_SPEED, MAX_ANGULAR_SPEED)
    }

    pub fn with_limits(max_linear: f64, max_angular: f64) -> Self {
        Self {
            max_linear,
            max_angular,
        }
    }

    /// Straight-line move of `distance` combined with a rotation of `angle`
    pub fn plan(
        &self,
        distance: f64,
        angle: f64,
        linear_speed: f64,
        angular_speed: f64,
        friction: FrictionCoeffs,
    ) -> Result<ChassisCommand> {
        self.plan_move(&MoveRequest {
            x: distance,
            y: 0.0,
            angle,
            linear_speed,
            angular_speed,
            friction,
        })
    }

    /// Plan an arbitrary (x, y, angle) move
    ///
    /// Combined moves take the longer of the two inflated axis durations; the
    /// other axis is slowed down so both finish together.
    pub fn plan_move(&self, req: &MoveRequest) -> Result<ChassisCommand> {
        let inputs = [
            req.x,
            req.y,
            req.angle,
            req.linear_speed,
            req.angular_speed,
            req.friction.linear,
            req.friction.angular,
        ];
        if inputs.iter().any(|v| !v.is_finite()) {
            return Err(MotionError::InvalidRequest(format!(
                "non-finite chassis request {:?}",
                req
            )));
        }
        if req.friction.linear < 0.0 || req.friction.angular < 0.0 {
            return Err(MotionError::InvalidRequest(format!(
                "negative friction {:?}",
                req.friction
            )));
        }

        let distance = req.x.hypot(req.y);
        let linear_gain = 1.0 + req.friction.linear;
        let angular_gain = 1.0 + req.friction.angular;

        // Speed sign comes from the displacement; magnitude is capped
        let linear_speed = req.linear_speed.abs().min(self.max_linear);
        let angular_speed = req.angular_speed.abs().min(self.max_angular);

        let linear_time = axis_time(distance, linear_speed, linear_gain, "linear")?;
        let angular_time = axis_time(req.angle.abs(), angular_speed, angular_gain, "angular")?;
        let duration = linear_time.max(angular_time);

        if duration == 0.0 {
            return Ok(ChassisCommand::idle());
        }

        let hold = Duration::try_from_secs_f64(duration).map_err(|e| {
            MotionError::InvalidRequest(format!("planned duration {}s: {}", duration, e))
        })?;

        Ok(ChassisCommand {
            vx: req.x * linear_gain / duration,
            vy: req.y * linear_gain / duration,
            omega: req.angle * angular_gain / duration,
            duration: hold,
        })
    }
}

/// Inflated time (seconds) to cover `amount` at `speed`
fn axis_time(amount: f64, speed: f64, gain: f64, axis: &str) -> Result<f64> {
    if amount == 0.0 {
        return Ok(0.0);
    }
    if speed <= 0.0 {
        return Err(MotionError::InvalidRequest(format!(
            "{} speed must be positive to move {}",
            axis, amount
        )));
    }
    Ok(amount / speed * gain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_friction_inflates_duration() {
        let planner = ChassisPlanner::new();
        let cmd = planner
            .plan(1.0, 0.0, 1.0, 1.0, FrictionCoeffs::new(0.1, 0.0))
            .unwrap();
        assert!(close(cmd.duration.as_secs_f64(), 1.1), "{:?}", cmd);
        assert!(close(cmd.vx, 1.0));
        assert_eq!(cmd.vy, 0.0);
        assert_eq!(cmd.omega, 0.0);
    }

    #[test]
    fn test_velocity_sign_follows_request() {
        let planner = ChassisPlanner::new();
        let cmd = planner
            .plan(-0.5, 0.0, 0.25, 0.3, FrictionCoeffs::default())
            .unwrap();
        assert!(close(cmd.duration.as_secs_f64(), 2.0));
        assert!(close(cmd.vx, -0.25));

        let turn = planner
            .plan(0.0, -FRAC_PI_2, 0.1, -0.5, FrictionCoeffs::new(0.0, 0.2))
            .unwrap();
        assert!(close(turn.duration.as_secs_f64(), FRAC_PI_2 / 0.5 * 1.2));
        assert!(close(turn.omega, -0.5));
    }

    #[test]
    fn test_speeds_clamped_to_maxima() {
        let planner = ChassisPlanner::new();
        let cmd = planner
            .plan(6.0, 0.0, 10.0, 1.0, FrictionCoeffs::default())
            .unwrap();
        assert!(close(cmd.vx, MAX_LINEAR_SPEED));
        assert!(close(cmd.duration.as_secs_f64(), 2.0));

        let spin = planner
            .plan(0.0, 4.0, 1.0, 8.0, FrictionCoeffs::default())
            .unwrap();
        assert!(close(spin.omega, MAX_ANGULAR_SPEED));
    }

    #[test]
    fn test_combined_move_uses_longest_axis() {
        let planner = ChassisPlanner::new();
        // translation needs 2s, rotation needs 1s
        let cmd = planner
            .plan(0.2, 0.3, 0.1, 0.3, FrictionCoeffs::default())
            .unwrap();
        assert!(close(cmd.duration.as_secs_f64(), 2.0));
        assert!(close(cmd.vx, 0.1));
        assert!(close(cmd.omega, 0.15));
    }

    #[test]
    fn test_diagonal_move_splits_speed() {
        let planner = ChassisPlanner::new();
        let cmd = planner
            .plan_move(&MoveRequest {
                x: 0.3,
                y: -0.4,
                angle: 0.0,
                linear_speed: 0.1,
                angular_speed: 0.3,
                friction: FrictionCoeffs::new(0.5, 0.0),
            })
            .unwrap();
        // |d| = 0.5 -> 5s nominal, 7.5s inflated
        assert!(close(cmd.duration.as_secs_f64(), 7.5));
        assert!(close(cmd.vx, 0.06));
        assert!(close(cmd.vy, -0.08));
    }

    #[test]
    fn test_empty_move_is_idle() {
        let planner = ChassisPlanner::new();
        let cmd = planner
            .plan(0.0, 0.0, 0.0, 0.0, FrictionCoeffs::default())
            .unwrap();
        assert_eq!(cmd, ChassisCommand::idle());
    }

    #[test]
    fn test_unrepresentable_duration_is_rejected() {
        let planner = ChassisPlanner::new();
        let result = planner.plan(1.0, 0.0, 1e-300, 0.3, FrictionCoeffs::default());
        assert!(matches!(result, Err(MotionError::InvalidRequest(_))));

        let result = planner.plan(0.0, 1.0, 0.1, 1e-300, FrictionCoeffs::default());
        assert!(matches!(result, Err(MotionError::InvalidRequest(_))));
    }

    #[test]
    fn test_invalid_requests() {
        let planner = ChassisPlanner::new();
        assert!(planner
            .plan(1.0, 0.0, 0.0, 0.3, FrictionCoeffs::default())
            .is_err());
        assert!(planner
            .plan(f64::NAN, 0.0, 0.1, 0.3, FrictionCoeffs::default())
            .is_err());
        assert!(planner
            .plan(1.0, 0.0, 0.1, 0.3, FrictionCoeffs::new(-0.5, 0.0))
            .is_err());
    }
}
