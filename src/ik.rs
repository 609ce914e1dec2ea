// Inverse kinematics adapter
//
// The numerical solver is external and sits behind `IkSolver`. The adapter
// validates what comes back and clamps it into the joint limits.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::limb::Limb;
use crate::limits::LimitTable;

/// End-effector pose in the arm's reference frame
///
/// Orientation is roll/pitch/yaw so that incremental deltas add componentwise.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    /// x, y, z in meters
    pub position: [f64; 3],
    /// roll, pitch, yaw in radians
    pub rpy: [f64; 3],
}

impl Pose {
    pub fn new(x: f64, y: f64, z: f64, roll: f64, pitch: f64, yaw: f64) -> Self {
        Self {
            position: [x, y, z],
            rpy: [roll, pitch, yaw],
        }
    }

    /// Pure translation, useful as a delta
    pub fn translation(x: f64, y: f64, z: f64) -> Self {
        Self::new(x, y, z, 0.0, 0.0, 0.0)
    }

    /// This pose shifted by `delta`
    pub fn offset(&self, delta: &Pose) -> Pose {
        let mut out = *self;
        for i in 0..3 {
            out.position[i] += delta.position[i];
            out.rpy[i] += delta.rpy[i];
        }
        out
    }

    /// Unit quaternion `[w, x, y, z]` (ZYX convention)
    pub fn quaternion(&self) -> [f64; 4] {
        let [roll, pitch, yaw] = self.rpy;
        let (sr, cr) = (roll * 0.5).sin_cos();
        let (sp, cp) = (pitch * 0.5).sin_cos();
        let (sy, cy) = (yaw * 0.5).sin_cos();
        [
            cr * cp * cy + sr * sp * sy,
            sr * cp * cy - cr * sp * sy,
            cr * sp * cy + sr * cp * sy,
            cr * cp * sy - sr * sp * cy,
        ]
    }

    pub fn is_finite(&self) -> bool {
        self.position.iter().chain(self.rpy.iter()).all(|v| v.is_finite())
    }
}

/// IK failures; the target state is left unchanged when one is returned
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IkError {
    #[error("target pose is unreachable")]
    Unreachable,

    #[error("solver diverged")]
    NumericalDivergence,

    #[error("solver returned {got} joints, {limb} has {expected}")]
    DimensionMismatch {
        limb: Limb,
        expected: usize,
        got: usize,
    },

    #[error("{0} has no IK chain")]
    UnsupportedLimb(Limb),

    #[error("no IK solver configured")]
    SolverUnavailable,
}

/// Black-box kinematics solver
pub trait IkSolver: Send + Sync {
    /// Forward kinematics of `joints` for `limb`
    fn forward(&self, limb: Limb, joints: &[f64]) -> Result<Pose, IkError>;

    /// Joint values reaching `target`, warm-started from `seed`
    fn solve(&self, limb: Limb, seed: &[f64], target: &Pose) -> Result<Vec<f64>, IkError>;
}

/// Result of a successful IK call after limit clamping
#[derive(Debug, Clone, PartialEq)]
pub struct IkSolution {
    pub joints: Vec<f64>,
    /// True if clamping altered the solver's answer
    pub clamped: bool,
}

/// Wraps the external solver: validation + clamping
pub struct IkAdapter {
    solver: Option<Box<dyn IkSolver>>,
}

impl IkAdapter {
    pub fn new(solver: Box<dyn IkSolver>) -> Self {
        Self {
            solver: Some(solver),
        }
    }

    /// Adapter that fails every call with `SolverUnavailable`
    pub fn unavailable() -> Self {
        Self { solver: None }
    }

    fn solver(&self, limb: Limb) -> Result<&dyn IkSolver, IkError> {
        if !limb.is_arm() {
            return Err(IkError::UnsupportedLimb(limb));
        }
        self.solver.as_deref().ok_or(IkError::SolverUnavailable)
    }

    pub fn forward(&self, limb: Limb, joints: &[f64]) -> Result<Pose, IkError> {
        let pose = self.solver(limb)?.forward(limb, joints)?;
        if !pose.is_finite() {
            return Err(IkError::NumericalDivergence);
        }
        Ok(pose)
    }

    /// Solve for `target` from `seed` and clamp the answer into `limits`
    pub fn solve(
        &self,
        limb: Limb,
        seed: &[f64],
        target: &Pose,
        limits: &LimitTable,
    ) -> Result<IkSolution, IkError> {
        if !target.is_finite() {
            return Err(IkError::NumericalDivergence);
        }
        let mut joints = self.solver(limb)?.solve(limb, seed, target)?;

        if joints.len() != limb.dof() {
            return Err(IkError::DimensionMismatch {
                limb,
                expected: limb.dof(),
                got: joints.len(),
            });
        }
        if joints.iter().any(|q| !q.is_finite()) {
            return Err(IkError::NumericalDivergence);
        }

        let clamped = limits.clamp(limb, &mut joints);
        debug!("IK {} -> {:?} (clamped: {})", limb, joints, clamped);
        Ok(IkSolution { joints, clamped })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::LinearSolver;
    use super::*;

    struct DivergingSolver;

    impl IkSolver for DivergingSolver {
        fn forward(&self, _limb: Limb, _joints: &[f64]) -> Result<Pose, IkError> {
            Ok(Pose::default())
        }

        fn solve(&self, _limb: Limb, _seed: &[f64], _target: &Pose) -> Result<Vec<f64>, IkError> {
            Ok(vec![f64::NAN; 7])
        }
    }

    #[test]
    fn test_offset_adds_componentwise() {
        let pose = Pose::new(0.1, 0.2, 0.3, 0.0, 0.1, 0.0);
        let moved = pose.offset(&Pose::new(0.1, 0.0, -0.1, 0.2, 0.0, 0.0));
        assert!((moved.position[0] - 0.2).abs() < 1e-12);
        assert!((moved.position[2] - 0.2).abs() < 1e-12);
        assert!((moved.rpy[0] - 0.2).abs() < 1e-12);
        assert!((moved.rpy[1] - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_identity_quaternion() {
        assert_eq!(Pose::default().quaternion(), [1.0, 0.0, 0.0, 0.0]);
        let q = Pose::new(0.0, 0.0, 0.0, 0.0, 0.0, std::f64::consts::PI).quaternion();
        assert!(q[0].abs() < 1e-12);
        assert!((q[3] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_solution_is_clamped_and_flagged() {
        let adapter = IkAdapter::new(Box::new(LinearSolver::default()));
        let limits = LimitTable::mantis();
        let seed = [0.0, 0.08, 0.0, 0.0, 0.0, 0.0, 0.0];
        // wrist pitch (index 5) is limited to +-0.52
        let target = Pose::new(0.1, 0.2, 0.0, 0.0, 0.0, 1.0);
        let solution = adapter.solve(Limb::LeftArm, &seed, &target, &limits).unwrap();
        assert!(solution.clamped);
        assert_eq!(solution.joints[5], 0.52);
        assert_eq!(solution.joints[0], 0.1);
    }

    #[test]
    fn test_unreachable_is_surfaced() {
        let adapter = IkAdapter::new(Box::new(LinearSolver { reach: 0.5 }));
        let result = adapter.solve(
            Limb::RightArm,
            &[0.0; 7],
            &Pose::translation(1.0, 0.0, 0.0),
            &LimitTable::mantis(),
        );
        assert_eq!(result, Err(IkError::Unreachable));
    }

    #[test]
    fn test_non_finite_solution_is_divergence() {
        let adapter = IkAdapter::new(Box::new(DivergingSolver));
        let result = adapter.solve(
            Limb::LeftArm,
            &[0.0; 7],
            &Pose::default(),
            &LimitTable::mantis(),
        );
        assert_eq!(result, Err(IkError::NumericalDivergence));
    }

    #[test]
    fn test_only_arms_have_ik() {
        let adapter = IkAdapter::new(Box::new(LinearSolver::default()));
        let result = adapter.forward(Limb::Head, &[0.0, 0.0]);
        assert_eq!(result, Err(IkError::UnsupportedLimb(Limb::Head)));
        let missing = IkAdapter::unavailable().forward(Limb::LeftArm, &[0.0; 7]);
        assert_eq!(missing, Err(IkError::SolverUnavailable));
    }
}
