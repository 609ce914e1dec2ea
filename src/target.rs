// Per-limb authoritative target state
//
// Every control path (direct joints, IK, home, stop) writes through here.
// Incremental IK accumulates on the stored target pose, never on feedback.

use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::error::{MotionError, Result};
use crate::ik::{IkAdapter, IkError, IkSolution, Pose};
use crate::limb::Limb;
use crate::limits::LimitTable;

/// Desired configuration of one limb
#[derive(Debug, Clone, PartialEq)]
pub struct TargetState {
    pub joints: Vec<f64>,
    /// Last IK target pose, if any IK call happened
    pub ik_pose: Option<Pose>,
    /// Set by absolute joint writes: `ik_pose` must be recomputed from `joints`
    pub pose_stale: bool,
}

impl TargetState {
    fn home(limb: Limb, limits: &LimitTable) -> Self {
        let mut joints = vec![0.0; limb.dof()];
        limits.clamp(limb, &mut joints);
        Self {
            joints,
            ik_pose: None,
            pose_stale: true,
        }
    }

    /// Pose the next incremental IK call starts from
    fn base_pose(&self, limb: Limb, ik: &IkAdapter) -> std::result::Result<Pose, IkError> {
        match self.ik_pose {
            Some(pose) if !self.pose_stale => Ok(pose),
            _ => ik.forward(limb, &self.joints),
        }
    }
}

/// One lock per limb; limbs never share a lock
pub struct TargetStateStore {
    limits: LimitTable,
    limbs: Vec<Mutex<TargetState>>,
}

impl TargetStateStore {
    /// All jointed limbs start at their (clamped) home configuration
    pub fn new(limits: LimitTable) -> Self {
        let limbs = Limb::ALL
            .iter()
            .map(|&limb| Mutex::new(TargetState::home(limb, &limits)))
            .collect();
        Self { limits, limbs }
    }

    pub fn limits(&self) -> &LimitTable {
        &self.limits
    }

    fn lock(&self, limb: Limb) -> MutexGuard<'_, TargetState> {
        // a panic while holding the lock cannot leave a half-written Vec behind
        self.limbs[limb.index()]
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Copy of the current target
    pub fn get(&self, limb: Limb) -> TargetState {
        self.lock(limb).clone()
    }

    pub fn joints(&self, limb: Limb) -> Vec<f64> {
        self.lock(limb).joints.clone()
    }

    fn check_jointed(limb: Limb) -> Result<()> {
        if limb == Limb::Chassis {
            return Err(MotionError::Unsupported {
                limb,
                operation: "joint targets",
            });
        }
        Ok(())
    }

    fn check_finite(values: &[f64]) -> Result<()> {
        if values.iter().any(|v| !v.is_finite()) {
            return Err(MotionError::InvalidRequest(format!(
                "non-finite joint value in {:?}",
                values
            )));
        }
        Ok(())
    }

    /// Store a whole joint vector (clamped); returns whether clamping happened
    pub fn set_joint_vector(&self, limb: Limb, vector: &[f64]) -> Result<bool> {
        Self::check_jointed(limb)?;
        if vector.len() != limb.dof() {
            return Err(MotionError::DimensionMismatch {
                limb,
                expected: limb.dof(),
                got: vector.len(),
            });
        }
        Self::check_finite(vector)?;

        let mut joints = vector.to_vec();
        let clamped = self.limits.clamp(limb, &mut joints);

        let mut state = self.lock(limb);
        state.joints = joints;
        state.pose_stale = true;
        Ok(clamped)
    }

    /// Store one joint (clamped); the other joints keep their target
    pub fn set_joint(&self, limb: Limb, index: usize, value: f64) -> Result<bool> {
        Self::check_jointed(limb)?;
        if index >= limb.dof() {
            return Err(MotionError::InvalidJointIndex {
                limb,
                index,
                len: limb.dof(),
            });
        }
        Self::check_finite(&[value])?;

        let (limited, clamped) = self.limits.clamp_joint(limb, index, value);

        let mut state = self.lock(limb);
        state.joints[index] = limited;
        state.pose_stale = true;
        Ok(clamped)
    }

    /// Read-modify-write of the joint target under the limb's lock
    ///
    /// `edit` sees the current target; its result is checked, clamped and
    /// committed before the lock is released, so concurrent edits of the
    /// same limb never lose each other's changes.
    pub fn update<F>(&self, limb: Limb, edit: F) -> Result<bool>
    where
        F: FnOnce(&mut [f64]),
    {
        Self::check_jointed(limb)?;
        let mut state = self.lock(limb);

        let mut joints = state.joints.clone();
        edit(&mut joints);
        Self::check_finite(&joints)?;
        let clamped = self.limits.clamp(limb, &mut joints);

        state.joints = joints;
        state.pose_stale = true;
        Ok(clamped)
    }

    /// Move the IK target by `delta` (or to it, if `absolute`) and commit the solution
    ///
    /// The pose, the solve and the commit happen under the limb's lock. On any
    /// IK error the stored target is left as it was.
    pub fn set_pose_delta(
        &self,
        limb: Limb,
        delta: &Pose,
        absolute: bool,
        ik: &IkAdapter,
    ) -> Result<IkSolution> {
        let mut state = self.lock(limb);

        let target = if absolute {
            *delta
        } else {
            state.base_pose(limb, ik)?.offset(delta)
        };
        let solution = ik.solve(limb, &state.joints, &target, &self.limits)?;

        debug!("{} IK target {:?}", limb, target);
        state.joints = solution.joints.clone();
        state.ik_pose = Some(target);
        state.pose_stale = false;
        Ok(solution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ik::testing::LinearSolver;

    fn store() -> (TargetStateStore, IkAdapter) {
        (
            TargetStateStore::new(LimitTable::mantis()),
            IkAdapter::new(Box::new(LinearSolver::default())),
        )
    }

    fn assert_close(a: &[f64], b: &[f64]) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < 1e-9, "{:?} != {:?}", a, b);
        }
    }

    #[test]
    fn test_home_is_clamped_zero() {
        let (store, _) = store();
        assert_eq!(store.joints(Limb::LeftArm)[1], 0.08);
        assert_eq!(store.joints(Limb::RightArm)[1], -0.08);
        assert_eq!(store.joints(Limb::Head), vec![0.0, 0.0]);
        assert!(store.get(Limb::LeftArm).pose_stale);
    }

    #[test]
    fn test_out_of_range_vector_is_stored_clamped() {
        let (store, _) = store();
        let clamped = store.set_joint_vector(Limb::Head, &[1.0, -3.0]).unwrap();
        assert!(clamped);
        assert_eq!(store.joints(Limb::Head), vec![0.2, -1.57]);
    }

    #[test]
    fn test_set_joint_uses_that_joints_limit() {
        let (store, _) = store();
        assert!(store.set_joint(Limb::LeftArm, 5, 1.0).unwrap());
        assert_eq!(store.joints(Limb::LeftArm)[5], 0.52);
        assert!(!store.set_joint(Limb::LeftArm, 0, -1.0).unwrap());
        assert_eq!(store.joints(Limb::LeftArm)[0], -1.0);
    }

    #[test]
    fn test_bad_requests_are_rejected() {
        let (store, _) = store();
        assert!(matches!(
            store.set_joint_vector(Limb::LeftArm, &[0.0; 3]),
            Err(MotionError::DimensionMismatch { expected: 7, got: 3, .. })
        ));
        assert!(matches!(
            store.set_joint(Limb::Head, 2, 0.0),
            Err(MotionError::InvalidJointIndex { index: 2, .. })
        ));
        assert!(matches!(
            store.set_joint(Limb::Head, 0, f64::NAN),
            Err(MotionError::InvalidRequest(_))
        ));
        assert!(matches!(
            store.set_joint_vector(Limb::Chassis, &[]),
            Err(MotionError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_update_edits_current_target() {
        let (store, _) = store();
        store.set_joint_vector(Limb::Head, &[0.1, 0.5]).unwrap();
        let clamped = store.update(Limb::Head, |joints| joints[0] -= 0.3).unwrap();
        assert!(!clamped);
        assert_close(&store.joints(Limb::Head), &[-0.2, 0.5]);

        assert!(store.update(Limb::Waist, |joints| joints[0] += 1.0).unwrap());
        assert_eq!(store.joints(Limb::Waist), vec![0.24]);

        let before = store.get(Limb::Head);
        assert!(matches!(
            store.update(Limb::Head, |joints| joints[1] = f64::INFINITY),
            Err(MotionError::InvalidRequest(_))
        ));
        assert_eq!(store.get(Limb::Head), before);
        assert!(matches!(
            store.update(Limb::Chassis, |_| {}),
            Err(MotionError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let (store, _) = store();
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..100 {
                        store.update(Limb::Head, |joints| joints[1] += 0.001).unwrap();
                    }
                });
            }
        });
        assert!((store.joints(Limb::Head)[1] - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_incremental_deltas_compose() {
        let (a, ik) = store();
        let (b, _) = store();
        let d1 = Pose::new(0.1, -0.05, 0.2, 0.1, 0.0, -0.2);
        let d2 = Pose::new(-0.03, 0.3, 0.05, 0.05, 0.1, 0.3);

        a.set_pose_delta(Limb::LeftArm, &d1, false, &ik).unwrap();
        a.set_pose_delta(Limb::LeftArm, &d2, false, &ik).unwrap();
        b.set_pose_delta(Limb::LeftArm, &d1.offset(&d2), false, &ik)
            .unwrap();

        assert_close(&a.joints(Limb::LeftArm), &b.joints(Limb::LeftArm));
        let pa = a.get(Limb::LeftArm).ik_pose.unwrap();
        let pb = b.get(Limb::LeftArm).ik_pose.unwrap();
        assert_close(&pa.position, &pb.position);
        assert_close(&pa.rpy, &pb.rpy);
    }

    #[test]
    fn test_delta_after_set_joint_starts_from_new_joints() {
        let (store, ik) = store();
        store
            .set_pose_delta(Limb::LeftArm, &Pose::translation(0.3, 0.3, 0.3), false, &ik)
            .unwrap();
        // absolute joint write after an IK call
        store.set_joint(Limb::LeftArm, 0, -0.5).unwrap();
        assert!(store.get(Limb::LeftArm).pose_stale);

        store
            .set_pose_delta(Limb::LeftArm, &Pose::translation(0.1, 0.0, 0.0), false, &ik)
            .unwrap();
        let joints = store.joints(Limb::LeftArm);
        assert!((joints[0] - (-0.4)).abs() < 1e-9, "{:?}", joints);
        assert!((joints[1] - 0.38).abs() < 1e-9);
    }

    #[test]
    fn test_absolute_pose_replaces_target() {
        let (store, ik) = store();
        store
            .set_pose_delta(Limb::RightArm, &Pose::translation(0.2, 0.0, 0.0), false, &ik)
            .unwrap();
        let goal = Pose::new(0.0, -0.5, 0.1, 0.0, 0.0, 0.0);
        store.set_pose_delta(Limb::RightArm, &goal, true, &ik).unwrap();
        assert_eq!(store.get(Limb::RightArm).ik_pose, Some(goal));
        assert_eq!(store.joints(Limb::RightArm)[1], -0.5);
    }

    #[test]
    fn test_failed_ik_leaves_target_unchanged() {
        let store = TargetStateStore::new(LimitTable::mantis());
        let ik = IkAdapter::new(Box::new(LinearSolver { reach: 0.5 }));
        store
            .set_pose_delta(Limb::LeftArm, &Pose::translation(0.4, 0.1, 0.0), false, &ik)
            .unwrap();
        let before = store.get(Limb::LeftArm);

        let err = store
            .set_pose_delta(Limb::LeftArm, &Pose::translation(0.4, 0.0, 0.0), false, &ik)
            .unwrap_err();
        assert!(matches!(err, MotionError::Ik(IkError::Unreachable)));
        assert_eq!(store.get(Limb::LeftArm), before);
    }
}
