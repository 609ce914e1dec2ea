// Motion completion from feedback
//
// A limb is Moving from the moment a command is issued until feedback that
// arrived after the command matches the target within a fixed per-class
// tolerance. Stale or missing feedback never counts as converged.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crate::error::{MotionError, Result};
use crate::executor::to_execution;
use crate::feedback::{FeedbackCache, FeedbackSnapshot};
use crate::limb::Limb;
use crate::target::TargetStateStore;
use crate::transport::LinkState;

/// Per-limb motion status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionStatus {
    Idle,
    Moving,
    Completed,
    TimedOut,
    Stopped,
    /// Connection lost; actual state of the limb is not known
    Unknown,
}

#[derive(Debug, Clone, Copy)]
struct LimbMotion {
    status: MotionStatus,
    /// Identifies the command that set Moving
    generation: u64,
    /// Feedback seq at command time; only later snapshots can complete it
    issued_seq: u64,
}

/// True if every joint of `limb` has feedback within tolerance of `targets`
///
/// `targets` are in execution units (gripper meters, not normalized).
pub fn joints_settled(limb: Limb, targets: &[f64], snapshot: &FeedbackSnapshot) -> bool {
    let tolerance = limb.joint_class().tolerance();
    limb.joint_names()
        .iter()
        .zip(targets)
        .all(|(name, target)| match snapshot.position(name) {
            Some(actual) => (actual - target).abs() <= tolerance,
            None => false,
        })
}

/// Outcome of `wait()`, one status per requested limb
#[derive(Debug, Clone, PartialEq)]
pub struct WaitReport {
    statuses: Vec<(Limb, MotionStatus)>,
}

impl WaitReport {
    pub fn statuses(&self) -> &[(Limb, MotionStatus)] {
        &self.statuses
    }

    pub fn status(&self, limb: Limb) -> Option<MotionStatus> {
        self.statuses
            .iter()
            .find(|(l, _)| *l == limb)
            .map(|(_, status)| *status)
    }

    /// Limbs that did not converge in time
    pub fn timed_out(&self) -> Vec<Limb> {
        self.statuses
            .iter()
            .filter(|(_, status)| *status == MotionStatus::TimedOut)
            .map(|(limb, _)| *limb)
            .collect()
    }

    pub fn all_completed(&self) -> bool {
        self.statuses
            .iter()
            .all(|(_, status)| matches!(status, MotionStatus::Completed | MotionStatus::Idle))
    }

    /// Turn any per-limb timeout into `MotionError::Timeout`
    pub fn into_result(self) -> Result<Self> {
        let limbs = self.timed_out();
        if limbs.is_empty() {
            Ok(self)
        } else {
            Err(MotionError::Timeout { limbs })
        }
    }
}

pub struct CompletionMonitor {
    limbs: Vec<Mutex<LimbMotion>>,
    generation: AtomicU64,
    /// Bumped on every feedback arrival and status change; waiters sleep on it
    events: watch::Sender<u64>,
    stale_after: Duration,
}

impl CompletionMonitor {
    pub fn new(stale_after: Duration) -> Self {
        let idle = LimbMotion {
            status: MotionStatus::Idle,
            generation: 0,
            issued_seq: 0,
        };
        let (events, _) = watch::channel(0);
        Self {
            limbs: Limb::ALL.iter().map(|_| Mutex::new(idle)).collect(),
            generation: AtomicU64::new(0),
            events,
            stale_after,
        }
    }

    fn lock(&self, limb: Limb) -> MutexGuard<'_, LimbMotion> {
        self.limbs[limb.index()]
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn notify(&self) {
        self.events.send_modify(|epoch| *epoch = epoch.wrapping_add(1));
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.events.subscribe()
    }

    pub fn status(&self, limb: Limb) -> MotionStatus {
        self.lock(limb).status
    }

    /// A command was issued: the limb is Moving, whatever it was before
    ///
    /// Returns the generation identifying this command.
    pub fn begin(&self, limb: Limb, feedback_seq: u64) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.lock(limb) = LimbMotion {
            status: MotionStatus::Moving,
            generation,
            issued_seq: feedback_seq,
        };
        self.notify();
        generation
    }

    /// Move a still-running command to `status`; ignored if superseded
    pub fn finish(&self, limb: Limb, generation: u64, status: MotionStatus) -> bool {
        let finished = {
            let mut motion = self.lock(limb);
            if motion.generation == generation && motion.status == MotionStatus::Moving {
                motion.status = status;
                true
            } else {
                false
            }
        };
        if finished {
            debug!("{} -> {:?}", limb, status);
            self.notify();
        }
        finished
    }

    /// Stop request: Moving becomes Stopped, waiters see it immediately
    pub fn stop(&self, limb: Limb) {
        {
            let mut motion = self.lock(limb);
            if motion.status == MotionStatus::Moving {
                motion.status = MotionStatus::Stopped;
            }
        }
        self.notify();
    }

    /// Connection lost: every limb becomes Unknown
    pub fn mark_unknown(&self) {
        for limb in Limb::ALL {
            self.lock(limb).status = MotionStatus::Unknown;
        }
        self.notify();
    }

    /// Connection (re)established: Unknown limbs become Idle
    pub fn reset_unknown(&self) {
        for limb in Limb::ALL {
            let mut motion = self.lock(limb);
            if motion.status == MotionStatus::Unknown {
                motion.status = MotionStatus::Idle;
            }
        }
        self.notify();
    }

    /// Re-evaluate Moving limbs against a freshly ingested snapshot
    pub fn refresh(&self, snapshot: &FeedbackSnapshot, targets: &TargetStateStore) {
        for limb in Limb::JOINTED {
            let motion = *self.lock(limb);
            if motion.status != MotionStatus::Moving || motion.issued_seq >= snapshot.seq {
                continue;
            }
            let goal = to_execution(limb, &targets.joints(limb));
            if joints_settled(limb, &goal, snapshot) {
                self.finish(limb, motion.generation, MotionStatus::Completed);
            }
        }
        // feedback arrival wakes waiters even when nothing completed
        self.notify();
    }

    /// Compare the latest feedback with the target
    ///
    /// Missing or stale feedback counts as still moving. The chassis is
    /// moving while a planned motion runs.
    pub fn is_moving(&self, limb: Limb, targets: &TargetStateStore, feedback: &FeedbackCache) -> bool {
        if limb == Limb::Chassis {
            return self.status(limb) == MotionStatus::Moving;
        }
        let Some(snapshot) = feedback.latest() else {
            return true;
        };
        if snapshot.is_stale(self.stale_after) {
            debug!(
                "Stale feedback for {} ({:?} old), assuming moving",
                limb,
                snapshot.age()
            );
            return true;
        }
        let goal = to_execution(limb, &targets.joints(limb));
        !joints_settled(limb, &goal, &snapshot)
    }

    pub(crate) fn report(&self, limbs: &[Limb]) -> WaitReport {
        WaitReport {
            statuses: limbs.iter().map(|&limb| (limb, self.status(limb))).collect(),
        }
    }

    /// Suspend until none of `limbs` is Moving, or `timeout` elapses
    ///
    /// Limbs still moving at the deadline are marked TimedOut. Losing the
    /// link releases the waiter with `Disconnected`.
    pub async fn wait(
        &self,
        limbs: &[Limb],
        timeout: Duration,
        mut link: watch::Receiver<LinkState>,
    ) -> Result<WaitReport> {
        let deadline = Instant::now() + timeout;
        let mut events = self.subscribe();

        loop {
            events.borrow_and_update();
            if *link.borrow_and_update() != LinkState::Connected {
                warn!("Link lost while waiting for {:?}", limbs);
                return Err(MotionError::Disconnected);
            }

            let pending: Vec<Limb> = limbs
                .iter()
                .copied()
                .filter(|&limb| self.status(limb) == MotionStatus::Moving)
                .collect();
            if pending.is_empty() {
                return Ok(self.report(limbs));
            }

            tokio::select! {
                changed = events.changed() => {
                    if changed.is_err() {
                        return Err(MotionError::Disconnected);
                    }
                }
                changed = link.changed() => {
                    if changed.is_err() {
                        return Err(MotionError::Disconnected);
                    }
                }
                _ = sleep_until(deadline) => {
                    for limb in pending {
                        let generation = self.lock(limb).generation;
                        if self.finish(limb, generation, MotionStatus::TimedOut) {
                            info!("{} did not converge within {:?}", limb, timeout);
                        }
                    }
                    return Ok(self.report(limbs));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::LimitTable;
    use std::collections::HashMap;

    fn head_feedback(cache: &FeedbackCache, pitch: f64, yaw: f64) -> std::sync::Arc<FeedbackSnapshot> {
        cache.store(HashMap::from([
            ("head_pitch".to_string(), pitch),
            ("head_yaw".to_string(), yaw),
        ]))
    }

    fn setup() -> (CompletionMonitor, TargetStateStore, FeedbackCache) {
        (
            CompletionMonitor::new(Duration::from_millis(500)),
            TargetStateStore::new(LimitTable::mantis()),
            FeedbackCache::new(),
        )
    }

    #[test]
    fn test_settled_uses_absolute_tolerance() {
        let cache = FeedbackCache::new();
        // 0.015 rad off on a tiny move is still within the revolute epsilon
        let snapshot = head_feedback(&cache, 0.015, 0.0);
        assert!(joints_settled(Limb::Head, &[0.0, 0.0], &snapshot));
        let snapshot = head_feedback(&cache, 0.05, 0.0);
        assert!(!joints_settled(Limb::Head, &[0.0, 0.0], &snapshot));
    }

    #[test]
    fn test_missing_joint_is_not_settled() {
        let cache = FeedbackCache::new();
        let snapshot = cache.store(HashMap::from([("head_pitch".to_string(), 0.0)]));
        assert!(!joints_settled(Limb::Head, &[0.0, 0.0], &snapshot));
    }

    #[tokio::test(start_paused = true)]
    async fn test_is_moving_until_matching_fresh_feedback() {
        let (monitor, targets, cache) = setup();
        targets.set_joint_vector(Limb::Head, &[-0.3, 0.5]).unwrap();
        assert!(monitor.is_moving(Limb::Head, &targets, &cache));

        head_feedback(&cache, -0.1, 0.2);
        assert!(monitor.is_moving(Limb::Head, &targets, &cache));

        head_feedback(&cache, -0.295, 0.51);
        assert!(!monitor.is_moving(Limb::Head, &targets, &cache));

        // same data, but too old to trust
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(monitor.is_moving(Limb::Head, &targets, &cache));
    }

    #[test]
    fn test_gripper_compared_in_meters() {
        let (monitor, targets, cache) = setup();
        targets.set_joint_vector(Limb::LeftGripper, &[0.5]).unwrap();
        cache.store(HashMap::from([("left_gripper".to_string(), 0.0205)]));
        assert!(!monitor.is_moving(Limb::LeftGripper, &targets, &cache));
        cache.store(HashMap::from([("left_gripper".to_string(), 0.5)]));
        assert!(monitor.is_moving(Limb::LeftGripper, &targets, &cache));
    }

    #[test]
    fn test_refresh_needs_feedback_after_command() {
        let (monitor, targets, cache) = setup();
        let before = head_feedback(&cache, 0.0, 0.0);

        monitor.begin(Limb::Head, cache.seq());
        // a snapshot from before the command cannot complete it
        monitor.refresh(&before, &targets);
        assert_eq!(monitor.status(Limb::Head), MotionStatus::Moving);

        let after = head_feedback(&cache, 0.0, 0.0);
        monitor.refresh(&after, &targets);
        assert_eq!(monitor.status(Limb::Head), MotionStatus::Completed);
    }

    #[test]
    fn test_superseded_generation_is_ignored() {
        let (monitor, _, _) = setup();
        let first = monitor.begin(Limb::Chassis, 0);
        let second = monitor.begin(Limb::Chassis, 0);
        assert!(!monitor.finish(Limb::Chassis, first, MotionStatus::Completed));
        assert_eq!(monitor.status(Limb::Chassis), MotionStatus::Moving);
        assert!(monitor.finish(Limb::Chassis, second, MotionStatus::Completed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_reports_per_limb() {
        let (monitor, targets, cache) = setup();
        let (_link_tx, link) = watch::channel(LinkState::Connected);
        targets.set_joint_vector(Limb::Head, &[0.1, 0.1]).unwrap();
        targets.set_joint_vector(Limb::Waist, &[0.2]).unwrap();
        monitor.begin(Limb::Head, cache.seq());
        monitor.begin(Limb::Waist, cache.seq());

        let waiting = monitor.wait(&[Limb::Head, Limb::Waist], Duration::from_secs(2), link);
        let feeding = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let snapshot = cache.store(HashMap::from([
                ("head_pitch".to_string(), 0.1),
                ("head_yaw".to_string(), 0.1),
                ("waist".to_string(), -0.3),
            ]));
            monitor.refresh(&snapshot, &targets);
        };
        let (report, ()) = tokio::join!(waiting, feeding);
        let report = report.unwrap();

        assert_eq!(report.status(Limb::Head), Some(MotionStatus::Completed));
        assert_eq!(report.status(Limb::Waist), Some(MotionStatus::TimedOut));
        assert_eq!(report.timed_out(), vec![Limb::Waist]);
        assert!(matches!(
            report.into_result(),
            Err(MotionError::Timeout { limbs }) if limbs == vec![Limb::Waist]
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_releases_waiter() {
        let (monitor, _, _) = setup();
        let (_link_tx, link) = watch::channel(LinkState::Connected);
        monitor.begin(Limb::LeftArm, 0);

        let waiting = monitor.wait(&[Limb::LeftArm], Duration::from_secs(60), link);
        let stopping = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            monitor.stop(Limb::LeftArm);
        };
        let start = Instant::now();
        let (report, ()) = tokio::join!(waiting, stopping);
        assert_eq!(
            report.unwrap().status(Limb::LeftArm),
            Some(MotionStatus::Stopped)
        );
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_loss_releases_waiter_with_error() {
        let (monitor, _, _) = setup();
        let (link_tx, link) = watch::channel(LinkState::Connected);
        monitor.begin(Limb::Head, 0);

        let waiting = monitor.wait(&[Limb::Head], Duration::from_secs(60), link);
        let dropping = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            link_tx.send_replace(LinkState::Disconnected);
            monitor.mark_unknown();
        };
        let (result, ()) = tokio::join!(waiting, dropping);
        assert!(matches!(result, Err(MotionError::Disconnected)));
        assert_eq!(monitor.status(Limb::Head), MotionStatus::Unknown);
    }

    #[tokio::test]
    async fn test_idle_limbs_return_immediately() {
        let (monitor, _, _) = setup();
        let (_link_tx, link) = watch::channel(LinkState::Connected);
        let report = monitor
            .wait(&[Limb::RightArm, Limb::Chassis], Duration::from_secs(1), link)
            .await
            .unwrap();
        assert!(report.all_completed());
    }
}
