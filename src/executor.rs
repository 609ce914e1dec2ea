// Command dispatch to the robot bridge
//
// Joint limbs publish their stored target. The chassis either runs one
// planned velocity for a bounded time inside its own task, guarded so that
// zero velocity is always published at the end, or holds a caller velocity
// until something stops or replaces it.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::chassis::{ChassisCommand, HaltGuard};
use crate::config::{TOPIC_CHASSIS, TOPIC_GRIPPER, TOPIC_HEAD, TOPIC_JOINT_CMD, TOPIC_WAIST};
use crate::error::TransportError;
use crate::limb::Limb;
use crate::limbs::gripper::{from_joint_value, to_joint_value};
use crate::messages::{ChassisVelocity, JointState};
use crate::monitor::{CompletionMonitor, MotionStatus};
use crate::target::TargetStateStore;
use crate::transport::{Transport, publish_json};

/// Target values as the bridge expects them (gripper meters)
pub fn to_execution(limb: Limb, joints: &[f64]) -> Vec<f64> {
    if limb.is_gripper() {
        joints.iter().map(|&v| to_joint_value(v)).collect()
    } else {
        joints.to_vec()
    }
}

/// Inverse of `to_execution`, for turning feedback into targets
pub fn from_execution(limb: Limb, values: &[f64]) -> Vec<f64> {
    if limb.is_gripper() {
        values.iter().map(|&v| from_joint_value(v)).collect()
    } else {
        values.to_vec()
    }
}

// Limbs sharing one command topic
pub const ARMS: &[Limb] = &[Limb::LeftArm, Limb::RightArm];
pub const GRIPPERS: &[Limb] = &[Limb::LeftGripper, Limb::RightGripper];
pub const HEAD: &[Limb] = &[Limb::Head];
pub const WAIST: &[Limb] = &[Limb::Waist];

/// Named joint values of several limbs, as one message
fn joint_state(limbs: &[Limb], targets: &TargetStateStore) -> JointState {
    let mut state = JointState::default();
    for &limb in limbs {
        let values = to_execution(limb, &targets.joints(limb));
        state
            .name
            .extend(limb.joint_names().iter().map(|n| n.to_string()));
        state.position.extend(values);
    }
    state
}

/// Publishes commands for every limb over one transport
#[derive(Clone)]
pub struct MotionExecutor {
    transport: Arc<dyn Transport>,
}

impl MotionExecutor {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    /// Publish the stored target of `limb`
    ///
    /// Arms share one topic (and grippers another), so the sibling's target
    /// is sent along unchanged.
    pub fn dispatch(&self, limb: Limb, targets: &TargetStateStore) -> Result<(), TransportError> {
        let (topic, limbs) = match limb {
            Limb::LeftArm | Limb::RightArm => (TOPIC_JOINT_CMD, ARMS),
            Limb::LeftGripper | Limb::RightGripper => (TOPIC_GRIPPER, GRIPPERS),
            Limb::Head => (TOPIC_HEAD, HEAD),
            Limb::Waist => (TOPIC_WAIST, WAIST),
            Limb::Chassis => {
                warn!("Chassis has no joint target to dispatch");
                return Ok(());
            }
        };
        let message = joint_state(limbs, targets);
        debug!("Publishing {} on {}: {:?}", limb, topic, message.position);
        publish_json(self.transport.as_ref(), topic, &message)
    }

    pub fn send_velocity(&self, velocity: &ChassisVelocity) -> Result<(), TransportError> {
        publish_json(self.transport.as_ref(), TOPIC_CHASSIS, velocity)
    }
}

/// Settles the monitor when a motion task ends, however it ends
struct MotionTicket {
    monitor: Arc<CompletionMonitor>,
    generation: u64,
    outcome: MotionStatus,
}

impl Drop for MotionTicket {
    fn drop(&mut self) {
        self.monitor
            .finish(Limb::Chassis, self.generation, self.outcome);
    }
}

/// Owns the task of the planned chassis motion currently running
#[derive(Default)]
pub struct ChassisDriver {
    running: Mutex<Option<JoinHandle<()>>>,
}

impl ChassisDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace any running motion with `cmd`, returning its generation
    ///
    /// The previous motion is halted first. The new one publishes its
    /// velocity, holds it for `cmd.duration`, then publishes zero and marks
    /// the chassis Completed. The task runs to its end whether or not anyone
    /// waits on it; only `halt` or a newer motion cuts it short (Stopped).
    pub async fn run(
        &self,
        executor: &MotionExecutor,
        monitor: Arc<CompletionMonitor>,
        cmd: ChassisCommand,
        feedback_seq: u64,
    ) -> Result<u64, TransportError> {
        let mut running = self.running.lock().await;
        cancel(running.take()).await;

        let generation = monitor.begin(Limb::Chassis, feedback_seq);
        let guard = HaltGuard::new(executor.transport());
        if let Err(e) = executor.send_velocity(&ChassisVelocity::from(&cmd)) {
            monitor.finish(Limb::Chassis, generation, MotionStatus::Idle);
            return Err(e);
        }
        info!(
            "Chassis moving: vx={:.3} vy={:.3} omega={:.3} for {:?}",
            cmd.vx, cmd.vy, cmd.omega, cmd.duration
        );

        let mut ticket = MotionTicket {
            monitor,
            generation,
            outcome: MotionStatus::Stopped,
        };
        let task = tokio::spawn(async move {
            let mut ticket = ticket;
            tokio::time::sleep(cmd.duration).await;
            guard.halt();
            ticket.outcome = MotionStatus::Completed;
        });
        *running = Some(task);
        Ok(generation)
    }

    /// Replace any running motion with a velocity held until stopped
    ///
    /// No timer is armed: the chassis stays Moving until `halt` or another
    /// motion replaces it.
    pub async fn hold(
        &self,
        executor: &MotionExecutor,
        monitor: &CompletionMonitor,
        velocity: ChassisVelocity,
        feedback_seq: u64,
    ) -> Result<u64, TransportError> {
        let mut running = self.running.lock().await;
        cancel(running.take()).await;

        let generation = monitor.begin(Limb::Chassis, feedback_seq);
        if let Err(e) = executor.send_velocity(&velocity) {
            monitor.finish(Limb::Chassis, generation, MotionStatus::Idle);
            return Err(e);
        }
        info!(
            "Chassis velocity held: vx={:.3} vy={:.3} omega={:.3}",
            velocity.x_vel, velocity.y_vel, velocity.theta_vel
        );
        Ok(generation)
    }

    /// Cancel the running motion (if any) and publish zero velocity
    pub async fn halt(&self, executor: &MotionExecutor) -> Result<(), TransportError> {
        cancel(self.running.lock().await.take()).await;
        executor.send_velocity(&ChassisVelocity::zero())
    }
}

async fn cancel(task: Option<JoinHandle<()>>) {
    if let Some(task) = task {
        task.abort();
        // the aborted task drops its guard, which publishes zero
        let _ = task.await;
    }
}
