// Robot handle: the public motion API
//
// All per-robot state lives in one Arc-shared core. Commands update the
// target store, mark the limb Moving and publish; completion is decided by
// the monitor as feedback flows in through the `FeedbackSink`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::chassis::{ChassisCommand, ChassisPlanner, FrictionCoeffs, MoveRequest};
use crate::config::{CHASSIS_SETTLE_MARGIN, MAX_ANGULAR_SPEED, MAX_LINEAR_SPEED, RobotConfig};
use crate::error::{BoxError, MotionError, Result, TransportError};
use crate::executor::{self, ChassisDriver, MotionExecutor, from_execution};
use crate::feedback::{FeedbackCache, FeedbackCallbacks, FeedbackSnapshot};
use crate::ik::{IkAdapter, IkSolver, Pose};
use crate::limb::Limb;
use crate::limbs::{Arm, Chassis, Gripper, Head, Waist};
use crate::limits::LimitTable;
use crate::messages::ChassisVelocity;
use crate::monitor::{CompletionMonitor, MotionStatus, WaitReport};
use crate::runtime;
use crate::target::{TargetState, TargetStateStore};
use crate::transport::{LinkState, Transport, ZenohLink};

/// Limbs published together (one topic per group)
const DISPATCH_GROUPS: [&[Limb]; 4] = [executor::ARMS, executor::GRIPPERS, executor::HEAD, executor::WAIST];

struct Core {
    config: RobotConfig,
    targets: TargetStateStore,
    feedback: FeedbackCache,
    monitor: Arc<CompletionMonitor>,
    ik: IkAdapter,
    link: watch::Sender<LinkState>,
    executor: RwLock<Option<MotionExecutor>>,
    callbacks: FeedbackCallbacks,
    chassis: ChassisDriver,
    planner: ChassisPlanner,
    friction: Mutex<FrictionCoeffs>,
}

impl Core {
    /// Reject commands, release waiters, forget what the limbs are doing
    fn connection_lost(&self) {
        let previous = self.link.send_replace(LinkState::Disconnected);
        *self
            .executor
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
        self.monitor.mark_unknown();
        if previous == LinkState::Connected {
            warn!("Connection to robot lost, all limbs unknown");
        }
    }
}

/// Entry point for inbound joint feedback
#[derive(Clone)]
pub struct FeedbackSink {
    core: Arc<Core>,
}

impl FeedbackSink {
    /// Replace the feedback snapshot and re-evaluate moving limbs
    pub fn ingest(&self, positions: HashMap<String, f64>) {
        let snapshot = self.core.feedback.store(positions);
        self.core.monitor.refresh(&snapshot, &self.core.targets);
        self.core.callbacks.dispatch(snapshot);
    }

    pub fn connection_lost(&self) {
        self.core.connection_lost();
    }

    pub fn latest(&self) -> Option<Arc<FeedbackSnapshot>> {
        self.core.feedback.latest()
    }

    pub fn stale_after(&self) -> Duration {
        self.core.config.stale_after()
    }
}

struct Connection {
    link: Arc<ZenohLink>,
    ingest: JoinHandle<()>,
}

pub struct Robot {
    core: Arc<Core>,
    connection: tokio::sync::Mutex<Option<Connection>>,
}

impl Robot {
    /// Robot without an IK solver; `ik()` fails with `SolverUnavailable`
    pub fn new(config: RobotConfig) -> Self {
        Self::build(config, IkAdapter::unavailable())
    }

    pub fn with_solver(config: RobotConfig, solver: Box<dyn IkSolver>) -> Self {
        Self::build(config, IkAdapter::new(solver))
    }

    fn build(config: RobotConfig, ik: IkAdapter) -> Self {
        let (link, _) = watch::channel(LinkState::Disconnected);
        let core = Core {
            targets: TargetStateStore::new(LimitTable::mantis()),
            feedback: FeedbackCache::new(),
            monitor: Arc::new(CompletionMonitor::new(config.stale_after())),
            ik,
            link,
            executor: RwLock::new(None),
            callbacks: FeedbackCallbacks::new(),
            chassis: ChassisDriver::new(),
            planner: ChassisPlanner::new(),
            friction: Mutex::new(config.friction),
            config,
        };
        Self {
            core: Arc::new(core),
            connection: tokio::sync::Mutex::new(None),
        }
    }

    pub fn config(&self) -> &RobotConfig {
        &self.core.config
    }

    pub fn limits(&self) -> &LimitTable {
        self.core.targets.limits()
    }

    pub fn link_state(&self) -> LinkState {
        *self.core.link.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.link_state() == LinkState::Connected
    }

    // -- connection --

    /// Open the zenoh session, start feedback ingestion and (optionally)
    /// wait for the first feedback message
    pub async fn connect(&self) -> Result<()> {
        {
            let mut connection = self.connection.lock().await;
            if connection.is_some() {
                debug!("Already connected");
                return Ok(());
            }

            let link = Arc::new(ZenohLink::open(&self.core.config).await?);
            let subscriber = link.subscribe_feedback().await?;
            self.attach(link.clone());
            let ingest = tokio::spawn(runtime::ingest_feedback(subscriber, self.feedback_sink()));
            *connection = Some(Connection { link, ingest });
        }

        if self.core.config.verify {
            if let Err(e) = self.verify_feedback().await {
                if let Err(close) = self.disconnect().await {
                    warn!("Failed to close session: {}", close);
                }
                return Err(e);
            }
        }
        info!("Connected to robot");
        Ok(())
    }

    async fn verify_feedback(&self) -> Result<()> {
        let timeout = self.core.config.connect_timeout();
        let mut updates = self.core.feedback.subscribe();
        info!("Waiting up to {:?} for joint feedback...", timeout);
        match tokio::time::timeout(timeout, updates.wait_for(|s| s.is_some())).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(MotionError::Disconnected),
            Err(_) => Err(TransportError::NoFeedback(timeout).into()),
        }
    }

    /// Use `transport` for commands; feedback is pushed via `feedback_sink()`
    pub fn attach(&self, transport: Arc<dyn Transport>) {
        *self
            .core
            .executor
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(MotionExecutor::new(transport));
        self.core.monitor.reset_unknown();
        self.core.link.send_replace(LinkState::Connected);
        if self.core.callbacks.start().is_some() {
            debug!("Feedback dispatcher started");
        }
    }

    /// Stop the chassis, then drop the link
    pub async fn disconnect(&self) -> Result<()> {
        if let Ok(executor) = self.executor() {
            if let Err(e) = self.core.chassis.halt(&executor).await {
                warn!("Failed to stop chassis before disconnect: {}", e);
            }
        }
        self.core.connection_lost();

        if let Some(connection) = self.connection.lock().await.take() {
            connection.ingest.abort();
            connection.link.close().await?;
        }
        info!("Disconnected from robot");
        Ok(())
    }

    pub fn feedback_sink(&self) -> FeedbackSink {
        FeedbackSink {
            core: self.core.clone(),
        }
    }

    fn executor(&self) -> Result<MotionExecutor> {
        self.core
            .executor
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or(MotionError::Disconnected)
    }

    // -- joint commands --

    /// Mark `limb` Moving, publish its target, optionally wait for it
    async fn issue(&self, executor: &MotionExecutor, limb: Limb, block: bool) -> Result<MotionStatus> {
        let generation = self.core.monitor.begin(limb, self.core.feedback.seq());
        if let Err(e) = executor.dispatch(limb, &self.core.targets) {
            self.core.monitor.finish(limb, generation, MotionStatus::Idle);
            return Err(e.into());
        }
        if !block {
            return Ok(MotionStatus::Moving);
        }
        let report = self.wait(&[limb], self.core.config.wait_timeout()).await?;
        Ok(report.status(limb).unwrap_or_else(|| self.status(limb)))
    }

    pub async fn set_joint(&self, limb: Limb, index: usize, value: f64, block: bool) -> Result<MotionStatus> {
        let executor = self.executor()?;
        self.core.targets.set_joint(limb, index, value)?;
        self.issue(&executor, limb, block).await
    }

    pub async fn set_joints(&self, limb: Limb, joints: &[f64], block: bool) -> Result<MotionStatus> {
        let executor = self.executor()?;
        self.core.targets.set_joint_vector(limb, joints)?;
        self.issue(&executor, limb, block).await
    }

    /// Edit the current target of `limb` in place and publish it
    ///
    /// The edit runs under the limb's lock, so relative helpers (waist
    /// steps, single head axes) never race each other.
    pub async fn update_joints<F>(&self, limb: Limb, edit: F, block: bool) -> Result<MotionStatus>
    where
        F: FnOnce(&mut [f64]),
    {
        let executor = self.executor()?;
        self.core.targets.update(limb, edit)?;
        self.issue(&executor, limb, block).await
    }

    /// Cartesian move of an arm; `pose` is a delta unless `absolute`
    ///
    /// Deltas apply to the stored target pose, never to measured feedback.
    pub async fn ik(&self, limb: Limb, pose: Pose, absolute: bool, block: bool) -> Result<MotionStatus> {
        let executor = self.executor()?;
        let solution = self
            .core
            .targets
            .set_pose_delta(limb, &pose, absolute, &self.core.ik)?;
        if solution.clamped {
            warn!("{} IK solution clamped into joint limits", limb);
        }
        self.issue(&executor, limb, block).await
    }

    /// Send `limb` to its clamped zero position
    pub async fn home(&self, limb: Limb, block: bool) -> Result<MotionStatus> {
        if limb == Limb::Chassis {
            return Err(MotionError::Unsupported {
                limb,
                operation: "home",
            });
        }
        let executor = self.executor()?;
        self.core.targets.set_joint_vector(limb, &vec![0.0; limb.dof()])?;
        self.issue(&executor, limb, block).await
    }

    /// Home every jointed limb (grippers closed, head centered)
    pub async fn home_all(&self, block: bool) -> Result<WaitReport> {
        let executor = self.executor()?;
        for limb in Limb::JOINTED {
            self.core.targets.set_joint_vector(limb, &vec![0.0; limb.dof()])?;
        }

        let seq = self.core.feedback.seq();
        let generations: Vec<(Limb, u64)> = Limb::JOINTED
            .iter()
            .map(|&limb| (limb, self.core.monitor.begin(limb, seq)))
            .collect();

        for (i, group) in DISPATCH_GROUPS.iter().enumerate() {
            if let Err(e) = executor.dispatch(group[0], &self.core.targets) {
                // this group and every later one never left
                let unsent: Vec<Limb> = DISPATCH_GROUPS[i..].iter().flat_map(|g| g.iter().copied()).collect();
                for &(limb, generation) in &generations {
                    if unsent.contains(&limb) {
                        self.core.monitor.finish(limb, generation, MotionStatus::Idle);
                    }
                }
                return Err(e.into());
            }
        }
        info!("Homing all limbs");

        if !block {
            return Ok(self.core.monitor.report(&Limb::JOINTED));
        }
        self.wait(&Limb::JOINTED, self.core.config.wait_timeout()).await
    }

    // -- stop --

    /// Stop `limb` where it is
    ///
    /// Jointed limbs are retargeted to fresh measured positions (the target is
    /// kept if there are none); the chassis is halted.
    pub async fn stop(&self, limb: Limb) -> Result<()> {
        let executor = self.executor()?;
        self.core.monitor.stop(limb);

        if limb == Limb::Chassis {
            self.core.chassis.halt(&executor).await?;
            info!("Chassis stopped");
            return Ok(());
        }

        let stale_after = self.core.config.stale_after();
        let measured = self
            .core
            .feedback
            .latest()
            .filter(|snapshot| !snapshot.is_stale(stale_after))
            .and_then(|snapshot| {
                limb.joint_names()
                    .iter()
                    .map(|name| snapshot.position(name))
                    .collect::<Option<Vec<f64>>>()
            });
        match measured {
            Some(values) => {
                self.core
                    .targets
                    .set_joint_vector(limb, &from_execution(limb, &values))?;
                executor.dispatch(limb, &self.core.targets)?;
                info!("{} stopped at measured position", limb);
            }
            None => warn!("No fresh feedback for {}, keeping its target", limb),
        }
        Ok(())
    }

    /// Stop every limb; the first error is returned after trying them all
    pub async fn stop_all(&self) -> Result<()> {
        let mut first_error = None;
        for limb in Limb::ALL {
            if let Err(e) = self.stop(limb).await {
                warn!("Failed to stop {}: {}", limb, e);
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // -- status --

    /// Live check against the latest feedback (true while disconnected)
    pub fn is_moving(&self, limb: Limb) -> bool {
        if !self.is_connected() {
            return true;
        }
        self.core
            .monitor
            .is_moving(limb, &self.core.targets, &self.core.feedback)
    }

    pub fn status(&self, limb: Limb) -> MotionStatus {
        self.core.monitor.status(limb)
    }

    /// Wait until none of `limbs` is Moving; see `WaitReport::into_result`
    pub async fn wait(&self, limbs: &[Limb], timeout: Duration) -> Result<WaitReport> {
        self.core
            .monitor
            .wait(limbs, timeout, self.core.link.subscribe())
            .await
    }

    pub fn target(&self, limb: Limb) -> TargetState {
        self.core.targets.get(limb)
    }

    pub fn latest_feedback(&self) -> Option<Arc<FeedbackSnapshot>> {
        self.core.feedback.latest()
    }

    /// Register a callback run for every feedback snapshot
    ///
    /// Callbacks run on a dispatcher thread behind a bounded queue; errors
    /// and panics are logged and never reach ingestion or other callbacks.
    pub fn on_feedback<F>(&self, callback: F)
    where
        F: Fn(&HashMap<String, f64>) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.core.callbacks.register(Arc::new(callback));
    }

    // -- chassis --

    pub fn friction(&self) -> FrictionCoeffs {
        *self
            .core
            .friction
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_friction(&self, friction: FrictionCoeffs) {
        *self
            .core
            .friction
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = friction;
    }

    /// Drive `distance` meters forward (negative: backward) while turning by
    /// `angle` radians; `friction` defaults to the robot's current setting
    pub async fn chassis_move(
        &self,
        distance: f64,
        angle: f64,
        linear_speed: f64,
        angular_speed: f64,
        friction: Option<FrictionCoeffs>,
        block: bool,
    ) -> Result<MotionStatus> {
        let executor = self.executor()?;
        let friction = friction.unwrap_or_else(|| self.friction());
        let cmd = self
            .core
            .planner
            .plan(distance, angle, linear_speed, angular_speed, friction)?;
        self.run_chassis(&executor, cmd, block).await
    }

    /// Drive the base at a body-frame velocity until stopped or replaced
    ///
    /// Linear components are clamped to `MAX_LINEAR_SPEED` and `omega` to
    /// `MAX_ANGULAR_SPEED`. Any planned move is cut short first. The chassis
    /// stays Moving until `stop(Limb::Chassis)`; an all-zero velocity is a stop.
    pub async fn chassis_velocity(&self, vx: f64, vy: f64, omega: f64) -> Result<MotionStatus> {
        let executor = self.executor()?;
        if ![vx, vy, omega].iter().all(|v| v.is_finite()) {
            return Err(MotionError::InvalidRequest(format!(
                "non-finite chassis velocity ({}, {}, {})",
                vx, vy, omega
            )));
        }
        let velocity = ChassisVelocity {
            x_vel: vx.clamp(-MAX_LINEAR_SPEED, MAX_LINEAR_SPEED),
            y_vel: vy.clamp(-MAX_LINEAR_SPEED, MAX_LINEAR_SPEED),
            theta_vel: omega.clamp(-MAX_ANGULAR_SPEED, MAX_ANGULAR_SPEED),
        };
        if velocity.is_zero() {
            self.stop(Limb::Chassis).await?;
            return Ok(MotionStatus::Stopped);
        }
        if velocity.x_vel != vx || velocity.y_vel != vy || velocity.theta_vel != omega {
            warn!("Chassis velocity clamped to {:?}", velocity);
        }
        self.core
            .chassis
            .hold(&executor, &self.core.monitor, velocity, self.core.feedback.seq())
            .await?;
        Ok(MotionStatus::Moving)
    }

    /// Like `chassis_move`, with a sideways component
    pub async fn chassis_move_request(&self, request: &MoveRequest, block: bool) -> Result<MotionStatus> {
        let executor = self.executor()?;
        let cmd = self.core.planner.plan_move(request)?;
        self.run_chassis(&executor, cmd, block).await
    }

    async fn run_chassis(&self, executor: &MotionExecutor, cmd: ChassisCommand, block: bool) -> Result<MotionStatus> {
        if cmd.duration.is_zero() {
            debug!("Empty chassis move");
            return Ok(MotionStatus::Completed);
        }
        self.core
            .chassis
            .run(executor, self.core.monitor.clone(), cmd, self.core.feedback.seq())
            .await?;
        if !block {
            return Ok(MotionStatus::Moving);
        }

        // dropping this wait leaves the motion running to its planned end
        let report = self
            .wait(&[Limb::Chassis], cmd.duration + CHASSIS_SETTLE_MARGIN)
            .await?;
        Ok(report
            .status(Limb::Chassis)
            .unwrap_or_else(|| self.status(Limb::Chassis)))
    }

    // -- controllers --

    pub fn left_arm(&self) -> Arm<'_> {
        Arm::new(self, Limb::LeftArm)
    }

    pub fn right_arm(&self) -> Arm<'_> {
        Arm::new(self, Limb::RightArm)
    }

    pub fn left_gripper(&self) -> Gripper<'_> {
        Gripper::new(self, Limb::LeftGripper)
    }

    pub fn right_gripper(&self) -> Gripper<'_> {
        Gripper::new(self, Limb::RightGripper)
    }

    pub fn head(&self) -> Head<'_> {
        Head::new(self)
    }

    pub fn waist(&self) -> Waist<'_> {
        Waist::new(self)
    }

    pub fn chassis(&self) -> Chassis<'_> {
        Chassis::new(self)
    }
}
