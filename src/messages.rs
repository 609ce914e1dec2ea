// Message types exchanged with the robot bridge (JSON over zenoh)

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::chassis::ChassisCommand;

// Joint command or feedback: parallel name/position arrays, like sensor_msgs/JointState
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JointState {
    pub name: Vec<String>,
    pub position: Vec<f64>,
}

impl JointState {
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, f64)>) -> Self {
        let (name, position): (Vec<&str>, Vec<f64>) = pairs.into_iter().unzip();
        Self {
            name: name.into_iter().map(String::from).collect(),
            position,
        }
    }

    /// Name -> position map; extra names or positions are dropped
    pub fn into_positions(self) -> HashMap<String, f64> {
        self.name.into_iter().zip(self.position).collect()
    }
}

// Velocity output from runtime -> chassis bridge
// Has default values because stopping is just the zero command
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct ChassisVelocity {
    pub x_vel: f64,     // m/s, forward
    pub y_vel: f64,     // m/s, left
    pub theta_vel: f64, // rad/s, counter-clockwise
}

impl ChassisVelocity {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::zero()
    }
}

impl From<&ChassisCommand> for ChassisVelocity {
    fn from(cmd: &ChassisCommand) -> Self {
        Self {
            x_vel: cmd.vx,
            y_vel: cmd.vy,
            theta_vel: cmd.omega,
        }
    }
}

/// Health of the feedback stream, tracked by the ingestion watchdog
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackHealth {
    Ok,
    Stale,
}
