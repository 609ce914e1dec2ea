// Limbs of the Mantis robot and the joint names the bridge uses for them

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{GRIPPER_TOLERANCE, PRISMATIC_TOLERANCE, REVOLUTE_TOLERANCE};

pub const ARM_DOF: usize = 7;

pub const LEFT_ARM_JOINTS: [&str; ARM_DOF] = [
    "left_shoulder_pitch_joint",
    "left_shoulder_yaw_joint",
    "left_shoulder_roll_joint",
    "left_elbow_pitch_joint",
    "left_wrist_roll_joint",
    "left_wrist_pitch_joint",
    "left_wrist_yaw_joint",
];

pub const RIGHT_ARM_JOINTS: [&str; ARM_DOF] = [
    "right_shoulder_pitch_joint",
    "right_shoulder_yaw_joint",
    "right_shoulder_roll_joint",
    "right_elbow_pitch_joint",
    "right_wrist_roll_joint",
    "right_wrist_pitch_joint",
    "right_wrist_yaw_joint",
];

pub const HEAD_JOINTS: [&str; 2] = ["head_pitch", "head_yaw"];
pub const LEFT_GRIPPER_JOINTS: [&str; 1] = ["left_gripper"];
pub const RIGHT_GRIPPER_JOINTS: [&str; 1] = ["right_gripper"];
pub const WAIST_JOINTS: [&str; 1] = ["waist"];

/// An independently controllable part of the robot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Limb {
    LeftArm,
    RightArm,
    LeftGripper,
    RightGripper,
    Head,
    Waist,
    Chassis,
}

/// Joint class, which decides the convergence tolerance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointClass {
    Revolute,
    Gripper,
    Prismatic,
}

impl JointClass {
    /// Fixed epsilon in execution units (rad or m)
    pub fn tolerance(self) -> f64 {
        match self {
            JointClass::Revolute => REVOLUTE_TOLERANCE,
            JointClass::Gripper => GRIPPER_TOLERANCE,
            JointClass::Prismatic => PRISMATIC_TOLERANCE,
        }
    }
}

impl Limb {
    pub const ALL: [Limb; 7] = [
        Limb::LeftArm,
        Limb::RightArm,
        Limb::LeftGripper,
        Limb::RightGripper,
        Limb::Head,
        Limb::Waist,
        Limb::Chassis,
    ];

    /// Limbs driven by joint position targets (everything but the chassis)
    pub const JOINTED: [Limb; 6] = [
        Limb::LeftArm,
        Limb::RightArm,
        Limb::LeftGripper,
        Limb::RightGripper,
        Limb::Head,
        Limb::Waist,
    ];

    /// Dense index used by the per-limb stores
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn joint_names(self) -> &'static [&'static str] {
        match self {
            Limb::LeftArm => &LEFT_ARM_JOINTS,
            Limb::RightArm => &RIGHT_ARM_JOINTS,
            Limb::LeftGripper => &LEFT_GRIPPER_JOINTS,
            Limb::RightGripper => &RIGHT_GRIPPER_JOINTS,
            Limb::Head => &HEAD_JOINTS,
            Limb::Waist => &WAIST_JOINTS,
            Limb::Chassis => &[],
        }
    }

    pub fn dof(self) -> usize {
        self.joint_names().len()
    }

    pub fn is_arm(self) -> bool {
        matches!(self, Limb::LeftArm | Limb::RightArm)
    }

    pub fn is_gripper(self) -> bool {
        matches!(self, Limb::LeftGripper | Limb::RightGripper)
    }

    pub fn joint_class(self) -> JointClass {
        match self {
            Limb::LeftGripper | Limb::RightGripper => JointClass::Gripper,
            Limb::Waist => JointClass::Prismatic,
            _ => JointClass::Revolute,
        }
    }
}

impl fmt::Display for Limb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Limb::LeftArm => "left arm",
            Limb::RightArm => "right arm",
            Limb::LeftGripper => "left gripper",
            Limb::RightGripper => "right gripper",
            Limb::Head => "head",
            Limb::Waist => "waist",
            Limb::Chassis => "chassis",
        };
        f.write_str(name)
    }
}
