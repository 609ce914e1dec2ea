// Per-limb controllers
//
// Thin borrowed views over a `Robot`: each one fixes the limb and offers the
// operations that make sense for it. All state stays in the robot core.

mod arm;
mod chassis;
pub mod gripper;
pub mod head;
pub mod waist;

pub use arm::{Arm, ArmJoint};
pub use chassis::Chassis;
pub use gripper::Gripper;
pub use head::Head;
pub use waist::Waist;
