// Chassis motion: planning displacement requests into timed velocity commands
//
// Provides:
// - Friction-compensated duration planning (one velocity, one duration)
// - The zero-velocity guard that ends every planned motion

mod guard;
pub mod planner;

pub use guard::HaltGuard;
pub use planner::{ChassisCommand, ChassisPlanner, FrictionCoeffs, MoveRequest};
