pub mod claims;
pub mod gate;
pub mod jwt;
pub mod roles;
pub mod services;

pub use gate::{Decision, Gate, GateState};
pub use roles::{Requirement, Role, RolePolicy};
