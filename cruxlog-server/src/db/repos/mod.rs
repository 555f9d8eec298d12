//! Repository implementations for database access
//!
//! Each repository follows these patterns:
//! - Owns its SQL text; statements use `?` placeholders only
//! - Maps rows into typed records at the boundary
//! - Relies on DB constraints (duplicate key drives the user upsert)

pub mod climbs;
pub mod tutorials;
pub mod users;

pub use climbs::{Climb, ClimbRepo, MonthlyAverage, NewClimb};
pub use tutorials::TutorialRepo;
pub use users::{NewUser, User, UserRepo};
