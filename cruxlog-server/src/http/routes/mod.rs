//! Route handlers organized by resource

pub mod climbs;
pub mod health;
pub mod tutorials;
pub mod users;
