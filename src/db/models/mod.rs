//! Database models split into domain-specific modules.

pub mod assessment;
pub mod booking;
pub mod consultant;
pub mod user;

pub use assessment::*;
pub use booking::*;
pub use consultant::*;
pub use user::*;
