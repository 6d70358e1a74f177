//! Device connection management and identity resolution

pub mod connection;
pub mod identity;
pub mod screenshot;

pub use connection::{ConnectionAttempt, ConnectionManager, Connected, DEFAULT_ADB_PORT};
pub use identity::{DeviceIdentity, IdentityResolver, ResolvedDevice};
pub use screenshot::{capture_screenshot, Screenshot};
