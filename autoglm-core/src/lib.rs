//! AutoGLM core: configuration, logging, validation, the adb transport and
//! device connection management.

pub mod adb;
pub mod config;
pub mod device;
pub mod error;
pub mod logging;
pub mod validation;

pub use config::{Config, IdentityPolicy};
pub use error::{Error, Result, TransportFailure};
