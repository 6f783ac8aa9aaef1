//! Control Plane Module
//!
//! Adapters for the driver's external collaborators, the registry of
//! initialized drivers and the API that exposes them.

pub mod api;
pub mod backends;
pub mod platform;
pub mod registry;

pub use api::*;
pub use backends::*;
pub use platform::*;
pub use registry::*;
