//! Domain layer - Core types and port definitions
//!
//! This module defines the scope, remote resource models and the traits
//! (ports) that the cluster and disk service adapters implement.

pub mod ports;

pub use ports::*;
