//! API Module
//!
//! REST surface over the registered volume drivers.

pub mod rest;
pub mod server;

pub use rest::*;
pub use server::*;
