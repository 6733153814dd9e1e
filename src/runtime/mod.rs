//! # Runtime Module
//!
//! Startup wiring and process supervision.

pub mod initialization;
pub mod supervisor;

pub use initialization::*;
pub use supervisor::*;
