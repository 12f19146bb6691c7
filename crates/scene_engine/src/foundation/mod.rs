//! Foundation module - Core utilities and types
//!
//! Shared building blocks for the ECS core:
//! - Math aliases and transform helpers
//! - Logging setup

pub mod math;
pub mod logging;
