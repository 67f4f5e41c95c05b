//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the engine:
//! - Math types and transform helpers
//! - Index recycling collections
//! - Contract-violation reporting
//! - Logging setup

pub mod math;
pub mod collections;
pub mod contract;
pub mod logging;
