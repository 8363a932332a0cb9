//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the crate:
//! - Math types and GPU matrix packing helpers
//! - Logging utilities

pub mod math;
pub mod logging;
