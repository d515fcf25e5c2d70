//! # Wirebox Support
//!
//! Shared utilities for the Wirebox DI container.
//!
//! This crate provides:
//! - Type-name parsing (generic definitions, short display names)
//! - Text rendering for error messages and verification reports

pub mod rendering;
pub mod type_names;
