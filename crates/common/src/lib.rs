//! Common utilities shared across Taskboard backend components.

#![warn(clippy::pedantic)]

/// Module for JWT utilities (size limits, header parsing, time-claim checks)
pub mod jwt;
