//! Result type alias shared across the workspace.
//!
//! This module defines a convenient alias that defaults the error type to the
//! common `DailyError`, so functions can simply return `Result<T>`.
use crate::error::DailyError;

/// Workspace-wide `Result` alias with `DailyError` as the default error.
pub type Result<T, E = DailyError> = std::result::Result<T, E>;
