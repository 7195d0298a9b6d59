//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// Success - operation completed without errors
pub const SUCCESS: u8 = 0;

/// General error - unspecified failure
pub const ERROR: u8 = 1;

/// Validation error - a pre-flight check rejected the operation
pub const VALIDATION_ERROR: u8 = 2;

/// Step error - an operation step failed
pub const STEP_ERROR: u8 = 3;

/// Timeout - a wait ran out of attempts
pub const TIMEOUT: u8 = 4;

/// Usage error - invalid arguments or options (following sysexits.h convention)
pub const USAGE_ERROR: u8 = 64;

/// Interrupted by SIGINT (128 + 2)
pub const CANCELLED: u8 = 130;
