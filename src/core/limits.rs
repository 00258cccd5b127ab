/*!
 * Limits and Defaults
 *
 * Centralized location for timeouts, capacities, and other tunables.
 * Organized by subsystem.
 */

use std::time::Duration;

// =============================================================================
// PROCESS SUPERVISION
// =============================================================================

/// Grace period between the termination signal and escalation to kill (30s)
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// How long to wait for the exit to be observed after a kill signal (5s)
/// A process stuck in uninterruptible sleep can outlive SIGKILL for a while.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(5);

/// Lines retained per process log ring buffer
pub const DEFAULT_LOG_CAPACITY: usize = 1000;

/// Longest captured output line; longer runs are split into chunks of this size
pub const MAX_LOG_LINE_BYTES: u64 = 64 * 1024;

/// Default native toolchain used for compiled components
pub const DEFAULT_NATIVE_TOOLCHAIN: &str = "go";

/// Default script runner used for bundled (web) components
pub const DEFAULT_SCRIPT_RUNNER: &str = "npm";

/// Exit code recorded when the OS reports neither a code nor a signal
pub const UNKNOWN_EXIT_CODE: i32 = -1;

/// Offset added to a terminating signal number (shell convention, 128 + SIGKILL = 137)
pub const SIGNAL_EXIT_BASE: i32 = 128;

// =============================================================================
// BUILD ORCHESTRATION
// =============================================================================

/// Concurrent project builds allowed by the orchestrator
pub const DEFAULT_MAX_PARALLEL: usize = 4;

/// Upper bound for a whole fleet build (30 minutes)
pub const DEFAULT_FLEET_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Builds slower than this are reported with a warning
pub const SLOW_BUILD_THRESHOLD: Duration = Duration::from_secs(120);

/// Default artifact directory, relative to the component working directory
pub const DEFAULT_ARTIFACT_DIR: &str = "bin";
