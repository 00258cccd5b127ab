/*!
 * Process Module
 * Supervision of long-running component processes
 */

pub mod command;
pub mod log_buffer;
pub mod managed;
pub mod manager;
pub mod platform;
pub mod supervisor;
pub mod types;

// Re-export for convenience
pub use command::LaunchSpec;
pub use log_buffer::LogBuffer;
pub use managed::ManagedProcess;
pub use manager::{ComponentStart, ProcessManager, ProcessManagerBuilder};
pub use platform::{default_controller, GroupSignal, ProcessController};
pub use supervisor::{StopOutcome, Supervisor};
pub use types::{
    LogLine, LogStream, Process, ProcessError, ProcessEvent, ProcessEventKind, ProcessResult,
    ProcessState, ProcessSummary,
};
