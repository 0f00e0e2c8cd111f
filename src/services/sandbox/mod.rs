// Sandbox collaborator layer
//
// The session core never talks to the execution environment directly; it
// goes through the `Sandbox` trait so the same orchestration runs against a
// host directory or an in-memory double.

pub mod backend;
#[cfg(feature = "runtime")]
pub mod local;
pub mod memory;

pub use backend::{
    command_line, split_command_line, wait_for_exit, ProcessHandle, ReadyCallback, Sandbox,
    SandboxError, SandboxProcess, ServerReady, UNKNOWN_EXIT_CODE,
};
#[cfg(feature = "runtime")]
pub use local::LocalSandbox;
pub use memory::{MemorySandbox, ProcessScript, SandboxMetrics, ScriptedExit, KILLED_EXIT_CODE};
