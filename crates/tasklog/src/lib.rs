//! Task log backends for OpsClaw.
//!
//! Every step the agent takes is persisted here before the loop decides
//! whether to continue, so a task's transcript can always be read back,
//! including after a crash.

pub mod file;
pub mod in_memory;
mod record;

pub use file::FileTaskLog;
pub use in_memory::InMemoryTaskLog;
