//! App layer - session state and the command surface the shell drives

pub mod commands;
pub mod state;

pub use commands::ShellCommand;
pub use state::{DialogState, Session};
