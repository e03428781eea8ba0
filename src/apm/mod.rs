//! Command Monitoring
//!
//! The APM module provides an interface for observing commands as the executor sends them. Every
//! attempt triggers the start hooks and then the completion hooks registered on the client's
//! `Listener`. Each attempt is also logged through `tracing`.
mod event;
mod listener;

pub use self::event::{CommandResult, CommandStarted};
pub use self::listener::{CompletionHook, Listener, StartHook};
